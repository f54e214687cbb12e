//! Paired AES-128-CTR session streams.
//!
//! Once authentication completes, every byte on the connection is
//! stream-ciphered: one AES-128-CTR state per direction, keyed with the
//! derived direction keys and seeded with the IVs exchanged during the
//! handshake. Both counters advance monotonically per byte and are never
//! rewound; replaying or skipping bytes desynchronizes the peers until
//! they reconnect.
//!
//! The cipher offers no integrity of its own. Garbage ciphertext decrypts
//! to garbage plaintext, which the framing layer then rejects through its
//! checksums.

use aes::Aes128;
use aes::cipher::{KeyIvInit, StreamCipher};

use crate::keys::SessionKeys;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// Which side of the connection this cipher pair serves.
///
/// The client encrypts with the client key and decrypts with the server
/// key; the station does the reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Connecting peer.
    Client,
    /// Accepting peer.
    Server,
}

/// Both direction streams of one encrypted session.
pub struct SessionCipher {
    outbound: Aes128Ctr,
    inbound: Aes128Ctr,
}

impl SessionCipher {
    /// Build the cipher pair for `role` from the derived keys and the
    /// handshake IVs.
    #[must_use]
    pub fn new(role: Role, keys: &SessionKeys, client_iv: &[u8; 16], server_iv: &[u8; 16]) -> Self {
        let client_stream = Aes128Ctr::new(&keys.client.into(), client_iv.into());
        let server_stream = Aes128Ctr::new(&keys.server.into(), server_iv.into());

        match role {
            Role::Client => Self { outbound: client_stream, inbound: server_stream },
            Role::Server => Self { outbound: server_stream, inbound: client_stream },
        }
    }

    /// Encrypt outbound bytes in place.
    pub fn encrypt(&mut self, buf: &mut [u8]) {
        self.outbound.apply_keystream(buf);
    }

    /// Decrypt inbound bytes in place.
    pub fn decrypt(&mut self, buf: &mut [u8]) {
        self.inbound.apply_keystream(buf);
    }
}

impl std::fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::derive_session_keys;

    fn pair() -> (SessionCipher, SessionCipher) {
        let keys = derive_session_keys(b"test session secret");
        let client_iv = [0x11u8; 16];
        let server_iv = [0x22u8; 16];
        (
            SessionCipher::new(Role::Client, &keys, &client_iv, &server_iv),
            SessionCipher::new(Role::Server, &keys, &client_iv, &server_iv),
        )
    }

    #[test]
    fn client_to_server_round_trip() {
        let (mut client, mut server) = pair();

        let mut wire = b"get-property request".to_vec();
        client.encrypt(&mut wire);
        assert_ne!(wire, b"get-property request");

        server.decrypt(&mut wire);
        assert_eq!(wire, b"get-property request");
    }

    #[test]
    fn server_to_client_round_trip() {
        let (mut client, mut server) = pair();

        let mut wire = b"response bytes".to_vec();
        server.encrypt(&mut wire);
        client.decrypt(&mut wire);
        assert_eq!(wire, b"response bytes");
    }

    #[test]
    fn directions_are_independent_streams() {
        let (mut client, mut server) = pair();

        // Interleave traffic in both directions across chunk boundaries
        let mut c2s_a = vec![0xAAu8; 7];
        let mut c2s_b = vec![0xAAu8; 9];
        let mut s2c = vec![0xBBu8; 16];

        client.encrypt(&mut c2s_a);
        server.encrypt(&mut s2c);
        client.encrypt(&mut c2s_b);

        server.decrypt(&mut c2s_a);
        server.decrypt(&mut c2s_b);
        client.decrypt(&mut s2c);

        assert_eq!(c2s_a, vec![0xAA; 7]);
        assert_eq!(c2s_b, vec![0xAA; 9]);
        assert_eq!(s2c, vec![0xBB; 16]);
    }

    #[test]
    fn chunking_does_not_affect_the_stream() {
        let keys = derive_session_keys(b"chunking");
        let civ = [3u8; 16];
        let siv = [4u8; 16];

        let mut whole = SessionCipher::new(Role::Client, &keys, &civ, &siv);
        let mut split = SessionCipher::new(Role::Client, &keys, &civ, &siv);

        let mut buf_whole = vec![0x5Au8; 100];
        whole.encrypt(&mut buf_whole);

        let mut buf_split = vec![0x5Au8; 100];
        for chunk in buf_split.chunks_mut(13) {
            split.encrypt(chunk);
        }

        assert_eq!(buf_whole, buf_split);
    }
}
