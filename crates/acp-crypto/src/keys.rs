//! Session key derivation.
//!
//! The SRP handshake leaves both peers holding the same shared secret.
//! Each traffic direction then gets its own AES-128 key by stretching
//! that secret with PBKDF2-HMAC-SHA1 under a fixed per-direction salt and
//! iteration count. The counts are low because this is domain separation,
//! not password hashing: the input already has full entropy.

use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Salt for the client-to-station key.
pub const CLIENT_KEY_SALT: [u8; 16] = [
    0xf0, 0x72, 0xfa, 0x3f, 0x66, 0xb4, 0x10, 0xa1, 0x35, 0xfa, 0xe8, 0xe6, 0xd1, 0xd4, 0x3d, 0x5f,
];

/// Salt for the station-to-client key.
pub const SERVER_KEY_SALT: [u8; 16] = [
    0xbd, 0x06, 0x82, 0xc9, 0xfe, 0x79, 0x32, 0x5b, 0xc7, 0x36, 0x55, 0xf4, 0x17, 0x4b, 0x99, 0x6c,
];

/// PBKDF2 rounds for the client-to-station key.
pub const CLIENT_KEY_ITERATIONS: u32 = 5;

/// PBKDF2 rounds for the station-to-client key.
pub const SERVER_KEY_ITERATIONS: u32 = 7;

/// The two per-direction AES-128 keys of one session.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    /// Key for client-to-station traffic.
    pub client: [u8; 16],
    /// Key for station-to-client traffic.
    pub server: [u8; 16],
}

/// Stretch the SRP shared secret into both direction keys.
#[must_use]
pub fn derive_session_keys(session_key: &[u8]) -> SessionKeys {
    let mut client = [0u8; 16];
    pbkdf2_hmac::<Sha1>(session_key, &CLIENT_KEY_SALT, CLIENT_KEY_ITERATIONS, &mut client);

    let mut server = [0u8; 16];
    pbkdf2_hmac::<Sha1>(session_key, &SERVER_KEY_SALT, SERVER_KEY_ITERATIONS, &mut server);

    SessionKeys { client, server }
}
