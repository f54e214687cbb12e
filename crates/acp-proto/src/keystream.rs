//! Password-field obfuscation keystream.
//!
//! Frames sent before session encryption is negotiated carry the admin
//! password in the 32-byte header key field, XORed with a fixed keystream.
//! This hides the password from casual capture only; it is not
//! cryptography. Once AES-CTR session encryption is active, senders put
//! all zeros in the field instead.

/// Length of the message-header key field.
pub const HEADER_KEY_LEN: usize = 32;

/// Fixed 16-byte key the keystream cycles over.
const STATIC_KEY: [u8; 16] = [
    0x5b, 0x6f, 0xaf, 0x5d, 0x9d, 0x5b, 0x0e, 0x13, 0x51, 0xf2, 0xda, 0x1d, 0xe7, 0xe8, 0xd6, 0x73,
];

/// Produce `len` keystream bytes.
///
/// Byte `i` is `((i + 0x55) & 0xFF) XOR STATIC_KEY[i % 16]`.
#[must_use]
pub fn keystream(len: usize) -> Vec<u8> {
    (0..len).map(|i| (((i + 0x55) & 0xFF) as u8) ^ STATIC_KEY[i % STATIC_KEY.len()]).collect()
}

/// Obfuscate `password` into a 32-byte header key.
///
/// The UTF-8 bytes of the password are truncated to 32 bytes, right-padded
/// with zeros, then XORed with the keystream. Zero padding means the tail
/// of the key field beyond the password length is the raw keystream.
#[must_use]
pub fn generate_header_key(password: &str) -> [u8; HEADER_KEY_LEN] {
    let mut key = [0u8; HEADER_KEY_LEN];
    let pw = password.as_bytes();
    let take = pw.len().min(HEADER_KEY_LEN);
    key[..take].copy_from_slice(&pw[..take]);

    for (byte, ks) in key.iter_mut().zip(keystream(HEADER_KEY_LEN)) {
        *byte ^= ks;
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keystream_20_bytes() {
        assert_eq!(hex::encode(keystream(20)), "0e39f805c401554f0cac857d868ab5173e09c835");
    }

    #[test]
    fn keystream_wraps_after_16() {
        let ks = keystream(40);
        // Position 16 uses STATIC_KEY[0] again, with counter 0x65
        assert_eq!(ks[16], 0x65 ^ 0x5b);
        assert_eq!(ks[32], 0x75 ^ 0x5b);
    }

    #[test]
    fn header_key_for_testing_password() {
        assert_eq!(
            hex::encode(generate_header_key("testing")),
            "7a5c8b71ad6f324f0cac857d868ab5173e09c835f431657f3c9cb56d969aa507"
        );
    }

    #[test]
    fn empty_password_is_raw_keystream() {
        let key = generate_header_key("");
        assert_eq!(key.to_vec(), keystream(HEADER_KEY_LEN));
    }

    #[test]
    fn long_password_is_truncated() {
        let long = "x".repeat(64);
        let short = "x".repeat(32);
        assert_eq!(generate_header_key(&long), generate_header_key(&short));
    }
}
