//! SRP-6a mutual authentication (1536-bit group, SHA-1).
//!
//! The station proves knowledge of the stored verifier and the client
//! proves knowledge of the password without either sending it. The
//! byproduct both sides keep is the 20-byte shared secret hash, which
//! [`crate::keys::derive_session_keys`] stretches into the session keys.
//!
//! Ephemeral secrets are caller-supplied bytes, so the exchange is
//! deterministic under test. Public values are emitted left-padded to the
//! 192-byte group length; received values are interpreted as big-endian
//! magnitudes, so trimmed and padded forms are both accepted.

use num_bigint::BigUint;
use sha1::{Digest, Sha1};
use thiserror::Error;
use zeroize::Zeroizing;

/// Account name current firmware authenticates.
pub const USERNAME: &str = "admin";

/// Byte length of the group modulus; public keys pad to this.
pub const GROUP_LEN: usize = 192;

/// Length of SHA-1 output, hence of proofs and the shared secret hash.
pub const PROOF_LEN: usize = 20;

/// The 1536-bit SRP group modulus (RFC 5054, appendix A).
static GROUP_PRIME: [u8; GROUP_LEN] = [
    0x9d, 0xef, 0x3c, 0xaf, 0xb9, 0x39, 0x27, 0x7a, 0xb1, 0xf1, 0x2a, 0x86,
    0x17, 0xa4, 0x7b, 0xbb, 0xdb, 0xa5, 0x1d, 0xf4, 0x99, 0xac, 0x4c, 0x80,
    0xbe, 0xee, 0xa9, 0x61, 0x4b, 0x19, 0xcc, 0x4d, 0x5f, 0x4f, 0x5f, 0x55,
    0x6e, 0x27, 0xcb, 0xde, 0x51, 0xc6, 0xa9, 0x4b, 0xe4, 0x60, 0x7a, 0x29,
    0x15, 0x58, 0x90, 0x3b, 0xa0, 0xd0, 0xf8, 0x43, 0x80, 0xb6, 0x55, 0xbb,
    0x9a, 0x22, 0xe8, 0xdc, 0xdf, 0x02, 0x8a, 0x7c, 0xec, 0x67, 0xf0, 0xd0,
    0x81, 0x34, 0xb1, 0xc8, 0xb9, 0x79, 0x89, 0x14, 0x9b, 0x60, 0x9e, 0x0b,
    0xe3, 0xba, 0xb6, 0x3d, 0x47, 0x54, 0x83, 0x81, 0xdb, 0xc5, 0xb1, 0xfc,
    0x76, 0x4e, 0x3f, 0x4b, 0x53, 0xdd, 0x9d, 0xa1, 0x15, 0x8b, 0xfd, 0x3e,
    0x2b, 0x9c, 0x8c, 0xf5, 0x6e, 0xdf, 0x01, 0x95, 0x39, 0x34, 0x96, 0x27,
    0xdb, 0x2f, 0xd5, 0x3d, 0x24, 0xb7, 0xc4, 0x86, 0x65, 0x77, 0x2e, 0x43,
    0x7d, 0x6c, 0x7f, 0x8c, 0xe4, 0x42, 0x73, 0x4a, 0xf7, 0xcc, 0xb7, 0xae,
    0x83, 0x7c, 0x26, 0x4a, 0xe3, 0xa9, 0xbe, 0xb8, 0x7f, 0x8a, 0x2f, 0xe9,
    0xb8, 0xb5, 0x29, 0x2e, 0x5a, 0x02, 0x1f, 0xff, 0x5e, 0x91, 0x47, 0x9e,
    0x8c, 0xe7, 0xa2, 0x8c, 0x24, 0x42, 0xc6, 0xf3, 0x15, 0x18, 0x0f, 0x93,
    0x49, 0x9a, 0x23, 0x4d, 0xcf, 0x76, 0xe3, 0xfe, 0xd1, 0x35, 0xf9, 0xbb,
];

/// The group generator.
const GENERATOR: u32 = 2;

/// Authentication failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SrpError {
    /// The peer's evidence did not verify. For the client this is fatal
    /// for the session; the station answers it with a retryable error.
    #[error("peer proof did not verify")]
    ProofMismatch,

    /// A received parameter is unusable (wrong group, degenerate public
    /// key).
    #[error("illegal authentication parameter: {0}")]
    IllegalParameter(&'static str),
}

struct Group {
    n: BigUint,
    g: BigUint,
}

impl Group {
    fn standard() -> Self {
        Self { n: BigUint::from_bytes_be(&GROUP_PRIME), g: BigUint::from(GENERATOR) }
    }
}

fn sha1_parts(parts: &[&[u8]]) -> [u8; PROOF_LEN] {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Left-pad the big-endian magnitude of `value` to the group length.
fn pad(value: &BigUint) -> [u8; GROUP_LEN] {
    let bytes = value.to_bytes_be();
    let mut out = [0u8; GROUP_LEN];
    let offset = GROUP_LEN.saturating_sub(bytes.len());
    out[offset..].copy_from_slice(&bytes[bytes.len().saturating_sub(GROUP_LEN)..]);
    out
}

/// `k = H(N || PAD(g))`, the SRP-6a multiplier.
fn compute_k(group: &Group) -> BigUint {
    BigUint::from_bytes_be(&sha1_parts(&[&GROUP_PRIME, &pad(&group.g)]))
}

/// `x = H(salt || H(username ":" password))`.
fn compute_x(salt: &[u8], username: &str, password: &str) -> BigUint {
    let inner = sha1_parts(&[username.as_bytes(), b":", password.as_bytes()]);
    BigUint::from_bytes_be(&sha1_parts(&[salt, &inner]))
}

/// `u = H(PAD(A) || PAD(B))`, the scrambling parameter.
fn compute_u(client_public: &BigUint, server_public: &BigUint) -> BigUint {
    BigUint::from_bytes_be(&sha1_parts(&[&pad(client_public), &pad(server_public)]))
}

/// `M1 = H((H(N) xor H(g)) || H(username) || salt || PAD(A) || PAD(B) || K)`.
fn compute_m1(
    group: &Group,
    username: &str,
    salt: &[u8],
    client_public: &BigUint,
    server_public: &BigUint,
    key: &[u8],
) -> [u8; PROOF_LEN] {
    let hn = sha1_parts(&[&GROUP_PRIME]);
    let hg = sha1_parts(&[&group.g.to_bytes_be()]);
    let mut hn_xor_hg = [0u8; PROOF_LEN];
    for (out, (a, b)) in hn_xor_hg.iter_mut().zip(hn.iter().zip(hg.iter())) {
        *out = a ^ b;
    }

    let hu = sha1_parts(&[username.as_bytes()]);
    sha1_parts(&[&hn_xor_hg, &hu, salt, &pad(client_public), &pad(server_public), key])
}

/// `M2 = H(PAD(A) || M1 || K)`.
fn compute_m2(client_public: &BigUint, m1: &[u8], key: &[u8]) -> [u8; PROOF_LEN] {
    sha1_parts(&[&pad(client_public), m1, key])
}

/// Client half of the exchange.
pub struct SrpClient {
    group: Group,
    username: String,
    password: String,
    secret: BigUint,
    public: BigUint,
}

impl SrpClient {
    /// Start an exchange with the caller-supplied ephemeral secret `a`.
    #[must_use]
    pub fn new(username: &str, password: &str, secret: &[u8]) -> Self {
        let group = Group::standard();
        let secret = BigUint::from_bytes_be(secret);
        let public = group.g.modpow(&secret, &group.n);
        Self { group, username: username.to_owned(), password: password.to_owned(), secret, public }
    }

    /// Ephemeral public key `A`, padded to the group length.
    #[must_use]
    pub fn public_key(&self) -> Vec<u8> {
        pad(&self.public).to_vec()
    }

    /// Consume the station's challenge and produce the evidence to send.
    ///
    /// `generator` and `modulus` are checked against the supported group;
    /// both trimmed and zero-padded encodings are accepted.
    pub fn process_challenge(
        &self,
        salt: &[u8],
        generator: &[u8],
        modulus: &[u8],
        server_public: &[u8],
    ) -> Result<SrpClientVerifier, SrpError> {
        if BigUint::from_bytes_be(modulus) != self.group.n {
            return Err(SrpError::IllegalParameter("modulus is not the supported group"));
        }
        if BigUint::from_bytes_be(generator) != self.group.g {
            return Err(SrpError::IllegalParameter("generator is not the supported group"));
        }

        let server_public = BigUint::from_bytes_be(server_public);
        if (&server_public % &self.group.n).bits() == 0 {
            return Err(SrpError::IllegalParameter("server public key is zero mod N"));
        }

        let k = compute_k(&self.group);
        let x = compute_x(salt, &self.username, &self.password);
        let u = compute_u(&self.public, &server_public);

        // S = (B - k * g^x) ^ (a + u * x) mod N
        let gx = self.group.g.modpow(&x, &self.group.n);
        let kgx = (k * gx) % &self.group.n;
        let base = (&server_public + &self.group.n - kgx) % &self.group.n;
        let exponent = &self.secret + u * x;
        let shared = base.modpow(&exponent, &self.group.n);

        let key = sha1_parts(&[&pad(&shared)]);
        let m1 = compute_m1(&self.group, &self.username, salt, &self.public, &server_public, &key);
        let m2 = compute_m2(&self.public, &m1, &key);

        Ok(SrpClientVerifier { key: Zeroizing::new(key), m1, expected_m2: m2 })
    }
}

/// Client state between sending `M1` and checking the station's `M2`.
pub struct SrpClientVerifier {
    key: Zeroizing<[u8; PROOF_LEN]>,
    m1: [u8; PROOF_LEN],
    expected_m2: [u8; PROOF_LEN],
}

impl SrpClientVerifier {
    /// Evidence `M1` to send to the station.
    #[must_use]
    pub fn proof(&self) -> &[u8] {
        &self.m1
    }

    /// Check the station's evidence; on success the shared secret hash is
    /// released for key derivation.
    pub fn verify_server(&self, server_proof: &[u8]) -> Result<&[u8], SrpError> {
        if server_proof != self.expected_m2.as_slice() {
            return Err(SrpError::ProofMismatch);
        }
        Ok(self.key.as_slice())
    }
}

/// Station half of the exchange.
///
/// Built fresh per handshake from the account password, a salt (random
/// per handshake unless an account record pins one) and the ephemeral
/// secret `b`.
pub struct SrpServer {
    group: Group,
    username: String,
    salt: Vec<u8>,
    verifier: BigUint,
    secret: BigUint,
    public: BigUint,
}

impl SrpServer {
    /// Start an exchange with the caller-supplied ephemeral secret `b`.
    #[must_use]
    pub fn new(username: &str, password: &str, salt: Vec<u8>, secret: &[u8]) -> Self {
        let group = Group::standard();
        let x = compute_x(&salt, username, password);
        let verifier = group.g.modpow(&x, &group.n);

        let secret = BigUint::from_bytes_be(secret);
        let k = compute_k(&group);
        let public = (k * &verifier + group.g.modpow(&secret, &group.n)) % &group.n;

        Self { group, username: username.to_owned(), salt, verifier, secret, public }
    }

    /// Salt sent in the challenge.
    #[must_use]
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// Ephemeral public key `B`, padded to the group length.
    #[must_use]
    pub fn public_key(&self) -> Vec<u8> {
        pad(&self.public).to_vec()
    }

    /// Group generator in trimmed big-endian form.
    #[must_use]
    pub fn generator(&self) -> Vec<u8> {
        self.group.g.to_bytes_be()
    }

    /// Group modulus in trimmed big-endian form.
    #[must_use]
    pub fn modulus(&self) -> Vec<u8> {
        self.group.n.to_bytes_be()
    }

    /// Check the client's evidence and produce ours.
    pub fn verify_client(
        &self,
        client_public: &[u8],
        client_proof: &[u8],
    ) -> Result<SrpServerVerified, SrpError> {
        let client_public = BigUint::from_bytes_be(client_public);
        if (&client_public % &self.group.n).bits() == 0 {
            return Err(SrpError::IllegalParameter("client public key is zero mod N"));
        }

        let u = compute_u(&client_public, &self.public);

        // S = (A * v^u) ^ b mod N
        let vu = self.verifier.modpow(&u, &self.group.n);
        let shared = (&client_public * vu).modpow(&self.secret, &self.group.n);

        let key = sha1_parts(&[&pad(&shared)]);
        let expected_m1 =
            compute_m1(&self.group, &self.username, &self.salt, &client_public, &self.public, &key);

        if client_proof != expected_m1.as_slice() {
            return Err(SrpError::ProofMismatch);
        }

        let m2 = compute_m2(&client_public, &expected_m1, &key);
        Ok(SrpServerVerified { key: Zeroizing::new(key), proof: m2 })
    }
}

/// Station state after a successful client verification.
pub struct SrpServerVerified {
    key: Zeroizing<[u8; PROOF_LEN]>,
    proof: [u8; PROOF_LEN],
}

impl std::fmt::Debug for SrpServerVerified {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SrpServerVerified").finish_non_exhaustive()
    }
}

impl SrpServerVerified {
    /// Shared secret hash, equal to the client's.
    #[must_use]
    pub fn session_key(&self) -> &[u8] {
        self.key.as_slice()
    }

    /// Evidence `M2` to send back to the client.
    #[must_use]
    pub fn proof(&self) -> &[u8] {
        &self.proof
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handshake(
        client_password: &str,
        server_password: &str,
    ) -> (SrpClient, SrpServer, Result<SrpServerVerified, SrpError>, SrpClientVerifier) {
        let client = SrpClient::new(USERNAME, client_password, &[0x13u8; 32]);
        let server =
            SrpServer::new(USERNAME, server_password, vec![0x42u8; 16], &[0x37u8; 32]);

        let verifier = client
            .process_challenge(
                server.salt(),
                &server.generator(),
                &server.modulus(),
                &server.public_key(),
            )
            .unwrap();

        let outcome = server.verify_client(&client.public_key(), verifier.proof());
        (client, server, outcome, verifier)
    }

    #[test]
    fn matching_passwords_agree_on_the_key() {
        let (_, _, outcome, verifier) = handshake("hunter2", "hunter2");
        let verified = outcome.unwrap();

        let client_key = verifier.verify_server(verified.proof()).unwrap();
        assert_eq!(client_key, verified.session_key());
        assert_eq!(client_key.len(), PROOF_LEN);
    }

    #[test]
    fn wrong_password_fails_at_the_server() {
        let (_, _, outcome, _) = handshake("hunter2", "letmein");
        assert_eq!(outcome.unwrap_err(), SrpError::ProofMismatch);
    }

    #[test]
    fn tampered_server_proof_fails_at_the_client() {
        let (_, _, outcome, verifier) = handshake("hunter2", "hunter2");
        let verified = outcome.unwrap();

        let mut bad = verified.proof().to_vec();
        bad[0] ^= 0xFF;
        assert_eq!(verifier.verify_server(&bad).unwrap_err(), SrpError::ProofMismatch);
    }

    #[test]
    fn padded_and_trimmed_parameters_are_equivalent() {
        let client = SrpClient::new(USERNAME, "pw", &[5u8; 32]);
        let server = SrpServer::new(USERNAME, "pw", vec![9u8; 16], &[7u8; 32]);

        // Zero-pad the generator the way some peers do
        let mut padded_generator = vec![0u8; 3];
        padded_generator.extend_from_slice(&server.generator());

        let trimmed = client
            .process_challenge(
                server.salt(),
                &server.generator(),
                &server.modulus(),
                &server.public_key(),
            )
            .unwrap();
        let padded = client
            .process_challenge(
                server.salt(),
                &padded_generator,
                &server.modulus(),
                &server.public_key(),
            )
            .unwrap();

        assert_eq!(trimmed.proof(), padded.proof());
    }

    #[test]
    fn foreign_group_is_rejected() {
        let client = SrpClient::new(USERNAME, "pw", &[5u8; 32]);
        let server = SrpServer::new(USERNAME, "pw", vec![9u8; 16], &[7u8; 32]);

        let result = client.process_challenge(
            server.salt(),
            &server.generator(),
            &[0xFFu8; 192],
            &server.public_key(),
        );
        assert!(matches!(result, Err(SrpError::IllegalParameter(_))));
    }

    #[test]
    fn zero_public_keys_are_rejected() {
        let client = SrpClient::new(USERNAME, "pw", &[5u8; 32]);
        let server = SrpServer::new(USERNAME, "pw", vec![9u8; 16], &[7u8; 32]);

        let challenge = client.process_challenge(
            server.salt(),
            &server.generator(),
            &server.modulus(),
            &[0u8; 192],
        );
        assert!(matches!(challenge, Err(SrpError::IllegalParameter(_))));

        let verify = server.verify_client(&[0u8; 192], &[0u8; PROOF_LEN]);
        assert!(matches!(verify, Err(SrpError::IllegalParameter(_))));
    }

    #[test]
    fn different_ephemerals_give_different_public_keys() {
        let a = SrpClient::new(USERNAME, "pw", &[1u8; 32]);
        let b = SrpClient::new(USERNAME, "pw", &[2u8; 32]);
        assert_ne!(a.public_key(), b.public_key());
    }
}
