//! Station side of the authentication exchange.
//!
//! Tracks the SRP state between the client's hello and its proof. A
//! failed proof answers with the retryable incorrect-password code and
//! resets the state, so the client may try again on the same socket.

use acp_crypto::srp::{self, SrpError, SrpServer};
use acp_proto::{
    cflbinary::PlistError,
    payloads::auth::{AuthConfirm, AuthHello, AuthParams, AuthProof, STATE_HELLO, STATE_PROOF, payload_state},
};
use rand::RngCore;

/// Length of the station's ephemeral SRP secret.
const EPHEMERAL_LEN: usize = 32;

/// Length of the per-account salt.
const SALT_LEN: usize = 16;

/// Length of a session cipher IV.
const IV_LEN: usize = 16;

/// What the dispatch loop should do with an authenticate body.
pub(crate) enum AuthStep {
    /// Send this plist body back with a zero error code.
    Reply(Vec<u8>),
    /// Send an empty reply carrying the incorrect-password code.
    Reject,
    /// Send `body`, then install server-role encryption with these
    /// parameters.
    Accept {
        /// Confirmation body (station proof and IV).
        body: Vec<u8>,
        /// SRP shared secret hash.
        key: Vec<u8>,
        /// IV the client chose for its direction.
        client_iv: [u8; IV_LEN],
        /// IV this station chose for its direction.
        server_iv: [u8; IV_LEN],
    },
}

/// Per-connection authentication state machine.
pub(crate) struct Authenticator {
    password: String,
    pending: Option<SrpServer>,
}

impl Authenticator {
    pub(crate) fn new(password: String) -> Self {
        Self { password, pending: None }
    }

    /// Process one authenticate body.
    pub(crate) fn handle(&mut self, body: &[u8]) -> Result<AuthStep, PlistError> {
        match payload_state(body)? {
            STATE_HELLO => self.handle_hello(body),
            STATE_PROOF => Ok(self.handle_proof(body)?),
            other => {
                tracing::warn!(state = other, "unknown authenticate state");
                Ok(AuthStep::Reject)
            },
        }
    }

    fn handle_hello(&mut self, body: &[u8]) -> Result<AuthStep, PlistError> {
        let hello = AuthHello::decode(body)?;
        if hello.username != srp::USERNAME {
            tracing::warn!(username = %hello.username, "unexpected account name");
        }

        let mut rng = rand::thread_rng();
        let mut salt = vec![0u8; SALT_LEN];
        rng.fill_bytes(&mut salt);
        let mut secret = [0u8; EPHEMERAL_LEN];
        rng.fill_bytes(&mut secret);

        let server = SrpServer::new(srp::USERNAME, &self.password, salt, &secret);
        let params = AuthParams {
            salt: server.salt().to_vec(),
            generator: server.generator(),
            public_key: server.public_key(),
            modulus: server.modulus(),
        };
        self.pending = Some(server);
        Ok(AuthStep::Reply(params.encode()))
    }

    fn handle_proof(&mut self, body: &[u8]) -> Result<AuthStep, PlistError> {
        let proof = AuthProof::decode(body)?;

        let Some(server) = self.pending.take() else {
            tracing::warn!("proof received without a preceding hello");
            return Ok(AuthStep::Reject);
        };

        let Ok(client_iv) = <[u8; IV_LEN]>::try_from(proof.iv.as_slice()) else {
            tracing::warn!(len = proof.iv.len(), "client IV has the wrong length");
            return Ok(AuthStep::Reject);
        };

        match server.verify_client(&proof.public_key, &proof.response) {
            Ok(verified) => {
                let mut server_iv = [0u8; IV_LEN];
                rand::thread_rng().fill_bytes(&mut server_iv);

                let confirm = AuthConfirm {
                    response: verified.proof().to_vec(),
                    iv: server_iv.to_vec(),
                };
                Ok(AuthStep::Accept {
                    body: confirm.encode(),
                    key: verified.session_key().to_vec(),
                    client_iv,
                    server_iv,
                })
            },
            Err(SrpError::ProofMismatch) => {
                tracing::info!("client proof rejected");
                Ok(AuthStep::Reject)
            },
            Err(err) => {
                tracing::warn!(%err, "unusable client parameters");
                Ok(AuthStep::Reject)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use acp_crypto::srp::SrpClient;

    use super::*;

    fn run_hello(auth: &mut Authenticator) -> AuthParams {
        let hello = AuthHello { username: srp::USERNAME.to_owned() }.encode();
        match auth.handle(&hello).unwrap() {
            AuthStep::Reply(body) => AuthParams::decode(&body).unwrap(),
            _ => unreachable!("hello must produce a challenge"),
        }
    }

    #[test]
    fn full_exchange_converges_on_one_key() {
        let mut auth = Authenticator::new("testing".to_owned());
        let params = run_hello(&mut auth);

        let client = SrpClient::new(srp::USERNAME, "testing", &[0x21u8; 32]);
        let verifier = client
            .process_challenge(&params.salt, &params.generator, &params.modulus, &params.public_key)
            .unwrap();

        let proof = AuthProof {
            public_key: client.public_key(),
            response: verifier.proof().to_vec(),
            iv: vec![0x31u8; IV_LEN],
        }
        .encode();

        match auth.handle(&proof).unwrap() {
            AuthStep::Accept { body, key, client_iv, .. } => {
                assert_eq!(client_iv, [0x31u8; IV_LEN]);
                let confirm = AuthConfirm::decode(&body).unwrap();
                let client_key = verifier.verify_server(&confirm.response).unwrap();
                assert_eq!(client_key, key.as_slice());
            },
            _ => unreachable!("matching password must be accepted"),
        }
    }

    #[test]
    fn wrong_password_is_rejected_and_retryable() {
        let mut auth = Authenticator::new("testing".to_owned());
        let params = run_hello(&mut auth);

        let client = SrpClient::new(srp::USERNAME, "wrong", &[0x21u8; 32]);
        let verifier = client
            .process_challenge(&params.salt, &params.generator, &params.modulus, &params.public_key)
            .unwrap();

        let proof = AuthProof {
            public_key: client.public_key(),
            response: verifier.proof().to_vec(),
            iv: vec![0u8; IV_LEN],
        }
        .encode();

        assert!(matches!(auth.handle(&proof).unwrap(), AuthStep::Reject));

        // The state machine accepts a fresh hello afterwards
        let _ = run_hello(&mut auth);
    }

    #[test]
    fn proof_without_hello_is_rejected() {
        let mut auth = Authenticator::new("testing".to_owned());
        let proof = AuthProof {
            public_key: vec![1u8; 192],
            response: vec![2u8; 20],
            iv: vec![0u8; IV_LEN],
        }
        .encode();
        assert!(matches!(auth.handle(&proof).unwrap(), AuthStep::Reject));
    }
}
