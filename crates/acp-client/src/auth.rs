//! Client side of the authentication exchange.
//!
//! Runs the whole SRP flow inside one session exchange: hello, challenge,
//! proof, confirmation, then installs session encryption with the derived
//! secret and the two handshake IVs. An incorrect password comes back as
//! a retryable error on the same socket; a station that fails proof
//! verification is fatal and requires a reconnect.

use acp_crypto::srp::{self, SrpClient};
use acp_proto::{
    Command, Message,
    payloads::auth::{AuthConfirm, AuthHello, AuthParams, AuthProof},
    status,
};
use acp_session::Exchange;
use rand::RngCore;

use crate::error::ClientError;

/// Length of the caller-generated ephemeral SRP secret.
const EPHEMERAL_LEN: usize = 32;

/// Length of a session cipher IV.
const IV_LEN: usize = 16;

fn auth_body(message: &Message) -> Result<&[u8], ClientError> {
    if message.command != Command::Authenticate {
        return Err(ClientError::UnexpectedCommand {
            expected: Command::Authenticate,
            got: message.command,
        });
    }
    if message.error_code == status::INCORRECT_PASSWORD {
        return Err(ClientError::IncorrectPassword);
    }
    if message.error_code != 0 {
        return Err(ClientError::ErrorCode(message.error_code));
    }
    message.body.as_deref().ok_or(ClientError::InvalidResponse("authenticate reply has no body"))
}

/// Run the SRP exchange on `exchange` and enable session encryption.
pub(crate) async fn authenticate(
    exchange: &mut Exchange<'_>,
    password: &str,
) -> Result<(), ClientError> {
    let mut rng = rand::thread_rng();

    let mut secret = [0u8; EPHEMERAL_LEN];
    rng.fill_bytes(&mut secret);
    let client = SrpClient::new(srp::USERNAME, password, &secret);

    let hello = AuthHello { username: srp::USERNAME.to_owned() };
    exchange.send(&Message::authenticate(hello.encode())).await?;

    let challenge = exchange.receive_message().await?;
    let params = AuthParams::decode(auth_body(&challenge)?)?;
    let verifier = client.process_challenge(
        &params.salt,
        &params.generator,
        &params.modulus,
        &params.public_key,
    )?;

    let mut client_iv = [0u8; IV_LEN];
    rng.fill_bytes(&mut client_iv);

    let proof = AuthProof {
        public_key: client.public_key(),
        response: verifier.proof().to_vec(),
        iv: client_iv.to_vec(),
    };
    exchange.send(&Message::authenticate(proof.encode())).await?;

    let confirmation = exchange.receive_message().await?;
    let confirm = AuthConfirm::decode(auth_body(&confirmation)?)?;

    let key = verifier.verify_server(&confirm.response)?;
    let server_iv: [u8; IV_LEN] = confirm
        .iv
        .as_slice()
        .try_into()
        .map_err(|_| ClientError::InvalidResponse("station IV has the wrong length"))?;

    exchange.enable_encryption(key, &client_iv, &server_iv)?;
    tracing::info!("authenticated; session encryption active");
    Ok(())
}
