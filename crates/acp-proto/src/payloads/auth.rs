//! Authentication exchange payloads.
//!
//! The SRP handshake rides inside `Authenticate` messages whose bodies
//! are plist dictionaries. Client-originated payloads carry a `state`
//! discriminant (1 for the opening hello, 3 for the proof); the station's
//! replies are identified by position in the exchange and carry no state
//! key.

use crate::cflbinary::{PlistError, Value};

/// State value of the opening client payload.
pub const STATE_HELLO: u64 = 1;

/// State value of the client proof payload.
pub const STATE_PROOF: u64 = 3;

/// Read the `state` discriminant of a client-originated payload.
pub fn payload_state(document: &[u8]) -> Result<u64, PlistError> {
    let value = Value::parse(document)?;
    value.require("state")?.as_u64().ok_or(PlistError::UnexpectedShape("integer state"))
}

fn require_data(value: &Value, key: &'static str) -> Result<Vec<u8>, PlistError> {
    value
        .require(key)?
        .as_data()
        .map(<[u8]>::to_vec)
        .ok_or(PlistError::UnexpectedShape("data value"))
}

/// Opening client payload: `{state: 1, username}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHello {
    /// Account name; always `"admin"` on current firmware.
    pub username: String,
}

impl AuthHello {
    /// Serialize to a plist document.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        Value::dict(vec![
            ("state", Value::Integer(STATE_HELLO)),
            ("username", Value::from(self.username.as_str())),
        ])
        .compose()
    }

    /// Parse from a plist document.
    pub fn decode(document: &[u8]) -> Result<Self, PlistError> {
        let value = Value::parse(document)?;
        let username = value
            .require("username")?
            .as_str()
            .ok_or(PlistError::UnexpectedShape("string username"))?
            .to_owned();
        Ok(Self { username })
    }
}

/// Station reply to the hello: group parameters and its public key.
///
/// `generator` and `modulus` are big-endian magnitude bytes; peers may
/// send them zero-padded, so consumers must treat them as integers, not
/// compare them bytewise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthParams {
    /// Per-account random salt.
    pub salt: Vec<u8>,
    /// Group generator as big-endian bytes.
    pub generator: Vec<u8>,
    /// Station's ephemeral public key `B`.
    pub public_key: Vec<u8>,
    /// Group modulus as big-endian bytes.
    pub modulus: Vec<u8>,
}

impl AuthParams {
    /// Serialize to a plist document.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        Value::dict(vec![
            ("salt", Value::Data(self.salt.clone())),
            ("generator", Value::Data(self.generator.clone())),
            ("publicKey", Value::Data(self.public_key.clone())),
            ("modulus", Value::Data(self.modulus.clone())),
        ])
        .compose()
    }

    /// Parse from a plist document.
    pub fn decode(document: &[u8]) -> Result<Self, PlistError> {
        let value = Value::parse(document)?;
        Ok(Self {
            salt: require_data(&value, "salt")?,
            generator: require_data(&value, "generator")?,
            public_key: require_data(&value, "publicKey")?,
            modulus: require_data(&value, "modulus")?,
        })
    }
}

/// Client proof payload: `{state: 3, publicKey, response, iv}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthProof {
    /// Client's ephemeral public key `A`.
    pub public_key: Vec<u8>,
    /// Client evidence `M1`.
    pub response: Vec<u8>,
    /// Client-to-station cipher IV, chosen fresh per handshake.
    pub iv: Vec<u8>,
}

impl AuthProof {
    /// Serialize to a plist document.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        Value::dict(vec![
            ("state", Value::Integer(STATE_PROOF)),
            ("publicKey", Value::Data(self.public_key.clone())),
            ("response", Value::Data(self.response.clone())),
            ("iv", Value::Data(self.iv.clone())),
        ])
        .compose()
    }

    /// Parse from a plist document.
    pub fn decode(document: &[u8]) -> Result<Self, PlistError> {
        let value = Value::parse(document)?;
        Ok(Self {
            public_key: require_data(&value, "publicKey")?,
            response: require_data(&value, "response")?,
            iv: require_data(&value, "iv")?,
        })
    }
}

/// Station confirmation: `{response: M2, iv}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfirm {
    /// Station evidence `M2`.
    pub response: Vec<u8>,
    /// Station-to-client cipher IV.
    pub iv: Vec<u8>,
}

impl AuthConfirm {
    /// Serialize to a plist document.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        Value::dict(vec![
            ("response", Value::Data(self.response.clone())),
            ("iv", Value::Data(self.iv.clone())),
        ])
        .compose()
    }

    /// Parse from a plist document.
    pub fn decode(document: &[u8]) -> Result<Self, PlistError> {
        let value = Value::parse(document)?;
        Ok(Self {
            response: require_data(&value, "response")?,
            iv: require_data(&value, "iv")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_round_trip() {
        let hello = AuthHello { username: "admin".to_owned() };
        let document = hello.encode();

        assert_eq!(payload_state(&document).unwrap(), STATE_HELLO);
        assert_eq!(AuthHello::decode(&document).unwrap(), hello);
    }

    #[test]
    fn params_round_trip() {
        let params = AuthParams {
            salt: vec![1u8; 16],
            generator: vec![2],
            public_key: vec![3u8; 192],
            modulus: vec![4u8; 192],
        };
        assert_eq!(AuthParams::decode(&params.encode()).unwrap(), params);
    }

    #[test]
    fn proof_round_trip() {
        let proof = AuthProof {
            public_key: vec![5u8; 192],
            response: vec![6u8; 20],
            iv: vec![7u8; 16],
        };
        let document = proof.encode();

        assert_eq!(payload_state(&document).unwrap(), STATE_PROOF);
        assert_eq!(AuthProof::decode(&document).unwrap(), proof);
    }

    #[test]
    fn confirm_round_trip() {
        let confirm = AuthConfirm { response: vec![8u8; 20], iv: vec![9u8; 16] };
        assert_eq!(AuthConfirm::decode(&confirm.encode()).unwrap(), confirm);
    }

    #[test]
    fn missing_key_is_an_error() {
        let document = Value::dict(vec![("state", Value::Integer(1))]).compose();
        assert_eq!(AuthHello::decode(&document), Err(PlistError::MissingKey("username")));
    }
}
