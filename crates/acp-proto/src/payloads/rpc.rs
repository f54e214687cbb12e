//! Remote procedure call payloads.

use crate::cflbinary::{PlistError, Value};

/// RPC request body: `{function, inputs}`.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    /// Name of the remote function.
    pub function: String,
    /// Argument dictionary.
    pub inputs: Value,
}

impl RpcRequest {
    /// Serialize to a plist document.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        Value::dict(vec![
            ("function", Value::from(self.function.as_str())),
            ("inputs", self.inputs.clone()),
        ])
        .compose()
    }

    /// Parse from a plist document.
    pub fn decode(document: &[u8]) -> Result<Self, PlistError> {
        let value = Value::parse(document)?;
        let function = value
            .require("function")?
            .as_str()
            .ok_or(PlistError::UnexpectedShape("string function name"))?
            .to_owned();
        let inputs = value.require("inputs")?.clone();
        Ok(Self { function, inputs })
    }
}

/// RPC response body: `{status, outputs}`.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    /// Zero on success; anything else is a remote failure code.
    pub status: u64,
    /// Result dictionary.
    pub outputs: Value,
}

impl RpcResponse {
    /// Serialize to a plist document.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        Value::dict(vec![
            ("status", Value::Integer(self.status)),
            ("outputs", self.outputs.clone()),
        ])
        .compose()
    }

    /// Parse from a plist document. Both keys are required; a body
    /// missing either is malformed, not a failure status.
    pub fn decode(document: &[u8]) -> Result<Self, PlistError> {
        let value = Value::parse(document)?;
        let status = value
            .require("status")?
            .as_u64()
            .ok_or(PlistError::UnexpectedShape("integer status"))?;
        let outputs = value.require("outputs")?.clone();
        Ok(Self { status, outputs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trip() {
        let request = RpcRequest {
            function: "wifi.scan".to_owned(),
            inputs: Value::dict(vec![("band", Value::Integer(5))]),
        };
        assert_eq!(RpcRequest::decode(&request.encode()).unwrap(), request);
    }

    #[test]
    fn response_round_trip() {
        let response = RpcResponse {
            status: 0,
            outputs: Value::dict(vec![("count", Value::Integer(3))]),
        };
        assert_eq!(RpcResponse::decode(&response.encode()).unwrap(), response);
    }

    #[test]
    fn missing_status_is_malformed() {
        let document = Value::dict(vec![("outputs", Value::dict(vec![]))]).compose();
        assert_eq!(RpcResponse::decode(&document), Err(PlistError::MissingKey("status")));
    }

    #[test]
    fn missing_outputs_is_malformed() {
        let document = Value::dict(vec![("status", Value::Integer(0))]).compose();
        assert_eq!(RpcResponse::decode(&document), Err(PlistError::MissingKey("outputs")));
    }
}
