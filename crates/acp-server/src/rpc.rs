//! Remote procedure dispatch seam.

use acp_proto::{Value, payloads::rpc::RpcResponse};

/// Application hook answering RPC bodies.
///
/// The test station ships with [`NullRpcHandler`]; deployments with real
/// remote procedures implement this and hand it to the server at
/// construction.
pub trait RpcHandler: Send + Sync + 'static {
    /// Answer one call. Failures are expressed as a non-zero status in
    /// the response, not as a Rust error: the wire protocol has no other
    /// channel for them.
    fn call(&self, function: &str, inputs: &Value) -> RpcResponse;
}

/// Default handler: every call succeeds with empty outputs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRpcHandler;

impl RpcHandler for NullRpcHandler {
    fn call(&self, function: &str, _inputs: &Value) -> RpcResponse {
        tracing::debug!(function, "answering rpc with empty outputs");
        RpcResponse { status: 0, outputs: Value::dict(vec![]) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_handler_always_succeeds() {
        let handler = NullRpcHandler;
        let response = handler.call("anything", &Value::dict(vec![]));
        assert_eq!(response.status, 0);
    }
}
