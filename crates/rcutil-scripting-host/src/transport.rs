use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::{response_id, ProtocolError, TransportError};

/// Carries a single callback invocation to a script process.
///
/// Implementations block until the script answers or the call fails.
pub trait Transport: Send + Sync {
    fn invoke(&self, address: &str, method: &str, args: &Value) -> Result<Value, TransportError>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn invoke(&self, address: &str, method: &str, args: &Value) -> Result<Value, TransportError> {
        (**self).invoke(address, method, args)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn invoke(&self, address: &str, method: &str, args: &Value) -> Result<Value, TransportError> {
        (**self).invoke(address, method, args)
    }
}

// ============================================================================
// JSON-RPC envelope
// ============================================================================

/// Outgoing JSON-RPC 2.0 request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Value,
    pub id: String,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Value, id: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
            id: id.into(),
        }
    }
}

/// Incoming JSON-RPC 2.0 response, either a result or an error
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    pub id: Option<String>,
    pub outcome: Result<Value, ProtocolError>,
}

impl RpcResponse {
    /// Decode a raw response body.
    ///
    /// An `error` member becomes a [`TransportError::Protocol`]; a body that is
    /// neither a result nor an error is a fault.
    pub fn parse(raw: &str) -> Result<Self, TransportError> {
        let value: Value = serde_json::from_str(raw).context("response is not valid JSON")?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, TransportError> {
        if value.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            return Err(anyhow!("response is missing jsonrpc version").into());
        }
        let id = response_id(&value);

        if value.get("error").is_some() {
            let error = ProtocolError::from_response(&value)
                .ok_or_else(|| anyhow!("malformed error object in response"))?;
            return Ok(Self {
                id,
                outcome: Err(error),
            });
        }

        match value.get("result") {
            Some(result) => Ok(Self {
                id,
                outcome: Ok(result.clone()),
            }),
            None => Err(anyhow!("response has neither result nor error").into()),
        }
    }

    /// Collapse into the transport call result
    pub fn into_result(self) -> Result<Value, TransportError> {
        self.outcome.map_err(TransportError::Protocol)
    }
}

/// Generates request ids for outgoing calls
#[derive(Debug, Default)]
pub struct RequestIds {
    next: AtomicU64,
}

impl RequestIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        self.next.fetch_add(1, Ordering::Relaxed).to_string()
    }
}

// ============================================================================
// Logging transport
// ============================================================================

/// Transport that logs every request it would send and answers with an
/// empty result. Used for dry runs of the tick loop.
#[derive(Debug, Default)]
pub struct LoggingTransport {
    ids: RequestIds,
}

impl LoggingTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for LoggingTransport {
    fn invoke(&self, address: &str, method: &str, args: &Value) -> Result<Value, TransportError> {
        let request = RpcRequest::new(method, args.clone(), self.ids.next_id());
        let body = serde_json::to_string(&request).context("failed to encode request")?;
        info!(target: "transport", "-> {}: {}", address, body);
        Ok(Value::Object(Default::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let request = RpcRequest::new("onTick", json!({}), "3");
        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(
            encoded,
            json!({"jsonrpc": "2.0", "method": "onTick", "params": {}, "id": "3"})
        );
    }

    #[test]
    fn test_parse_result() {
        let response = RpcResponse::parse(r#"{"jsonrpc":"2.0","result":{"ok":true},"id":"1"}"#).unwrap();
        assert_eq!(response.id.as_deref(), Some("1"));
        assert_eq!(response.into_result().unwrap(), json!({"ok": true}));
    }

    #[test]
    fn test_parse_numeric_id() {
        let response = RpcResponse::parse(r#"{"jsonrpc":"2.0","result":{},"id":7}"#).unwrap();
        assert_eq!(response.id.as_deref(), Some("7"));

        let raw = r#"{"jsonrpc":"2.0","error":{"code":-5,"message":"Script not found"},"id":8}"#;
        let response = RpcResponse::parse(raw).unwrap();
        assert_eq!(response.id.as_deref(), Some("8"));
        assert_eq!(response.outcome.unwrap_err().id(), Some("8"));
    }

    #[test]
    fn test_parse_error_is_protocol_error() {
        let raw = r#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"Method not found"},"id":"2"}"#;
        let err = RpcResponse::parse(raw).unwrap().into_result().unwrap_err();
        match err {
            TransportError::Protocol(e) => {
                assert_eq!(e, ProtocolError::METHOD_NOT_FOUND);
                assert_eq!(e.id(), Some("2"));
            }
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_garbage_is_fault() {
        assert!(matches!(
            RpcResponse::parse("not json"),
            Err(TransportError::Fault(_))
        ));
        assert!(matches!(
            RpcResponse::parse(r#"{"jsonrpc":"2.0","id":"1"}"#),
            Err(TransportError::Fault(_))
        ));
    }

    #[test]
    fn test_logging_transport_returns_empty_object() {
        let transport = LoggingTransport::new();
        let result = transport.invoke("127.0.0.1:1", "tick", &json!({})).unwrap();
        assert_eq!(result, json!({}));
    }

    #[test]
    fn test_request_ids_increase() {
        let ids = RequestIds::new();
        assert_eq!(ids.next_id(), "0");
        assert_eq!(ids.next_id(), "1");
    }
}
