//! JSON-RPC wire types and inbound payload parsing.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::rpc::errors::ProxyError;

/// JSON-RPC protocol version accepted and emitted by the proxy.
pub const JSONRPC_VERSION: &str = "2.0";

/// A single JSON-RPC call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

impl RpcRequest {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: id.into(),
        }
    }

    /// Structural checks applied to every element before routing.
    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.jsonrpc != JSONRPC_VERSION {
            return Err(ProxyError::InvalidRequest("invalid JSON-RPC version".into()));
        }
        if self.method.is_empty() {
            return Err(ProxyError::InvalidRequest("no method specified".into()));
        }
        Ok(())
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A single JSON-RPC response.
///
/// `result` may legitimately be `null`, so serialization picks between
/// `result` and `error` explicitly instead of skipping nulls.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<RpcError>,
    #[serde(default)]
    pub id: Value,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result,
            error: None,
            id,
        }
    }

    pub fn error(id: Value, error: &ProxyError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Value::Null,
            error: Some(error.to_rpc_error()),
            id,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl Serialize for RpcResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("RpcResponse", 3)?;
        state.serialize_field("jsonrpc", &self.jsonrpc)?;
        match &self.error {
            Some(error) => state.serialize_field("error", error)?,
            None => state.serialize_field("result", &self.result)?,
        }
        state.serialize_field("id", &self.id)?;
        state.end()
    }
}

/// One element of an inbound batch: either a well-formed call or the error
/// that rejected it at parse time, along with whatever id could be salvaged.
#[derive(Debug, Clone)]
pub enum BatchElement {
    Call(RpcRequest),
    Invalid { id: Value, error: ProxyError },
}

/// Parsed inbound body. Cardinality is preserved so the response mirrors it.
#[derive(Debug, Clone)]
pub enum RpcPayload {
    Single(BatchElement),
    Batch(Vec<BatchElement>),
}

impl RpcPayload {
    /// Decode an inbound body as either a single call or an array of calls.
    pub fn parse(body: &[u8]) -> Result<Self, ProxyError> {
        let value: Value = serde_json::from_slice(body).map_err(|_| ProxyError::Parse)?;
        match value {
            Value::Array(items) => Ok(Self::Batch(items.into_iter().map(parse_element).collect())),
            Value::Object(_) => Ok(Self::Single(parse_element(value))),
            _ => Err(ProxyError::Parse),
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, Self::Batch(_))
    }

    pub fn into_elements(self) -> Vec<BatchElement> {
        match self {
            Self::Single(element) => vec![element],
            Self::Batch(elements) => elements,
        }
    }
}

fn parse_element(value: Value) -> BatchElement {
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    match serde_json::from_value::<RpcRequest>(value) {
        Ok(request) => BatchElement::Call(request),
        Err(e) => BatchElement::Invalid {
            id,
            error: ProxyError::InvalidRequest(e.to_string()),
        },
    }
}

/// Decode an upstream body, which may be a single response or an array.
pub fn parse_responses(body: &[u8]) -> Result<Vec<RpcResponse>, serde_json::Error> {
    let value: Value = serde_json::from_slice(body)?;
    match value {
        Value::Array(items) => items.into_iter().map(serde_json::from_value).collect(),
        other => Ok(vec![serde_json::from_value(other)?]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_single_and_batch() {
        let single = RpcPayload::parse(br#"{"jsonrpc":"2.0","method":"eth_chainId","id":1}"#).unwrap();
        assert!(!single.is_batch());

        let batch = RpcPayload::parse(
            br#"[{"jsonrpc":"2.0","method":"eth_chainId","id":1},{"jsonrpc":"2.0","method":"net_version","id":2}]"#,
        )
        .unwrap();
        assert!(batch.is_batch());
        assert_eq!(batch.into_elements().len(), 2);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(RpcPayload::parse(b"not json"), Err(ProxyError::Parse)));
        assert!(matches!(RpcPayload::parse(b"42"), Err(ProxyError::Parse)));
    }

    #[test]
    fn test_invalid_element_keeps_id() {
        let payload = RpcPayload::parse(br#"[{"method": 5, "id": 9}]"#).unwrap();
        match &payload.into_elements()[0] {
            BatchElement::Invalid { id, .. } => assert_eq!(id, &json!(9)),
            other => panic!("expected invalid element, got {:?}", other),
        }
    }

    #[test]
    fn test_null_result_is_serialized() {
        let res = RpcResponse::success(json!(1), Value::Null);
        let encoded = serde_json::to_value(&res).unwrap();
        assert_eq!(encoded, json!({"jsonrpc": "2.0", "result": null, "id": 1}));
    }

    #[test]
    fn test_error_response_omits_result() {
        let res = RpcResponse::error(json!("a"), &ProxyError::MethodNotWhitelisted);
        let encoded = serde_json::to_value(&res).unwrap();
        assert!(encoded.get("result").is_none());
        assert_eq!(encoded["error"]["code"], json!(-32001));
    }

    #[test]
    fn test_version_validation() {
        let mut req = RpcRequest::new(1, "eth_chainId", Value::Null);
        assert!(req.validate().is_ok());
        req.jsonrpc = "1.0".into();
        assert!(req.validate().is_err());
    }
}
