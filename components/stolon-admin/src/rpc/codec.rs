//! JSON-RPC request and response encoding.
//!
//! Requests look like `{"method": "Service.Method", "params": [{...}], "id": 1}`.
//! Responses carry either a result or an error string, never both:
//! `{"result": {...}, "error": null, "id": 1}`.

// External crates
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Errors raised while decoding a request or encoding a response.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The body is not a valid request document.
    #[error("rpc: malformed request: {0}")]
    Malformed(#[source] serde_json::Error),

    /// `params` is neither an object nor a single-element array.
    #[error("rpc: params must be an object or a single-element array")]
    InvalidParams,

    /// The response could not be serialized.
    #[error("rpc: cannot encode response: {0}")]
    Encode(#[source] serde_json::Error),
}

/// A decoded call.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    /// Full method name, `Service.Method`.
    pub method: String,
    /// Call arguments, `null` when none were sent.
    pub params: Value,
    /// Request id echoed in the response.
    pub id: Value,
}

/// The answer to a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Method result, `null` on error.
    pub result: Value,
    /// Error message, `null` on success.
    pub error: Option<String>,
    /// Id of the request being answered.
    pub id: Value,
}

impl RpcResponse {
    /// Successful response.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            result,
            error: None,
            id,
        }
    }

    /// Failed response.
    pub fn failure(id: Value, error: impl Into<String>) -> Self {
        Self {
            result: Value::Null,
            error: Some(error.into()),
            id,
        }
    }
}

/// Wire format selected by the request `Content-Type`.
pub trait Codec: Send + Sync + fmt::Debug {
    /// `Content-Type` of encoded responses.
    fn content_type(&self) -> &'static str;

    /// Decode a request body.
    fn decode_request(&self, body: &[u8]) -> Result<RpcRequest, CodecError>;

    /// Encode a response body.
    fn encode_response(&self, response: &RpcResponse) -> Result<Bytes, CodecError>;
}

/// JSON-RPC codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[derive(Debug, Deserialize)]
struct WireRequest {
    method: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    id: Value,
}

impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json; charset=utf-8"
    }

    fn decode_request(&self, body: &[u8]) -> Result<RpcRequest, CodecError> {
        let wire: WireRequest = serde_json::from_slice(body).map_err(CodecError::Malformed)?;

        // Positional params carry the argument object as their first element.
        let params = match wire.params {
            Value::Array(mut items) => {
                if items.is_empty() {
                    Value::Null
                } else {
                    items.swap_remove(0)
                }
            }
            params @ (Value::Object(_) | Value::Null) => params,
            _ => return Err(CodecError::InvalidParams),
        };

        Ok(RpcRequest {
            method: wire.method,
            params,
            id: wire.id,
        })
    }

    fn encode_response(&self, response: &RpcResponse) -> Result<Bytes, CodecError> {
        let mut body = serde_json::to_vec(response).map_err(CodecError::Encode)?;
        body.push(b'\n');
        Ok(Bytes::from(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn positional_params_unwrap_first_element() {
        let req = JsonCodec
            .decode_request(br#"{"method":"DatabaseOperation.Ping","params":[{"a":1}],"id":7}"#)
            .unwrap();
        assert_eq!(req.method, "DatabaseOperation.Ping");
        assert_eq!(req.params, json!({"a": 1}));
        assert_eq!(req.id, json!(7));
    }

    #[test]
    fn object_and_missing_params() {
        let req = JsonCodec
            .decode_request(br#"{"method":"S.M","params":{"b":2}}"#)
            .unwrap();
        assert_eq!(req.params, json!({"b": 2}));
        assert_eq!(req.id, Value::Null);

        let req = JsonCodec.decode_request(br#"{"method":"S.M","id":"x"}"#).unwrap();
        assert_eq!(req.params, Value::Null);
    }

    #[test]
    fn scalar_params_are_rejected() {
        let err = JsonCodec
            .decode_request(br#"{"method":"S.M","params":3}"#)
            .unwrap_err();
        assert!(matches!(err, CodecError::InvalidParams));
    }

    #[test]
    fn malformed_body_is_rejected() {
        let err = JsonCodec.decode_request(b"{not json").unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
        let err = JsonCodec.decode_request(br#"{"params":[]}"#).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn responses_carry_result_or_error() {
        let ok = JsonCodec
            .encode_response(&RpcResponse::success(json!(1), json!({"host": "db"})))
            .unwrap();
        let ok: Value = serde_json::from_slice(&ok).unwrap();
        assert_eq!(ok, json!({"result": {"host": "db"}, "error": null, "id": 1}));

        let failed = JsonCodec
            .encode_response(&RpcResponse::failure(json!(2), "connection refused"))
            .unwrap();
        let failed: Value = serde_json::from_slice(&failed).unwrap();
        assert_eq!(
            failed,
            json!({"result": null, "error": "connection refused", "id": 2})
        );
    }
}
