// zm-broker-rpc/src/envelope.rs
// ============================================================================
// Module: JSON-RPC Envelope
// Description: Request/response/error shapes and the C7-to-JSON-RPC code
//              mapping, including the documented legacy deviations (§4.5,
//              §7).
// Purpose: Keep every error-code decision in one place so dispatch.rs never
//          picks a code inline.
// Dependencies: serde, serde_json, zm-broker-core
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use zm_broker_core::BrokerError;

/// Malformed JSON that could not even be parsed into an envelope.
pub const PARSE_ERROR: i64 = -32700;
/// Missing or unrecognized `"method"`.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// A validation failure raised before any store access (§4.1, §7).
pub const INVALID_PARAMS: i64 = -32602;
/// Every other failure: store errors, translator errors, permission denied,
/// and any user error detected after dispatch has begun (the documented
/// legacy deviation that keeps these off `-32602`, §7).
pub const INTERNAL_ERROR: i64 = -32603;

/// Incoming JSON-RPC request. The `"jsonrpc"` field's value is accepted but
/// not enforced (§4.5); a missing `"method"` maps to [`METHOD_NOT_FOUND`].
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    /// Request identifier, echoed back verbatim.
    pub id: Value,
    /// Method name. `None` when the field is absent from the payload.
    pub method: Option<String>,
    /// Method parameters, defaulting to `Value::Null` when absent.
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Echoes the request id.
    pub id: Value,
    /// Successful result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload, present only on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorBody>,
}

/// The `error` object of a JSON-RPC response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorBody {
    /// One of [`PARSE_ERROR`], [`METHOD_NOT_FOUND`], [`INVALID_PARAMS`], or
    /// [`INTERNAL_ERROR`].
    pub code: i64,
    /// Short, potentially leaky message (§4.7).
    pub message: String,
    /// Structured detail: a `{path, message}` array for invalid params, or
    /// an entity-identifying object for everything else (§7).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// An error produced by a dispatch method, not yet wrapped in the
/// `JsonRpcResponse` envelope.
#[derive(Debug, Clone)]
pub struct RpcError {
    /// JSON-RPC error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    pub data: Option<Value>,
    /// Whether an audit sink should record this at error severity: true
    /// only for `Internal` failures and permission denials, never for user
    /// errors (§4.7) — tracked explicitly rather than re-derived from
    /// `code`/`data`, since both user errors and internal errors share
    /// `INTERNAL_ERROR`'s code under the legacy deviation.
    pub error_severity: bool,
}

impl RpcError {
    /// A malformed-JSON failure, raised before a [`JsonRpcRequest`] could
    /// even be parsed.
    #[must_use]
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self { code: PARSE_ERROR, message: message.into(), data: None, error_severity: false }
    }

    /// A missing or unrecognized method, including a disabled `RPCAPI` gate
    /// (§6), which is specified to behave exactly as if the method did not
    /// exist.
    #[must_use]
    pub fn method_not_found() -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: "method not found".to_string(),
            data: None,
            error_severity: false,
        }
    }

    /// Wraps a validator failure as `-32602` with its `{path, message}`
    /// array intact. Any other [`BrokerError`] variant reaching this call
    /// site (there should be none, since the validator only raises `User`)
    /// falls through to [`RpcError::from_broker_error`].
    #[must_use]
    pub fn from_validation_error(err: BrokerError) -> Self {
        match err {
            BrokerError::User { message, data } => {
                Self { code: INVALID_PARAMS, message, data, error_severity: false }
            }
            other => Self::from_broker_error(other),
        }
    }

    /// Maps any post-dispatch [`BrokerError`] to `-32603`, preserving its
    /// message and structured `data`. This is the documented legacy
    /// deviation: post-dispatch user errors (open batch, unknown user,
    /// unknown test id) share `InternalError`'s code rather than
    /// `InvalidParams` (§7).
    #[must_use]
    pub fn from_broker_error(err: BrokerError) -> Self {
        match err {
            BrokerError::User { message, data } => {
                Self { code: INTERNAL_ERROR, message, data, error_severity: false }
            }
            BrokerError::Permission { remote_ip } => Self::permission_denied(&remote_ip),
            BrokerError::Internal { message } => {
                Self { code: INTERNAL_ERROR, message, data: None, error_severity: true }
            }
        }
    }

    /// An administrative method called from a non-loopback address (§4.5).
    #[must_use]
    pub fn permission_denied(remote_ip: &str) -> Self {
        Self {
            code: INTERNAL_ERROR,
            message: "administrative method requires a loopback caller".to_string(),
            data: Some(serde_json::json!({ "remote_ip": remote_ip })),
            error_severity: true,
        }
    }

    /// Wraps a `serde_json` deserialization failure of a method's params
    /// object as an invalid-params error with a single-element `data` array,
    /// matching the validator's `{path, message}` shape (§7).
    #[must_use]
    pub fn invalid_params_shape(err: &serde_json::Error) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: "Invalid params".to_string(),
            data: Some(serde_json::json!([{ "path": "", "message": err.to_string() }])),
            error_severity: false,
        }
    }
}

/// Parses raw request bytes into a [`JsonRpcRequest`], mapping malformed
/// JSON to [`RpcError::parse_error`] (§4.5).
pub fn parse_request(bytes: &[u8]) -> Result<JsonRpcRequest, RpcError> {
    serde_json::from_slice(bytes).map_err(|err| RpcError::parse_error(err.to_string()))
}

/// Builds the response envelope for a dispatch outcome.
#[must_use]
pub fn to_response(id: Value, outcome: Result<Value, RpcError>) -> JsonRpcResponse {
    match outcome {
        Ok(result) => JsonRpcResponse { jsonrpc: "2.0", id, result: Some(result), error: None },
        Err(err) => JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcErrorBody { code: err.code, message: err.message, data: err.data }),
        },
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;

    #[test]
    fn malformed_json_maps_to_parse_error() {
        let err = parse_request(b"{not json").unwrap_err();
        assert_eq!(err.code, PARSE_ERROR);
    }

    #[test]
    fn missing_method_field_parses_but_is_none() {
        let request = parse_request(br#"{"id":1}"#).unwrap();
        assert!(request.method.is_none());
    }

    #[test]
    fn validation_error_maps_to_invalid_params() {
        let broker_err = BrokerError::user("/domain", "bad domain");
        let err = RpcError::from_validation_error(broker_err);
        assert_eq!(err.code, INVALID_PARAMS);
    }

    #[test]
    fn post_dispatch_user_error_maps_to_internal_error() {
        let broker_err = BrokerError::user_with_data(
            "Batch job still running",
            serde_json::json!({ "batch_id": 1 }),
        );
        let err = RpcError::from_broker_error(broker_err);
        assert_eq!(err.code, INTERNAL_ERROR);
        assert_eq!(err.data.unwrap()["batch_id"], 1);
    }

    #[test]
    fn permission_denied_carries_remote_ip() {
        let err = RpcError::from_broker_error(BrokerError::permission_denied("10.0.0.1"));
        assert_eq!(err.code, INTERNAL_ERROR);
        assert_eq!(err.data.unwrap()["remote_ip"], "10.0.0.1");
    }
}
