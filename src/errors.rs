use serde_json::{json, Value};
use thiserror::Error;

/// Failure kinds of the lookup pipeline.
///
/// `Clone` so that every waiter of a coalesced fetch observes the leader's
/// exact outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported TLD: {0}")]
    NotSupportedTld(String),

    #[error("Rate limit exceeded for client '{0}'")]
    RateLimited(String),

    #[error("Lookup timed out")]
    Timeout,

    #[error("Connection to {0} timed out")]
    ConnectionTimeout(String),

    #[error("Connection refused by {0}")]
    ConnectionRefused(String),

    #[error("Referral chain exceeded {0} hops")]
    TooManyReferrals(usize),

    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    #[error("No record found for {0}")]
    NotFound(String),

    #[error("Malformed response from {server}: {reason}")]
    MalformedResponse { server: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LookupError {
    /// Stable identifier used in protocol error payloads and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            LookupError::InvalidArgument(_) => "InvalidArgument",
            LookupError::NotSupportedTld(_) => "NotSupportedTld",
            LookupError::RateLimited(_) => "RateLimited",
            LookupError::Timeout => "Timeout",
            LookupError::ConnectionTimeout(_) => "ConnectionTimeout",
            LookupError::ConnectionRefused(_) => "ConnectionRefused",
            LookupError::TooManyReferrals(_) => "TooManyReferrals",
            LookupError::Unavailable(_) => "Unavailable",
            LookupError::NotFound(_) => "NotFound",
            LookupError::MalformedResponse { .. } => "MalformedResponse",
            LookupError::Internal(_) => "InternalError",
        }
    }
}

impl From<tokio::time::error::Elapsed> for LookupError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        LookupError::Timeout
    }
}

/// Errors surfaced in the JSON-RPC response envelope.
#[derive(Error, Debug, Clone)]
pub enum RpcError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Lookup(#[from] LookupError),
}

impl RpcError {
    pub fn code(&self) -> i64 {
        match self {
            RpcError::Parse(_) => -32700,
            RpcError::InvalidRequest(_) => -32600,
            RpcError::MethodNotFound(_) => -32601,
            RpcError::InvalidParams(_) => -32602,
            RpcError::Internal(_) => -32603,
            RpcError::InvalidState(_) => -32002,
            RpcError::Lookup(_) => -32000,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::Parse(_) => "ParseError",
            RpcError::InvalidRequest(_) => "InvalidRequest",
            RpcError::MethodNotFound(_) => "MethodNotFound",
            RpcError::InvalidParams(_) => "InvalidParams",
            RpcError::InvalidState(_) => "InvalidState",
            RpcError::Internal(_) => "InternalError",
            RpcError::Lookup(e) => e.kind(),
        }
    }

    /// JSON-RPC `error` member; `data` carries the kind and message verbatim.
    pub fn to_error_object(&self) -> Value {
        let message = self.to_string();
        json!({
            "code": self.code(),
            "message": message,
            "data": {
                "kind": self.kind(),
                "message": message,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_error_kinds_are_stable() {
        assert_eq!(LookupError::Timeout.kind(), "Timeout");
        assert_eq!(LookupError::TooManyReferrals(2).kind(), "TooManyReferrals");
        assert_eq!(
            LookupError::MalformedResponse { server: "a".into(), reason: "b".into() }.kind(),
            "MalformedResponse"
        );
    }

    #[test]
    fn test_internal_kind_matches_protocol_name() {
        let lookup = RpcError::from(LookupError::Internal("task failed".into()));
        assert_eq!(lookup.kind(), "InternalError");
        assert_eq!(lookup.kind(), RpcError::Internal("boom".into()).kind());
    }

    #[test]
    fn test_rpc_error_object_preserves_lookup_kind() {
        let err = RpcError::from(LookupError::NotFound("example.com".into()));
        let obj = err.to_error_object();

        assert_eq!(obj["code"], -32000);
        assert_eq!(obj["data"]["kind"], "NotFound");
        assert_eq!(obj["data"]["message"], "No record found for example.com");
    }

    #[test]
    fn test_protocol_error_codes() {
        assert_eq!(RpcError::Parse("x".into()).code(), -32700);
        assert_eq!(RpcError::MethodNotFound("x".into()).code(), -32601);
        assert_eq!(RpcError::InvalidParams("x".into()).code(), -32602);
        assert_eq!(RpcError::InvalidState("x".into()).kind(), "InvalidState");
    }
}
