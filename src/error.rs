use std::fmt;

use alloy::primitives::Bytes;
use thiserror::Error;

use crate::ethereum::DecodedParam;

/// Failures reported by a [`NodeClient`](crate::ethereum::provider::NodeClient).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    /// The request did not complete within the configured timeout.
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// JSON-RPC error object returned by the node.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The node executed the call and it reverted. `data` may be empty.
    #[error("execution reverted: {message}")]
    Revert { message: String, data: Bytes },

    /// The node answered but the payload could not be interpreted.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Connection-level failure (refused, DNS, TLS, HTTP status).
    #[error("HTTP error: {0}")]
    Http(String),
}

/// Stage of an event scan at which a node failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    ResolveHead,
    FetchLogs,
    Decode,
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResolveHead => write!(f, "resolve-head"),
            Self::FetchLogs => write!(f, "fetch-logs"),
            Self::Decode => write!(f, "decode"),
        }
    }
}

/// Arguments carried by a revert.
#[derive(Debug, Clone, PartialEq)]
pub enum RevertArgs {
    /// The revert payload matched a known error and decoded cleanly.
    Decoded(Vec<DecodedParam>),
    /// The payload could not be matched; the raw return data is kept.
    Raw(Bytes),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid address '{0}': expected 0x followed by 40 hexadecimal characters")]
    InvalidAddress(String),

    #[error("invalid function '{name}': {reason}")]
    InvalidFunction { name: String, reason: String },

    #[error("invalid event '{name}': {reason}")]
    InvalidEvent { name: String, reason: String },

    #[error("invalid arguments for '{function}': {reason}")]
    ArgumentType { function: String, reason: String },

    #[error("invalid block range: from block {from} is after to block {to}")]
    InvalidBlockRange { from: u64, to: u64 },

    #[error("transport error: {0}")]
    Transport(#[source] NodeError),

    #[error("contract reverted with {name}")]
    ContractRevert { name: String, args: RevertArgs },

    #[error("token decimals unavailable: {0}")]
    DecimalsUnavailable(#[source] Box<QueryError>),

    #[error("scan failed during {phase}: {cause}")]
    Scan {
        phase: ScanPhase,
        #[source]
        cause: NodeError,
    },
}

impl QueryError {
    /// Returns `true` for errors raised locally, before any request was sent.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidAddress(_)
                | Self::InvalidFunction { .. }
                | Self::InvalidEvent { .. }
                | Self::ArgumentType { .. }
                | Self::InvalidBlockRange { .. }
        )
    }

    pub(crate) fn scan(phase: ScanPhase, cause: NodeError) -> Self {
        Self::Scan { phase, cause }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        assert!(QueryError::InvalidAddress("0x12".into()).is_validation());
        assert!(QueryError::InvalidBlockRange { from: 10, to: 5 }.is_validation());
        assert!(!QueryError::Transport(NodeError::Timeout { ms: 10 }).is_validation());
        assert!(!QueryError::scan(ScanPhase::Decode, NodeError::MalformedResponse("x".into()))
            .is_validation());
    }

    #[test]
    fn test_scan_error_message_names_phase() {
        let err = QueryError::scan(
            ScanPhase::ResolveHead,
            NodeError::Http("connection refused".into()),
        );
        assert_eq!(
            err.to_string(),
            "scan failed during resolve-head: HTTP error: connection refused"
        );
    }
}
