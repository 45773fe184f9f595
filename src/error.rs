use thiserror::Error;

use crate::lsp::{framed::CodecError, types::Id, InvalidMessage, ResponseError};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors from the endpoint.
///
/// Transport errors (`Codec`, `Parse`, `InvalidMessage`, `UnknownRequestId`) are
/// reported to `error` handlers. The rest are returned to the caller of the
/// operation that failed.
#[derive(Debug, Error)]
pub enum Error {
    #[error("framing error: {0}")]
    Codec(#[from] CodecError),

    #[error("message is not valid JSON: {source}")]
    Parse {
        source: serde_json::Error,
        text: String,
    },

    #[error("received invalid JSON-RPC message: {0}")]
    InvalidMessage(#[from] InvalidMessage),

    #[error("received response for unknown request id {}", display_id(.0))]
    UnknownRequestId(Option<Id>),

    /// The peer answered the request with an error.
    #[error("{method} failed: {error}")]
    Rpc { method: String, error: ResponseError },

    /// The peer answered the request with a malformed response.
    #[error("invalid response to {method}: {reason}")]
    InvalidResponse {
        method: String,
        reason: &'static str,
    },

    #[error("params of {method} must be an array, an object or null")]
    InvalidParams { method: String },

    #[error("failed to serialize params of {method}: {source}")]
    SerializeParams {
        method: String,
        source: serde_json::Error,
    },

    #[error("failed to deserialize result of {method} as {type_name}: {source}")]
    DeserializeResult {
        method: String,
        type_name: &'static str,
        source: serde_json::Error,
    },

    #[error("failed to serialize message: {0}")]
    SerializeMessage(#[source] serde_json::Error),

    #[error("failed to write message: {0}")]
    Write(#[source] CodecError),

    #[error("connection closed")]
    ConnectionClosed,
}

impl Error {
    /// Returns the peer's error object if the request was rejected by the peer.
    pub fn response_error(&self) -> Option<&ResponseError> {
        match self {
            Error::Rpc { error, .. } => Some(error),
            _ => None,
        }
    }
}

fn display_id(id: &Option<Id>) -> String {
    match id {
        Some(id) => id.to_string(),
        None => "null".to_owned(),
    }
}
