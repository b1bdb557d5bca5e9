//! Error types for overwatch-receiver.

use thiserror::Error;

/// Main error type for all receiver operations.
#[derive(Debug, Error)]
pub enum ReceiverError {
    /// I/O error during socket or file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Protocol error (invalid frame, wrong flags, oversized payload, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Malformed or unresolvable endpoint address.
    #[error("Invalid address: {0}")]
    Address(String),

    /// Configuration could not be read or parsed.
    #[error("config ({context}): {detail}")]
    Config {
        context: &'static str,
        detail: String,
    },

    /// The transport endpoint was permanently torn down.
    #[error("Transport terminated")]
    Terminated,

    /// Re-initializing the endpoint failed.
    #[error("Cannot reinit endpoint {address}: {source}")]
    Reconnect {
        address: String,
        #[source]
        source: Box<ReceiverError>,
    },
}

/// Result type alias using ReceiverError.
pub type Result<T> = std::result::Result<T, ReceiverError>;
