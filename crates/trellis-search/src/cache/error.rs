use thiserror::Error;

/// Errors from the shared key/value tier.
///
/// The cache tier never fails a request: these errors are counted, logged,
/// and swallowed by the tiered facade.
#[derive(Debug, Error)]
pub enum KvError {
    /// Could not reach the KV endpoint.
    #[error("kv store at '{url}' unreachable: {message}")]
    ConnectionFailed {
        /// Endpoint URL.
        url: String,
        /// Error message.
        message: String,
    },

    /// A command failed after the connection was established.
    #[error("kv {op} failed: {message}")]
    OperationFailed {
        /// Command name.
        op: &'static str,
        /// Error message.
        message: String,
    },

    /// A stored payload did not round-trip through the wire format.
    #[error("kv payload corrupt: {message}")]
    Corrupt {
        /// Decode failure.
        message: String,
    },
}
