/// Failures below the HTTP status line.
///
/// A response with any status code, including 401 and 5xx, is not a
/// `TransportError`; it is returned as an [`crate::ApiResponse`] and
/// classified by the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The server could not be reached (DNS, refused connection, TLS).
    #[error("could not reach {url}: {message}")]
    Unreachable { url: String, message: String },

    /// No complete response arrived within the configured timeout.
    #[error("request to {url} timed out after {timeout_ms} ms")]
    Timeout { url: String, timeout_ms: u64 },

    /// The transfer was cancelled by the caller.
    #[error("request cancelled")]
    Cancelled,

    /// A local I/O failure while sending or receiving.
    #[error("I/O error: {0}")]
    Io(String),

    /// The server answered with something that is not a usable response.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },
}
