use fieldops_interchange::{InterchangeError, Operation, ResourceKind};
use fieldops_transport::TransportError;

/// Failures of a resource-client operation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// No usable response (unreachable, timeout, cancelled).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The session is missing or expired (HTTP 401/403).
    #[error("not authenticated: {message}")]
    Unauthorized { message: String },

    /// The target record does not exist.
    #[error("{message}")]
    NotFound {
        resource: ResourceKind,
        id: i64,
        message: String,
    },

    /// The payload was rejected, client-side or by the server (4xx).
    #[error("{message}")]
    Validation { message: String },

    /// Any other non-2xx response.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The resource has no such operation or scope.
    #[error("{resource} does not support {what}")]
    Unsupported { resource: ResourceKind, what: String },

    /// An identical mutation is still in flight.
    #[error("a {operation} on {resource} is already in progress")]
    DuplicateSubmission {
        resource: ResourceKind,
        operation: Operation,
    },

    /// A local file could not be read.
    #[error("could not read {path}: {message}")]
    Read { path: String, message: String },

    /// The response body could not be read as the expected record(s).
    #[error("invalid response: {0}")]
    Decode(#[from] InterchangeError),
}

/// Failure classes shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transport,
    Authorization,
    Validation,
    NotFound,
}

impl ClientError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ClientError::Transport(_)
            | ClientError::Server { .. }
            | ClientError::Read { .. }
            | ClientError::Decode(_) => ErrorClass::Transport,
            ClientError::Unauthorized { .. } => ErrorClass::Authorization,
            ClientError::NotFound { .. } => ErrorClass::NotFound,
            ClientError::Validation { .. }
            | ClientError::Unsupported { .. }
            | ClientError::DuplicateSubmission { .. } => ErrorClass::Validation,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }

    pub(crate) fn unsupported(resource: ResourceKind, what: impl Into<String>) -> Self {
        ClientError::Unsupported {
            resource,
            what: what.into(),
        }
    }
}

/// Failures of an upload.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UploadError {
    /// The file breaks the configured size/type policy. Nothing was read.
    #[error("upload refused: {0}")]
    Policy(String),

    /// The file could not be read.
    #[error("could not read {path}: {message}")]
    Read { path: String, message: String },

    /// The server answered with a non-2xx status.
    #[error("upload rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The server answered 2xx without the expected reference field.
    #[error("upload response has no '{field}'")]
    MissingReference { field: String },

    #[error("upload cancelled")]
    Cancelled,

    #[error(transparent)]
    Transport(TransportError),
}

impl From<TransportError> for UploadError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Cancelled => UploadError::Cancelled,
            other => UploadError::Transport(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_follow_taxonomy() {
        let timeout = ClientError::Transport(TransportError::Timeout {
            url: "http://x/api/tasks".into(),
            timeout_ms: 30_000,
        });
        assert_eq!(timeout.class(), ErrorClass::Transport);
        assert_eq!(
            ClientError::Unauthorized {
                message: "Not authenticated".into()
            }
            .class(),
            ErrorClass::Authorization
        );
        let missing = ClientError::NotFound {
            resource: ResourceKind::Tasks,
            id: 42,
            message: "Task not found".into(),
        };
        assert_eq!(missing.class(), ErrorClass::NotFound);
        assert!(missing.is_not_found());
        assert_eq!(missing.to_string(), "Task not found");

        let unreadable = ClientError::Read {
            path: "/tmp/in.csv".into(),
            message: "permission denied".into(),
        };
        assert_eq!(unreadable.class(), ErrorClass::Transport);
    }

    #[test]
    fn cancelled_transport_maps_to_cancelled_upload() {
        assert!(matches!(
            UploadError::from(TransportError::Cancelled),
            UploadError::Cancelled
        ));
        assert!(matches!(
            UploadError::from(TransportError::Io("broken pipe".into())),
            UploadError::Transport(_)
        ));
    }
}
