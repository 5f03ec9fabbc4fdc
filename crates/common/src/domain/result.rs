use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid {kind} identifier '{value}': {reason}")]
    InvalidIdentifier {
        kind: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("Subject '{0}' is not an area frame subject")]
    UnexpectedSubject(String),

    #[error("Trace {trace_id} already has stage '{stage}' recorded")]
    TraceStageAlreadyRecorded { trace_id: String, stage: String },

    #[error("Frame decode error: {0}")]
    FrameDecodeError(String),

    #[error("Frame encode error: {0}")]
    FrameEncodeError(String),

    #[error("Invalid frame message: {0}")]
    InvalidFrameMessage(String),

    #[error("Publish error: {0}")]
    PublishError(#[source] anyhow::Error),

    #[error("Payload serialization error: {0}")]
    PayloadError(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl DomainError {
    /// Errors that must stop the process rather than drop a single message.
    ///
    /// A failed publish means the bus connection is unusable; there is no local
    /// buffer to retry from, so the supervisor restarts the process instead.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DomainError::PublishError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_error_is_fatal() {
        let err = DomainError::PublishError(anyhow::anyhow!("connection closed"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_decode_error_is_recoverable() {
        let err = DomainError::FrameDecodeError("truncated jpeg".to_string());
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "Frame decode error: truncated jpeg");
    }
}
