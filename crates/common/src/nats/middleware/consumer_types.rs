use async_nats::HeaderMap;
use bytes::Bytes;

/// One inbound core NATS message, owned so it can move through Tower layers
/// and into a spawned task.
#[derive(Debug, Clone)]
pub struct ConsumeRequest {
    /// The concrete subject the message arrived on
    pub subject: String,
    pub payload: Bytes,
    pub headers: Option<HeaderMap>,
}

impl ConsumeRequest {
    pub fn new(subject: String, payload: Bytes, headers: Option<HeaderMap>) -> Self {
        Self {
            subject,
            payload,
            headers,
        }
    }
}

/// Outcome of handling one message.
///
/// Core NATS has no acknowledgements, so a rejection only ends that message's
/// journey; it is never redelivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeResponse {
    Handled,
    Rejected(Option<String>),
}

impl ConsumeResponse {
    pub fn handled() -> Self {
        Self::Handled
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(Some(reason.into()))
    }

    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled)
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Handled => "handled",
            Self::Rejected(_) => "rejected",
        }
    }
}
