use crate::domain::{DomainError, DomainResult, TraceContext};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Frame published by a camera on `area.<area>.frame`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMessage {
    pub area: String,
    pub trace: TraceContext,
    pub frame_bytes_b64: String,
}

impl FrameMessage {
    pub fn new(area: impl Into<String>, trace: TraceContext, frame_bytes: &[u8]) -> Self {
        Self {
            area: area.into(),
            trace,
            frame_bytes_b64: encode_b64(frame_bytes),
        }
    }

    pub fn from_json(payload: &[u8]) -> DomainResult<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| DomainError::InvalidFrameMessage(e.to_string()))
    }

    pub fn frame_bytes(&self) -> DomainResult<Vec<u8>> {
        decode_b64(&self.frame_bytes_b64)
            .map_err(|e| DomainError::InvalidFrameMessage(format!("frame_bytes_b64: {e}")))
    }
}

/// Why a frame was forwarded upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayReason {
    Suspicious,
    /// Scoring failed or timed out; the frame goes upstream for review.
    Inconclusive,
}

impl std::fmt::Display for RelayReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayReason::Suspicious => write!(f, "suspicious"),
            RelayReason::Inconclusive => write!(f, "inconclusive"),
        }
    }
}

/// Enriched event published on `region.<region>.processed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedEvent {
    pub region: String,
    pub area: String,
    pub trace: TraceContext,
    pub conf_fire: f64,
    pub conf_smoke: f64,
    /// Simulated, metres per second.
    pub wind_speed: f64,
    /// Simulated, degrees clockwise from north.
    pub wind_direction: f64,
    pub reason: RelayReason,
    pub frame_jpeg_b64: String,
}

impl ProcessedEvent {
    pub fn frame_jpeg(&self) -> DomainResult<Vec<u8>> {
        decode_b64(&self.frame_jpeg_b64)
            .map_err(|e| DomainError::InvalidFrameMessage(format!("frame_jpeg_b64: {e}")))
    }
}

/// Alert delivered to alarm devices on `alerts.<area>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertMessage {
    pub text: String,
    pub trace: TraceContext,
}

/// Publishes forwarded events to the region subject.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ProcessedEventProducer: Send + Sync {
    async fn publish(&self, event: &ProcessedEvent) -> DomainResult<()>;
}

pub fn encode_b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn decode_b64(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(text)
}
