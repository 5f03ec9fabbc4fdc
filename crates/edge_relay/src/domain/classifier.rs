use crate::domain::{ClassifierError, HeuristicClassifier, RemoteClassifier};
use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Per-frame scores, each a fraction of the frame in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClassificationResult {
    pub smoke_confidence: f64,
    pub fire_confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierStrategy {
    Heuristic,
    Remote,
}

impl fmt::Display for ClassifierStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifierStrategy::Heuristic => write!(f, "heuristic"),
            ClassifierStrategy::Remote => write!(f, "remote"),
        }
    }
}

impl FromStr for ClassifierStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heuristic" => Ok(ClassifierStrategy::Heuristic),
            "remote" => Ok(ClassifierStrategy::Remote),
            other => Err(format!(
                "unknown classifier strategy '{other}', expected 'heuristic' or 'remote'"
            )),
        }
    }
}

/// Scores one prepared frame. Implementations hold no per-frame state.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait FrameClassifier: Send + Sync {
    fn strategy(&self) -> ClassifierStrategy;

    async fn classify(&self, frame: &RgbImage) -> Result<ClassificationResult, ClassifierError>;
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub strategy: ClassifierStrategy,
    /// Base URL of the inference service; only read by the remote strategy
    pub remote_url: String,
    pub remote_timeout: Duration,
    /// Quality of the JPEG sent to the inference service
    pub jpeg_quality: u8,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            strategy: ClassifierStrategy::Heuristic,
            remote_url: "http://localhost:8000".to_string(),
            remote_timeout: Duration::from_millis(1500),
            jpeg_quality: 95,
        }
    }
}

pub fn build_classifier(settings: &ClassifierSettings) -> anyhow::Result<Arc<dyn FrameClassifier>> {
    match settings.strategy {
        ClassifierStrategy::Heuristic => Ok(Arc::new(HeuristicClassifier::default())),
        ClassifierStrategy::Remote => Ok(Arc::new(RemoteClassifier::new(
            &settings.remote_url,
            settings.remote_timeout,
            settings.jpeg_quality,
        )?)),
    }
}
