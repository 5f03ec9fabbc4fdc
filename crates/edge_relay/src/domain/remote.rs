use crate::domain::{
    encode_jpeg_blocking, ClassificationResult, ClassifierError, ClassifierStrategy,
    FrameClassifier,
};
use anyhow::Context;
use async_trait::async_trait;
use common::domain::encode_b64;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Serialize)]
struct InferRequest {
    frame: String,
}

#[derive(Debug, Deserialize)]
struct InferResponse {
    #[serde(default)]
    fire: bool,
    confidence: f64,
}

/// Scores frames with a separately deployed model behind `POST /infer`.
///
/// The service only answers "fire probability", so smoke confidence is
/// always 0.0 and gating relies on the fire gate alone.
pub struct RemoteClassifier {
    client: reqwest::Client,
    infer_url: String,
    timeout: Duration,
    jpeg_quality: u8,
}

impl RemoteClassifier {
    pub fn new(base_url: &str, timeout: Duration, jpeg_quality: u8) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build inference HTTP client")?;

        Ok(Self {
            client,
            infer_url: format!("{}/infer", base_url.trim_end_matches('/')),
            timeout,
            jpeg_quality,
        })
    }

    pub fn infer_url(&self) -> &str {
        &self.infer_url
    }

    fn map_transport_error(&self, err: reqwest::Error) -> ClassifierError {
        if err.is_timeout() {
            ClassifierError::Timeout(self.timeout)
        } else {
            ClassifierError::Unavailable(err.to_string())
        }
    }
}

#[async_trait]
impl FrameClassifier for RemoteClassifier {
    fn strategy(&self) -> ClassifierStrategy {
        ClassifierStrategy::Remote
    }

    #[instrument(skip(self, frame), fields(url = %self.infer_url))]
    async fn classify(&self, frame: &RgbImage) -> Result<ClassificationResult, ClassifierError> {
        let jpeg = encode_jpeg_blocking(frame.clone(), self.jpeg_quality)
            .await
            .map_err(|e| ClassifierError::Decode(e.to_string()))?;

        let response = self
            .client
            .post(&self.infer_url)
            .json(&InferRequest {
                frame: encode_b64(&jpeg),
            })
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifierError::Unavailable(format!(
                "inference service answered {status}"
            )));
        }

        let body: InferResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ClassifierError::Timeout(self.timeout)
            } else {
                ClassifierError::InvalidScore(e.to_string())
            }
        })?;

        if !body.confidence.is_finite() || !(0.0..=1.0).contains(&body.confidence) {
            return Err(ClassifierError::InvalidScore(format!(
                "confidence {} outside [0, 1]",
                body.confidence
            )));
        }

        debug!(
            fire = body.fire,
            confidence = body.confidence,
            "remote classification complete"
        );

        Ok(ClassificationResult {
            smoke_confidence: 0.0,
            fire_confidence: body.confidence,
        })
    }
}
