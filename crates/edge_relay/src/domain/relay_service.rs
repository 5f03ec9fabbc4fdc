use crate::domain::{
    encode_jpeg_blocking, prepare_frame_blocking, ClassificationResult, FrameClassifier,
    FrameGeometry, GatingPolicy, RelayDecision, WindSource,
};
use common::domain::{
    encode_b64, stage, DomainError, DomainResult, ProcessedEvent, ProcessedEventProducer,
    RelayReason, TraceContext,
};
use common::validation::{subject_token, validate_struct};
use garde::Validate;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// One frame as it arrives at the edge, before any processing.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub area: String,
    pub trace: TraceContext,
    pub frame_bytes: Vec<u8>,
}

#[derive(Debug, Clone, Validate)]
pub struct RelaySettings {
    #[garde(custom(subject_token))]
    pub region: String,
    #[garde(range(min = 1))]
    pub frame_width: u32,
    #[garde(range(min = 1))]
    pub frame_height: u32,
    #[garde(range(min = 1, max = 100))]
    pub jpeg_quality: u8,
    #[garde(skip)]
    pub classify_timeout: Duration,
}

impl RelaySettings {
    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry::new(self.frame_width, self.frame_height)
    }
}

/// Terminal state of one frame.
#[derive(Debug, Clone)]
pub enum RelayOutcome {
    Dropped {
        trace: TraceContext,
        decision: RelayDecision,
        scores: ClassificationResult,
    },
    Forwarded(ProcessedEvent),
}

impl RelayOutcome {
    pub fn trace(&self) -> &TraceContext {
        match self {
            RelayOutcome::Dropped { trace, .. } => trace,
            RelayOutcome::Forwarded(event) => &event.trace,
        }
    }

    pub fn is_forwarded(&self) -> bool {
        matches!(self, RelayOutcome::Forwarded(_))
    }
}

/// Per-frame pipeline: received → classified → dropped | enriched → sent.
///
/// Holds no per-frame state, so one instance serves every area of the region
/// concurrently. Each stage timestamp is taken at the point it names.
pub struct FrameRelayService {
    settings: RelaySettings,
    classifier: Arc<dyn FrameClassifier>,
    policy: GatingPolicy,
    wind: Arc<dyn WindSource>,
    producer: Arc<dyn ProcessedEventProducer>,
}

impl FrameRelayService {
    pub fn new(
        settings: RelaySettings,
        classifier: Arc<dyn FrameClassifier>,
        policy: GatingPolicy,
        wind: Arc<dyn WindSource>,
        producer: Arc<dyn ProcessedEventProducer>,
    ) -> DomainResult<Self> {
        validate_struct(&settings)?;

        debug!(
            region = %settings.region,
            strategy = %classifier.strategy(),
            thresholds = ?policy.thresholds(),
            "initialized frame relay service"
        );

        Ok(Self {
            settings,
            classifier,
            policy,
            wind,
            producer,
        })
    }

    #[instrument(skip(self, frame), fields(area = %frame.area, trace_id = %frame.trace.trace_id()))]
    pub async fn relay(&self, frame: InboundFrame) -> DomainResult<RelayOutcome> {
        let InboundFrame {
            area,
            trace,
            frame_bytes,
        } = frame;

        let trace = trace.stamp(stage::EDGE_RECEIVED)?;
        // Downstream edge stages on an inbound trace mean it is replayed or forged.
        if let Some(recorded) = [stage::EDGE_FILTERED, stage::EDGE_SENT]
            .into_iter()
            .find(|s| trace.has_stage(s))
        {
            return Err(DomainError::TraceStageAlreadyRecorded {
                trace_id: trace.trace_id().to_string(),
                stage: recorded.to_string(),
            });
        }

        let prepared = prepare_frame_blocking(frame_bytes, self.settings.geometry()).await?;

        let classified =
            tokio::time::timeout(self.settings.classify_timeout, self.classifier.classify(&prepared))
                .await;
        let trace = trace.stamp(stage::EDGE_FILTERED)?;

        let (scores, decision) = match classified {
            Ok(Ok(scores)) => (scores, self.policy.decide(&scores)),
            Ok(Err(e)) => {
                warn!(area = %area, error = %e, "classification failed, forwarding as inconclusive");
                (ClassificationResult::default(), self.policy.inconclusive())
            }
            Err(_) => {
                warn!(
                    area = %area,
                    timeout_ms = self.settings.classify_timeout.as_millis(),
                    "classification timed out, forwarding as inconclusive"
                );
                (ClassificationResult::default(), self.policy.inconclusive())
            }
        };

        let Some(reason) = decision.relay_reason() else {
            info!(
                area = %area,
                smoke_confidence = scores.smoke_confidence,
                fire_confidence = scores.fire_confidence,
                reason = %decision.reason,
                "frame dropped"
            );
            return Ok(RelayOutcome::Dropped {
                trace,
                decision,
                scores,
            });
        };

        let jpeg = encode_jpeg_blocking(prepared, self.settings.jpeg_quality).await?;
        let wind = self.wind.sample();

        let event = ProcessedEvent {
            region: self.settings.region.clone(),
            area,
            trace: trace.stamp(stage::EDGE_SENT)?,
            conf_fire: scores.fire_confidence,
            conf_smoke: scores.smoke_confidence,
            wind_speed: wind.speed_mps,
            wind_direction: wind.direction_deg,
            reason,
            frame_jpeg_b64: encode_b64(&jpeg),
        };
        self.producer.publish(&event).await?;

        if reason == RelayReason::Inconclusive {
            info!(area = %event.area, "frame forwarded for review");
        } else {
            info!(
                area = %event.area,
                smoke_confidence = event.conf_smoke,
                fire_confidence = event.conf_fire,
                "frame forwarded"
            );
        }

        Ok(RelayOutcome::Forwarded(event))
    }
}
