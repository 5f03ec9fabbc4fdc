use crate::domain::{FrameRelayService, InboundFrame, RelayOutcome};
use common::domain::{parse_area_subject, DomainResult, FrameMessage, TraceContext};
use common::nats::{ConsumeRequest, ConsumeResponse};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use tracing::{debug, error, warn};

/// Tower service handling one frame message from an `area.<area>.frame` subject.
///
/// This service:
/// 1. Recovers the area from the concrete subject
/// 2. Decodes the envelope (JSON `FrameMessage`, or raw image bytes)
/// 3. Runs the frame through the relay service
/// 4. Returns Handled/Rejected, or `Err` when the process must stop
#[derive(Clone)]
pub struct FrameConsumerService {
    relay_service: Arc<FrameRelayService>,
}

impl FrameConsumerService {
    pub fn new(relay_service: Arc<FrameRelayService>) -> Self {
        Self { relay_service }
    }
}

/// Build the inbound frame for `area`.
///
/// A payload starting with `{` is a JSON `FrameMessage` and keeps its trace;
/// anything else is raw image bytes and starts a new trace here.
pub fn decode_inbound_frame(area: String, payload: &[u8]) -> DomainResult<InboundFrame> {
    let is_json = payload
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'{');

    if !is_json {
        return Ok(InboundFrame {
            area,
            trace: TraceContext::begin(),
            frame_bytes: payload.to_vec(),
        });
    }

    let message = FrameMessage::from_json(payload)?;
    if message.area != area {
        warn!(
            subject_area = %area,
            payload_area = %message.area,
            "frame payload names a different area, using the subject"
        );
    }
    let frame_bytes = message.frame_bytes()?;

    Ok(InboundFrame {
        area,
        trace: message.trace,
        frame_bytes,
    })
}

impl Service<ConsumeRequest> for FrameConsumerService {
    type Response = ConsumeResponse;
    type Error = anyhow::Error;
    type Future = BoxFuture<'static, Result<ConsumeResponse, anyhow::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let relay_service = Arc::clone(&self.relay_service);

        Box::pin(async move {
            let area = match parse_area_subject(&req.subject) {
                Ok(area) => area,
                Err(e) => {
                    error!(error = %e, subject = %req.subject, "message on unexpected subject");
                    return Ok(ConsumeResponse::rejected(e.to_string()));
                }
            };

            let frame = match decode_inbound_frame(area, &req.payload) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, subject = %req.subject, "failed to decode frame message");
                    return Ok(ConsumeResponse::rejected(format!("Decode error: {e}")));
                }
            };
            let area = frame.area.clone();

            match relay_service.relay(frame).await {
                Ok(outcome) => {
                    debug!(
                        area = %area,
                        trace_id = %outcome.trace().trace_id(),
                        forwarded = matches!(outcome, RelayOutcome::Forwarded(_)),
                        "frame handled"
                    );
                    Ok(ConsumeResponse::handled())
                }
                Err(e) if e.is_fatal() => {
                    error!(error = %e, area = %area, "fatal error while relaying frame");
                    Err(anyhow::Error::new(e).context(format!("relaying frame for area {area}")))
                }
                Err(e) => {
                    warn!(error = %e, area = %area, "frame rejected");
                    Ok(ConsumeResponse::rejected(e.to_string()))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ClassifierStrategy, GateThresholds, GatingPolicy, HeuristicClassifier, MockWindSource,
        RelaySettings, WindReading,
    };
    use common::domain::{stage, DomainError, MockProcessedEventProducer, ProcessedEvent};
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::Mutex;
    use std::time::Duration;
    use tower::ServiceExt;

    fn png(pixel: [u8; 3]) -> Vec<u8> {
        let img = RgbImage::from_pixel(320, 240, Rgb(pixel));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn consumer(producer: MockProcessedEventProducer) -> FrameConsumerService {
        let mut wind = MockWindSource::new();
        wind.expect_sample().returning(|| WindReading {
            speed_mps: 1.0,
            direction_deg: 10.0,
        });

        let relay = FrameRelayService::new(
            RelaySettings {
                region: "alps".to_string(),
                frame_width: 320,
                frame_height: 240,
                jpeg_quality: 90,
                classify_timeout: Duration::from_secs(1),
            },
            Arc::new(HeuristicClassifier::default()),
            GatingPolicy::new(GateThresholds::for_strategy(ClassifierStrategy::Heuristic))
                .unwrap(),
            Arc::new(wind),
            Arc::new(producer),
        )
        .unwrap();

        FrameConsumerService::new(Arc::new(relay))
    }

    fn recording_producer() -> (MockProcessedEventProducer, Arc<Mutex<Vec<ProcessedEvent>>>) {
        let published = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&published);
        let mut producer = MockProcessedEventProducer::new();
        producer.expect_publish().returning(move |event| {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        });
        (producer, published)
    }

    fn request(subject: &str, payload: Vec<u8>) -> ConsumeRequest {
        ConsumeRequest::new(subject.to_string(), payload.into(), None)
    }

    #[tokio::test]
    async fn test_json_frame_keeps_trace_and_area_from_subject() {
        // Arrange
        let (producer, published) = recording_producer();
        let service = consumer(producer);
        let trace = TraceContext::begin_at(stage::CAPTURE);
        let trace_id = trace.trace_id().to_string();
        let message = FrameMessage::new("somewhere-else", trace, &png([200, 56, 43]));
        let payload = serde_json::to_vec(&message).unwrap();

        // Act
        let response = service
            .oneshot(request("area.north.frame", payload))
            .await
            .unwrap();

        // Assert
        assert_eq!(response, ConsumeResponse::Handled);
        let published = published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].area, "north");
        assert_eq!(published[0].trace.trace_id(), trace_id);
        assert!(published[0].trace.has_stage(stage::CAPTURE));
    }

    #[tokio::test]
    async fn test_raw_frame_starts_new_trace() {
        let (producer, published) = recording_producer();
        let service = consumer(producer);

        let response = service
            .oneshot(request("area.north.frame", png([200, 56, 43])))
            .await
            .unwrap();

        assert!(response.is_handled());
        let published = published.lock().unwrap();
        assert!(!published[0].trace.has_stage(stage::CAPTURE));
        assert!(published[0].trace.has_stage(stage::EDGE_SENT));
    }

    #[tokio::test]
    async fn test_undecodable_payload_rejected() {
        let (producer, published) = recording_producer();
        let service = consumer(producer);

        let response = service
            .oneshot(request("area.north.frame", vec![0x00, 0x01, 0x02]))
            .await
            .unwrap();

        assert!(matches!(response, ConsumeResponse::Rejected(Some(_))));
        assert!(published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_json_rejected() {
        let (producer, _) = recording_producer();
        let service = consumer(producer);

        let response = service
            .oneshot(request("area.north.frame", b"{\"area\": 7}".to_vec()))
            .await
            .unwrap();

        assert!(!response.is_handled());
    }

    #[tokio::test]
    async fn test_unexpected_subject_rejected() {
        let (producer, _) = recording_producer();
        let service = consumer(producer);

        let response = service
            .oneshot(request("region.alps.processed", png([200, 56, 43])))
            .await
            .unwrap();

        assert!(!response.is_handled());
    }

    #[tokio::test]
    async fn test_publish_failure_returns_error() {
        let mut producer = MockProcessedEventProducer::new();
        producer
            .expect_publish()
            .returning(|_| Err(DomainError::PublishError(anyhow::anyhow!("no connection"))));
        let service = consumer(producer);

        let result = service
            .oneshot(request("area.north.frame", png([200, 56, 43])))
            .await;

        assert!(result.is_err());
    }

    #[test]
    fn test_leading_whitespace_still_json() {
        let message = FrameMessage::new("north", TraceContext::begin(), b"abc");
        let mut payload = b"  \n".to_vec();
        payload.extend(serde_json::to_vec(&message).unwrap());

        let frame = decode_inbound_frame("north".to_string(), &payload).unwrap();

        assert_eq!(frame.frame_bytes, b"abc");
        assert_eq!(frame.trace, message.trace);
    }
}
