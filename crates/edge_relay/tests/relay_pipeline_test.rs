#![cfg(feature = "integration-tests")]

use common::domain::{stage, FrameMessage, ProcessedEvent, RelayReason, TraceContext};
use edge_relay::{
    ClassifierSettings, ClassifierStrategy, EdgeRelay, EdgeRelayConfig, GateThresholds,
    RelaySettings, WindReading, WindSource,
};
use image::{ImageFormat, Rgb, RgbImage};
use mocks::InMemoryBus;
use std::collections::HashSet;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const RED_ORANGE: [u8; 3] = [200, 56, 43];
const GREY: [u8; 3] = [200, 200, 200];

// In-memory bus standing in for a NATS connection
mod mocks {
    use async_nats::HeaderMap;
    use async_trait::async_trait;
    use bytes::Bytes;
    use common::nats::{ConsumeRequest, MessagePublisher, MessageSubscriber};
    use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
    use futures::stream::BoxStream;
    use futures::StreamExt;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    pub struct InMemoryBus {
        subscribers: Mutex<HashMap<String, Vec<UnboundedSender<ConsumeRequest>>>>,
        published_tx: UnboundedSender<(String, Bytes)>,
        published_rx: tokio::sync::Mutex<UnboundedReceiver<(String, Bytes)>>,
        fail_publish: AtomicBool,
    }

    impl InMemoryBus {
        pub fn new() -> Self {
            let (published_tx, published_rx) = unbounded();
            Self {
                subscribers: Mutex::new(HashMap::new()),
                published_tx,
                published_rx: tokio::sync::Mutex::new(published_rx),
                fail_publish: AtomicBool::new(false),
            }
        }

        pub fn fail_publishes(&self) {
            self.fail_publish.store(true, Ordering::SeqCst);
        }

        pub async fn wait_for_subscriptions(&self, count: usize) {
            for _ in 0..200 {
                let subscribed: usize = self.subscribers.lock().unwrap().values().map(Vec::len).sum();
                if subscribed >= count {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("subscriptions never reached {count}");
        }

        /// Deliver to every subscriber of `subject`, like a camera would
        pub fn inject(&self, subject: &str, payload: Vec<u8>) {
            let payload = Bytes::from(payload);
            let subscribers = self.subscribers.lock().unwrap();
            for sender in subscribers.get(subject).into_iter().flatten() {
                let _ = sender.unbounded_send(ConsumeRequest::new(
                    subject.to_string(),
                    payload.clone(),
                    None,
                ));
            }
        }

        /// Next message the relay published, if one arrives within `wait`
        pub async fn next_published(&self, wait: Duration) -> Option<(String, Bytes)> {
            let mut rx = self.published_rx.lock().await;
            tokio::time::timeout(wait, rx.next()).await.ok().flatten()
        }
    }

    #[async_trait]
    impl MessagePublisher for InMemoryBus {
        async fn publish_with_headers(
            &self,
            subject: String,
            _headers: HeaderMap,
            payload: Bytes,
        ) -> anyhow::Result<()> {
            if self.fail_publish.load(Ordering::SeqCst) {
                anyhow::bail!("connection closed");
            }
            self.published_tx.unbounded_send((subject, payload))?;
            Ok(())
        }
    }

    #[async_trait]
    impl MessageSubscriber for InMemoryBus {
        async fn subscribe(&self, subject: String) -> anyhow::Result<BoxStream<'static, ConsumeRequest>> {
            let (tx, rx) = unbounded();
            self.subscribers
                .lock()
                .unwrap()
                .entry(subject)
                .or_default()
                .push(tx);
            Ok(rx.boxed())
        }
    }
}

struct FixedWind;

impl WindSource for FixedWind {
    fn sample(&self) -> WindReading {
        WindReading {
            speed_mps: 7.5,
            direction_deg: 180.0,
        }
    }
}

fn png(pixel: [u8; 3], width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb(pixel));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

fn frame_json(area: &str, pixel: [u8; 3]) -> Vec<u8> {
    let message = FrameMessage::new(
        area,
        TraceContext::begin_at(stage::CAPTURE),
        &png(pixel, 320, 240),
    );
    serde_json::to_vec(&message).unwrap()
}

fn heuristic_config(areas: &[&str]) -> EdgeRelayConfig {
    EdgeRelayConfig {
        relay: RelaySettings {
            region: "alps".to_string(),
            frame_width: 320,
            frame_height: 240,
            jpeg_quality: 90,
            classify_timeout: Duration::from_secs(2),
        },
        areas: areas.iter().map(|a| a.to_string()).collect(),
        max_in_flight: 16,
        classifier: ClassifierSettings::default(),
        thresholds: GateThresholds::for_strategy(ClassifierStrategy::Heuristic),
    }
}

async fn start(
    bus: &Arc<InMemoryBus>,
    config: EdgeRelayConfig,
) -> (CancellationToken, JoinHandle<anyhow::Result<()>>) {
    let areas = config.areas.len();
    let relay = EdgeRelay::with_clients(bus.clone(), bus.clone(), Arc::new(FixedWind), config)
        .expect("edge relay should build");

    let ctx = CancellationToken::new();
    let process = relay.into_runner_process();
    let handle = tokio::spawn(process(ctx.clone()));
    bus.wait_for_subscriptions(areas).await;

    (ctx, handle)
}

async fn next_event(bus: &InMemoryBus) -> (String, ProcessedEvent) {
    let (subject, payload) = bus
        .next_published(Duration::from_secs(5))
        .await
        .expect("expected a processed event");
    (subject, serde_json::from_slice(&payload).unwrap())
}

#[tokio::test]
async fn test_fire_frame_forwarded_to_region_subject() {
    // Arrange
    let bus = Arc::new(InMemoryBus::new());
    let (ctx, handle) = start(&bus, heuristic_config(&["north"])).await;

    // Act
    bus.inject("area.north.frame", frame_json("north", RED_ORANGE));
    let (subject, event) = next_event(&bus).await;

    // Assert
    assert_eq!(subject, "region.alps.processed");
    assert_eq!(event.area, "north");
    assert_eq!(event.region, "alps");
    assert_eq!(event.conf_fire, 1.0);
    assert_eq!(event.wind_speed, 7.5);
    assert_eq!(event.reason, RelayReason::Suspicious);

    let trace = &event.trace;
    let received = trace.timestamp(stage::EDGE_RECEIVED).unwrap();
    let filtered = trace.timestamp(stage::EDGE_FILTERED).unwrap();
    let sent = trace.timestamp(stage::EDGE_SENT).unwrap();
    assert!(received <= filtered && filtered <= sent);

    ctx.cancel();
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_grey_frame_dropped_without_smoke_gate() {
    // Arrange
    let bus = Arc::new(InMemoryBus::new());
    let mut config = heuristic_config(&["north"]);
    config.thresholds.smoke = None;
    let (ctx, handle) = start(&bus, config).await;

    // Act
    bus.inject("area.north.frame", frame_json("north", GREY));
    bus.inject("area.north.frame", frame_json("north", RED_ORANGE));

    // Assert
    let (_, event) = next_event(&bus).await;
    assert_eq!(event.conf_fire, 1.0);
    assert!(bus.next_published(Duration::from_millis(300)).await.is_none());

    ctx.cancel();
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_large_source_frame_is_resized_before_scoring() {
    let bus = Arc::new(InMemoryBus::new());
    let (ctx, handle) = start(&bus, heuristic_config(&["north"])).await;

    bus.inject("area.north.frame", png(RED_ORANGE, 1280, 960));
    let (_, event) = next_event(&bus).await;

    let jpeg = image::load_from_memory(&event.frame_jpeg().unwrap()).unwrap();
    assert_eq!((jpeg.width(), jpeg.height()), (320, 240));

    ctx.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_undecodable_frame_does_not_stop_subscription() {
    // Arrange
    let bus = Arc::new(InMemoryBus::new());
    let (ctx, handle) = start(&bus, heuristic_config(&["north"])).await;

    // Act
    bus.inject("area.north.frame", b"\xff\xd8 truncated jpeg".to_vec());
    bus.inject("area.north.frame", frame_json("north", RED_ORANGE));

    // Assert
    let (_, event) = next_event(&bus).await;
    assert_eq!(event.area, "north");
    assert!(!handle.is_finished());

    ctx.cancel();
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_frame_already_received_is_not_relayed_again() {
    let bus = Arc::new(InMemoryBus::new());
    let (ctx, handle) = start(&bus, heuristic_config(&["north"])).await;
    let replayed = FrameMessage::new(
        "north",
        TraceContext::begin_at(stage::CAPTURE)
            .stamp(stage::EDGE_RECEIVED)
            .unwrap(),
        &png(RED_ORANGE, 320, 240),
    );

    bus.inject("area.north.frame", serde_json::to_vec(&replayed).unwrap());

    assert!(bus.next_published(Duration::from_millis(300)).await.is_none());
    assert!(!handle.is_finished());

    ctx.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_concurrent_areas_keep_traces_separate() {
    // Arrange
    let areas: Vec<String> = (0..8).map(|i| format!("zone{i}")).collect();
    let area_refs: Vec<&str> = areas.iter().map(String::as_str).collect();
    let bus = Arc::new(InMemoryBus::new());
    let (ctx, handle) = start(&bus, heuristic_config(&area_refs)).await;

    let mut sent_ids = HashSet::new();
    let mut payloads = Vec::new();
    for area in &areas {
        let message = FrameMessage::new(
            area.as_str(),
            TraceContext::begin_at(stage::CAPTURE),
            &png(RED_ORANGE, 320, 240),
        );
        sent_ids.insert(message.trace.trace_id().to_string());
        payloads.push((format!("area.{area}.frame"), serde_json::to_vec(&message).unwrap()));
    }

    // Act
    for (subject, payload) in payloads {
        bus.inject(&subject, payload);
    }
    let mut events = Vec::new();
    for _ in 0..areas.len() {
        events.push(next_event(&bus).await.1);
    }

    // Assert
    let received_ids: HashSet<String> = events
        .iter()
        .map(|e| e.trace.trace_id().to_string())
        .collect();
    assert_eq!(received_ids, sent_ids);

    let received_areas: HashSet<&str> = events.iter().map(|e| e.area.as_str()).collect();
    assert_eq!(received_areas.len(), areas.len());

    for event in &events {
        assert_eq!(event.trace.timestamps().len(), 4);
    }

    ctx.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_stuck_classifier_forwards_inconclusive_and_keeps_serving() {
    // Arrange: a listener that accepts connections but never answers
    let silent = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = silent.local_addr().unwrap();

    let bus = Arc::new(InMemoryBus::new());
    let mut config = heuristic_config(&["north"]);
    config.relay.classify_timeout = Duration::from_millis(200);
    config.classifier = ClassifierSettings {
        strategy: ClassifierStrategy::Remote,
        remote_url: format!("http://{addr}"),
        remote_timeout: Duration::from_secs(30),
        jpeg_quality: 80,
    };
    config.thresholds = GateThresholds::for_strategy(ClassifierStrategy::Remote);
    let (ctx, handle) = start(&bus, config).await;

    // Act
    bus.inject("area.north.frame", frame_json("north", GREY));
    bus.inject("area.north.frame", frame_json("north", RED_ORANGE));

    // Assert
    for _ in 0..2 {
        let (_, event) = next_event(&bus).await;
        assert_eq!(event.reason, RelayReason::Inconclusive);
        assert!(event.trace.has_stage(stage::EDGE_FILTERED));
    }

    ctx.cancel();
    handle.await.unwrap().unwrap();
    drop(silent);
}

#[tokio::test]
async fn test_publish_failure_stops_the_relay() {
    // Arrange
    let bus = Arc::new(InMemoryBus::new());
    bus.fail_publishes();
    let (_ctx, handle) = start(&bus, heuristic_config(&["north"])).await;

    // Act
    bus.inject("area.north.frame", frame_json("north", RED_ORANGE));
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("relay should stop on its own")
        .unwrap();

    // Assert
    assert!(result.is_err());
}
