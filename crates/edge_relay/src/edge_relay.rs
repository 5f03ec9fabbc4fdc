use crate::domain::{
    build_classifier, ClassifierSettings, FrameRelayService, GateThresholds, GatingPolicy,
    RandomWind, RelaySettings, WindSource,
};
use crate::nats::{FrameConsumerService, ProcessedEventJsonProducer};
use anyhow::Context;
use common::domain::area_frame_subjects;
use common::nats::{
    ConsumeRequest, ConsumeResponse, MessagePublisher, MessageSubscriber, NatsClient,
    NatsConsumeLoggingLayer, NatsConsumeTracingLayer, SubjectConsumer,
};
use common::validation::{subject_token, validate_struct};
use garde::Validate;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::util::BoxCloneService;
use tower::ServiceBuilder;
use tracing::info;

type FrameService = BoxCloneService<ConsumeRequest, ConsumeResponse, anyhow::Error>;

#[derive(Debug, Clone, Validate)]
pub struct EdgeRelayConfig {
    #[garde(dive)]
    pub relay: RelaySettings,
    #[garde(length(min = 1), inner(custom(subject_token)))]
    pub areas: Vec<String>,
    #[garde(range(min = 1))]
    pub max_in_flight: usize,
    #[garde(skip)]
    pub classifier: ClassifierSettings,
    #[garde(skip)]
    pub thresholds: GateThresholds,
}

impl EdgeRelayConfig {
    /// Every startup check that needs no bus connection. Returns the gating
    /// policy the thresholds describe.
    pub fn validated(&self) -> anyhow::Result<GatingPolicy> {
        validate_struct(self).context("invalid edge relay configuration")?;
        GatingPolicy::new(self.thresholds).context("invalid gate thresholds")
    }
}

/// Edge relay module: one subscription per area, one shared relay service and
/// one output subject for the region.
pub struct EdgeRelay {
    consumer: SubjectConsumer<FrameService>,
}

impl EdgeRelay {
    pub fn new(nats_client: Arc<NatsClient>, config: EdgeRelayConfig) -> anyhow::Result<Self> {
        Self::with_clients(
            nats_client.create_publisher_client(),
            nats_client.create_subscriber_client(),
            Arc::new(RandomWind),
            config,
        )
    }

    /// Wire the module over explicit bus clients and wind source.
    ///
    /// Every check here runs before any subscription exists, so a bad
    /// configuration never starts consuming.
    pub fn with_clients(
        publisher: Arc<dyn MessagePublisher>,
        subscriber: Arc<dyn MessageSubscriber>,
        wind: Arc<dyn WindSource>,
        config: EdgeRelayConfig,
    ) -> anyhow::Result<Self> {
        info!(
            region = %config.relay.region,
            areas = ?config.areas,
            strategy = %config.classifier.strategy,
            "Initializing Edge Relay module"
        );

        let policy = config.validated()?;
        let subjects = area_frame_subjects(&config.areas)?;
        let classifier = build_classifier(&config.classifier)?;

        let producer = Arc::new(ProcessedEventJsonProducer::new(
            publisher,
            &config.relay.region,
        )?);
        let relay_service = Arc::new(FrameRelayService::new(
            config.relay,
            classifier,
            policy,
            wind,
            producer,
        )?);

        let service = ServiceBuilder::new()
            .layer(NatsConsumeTracingLayer::new())
            .layer(NatsConsumeLoggingLayer::new())
            .service(FrameConsumerService::new(relay_service));

        let consumer = SubjectConsumer::new(
            subscriber,
            subjects,
            config.max_in_flight,
            BoxCloneService::new(service),
        );

        info!("Edge Relay initialized");

        Ok(Self { consumer })
    }

    pub fn into_runner_process(
        self,
    ) -> Box<
        dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
            + Send,
    > {
        let consumer = self.consumer;
        Box::new(move |ctx| Box::pin(async move { consumer.run(ctx).await }))
    }
}
