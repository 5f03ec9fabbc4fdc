use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use super::types::{PublishRequest, PublishResponse};
use super::{NatsPublishLoggingLayer, NatsPublishTracingLayer, NatsTracingConfig};
use crate::nats::MessagePublisher;
use anyhow::Result;
use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceBuilder};

/// Publisher stack with its layers erased, shareable across tasks.
pub type LayeredPublisher = BoxCloneSyncService<PublishRequest, PublishResponse, anyhow::Error>;

/// Inner service that performs the actual NATS publish
#[derive(Clone)]
pub struct NatsPublishService {
    publisher: Arc<dyn MessagePublisher>,
}

impl NatsPublishService {
    pub fn new(publisher: Arc<dyn MessagePublisher>) -> Self {
        Self { publisher }
    }
}

impl Service<PublishRequest> for NatsPublishService {
    type Response = PublishResponse;
    type Error = anyhow::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: PublishRequest) -> Self::Future {
        let publisher = Arc::clone(&self.publisher);

        Box::pin(async move {
            let PublishRequest {
                subject,
                payload,
                headers,
            } = req;
            let payload_bytes = payload.len();

            publisher
                .publish_with_headers(subject.clone(), headers, payload)
                .await?;

            Ok(PublishResponse {
                subject,
                payload_bytes,
            })
        })
    }
}

/// Builder for creating a layered NATS publisher service
pub struct NatsPublisherBuilder {
    publisher: Arc<dyn MessagePublisher>,
    tracing_config: Option<NatsTracingConfig>,
    with_logging: bool,
}

impl NatsPublisherBuilder {
    pub fn new(publisher: Arc<dyn MessagePublisher>) -> Self {
        Self {
            publisher,
            tracing_config: None,
            with_logging: false,
        }
    }

    pub fn with_tracing(mut self, config: NatsTracingConfig) -> Self {
        self.tracing_config = Some(config);
        self
    }

    pub fn with_logging(mut self) -> Self {
        self.with_logging = true;
        self
    }

    /// Layer order (outermost first): Tracing -> Logging -> Publish
    pub fn build(self) -> LayeredPublisher {
        let inner = NatsPublishService::new(self.publisher);

        match (self.tracing_config, self.with_logging) {
            (Some(tracing_config), true) => BoxCloneSyncService::new(
                ServiceBuilder::new()
                    .layer(NatsPublishTracingLayer::new(tracing_config))
                    .layer(NatsPublishLoggingLayer::new())
                    .service(inner),
            ),
            (Some(tracing_config), false) => BoxCloneSyncService::new(
                ServiceBuilder::new()
                    .layer(NatsPublishTracingLayer::new(tracing_config))
                    .service(inner),
            ),
            (None, true) => BoxCloneSyncService::new(
                ServiceBuilder::new()
                    .layer(NatsPublishLoggingLayer::new())
                    .service(inner),
            ),
            (None, false) => BoxCloneSyncService::new(inner),
        }
    }
}
