use common::domain::{
    region_processed_subject, DomainError, DomainResult, ProcessedEvent, ProcessedEventProducer,
};
use common::nats::{
    LayeredPublisher, MessagePublisher, NatsPublisherBuilder, NatsTracingConfig, PublishRequest,
};
use std::sync::Arc;
use tower::Service;
use tracing::debug;

/// Publishes forwarded frames as JSON on `region.<region>.processed`.
pub struct ProcessedEventJsonProducer {
    publisher: LayeredPublisher,
    subject: String,
}

impl ProcessedEventJsonProducer {
    pub fn new(publisher: Arc<dyn MessagePublisher>, region: &str) -> DomainResult<Self> {
        let subject = region_processed_subject(region)?;

        debug!(subject = %subject, "initialized ProcessedEventJsonProducer");

        let publisher = NatsPublisherBuilder::new(publisher)
            .with_tracing(NatsTracingConfig::new("processed_event_producer"))
            .with_logging()
            .build();

        Ok(Self { publisher, subject })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

#[async_trait::async_trait]
impl ProcessedEventProducer for ProcessedEventJsonProducer {
    async fn publish(&self, event: &ProcessedEvent) -> DomainResult<()> {
        let payload = serde_json::to_vec(event)?;
        let request = PublishRequest::new(self.subject.clone(), payload);

        // Tower services are Clone; each publish drives its own copy
        self.publisher
            .clone()
            .call(request)
            .await
            .map_err(DomainError::PublishError)?;

        Ok(())
    }
}
