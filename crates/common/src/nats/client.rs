use crate::nats::traits::{MessagePublisher, MessageSubscriber};
use crate::nats::ConsumeRequest;
use anyhow::{Context, Result};
use async_nats::HeaderMap;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub struct NatsClient {
    client: async_nats::Client,
}

impl NatsClient {
    pub async fn connect(url: &str, timeout: std::time::Duration) -> Result<Self> {
        info!(url = %url, timeout_ms = timeout.as_millis(), "Connecting to NATS");

        // Configure connection timeout for establishing the TCP connection
        let client = async_nats::ConnectOptions::new()
            .connection_timeout(timeout)
            .connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Successfully connected to NATS");
        Ok(Self { client })
    }

    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }

    /// Create a MessagePublisher trait object from this client
    pub fn create_publisher_client(&self) -> Arc<dyn MessagePublisher> {
        Arc::new(NatsCorePublisher::new(self.client.clone()))
    }

    /// Create a MessageSubscriber trait object from this client
    pub fn create_subscriber_client(&self) -> Arc<dyn MessageSubscriber> {
        Arc::new(NatsCoreSubscriber::new(self.client.clone()))
    }

    /// Flush pending publishes and close every subscription
    pub async fn drain(&self) -> Result<()> {
        info!("Draining NATS connection");
        self.client
            .drain()
            .await
            .context("Failed to drain NATS connection")?;
        Ok(())
    }
}

/// Concrete implementation of MessagePublisher using async-nats
pub struct NatsCorePublisher {
    client: async_nats::Client,
}

impl NatsCorePublisher {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MessagePublisher for NatsCorePublisher {
    #[instrument(skip(self, headers, payload), fields(subject = %subject, payload_size = payload.len()))]
    async fn publish_with_headers(
        &self,
        subject: String,
        headers: HeaderMap,
        payload: bytes::Bytes,
    ) -> Result<()> {
        self.client
            .publish_with_headers(subject, headers, payload)
            .await
            .context("Failed to publish message to NATS")?;
        Ok(())
    }
}

/// Concrete implementation of MessageSubscriber using async-nats
pub struct NatsCoreSubscriber {
    client: async_nats::Client,
}

impl NatsCoreSubscriber {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MessageSubscriber for NatsCoreSubscriber {
    async fn subscribe(&self, subject: String) -> Result<BoxStream<'static, ConsumeRequest>> {
        debug!(subject = %subject, "subscribing");

        let subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .with_context(|| format!("Failed to subscribe to {subject}"))?;

        Ok(subscriber
            .map(|msg| ConsumeRequest::new(msg.subject.to_string(), msg.payload, msg.headers))
            .boxed())
    }
}
