use crate::nats::ConsumeRequest;
use anyhow::Result;
use async_nats::HeaderMap;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Trait for core NATS publish operations
/// Delivery is at-most-once: a successful return means the message was handed
/// to the connection, not that any subscriber received it
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publish a message with headers to a concrete subject
    async fn publish_with_headers(
        &self,
        subject: String,
        headers: HeaderMap,
        payload: bytes::Bytes,
    ) -> Result<()>;
}

/// Trait for core NATS subscribe operations
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MessageSubscriber: Send + Sync {
    /// Subscribe to one concrete subject
    /// The returned stream ends when the subscription or connection closes
    async fn subscribe(&self, subject: String) -> Result<BoxStream<'static, ConsumeRequest>>;
}
