pub mod domain;
pub mod nats;
pub mod telemetry;
pub mod validation;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockProcessedEventProducer;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockMessagePublisher;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockMessageSubscriber;
