mod consumer_logging;
mod consumer_tracing;
mod consumer_types;
mod logging;
mod publisher;
mod tracing;
mod types;

pub use consumer_logging::*;
pub use consumer_tracing::*;
pub use consumer_types::*;
pub use logging::*;
pub use publisher::*;
pub use tracing::*;
pub use types::*;
