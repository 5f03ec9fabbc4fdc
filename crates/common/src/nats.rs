mod client;
mod middleware;
mod propagation;
mod subject_consumer;
mod traits;

pub use client::*;
pub use middleware::*;
pub use propagation::*;
pub use subject_consumer::*;
pub use traits::*;
