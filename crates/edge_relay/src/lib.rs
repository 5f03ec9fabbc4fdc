pub mod domain;
pub mod edge_relay;
pub mod nats;

pub use domain::*;
pub use edge_relay::*;
pub use nats::*;
