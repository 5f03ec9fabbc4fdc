mod classifier;
mod error;
mod frame;
mod gating;
mod heuristic;
mod relay_service;
mod remote;
mod wind;

pub use classifier::*;
pub use error::*;
pub use frame::*;
pub use gating::*;
pub use heuristic::*;
pub use relay_service::*;
pub use remote::*;
pub use wind::*;
