mod frame_consumer_service;
mod processed_event_producer;

pub use frame_consumer_service::*;
pub use processed_event_producer::*;
