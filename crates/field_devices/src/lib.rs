//! Boundary devices that sit around the edge relay: cameras feeding frames in
//! and alarm devices receiving alerts out.

pub mod alarm_listener;
pub mod camera_feed;
pub mod trace_log;

pub use alarm_listener::*;
pub use camera_feed::*;
pub use trace_log::*;
