mod message;
mod result;
mod topic;
mod trace;

pub use message::*;
pub use result::*;
pub use topic::*;
pub use trace::*;
