//! The topic runtime — spec.md §3 "Topic", §4.3-§4.6, §5.

mod actor;
mod router;
mod state;

pub use actor::{JoinOutcome, TopicHandle, spawn};
pub use state::{CloseReason, GATEWAY_SENDER, Outbound};
