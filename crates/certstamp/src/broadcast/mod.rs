//! Issuance progress broadcasting for real-time status streaming.

mod progress;

pub use progress::{IssuanceEvent, IssuancePayload, ProgressBroadcaster};
