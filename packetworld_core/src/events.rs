//! Notifications broadcast to observers after the world changes.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum WorldEvent {
    /// An influence set has been applied and the clock advanced.
    Updated { time: u64, packets_remaining: usize },

    /// The last packet has been delivered. Sent once.
    AllPacketsDelivered { time: u64 },
}

impl WorldEvent {
    pub fn time(&self) -> u64 {
        match self {
            WorldEvent::Updated { time, .. } | WorldEvent::AllPacketsDelivered { time } => *time,
        }
    }
}
