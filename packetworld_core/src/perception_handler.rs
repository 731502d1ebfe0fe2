//! Closes perceive phases. There is nothing to apply; the envelope only has
//! to be acknowledged so the sphere can complete.

use tracing::trace;

use crate::envelope::{Envelope, PerceptionAck};
use crate::handler::Handler;

#[derive(Debug, Default)]
pub struct PerceptionHandler;

impl Handler for PerceptionHandler {
    type Payload = PerceptionAck;

    fn name(&self) -> &'static str {
        "perception"
    }

    fn process(&mut self, envelope: Envelope<PerceptionAck>) -> usize {
        trace!("{} actors closed perception in {}", envelope.payload.actors.len(), envelope.sphere);
        envelope.outcomes
    }
}
