//! Postal service: delivers the mail of closed talk phases.

use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{trace, warn};

use crate::envelope::{Envelope, MailBag};
use crate::handler::{Handler, TurnRotation};
use crate::registry::ActorRegistry;
use crate::status::KernelStats;

/// Delivers every mail of a bag into its recipient's inbox.
///
/// Delivery order within a bag is a fair random rotation, so no sender is
/// systematically first. Undeliverable mail is logged and dropped.
pub struct PostalService {
    registry: Arc<ActorRegistry>,
    stats: Arc<KernelStats>,
    rng: ChaCha8Rng,
}

impl PostalService {
    pub fn new(registry: Arc<ActorRegistry>, stats: Arc<KernelStats>, seed: u64) -> Self {
        Self {
            registry,
            stats,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl Handler for PostalService {
    type Payload = MailBag;

    fn name(&self) -> &'static str {
        "postal"
    }

    fn process(&mut self, envelope: Envelope<MailBag>) -> usize {
        let mut mails: Vec<_> = envelope.payload.mails.into_iter().map(Some).collect();
        let mut rotation = TurnRotation::new(mails.len());

        for _ in 0..mails.len() {
            let Some(mail) = rotation.next(&mut self.rng).and_then(|i| mails[i].take()) else {
                continue;
            };
            trace!("delivering {}", mail);
            match self.registry.deliver(mail) {
                Ok(()) => self.stats.add_mails_delivered(1),
                Err(e) => {
                    warn!("mail dropped: {}", e);
                    self.stats.add_mails_dropped(1);
                }
            }
        }
        envelope.outcomes
    }
}
