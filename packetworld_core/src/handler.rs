//! Handlers: single-consumer workers that process dispatched envelopes.
//!
//! ```text
//!  Collector ──deposit──► [inbox] ──► Handler::process ──► Handled{sphere, n}
//!      ▲                                                          │
//!      └──────────────────── coordinator inbox ◄──────────────────┘
//! ```
//!
//! Each handler runs on its own task and sees envelopes one at a time, in
//! the order they were deposited.

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::collector::CoordinatorMsg;
use crate::envelope::Envelope;
use crate::error::KernelError;

pub trait Handler: Send + 'static {
    type Payload: Send + 'static;

    fn name(&self) -> &'static str;

    /// Processes one envelope and returns the number of outcomes it has
    /// handled (normally `envelope.outcomes`).
    fn process(&mut self, envelope: Envelope<Self::Payload>) -> usize;
}

/// Sending side of a handler's inbox.
#[derive(Debug)]
pub struct HandlerHandle<P> {
    name: &'static str,
    inbox: mpsc::UnboundedSender<Envelope<P>>,
}

impl<P> Clone for HandlerHandle<P> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            inbox: self.inbox.clone(),
        }
    }
}

impl<P> HandlerHandle<P> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Queues an envelope for processing.
    pub fn deposit(&self, envelope: Envelope<P>) -> Result<(), KernelError> {
        self.inbox
            .send(envelope)
            .map_err(|_| KernelError::CoordinatorClosed)
    }
}

/// Starts `handler` on its own task. Completions are reported on
/// `completions`. The task ends when every handle is dropped.
pub fn spawn_handler<H: Handler>(
    mut handler: H,
    completions: mpsc::UnboundedSender<CoordinatorMsg>,
) -> (HandlerHandle<H::Payload>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope<H::Payload>>();
    let name = handler.name();

    let task = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            let sphere = envelope.sphere;
            let expected = envelope.outcomes;
            let outcomes = handler.process(envelope);
            trace!("{} handled {}/{} outcomes of {}", name, outcomes, expected, sphere);
            if completions.send(CoordinatorMsg::Handled { sphere, outcomes }).is_err() {
                break;
            }
        }
        debug!("{} stopped", name);
    });

    (HandlerHandle { name, inbox: tx }, task)
}

/// Fair random rotation over `n` slots.
///
/// Every call picks uniformly among the slots not yet taken in the current
/// round; once every slot has been taken the round resets.
#[derive(Debug, Clone)]
pub struct TurnRotation {
    taken: Vec<bool>,
}

impl TurnRotation {
    pub fn new(n: usize) -> Self {
        Self { taken: vec![false; n] }
    }

    /// Next slot, or `None` if there are no slots at all.
    pub fn next<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<usize> {
        if self.taken.is_empty() {
            return None;
        }
        if self.taken.iter().all(|t| *t) {
            self.taken.iter_mut().for_each(|t| *t = false);
        }
        let eligible: Vec<usize> = self
            .taken
            .iter()
            .enumerate()
            .filter(|(_, t)| !**t)
            .map(|(i, _)| i)
            .collect();
        let pick = eligible[rng.gen_range(0..eligible.len())];
        self.taken[pick] = true;
        Some(pick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sphere::SphereId;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::BTreeSet;

    #[test]
    fn test_rotation_visits_every_slot_once_per_round() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut rot = TurnRotation::new(5);

        for _ in 0..3 {
            let round: BTreeSet<_> = (0..5).map(|_| rot.next(&mut rng).unwrap()).collect();
            assert_eq!(round.len(), 5);
        }
        assert_eq!(TurnRotation::new(0).next(&mut rng), None);
    }

    struct Echo;

    impl Handler for Echo {
        type Payload = ();

        fn name(&self) -> &'static str {
            "echo"
        }

        fn process(&mut self, envelope: Envelope<()>) -> usize {
            envelope.outcomes
        }
    }

    #[tokio::test]
    async fn test_handler_reports_completion() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (handle, task) = spawn_handler(Echo, tx);

        handle
            .deposit(Envelope {
                sphere: SphereId(3),
                outcomes: 2,
                payload: (),
            })
            .unwrap();

        match rx.recv().await {
            Some(CoordinatorMsg::Handled { sphere, outcomes }) => {
                assert_eq!(sphere, SphereId(3));
                assert_eq!(outcomes, 2);
            }
            other => panic!("unexpected message: {:?}", other.is_some()),
        }

        drop(handle);
        task.await.unwrap();
    }
}
