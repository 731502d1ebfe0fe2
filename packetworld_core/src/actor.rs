//! The actor runtime: one task per actor, cycling through its phases.
//!
//! ```text
//!             ┌──────────── permission ────────────┐
//!             ▼                                    │
//!   Perceiving ──► Talking ──► Doing ──► (back to Perceiving)
//!        │            │          │
//!        └─ outcome ──┴──────────┴──► collector ──► decision (gate)
//! ```
//!
//! Every phase ends by submitting exactly one outcome and suspending on the
//! actor's gate until the sphere it joined is fully handled. The decision
//! that wakes it says whether the phase may advance; without permission the
//! same phase runs again.

use std::sync::Arc;

use packetworld_env::{energy, ActorId, AgentState, Influence, Mail, MailBuffer, Perception, SharedWorld};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::behaviour::{Behaviour, Context, Memory, TalkContext};
use crate::collector::CoordinatorMsg;
use crate::mailbox::MailBox;
use crate::outcome::{Outcome, SyncSet};
use crate::registry::ActorRegistry;
use crate::status::{ActorKind, ActorStatus};
use crate::synchronizer::Synchronizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum Phase {
    Perceiving = 0,
    Talking = 1,
    Doing = 2,
}

impl Phase {
    pub fn next(self) -> Phase {
        match self {
            Phase::Perceiving => Phase::Talking,
            Phase::Talking => Phase::Doing,
            Phase::Doing => Phase::Perceiving,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Phase {
        match raw {
            1 => Phase::Talking,
            2 => Phase::Doing,
            _ => Phase::Perceiving,
        }
    }
}

/// Swaps an influence the agent cannot pay for with an idle one: a skip if
/// any charge is left, nothing at all on an empty battery.
pub fn gate_on_energy(influence: Influence, state: &AgentState) -> Influence {
    let cost = energy::cost_of(&influence.kind, state.is_carrying());
    if state.battery >= cost {
        influence
    } else if state.battery > 0 {
        trace!("agent {} too weak for {}, skipping", state.id, influence.kind.name());
        Influence::skip(influence.origin)
    } else {
        Influence::noop(influence.origin)
    }
}

/// Kernel-side wiring of an actor task.
pub(crate) struct ActorLinks {
    pub world: SharedWorld,
    pub registry: Arc<ActorRegistry>,
    pub synchronizer: Arc<dyn Synchronizer>,
    pub coordinator: mpsc::UnboundedSender<CoordinatorMsg>,
    pub gate: mpsc::Receiver<bool>,
    pub cancel: CancellationToken,
    pub mailbox: Arc<Mutex<MailBox>>,
    pub status: Arc<ActorStatus>,
}

pub(crate) struct ActorRuntime {
    id: ActorId,
    name: String,
    kind: ActorKind,
    behaviour: Box<dyn Behaviour>,
    links: ActorLinks,

    phase: Phase,
    first_cycle: bool,
    sync_set: SyncSet,
    perception: Perception,
    memory: Memory,
    messages: Vec<Mail>,
    outbox: MailBuffer,
}

impl ActorRuntime {
    pub fn new(id: ActorId, name: String, kind: ActorKind, behaviour: Box<dyn Behaviour>, links: ActorLinks) -> Self {
        Self {
            id,
            name,
            kind,
            behaviour,
            links,
            phase: Phase::Talking,
            first_cycle: true,
            sync_set: SyncSet::new(),
            perception: Perception::blind(id, Default::default(), 0),
            memory: Memory::default(),
            messages: Vec::new(),
            outbox: MailBuffer::new(),
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    /// Runs the phase loop until cancelled.
    pub async fn run(mut self) {
        // The first perception is not gated; the loop proper starts talking.
        self.perceive();
        self.phase = Phase::Talking;
        debug!("actor {} ({}) started", self.id, self.name);

        while !self.links.cancel.is_cancelled() {
            if self.first_cycle || self.phase == Phase::Perceiving {
                self.synchronize();
                self.first_cycle = false;
            }

            let outcome = self.execute();
            self.links.status.set_phase(self.phase);
            trace!("actor {} submits {}", self.id, outcome);
            if self.links.coordinator.send(CoordinatorMsg::Outcome(outcome)).is_err() {
                warn!("actor {} lost its coordinator", self.id);
                break;
            }

            self.links.status.set_waiting(true);
            let decision = tokio::select! {
                biased;
                () = self.links.cancel.cancelled() => None,
                decision = self.links.gate.recv() => decision,
            };
            self.links.status.set_waiting(false);

            match decision {
                Some(true) => self.phase = self.phase.next(),
                Some(false) => trace!("actor {} repeats {:?}", self.id, self.phase),
                None => break,
            }
        }

        self.cleanup();
    }

    fn synchronize(&mut self) {
        let candidates = self.perception.visible_actors();
        let time = self.links.world.read().time();
        self.links.synchronizer.synchronize(self.id, &candidates, time);
        self.sync_set = self.links.synchronizer.sync_set(self.id);
        self.sync_set.remove(&self.id);
        self.links.status.set_sync_len(self.sync_set.len());
    }

    fn perceive(&mut self) {
        let snapshot = self.links.world.read().perceive(self.id);
        match snapshot {
            Ok(perception) => self.perception = perception,
            Err(e) => warn!("actor {} could not perceive: {}", self.id, e),
        }
    }

    /// Runs the current phase's hook and wraps its result as an outcome.
    fn execute(&mut self) -> Outcome {
        let (time, state) = {
            let world = self.links.world.read();
            (world.time(), world.agent(self.id))
        };
        let sync_set = self.sync_set.clone();

        match self.phase {
            Phase::Perceiving => {
                self.perceive();
                self.links.status.bump_turns();
                let mut ctx = Context {
                    id: self.id,
                    name: &self.name,
                    time,
                    perception: &self.perception,
                    state: state.as_ref(),
                    memory: &mut self.memory,
                    messages: &mut self.messages,
                };
                self.behaviour.on_perceive(&mut ctx);
                Outcome::perception(self.id, sync_set)
            }
            Phase::Talking => {
                self.messages.extend(self.links.mailbox.lock().drain());
                let peers = if self.kind == ActorKind::Agent {
                    self.links.registry.peer_names(self.id)
                } else {
                    Vec::new()
                };
                let ctx = Context {
                    id: self.id,
                    name: &self.name,
                    time,
                    perception: &self.perception,
                    state: state.as_ref(),
                    memory: &mut self.memory,
                    messages: &mut self.messages,
                };
                let mut talk = TalkContext::new(ctx, &mut self.outbox, &peers);
                let token = self.behaviour.on_communicate(&mut talk);
                drop(talk);
                Outcome::communication(self.id, sync_set, token, self.outbox.drain())
            }
            Phase::Doing => {
                let mut ctx = Context {
                    id: self.id,
                    name: &self.name,
                    time,
                    perception: &self.perception,
                    state: state.as_ref(),
                    memory: &mut self.memory,
                    messages: &mut self.messages,
                };
                let mut influence = self.behaviour.on_act(&mut ctx);
                influence.origin = self.id;
                if let Some(state) = &state {
                    influence = gate_on_energy(influence, state);
                }
                Outcome::action(self.id, sync_set, influence)
            }
        }
    }

    fn cleanup(&mut self) {
        self.links.mailbox.lock().clear();
        self.messages.clear();
        self.memory.clear();
        self.behaviour.on_stop();
        self.links.registry.deregister(self.id);
        debug!("actor {} ({}) finished", self.id, self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packetworld_env::{Color, Coordinate};

    fn agent(battery: i32, carry: Option<Color>) -> AgentState {
        AgentState {
            id: ActorId(1),
            name: "a".into(),
            position: Coordinate::new(0, 0),
            carry,
            color: None,
            battery,
        }
    }

    #[test]
    fn test_phase_cycle() {
        assert_eq!(Phase::Perceiving.next(), Phase::Talking);
        assert_eq!(Phase::Talking.next(), Phase::Doing);
        assert_eq!(Phase::Doing.next(), Phase::Perceiving);
        assert_eq!(Phase::from_u8(Phase::Doing as u8), Phase::Doing);
    }

    #[test]
    fn test_energy_gate() {
        let step = Influence::step(ActorId(1), Coordinate::new(0, 1));

        assert_eq!(gate_on_energy(step.clone(), &agent(10, None)), step);
        assert!(matches!(
            gate_on_energy(step.clone(), &agent(10, Some(Color::Red))).kind,
            packetworld_env::InfluenceKind::Skip
        ));
        assert!(gate_on_energy(step, &agent(0, None)).is_noop());
    }
}
