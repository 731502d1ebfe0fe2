//! Lock-free observation of actors and kernel counters.
//!
//! Observers (a GUI, the scenario runner, tests) read these without ever
//! calling back into the synchronization core.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};

use packetworld_env::ActorId;
use serde::Serialize;

use crate::actor::Phase;

/// Whether an actor is an agent or an active item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActorKind {
    Agent,
    Item,
}

/// Live state an actor task publishes about itself.
#[derive(Debug, Default)]
pub struct ActorStatus {
    phase: AtomicU8,
    turns: AtomicU64,
    sync_len: AtomicUsize,
    waiting: AtomicBool,
}

impl ActorStatus {
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Relaxed))
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Relaxed);
    }

    /// Completed perceive phases.
    pub fn turns(&self) -> u64 {
        self.turns.load(Ordering::Relaxed)
    }

    pub(crate) fn bump_turns(&self) {
        self.turns.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_sync_len(&self, len: usize) {
        self.sync_len.store(len, Ordering::Relaxed);
    }

    /// True while the actor is suspended on its phase decision.
    pub fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::Relaxed)
    }

    pub(crate) fn set_waiting(&self, waiting: bool) {
        self.waiting.store(waiting, Ordering::Relaxed);
    }
}

/// Snapshot of one actor for presentation.
#[derive(Debug, Clone, Serialize)]
pub struct ActorView {
    pub id: ActorId,
    pub name: String,
    pub kind: ActorKind,
    pub phase: Phase,
    pub turns: u64,
    pub sync_set_len: usize,
    pub waiting: bool,
}

impl ActorView {
    pub(crate) fn new(id: ActorId, name: &str, kind: ActorKind, status: &ActorStatus) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind,
            phase: status.phase(),
            turns: status.turns(),
            sync_set_len: status.sync_len.load(Ordering::Relaxed),
            waiting: status.is_waiting(),
        }
    }
}

/// Kernel-wide counters.
#[derive(Debug, Default)]
pub struct KernelStats {
    outcomes: AtomicU64,
    merges: AtomicU64,
    spheres_completed: AtomicU64,
    mails_delivered: AtomicU64,
    mails_dropped: AtomicU64,
    influences_applied: AtomicU64,
    influences_rejected: AtomicU64,
    handoffs: AtomicU64,
}

macro_rules! counter {
    ($get:ident, $add:ident) => {
        pub fn $get(&self) -> u64 {
            self.$get.load(Ordering::Relaxed)
        }

        pub(crate) fn $add(&self, n: u64) {
            self.$get.fetch_add(n, Ordering::Relaxed);
        }
    };
}

impl KernelStats {
    counter!(outcomes, add_outcomes);
    counter!(merges, add_merges);
    counter!(spheres_completed, add_spheres_completed);
    counter!(mails_delivered, add_mails_delivered);
    counter!(mails_dropped, add_mails_dropped);
    counter!(influences_applied, add_influences_applied);
    counter!(influences_rejected, add_influences_rejected);
    counter!(handoffs, add_handoffs);

    /// Plain copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            outcomes: self.outcomes(),
            merges: self.merges(),
            spheres_completed: self.spheres_completed(),
            mails_delivered: self.mails_delivered(),
            mails_dropped: self.mails_dropped(),
            influences_applied: self.influences_applied(),
            influences_rejected: self.influences_rejected(),
            handoffs: self.handoffs(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub outcomes: u64,
    pub merges: u64,
    pub spheres_completed: u64,
    pub mails_delivered: u64,
    pub mails_dropped: u64,
    pub influences_applied: u64,
    pub influences_rejected: u64,
    pub handoffs: u64,
}
