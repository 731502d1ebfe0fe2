//! The collector: groups outcomes into spheres and drives them to
//! completion.
//!
//! All sphere state lives on a single task. Outcomes from actors and
//! completion reports from handlers arrive on the same inbox, so every
//! mutation of the sphere set is serialized without locks.
//!
//! ```text
//!  actor ──Outcome──►┐
//!  actor ──Outcome──►├─► [coordinator inbox] ─► SphereSet ─► dispatch ─► handlers
//!  handler ─Handled─►┘                              │
//!                                                   └─► release: decision ─► actors
//! ```

use std::collections::BTreeSet;
use std::iter;
use std::sync::Arc;

use packetworld_env::{ActorId, SharedWorld};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use crate::envelope::{Dispatch, Envelope, InfluenceSet, MailBag, PerceptionAck};
use crate::error::KernelError;
use crate::handler::HandlerHandle;
use crate::outcome::Outcome;
use crate::registry::ActorRegistry;
use crate::sphere::{Sphere, SphereId};
use crate::status::KernelStats;

/// Messages accepted by the coordinator task.
#[derive(Debug)]
pub enum CoordinatorMsg {
    /// An actor closed a phase.
    Outcome(Outcome),

    /// A handler finished an envelope of `sphere`.
    Handled { sphere: SphereId, outcomes: usize },

    /// Remove the actor at the end of its current cycle.
    Retire(ActorId),

    /// The actor was stopped and will never report again.
    Departed(ActorId),

    /// Read the current sphere set.
    Snapshot(oneshot::Sender<CollectorSnapshot>),

    Shutdown,
}

/// The set of in-flight spheres and the merge algorithm over them.
#[derive(Debug, Default)]
pub struct SphereSet {
    spheres: Vec<Sphere>,
    next_id: u64,
    merges: u64,
}

impl SphereSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.spheres.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spheres.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sphere> {
        self.spheres.iter()
    }

    pub fn get(&self, id: SphereId) -> Option<&Sphere> {
        self.spheres.iter().find(|s| s.id() == id)
    }

    /// Number of merges performed so far.
    pub fn merges(&self) -> u64 {
        self.merges
    }

    /// Adds an outcome to the sphere set.
    ///
    /// Every open sphere that contains the outcome's actor or any member of
    /// its sync set is merged into the first of them; if there is none, a new
    /// sphere is opened. When the receiving sphere becomes full it is sealed
    /// and its dispatch returned.
    pub fn collect(&mut self, outcome: Outcome) -> Result<Option<(SphereId, Dispatch)>, KernelError> {
        let targets: Vec<ActorId> = iter::once(outcome.actor)
            .chain(outcome.sync_set.iter().copied())
            .collect();
        let matching: Vec<usize> = self
            .spheres
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_sealed() && targets.iter().any(|id| s.contains(*id)))
            .map(|(i, _)| i)
            .collect();

        let at = match matching.split_first() {
            None => {
                let id = SphereId(self.next_id);
                self.next_id += 1;
                trace!("opening {}", id);
                self.spheres.push(Sphere::new(id));
                self.spheres.len() - 1
            }
            Some((&first, rest)) => {
                // rest is ascending and past `first`, so removing from the back
                // keeps `first` valid
                for &i in rest.iter().rev() {
                    let other = self.spheres.remove(i);
                    trace!("merging {} into {}", other.id(), self.spheres[first].id());
                    self.spheres[first].incorporate(other);
                    self.merges += 1;
                }
                first
            }
        };

        let sphere = &mut self.spheres[at];
        sphere.integrate(outcome)?;
        if sphere.is_full() {
            return Ok(Some((sphere.id(), sphere.seal())));
        }
        Ok(None)
    }

    /// Drops every open sphere's placeholders for `gone`, which have left the
    /// kernel. Returns the spheres this fills, sealed.
    pub fn forget(&mut self, gone: &[ActorId]) -> Vec<(SphereId, Dispatch)> {
        let mut ready = Vec::new();
        for sphere in self.spheres.iter_mut().filter(|s| !s.is_sealed()) {
            if sphere.forget(gone) > 0 && sphere.is_full() {
                ready.push((sphere.id(), sphere.seal()));
            }
        }
        self.spheres.retain(|s| s.is_sealed() || !s.is_empty());
        ready
    }

    /// Records `outcomes` handled for sphere `id`. Returns the sphere, now
    /// removed from the set, once all of its outcomes are handled.
    pub fn complete(&mut self, id: SphereId, outcomes: usize) -> Result<Option<Sphere>, KernelError> {
        let index = self
            .spheres
            .iter()
            .position(|s| s.id() == id)
            .ok_or(KernelError::UnknownSphere(id))?;
        if self.spheres[index].mark_handled(outcomes) {
            return Ok(Some(self.spheres.remove(index)));
        }
        Ok(None)
    }
}

/// Read-only view of one sphere.
#[derive(Debug, Clone, Serialize)]
pub struct SphereView {
    pub id: u64,
    pub members: Vec<ActorId>,

    /// Members still represented by a placeholder.
    pub waiting_on: Vec<ActorId>,

    pub acted: usize,
    pub handled: usize,
    pub sealed: bool,
}

impl From<&Sphere> for SphereView {
    fn from(sphere: &Sphere) -> Self {
        Self {
            id: sphere.id().0,
            members: sphere.members().collect(),
            waiting_on: sphere
                .elements()
                .iter()
                .filter(|o| o.is_placeholder())
                .map(|o| o.actor)
                .collect(),
            acted: sphere.acted(),
            handled: sphere.handled(),
            sealed: sphere.is_sealed(),
        }
    }
}

/// Read-only view of the collector.
#[derive(Debug, Clone, Serialize)]
pub struct CollectorSnapshot {
    pub spheres: Vec<SphereView>,
    pub merges: u64,
    pub retiring: Vec<ActorId>,
}

/// The coordinator task.
pub struct Collector {
    spheres: SphereSet,
    inbox: mpsc::UnboundedReceiver<CoordinatorMsg>,
    perception: HandlerHandle<PerceptionAck>,
    postal: HandlerHandle<MailBag>,
    reactor: HandlerHandle<InfluenceSet>,
    registry: Arc<ActorRegistry>,
    world: SharedWorld,
    stats: Arc<KernelStats>,
    retiring: BTreeSet<ActorId>,
}

impl Collector {
    pub fn new(
        inbox: mpsc::UnboundedReceiver<CoordinatorMsg>,
        perception: HandlerHandle<PerceptionAck>,
        postal: HandlerHandle<MailBag>,
        reactor: HandlerHandle<InfluenceSet>,
        registry: Arc<ActorRegistry>,
        world: SharedWorld,
        stats: Arc<KernelStats>,
    ) -> Self {
        Self {
            spheres: SphereSet::new(),
            inbox,
            perception,
            postal,
            reactor,
            registry,
            world,
            stats,
            retiring: BTreeSet::new(),
        }
    }

    /// Serves the inbox until shutdown or until every sender is gone.
    pub async fn run(mut self) {
        while let Some(msg) = self.inbox.recv().await {
            match msg {
                CoordinatorMsg::Outcome(outcome) => self.on_outcome(outcome),
                CoordinatorMsg::Handled { sphere, outcomes } => self.on_handled(sphere, outcomes),
                CoordinatorMsg::Retire(id) => {
                    debug!("actor {} will retire at the end of its cycle", id);
                    self.retiring.insert(id);
                }
                CoordinatorMsg::Departed(id) => {
                    self.retiring.remove(&id);
                    self.forget(&[id]);
                }
                CoordinatorMsg::Snapshot(reply) => {
                    let _ = reply.send(self.snapshot());
                }
                CoordinatorMsg::Shutdown => break,
            }
        }
        info!("collector stopped with {} spheres in flight", self.spheres.len());
    }

    fn snapshot(&self) -> CollectorSnapshot {
        CollectorSnapshot {
            spheres: self.spheres.iter().map(SphereView::from).collect(),
            merges: self.spheres.merges(),
            retiring: self.retiring.iter().copied().collect(),
        }
    }

    fn on_outcome(&mut self, mut outcome: Outcome) {
        trace!("collecting {}", outcome);
        // a sync set computed before a removal may still name the removed
        outcome.sync_set.retain(|id| self.registry.contains(*id));
        self.stats.add_outcomes(1);
        let merges = self.spheres.merges();

        match self.spheres.collect(outcome) {
            Ok(Some((id, dispatch))) => self.dispatch(id, dispatch),
            Ok(None) => {}
            Err(e) => error!("outcome rejected: {}", e),
        }
        self.stats.add_merges(self.spheres.merges() - merges);
    }

    fn dispatch(&self, id: SphereId, dispatch: Dispatch) {
        debug!("{} full, dispatching {} envelopes", id, dispatch.len());
        if let Some(envelope) = dispatch.perception {
            deposit(&self.perception, envelope);
        }
        if let Some(envelope) = dispatch.mail {
            deposit(&self.postal, envelope);
        }
        if let Some(envelope) = dispatch.influences {
            deposit(&self.reactor, envelope);
        }
    }

    fn on_handled(&mut self, id: SphereId, outcomes: usize) {
        match self.spheres.complete(id, outcomes) {
            Ok(Some(sphere)) => self.release(sphere),
            Ok(None) => {}
            Err(e) => warn!("completion ignored: {}", e),
        }
    }

    /// Notifies every member of a completed sphere.
    fn release(&mut self, sphere: Sphere) {
        let permission = sphere.permission();

        // Actors retire once their act phase is through, before anyone else
        // moves on, so the next sync sets no longer name them.
        let retired: Vec<ActorId> = if permission {
            sphere
                .elements()
                .iter()
                .filter(|o| o.is_action() && self.retiring.contains(&o.actor))
                .map(|o| o.actor)
                .collect()
        } else {
            Vec::new()
        };
        for id in &retired {
            self.retiring.remove(id);
            if self.registry.deregister(*id) {
                self.world.write().remove_actor(*id);
                info!("actor {} retired", id);
            }
        }
        // stopped while a retirement was pending
        let registry = &self.registry;
        self.retiring.retain(|id| registry.contains(*id));

        let members: Vec<ActorId> = sphere.members().filter(|id| !retired.contains(id)).collect();
        let locks = self.registry.lock_members(members);
        let notified = locks.advance(permission);
        drop(locks);

        self.stats.add_spheres_completed(1);
        debug!("{} released {} members (permission: {})", sphere.id(), notified, permission);

        if !retired.is_empty() {
            self.forget(&retired);
        }
    }

    /// Forgets departed actors and dispatches the spheres that were only
    /// waiting on them.
    fn forget(&mut self, gone: &[ActorId]) {
        for (id, dispatch) in self.spheres.forget(gone) {
            debug!("{} no longer waits on {:?}", id, gone);
            self.dispatch(id, dispatch);
        }
    }
}

fn deposit<P>(handler: &HandlerHandle<P>, envelope: Envelope<P>) {
    let sphere = envelope.sphere;
    if let Err(e) = handler.deposit(envelope) {
        error!("{} could not take {}: {}", handler.name(), sphere, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{CommToken, SyncSet};
    use packetworld_env::Influence;
    use proptest::prelude::*;

    fn ids(raw: &[u32]) -> SyncSet {
        raw.iter().map(|&i| ActorId(i)).collect()
    }

    fn perception(actor: u32, sync: &[u32]) -> Outcome {
        Outcome::perception(ActorId(actor), ids(sync))
    }

    #[test]
    fn test_disjoint_outcomes_open_separate_spheres() {
        let mut set = SphereSet::new();
        assert!(set.collect(perception(1, &[2])).unwrap().is_none());
        assert!(set.collect(perception(3, &[4])).unwrap().is_none());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_bridging_outcome_merges_spheres() {
        let mut set = SphereSet::new();
        set.collect(perception(1, &[2])).unwrap();
        set.collect(perception(3, &[4])).unwrap();
        set.collect(perception(2, &[3])).unwrap();

        assert_eq!(set.len(), 1);
        assert_eq!(set.merges(), 1);
        let sphere = set.iter().next().unwrap();
        assert_eq!(sphere.len(), 4);
        assert_eq!(sphere.acted(), 3);
    }

    #[test]
    fn test_full_sphere_dispatched_once_then_removed() {
        let mut set = SphereSet::new();
        set.collect(Outcome::communication(ActorId(1), ids(&[2]), CommToken::Close, vec![]))
            .unwrap();
        let (id, dispatch) = set
            .collect(Outcome::action(ActorId(2), ids(&[1]), Influence::skip(ActorId(2))))
            .unwrap()
            .expect("sphere should be full");

        assert_eq!(dispatch.len(), 2);
        assert!(set.get(id).unwrap().is_sealed());

        assert!(set.complete(id, 1).unwrap().is_none());
        let done = set.complete(id, 1).unwrap().expect("sphere should complete");
        assert_eq!(done.id(), id);
        assert!(set.is_empty());
        assert!(matches!(set.complete(id, 1), Err(KernelError::UnknownSphere(_))));
    }

    #[test]
    fn test_sealed_sphere_is_not_merged_into() {
        let mut set = SphereSet::new();
        set.collect(perception(1, &[])).unwrap();
        assert_eq!(set.len(), 1);

        // 2 names 1, but 1's sphere is already sealed and in flight
        set.collect(perception(2, &[1])).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.merges(), 0);
    }

    #[test]
    fn test_isolated_outcome_completes_immediately() {
        let mut set = SphereSet::new();
        let (_, dispatch) = set.collect(perception(5, &[])).unwrap().unwrap();
        assert_eq!(dispatch.outcomes(), 1);
        assert!(dispatch.perception.is_some());
    }

    #[test]
    fn test_forget_releases_sphere_waiting_on_departed() {
        let mut set = SphereSet::new();
        set.collect(perception(1, &[2, 3])).unwrap();
        set.collect(perception(2, &[1, 3])).unwrap();
        set.collect(perception(5, &[6])).unwrap();

        let ready = set.forget(&[ActorId(3)]);
        assert_eq!(ready.len(), 1);
        let (id, dispatch) = &ready[0];
        assert_eq!(dispatch.outcomes(), 2);
        assert!(set.get(*id).unwrap().is_sealed());

        // the other sphere is untouched
        assert!(set.forget(&[ActorId(3)]).is_empty());
        assert_eq!(set.len(), 2);
    }

    /// Delivers one outcome per actor with the given sync sets, in `order`,
    /// and returns the resulting partition of actors into spheres.
    fn partition(sync_sets: &[Vec<u32>], order: &[usize]) -> BTreeSet<BTreeSet<ActorId>> {
        let mut set = SphereSet::new();
        for &i in order {
            let _ = set.collect(perception(i as u32, &sync_sets[i])).unwrap();
        }
        set.iter().map(|s| s.members().collect()).collect()
    }

    proptest! {
        /// The final grouping does not depend on arrival order.
        #[test]
        fn prop_merge_is_order_independent(
            sync_sets in proptest::collection::vec(proptest::collection::vec(0u32..6, 0..3), 6),
            order in Just((0..6).collect::<Vec<usize>>()).prop_shuffle(),
        ) {
            // every actor also waits on a private partner that never reports,
            // so no sphere fills up and the grouping is purely the merge result
            let sync_sets: Vec<Vec<u32>> = sync_sets
                .into_iter()
                .enumerate()
                .map(|(i, mut s)| {
                    s.retain(|&j| j as usize != i);
                    s.push(100 + i as u32);
                    s
                })
                .collect();

            let forward: Vec<usize> = (0..sync_sets.len()).collect();
            prop_assert_eq!(partition(&sync_sets, &forward), partition(&sync_sets, &order));
        }
    }
}
