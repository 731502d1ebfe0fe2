//! Sync-set computation.
//!
//! Before each perceive phase an actor asks its synchronizer which other
//! actors it must stay in lock-step with for the coming cycle.

use std::sync::Arc;

use packetworld_env::ActorId;

use crate::config::SynchronizerKind;
use crate::outcome::SyncSet;
use crate::registry::ActorRegistry;

/// Computes sync sets.
pub trait Synchronizer: Send + Sync {
    /// Recomputes the sync set of `id` from the actors it considers
    /// relevant at tick `time`.
    fn synchronize(&self, id: ActorId, candidates: &[ActorId], time: u64);

    /// The sync set of `id` as of its last `synchronize` call.
    fn sync_set(&self, id: ActorId) -> SyncSet;
}

/// Global barrier: every registered actor syncs with every other one.
///
/// Membership is read from the live registry, so an actor that has been
/// removed drops out of everyone's next sync set.
pub struct CentralSynchronizer {
    registry: Arc<ActorRegistry>,
}

impl CentralSynchronizer {
    pub fn new(registry: Arc<ActorRegistry>) -> Self {
        Self { registry }
    }
}

impl Synchronizer for CentralSynchronizer {
    fn synchronize(&self, _id: ActorId, _candidates: &[ActorId], _time: u64) {}

    fn sync_set(&self, id: ActorId) -> SyncSet {
        self.registry.ids().into_iter().filter(|other| *other != id).collect()
    }
}

/// No synchronization: every actor advances alone.
pub struct IsolatedSynchronizer;

impl Synchronizer for IsolatedSynchronizer {
    fn synchronize(&self, _id: ActorId, _candidates: &[ActorId], _time: u64) {}

    fn sync_set(&self, _id: ActorId) -> SyncSet {
        SyncSet::new()
    }
}

impl SynchronizerKind {
    pub fn build(&self, registry: Arc<ActorRegistry>) -> Arc<dyn Synchronizer> {
        match self {
            SynchronizerKind::Central => Arc::new(CentralSynchronizer::new(registry)),
            SynchronizerKind::Isolated => Arc::new(IsolatedSynchronizer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::MailBox;
    use crate::registry::ActorSlot;
    use crate::status::{ActorKind, ActorStatus};
    use parking_lot::Mutex;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn register(reg: &ActorRegistry, id: u32) {
        let (gate, _rx) = mpsc::channel(1);
        let name = format!("a{id}");
        reg.register(
            ActorId(id),
            ActorSlot {
                mailbox: Arc::new(Mutex::new(MailBox::new(name.clone(), 4))),
                name,
                kind: ActorKind::Agent,
                gate,
                cancel: CancellationToken::new(),
                status: Arc::new(ActorStatus::default()),
            },
        )
        .unwrap();
    }

    #[test]
    fn test_central_returns_all_others() {
        let reg = Arc::new(ActorRegistry::new());
        for id in 0..4 {
            register(&reg, id);
        }
        let sync = CentralSynchronizer::new(reg.clone());
        sync.synchronize(ActorId(2), &[], 0);

        let set = sync.sync_set(ActorId(2));
        assert_eq!(set.len(), 3);
        assert!(!set.contains(&ActorId(2)));

        reg.deregister(ActorId(0));
        assert!(!sync.sync_set(ActorId(2)).contains(&ActorId(0)));
    }

    #[test]
    fn test_isolated_is_empty() {
        let sync = IsolatedSynchronizer;
        sync.synchronize(ActorId(1), &[ActorId(2)], 3);
        assert!(sync.sync_set(ActorId(1)).is_empty());
    }
}
