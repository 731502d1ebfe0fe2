//! Live actor directory.
//!
//! The registry owns the kernel side of every actor: its decision gate, its
//! cancellation token, its inbox and its published status. The synchronizer
//! reads membership from here, the postal service resolves recipients here,
//! and the collector notifies sphere members through it.

use std::collections::BTreeMap;
use std::sync::Arc;

use packetworld_env::{ActorId, Mail};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::KernelError;
use crate::mailbox::MailBox;
use crate::status::{ActorKind, ActorStatus, ActorView};

/// Kernel-side handle on one actor.
#[derive(Debug, Clone)]
pub(crate) struct ActorSlot {
    pub name: String,
    pub kind: ActorKind,

    /// Single-slot channel carrying the phase decision.
    pub gate: mpsc::Sender<bool>,

    pub cancel: CancellationToken,
    pub mailbox: Arc<Mutex<MailBox>>,
    pub status: Arc<ActorStatus>,
}

#[derive(Debug, Default)]
pub struct ActorRegistry {
    slots: RwLock<BTreeMap<ActorId, ActorSlot>>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, id: ActorId, slot: ActorSlot) -> Result<(), KernelError> {
        let mut slots = self.slots.write();
        if slots.contains_key(&id) {
            return Err(KernelError::AlreadyRegistered(id));
        }
        if slots.values().any(|other| other.name == slot.name) {
            return Err(KernelError::DuplicateName(slot.name));
        }
        debug!("registered {} as {}", slot.name, id);
        slots.insert(id, slot);
        Ok(())
    }

    /// Removes an actor and cancels its task. Safe to call any number of
    /// times; returns whether this call removed it.
    pub fn deregister(&self, id: ActorId) -> bool {
        let removed = self.slots.write().remove(&id);
        match removed {
            Some(slot) => {
                slot.cancel.cancel();
                debug!("deregistered {} ({})", slot.name, id);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: ActorId) -> bool {
        self.slots.read().contains_key(&id)
    }

    /// Ids of every registered actor, ascending.
    pub fn ids(&self) -> Vec<ActorId> {
        self.slots.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Looks up an actor by name.
    pub fn resolve(&self, name: &str) -> Option<ActorId> {
        self.slots
            .read()
            .iter()
            .find(|(_, slot)| slot.name == name)
            .map(|(id, _)| *id)
    }

    /// Names of every registered agent except `id`.
    pub fn peer_names(&self, id: ActorId) -> Vec<String> {
        self.slots
            .read()
            .iter()
            .filter(|(other, slot)| **other != id && slot.kind == ActorKind::Agent)
            .map(|(_, slot)| slot.name.clone())
            .collect()
    }

    pub fn name_of(&self, id: ActorId) -> Option<String> {
        self.slots.read().get(&id).map(|slot| slot.name.clone())
    }

    /// Puts a mail in the inbox of the agent named by `mail.to`.
    pub fn deliver(&self, mail: Mail) -> Result<(), KernelError> {
        let slots = self.slots.read();
        let slot = slots
            .values()
            .find(|slot| slot.name == mail.to)
            .ok_or_else(|| KernelError::UnknownRecipient(mail.to.clone()))?;
        if slot.kind != ActorKind::Agent {
            return Err(KernelError::NotAMailRecipient(mail.to.clone()));
        }
        // bound so the mailbox guard drops before `slots`
        let pushed = slot.mailbox.lock().push(mail);
        pushed
    }

    /// Acquires the members' locks for the notification window. Released
    /// when the returned guard drops.
    pub fn lock_members(&self, members: Vec<ActorId>) -> MemberLocks<'_> {
        MemberLocks {
            slots: self.slots.read(),
            members,
        }
    }

    /// Status views of every actor, ascending by id.
    pub fn views(&self) -> Vec<ActorView> {
        self.slots
            .read()
            .iter()
            .map(|(id, slot)| ActorView::new(*id, &slot.name, slot.kind, &slot.status))
            .collect()
    }

    pub fn view(&self, id: ActorId) -> Option<ActorView> {
        self.slots
            .read()
            .get(&id)
            .map(|slot| ActorView::new(id, &slot.name, slot.kind, &slot.status))
    }
}

/// The locks of one sphere's members, held while their decision is sent.
///
/// Membership cannot change while this guard lives, so every member sees the
/// same decision from the same registry state.
pub struct MemberLocks<'a> {
    slots: RwLockReadGuard<'a, BTreeMap<ActorId, ActorSlot>>,
    members: Vec<ActorId>,
}

impl MemberLocks<'_> {
    /// Sends `permission` to every member. Returns how many were notified.
    pub fn advance(&self, permission: bool) -> usize {
        let mut notified = 0;
        for id in &self.members {
            let Some(slot) = self.slots.get(id) else {
                warn!("release of unknown actor {} ignored", id);
                continue;
            };
            match slot.gate.try_send(permission) {
                Ok(()) => notified += 1,
                Err(TrySendError::Full(_)) => {
                    error!("actor {} already holds an undelivered decision", id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("actor {} stopped before its decision arrived", id);
                }
            }
        }
        notified
    }
}
