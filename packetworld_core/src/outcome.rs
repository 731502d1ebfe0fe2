//! Outcomes: what an actor hands to the kernel when it closes a phase.

use std::collections::BTreeSet;
use std::fmt;

use packetworld_env::{ActorId, Influence, Mail};
use serde::{Deserialize, Serialize};

/// Actors an outcome must be grouped with. Never contains the owner.
pub type SyncSet = BTreeSet<ActorId>;

/// Continuation token closing a talk phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommToken {
    /// Another talk round is wanted; votes against advancing.
    Continue,
    /// Done talking.
    Close,
}

/// Which handler consumes an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandlerTarget {
    Perception,
    Postal,
    Reactor,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeKind {
    /// End of a perceive phase.
    Perception,
    /// End of a talk phase, with the mail written during it.
    Communication { token: CommToken, mail: Vec<Mail> },
    /// End of an act phase.
    Action(Influence),
    /// Stand-in for an actor a sphere is waiting on.
    Placeholder,
}

/// One actor's contribution to a sphere.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub actor: ActorId,

    /// False only for placeholders.
    pub acted: bool,

    /// Actors this outcome must be synchronized with.
    pub sync_set: SyncSet,

    pub kind: OutcomeKind,
}

impl Outcome {
    fn genuine(actor: ActorId, sync_set: SyncSet, kind: OutcomeKind) -> Self {
        let mut sync_set = sync_set;
        sync_set.remove(&actor);
        Self {
            actor,
            acted: true,
            sync_set,
            kind,
        }
    }

    pub fn perception(actor: ActorId, sync_set: SyncSet) -> Self {
        Self::genuine(actor, sync_set, OutcomeKind::Perception)
    }

    pub fn communication(actor: ActorId, sync_set: SyncSet, token: CommToken, mail: Vec<Mail>) -> Self {
        Self::genuine(actor, sync_set, OutcomeKind::Communication { token, mail })
    }

    pub fn action(actor: ActorId, sync_set: SyncSet, influence: Influence) -> Self {
        Self::genuine(actor, sync_set, OutcomeKind::Action(influence))
    }

    pub fn placeholder(actor: ActorId) -> Self {
        Self {
            actor,
            acted: false,
            sync_set: SyncSet::new(),
            kind: OutcomeKind::Placeholder,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.kind, OutcomeKind::Placeholder)
    }

    /// Handler this outcome is routed to; placeholders have none.
    pub fn target(&self) -> Option<HandlerTarget> {
        match self.kind {
            OutcomeKind::Perception => Some(HandlerTarget::Perception),
            OutcomeKind::Communication { .. } => Some(HandlerTarget::Postal),
            OutcomeKind::Action(_) => Some(HandlerTarget::Reactor),
            OutcomeKind::Placeholder => None,
        }
    }

    /// Vote on advancing the phase: only a talk phase asking to continue
    /// votes no.
    pub fn vote(&self) -> bool {
        !matches!(
            self.kind,
            OutcomeKind::Communication {
                token: CommToken::Continue,
                ..
            }
        )
    }

    pub fn is_action(&self) -> bool {
        matches!(self.kind, OutcomeKind::Action(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            OutcomeKind::Perception => "perception".to_string(),
            OutcomeKind::Communication { token, mail } => format!("communication({:?}, {} mail)", token, mail.len()),
            OutcomeKind::Action(inf) => format!("action({})", inf.kind.name()),
            OutcomeKind::Placeholder => "placeholder".to_string(),
        };
        write!(f, "{} from {} (sync {})", kind, self.actor, self.sync_set.len())
    }
}
