//! Error types for the synchronization kernel.

use packetworld_env::{ActorId, EnvError};
use thiserror::Error;

use crate::sphere::SphereId;

/// Errors surfaced by the kernel.
///
/// Most runtime conditions (unknown recipients, late decisions for removed
/// actors, rejected influences) are absorbed and logged by the component that
/// hits them; only configuration mistakes and protocol violations reach the
/// caller.
#[derive(Debug, Error)]
pub enum KernelError {
    /// No registered actor with this id.
    #[error("Unknown actor: {0}")]
    UnknownActor(ActorId),

    /// Actor id registered twice.
    #[error("Actor {0} is already registered")]
    AlreadyRegistered(ActorId),

    /// Another actor already uses this name.
    #[error("Actor name {0} is already taken")]
    DuplicateName(String),

    /// No agent with this name.
    #[error("Unknown recipient: {0}")]
    UnknownRecipient(String),

    /// Mail addressed to an active item.
    #[error("{0} cannot receive mail")]
    NotAMailRecipient(String),

    /// The recipient's inbox is at capacity.
    #[error("Mailbox of {name} is full ({capacity} messages)")]
    MailboxFull { name: String, capacity: usize },

    /// An actor produced a second genuine outcome for the same sphere.
    #[error("Actor {0} already has an outcome in this sphere")]
    DuplicateOutcome(ActorId),

    /// Completion reported for a sphere that no longer exists.
    #[error("Unknown sphere: {0}")]
    UnknownSphere(SphereId),

    /// Law name not present in the law registry.
    #[error("Unknown law: {0}")]
    UnknownLaw(String),

    /// The coordinator task has stopped.
    #[error("Coordinator closed")]
    CoordinatorClosed,

    /// Configuration could not be parsed.
    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Env(#[from] EnvError),
}

impl KernelError {
    /// Creates a config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<serde_json::Error> for KernelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}
