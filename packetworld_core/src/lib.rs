//! Packet World Core - Phase Synchronization Kernel
//!
//! Many actors cycle through perceive / talk / act phases in a shared grid
//! world. Each phase ends with an outcome; the kernel groups outcomes into
//! **spheres** according to every actor's sync set, hands a full sphere to
//! the handlers (perception, postal, reactor) and, once all of them are
//! done, tells every member whether it may move on to its next phase.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Kernel                             │
//! │                                                              │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐        ┌─────────────┐  │
//! │  │ Actor 0 │ │ Actor 1 │ │ Actor n │ ─────► │  Collector  │  │
//! │  └────▲────┘ └────▲────┘ └────▲────┘ outcome│  (spheres)  │  │
//! │       │           │           │             └──────┬──────┘  │
//! │       └───────────┴───────────┘ decision           │         │
//! │                                             dispatch│        │
//! │           ┌─────────────┬──────────────┬───────────┘         │
//! │           ▼             ▼              ▼                     │
//! │   ┌────────────┐ ┌────────────┐ ┌────────────┐               │
//! │   │ Perception │ │   Postal   │ │  Reactor   │──► World      │
//! │   └────────────┘ └────────────┘ └────────────┘               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sync sets come from a pluggable [`Synchronizer`]. With the
//! [`CentralSynchronizer`] every sphere contains every actor, which makes
//! each phase a global barrier.

pub mod actor;
pub mod behaviour;
pub mod collector;
pub mod config;
pub mod envelope;
pub mod error;
pub mod events;
pub mod handler;
pub mod kernel;
pub mod law;
pub mod mailbox;
pub mod outcome;
pub mod perception_handler;
pub mod postal;
pub mod reactor;
pub mod registry;
pub mod sphere;
pub mod status;
pub mod synchronizer;

// Re-export key types for convenience
pub use actor::{gate_on_energy, Phase};
pub use behaviour::{Behaviour, Context, Memory, TalkContext};
pub use collector::{CollectorSnapshot, SphereSet, SphereView};
pub use config::{KernelConfig, SynchronizerKind};
pub use error::KernelError;
pub use events::WorldEvent;
pub use kernel::Kernel;
pub use law::{Law, LawBook, LawRegistry};
pub use outcome::{CommToken, HandlerTarget, Outcome, OutcomeKind, SyncSet};
pub use sphere::{Sphere, SphereId};
pub use status::{ActorKind, ActorView, StatsSnapshot};
pub use synchronizer::{CentralSynchronizer, IsolatedSynchronizer, Synchronizer};
