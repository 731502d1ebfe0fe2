//! Packet World Environment Abstraction Layer
//!
//! This crate holds everything the synchronization kernel needs to know about
//! the world it drives, without knowing how that world is stored:
//!
//! - Leaf value types (`ActorId`, `Coordinate`, `Color`)
//! - Influences, the effects actors request during their act phase
//! - Mail, exchanged during the talk phase
//! - Perception snapshots, produced during the perceive phase
//! - The [`World`] trait the kernel reads from and the reactor writes to
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐   perceive()    ┌─────────────────────┐
//! │ Actor tasks │ ◄────────────── │                     │
//! └─────────────┘   (read lock)   │   World (trait)     │
//!                                 │   └─ GridWorld      │
//! ┌─────────────┐   effectuate()  │      layers, clock, │
//! │ Reactor     │ ──────────────► │      batteries      │
//! └─────────────┘   (write lock)  └─────────────────────┘
//! ```
//!
//! [`GridWorld`] is the reference implementation: a bounded grid with
//! agent, packet, destination, wall, flag, pheromone, crumb and energy
//! station layers.

mod error;
mod grid;
mod influence;
mod mail;
mod perception;
mod types;
mod world;

pub mod energy;

pub use error::EnvError;
pub use grid::GridWorld;
pub use influence::{Influence, InfluenceKind, Layer};
pub use mail::{Mail, MailBuffer};
pub use perception::{CellPerception, Perception};
pub use types::{ActorId, Color, Coordinate};
pub use world::{AgentState, ItemKind, SharedWorld, World};
