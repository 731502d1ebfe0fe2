//! The world abstraction the kernel runs against.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::EnvError;
use crate::influence::Influence;
use crate::perception::Perception;
use crate::types::{ActorId, Color, Coordinate};

/// A world shared between actor tasks (readers) and the reactor (writer).
pub type SharedWorld = Arc<RwLock<dyn World>>;

/// Kinds of things that may occupy a cell, used for collision queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    Agent,
    Packet,
    Destination,
    Wall,
    EnergyStation,
    Flag,
    Pheromone,
    Crumb,
}

/// Read-only view of an agent body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub id: ActorId,
    pub name: String,
    pub position: Coordinate,

    /// Colour of the carried packet.
    pub carry: Option<Color>,

    /// Colour the agent is restricted to picking, if any.
    pub color: Option<Color>,

    pub battery: i32,
}

impl AgentState {
    pub fn is_carrying(&self) -> bool {
        self.carry.is_some()
    }
}

/// A discrete-time grid world.
///
/// Implementations only ever see one writer at a time: the reactor applies a
/// whole influence set under the write lock, while perception and law checks
/// take the read lock.
pub trait World: Send + Sync {
    fn width(&self) -> i32;

    fn height(&self) -> i32;

    fn in_bounds(&self, at: Coordinate) -> bool {
        at.x >= 0 && at.y >= 0 && at.x < self.width() && at.y < self.height()
    }

    /// Current tick.
    fn time(&self) -> u64;

    /// Advances the clock by one tick, ageing time-bound items. Returns the
    /// new tick.
    fn increment_clock(&mut self) -> u64;

    /// Snapshot of what actor `id` can currently see.
    fn perceive(&self, id: ActorId) -> Result<Perception, EnvError>;

    /// Applies a validated influence to its layer.
    fn effectuate(&mut self, influence: &Influence) -> Result<(), EnvError>;

    fn agent(&self, id: ActorId) -> Option<AgentState>;

    fn agent_at(&self, at: Coordinate) -> Option<AgentState>;

    fn packet_at(&self, at: Coordinate) -> Option<Color>;

    fn crumbs_at(&self, at: Coordinate) -> u32;

    /// Collision matrix: may an item of `kind` be placed on `at`?
    fn can_stand_on(&self, kind: ItemKind, at: Coordinate) -> bool;

    /// Packets not yet delivered, including carried ones.
    fn packets_remaining(&self) -> usize;

    /// Every actor body (agents and energy stations).
    fn actor_ids(&self) -> Vec<ActorId>;

    /// Takes a body out of the world. A carried packet is left on the
    /// body's cell. Returns false if there was no such body.
    fn remove_actor(&mut self, id: ActorId) -> bool;
}
