//! Error types for the Packet World environment.

use thiserror::Error;

use crate::types::{ActorId, Coordinate};

/// Errors raised by a [`World`](crate::World) while answering queries or
/// applying influences.
#[derive(Debug, Error)]
pub enum EnvError {
    /// No actor body with this id lives in the world.
    #[error("Unknown actor: {0}")]
    UnknownActor(ActorId),

    /// Coordinate lies outside the grid.
    #[error("Coordinate out of bounds: {0}")]
    OutOfBounds(Coordinate),

    /// Something already occupies the cell.
    #[error("Cell {0} is occupied")]
    Occupied(Coordinate),

    /// The actor was expected to carry a packet but its hands are empty.
    #[error("Actor {0} carries nothing")]
    EmptyHands(ActorId),

    /// The actor cannot pick up anything more.
    #[error("Actor {0} already carries a packet")]
    HandsFull(ActorId),

    /// Nothing to pick at the cell.
    #[error("Nothing to pick at {0}")]
    NothingThere(Coordinate),

    /// Colour name not in the palette.
    #[error("Unknown colour: {0}")]
    UnknownColor(String),

    /// The influence does not belong to this world's layers.
    #[error("Unsupported influence: {0}")]
    Unsupported(String),
}

impl EnvError {
    /// Creates an unsupported-influence error.
    pub fn unsupported(what: impl std::fmt::Display) -> Self {
        Self::Unsupported(what.to_string())
    }
}
