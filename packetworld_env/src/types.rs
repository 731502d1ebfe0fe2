//! Common types for the Packet World environment.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EnvError;

/// Unique identifier for an actor (agent or active item).
///
/// Ids are handed out by the world when a body is placed, so they are dense
/// and deterministic for a given build order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorId(pub u32);

impl ActorId {
    /// Returns the raw numeric id.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ActorId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// A cell on the grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: i32,
    pub y: i32,
}

impl Coordinate {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Chebyshev distance: diagonal moves cost the same as straight ones.
    pub fn distance(&self, other: &Coordinate) -> u32 {
        (self.x - other.x).unsigned_abs().max((self.y - other.y).unsigned_abs())
    }

    /// Returns the coordinate shifted by `(dx, dy)`.
    pub fn offset(&self, dx: i32, dy: i32) -> Coordinate {
        Coordinate::new(self.x + dx, self.y + dy)
    }

    /// The 8-neighbourhood, row by row.
    pub fn neighbours(&self) -> impl Iterator<Item = Coordinate> + '_ {
        (-1..=1)
            .flat_map(|dy| (-1..=1).map(move |dx| (dx, dy)))
            .filter(|&(dx, dy)| dx != 0 || dy != 0)
            .map(move |(dx, dy)| self.offset(dx, dy))
    }

    /// One step from `self` towards `goal` (diagonals allowed).
    pub fn step_towards(&self, goal: &Coordinate) -> Coordinate {
        self.offset((goal.x - self.x).signum(), (goal.y - self.y).signum())
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Colour of a packet, destination or flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Yellow,
    Red,
    Green,
    Blue,
    Pink,
    Magenta,
    Black,
}

impl Color {
    /// Every colour, in palette order.
    pub const PALETTE: [Color; 7] = [
        Color::Yellow,
        Color::Red,
        Color::Green,
        Color::Blue,
        Color::Pink,
        Color::Magenta,
        Color::Black,
    ];

    /// Palette entry `index`, wrapping around.
    pub fn from_index(index: usize) -> Color {
        Self::PALETTE[index % Self::PALETTE.len()]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Color::Yellow => "yellow",
            Color::Red => "red",
            Color::Green => "green",
            Color::Blue => "blue",
            Color::Pink => "pink",
            Color::Magenta => "magenta",
            Color::Black => "black",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Color {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::PALETTE
            .iter()
            .copied()
            .find(|c| c.name() == s.to_lowercase())
            .ok_or_else(|| EnvError::UnknownColor(s.to_string()))
    }
}
