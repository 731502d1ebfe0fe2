//! Influences: the effects an actor asks the world to apply.
//!
//! An actor never mutates the world directly. Its act phase yields exactly one
//! [`Influence`]; the reactor validates it against the registered laws and,
//! if every applicable law agrees, hands it to the world layer named by
//! [`Influence::layer`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{ActorId, Color, Coordinate};

/// The world layer an influence acts upon (its area of effect).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layer {
    Agents,
    Packets,
    Flags,
    Pheromones,
    Crumbs,
}

/// What the influence does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InfluenceKind {
    /// Move to an adjacent cell.
    Step,
    /// Pick the packet lying on the target cell.
    PickPacket {
        /// Colour restriction of the picking agent, if any.
        color: Option<Color>,
    },
    /// Drop the carried packet on the target cell.
    PutPacket,
    /// Hand the carried packet to the agent standing on the target cell.
    ///
    /// Only the reactor produces this, when it pairs a put with a pick.
    PassPacket,
    PutFlag {
        color: Color,
    },
    PutPheromone {
        /// Zero means the world's default lifetime.
        lifetime: u32,
    },
    PutDirPheromone {
        lifetime: u32,
        towards: Coordinate,
    },
    RemovePheromone,
    PutCrumb {
        amount: u32,
    },
    PickCrumb {
        amount: u32,
    },
    /// Charge the agent standing on the target cell.
    Energy {
        amount: i32,
    },
    /// Deliberately idle; still costs idle energy.
    Skip,
    /// No effect at all.
    NoOp,
}

impl InfluenceKind {
    /// Short name used in logs and law diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            InfluenceKind::Step => "step",
            InfluenceKind::PickPacket { .. } => "pick_packet",
            InfluenceKind::PutPacket => "put_packet",
            InfluenceKind::PassPacket => "pass_packet",
            InfluenceKind::PutFlag { .. } => "put_flag",
            InfluenceKind::PutPheromone { .. } => "put_pheromone",
            InfluenceKind::PutDirPheromone { .. } => "put_dir_pheromone",
            InfluenceKind::RemovePheromone => "remove_pheromone",
            InfluenceKind::PutCrumb { .. } => "put_crumb",
            InfluenceKind::PickCrumb { .. } => "pick_crumb",
            InfluenceKind::Energy { .. } => "energy",
            InfluenceKind::Skip => "skip",
            InfluenceKind::NoOp => "noop",
        }
    }
}

/// A requested effect, tagged with the actor that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Influence {
    /// Actor whose act phase produced this influence.
    pub origin: ActorId,

    /// Cell the effect applies to.
    pub target: Coordinate,

    pub kind: InfluenceKind,
}

impl Influence {
    pub fn new(origin: ActorId, target: Coordinate, kind: InfluenceKind) -> Self {
        Self { origin, target, kind }
    }

    pub fn step(origin: ActorId, target: Coordinate) -> Self {
        Self::new(origin, target, InfluenceKind::Step)
    }

    pub fn pick_packet(origin: ActorId, target: Coordinate, color: Option<Color>) -> Self {
        Self::new(origin, target, InfluenceKind::PickPacket { color })
    }

    pub fn put_packet(origin: ActorId, target: Coordinate) -> Self {
        Self::new(origin, target, InfluenceKind::PutPacket)
    }

    pub fn pass_packet(origin: ActorId, target: Coordinate) -> Self {
        Self::new(origin, target, InfluenceKind::PassPacket)
    }

    pub fn energy(origin: ActorId, target: Coordinate, amount: i32) -> Self {
        Self::new(origin, target, InfluenceKind::Energy { amount })
    }

    /// Idle in place. The target is irrelevant to the world.
    pub fn skip(origin: ActorId) -> Self {
        Self::new(origin, Coordinate::default(), InfluenceKind::Skip)
    }

    pub fn noop(origin: ActorId) -> Self {
        Self::new(origin, Coordinate::default(), InfluenceKind::NoOp)
    }

    /// The layer this influence is applied to.
    pub fn layer(&self) -> Layer {
        match self.kind {
            InfluenceKind::Step
            | InfluenceKind::Energy { .. }
            | InfluenceKind::Skip
            | InfluenceKind::NoOp => Layer::Agents,
            InfluenceKind::PickPacket { .. }
            | InfluenceKind::PutPacket
            | InfluenceKind::PassPacket => Layer::Packets,
            InfluenceKind::PutFlag { .. } => Layer::Flags,
            InfluenceKind::PutPheromone { .. }
            | InfluenceKind::PutDirPheromone { .. }
            | InfluenceKind::RemovePheromone => Layer::Pheromones,
            InfluenceKind::PutCrumb { .. } | InfluenceKind::PickCrumb { .. } => Layer::Crumbs,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self.kind, InfluenceKind::NoOp)
    }
}

impl fmt::Display for Influence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} by {} at {}", self.kind.name(), self.origin, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layers() {
        let id = ActorId(1);
        let at = Coordinate::new(1, 1);
        assert_eq!(Influence::step(id, at).layer(), Layer::Agents);
        assert_eq!(Influence::pick_packet(id, at, None).layer(), Layer::Packets);
        assert_eq!(Influence::pass_packet(id, at).layer(), Layer::Packets);
        assert_eq!(Influence::skip(id).layer(), Layer::Agents);
        assert_eq!(
            Influence::new(id, at, InfluenceKind::PickCrumb { amount: 1 }).layer(),
            Layer::Crumbs
        );
    }

    #[test]
    fn test_display() {
        let inf = Influence::put_packet(ActorId(3), Coordinate::new(2, 3));
        assert_eq!(inf.to_string(), "put_packet by 3 at (2, 3)");
    }
}
