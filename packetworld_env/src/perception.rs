//! Perception snapshots.
//!
//! A [`Perception`] is an immutable copy of the square of cells around an
//! actor, taken under the world's read lock. Behaviours reason over it
//! without touching the world again.

use serde::{Deserialize, Serialize};

use crate::types::{ActorId, Color, Coordinate};

/// Everything visible on a single cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellPerception {
    pub position: Coordinate,

    /// Agent standing here, if any.
    pub agent: Option<ActorId>,

    /// Colour of the packet carried by that agent.
    pub agent_carry: Option<Color>,

    /// Packet lying here.
    pub packet: Option<Color>,

    pub destination: Option<Color>,

    pub wall: bool,

    /// Energy station occupying the cell.
    pub energy_station: Option<ActorId>,

    pub flag: Option<Color>,

    /// Remaining lifetime of the pheromone here.
    pub pheromone: Option<u32>,

    /// Direction of a directed pheromone.
    pub pheromone_towards: Option<Coordinate>,

    pub crumbs: u32,
}

impl CellPerception {
    pub fn new(position: Coordinate) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// True when an agent could step onto this cell.
    ///
    /// Crumbs, flags and pheromones never block.
    pub fn is_walkable(&self) -> bool {
        self.agent.is_none()
            && self.packet.is_none()
            && self.destination.is_none()
            && !self.wall
            && self.energy_station.is_none()
    }
}

/// Snapshot of the cells within `view` of an actor at a given tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Perception {
    /// Whose perception this is.
    pub owner: ActorId,

    /// Where the owner stood when the snapshot was taken.
    pub position: Coordinate,

    /// Chebyshev radius of the square that was sampled.
    pub view: u32,

    /// World tick of the snapshot.
    pub time: u64,

    cells: Vec<CellPerception>,
}

impl Perception {
    pub fn new(owner: ActorId, position: Coordinate, view: u32, time: u64, cells: Vec<CellPerception>) -> Self {
        Self {
            owner,
            position,
            view,
            time,
            cells,
        }
    }

    /// A perception containing nothing but the owner's own position.
    pub fn blind(owner: ActorId, position: Coordinate, time: u64) -> Self {
        Self::new(owner, position, 0, time, Vec::new())
    }

    pub fn cells(&self) -> &[CellPerception] {
        &self.cells
    }

    /// Looks up a cell by absolute coordinate.
    pub fn cell(&self, at: Coordinate) -> Option<&CellPerception> {
        self.cells.iter().find(|c| c.position == at)
    }

    /// Visible cells adjacent to the owner.
    pub fn neighbours(&self) -> impl Iterator<Item = &CellPerception> {
        let here = self.position;
        self.cells.iter().filter(move |c| c.position.distance(&here) == 1)
    }

    /// Ids of every other agent or station in sight.
    pub fn visible_actors(&self) -> Vec<ActorId> {
        self.cells
            .iter()
            .flat_map(|c| c.agent.into_iter().chain(c.energy_station))
            .filter(|id| *id != self.owner)
            .collect()
    }

    /// Nearest cell (Chebyshev, ties broken by scan order) satisfying `pred`.
    pub fn closest<F>(&self, pred: F) -> Option<&CellPerception>
    where
        F: Fn(&CellPerception) -> bool,
    {
        let here = self.position;
        self.cells
            .iter()
            .filter(|c| pred(c))
            .min_by_key(|c| c.position.distance(&here))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Perception {
        let me = ActorId(1);
        let mut cells = Vec::new();
        for y in 0..3 {
            for x in 0..3 {
                cells.push(CellPerception::new(Coordinate::new(x, y)));
            }
        }
        cells[4].agent = Some(me);
        cells[0].packet = Some(Color::Red);
        cells[8].agent = Some(ActorId(2));
        Perception::new(me, Coordinate::new(1, 1), 1, 0, cells)
    }

    #[test]
    fn test_visible_actors_excludes_owner() {
        let p = sample();
        assert_eq!(p.visible_actors(), vec![ActorId(2)]);
    }

    #[test]
    fn test_closest_packet() {
        let p = sample();
        let c = p.closest(|c| c.packet.is_some()).unwrap();
        assert_eq!(c.position, Coordinate::new(0, 0));
    }

    #[test]
    fn test_walkable_neighbours() {
        let p = sample();
        let walkable = p.neighbours().filter(|c| c.is_walkable()).count();
        // 8 neighbours minus the packet and the other agent
        assert_eq!(walkable, 6);
    }
}
