//! Seeded random world layouts.
//!
//! Placement order is fixed (destinations, packets, stations, agents) and
//! every draw comes from one `ChaCha8Rng`, so a seed always yields the same
//! grid.

use packetworld_env::{ActorId, Coordinate, GridWorld, ItemKind, World};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::config::{SimConfig, SimError};

/// Draws per item before giving up on a crowded grid.
const PLACEMENT_ATTEMPTS: usize = 1000;

/// A freshly built world and the bodies the kernel must drive.
pub struct WorldLayout {
    pub world: GridWorld,
    pub agents: Vec<ActorId>,
    pub stations: Vec<ActorId>,
}

pub fn build_world(config: &SimConfig) -> Result<WorldLayout, SimError> {
    config.validate()?;
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut world = GridWorld::new(config.width, config.height).with_view(config.view);
    if !config.energy {
        world = world.without_energy();
    }

    for color in &config.packet_colors {
        let at = free_cell(&world, &mut rng, "destination", |_| true)?;
        world.place_destination(at, *color)?;
    }
    for color in &config.packet_colors {
        for _ in 0..config.packets_per_color {
            let at = free_cell(&world, &mut rng, "packet", |_| true)?;
            world.place_packet(at, *color)?;
        }
    }

    // A station charges the cell above it, so it needs one.
    let mut stations = Vec::with_capacity(config.energy_stations);
    for _ in 0..config.energy_stations {
        let at = free_cell(&world, &mut rng, "energy station", |at| {
            world.can_stand_on(ItemKind::Agent, at.offset(0, -1))
        })?;
        stations.push(world.place_energy_station(at)?);
    }

    let mut agents = Vec::with_capacity(config.agents);
    for i in 0..config.agents {
        let at = free_cell(&world, &mut rng, "agent", |_| true)?;
        agents.push(world.place_agent(format!("agent{}", i), at)?);
    }

    debug!(
        "built {}x{} world: {} agents, {} stations, {} packets",
        config.width,
        config.height,
        agents.len(),
        stations.len(),
        world.packets_remaining()
    );
    Ok(WorldLayout { world, agents, stations })
}

fn free_cell<F>(world: &GridWorld, rng: &mut ChaCha8Rng, what: &'static str, extra: F) -> Result<Coordinate, SimError>
where
    F: Fn(Coordinate) -> bool,
{
    for _ in 0..PLACEMENT_ATTEMPTS {
        let at = Coordinate::new(rng.gen_range(0..world.width()), rng.gen_range(0..world.height()));
        if world.is_free(at) && extra(at) {
            return Ok(at);
        }
    }
    Err(SimError::NoRoom(what))
}
