//! Reference world: a bounded grid of typed layers.
//!
//! Every layer is a sparse map keyed by [`Coordinate`]. Bodies (agents and
//! energy stations) are keyed by [`ActorId`] instead, since they are the
//! things that perceive.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::energy;
use crate::error::EnvError;
use crate::influence::{Influence, InfluenceKind, Layer};
use crate::perception::{CellPerception, Perception};
use crate::types::{ActorId, Color, Coordinate};
use crate::world::{AgentState, ItemKind, SharedWorld, World};

/// Lifetime of a pheromone put without an explicit one.
pub const DEFAULT_PHEROMONE_LIFETIME: u32 = 100;

/// Lifetime added when an existing pheromone is reinforced without an
/// explicit amount.
pub const PHEROMONE_REINFORCEMENT: u32 = 75;

pub const MAX_PHEROMONE_LIFETIME: u32 = 2000;

/// Default perception radius.
pub const DEFAULT_VIEW: u32 = 3;

#[derive(Debug, Clone)]
struct AgentBody {
    name: String,
    position: Coordinate,
    carry: Option<Color>,
    color: Option<Color>,
    battery: i32,
}

#[derive(Debug, Clone, Copy)]
struct Pheromone {
    lifetime: u32,
    towards: Option<Coordinate>,
}

/// The reference [`World`].
#[derive(Debug, Clone)]
pub struct GridWorld {
    width: i32,
    height: i32,
    view: u32,
    time: u64,
    energy_enabled: bool,
    next_id: u32,
    agents: BTreeMap<ActorId, AgentBody>,
    stations: BTreeMap<ActorId, Coordinate>,
    packets: HashMap<Coordinate, Color>,
    destinations: HashMap<Coordinate, Color>,
    walls: HashSet<Coordinate>,
    flags: HashMap<Coordinate, Color>,
    pheromones: HashMap<Coordinate, Pheromone>,
    crumbs: HashMap<Coordinate, u32>,
    undelivered: usize,
}

impl GridWorld {
    /// Creates an empty `width` x `height` grid.
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            view: DEFAULT_VIEW,
            time: 0,
            energy_enabled: true,
            next_id: 0,
            agents: BTreeMap::new(),
            stations: BTreeMap::new(),
            packets: HashMap::new(),
            destinations: HashMap::new(),
            walls: HashSet::new(),
            flags: HashMap::new(),
            pheromones: HashMap::new(),
            crumbs: HashMap::new(),
            undelivered: 0,
        }
    }

    /// Sets the perception radius.
    pub fn with_view(mut self, view: u32) -> Self {
        self.view = view;
        self
    }

    /// Disables battery accounting.
    pub fn without_energy(mut self) -> Self {
        self.energy_enabled = false;
        self
    }

    pub fn energy_enabled(&self) -> bool {
        self.energy_enabled
    }

    /// Wraps the world for sharing with the kernel.
    pub fn into_shared(self) -> SharedWorld {
        Arc::new(RwLock::new(self))
    }

    /// True when no layer holds anything at `at`.
    pub fn is_free(&self, at: Coordinate) -> bool {
        self.in_bounds(at)
            && !self.agents.values().any(|a| a.position == at)
            && !self.stations.values().any(|p| *p == at)
            && !self.packets.contains_key(&at)
            && !self.destinations.contains_key(&at)
            && !self.walls.contains(&at)
            && !self.flags.contains_key(&at)
            && !self.pheromones.contains_key(&at)
            && !self.crumbs.contains_key(&at)
    }

    fn check_placement(&self, kind: ItemKind, at: Coordinate) -> Result<(), EnvError> {
        if !self.in_bounds(at) {
            return Err(EnvError::OutOfBounds(at));
        }
        if !self.can_stand_on(kind, at) {
            return Err(EnvError::Occupied(at));
        }
        Ok(())
    }

    fn allocate_id(&mut self) -> ActorId {
        let id = ActorId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Places an agent with a full battery and returns its id.
    pub fn place_agent(&mut self, name: impl Into<String>, at: Coordinate) -> Result<ActorId, EnvError> {
        self.place_agent_with(name, at, None, None)
    }

    /// Places an agent with an optional colour restriction and an optional
    /// packet already in hand.
    pub fn place_agent_with(
        &mut self,
        name: impl Into<String>,
        at: Coordinate,
        color: Option<Color>,
        carry: Option<Color>,
    ) -> Result<ActorId, EnvError> {
        self.check_placement(ItemKind::Agent, at)?;
        let id = self.allocate_id();
        self.agents.insert(
            id,
            AgentBody {
                name: name.into(),
                position: at,
                carry,
                color,
                battery: energy::START_ENERGY,
            },
        );
        if carry.is_some() {
            self.undelivered += 1;
        }
        Ok(id)
    }

    pub fn place_energy_station(&mut self, at: Coordinate) -> Result<ActorId, EnvError> {
        self.check_placement(ItemKind::EnergyStation, at)?;
        let id = self.allocate_id();
        self.stations.insert(id, at);
        Ok(id)
    }

    pub fn place_packet(&mut self, at: Coordinate, color: Color) -> Result<(), EnvError> {
        self.check_placement(ItemKind::Packet, at)?;
        if self.destinations.contains_key(&at) {
            return Err(EnvError::Occupied(at));
        }
        self.packets.insert(at, color);
        self.undelivered += 1;
        Ok(())
    }

    pub fn place_destination(&mut self, at: Coordinate, color: Color) -> Result<(), EnvError> {
        self.check_placement(ItemKind::Destination, at)?;
        self.destinations.insert(at, color);
        Ok(())
    }

    pub fn place_wall(&mut self, at: Coordinate) -> Result<(), EnvError> {
        self.check_placement(ItemKind::Wall, at)?;
        self.walls.insert(at);
        Ok(())
    }

    pub fn place_crumbs(&mut self, at: Coordinate, amount: u32) -> Result<(), EnvError> {
        self.check_placement(ItemKind::Crumb, at)?;
        *self.crumbs.entry(at).or_insert(0) += amount;
        Ok(())
    }

    /// Position of a station body.
    pub fn station(&self, id: ActorId) -> Option<Coordinate> {
        self.stations.get(&id).copied()
    }

    pub fn pheromone_at(&self, at: Coordinate) -> Option<u32> {
        self.pheromones.get(&at).map(|p| p.lifetime)
    }

    pub fn flag_at(&self, at: Coordinate) -> Option<Color> {
        self.flags.get(&at).copied()
    }

    fn agent_id_at(&self, at: Coordinate) -> Option<ActorId> {
        self.agents.iter().find(|(_, a)| a.position == at).map(|(id, _)| *id)
    }

    fn station_at(&self, at: Coordinate) -> Option<ActorId> {
        self.stations.iter().find(|(_, p)| **p == at).map(|(id, _)| *id)
    }

    fn body_mut(&mut self, id: ActorId) -> Result<&mut AgentBody, EnvError> {
        self.agents.get_mut(&id).ok_or(EnvError::UnknownActor(id))
    }

    fn cell(&self, at: Coordinate) -> CellPerception {
        let agent = self.agent_id_at(at);
        let pheromone = self.pheromones.get(&at);
        CellPerception {
            position: at,
            agent,
            agent_carry: agent.and_then(|id| self.agents.get(&id)).and_then(|a| a.carry),
            packet: self.packets.get(&at).copied(),
            destination: self.destinations.get(&at).copied(),
            wall: self.walls.contains(&at),
            energy_station: self.station_at(at),
            flag: self.flags.get(&at).copied(),
            pheromone: pheromone.map(|p| p.lifetime),
            pheromone_towards: pheromone.and_then(|p| p.towards),
            crumbs: self.crumbs.get(&at).copied().unwrap_or(0),
        }
    }

    fn step(&mut self, id: ActorId, to: Coordinate) -> Result<(), EnvError> {
        if !self.in_bounds(to) {
            return Err(EnvError::OutOfBounds(to));
        }
        let body = self.body_mut(id)?;
        trace!("agent {} steps {} -> {}", id, body.position, to);
        body.position = to;
        Ok(())
    }

    fn load(&mut self, at: Coordinate, amount: i32) {
        if let Some(id) = self.agent_id_at(at) {
            if let Some(body) = self.agents.get_mut(&id) {
                body.battery = (body.battery + amount).min(energy::MAX_ENERGY);
                trace!("agent {} charged to {}", id, body.battery);
            }
        }
    }

    fn pick_packet(&mut self, id: ActorId, at: Coordinate) -> Result<(), EnvError> {
        if self.body_mut(id)?.carry.is_some() {
            return Err(EnvError::HandsFull(id));
        }
        let color = self.packets.remove(&at).ok_or(EnvError::NothingThere(at))?;
        self.body_mut(id)?.carry = Some(color);
        Ok(())
    }

    fn put_packet(&mut self, id: ActorId, at: Coordinate) -> Result<(), EnvError> {
        if self.packets.contains_key(&at) {
            return Err(EnvError::Occupied(at));
        }
        let color = self.body_mut(id)?.carry.take().ok_or(EnvError::EmptyHands(id))?;
        if self.destinations.contains_key(&at) {
            self.undelivered -= 1;
            debug!("agent {} delivered a {} packet at {} ({} left)", id, color, at, self.undelivered);
        } else {
            self.packets.insert(at, color);
        }
        Ok(())
    }

    fn pass_packet(&mut self, from: ActorId, at: Coordinate) -> Result<(), EnvError> {
        let to = self.agent_id_at(at).ok_or(EnvError::NothingThere(at))?;
        let color = self.body_mut(from)?.carry.take().ok_or(EnvError::EmptyHands(from))?;
        self.body_mut(to)?.carry = Some(color);
        debug!("agent {} passed a {} packet to agent {}", from, color, to);
        Ok(())
    }

    fn put_pheromone(&mut self, at: Coordinate, lifetime: u32, towards: Option<Coordinate>) {
        match self.pheromones.get_mut(&at) {
            Some(existing) => {
                let boost = if lifetime == 0 { PHEROMONE_REINFORCEMENT } else { lifetime };
                existing.lifetime = (existing.lifetime + boost).min(MAX_PHEROMONE_LIFETIME);
                if towards.is_some() {
                    existing.towards = towards;
                }
            }
            None => {
                let lifetime = if lifetime == 0 { DEFAULT_PHEROMONE_LIFETIME } else { lifetime };
                self.pheromones.insert(
                    at,
                    Pheromone {
                        lifetime: lifetime.min(MAX_PHEROMONE_LIFETIME),
                        towards,
                    },
                );
            }
        }
    }

    fn pick_crumbs(&mut self, at: Coordinate, amount: u32) -> Result<(), EnvError> {
        let count = self.crumbs.get_mut(&at).ok_or(EnvError::NothingThere(at))?;
        if *count < amount {
            return Err(EnvError::NothingThere(at));
        }
        *count -= amount;
        if *count == 0 {
            self.crumbs.remove(&at);
        }
        Ok(())
    }

    fn effect_agents(&mut self, influence: &Influence) -> Result<(), EnvError> {
        match influence.kind {
            InfluenceKind::Step => self.step(influence.origin, influence.target),
            InfluenceKind::Energy { amount } => {
                self.load(influence.target, amount);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn effect_packets(&mut self, influence: &Influence) -> Result<(), EnvError> {
        let (id, at) = (influence.origin, influence.target);
        match influence.kind {
            InfluenceKind::PickPacket { .. } => self.pick_packet(id, at),
            InfluenceKind::PutPacket => self.put_packet(id, at),
            InfluenceKind::PassPacket => self.pass_packet(id, at),
            _ => Ok(()),
        }
    }

    fn effect_pheromones(&mut self, influence: &Influence) {
        let at = influence.target;
        match influence.kind {
            InfluenceKind::PutPheromone { lifetime } => self.put_pheromone(at, lifetime, None),
            InfluenceKind::PutDirPheromone { lifetime, towards } => self.put_pheromone(at, lifetime, Some(towards)),
            InfluenceKind::RemovePheromone => {
                self.pheromones.remove(&at);
            }
            _ => {}
        }
    }

    fn effect_crumbs(&mut self, influence: &Influence) -> Result<(), EnvError> {
        let at = influence.target;
        match influence.kind {
            InfluenceKind::PutCrumb { amount } => {
                *self.crumbs.entry(at).or_insert(0) += amount;
                Ok(())
            }
            InfluenceKind::PickCrumb { amount } => self.pick_crumbs(at, amount),
            _ => Ok(()),
        }
    }

    fn debit(&mut self, id: ActorId, cost: i32) {
        if !self.energy_enabled || cost == 0 {
            return;
        }
        if let Some(body) = self.agents.get_mut(&id) {
            body.battery = (body.battery - cost).max(0);
        }
    }
}

impl World for GridWorld {
    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn time(&self) -> u64 {
        self.time
    }

    fn increment_clock(&mut self) -> u64 {
        self.time += 1;
        self.pheromones.retain(|_, p| {
            p.lifetime = p.lifetime.saturating_sub(1);
            p.lifetime > 0
        });
        self.time
    }

    fn perceive(&self, id: ActorId) -> Result<Perception, EnvError> {
        let position = match self.agents.get(&id) {
            Some(body) => body.position,
            None => self.station(id).ok_or(EnvError::UnknownActor(id))?,
        };
        let view = self.view as i32;
        let mut cells = Vec::with_capacity(((2 * view + 1) * (2 * view + 1)) as usize);
        for y in (position.y - view)..=(position.y + view) {
            for x in (position.x - view)..=(position.x + view) {
                let at = Coordinate::new(x, y);
                if self.in_bounds(at) {
                    cells.push(self.cell(at));
                }
            }
        }
        Ok(Perception::new(id, position, self.view, self.time, cells))
    }

    fn effectuate(&mut self, influence: &Influence) -> Result<(), EnvError> {
        let id = influence.origin;
        let at = influence.target;
        let carrying = self.agents.get(&id).map(|a| a.carry.is_some()).unwrap_or(false);

        match influence.layer() {
            Layer::Agents => self.effect_agents(influence)?,
            Layer::Packets => self.effect_packets(influence)?,
            Layer::Flags => {
                if let InfluenceKind::PutFlag { color } = influence.kind {
                    self.flags.insert(at, color);
                }
            }
            Layer::Pheromones => self.effect_pheromones(influence),
            Layer::Crumbs => self.effect_crumbs(influence)?,
        }

        self.debit(id, energy::cost_of(&influence.kind, carrying));
        Ok(())
    }

    fn remove_actor(&mut self, id: ActorId) -> bool {
        if let Some(body) = self.agents.remove(&id) {
            if let Some(color) = body.carry {
                if self.packets.contains_key(&body.position) {
                    self.undelivered -= 1;
                    debug!("agent {} left with a {} packet, nowhere to drop it", id, color);
                } else {
                    self.packets.insert(body.position, color);
                    debug!("agent {} left its {} packet at {}", id, color, body.position);
                }
            }
            return true;
        }
        self.stations.remove(&id).is_some()
    }

    fn agent(&self, id: ActorId) -> Option<AgentState> {
        self.agents.get(&id).map(|a| AgentState {
            id,
            name: a.name.clone(),
            position: a.position,
            carry: a.carry,
            color: a.color,
            battery: a.battery,
        })
    }

    fn agent_at(&self, at: Coordinate) -> Option<AgentState> {
        self.agent_id_at(at).and_then(|id| self.agent(id))
    }

    fn packet_at(&self, at: Coordinate) -> Option<Color> {
        self.packets.get(&at).copied()
    }

    fn crumbs_at(&self, at: Coordinate) -> u32 {
        self.crumbs.get(&at).copied().unwrap_or(0)
    }

    fn can_stand_on(&self, kind: ItemKind, at: Coordinate) -> bool {
        if !self.in_bounds(at) {
            return false;
        }
        let agent = self.agent_id_at(at).is_some();
        let station = self.station_at(at).is_some();
        let packet = self.packets.contains_key(&at);
        let destination = self.destinations.contains_key(&at);
        let wall = self.walls.contains(&at);
        let flag = self.flags.contains_key(&at);
        let crumb = self.crumbs.contains_key(&at);

        match kind {
            ItemKind::Agent => !(agent || station || packet || destination || wall),
            ItemKind::Packet => !(agent || station || packet || wall || flag),
            ItemKind::Flag => !(station || packet || destination || wall || flag),
            ItemKind::Pheromone => !(station || destination || wall),
            ItemKind::Crumb => !(station || packet || destination || wall),
            ItemKind::Destination | ItemKind::EnergyStation | ItemKind::Wall => {
                !(agent || station || packet || destination || wall || flag || crumb)
                    && !self.pheromones.contains_key(&at)
            }
        }
    }

    fn packets_remaining(&self) -> usize {
        self.undelivered
    }

    fn actor_ids(&self) -> Vec<ActorId> {
        let mut ids: Vec<_> = self.agents.keys().chain(self.stations.keys()).copied().collect();
        ids.sort();
        ids
    }
}
