//! Stock behaviours for agents and energy stations.
//!
//! Behaviours are looked up by name in a [`BehaviourRegistry`] so a config
//! file can pick one. Each factory takes a seed; behaviours that make random
//! choices draw from their own `ChaCha8Rng`.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use packetworld_core::{Behaviour, CommToken, Context, Memory, TalkContext};
use packetworld_env::energy::STATION_LOAD;
use packetworld_env::{CellPerception, Color, Coordinate, Influence};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, trace};

use crate::config::SimError;

/// Below this charge a courier heads for a station it can see.
pub const LOW_BATTERY: i32 = 200;

/// Talk rounds a gossip agent holds before voting to close.
pub const GOSSIP_ROUNDS: usize = 2;

/// Step onto a random free neighbour, or skip when boxed in.
fn wander(ctx: &Context<'_>, rng: &mut ChaCha8Rng) -> Influence {
    let free: Vec<Coordinate> = ctx
        .perception
        .neighbours()
        .filter(|c| c.is_walkable())
        .map(|c| c.position)
        .collect();
    match free.choose(rng) {
        Some(next) => Influence::step(ctx.id, *next),
        None => Influence::skip(ctx.id),
    }
}

/// One step towards `goal`, falling back to wandering when the direct cell
/// is blocked.
fn approach(ctx: &Context<'_>, goal: Coordinate, rng: &mut ChaCha8Rng) -> Influence {
    let next = ctx.position().step_towards(&goal);
    let open = ctx.perception.cell(next).map_or(false, CellPerception::is_walkable);
    if open {
        Influence::step(ctx.id, next)
    } else {
        wander(ctx, rng)
    }
}

/// Walks at random and never talks.
pub struct Wander {
    rng: ChaCha8Rng,
}

impl Wander {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl Behaviour for Wander {
    fn on_communicate(&mut self, _ctx: &mut TalkContext<'_>) -> CommToken {
        CommToken::Close
    }

    fn on_act(&mut self, ctx: &mut Context<'_>) -> Influence {
        wander(ctx, &mut self.rng)
    }
}

fn destination_key(color: Color) -> String {
    format!("dest:{}", color.name())
}

fn recall_destination(memory: &Memory, color: Color) -> Option<Coordinate> {
    let value = memory.recall(&destination_key(color))?;
    let (x, y) = value.split_once(',')?;
    Some(Coordinate::new(x.parse().ok()?, y.parse().ok()?))
}

fn remember_destination(memory: &mut Memory, color: Color, at: Coordinate) {
    memory.remember(destination_key(color), format!("{},{}", at.x, at.y));
}

/// Parses `"destination <color> <x> <y>"`.
fn parse_sighting(text: &str) -> Option<(Color, Coordinate)> {
    let mut words = text.split_whitespace();
    if words.next()? != "destination" {
        return None;
    }
    let color = words.next()?.parse().ok()?;
    let x = words.next()?.parse().ok()?;
    let y = words.next()?.parse().ok()?;
    Some((color, Coordinate::new(x, y)))
}

/// Fetches packets and carries them to their destination.
///
/// Destinations seen by any courier are broadcast once, so the group learns
/// the map faster than any single agent could.
pub struct Courier {
    rng: ChaCha8Rng,
    announced: BTreeSet<Color>,
}

impl Courier {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            announced: BTreeSet::new(),
        }
    }

    fn recharge(&mut self, ctx: &Context<'_>) -> Option<Influence> {
        let battery = ctx.state?.battery;
        if battery >= LOW_BATTERY {
            return None;
        }
        let station = ctx.perception.closest(|c| c.energy_station.is_some())?;
        let dock = station.position.offset(0, -1);
        if ctx.position() == dock {
            return Some(Influence::skip(ctx.id));
        }
        Some(approach(ctx, dock, &mut self.rng))
    }
}

impl Behaviour for Courier {
    fn on_perceive(&mut self, ctx: &mut Context<'_>) {
        for cell in ctx.perception.cells() {
            if let Some(color) = cell.destination {
                remember_destination(ctx.memory, color, cell.position);
            }
        }
    }

    fn on_communicate(&mut self, ctx: &mut TalkContext<'_>) -> CommToken {
        let inbox: Vec<_> = ctx.messages.drain(..).collect();
        for mail in inbox {
            match parse_sighting(&mail.text) {
                Some((color, at)) => {
                    trace!("{} learns the {} destination from {}", ctx.name, color, mail.from);
                    remember_destination(ctx.memory, color, at);
                    self.announced.insert(color);
                }
                None => debug!("{} ignores mail: {}", ctx.name, mail),
            }
        }

        for color in Color::PALETTE {
            if self.announced.contains(&color) {
                continue;
            }
            if let Some(at) = recall_destination(ctx.memory, color) {
                ctx.broadcast(format!("destination {} {} {}", color, at.x, at.y));
                self.announced.insert(color);
            }
        }
        CommToken::Close
    }

    fn on_act(&mut self, ctx: &mut Context<'_>) -> Influence {
        if let Some(influence) = self.recharge(ctx) {
            return influence;
        }
        let here = ctx.position();

        if let Some(carry) = ctx.state.and_then(|s| s.carry) {
            return match recall_destination(ctx.memory, carry) {
                Some(goal) if here.distance(&goal) == 1 => Influence::put_packet(ctx.id, goal),
                Some(goal) => approach(ctx, goal, &mut self.rng),
                None => wander(ctx, &mut self.rng),
            };
        }

        let wanted = ctx.state.and_then(|s| s.color);
        let fits = |c: &CellPerception| c.packet.map_or(false, |p| wanted.map_or(true, |w| w == p));
        if let Some(cell) = ctx.perception.neighbours().find(|c| fits(c)) {
            return Influence::pick_packet(ctx.id, cell.position, cell.packet);
        }
        match ctx.perception.closest(|c| fits(c)) {
            Some(cell) => {
                let goal = cell.position;
                approach(ctx, goal, &mut self.rng)
            }
            None => wander(ctx, &mut self.rng),
        }
    }
}

/// Holds several talk rounds per cycle by voting to continue, then wanders.
pub struct Gossip {
    rng: ChaCha8Rng,
    rounds: usize,
    spoken: usize,
    heard: u64,
}

impl Gossip {
    pub fn new(seed: u64, rounds: usize) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            rounds,
            spoken: 0,
            heard: 0,
        }
    }

    /// Mails received so far.
    pub fn heard(&self) -> u64 {
        self.heard
    }
}

impl Behaviour for Gossip {
    fn on_communicate(&mut self, ctx: &mut TalkContext<'_>) -> CommToken {
        self.heard += ctx.messages.drain(..).count() as u64;
        if self.spoken < self.rounds {
            let text = format!("round {} at tick {}", self.spoken, ctx.time);
            ctx.broadcast(text);
            self.spoken += 1;
            CommToken::Continue
        } else {
            CommToken::Close
        }
    }

    fn on_act(&mut self, ctx: &mut Context<'_>) -> Influence {
        self.spoken = 0;
        wander(ctx, &mut self.rng)
    }
}

/// Replays a fixed list of influences, then skips.
///
/// Built by name it has no steps and idles from the start.
#[derive(Default)]
pub struct Script {
    steps: VecDeque<Influence>,
}

impl Script {
    pub fn new(steps: impl IntoIterator<Item = Influence>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }
}

impl Behaviour for Script {
    fn on_communicate(&mut self, _ctx: &mut TalkContext<'_>) -> CommToken {
        CommToken::Close
    }

    fn on_act(&mut self, ctx: &mut Context<'_>) -> Influence {
        self.steps.pop_front().unwrap_or_else(|| Influence::skip(ctx.id))
    }
}

/// Item behaviour: charges whoever stands on the cell above the station.
#[derive(Default)]
pub struct EnergyStation;

impl Behaviour for EnergyStation {
    fn on_communicate(&mut self, _ctx: &mut TalkContext<'_>) -> CommToken {
        CommToken::Close
    }

    fn on_act(&mut self, ctx: &mut Context<'_>) -> Influence {
        let dock = ctx.position().offset(0, -1);
        let occupied = ctx.perception.cell(dock).map_or(false, |c| c.agent.is_some());
        if occupied {
            Influence::energy(ctx.id, dock, STATION_LOAD)
        } else {
            Influence::skip(ctx.id)
        }
    }
}

pub type BehaviourFactory = fn(u64) -> Box<dyn Behaviour>;

/// Name to constructor map for behaviours.
#[derive(Default)]
pub struct BehaviourRegistry {
    factories: BTreeMap<String, BehaviourFactory>,
}

impl BehaviourRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("wander", |seed| Box::new(Wander::new(seed)));
        registry.register("courier", |seed| Box::new(Courier::new(seed)));
        registry.register("gossip", |seed| Box::new(Gossip::new(seed, GOSSIP_ROUNDS)));
        registry.register("script", |_| Box::new(Script::default()));
        registry.register("energy_station", |_| Box::new(EnergyStation));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: BehaviourFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn build(&self, name: &str, seed: u64) -> Result<Box<dyn Behaviour>, SimError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| SimError::UnknownBehaviour(name.to_string()))?;
        Ok(factory(seed))
    }
}
