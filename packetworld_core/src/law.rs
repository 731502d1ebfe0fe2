//! Laws: admission rules the reactor checks before applying an influence.
//!
//! Every law states which influences it governs ([`Law::applicable`]) and
//! whether a given influence is admissible in the current world
//! ([`Law::apply`]). An influence is applied only if every applicable law
//! agrees. Laws are looked up by name in a [`LawRegistry`], so a config can
//! select them without code changes.

use std::collections::BTreeMap;

use packetworld_env::{Influence, InfluenceKind, ItemKind, World};
use tracing::trace;

use crate::error::KernelError;

/// Names of the laws every registry built with [`LawRegistry::with_builtins`]
/// knows about.
pub const BUILTIN_LAWS: [&str; 7] = [
    "step",
    "pick_packet",
    "put_packet",
    "pass_packet",
    "put_flag",
    "put_pheromone",
    "pick_crumb",
];

pub trait Law: Send + Sync {
    fn name(&self) -> &'static str;

    fn applicable(&self, influence: &Influence) -> bool;

    fn apply(&self, influence: &Influence, world: &dyn World) -> bool;
}

/// A step goes to an adjacent cell an agent can stand on.
pub struct StepLaw;

impl Law for StepLaw {
    fn name(&self) -> &'static str {
        "step"
    }

    fn applicable(&self, influence: &Influence) -> bool {
        matches!(influence.kind, InfluenceKind::Step)
    }

    fn apply(&self, influence: &Influence, world: &dyn World) -> bool {
        let Some(agent) = world.agent(influence.origin) else {
            return false;
        };
        if agent.position.distance(&influence.target) != 1 {
            trace!(
                "no move allowed from {} to {} for {}",
                agent.position,
                influence.target,
                influence.origin
            );
            return false;
        }
        world.can_stand_on(ItemKind::Agent, influence.target)
    }
}

/// A pick needs a packet in reach, of a colour the agent may take, and
/// empty hands.
pub struct PickPacketLaw;

impl Law for PickPacketLaw {
    fn name(&self) -> &'static str {
        "pick_packet"
    }

    fn applicable(&self, influence: &Influence) -> bool {
        matches!(influence.kind, InfluenceKind::PickPacket { .. })
    }

    fn apply(&self, influence: &Influence, world: &dyn World) -> bool {
        let Some(agent) = world.agent(influence.origin) else {
            return false;
        };
        let Some(packet) = world.packet_at(influence.target) else {
            return false;
        };
        agent.position.distance(&influence.target) <= 1
            && agent.color.map_or(true, |c| c == packet)
            && !agent.is_carrying()
    }
}

/// A put needs a carried packet and a cell a packet can lie on.
pub struct PutPacketLaw;

impl Law for PutPacketLaw {
    fn name(&self) -> &'static str {
        "put_packet"
    }

    fn applicable(&self, influence: &Influence) -> bool {
        matches!(influence.kind, InfluenceKind::PutPacket)
    }

    fn apply(&self, influence: &Influence, world: &dyn World) -> bool {
        let carrying = world.agent(influence.origin).map_or(false, |a| a.is_carrying());
        carrying && world.can_stand_on(ItemKind::Packet, influence.target)
    }
}

/// A hand-off needs an agent with empty hands on the target cell.
pub struct PassPacketLaw;

impl Law for PassPacketLaw {
    fn name(&self) -> &'static str {
        "pass_packet"
    }

    fn applicable(&self, influence: &Influence) -> bool {
        matches!(influence.kind, InfluenceKind::PassPacket)
    }

    fn apply(&self, influence: &Influence, world: &dyn World) -> bool {
        world
            .agent_at(influence.target)
            .map_or(false, |receiver| !receiver.is_carrying())
    }
}

pub struct PutFlagLaw;

impl Law for PutFlagLaw {
    fn name(&self) -> &'static str {
        "put_flag"
    }

    fn applicable(&self, influence: &Influence) -> bool {
        matches!(influence.kind, InfluenceKind::PutFlag { .. })
    }

    fn apply(&self, influence: &Influence, world: &dyn World) -> bool {
        world.can_stand_on(ItemKind::Flag, influence.target)
    }
}

/// Covers both plain and directed pheromones.
pub struct PutPheromoneLaw;

impl Law for PutPheromoneLaw {
    fn name(&self) -> &'static str {
        "put_pheromone"
    }

    fn applicable(&self, influence: &Influence) -> bool {
        matches!(
            influence.kind,
            InfluenceKind::PutPheromone { .. } | InfluenceKind::PutDirPheromone { .. }
        )
    }

    fn apply(&self, influence: &Influence, world: &dyn World) -> bool {
        world.can_stand_on(ItemKind::Pheromone, influence.target)
    }
}

pub struct PickCrumbLaw;

impl Law for PickCrumbLaw {
    fn name(&self) -> &'static str {
        "pick_crumb"
    }

    fn applicable(&self, influence: &Influence) -> bool {
        matches!(influence.kind, InfluenceKind::PickCrumb { .. })
    }

    fn apply(&self, influence: &Influence, world: &dyn World) -> bool {
        match influence.kind {
            InfluenceKind::PickCrumb { amount } => world.crumbs_at(influence.target) >= amount.max(1),
            _ => false,
        }
    }
}

pub type LawFactory = fn() -> Box<dyn Law>;

/// Name to constructor map for laws.
#[derive(Default)]
pub struct LawRegistry {
    factories: BTreeMap<String, LawFactory>,
}

impl LawRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry knowing every built-in law.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("step", || Box::new(StepLaw));
        registry.register("pick_packet", || Box::new(PickPacketLaw));
        registry.register("put_packet", || Box::new(PutPacketLaw));
        registry.register("pass_packet", || Box::new(PassPacketLaw));
        registry.register("put_flag", || Box::new(PutFlagLaw));
        registry.register("put_pheromone", || Box::new(PutPheromoneLaw));
        registry.register("pick_crumb", || Box::new(PickCrumbLaw));
        registry
    }

    /// Adds or replaces a law constructor.
    pub fn register(&mut self, name: impl Into<String>, factory: LawFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Instantiates the named laws, in order.
    pub fn build(&self, names: &[String]) -> Result<LawBook, KernelError> {
        let laws = names
            .iter()
            .map(|name| {
                self.factories
                    .get(name)
                    .map(|factory| factory())
                    .ok_or_else(|| KernelError::UnknownLaw(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(LawBook { laws })
    }
}

/// The laws in force for one kernel.
pub struct LawBook {
    laws: Vec<Box<dyn Law>>,
}

impl LawBook {
    /// Checks `influence` against every applicable law. On refusal, returns
    /// the name of the first law that said no.
    pub fn validate(&self, influence: &Influence, world: &dyn World) -> Result<(), &'static str> {
        for law in self.laws.iter().filter(|law| law.applicable(influence)) {
            if !law.apply(influence, world) {
                return Err(law.name());
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.laws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.laws.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packetworld_env::{ActorId, Color, Coordinate, GridWorld};

    fn book() -> LawBook {
        let names: Vec<String> = BUILTIN_LAWS.iter().map(|s| s.to_string()).collect();
        LawRegistry::with_builtins().build(&names).unwrap()
    }

    #[test]
    fn test_unknown_law() {
        let err = LawRegistry::with_builtins().build(&["gravity".to_string()]);
        assert!(matches!(err, Err(KernelError::UnknownLaw(_))));
    }

    #[test]
    fn test_step_law() {
        let mut w = GridWorld::new(5, 5);
        let a = w.place_agent("a", Coordinate::new(1, 1)).unwrap();
        w.place_wall(Coordinate::new(2, 2)).unwrap();
        let laws = book();

        assert!(laws.validate(&Influence::step(a, Coordinate::new(1, 2)), &w).is_ok());
        assert_eq!(laws.validate(&Influence::step(a, Coordinate::new(3, 3)), &w), Err("step"));
        assert_eq!(laws.validate(&Influence::step(a, Coordinate::new(2, 2)), &w), Err("step"));
    }

    #[test]
    fn test_pick_packet_law() {
        let mut w = GridWorld::new(5, 5);
        let a = w
            .place_agent_with("a", Coordinate::new(1, 1), Some(Color::Red), None)
            .unwrap();
        w.place_packet(Coordinate::new(1, 2), Color::Blue).unwrap();
        w.place_packet(Coordinate::new(2, 1), Color::Red).unwrap();
        let laws = book();

        assert_eq!(
            laws.validate(&Influence::pick_packet(a, Coordinate::new(1, 2), None), &w),
            Err("pick_packet")
        );
        assert!(laws
            .validate(&Influence::pick_packet(a, Coordinate::new(2, 1), None), &w)
            .is_ok());
        assert_eq!(
            laws.validate(&Influence::pick_packet(a, Coordinate::new(0, 0), None), &w),
            Err("pick_packet")
        );
    }

    #[test]
    fn test_put_packet_law_blocks_agent_cells() {
        let mut w = GridWorld::new(5, 5);
        let a = w
            .place_agent_with("a", Coordinate::new(2, 2), None, Some(Color::Red))
            .unwrap();
        w.place_agent("b", Coordinate::new(2, 3)).unwrap();
        let laws = book();

        assert_eq!(
            laws.validate(&Influence::put_packet(a, Coordinate::new(2, 3)), &w),
            Err("put_packet")
        );
        assert!(laws.validate(&Influence::pass_packet(a, Coordinate::new(2, 3)), &w).is_ok());
    }

    #[test]
    fn test_ungoverned_influence_passes() {
        let w = GridWorld::new(3, 3);
        assert!(book().validate(&Influence::skip(ActorId(0)), &w).is_ok());
    }
}
