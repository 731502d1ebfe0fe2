//! The reactor: applies the influences of a sphere to the world.
//!
//! Processing an influence set runs in three passes under the world's write
//! lock:
//!
//! 1. **Hand-off pairing**: a put and a pick that meet over the same cell
//!    are rewritten into one `PassPacket` from putter to getter plus a
//!    `NoOp` standing in for the consumed pick.
//! 2. **Validation and effect**: each influence is checked against the law
//!    book and, if admissible, applied to its layer.
//! 3. **Clock**: the tick advances and observers are notified.

use std::sync::Arc;

use packetworld_env::{Influence, InfluenceKind, SharedWorld, World};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::envelope::{Envelope, InfluenceSet};
use crate::events::WorldEvent;
use crate::handler::Handler;
use crate::law::LawBook;
use crate::status::KernelStats;

pub struct Reactor {
    world: SharedWorld,
    laws: LawBook,
    events: broadcast::Sender<WorldEvent>,
    stats: Arc<KernelStats>,
    announced: bool,
}

impl Reactor {
    pub fn new(
        world: SharedWorld,
        laws: LawBook,
        events: broadcast::Sender<WorldEvent>,
        stats: Arc<KernelStats>,
    ) -> Self {
        Self {
            world,
            laws,
            events,
            stats,
            announced: false,
        }
    }

    fn apply(&self, influence: &Influence, world: &mut dyn World) {
        if influence.is_noop() {
            return;
        }
        if let Err(law) = self.laws.validate(influence, world) {
            debug!("{} refused by law {}", influence, law);
            self.stats.add_influences_rejected(1);
            return;
        }
        match world.effectuate(influence) {
            Ok(()) => self.stats.add_influences_applied(1),
            Err(e) => {
                warn!("{} failed: {}", influence, e);
                self.stats.add_influences_rejected(1);
            }
        }
    }
}

/// Pass influence for a matching put/pick pair, in either order.
///
/// They match when the getter stands on the put's target and the pick
/// reaches either the putter's cell or that same target.
fn handoff(a: &Influence, b: &Influence, world: &dyn World) -> Option<Influence> {
    let (put, pick) = match (&a.kind, &b.kind) {
        (InfluenceKind::PutPacket, InfluenceKind::PickPacket { .. }) => (a, b),
        (InfluenceKind::PickPacket { .. }, InfluenceKind::PutPacket) => (b, a),
        _ => return None,
    };
    let putter = world.agent(put.origin)?;
    let getter = world.agent(pick.origin)?;

    let lands_on_getter = getter.position == put.target;
    let reaches_putter = pick.target == putter.position || pick.target == put.target;
    (lands_on_getter && reaches_putter).then(|| Influence::pass_packet(put.origin, put.target))
}

/// Rewrites matching put/pick pairs in place. Returns the number of pairs.
pub fn pair_handoffs(influences: &mut [Influence], world: &dyn World) -> usize {
    let mut pairs = 0;
    for i in 0..influences.len() {
        for j in (i + 1)..influences.len() {
            let Some(pass) = handoff(&influences[i], &influences[j], world) else {
                continue;
            };
            let (put, pick) = if influences[i].origin == pass.origin { (i, j) } else { (j, i) };
            let getter = influences[pick].origin;
            debug!("pairing hand-off {} -> {}", pass.origin, getter);
            influences[put] = pass;
            influences[pick] = Influence::noop(getter);
            pairs += 1;
            break;
        }
    }
    pairs
}

impl Handler for Reactor {
    type Payload = InfluenceSet;

    fn name(&self) -> &'static str {
        "reactor"
    }

    fn process(&mut self, envelope: Envelope<InfluenceSet>) -> usize {
        let mut influences = envelope.payload.influences;

        let (time, packets_remaining) = {
            let mut world = self.world.write();

            for influence in influences.iter_mut() {
                if matches!(influence.kind, InfluenceKind::PassPacket) {
                    warn!("agent {} cannot pass packets directly", influence.origin);
                    self.stats.add_influences_rejected(1);
                    *influence = Influence::noop(influence.origin);
                }
            }

            let pairs = pair_handoffs(&mut influences, &*world);
            self.stats.add_handoffs(pairs as u64);

            for influence in &influences {
                self.apply(influence, &mut *world);
            }
            (world.increment_clock(), world.packets_remaining())
        };

        let _ = self.events.send(WorldEvent::Updated {
            time,
            packets_remaining,
        });
        if packets_remaining == 0 && !self.announced {
            info!("all packets delivered at tick {}", time);
            self.announced = true;
            let _ = self.events.send(WorldEvent::AllPacketsDelivered { time });
        }
        envelope.outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::law::{LawRegistry, BUILTIN_LAWS};
    use crate::sphere::SphereId;
    use packetworld_env::{Color, Coordinate, GridWorld};

    fn reactor(world: SharedWorld) -> (Reactor, broadcast::Receiver<WorldEvent>, Arc<KernelStats>) {
        let names: Vec<String> = BUILTIN_LAWS.iter().map(|s| s.to_string()).collect();
        let laws = LawRegistry::with_builtins().build(&names).unwrap();
        let (tx, rx) = broadcast::channel(16);
        let stats = Arc::new(KernelStats::default());
        (Reactor::new(world, laws, tx, stats.clone()), rx, stats)
    }

    fn envelope(influences: Vec<Influence>) -> Envelope<InfluenceSet> {
        Envelope {
            sphere: SphereId(0),
            outcomes: influences.len(),
            payload: InfluenceSet { influences },
        }
    }

    #[test]
    fn test_put_pick_pair_becomes_pass() {
        let mut grid = GridWorld::new(6, 6);
        let a = grid
            .place_agent_with("a", Coordinate::new(2, 2), None, Some(Color::Red))
            .unwrap();
        let b = grid.place_agent("b", Coordinate::new(2, 3)).unwrap();
        let world = grid.into_shared();
        let (mut reactor, _rx, stats) = reactor(world.clone());

        let handled = reactor.process(envelope(vec![
            Influence::put_packet(a, Coordinate::new(2, 3)),
            Influence::pick_packet(b, Coordinate::new(2, 3), None),
        ]));

        assert_eq!(handled, 2);
        let w = world.read();
        assert_eq!(w.agent(b).unwrap().carry, Some(Color::Red));
        assert_eq!(w.agent(a).unwrap().carry, None);
        assert_eq!(w.packet_at(Coordinate::new(2, 3)), None);
        assert_eq!(w.packets_remaining(), 1);
        assert_eq!(stats.handoffs(), 1);
    }

    #[test]
    fn test_pick_from_putter_cell_also_pairs() {
        let mut grid = GridWorld::new(6, 6);
        let a = grid
            .place_agent_with("a", Coordinate::new(2, 2), None, Some(Color::Blue))
            .unwrap();
        let b = grid.place_agent("b", Coordinate::new(3, 2)).unwrap();
        let world = grid.into_shared();
        let (mut reactor, _rx, _stats) = reactor(world.clone());

        reactor.process(envelope(vec![
            Influence::pick_packet(b, Coordinate::new(2, 2), None),
            Influence::put_packet(a, Coordinate::new(3, 2)),
        ]));

        assert_eq!(world.read().agent(b).unwrap().carry, Some(Color::Blue));
    }

    #[test]
    fn test_unpaired_put_on_agent_is_refused() {
        let mut grid = GridWorld::new(6, 6);
        let a = grid
            .place_agent_with("a", Coordinate::new(2, 2), None, Some(Color::Red))
            .unwrap();
        let b = grid.place_agent("b", Coordinate::new(2, 3)).unwrap();
        let world = grid.into_shared();
        let (mut reactor, _rx, stats) = reactor(world.clone());

        reactor.process(envelope(vec![
            Influence::put_packet(a, Coordinate::new(2, 3)),
            Influence::skip(b),
        ]));

        assert_eq!(world.read().agent(a).unwrap().carry, Some(Color::Red));
        assert_eq!(stats.influences_rejected(), 1);
    }

    #[test]
    fn test_direct_pass_is_rejected() {
        let mut grid = GridWorld::new(6, 6);
        let a = grid
            .place_agent_with("a", Coordinate::new(2, 2), None, Some(Color::Red))
            .unwrap();
        let b = grid.place_agent("b", Coordinate::new(2, 3)).unwrap();
        let world = grid.into_shared();
        let (mut reactor, _rx, _stats) = reactor(world.clone());

        reactor.process(envelope(vec![Influence::pass_packet(a, Coordinate::new(2, 3))]));
        assert_eq!(world.read().agent(b).unwrap().carry, None);
    }

    #[test]
    fn test_clock_advances_and_event_fires() {
        let mut grid = GridWorld::new(4, 4);
        let a = grid.place_agent("a", Coordinate::new(0, 0)).unwrap();
        grid.place_packet(Coordinate::new(3, 3), Color::Red).unwrap();
        let world = grid.into_shared();
        let (mut reactor, mut rx, _stats) = reactor(world.clone());

        reactor.process(envelope(vec![Influence::step(a, Coordinate::new(1, 1))]));

        assert_eq!(world.read().time(), 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            WorldEvent::Updated {
                time: 1,
                packets_remaining: 1
            }
        );
    }

    #[test]
    fn test_delivery_of_last_packet_is_announced_once() {
        let mut grid = GridWorld::new(4, 4);
        let a = grid
            .place_agent_with("a", Coordinate::new(0, 0), None, Some(Color::Red))
            .unwrap();
        grid.place_destination(Coordinate::new(1, 0), Color::Red).unwrap();
        let world = grid.into_shared();
        let (mut reactor, mut rx, _stats) = reactor(world);

        reactor.process(envelope(vec![Influence::put_packet(a, Coordinate::new(1, 0))]));
        reactor.process(envelope(vec![Influence::skip(a)]));

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        let announcements = events
            .iter()
            .filter(|e| matches!(e, WorldEvent::AllPacketsDelivered { .. }))
            .count();
        assert_eq!(announcements, 1);
        assert_eq!(events.len(), 3);
    }
}
