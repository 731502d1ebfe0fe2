//! The kernel: an explicit simulation context.
//!
//! A [`Kernel`] owns everything a running simulation shares: the world, the
//! actor registry, the synchronizer, the coordinator and handler tasks, the
//! event channel and the counters. Nothing is global, so several kernels can
//! run side by side (tests do).
//!
//! # Usage
//!
//! ```ignore
//! let mut grid = GridWorld::new(16, 16);
//! let a = grid.place_agent("a", Coordinate::new(1, 1))?;
//! let mut kernel = Kernel::new(grid.into_shared(), KernelConfig::default())?;
//! kernel.add_agent(a, Box::new(MyBehaviour))?;
//! let mut events = kernel.subscribe();
//! kernel.start();
//! while let Ok(event) = events.recv().await { /* ... */ }
//! kernel.shutdown().await;
//! ```

use std::sync::Arc;

use packetworld_env::{ActorId, SharedWorld};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::actor::{ActorLinks, ActorRuntime};
use crate::behaviour::Behaviour;
use crate::collector::{Collector, CollectorSnapshot, CoordinatorMsg};
use crate::config::KernelConfig;
use crate::error::KernelError;
use crate::events::WorldEvent;
use crate::handler::spawn_handler;
use crate::law::LawRegistry;
use crate::mailbox::MailBox;
use crate::perception_handler::PerceptionHandler;
use crate::postal::PostalService;
use crate::reactor::Reactor;
use crate::registry::{ActorRegistry, ActorSlot};
use crate::status::{ActorKind, ActorStatus, ActorView, KernelStats, StatsSnapshot};
use crate::synchronizer::Synchronizer;

pub struct Kernel {
    config: KernelConfig,
    world: SharedWorld,
    registry: Arc<ActorRegistry>,
    synchronizer: Arc<dyn Synchronizer>,
    coordinator: mpsc::UnboundedSender<CoordinatorMsg>,
    events: broadcast::Sender<WorldEvent>,
    stats: Arc<KernelStats>,
    shutdown: CancellationToken,
    pending: Vec<ActorRuntime>,
    actors: Vec<JoinHandle<()>>,
    services: Vec<JoinHandle<()>>,
    started: bool,
}

impl Kernel {
    /// Creates a kernel enforcing the built-in laws named in `config`.
    ///
    /// Must be called from within a tokio runtime: the coordinator and the
    /// handlers are spawned immediately.
    pub fn new(world: SharedWorld, config: KernelConfig) -> Result<Self, KernelError> {
        Self::with_laws(world, config, &LawRegistry::with_builtins())
    }

    /// Creates a kernel resolving law names through `laws`.
    pub fn with_laws(world: SharedWorld, config: KernelConfig, laws: &LawRegistry) -> Result<Self, KernelError> {
        config.validate()?;
        let book = laws.build(&config.laws)?;

        let registry = Arc::new(ActorRegistry::new());
        let stats = Arc::new(KernelStats::default());
        let synchronizer = config.synchronizer.build(registry.clone());
        let (events, _) = broadcast::channel(config.event_capacity);
        let (coordinator, inbox) = mpsc::unbounded_channel();

        let (perception, perception_task) = spawn_handler(PerceptionHandler, coordinator.clone());
        let (postal, postal_task) = spawn_handler(
            PostalService::new(registry.clone(), stats.clone(), config.seed),
            coordinator.clone(),
        );
        let (reactor, reactor_task) = spawn_handler(
            Reactor::new(world.clone(), book, events.clone(), stats.clone()),
            coordinator.clone(),
        );
        let collector = Collector::new(
            inbox,
            perception,
            postal,
            reactor,
            registry.clone(),
            world.clone(),
            stats.clone(),
        );
        let collector_task = tokio::spawn(collector.run());

        info!(
            "kernel ready ({:?} synchronizer, {} laws)",
            config.synchronizer,
            config.laws.len()
        );

        Ok(Self {
            config,
            world,
            registry,
            synchronizer,
            coordinator,
            events,
            stats,
            shutdown: CancellationToken::new(),
            pending: Vec::new(),
            actors: Vec::new(),
            services: vec![collector_task, perception_task, postal_task, reactor_task],
            started: false,
        })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn world(&self) -> SharedWorld {
        self.world.clone()
    }

    /// Adds the agent body `id` of the world, driven by `behaviour`.
    pub fn add_agent(&mut self, id: ActorId, behaviour: Box<dyn Behaviour>) -> Result<(), KernelError> {
        let name = self
            .world
            .read()
            .agent(id)
            .map(|state| state.name)
            .ok_or(KernelError::UnknownActor(id))?;
        self.add_actor(id, name, ActorKind::Agent, behaviour)
    }

    /// Adds a non-agent body (such as an energy station) of the world.
    pub fn add_item(&mut self, id: ActorId, behaviour: Box<dyn Behaviour>) -> Result<(), KernelError> {
        if !self.world.read().actor_ids().contains(&id) {
            return Err(KernelError::UnknownActor(id));
        }
        self.add_actor(id, format!("item-{}", id), ActorKind::Item, behaviour)
    }

    fn add_actor(
        &mut self,
        id: ActorId,
        name: String,
        kind: ActorKind,
        behaviour: Box<dyn Behaviour>,
    ) -> Result<(), KernelError> {
        let (gate, gate_rx) = mpsc::channel(1);
        let cancel = self.shutdown.child_token();
        let mailbox = Arc::new(Mutex::new(MailBox::new(name.clone(), self.config.mailbox_capacity)));
        let status = Arc::new(ActorStatus::default());

        self.registry.register(
            id,
            ActorSlot {
                name: name.clone(),
                kind,
                gate,
                cancel: cancel.clone(),
                mailbox: mailbox.clone(),
                status: status.clone(),
            },
        )?;

        let runtime = ActorRuntime::new(
            id,
            name,
            kind,
            behaviour,
            ActorLinks {
                world: self.world.clone(),
                registry: self.registry.clone(),
                synchronizer: self.synchronizer.clone(),
                coordinator: self.coordinator.clone(),
                gate: gate_rx,
                cancel,
                mailbox,
                status,
            },
        );

        if self.started {
            debug!("actor {} joins a running kernel", id);
            self.actors.push(tokio::spawn(runtime.run()));
        } else {
            self.pending.push(runtime);
        }
        Ok(())
    }

    /// Activates every actor added so far. Actors added later start
    /// immediately. Returns the number of actors started by this call.
    pub fn start(&mut self) -> usize {
        self.started = true;
        let count = self.pending.len();
        for runtime in self.pending.drain(..) {
            debug!("activating actor {}", runtime.id());
            self.actors.push(tokio::spawn(runtime.run()));
        }
        info!("kernel started {} actors", count);
        count
    }

    /// Stops an actor right away. Idempotent: returns false if the actor
    /// was already gone.
    ///
    /// Open spheres stop waiting on the actor, but a phase it already
    /// reported is still handled. Its body stays in the world; use
    /// [`Kernel::retire_actor`] to leave a running group cleanly.
    pub fn stop_actor(&self, id: ActorId) -> bool {
        if !self.registry.deregister(id) {
            return false;
        }
        let _ = self.coordinator.send(CoordinatorMsg::Departed(id));
        true
    }

    /// Removes an actor once its current act phase has been handled, before
    /// the rest of its group moves on. Its body leaves the world with it.
    pub fn retire_actor(&self, id: ActorId) -> Result<(), KernelError> {
        if !self.registry.contains(id) {
            return Err(KernelError::UnknownActor(id));
        }
        self.coordinator
            .send(CoordinatorMsg::Retire(id))
            .map_err(|_| KernelError::CoordinatorClosed)
    }

    /// Current sphere set, read through the coordinator.
    pub async fn snapshot(&self) -> Result<CollectorSnapshot, KernelError> {
        let (tx, rx) = oneshot::channel();
        self.coordinator
            .send(CoordinatorMsg::Snapshot(tx))
            .map_err(|_| KernelError::CoordinatorClosed)?;
        rx.await.map_err(|_| KernelError::CoordinatorClosed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorldEvent> {
        self.events.subscribe()
    }

    /// Views of every live actor.
    pub fn actors(&self) -> Vec<ActorView> {
        self.registry.views()
    }

    pub fn actor(&self, id: ActorId) -> Option<ActorView> {
        self.registry.view(id)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn time(&self) -> u64 {
        self.world.read().time()
    }

    /// Stops every actor and service and waits for their tasks.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        for handle in self.actors.drain(..) {
            if let Err(e) = handle.await {
                warn!("actor task failed: {}", e);
            }
        }
        let _ = self.coordinator.send(CoordinatorMsg::Shutdown);
        for handle in self.services.drain(..) {
            if let Err(e) = handle.await {
                warn!("kernel service failed: {}", e);
            }
        }
        info!("kernel shut down at tick {}", self.time());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SynchronizerKind;
    use crate::outcome::CommToken;
    use crate::behaviour::{Context, TalkContext};
    use packetworld_env::{Color, Coordinate, GridWorld, Influence, World};
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tokio::sync::broadcast::error::RecvError;
    use tokio::time::timeout;

    type Log = Arc<Mutex<BTreeMap<ActorId, Vec<String>>>>;

    /// Records every hook call and idles.
    struct Recorder {
        log: Log,
        continue_rounds: usize,
    }

    impl Recorder {
        fn new(log: &Log) -> Box<Self> {
            Box::new(Self {
                log: log.clone(),
                continue_rounds: 0,
            })
        }

        fn talkative(log: &Log, rounds: usize) -> Box<Self> {
            Box::new(Self {
                log: log.clone(),
                continue_rounds: rounds,
            })
        }

        fn record(&self, id: ActorId, entry: String) {
            self.log.lock().entry(id).or_default().push(entry);
        }
    }

    impl Behaviour for Recorder {
        fn on_perceive(&mut self, ctx: &mut Context<'_>) {
            self.record(ctx.id, "perceive".into());
        }

        fn on_communicate(&mut self, ctx: &mut TalkContext<'_>) -> CommToken {
            let read = ctx.messages.drain(..).count();
            self.record(ctx.id, format!("talk:{}", read));
            ctx.broadcast("hi");
            if self.continue_rounds > 0 {
                self.continue_rounds -= 1;
                CommToken::Continue
            } else {
                CommToken::Close
            }
        }

        fn on_act(&mut self, ctx: &mut Context<'_>) -> Influence {
            self.record(ctx.id, format!("act@{}", ctx.time));
            Influence::skip(ctx.id)
        }
    }

    /// Plays a fixed list of influences, then idles.
    struct Script(Vec<Influence>);

    impl Behaviour for Script {
        fn on_communicate(&mut self, _ctx: &mut TalkContext<'_>) -> CommToken {
            CommToken::Close
        }

        fn on_act(&mut self, ctx: &mut Context<'_>) -> Influence {
            if self.0.is_empty() {
                Influence::skip(ctx.id)
            } else {
                self.0.remove(0)
            }
        }
    }

    fn grid(n: u32) -> (GridWorld, Vec<ActorId>) {
        let mut grid = GridWorld::new(12, 12).without_energy();
        let ids = (0..n)
            .map(|i| grid.place_agent(format!("agent-{i}"), Coordinate::new(i as i32 * 2, 0)).unwrap())
            .collect();
        (grid, ids)
    }

    async fn wait_for_tick(events: &mut broadcast::Receiver<WorldEvent>, tick: u64) {
        timeout(Duration::from_secs(10), async {
            loop {
                match events.recv().await {
                    Ok(event) if event.time() >= tick => break,
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("simulation stalled");
    }

    fn acts(entries: &[String]) -> Vec<String> {
        entries.iter().filter(|e| e.starts_with("act@")).cloned().collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_central_barrier_keeps_actors_in_lock_step() {
        let (grid, ids) = grid(4);
        let log: Log = Default::default();
        let mut kernel = Kernel::new(grid.into_shared(), KernelConfig::default()).unwrap();
        for id in &ids {
            kernel.add_agent(*id, Recorder::new(&log)).unwrap();
        }
        let mut events = kernel.subscribe();
        assert_eq!(kernel.start(), 4);

        wait_for_tick(&mut events, 5).await;
        kernel.shutdown().await;

        let log = log.lock();
        let expected: Vec<String> = (0..5).map(|t| format!("act@{t}")).collect();
        for id in &ids {
            let acted = acts(&log[id]);
            assert_eq!(&acted[..5], &expected[..], "actor {} drifted", id);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_continue_vote_repeats_talk_phase_for_everyone() {
        let (grid, ids) = grid(3);
        let log: Log = Default::default();
        let mut kernel = Kernel::new(grid.into_shared(), KernelConfig::default()).unwrap();
        kernel.add_agent(ids[0], Recorder::talkative(&log, 2)).unwrap();
        kernel.add_agent(ids[1], Recorder::new(&log)).unwrap();
        kernel.add_agent(ids[2], Recorder::new(&log)).unwrap();
        let mut events = kernel.subscribe();
        kernel.start();

        wait_for_tick(&mut events, 1).await;
        let stats = kernel.stats();
        kernel.shutdown().await;

        let log = log.lock();
        for id in &ids {
            let entries = &log[id];
            assert_eq!(&entries[..3], &["talk:0", "talk:2", "talk:2"], "actor {}", id);
            assert_eq!(entries[3], "act@0");
        }
        // three talk rounds of three agents broadcasting to two peers each
        assert!(stats.mails_delivered >= 18);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_retired_actor_leaves_without_deadlock() {
        let (grid, ids) = grid(3);
        let log: Log = Default::default();
        let mut kernel = Kernel::new(grid.into_shared(), KernelConfig::default()).unwrap();
        for id in &ids {
            kernel.add_agent(*id, Recorder::new(&log)).unwrap();
        }
        let mut events = kernel.subscribe();
        kernel.start();

        wait_for_tick(&mut events, 2).await;
        kernel.retire_actor(ids[0]).unwrap();
        wait_for_tick(&mut events, 8).await;

        assert!(kernel.actor(ids[0]).is_none());
        assert_eq!(kernel.actors().len(), 2);
        assert!(matches!(kernel.retire_actor(ids[0]), Err(KernelError::UnknownActor(_))));
        kernel.shutdown().await;

        let log = log.lock();
        assert!(acts(&log[&ids[1]]).len() > acts(&log[&ids[0]]).len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_join_running_group_then_retire_founder() {
        let (grid, ids) = grid(3);
        let world = grid.into_shared();
        let log: Log = Default::default();
        let mut kernel = Kernel::new(world.clone(), KernelConfig::default()).unwrap();
        kernel.add_agent(ids[0], Recorder::new(&log)).unwrap();
        kernel.add_agent(ids[1], Recorder::new(&log)).unwrap();
        let mut events = kernel.subscribe();
        assert_eq!(kernel.start(), 2);

        wait_for_tick(&mut events, 2).await;
        kernel.add_agent(ids[2], Recorder::new(&log)).unwrap();
        let joined_at = kernel.time();
        wait_for_tick(&mut events, joined_at + 4).await;
        assert!(!acts(&log.lock()[&ids[2]]).is_empty(), "late joiner never acted");

        // the joiner's phases are staggered against the founders' by now
        kernel.retire_actor(ids[0]).unwrap();
        let retired_at = kernel.time();
        wait_for_tick(&mut events, retired_at + 6).await;

        assert!(kernel.actor(ids[0]).is_none());
        assert!(world.read().agent(ids[0]).is_none());
        let snapshot = kernel.snapshot().await.unwrap();
        assert!(snapshot.retiring.is_empty());
        assert!(snapshot.spheres.iter().all(|s| !s.waiting_on.contains(&ids[0])));
        kernel.shutdown().await;

        let log = log.lock();
        let last = |id: &ActorId| -> u64 {
            acts(&log[id])
                .last()
                .and_then(|e| e.trim_start_matches("act@").parse().ok())
                .unwrap()
        };
        assert!(last(&ids[1]) > retired_at);
        assert!(last(&ids[2]) > retired_at);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stop_releases_waiting_peers() {
        let (grid, ids) = grid(3);
        let log: Log = Default::default();
        let mut kernel = Kernel::new(grid.into_shared(), KernelConfig::default()).unwrap();
        for id in &ids {
            kernel.add_agent(*id, Recorder::new(&log)).unwrap();
        }
        let mut events = kernel.subscribe();
        kernel.start();
        wait_for_tick(&mut events, 2).await;

        // a pending retirement is dropped along with the actor
        kernel.retire_actor(ids[0]).unwrap();
        assert!(kernel.stop_actor(ids[0]));
        let now = kernel.time();
        wait_for_tick(&mut events, now + 4).await;
        assert_eq!(kernel.actors().len(), 2);
        assert!(kernel.snapshot().await.unwrap().retiring.is_empty());
        kernel.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stop_is_idempotent() {
        let (grid, ids) = grid(2);
        let log: Log = Default::default();
        let config = KernelConfig {
            synchronizer: SynchronizerKind::Isolated,
            ..Default::default()
        };
        let mut kernel = Kernel::new(grid.into_shared(), config).unwrap();
        for id in &ids {
            kernel.add_agent(*id, Recorder::new(&log)).unwrap();
        }
        let mut events = kernel.subscribe();
        kernel.start();
        wait_for_tick(&mut events, 2).await;

        assert!(kernel.stop_actor(ids[0]));
        assert!(!kernel.stop_actor(ids[0]));

        // the isolated survivor keeps the clock moving
        let now = kernel.time();
        wait_for_tick(&mut events, now + 3).await;
        kernel.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_hand_off_through_kernel() {
        let mut grid = GridWorld::new(6, 6).without_energy();
        let a = grid
            .place_agent_with("a", Coordinate::new(2, 2), None, Some(Color::Green))
            .unwrap();
        let b = grid.place_agent("b", Coordinate::new(2, 3)).unwrap();
        let world = grid.into_shared();

        let mut kernel = Kernel::new(world.clone(), KernelConfig::default()).unwrap();
        kernel
            .add_agent(a, Box::new(Script(vec![Influence::put_packet(a, Coordinate::new(2, 3))])))
            .unwrap();
        kernel
            .add_agent(b, Box::new(Script(vec![Influence::pick_packet(b, Coordinate::new(2, 3), None)])))
            .unwrap();
        let mut events = kernel.subscribe();
        kernel.start();
        wait_for_tick(&mut events, 1).await;
        let stats = kernel.stats();
        kernel.shutdown().await;

        let w = world.read();
        assert_eq!(w.agent(b).unwrap().carry, Some(Color::Green));
        assert_eq!(w.agent(a).unwrap().carry, None);
        assert_eq!(w.packet_at(Coordinate::new(2, 3)), None);
        assert_eq!(stats.handoffs, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_snapshot_and_unknown_actor() {
        let (grid, ids) = grid(1);
        let mut kernel = Kernel::new(grid.into_shared(), KernelConfig::default()).unwrap();
        let log: Log = Default::default();
        assert!(matches!(
            kernel.add_agent(ActorId(77), Recorder::new(&log)),
            Err(KernelError::UnknownActor(_))
        ));
        kernel.add_agent(ids[0], Recorder::new(&log)).unwrap();
        assert!(matches!(
            kernel.add_agent(ids[0], Recorder::new(&log)),
            Err(KernelError::AlreadyRegistered(_))
        ));

        let snapshot = kernel.snapshot().await.unwrap();
        assert!(snapshot.spheres.is_empty());
        kernel.shutdown().await;
    }
}
