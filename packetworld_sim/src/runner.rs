//! Scenario runner - sets up a kernel per scenario and judges the run.
//!
//! Runs are watched through the kernel's world events. A run ends when the
//! clock reaches the target tick, when the last packet is delivered, or when
//! no tick arrives within the stall timeout, which is reported as a
//! deadlock.

use std::time::Duration;

use packetworld_core::{Kernel, StatsSnapshot, SynchronizerKind, WorldEvent};
use packetworld_env::{ActorId, Color, Coordinate, GridWorld, Influence, World};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::behaviours::{BehaviourRegistry, Script, GOSSIP_ROUNDS};
use crate::config::{SimConfig, SimError};
use crate::scenarios::ScenarioId;
use crate::world_builder::build_world;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// World ticks executed
    pub total_ticks: u64,

    /// Undelivered packets at the end
    pub packets_left: usize,

    /// The run stalled
    pub deadlocked: bool,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

impl ScenarioResult {
    fn failed(scenario: ScenarioId, seed: u64, reason: String) -> Self {
        Self {
            scenario,
            seed,
            passed: false,
            total_ticks: 0,
            packets_left: 0,
            deadlocked: false,
            failure_reason: Some(reason),
            metrics: ScenarioMetrics::default(),
        }
    }
}

/// Kernel counters at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScenarioMetrics {
    pub spheres_completed: u64,
    pub merges: u64,
    pub mails_delivered: u64,
    pub mails_dropped: u64,
    pub influences_applied: u64,
    pub influences_rejected: u64,
    pub handoffs: u64,
}

impl From<StatsSnapshot> for ScenarioMetrics {
    fn from(stats: StatsSnapshot) -> Self {
        Self {
            spheres_completed: stats.spheres_completed,
            merges: stats.merges,
            mails_delivered: stats.mails_delivered,
            mails_dropped: stats.mails_dropped,
            influences_applied: stats.influences_applied,
            influences_rejected: stats.influences_rejected,
            handoffs: stats.handoffs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    /// The clock reached the target tick.
    Target,
    Delivered,
    Deadlock,
    /// The event channel closed under us.
    Closed,
}

struct Run {
    ticks: u64,
    stop: Stop,
    packets_left: usize,
    metrics: ScenarioMetrics,
}

impl Run {
    fn into_result(self, scenario: ScenarioId, seed: u64, failure: Option<String>) -> ScenarioResult {
        let failure = match self.stop {
            Stop::Deadlock => Some(format!("deadlock: no tick after tick {}", self.ticks)),
            Stop::Closed => Some("world event channel closed".to_string()),
            Stop::Target | Stop::Delivered => failure,
        };
        ScenarioResult {
            scenario,
            seed,
            passed: failure.is_none(),
            total_ticks: self.ticks,
            packets_left: self.packets_left,
            deadlocked: self.stop == Stop::Deadlock,
            failure_reason: failure,
            metrics: self.metrics,
        }
    }
}

/// Runs scenarios.
pub struct ScenarioRunner {
    config: SimConfig,

    /// Longest wait for the next tick before a run counts as deadlocked
    stall_timeout: Duration,

    behaviours: BehaviourRegistry,
}

impl ScenarioRunner {
    /// Creates a runner with the default world and the given seed and crowd.
    pub fn new(seed: u64, agents: usize) -> Self {
        Self::from_config(SimConfig {
            seed,
            agents,
            ..SimConfig::default()
        })
    }

    pub fn from_config(config: SimConfig) -> Self {
        Self {
            config,
            stall_timeout: Duration::from_secs(5),
            behaviours: BehaviourRegistry::with_builtins(),
        }
    }

    /// Sets the tick budget of each run.
    pub fn with_ticks(mut self, ticks: u64) -> Self {
        self.config.max_ticks = ticks;
        self
    }

    pub fn with_stall_timeout(mut self, stall_timeout: Duration) -> Self {
        self.stall_timeout = stall_timeout;
        self
    }

    /// Replaces the behaviour registry, e.g. to add custom behaviours.
    pub fn with_behaviours(mut self, behaviours: BehaviourRegistry) -> Self {
        self.behaviours = behaviours;
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Runs a scenario and returns the result. Setup errors count as a
    /// failed run.
    pub async fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.config.seed);
        let outcome = match scenario {
            ScenarioId::Delivery => self.run_delivery().await,
            ScenarioId::Handoff => self.run_handoff().await,
            ScenarioId::Gossip => self.run_gossip().await,
            ScenarioId::Attrition => self.run_attrition().await,
            ScenarioId::Solo => self.run_solo().await,
        };
        outcome.unwrap_or_else(|e| ScenarioResult::failed(scenario, self.config.seed, format!("setup failed: {}", e)))
    }

    /// Builds a random world and a kernel driving every body in it.
    fn populate(&self, config: &SimConfig) -> Result<(Kernel, Vec<ActorId>), SimError> {
        let layout = build_world(config)?;
        let mut kernel = Kernel::new(layout.world.into_shared(), config.kernel.clone())?;
        for (i, id) in layout.agents.iter().enumerate() {
            let seed = config.seed.wrapping_add(i as u64);
            kernel.add_agent(*id, self.behaviours.build(&config.behaviour, seed)?)?;
        }
        for id in &layout.stations {
            kernel.add_item(*id, self.behaviours.build("energy_station", config.seed)?)?;
        }
        Ok((kernel, layout.agents))
    }

    /// Starts the kernel and follows its events until the run ends.
    async fn drive<F>(&self, kernel: &mut Kernel, target: u64, mut on_tick: F) -> (u64, Stop)
    where
        F: FnMut(&Kernel, u64),
    {
        let mut events = kernel.subscribe();
        kernel.start();
        let mut ticks = 0;

        loop {
            match timeout(self.stall_timeout, events.recv()).await {
                Err(_) => {
                    warn!("no tick within {:?} after tick {}", self.stall_timeout, ticks);
                    return (ticks, Stop::Deadlock);
                }
                Ok(Ok(WorldEvent::Updated { time, packets_remaining })) => {
                    ticks = time;
                    if time % 50 == 0 {
                        debug!("  t={} | packets left={}", time, packets_remaining);
                    }
                    on_tick(&*kernel, time);
                    if time >= target {
                        return (ticks, Stop::Target);
                    }
                }
                Ok(Ok(WorldEvent::AllPacketsDelivered { time })) => {
                    info!("all packets delivered at tick {}", time);
                    return (time, Stop::Delivered);
                }
                Ok(Err(RecvError::Lagged(missed))) => {
                    debug!("runner lagged behind {} events", missed);
                    ticks = kernel.time();
                    if ticks >= target {
                        return (ticks, Stop::Target);
                    }
                }
                Ok(Err(RecvError::Closed)) => return (ticks, Stop::Closed),
            }
        }
    }

    /// Collects the end state and stops the kernel.
    async fn finish(kernel: Kernel, (ticks, stop): (u64, Stop)) -> Run {
        let packets_left = kernel.world().read().packets_remaining();
        let metrics = ScenarioMetrics::from(kernel.stats());
        kernel.shutdown().await;
        Run {
            ticks,
            stop,
            packets_left,
            metrics,
        }
    }

    /// Couriers on a random grid.
    async fn run_delivery(&self) -> Result<ScenarioResult, SimError> {
        let config = SimConfig {
            behaviour: "courier".to_string(),
            ..self.config.clone()
        };
        let total = config.packet_colors.len() * config.packets_per_color;
        let (mut kernel, _) = self.populate(&config)?;

        let stop = self.drive(&mut kernel, config.max_ticks, |_, _| {}).await;
        let run = Self::finish(kernel, stop).await;

        let failure = if run.metrics.mails_dropped > 0 {
            Some(format!("{} mails dropped", run.metrics.mails_dropped))
        } else if run.stop == Stop::Delivered && run.packets_left != 0 {
            Some(format!("delivery announced with {} packets left", run.packets_left))
        } else {
            None
        };
        info!("  delivered {}/{} packets in {} ticks", total - run.packets_left, total, run.ticks);
        Ok(run.into_result(ScenarioId::Delivery, config.seed, failure))
    }

    /// A carries a red packet and puts it onto B while B picks from A. The
    /// pair becomes a pass; B then walks to the destination and delivers.
    ///
    /// ```text
    ///   0   1   2   3   4
    ///     [ A ][ B ][   ][ D ]   row 1
    /// ```
    async fn run_handoff(&self) -> Result<ScenarioResult, SimError> {
        let mut grid = GridWorld::new(6, 3);
        let a = grid.place_agent_with("giver", Coordinate::new(1, 1), None, Some(Color::Red))?;
        let b = grid.place_agent("getter", Coordinate::new(2, 1))?;
        grid.place_destination(Coordinate::new(4, 1), Color::Red)?;

        let mut kernel = Kernel::new(grid.into_shared(), self.config.kernel.clone())?;
        kernel.add_agent(a, Box::new(Script::new([Influence::put_packet(a, Coordinate::new(2, 1))])))?;
        kernel.add_agent(
            b,
            Box::new(Script::new([
                Influence::pick_packet(b, Coordinate::new(1, 1), Some(Color::Red)),
                Influence::step(b, Coordinate::new(3, 1)),
                Influence::put_packet(b, Coordinate::new(4, 1)),
            ])),
        )?;

        let stop = self.drive(&mut kernel, 10, |_, _| {}).await;
        let run = Self::finish(kernel, stop).await;

        let failure = if run.stop != Stop::Delivered {
            Some(format!("packet not delivered after {} ticks", run.ticks))
        } else if run.metrics.handoffs != 1 {
            Some(format!("expected one hand-off, saw {}", run.metrics.handoffs))
        } else {
            None
        };
        Ok(run.into_result(ScenarioId::Handoff, self.config.seed, failure))
    }

    /// Gossiping agents: every cycle holds extra talk rounds.
    async fn run_gossip(&self) -> Result<ScenarioResult, SimError> {
        let config = SimConfig {
            behaviour: "gossip".to_string(),
            ..self.config.clone()
        };
        let (mut kernel, agents) = self.populate(&config)?;

        let stop = self.drive(&mut kernel, config.max_ticks, |_, _| {}).await;
        let run = Self::finish(kernel, stop).await;

        // Each act phase is preceded by GOSSIP_ROUNDS broadcasts per agent.
        let n = agents.len() as u64;
        let expected = run.ticks * GOSSIP_ROUNDS as u64 * n * n.saturating_sub(1);
        let failure = if run.metrics.mails_dropped > 0 {
            Some(format!("{} mails dropped", run.metrics.mails_dropped))
        } else if run.metrics.mails_delivered < expected {
            Some(format!(
                "only {} mails delivered, expected at least {}",
                run.metrics.mails_delivered, expected
            ))
        } else {
            None
        };
        Ok(run.into_result(ScenarioId::Gossip, config.seed, failure))
    }

    /// Retires the first agent halfway through and checks the rest keep
    /// ticking.
    async fn run_attrition(&self) -> Result<ScenarioResult, SimError> {
        let config = SimConfig {
            behaviour: "wander".to_string(),
            ..self.config.clone()
        };
        let (mut kernel, agents) = self.populate(&config)?;
        let Some(&victim) = agents.first() else {
            return Err(SimError::Invalid("attrition needs at least one agent".to_string()));
        };
        let halfway = config.max_ticks / 2;
        let mut retired = false;

        let stop = self
            .drive(&mut kernel, config.max_ticks, |kernel, time| {
                if !retired && time >= halfway {
                    info!("  retiring agent {} at tick {}", victim, time);
                    if let Err(e) = kernel.retire_actor(victim) {
                        warn!("could not retire agent {}: {}", victim, e);
                    }
                    retired = true;
                }
            })
            .await;
        let still_there = kernel.actor(victim).is_some();
        let run = Self::finish(kernel, stop).await;

        let failure = if !retired {
            Some(format!("run ended at tick {} before the retirement", run.ticks))
        } else if still_there {
            Some(format!("agent {} was never retired", victim))
        } else {
            None
        };
        Ok(run.into_result(ScenarioId::Attrition, config.seed, failure))
    }

    /// Wanderers under the isolated synchronizer.
    async fn run_solo(&self) -> Result<ScenarioResult, SimError> {
        let mut config = SimConfig {
            behaviour: "wander".to_string(),
            ..self.config.clone()
        };
        config.kernel.synchronizer = SynchronizerKind::Isolated;
        let (mut kernel, _) = self.populate(&config)?;

        let stop = self.drive(&mut kernel, config.max_ticks, |_, _| {}).await;
        let run = Self::finish(kernel, stop).await;

        let failure = (run.metrics.merges > 0).then(|| format!("{} merges without any sync set", run.metrics.merges));
        Ok(run.into_result(ScenarioId::Solo, config.seed, failure))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> ScenarioRunner {
        let config = SimConfig {
            width: 10,
            height: 10,
            agents: 3,
            packets_per_color: 2,
            max_ticks: 20,
            ..SimConfig::default()
        };
        ScenarioRunner::from_config(config)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_handoff_scenario() {
        let result = runner().run(ScenarioId::Handoff).await;
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.total_ticks, 3);
        assert_eq!(result.packets_left, 0);
        assert_eq!(result.metrics.handoffs, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_delivery_scenario() {
        let result = runner().run(ScenarioId::Delivery).await;
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(!result.deadlocked);
        assert!(result.metrics.spheres_completed > 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_gossip_scenario() {
        let result = runner().run(ScenarioId::Gossip).await;
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.mails_delivered > 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_attrition_scenario() {
        let result = runner().run(ScenarioId::Attrition).await;
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.total_ticks, 20);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_solo_scenario() {
        let result = runner().run(ScenarioId::Solo).await;
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.merges, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_setup_error_fails_run() {
        let config = SimConfig {
            width: 0,
            ..SimConfig::default()
        };
        let result = ScenarioRunner::from_config(config).run(ScenarioId::Solo).await;
        assert!(!result.passed);
        assert!(result.failure_reason.unwrap().contains("non-empty"));
    }

    #[test]
    fn test_metrics_from_stats() {
        let stats = StatsSnapshot {
            merges: 3,
            handoffs: 1,
            ..StatsSnapshot::default()
        };
        let metrics = ScenarioMetrics::from(stats);
        assert_eq!(metrics.merges, 3);
        assert_eq!(metrics.handoffs, 1);
    }
}
