//! Packet World Simulation Harness
//!
//! Builds seeded grid worlds, drives them with the stock behaviours through
//! the synchronization kernel, and judges a catalogue of scenarios:
//!
//! - **delivery**: couriers fetch and deliver packets under a global barrier
//! - **handoff**: a simultaneous put and pick become one packet pass
//! - **gossip**: continue votes hold the group in the talk phase
//! - **attrition**: an agent retires mid-run without stalling the rest
//! - **solo**: the isolated synchronizer, no agent waits for another
//!
//! # Usage
//!
//! ```ignore
//! use packetworld_sim::{ScenarioId, ScenarioRunner};
//!
//! let runner = ScenarioRunner::new(42, 6).with_ticks(100);
//! let result = runner.run(ScenarioId::Delivery).await;
//! assert!(result.passed);
//! ```

pub mod behaviours;
pub mod config;
pub mod runner;
pub mod scenarios;
pub mod world_builder;

pub use behaviours::{BehaviourFactory, BehaviourRegistry, Courier, EnergyStation, Gossip, Script, Wander};
pub use config::{SimConfig, SimError};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
pub use world_builder::{build_world, WorldLayout};
