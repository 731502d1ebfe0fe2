//! Simulation configuration and errors.

use std::path::Path;

use packetworld_core::{KernelConfig, KernelError};
use packetworld_env::{Color, EnvError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while setting up or running a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("could not read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("no free cell left for {0}")]
    NoRoom(&'static str),

    #[error("unknown behaviour: {0}")]
    UnknownBehaviour(String),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Kernel(#[from] KernelError),
}

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    pub width: i32,
    pub height: i32,

    /// Number of agents to spawn
    pub agents: usize,

    /// One destination is placed per colour.
    pub packet_colors: Vec<Color>,

    pub packets_per_color: usize,

    pub energy_stations: usize,

    /// Perception radius (default: 3)
    pub view: u32,

    /// Behaviour registry name driving every agent
    pub behaviour: String,

    /// Stop after this many world ticks
    pub max_ticks: u64,

    /// Batteries drain and recharge
    pub energy: bool,

    pub kernel: KernelConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            width: 16,
            height: 16,
            agents: 6,
            packet_colors: vec![Color::Red, Color::Blue],
            packets_per_color: 4,
            energy_stations: 1,
            view: 3,
            behaviour: "courier".to_string(),
            max_ticks: 200,
            energy: true,
            kernel: KernelConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn from_json(json: &str) -> Result<Self, SimError> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON config file; missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if self.width <= 0 || self.height <= 0 {
            return Err(SimError::Invalid(format!(
                "grid must be non-empty, got {}x{}",
                self.width, self.height
            )));
        }
        let things = self.agents
            + self.energy_stations
            + self.packet_colors.len() * (self.packets_per_color + 1);
        if things > (self.width * self.height) as usize {
            return Err(SimError::Invalid(format!(
                "{} things do not fit on a {}x{} grid",
                things, self.width, self.height
            )));
        }
        self.kernel.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packetworld_core::SynchronizerKind;

    #[test]
    fn test_default_is_valid() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.kernel.synchronizer, SynchronizerKind::Central);
    }

    #[test]
    fn test_partial_json() {
        let config = SimConfig::from_json(
            r#"{ "agents": 3, "packet_colors": ["green"], "kernel": { "synchronizer": "isolated" } }"#,
        )
        .unwrap();
        assert_eq!(config.agents, 3);
        assert_eq!(config.packet_colors, vec![Color::Green]);
        assert_eq!(config.kernel.synchronizer, SynchronizerKind::Isolated);
        assert_eq!(config.width, 16);
    }

    #[test]
    fn test_overfull_grid_rejected() {
        let config = SimConfig {
            width: 2,
            height: 2,
            ..SimConfig::default()
        };
        assert!(matches!(config.validate(), Err(SimError::Invalid(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = SimConfig::from_file("/nonexistent/packetworld.json").unwrap_err();
        assert!(matches!(err, SimError::Io(_)));
    }
}
