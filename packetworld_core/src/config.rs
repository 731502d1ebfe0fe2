//! Kernel configuration.

use serde::{Deserialize, Serialize};

use crate::error::KernelError;
use crate::law::BUILTIN_LAWS;

/// How sync sets are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynchronizerKind {
    /// Every actor waits for every other actor (global barrier).
    #[default]
    Central,
    /// Every actor proceeds on its own.
    Isolated,
}

/// Configuration for a [`Kernel`](crate::Kernel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Seed for the postal fairness rotation.
    pub seed: u64,

    /// Capacity of each agent's inbox (default: 1024)
    pub mailbox_capacity: usize,

    /// Names of the laws the reactor enforces, resolved through the law
    /// registry.
    pub laws: Vec<String>,

    pub synchronizer: SynchronizerKind,

    /// Capacity of the world event broadcast channel (default: 256)
    pub event_capacity: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            mailbox_capacity: 1024,
            laws: BUILTIN_LAWS.iter().map(|s| s.to_string()).collect(),
            synchronizer: SynchronizerKind::Central,
            event_capacity: 256,
        }
    }
}

impl KernelConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, KernelError> {
        let config: KernelConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), KernelError> {
        if self.mailbox_capacity == 0 {
            return Err(KernelError::config("mailbox_capacity must be positive"));
        }
        if self.event_capacity == 0 {
            return Err(KernelError::config("event_capacity must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = KernelConfig::default();
        assert_eq!(config.mailbox_capacity, 1024);
        assert_eq!(config.synchronizer, SynchronizerKind::Central);
        assert!(config.laws.iter().any(|l| l == "step"));
    }

    #[test]
    fn test_partial_json() {
        let config = KernelConfig::from_json(r#"{"synchronizer": "isolated", "seed": 7}"#).unwrap();
        assert_eq!(config.synchronizer, SynchronizerKind::Isolated);
        assert_eq!(config.seed, 7);
        assert_eq!(config.mailbox_capacity, 1024);
    }

    #[test]
    fn test_rejects_zero_capacity() {
        assert!(KernelConfig::from_json(r#"{"mailbox_capacity": 0}"#).is_err());
        assert!(KernelConfig::from_json("not json").is_err());
    }
}
