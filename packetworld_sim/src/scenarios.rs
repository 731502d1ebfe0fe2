//! Scenario catalogue.

/// Identifies a scenario the runner knows how to set up and judge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// Couriers on a random grid deliver packets under a global barrier.
    Delivery,

    /// Two scripted agents hand a packet over, then deliver it.
    Handoff,

    /// Agents hold several talk rounds per cycle by voting to continue.
    Gossip,

    /// An agent retires mid-run; the rest must keep going.
    Attrition,

    /// Isolated synchronizer: every agent runs at its own pace.
    Solo,
}

impl ScenarioId {
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Delivery,
            ScenarioId::Handoff,
            ScenarioId::Gossip,
            ScenarioId::Attrition,
            ScenarioId::Solo,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Delivery => "delivery",
            ScenarioId::Handoff => "handoff",
            ScenarioId::Gossip => "gossip",
            ScenarioId::Attrition => "attrition",
            ScenarioId::Solo => "solo",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Delivery => "Couriers share destination sightings and deliver packets in lock-step",
            ScenarioId::Handoff => "Simultaneous put and pick become one packet pass",
            ScenarioId::Gossip => "Continue votes hold the group in the talk phase for extra rounds",
            ScenarioId::Attrition => "One agent retires halfway; the others never deadlock",
            ScenarioId::Solo => "Isolated synchronizer, no agent waits for another",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "delivery" => Ok(ScenarioId::Delivery),
            "handoff" | "hand_off" => Ok(ScenarioId::Handoff),
            "gossip" => Ok(ScenarioId::Gossip),
            "attrition" => Ok(ScenarioId::Attrition),
            "solo" | "isolated" => Ok(ScenarioId::Solo),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
