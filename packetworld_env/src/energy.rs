//! Battery model shared by the world and the actor runtime.
//!
//! The world debits batteries when it applies an influence; the actor runtime
//! checks the same table before submitting one, so an agent never asks for an
//! effect it cannot pay for.

use crate::influence::InfluenceKind;

/// Battery capacity.
pub const MAX_ENERGY: i32 = 1000;

/// Battery level of a freshly placed agent.
pub const START_ENERGY: i32 = MAX_ENERGY;

/// Cost of a step with empty hands.
pub const STEP_COST: i32 = 10;

/// Cost of a step while carrying a packet.
pub const STEP_WITH_PACKET_COST: i32 = 20;

/// Cost of every other influence (idling included).
pub const IDLE_COST: i32 = 5;

/// Charge an energy station hands out per tick.
pub const STATION_LOAD: i32 = 100;

/// Energy needed to perform `kind`.
pub fn cost_of(kind: &InfluenceKind, carrying: bool) -> i32 {
    match kind {
        InfluenceKind::Step if carrying => STEP_WITH_PACKET_COST,
        InfluenceKind::Step => STEP_COST,
        InfluenceKind::NoOp | InfluenceKind::Energy { .. } => 0,
        _ => IDLE_COST,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_costs() {
        assert_eq!(cost_of(&InfluenceKind::Step, false), STEP_COST);
        assert_eq!(cost_of(&InfluenceKind::Step, true), STEP_WITH_PACKET_COST);
        assert_eq!(cost_of(&InfluenceKind::Skip, true), IDLE_COST);
        assert_eq!(cost_of(&InfluenceKind::NoOp, false), 0);
    }
}
