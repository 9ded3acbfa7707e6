//! [`SafetyMonitor`] – radar-driven emergency stop latch.
//!
//! Every radar reading passes through [`SafetyMonitor::observe`] before the
//! arbiter looks at anything else.  A front reading below
//! [`EMERGENCY_CM`] trips the latch and yields exactly one radar-sourced
//! STOP; while the latch is set every other emission path stays silent.
//! Only a fresh reading at or above the threshold releases it.

use nexus_types::{ActuationCommand, CommandSource, Move, RadarReading};
use tracing::{info, warn};

/// Front distance below which the rover must stop.
pub const EMERGENCY_CM: f64 = 30.0;
/// Front distance below which speed is capped.
pub const SLOW_CM: f64 = 80.0;
/// Lateral clearance considered safe.
pub const SIDE_CM: f64 = 40.0;

/// Speed cap applied when the front is closer than [`SLOW_CM`].
pub const SLOW_SPEED: u8 = 60;
/// Speed cap applied when the front is clear.
pub const FULL_SPEED: u8 = 120;

/// Outcome of one [`SafetyMonitor::observe`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyDecision {
    /// The latch was just set.  The command must be emitted ahead of
    /// everything else.
    Tripped(ActuationCommand),
    /// Already latched and still too close.
    Holding,
    /// The latch was just cleared.
    Released,
    /// Not latched, nothing to do.
    Clear,
}

/// Owner of the global stop latch.
#[derive(Debug, Default, Clone)]
pub struct SafetyMonitor {
    latched: bool,
}

impl SafetyMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` while the emergency latch is set.
    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// Evaluate a fresh radar reading.
    pub fn observe(&mut self, reading: &RadarReading) -> SafetyDecision {
        let too_close = reading.front < EMERGENCY_CM;
        match (self.latched, too_close) {
            (false, true) => {
                self.latched = true;
                warn!(front = reading.front, "emergency stop: obstacle inside {EMERGENCY_CM} cm");
                SafetyDecision::Tripped(ActuationCommand::stop(CommandSource::Radar))
            }
            (true, true) => SafetyDecision::Holding,
            (true, false) => {
                self.latched = false;
                info!(front = reading.front, "emergency latch released");
                SafetyDecision::Released
            }
            (false, false) => SafetyDecision::Clear,
        }
    }
}

/// Speed cap for a given front distance.
pub fn speed_from_distance(front_cm: f64) -> u8 {
    if front_cm < EMERGENCY_CM {
        0
    } else if front_cm < SLOW_CM {
        SLOW_SPEED
    } else {
        FULL_SPEED
    }
}

/// Steering override away from an immediate lateral obstacle.
///
/// The left side is checked first, so an obstacle on both sides steers
/// right.
pub fn side_avoidance(reading: &RadarReading) -> Option<Move> {
    if reading.left < SIDE_CM {
        Some(Move::Right)
    } else if reading.right < SIDE_CM {
        Some(Move::Left)
    } else {
        None
    }
}
