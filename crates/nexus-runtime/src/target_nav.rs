//! [`NavigationController`] – steer toward a locked heading.
//!
//! Driven by a 200 ms tick.  The controller is a four-state machine:
//!
//! | State | Tick behaviour |
//! |---|---|
//! | `Idle` | nothing |
//! | `TargetNav` | turn toward the target heading, or drive forward when within 10° |
//! | `Avoiding` | turn toward whichever side is clear and go `Reacquire`; `STOP` when boxed in |
//! | `Reacquire` | hold still until within 10°, then go `TargetNav` |
//!
//! A front reading under 40 cm forces `Avoiding` before anything else, from
//! every state except `Idle`.  [`step`] is the pure transition function; the
//! controller only adds the activation checks and keeps the current state.

use std::time::Duration;

use nexus_kernel::safety_monitor::SLOW_SPEED;
use nexus_kernel::{AutonomyContext, SIDE_CM};
use nexus_types::{
    ActuationCommand, CommandSource, Move, OperatingMode, OrientationReading, RadarReading,
};
use tracing::debug;

/// Tick period.
pub const NAV_PERIOD: Duration = Duration::from_millis(200);
/// Speed of heading-seeking moves.
pub const NAV_SPEED: u8 = 80;
/// Heading error considered "on target", in degrees.
pub const HEADING_TOLERANCE_DEG: f64 = 10.0;
/// Front distance that forces avoidance.
pub const AVOID_FRONT_CM: f64 = SIDE_CM;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NavState {
    #[default]
    Idle,
    TargetNav,
    Avoiding,
    Reacquire,
}

/// `target - yaw` in degrees, positive means the target is to the right.
/// Not wrapped: a target of 10° seen from 350° reads as -340° and turns left.
pub fn heading_error(target: f64, yaw: f64) -> f64 {
    target - yaw
}

fn seek(error: f64) -> Move {
    if error > HEADING_TOLERANCE_DEG {
        Move::Right
    } else if error < -HEADING_TOLERANCE_DEG {
        Move::Left
    } else {
        Move::Forward
    }
}

/// One tick of the state machine.
pub fn step(
    state: NavState,
    radar: &RadarReading,
    error: f64,
) -> (NavState, Option<ActuationCommand>) {
    let state = match state {
        NavState::Idle => return (NavState::Idle, None),
        _ if radar.front < AVOID_FRONT_CM => NavState::Avoiding,
        s => s,
    };

    match state {
        NavState::Idle => (NavState::Idle, None),
        NavState::TargetNav => (
            NavState::TargetNav,
            Some(ActuationCommand::new(seek(error), NAV_SPEED, CommandSource::TargetNav)),
        ),
        NavState::Avoiding => {
            if radar.left > SIDE_CM {
                (
                    NavState::Reacquire,
                    Some(ActuationCommand::new(Move::Left, SLOW_SPEED, CommandSource::Avoid)),
                )
            } else if radar.right > SIDE_CM {
                (
                    NavState::Reacquire,
                    Some(ActuationCommand::new(Move::Right, SLOW_SPEED, CommandSource::Avoid)),
                )
            } else {
                (NavState::Avoiding, Some(ActuationCommand::stop(CommandSource::Avoid)))
            }
        }
        NavState::Reacquire if error.abs() < HEADING_TOLERANCE_DEG => (NavState::TargetNav, None),
        NavState::Reacquire => (NavState::Reacquire, None),
    }
}

#[derive(Debug, Default)]
pub struct NavigationController {
    state: NavState,
    target_heading: f64,
    active: bool,
}

impl NavigationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock onto `heading` and start seeking it.
    pub fn lock(&mut self, heading: f64) {
        self.target_heading = heading;
        self.state = NavState::TargetNav;
        self.active = true;
    }

    /// Back to `Idle`, inactive.
    pub fn reset(&mut self) {
        self.state = NavState::Idle;
        self.active = false;
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn on_tick(
        &mut self,
        ctx: &AutonomyContext,
        imu: &OrientationReading,
    ) -> Option<ActuationCommand> {
        if !self.active || ctx.mode != OperatingMode::TargetNav || ctx.suppressed().is_some() {
            return None;
        }
        let error = heading_error(self.target_heading, imu.yaw);
        let (next, cmd) = step(self.state, &ctx.radar, error);
        if next != self.state {
            debug!(from = ?self.state, to = ?next, error, "navigation transition");
            self.state = next;
        }
        cmd
    }
}
