//! [`AutonomyGate`] – single interception point for AI-sourced commands.
//!
//! An `AI_CMD` request reaches the actuator only after passing
//! [`AutonomyGate::admit`].  Checks run in priority order and the first
//! failure wins:
//!
//! 1. **Emergency latch** – nothing moves while the radar latch is set.
//! 2. **Manual mode** – the operator owns the rover.
//! 3. **Override window** – a manual command arrived less than 500 ms ago.
//! 4. **Target navigation** – the navigation controller has exclusive
//!    autonomous priority.
//! 5. **Shaping** – side avoidance may replace the direction, the speed is
//!    capped by front distance (a zero cap drops the command) and `GUARD`
//!    forbids forward motion.
//!
//! A `STOP` request that clears checks 1–4 is always admitted at speed 0.
//!
//! # Example
//!
//! ```
//! use nexus_kernel::{AutonomyContext, AutonomyGate};
//! use nexus_types::{Move, OperatingMode, RadarReading, Rejection};
//!
//! let gate = AutonomyGate::new();
//! let mut ctx = AutonomyContext {
//!     mode: OperatingMode::Follow,
//!     latched: false,
//!     override_active: false,
//!     radar: RadarReading::default(),
//! };
//!
//! let cmd = gate.admit(&ctx, Move::Forward).unwrap();
//! assert_eq!(cmd.speed, 120);
//!
//! ctx.mode = OperatingMode::Guard;
//! assert_eq!(gate.admit(&ctx, Move::Forward), Err(Rejection::GuardForward));
//! ```

use nexus_types::{ActuationCommand, CommandSource, Move, OperatingMode, RadarReading, Rejection};

use crate::safety_monitor::{side_avoidance, speed_from_distance};

/// Arbitration facts an autonomous emission is judged against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutonomyContext {
    pub mode: OperatingMode,
    pub latched: bool,
    pub override_active: bool,
    pub radar: RadarReading,
}

impl AutonomyContext {
    /// Suppression shared by every autonomous source (AI, patrol, target
    /// navigation): the emergency latch first, then the override window.
    pub fn suppressed(&self) -> Option<Rejection> {
        if self.latched {
            Some(Rejection::EmergencyLatched)
        } else if self.override_active {
            Some(Rejection::OverrideWindow)
        } else {
            None
        }
    }
}

/// Gate for `AI_CMD` requests.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutonomyGate;

impl AutonomyGate {
    pub fn new() -> Self {
        Self
    }

    /// Admit or reject an AI movement request.
    ///
    /// # Errors
    ///
    /// The first [`Rejection`] in the priority order above.
    pub fn admit(
        &self,
        ctx: &AutonomyContext,
        requested: Move,
    ) -> Result<ActuationCommand, Rejection> {
        if ctx.latched {
            return Err(Rejection::EmergencyLatched);
        }
        if ctx.mode == OperatingMode::Manual {
            return Err(Rejection::ManualMode);
        }
        if ctx.override_active {
            return Err(Rejection::OverrideWindow);
        }
        if ctx.mode == OperatingMode::TargetNav {
            return Err(Rejection::TargetNavExclusive);
        }

        if requested == Move::Stop {
            return Ok(ActuationCommand::stop(CommandSource::Ai));
        }

        let movement = side_avoidance(&ctx.radar).unwrap_or(requested);
        let speed = speed_from_distance(ctx.radar.front);
        if speed == 0 {
            return Err(Rejection::NoClearance);
        }
        if ctx.mode == OperatingMode::Guard && movement == Move::Forward {
            return Err(Rejection::GuardForward);
        }

        Ok(ActuationCommand::new(movement, speed, CommandSource::Ai))
    }
}
