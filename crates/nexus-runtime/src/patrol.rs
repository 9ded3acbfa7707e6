//! [`PatrolController`] – fixed-period forward drive while in `PATROL`.

use std::time::Duration;

use nexus_kernel::AutonomyContext;
use nexus_types::{ActuationCommand, CommandSource, Move, OperatingMode};

use crate::scheduler::{Scheduler, TimerKind};

/// Period between patrol steps.
pub const PATROL_PERIOD: Duration = Duration::from_millis(3_000);
/// Speed of each patrol step.
pub const PATROL_SPEED: u8 = 50;

#[derive(Debug, Default)]
pub struct PatrolController {
    generation: u64,
    armed: bool,
}

impl PatrolController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disarm any running timer, then arm a fresh one.
    pub fn start(&mut self, scheduler: &mut dyn Scheduler) {
        self.stop(scheduler);
        self.generation += 1;
        self.armed = true;
        scheduler.arm(TimerKind::Patrol, self.generation, PATROL_PERIOD);
    }

    /// Idempotent.
    pub fn stop(&mut self, scheduler: &mut dyn Scheduler) {
        if self.armed {
            self.armed = false;
            scheduler.disarm(TimerKind::Patrol);
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `false` for ticks from a timer that has since been disarmed.
    pub fn accepts(&self, generation: u64) -> bool {
        self.armed && generation == self.generation
    }

    /// One patrol step, or `None` when patrol must stay silent.
    pub fn on_tick(&self, ctx: &AutonomyContext) -> Option<ActuationCommand> {
        if ctx.mode != OperatingMode::Patrol || ctx.suppressed().is_some() {
            return None;
        }
        Some(ActuationCommand::new(Move::Forward, PATROL_SPEED, CommandSource::Patrol))
    }
}
