//! `nexus-kernel` – Safety interlocks
//!
//! The rover's brainstem.  It does not plan; it enforces the rules every
//! command source must obey.
//!
//! # Modules
//!
//! - [`safety_monitor`] – [`SafetyMonitor`]: the radar emergency latch plus
//!   the distance speed cap and lateral avoidance helpers.
//! - [`override_window`] – [`ManualOverrideWindow`]: the 500 ms grace period
//!   during which a human command silences every autonomous source.
//! - [`autonomy_gate`] – [`AutonomyGate`]: the single interception point an
//!   `AI_CMD` must pass before reaching the actuator.

pub mod autonomy_gate;
pub mod override_window;
pub mod safety_monitor;

pub use autonomy_gate::{AutonomyContext, AutonomyGate};
pub use override_window::{MANUAL_OVERRIDE_GRACE, ManualOverrideWindow};
pub use safety_monitor::{
    EMERGENCY_CM, SIDE_CM, SLOW_CM, SafetyDecision, SafetyMonitor, side_avoidance,
    speed_from_distance,
};
