//! `nexus-runtime` – Arbitration engine
//!
//! Owns the rover's operating mode and decides, one event at a time, which
//! command source gets the actuator.
//!
//! # Modules
//!
//! - [`arbiter`] – [`Arbiter`]: applies the safety → mode → telemetry → AI
//!   → manual priority order to every inbound message and timer tick.
//! - [`patrol`] – [`PatrolController`]: a forward step every 3 s while in
//!   `PATROL`.
//! - [`target_nav`] – [`NavigationController`]: the heading-seeking state
//!   machine behind `TARGET_LOCK`.
//! - [`scheduler`] – [`Scheduler`] / [`TokioScheduler`]: generation-tagged
//!   periodic ticks.
//! - [`worker`] – [`spawn_engine`] / [`EngineHandle`]: the single engine
//!   task and its priority lane for sensor snapshots.
//! - [`telemetry`] – [`init_tracing`]: subscriber setup with optional OTLP
//!   export (`OTEL_EXPORTER_OTLP_ENDPOINT`).

pub mod arbiter;
pub mod patrol;
pub mod scheduler;
pub mod target_nav;
pub mod telemetry;
pub mod worker;

#[cfg(test)]
mod testing;

pub use arbiter::{Arbiter, ArbitrationState};
pub use patrol::PatrolController;
pub use scheduler::{Scheduler, TimerKind, TokioScheduler};
pub use target_nav::{NavState, NavigationController};
pub use telemetry::{TracerProviderGuard, init_tracing};
pub use worker::{EngineEvent, EngineHandle, spawn_engine};
