//! [`Arbiter`] – the rover's single decision point.
//!
//! Every inbound message and every timer tick ends up in exactly one
//! `Arbiter` method, which runs to completion before the next event is
//! looked at.  The arbiter owns the [`ArbitrationState`] outright and is the
//! only code that emits actuation commands.
//!
//! # Priority order
//!
//! 1. **Safety** – radar readings reach the [`SafetyMonitor`] first.  A trip
//!    emits one radar `STOP` before anything else the message causes.
//! 2. **Mode / configuration** – `MODE`, `TARGET_LOCK`, `FOLLOW_DIST`,
//!    `RELEASE_AUTONOMY`.
//! 3. **Telemetry** – sensor snapshots are fanned out to every connection.
//! 4. **AI** – `AI_CMD` passes through the [`AutonomyGate`].
//! 5. **Manual** – `ACTUATION` / `PAN_TILT` take the rover over and open
//!    the override window.
//!
//! Policy rejections are returned from [`Arbiter::apply`] as
//! [`RelayError::Rejected`] and logged at debug by [`Arbiter::handle`]; they
//! are never reported back to the sender.

use std::time::Instant;

use nexus_kernel::{
    AutonomyContext, AutonomyGate, ManualOverrideWindow, SafetyDecision, SafetyMonitor,
};
use nexus_middleware::{Audience, Outbox};
use nexus_types::{
    ActuationCommand, CommandSource, ConnectionId, ConnectionRole, Inbound, ManualKind, ModeStatus,
    Move, OperatingMode, OrientationReading, Passthrough, RadarReading, Rejection, RelayError,
    SensorFrame,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::patrol::PatrolController;
use crate::scheduler::{Scheduler, TimerKind};
use crate::target_nav::{NAV_PERIOD, NavigationController};

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the arbiter knows.  Mutated only through [`Arbiter`].
#[derive(Debug, Default)]
pub struct ArbitrationState {
    pub mode: OperatingMode,
    pub last_radar: RadarReading,
    pub last_imu: OrientationReading,
    pub safety: SafetyMonitor,
    pub override_window: ManualOverrideWindow,
    /// An AI command has been admitted since the last mode change.
    pub ai_active: bool,
    /// Operator follow-distance preference in centimetres.
    pub follow_distance: Option<f64>,
    pub nav: NavigationController,
    pub patrol: PatrolController,
}

impl ArbitrationState {
    /// Facts every autonomous emission is judged against.
    pub fn autonomy_context(&self, now: Instant) -> AutonomyContext {
        AutonomyContext {
            mode: self.mode,
            latched: self.safety.is_latched(),
            override_active: self.override_window.is_active(now),
            radar: self.last_radar,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Arbiter
// ─────────────────────────────────────────────────────────────────────────────

/// Navigation ticks run for the whole engine lifetime; there is only ever
/// one navigation timer.
const NAV_TIMER_GENERATION: u64 = 1;

pub struct Arbiter {
    state: ArbitrationState,
    gate: AutonomyGate,
    outbox: Box<dyn Outbox>,
    scheduler: Box<dyn Scheduler>,
}

impl Arbiter {
    pub fn new(outbox: Box<dyn Outbox>, scheduler: Box<dyn Scheduler>) -> Self {
        Self {
            state: ArbitrationState::default(),
            gate: AutonomyGate::new(),
            outbox,
            scheduler,
        }
    }

    /// Arm the navigation tick.  Called once before the first event.
    pub fn start(&mut self) {
        self.scheduler
            .arm(TimerKind::Navigation, NAV_TIMER_GENERATION, NAV_PERIOD);
        info!(mode = %self.state.mode, "arbiter started");
    }

    pub fn state(&self) -> &ArbitrationState {
        &self.state
    }

    /// Entry point for one decoded inbound frame.
    ///
    /// Never fails: malformed input is logged at warn, policy rejections
    /// at debug, and both are otherwise ignored.
    pub fn handle(&mut self, origin: Option<ConnectionId>, value: Value, now: Instant) {
        let inbound = match Inbound::classify(value) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(
                    origin = ?origin.map(|id| id.to_string()),
                    error = %e,
                    "dropping malformed message"
                );
                return;
            }
        };
        match self.apply(inbound, now) {
            Ok(()) => {}
            Err(RelayError::Rejected(reason)) => {
                debug!(origin = ?origin.map(|id| id.to_string()), %reason, "command rejected");
            }
            Err(e) => warn!(error = %e, "message handling failed"),
        }
    }

    /// Apply one classified message.
    ///
    /// # Errors
    ///
    /// [`RelayError::Rejected`] when a policy check refuses the command.
    pub fn apply(&mut self, inbound: Inbound, now: Instant) -> Result<(), RelayError> {
        match inbound {
            Inbound::Sensor(frame) => {
                self.on_sensor(&frame);
                Ok(())
            }
            Inbound::ModeChange(mode) => self.on_mode(mode),
            Inbound::TargetLock { pan } => self.on_target_lock(pan),
            Inbound::FollowDistance(cm) => {
                self.state.follow_distance = Some(cm);
                debug!(follow_distance = cm, "follow distance stored");
                Ok(())
            }
            Inbound::ReleaseAutonomy => {
                self.state.ai_active = false;
                self.state.nav.reset();
                info!(mode = %self.state.mode, "autonomy released");
                Ok(())
            }
            Inbound::Autonomy(requested) => self.on_ai(requested, now),
            Inbound::Manual { kind, raw } => self.on_manual(kind, &raw, now),
            Inbound::Passthrough { kind, raw } => {
                let audience = match kind {
                    Passthrough::Vision => Audience::Prefer(ConnectionRole::Dashboard),
                    Passthrough::CameraStatus => Audience::All,
                };
                self.outbox.emit(audience, &raw);
                Ok(())
            }
            Inbound::Register(role) => {
                trace!(%role, "registration reached the arbiter; ignored");
                Ok(())
            }
            Inbound::Unrecognized => {
                trace!("unrecognised message dropped");
                Ok(())
            }
        }
    }

    /// Timer tick.  Stale generations are discarded.
    pub fn on_tick(&mut self, timer: TimerKind, generation: u64, now: Instant) {
        let ctx = self.state.autonomy_context(now);
        let cmd = match timer {
            TimerKind::Patrol => {
                if !self.state.patrol.accepts(generation) {
                    trace!(generation, "stale patrol tick");
                    return;
                }
                self.state.patrol.on_tick(&ctx)
            }
            TimerKind::Navigation => {
                if generation != NAV_TIMER_GENERATION {
                    return;
                }
                let imu = self.state.last_imu;
                self.state.nav.on_tick(&ctx, &imu)
            }
        };
        if let Some(cmd) = cmd {
            self.emit_actuation(cmd);
        }
    }

    /// Stop all timers and send a final manual `STOP`.
    pub fn shutdown(&mut self) {
        self.state.patrol.stop(self.scheduler.as_mut());
        self.scheduler.disarm(TimerKind::Navigation);
        self.state.nav.reset();
        self.state.ai_active = false;
        self.emit_actuation(ActuationCommand::stop(CommandSource::Manual));
        info!("arbiter shut down");
    }

    // ── Handlers ─────────────────────────────────────────────────────────────

    fn on_sensor(&mut self, frame: &SensorFrame) {
        if let Some(radar) = frame.radar {
            self.state.last_radar = radar;
            match self.state.safety.observe(&radar) {
                SafetyDecision::Tripped(stop) => {
                    self.emit_actuation(stop);
                    self.transition_to(OperatingMode::Emergency);
                }
                SafetyDecision::Released => self.transition_to(OperatingMode::Manual),
                SafetyDecision::Holding | SafetyDecision::Clear => {}
            }
        }
        if let Some(imu) = frame.imu {
            self.state.last_imu = imu;
        }
        self.outbox.emit(Audience::All, &frame.telemetry_payload());
    }

    fn on_mode(&mut self, mode: OperatingMode) -> Result<(), RelayError> {
        if self.state.safety.is_latched() {
            return Err(Rejection::EmergencyLatched.into());
        }
        if mode == OperatingMode::Emergency {
            return Err(Rejection::EmergencyNotSelectable.into());
        }
        self.transition_to(mode);
        Ok(())
    }

    fn on_target_lock(&mut self, pan: f64) -> Result<(), RelayError> {
        if self.state.safety.is_latched() {
            return Err(Rejection::EmergencyLatched.into());
        }
        self.transition_to(OperatingMode::TargetNav);
        self.state.nav.lock(pan);
        info!(target_heading = pan, "target locked");
        Ok(())
    }

    fn on_ai(&mut self, requested: Move, now: Instant) -> Result<(), RelayError> {
        let ctx = self.state.autonomy_context(now);
        let cmd = self.gate.admit(&ctx, requested)?;
        self.state.ai_active = true;
        self.emit_actuation(cmd);
        Ok(())
    }

    fn on_manual(&mut self, kind: ManualKind, raw: &Value, now: Instant) -> Result<(), RelayError> {
        if self.state.safety.is_latched() {
            return Err(Rejection::EmergencyLatched.into());
        }
        if self.state.mode == OperatingMode::Manual {
            self.state.ai_active = false;
            self.state.nav.reset();
        } else {
            self.transition_to(OperatingMode::Manual);
        }
        self.state.override_window.open(now);
        debug!(?kind, "manual command forwarded");
        self.outbox
            .emit(Audience::Prefer(ConnectionRole::ActuatorNode), raw);
        Ok(())
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    /// Enter `mode`: autonomy is cleared, patrol follows the mode and the
    /// change is announced.
    fn transition_to(&mut self, mode: OperatingMode) {
        let previous = self.state.mode;
        self.state.mode = mode;
        self.state.ai_active = false;
        self.state.nav.reset();
        if mode == OperatingMode::Patrol {
            self.state.patrol.start(self.scheduler.as_mut());
        } else {
            self.state.patrol.stop(self.scheduler.as_mut());
        }
        info!(from = %previous, to = %mode, "mode change");
        self.emit(Audience::All, &ModeStatus { mode });
    }

    fn emit_actuation(&mut self, cmd: ActuationCommand) {
        debug!(source = ?cmd.source, movement = ?cmd.movement, speed = cmd.speed, "actuation");
        self.emit(Audience::Prefer(ConnectionRole::ActuatorNode), &cmd);
    }

    fn emit<T: Serialize>(&self, audience: Audience, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(value) => {
                self.outbox.emit(audience, &value);
            }
            Err(e) => warn!(error = %e, "failed to encode outbound payload"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::target_nav::NavState;
    use crate::testing::{RecordingOutbox, RecordingScheduler};

    fn arbiter() -> (Arbiter, RecordingOutbox) {
        let outbox = RecordingOutbox::default();
        let mut arbiter =
            Arbiter::new(Box::new(outbox.clone()), Box::new(RecordingScheduler::default()));
        arbiter.start();
        (arbiter, outbox)
    }

    fn radar(front: f64, left: f64, right: f64) -> Value {
        json!({"node": 1, "radar": {"front": front, "left": left, "right": right}})
    }

    fn ai(cmd: &str) -> Value {
        json!({"type": "AI_CMD", "cmd": cmd})
    }

    fn mode(name: &str) -> Value {
        json!({"type": "MODE", "mode": name})
    }

    fn stop_from(source: &str) -> Value {
        json!({"type": "ACTUATION", "node": 2, "move": "STOP", "speed": 0, "source": source})
    }

    // ── Safety ───────────────────────────────────────────────────────────────

    #[test]
    fn close_obstacle_stops_before_telemetry() {
        let (mut arb, out) = arbiter();
        let t0 = Instant::now();
        arb.handle(None, radar(20.0, 999.0, 999.0), t0);

        let sent = out.sent();
        assert_eq!(sent[0].1, stop_from("RADAR"));
        assert_eq!(sent[0].0, Audience::Prefer(ConnectionRole::ActuatorNode));
        assert_eq!(sent[1].1, json!({"type": "MODE_STATUS", "mode": "EMERGENCY"}));
        assert_eq!(sent[2].0, Audience::All);
        assert_eq!(sent[2].1["radar"]["front"], 20.0);
        assert_eq!(sent[2].1["env"], json!({"temp": null, "hum": null, "lux": null}));
        assert_eq!(arb.state().mode, OperatingMode::Emergency);
    }

    #[test]
    fn latch_emits_exactly_one_stop() {
        let (mut arb, out) = arbiter();
        let t0 = Instant::now();
        for front in [25.0, 10.0, 29.9] {
            arb.handle(None, radar(front, 999.0, 999.0), t0);
        }
        assert_eq!(out.actuations(), vec![stop_from("RADAR")]);
    }

    #[test]
    fn latch_suppresses_ai_manual_and_mode() {
        let (mut arb, out) = arbiter();
        let t0 = Instant::now();
        arb.handle(None, mode("FOLLOW"), t0);
        arb.handle(None, radar(20.0, 999.0, 999.0), t0);
        out.clear();

        let rejected = [
            Inbound::Autonomy(Move::Forward),
            Inbound::Manual {
                kind: ManualKind::Actuation,
                raw: json!({"type": "ACTUATION", "move": "LEFT"}),
            },
            Inbound::ModeChange(OperatingMode::Patrol),
            Inbound::TargetLock { pan: 10.0 },
        ];
        for inbound in rejected {
            let result = arb.apply(inbound, t0);
            assert!(matches!(result, Err(RelayError::Rejected(Rejection::EmergencyLatched))));
        }
        assert!(out.sent().is_empty());
        assert_eq!(arb.state().mode, OperatingMode::Emergency);
    }

    #[test]
    fn latch_releases_into_manual() {
        let (mut arb, out) = arbiter();
        let t0 = Instant::now();
        arb.handle(None, radar(20.0, 999.0, 999.0), t0);
        out.clear();
        arb.handle(None, radar(30.0, 999.0, 999.0), t0);

        assert!(!arb.state().safety.is_latched());
        assert_eq!(arb.state().mode, OperatingMode::Manual);
        assert_eq!(
            out.of_type("MODE_STATUS"),
            vec![json!({"type": "MODE_STATUS", "mode": "MANUAL"})]
        );
        assert!(out.actuations().is_empty());
    }

    #[test]
    fn latch_stops_patrol_and_navigation() {
        let (mut arb, out) = arbiter();
        let t0 = Instant::now();
        arb.handle(None, json!({"type": "TARGET_LOCK", "pan": 90}), t0);
        arb.handle(None, radar(20.0, 999.0, 999.0), t0);
        out.clear();

        arb.on_tick(TimerKind::Navigation, NAV_TIMER_GENERATION, t0);
        assert!(out.sent().is_empty());
        assert!(!arb.state().nav.is_active());
    }

    // ── Telemetry ────────────────────────────────────────────────────────────

    #[test]
    fn telemetry_is_broadcast_in_every_mode() {
        let (mut arb, out) = arbiter();
        let t0 = Instant::now();
        arb.handle(
            None,
            json!({
                "node": 1, "imu": {"yaw": 12.5}, "power": {"v": 7.4},
                "temp": 21, "hum": 40, "lux": 300
            }),
            t0,
        );
        let sent = out.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].1,
            json!({
                "radar": null,
                "imu": {"yaw": 12.5},
                "power": {"v": 7.4},
                "env": {"temp": 21, "hum": 40, "lux": 300}
            })
        );
        assert_eq!(arb.state().last_imu.yaw, 12.5);
    }

    #[test]
    fn malformed_sensor_frame_is_ignored() {
        let (mut arb, out) = arbiter();
        arb.handle(None, json!({"node": 1, "radar": {"front": "near"}}), Instant::now());
        assert!(out.sent().is_empty());
        assert!(!arb.state().safety.is_latched());
    }

    // ── Mode / configuration ─────────────────────────────────────────────────

    #[test]
    fn mode_change_announces_and_clears_autonomy() {
        let (mut arb, out) = arbiter();
        let t0 = Instant::now();
        arb.handle(None, mode("FOLLOW"), t0);
        arb.handle(None, ai("LEFT"), t0);
        assert!(arb.state().ai_active);

        arb.handle(None, mode("GUARD"), t0);
        assert!(!arb.state().ai_active);
        assert_eq!(arb.state().mode, OperatingMode::Guard);
        assert_eq!(out.of_type("MODE_STATUS").len(), 2);
    }

    #[test]
    fn emergency_is_not_selectable() {
        let (mut arb, _out) = arbiter();
        let result = arb.apply(Inbound::ModeChange(OperatingMode::Emergency), Instant::now());
        assert!(matches!(result, Err(RelayError::Rejected(Rejection::EmergencyNotSelectable))));
        assert_eq!(arb.state().mode, OperatingMode::Manual);
    }

    #[test]
    fn unknown_mode_is_malformed_and_ignored() {
        let (mut arb, out) = arbiter();
        arb.handle(None, mode("DANCE"), Instant::now());
        assert!(out.sent().is_empty());
        assert_eq!(arb.state().mode, OperatingMode::Manual);
    }

    #[test]
    fn patrol_follows_mode() {
        let (mut arb, _out) = arbiter();
        let t0 = Instant::now();
        arb.handle(None, mode("PATROL"), t0);
        assert!(arb.state().patrol.is_armed());
        arb.handle(None, mode("FOLLOW"), t0);
        assert!(!arb.state().patrol.is_armed());
    }

    #[test]
    fn follow_distance_is_stored_only() {
        let (mut arb, out) = arbiter();
        arb.handle(None, json!({"type": "FOLLOW_DIST", "value": 120}), Instant::now());
        assert_eq!(arb.state().follow_distance, Some(120.0));
        assert!(out.sent().is_empty());
    }

    #[test]
    fn release_autonomy_keeps_mode() {
        let (mut arb, out) = arbiter();
        let t0 = Instant::now();
        arb.handle(None, json!({"type": "TARGET_LOCK", "pan": 45}), t0);
        out.clear();
        arb.handle(None, json!({"type": "RELEASE_AUTONOMY"}), t0);

        assert_eq!(arb.state().mode, OperatingMode::TargetNav);
        assert!(!arb.state().nav.is_active());
        assert!(out.sent().is_empty());
    }

    #[test]
    fn ai_clear_is_not_a_release() {
        let (mut arb, out) = arbiter();
        let t0 = Instant::now();
        arb.handle(None, json!({"type": "TARGET_LOCK", "pan": 45}), t0);
        out.clear();
        arb.handle(None, ai("CLEAR"), t0);
        assert!(arb.state().nav.is_active());
        assert!(out.sent().is_empty());
    }

    // ── AI ───────────────────────────────────────────────────────────────────

    #[test]
    fn ai_rejected_in_manual() {
        let (mut arb, out) = arbiter();
        let result = arb.apply(Inbound::Autonomy(Move::Forward), Instant::now());
        assert!(matches!(result, Err(RelayError::Rejected(Rejection::ManualMode))));
        assert!(out.sent().is_empty());
    }

    #[test]
    fn ai_forward_capped_by_cached_radar() {
        let (mut arb, out) = arbiter();
        let t0 = Instant::now();
        arb.handle(None, mode("FOLLOW"), t0);
        arb.handle(None, radar(60.0, 999.0, 999.0), t0);
        arb.handle(None, ai("FORWARD"), t0);
        assert_eq!(
            out.actuations(),
            vec![json!({
                "type": "ACTUATION", "node": 2, "move": "FORWARD", "speed": 60, "source": "AI"
            })]
        );
    }

    #[test]
    fn guard_never_emits_ai_forward() {
        let (mut arb, out) = arbiter();
        let t0 = Instant::now();
        arb.handle(None, mode("GUARD"), t0);
        arb.handle(None, ai("FORWARD"), t0);
        arb.handle(None, ai("RIGHT"), t0);
        let moves: Vec<Value> = out.actuations().into_iter().map(|a| a["move"].clone()).collect();
        assert_eq!(moves, vec![json!("RIGHT")]);
    }

    #[test]
    fn ai_rejected_during_target_nav() {
        let (mut arb, _out) = arbiter();
        let t0 = Instant::now();
        arb.handle(None, json!({"type": "TARGET_LOCK", "pan": 0}), t0);
        let result = arb.apply(Inbound::Autonomy(Move::Left), t0);
        assert!(matches!(result, Err(RelayError::Rejected(Rejection::TargetNavExclusive))));
    }

    // ── Manual ───────────────────────────────────────────────────────────────

    #[test]
    fn manual_then_ai_within_window_drops_ai() {
        let (mut arb, out) = arbiter();
        let t0 = Instant::now();
        arb.handle(None, mode("FOLLOW"), t0);
        out.clear();

        let manual = json!({"type": "ACTUATION", "move": "LEFT", "speed": 90});
        arb.handle(None, manual.clone(), t0);
        arb.handle(None, ai("FORWARD"), t0 + Duration::from_millis(200));

        assert_eq!(arb.state().mode, OperatingMode::Manual);
        assert_eq!(out.actuations(), vec![manual]);
    }

    #[test]
    fn manual_is_forwarded_verbatim_to_actuator() {
        let (mut arb, out) = arbiter();
        let pan_tilt = json!({"type": "PAN_TILT", "pan": 30, "tilt": -5, "extra": [1, 2]});
        arb.handle(None, pan_tilt.clone(), Instant::now());
        assert_eq!(out.sent(), vec![(Audience::Prefer(ConnectionRole::ActuatorNode), pan_tilt)]);
    }

    #[test]
    fn manual_takeover_announces_mode_once() {
        let (mut arb, out) = arbiter();
        let t0 = Instant::now();
        arb.handle(None, mode("PATROL"), t0);
        out.clear();
        arb.handle(None, json!({"type": "ACTUATION", "move": "STOP"}), t0);
        arb.handle(None, json!({"type": "ACTUATION", "move": "LEFT"}), t0);

        assert_eq!(
            out.of_type("MODE_STATUS"),
            vec![json!({"type": "MODE_STATUS", "mode": "MANUAL"})]
        );
        assert!(!arb.state().patrol.is_armed());
    }

    #[test]
    fn override_window_measured_from_latest_manual() {
        let (mut arb, out) = arbiter();
        let t0 = Instant::now();
        let manual = json!({"type": "ACTUATION", "move": "LEFT"});
        arb.handle(None, manual.clone(), t0);
        arb.handle(None, manual, t0 + Duration::from_millis(400));
        arb.handle(None, mode("FOLLOW"), t0 + Duration::from_millis(450));
        out.clear();

        arb.handle(None, ai("LEFT"), t0 + Duration::from_millis(700));
        assert!(out.actuations().is_empty(), "window still open at +700 ms");
        arb.handle(None, ai("LEFT"), t0 + Duration::from_millis(900));
        assert_eq!(out.actuations().len(), 1);
    }

    // ── Timers ───────────────────────────────────────────────────────────────

    #[test]
    fn patrol_ticks_emit_forward() {
        let (mut arb, out) = arbiter();
        let t0 = Instant::now();
        arb.handle(None, mode("PATROL"), t0);
        out.clear();
        let generation = arb.state().patrol.generation();
        for i in 1..=3 {
            arb.on_tick(TimerKind::Patrol, generation, t0 + Duration::from_secs(3 * i));
        }
        let forward = json!({
            "type": "ACTUATION", "node": 2, "move": "FORWARD", "speed": 50, "source": "PATROL"
        });
        assert_eq!(out.actuations(), vec![forward.clone(), forward.clone(), forward]);
    }

    #[test]
    fn stale_patrol_tick_is_ignored() {
        let (mut arb, out) = arbiter();
        let t0 = Instant::now();
        arb.handle(None, mode("PATROL"), t0);
        let stale = arb.state().patrol.generation();
        arb.handle(None, mode("MANUAL"), t0);
        arb.handle(None, mode("PATROL"), t0);
        out.clear();

        arb.on_tick(TimerKind::Patrol, stale, t0 + Duration::from_secs(3));
        assert!(out.sent().is_empty());
    }

    #[test]
    fn patrol_silent_inside_override_window() {
        let (mut arb, out) = arbiter();
        let t0 = Instant::now();
        arb.handle(None, json!({"type": "PAN_TILT", "pan": 0}), t0);
        arb.handle(None, mode("PATROL"), t0 + Duration::from_millis(100));
        out.clear();
        let generation = arb.state().patrol.generation();
        arb.on_tick(TimerKind::Patrol, generation, t0 + Duration::from_millis(300));
        assert!(out.sent().is_empty());
    }

    #[test]
    fn target_lock_then_heading_steers_right() {
        let (mut arb, out) = arbiter();
        let t0 = Instant::now();
        arb.handle(None, json!({"type": "TARGET_LOCK", "pan": 90}), t0);
        assert_eq!(
            out.of_type("MODE_STATUS"),
            vec![json!({"type": "MODE_STATUS", "mode": "TARGET_NAV"})]
        );
        arb.handle(None, json!({"node": 1, "imu": {"yaw": 70}}), t0);
        out.clear();

        arb.on_tick(TimerKind::Navigation, NAV_TIMER_GENERATION, t0 + NAV_PERIOD);
        assert_eq!(
            out.actuations(),
            vec![json!({
                "type": "ACTUATION", "node": 2, "move": "RIGHT", "speed": 80, "source": "TARGET_NAV"
            })]
        );
    }

    #[test]
    fn manual_command_resets_navigation() {
        let (mut arb, out) = arbiter();
        let t0 = Instant::now();
        arb.handle(None, json!({"type": "TARGET_LOCK", "pan": 90}), t0);
        arb.handle(None, json!({"type": "ACTUATION", "move": "STOP"}), t0);
        out.clear();

        arb.on_tick(TimerKind::Navigation, NAV_TIMER_GENERATION, t0 + Duration::from_secs(1));
        assert!(out.sent().is_empty());
        assert_eq!(arb.state().mode, OperatingMode::Manual);
    }

    #[test]
    fn boxed_in_navigation_stops_each_tick() {
        let (mut arb, out) = arbiter();
        let t0 = Instant::now();
        arb.handle(None, json!({"type": "TARGET_LOCK", "pan": 0}), t0);
        arb.handle(None, radar(35.0, 20.0, 40.0), t0);
        out.clear();
        for i in 1..=3 {
            arb.on_tick(TimerKind::Navigation, NAV_TIMER_GENERATION, t0 + NAV_PERIOD * i);
        }
        assert_eq!(out.actuations(), vec![stop_from("AVOID"); 3]);
    }

    #[test]
    fn avoidance_turn_is_not_undone_while_reacquiring() {
        let (mut arb, out) = arbiter();
        let t0 = Instant::now();
        arb.handle(None, json!({"type": "TARGET_LOCK", "pan": 90}), t0);
        arb.handle(None, radar(35.0, 90.0, 10.0), t0);
        out.clear();

        arb.on_tick(TimerKind::Navigation, NAV_TIMER_GENERATION, t0 + NAV_PERIOD);
        assert_eq!(
            out.actuations(),
            vec![json!({
                "type": "ACTUATION", "node": 2, "move": "LEFT", "speed": 60, "source": "AVOID"
            })]
        );

        arb.handle(None, radar(200.0, 90.0, 90.0), t0 + NAV_PERIOD);
        out.clear();
        for i in 2..=4 {
            arb.on_tick(TimerKind::Navigation, NAV_TIMER_GENERATION, t0 + NAV_PERIOD * i);
        }
        assert!(out.actuations().is_empty());
        assert_eq!(arb.state().nav.state(), NavState::Reacquire);
    }

    // ── Passthrough / shutdown ───────────────────────────────────────────────

    #[test]
    fn passthrough_routing() {
        let (mut arb, out) = arbiter();
        let yolo = json!({"type": "YOLO", "boxes": []});
        let cam = json!({"type": "CAM_STATUS", "fps": 15});
        arb.handle(None, yolo.clone(), Instant::now());
        arb.handle(None, cam.clone(), Instant::now());
        assert_eq!(
            out.sent(),
            vec![(Audience::Prefer(ConnectionRole::Dashboard), yolo), (Audience::All, cam)]
        );
    }

    #[test]
    fn unrecognised_messages_are_dropped() {
        let (mut arb, out) = arbiter();
        arb.handle(None, json!({"type": "SELF_DESTRUCT"}), Instant::now());
        arb.handle(None, json!([1, 2, 3]), Instant::now());
        assert!(out.sent().is_empty());
    }

    #[test]
    fn shutdown_sends_final_manual_stop() {
        let (mut arb, out) = arbiter();
        arb.handle(None, mode("PATROL"), Instant::now());
        out.clear();
        arb.shutdown();
        assert_eq!(out.actuations(), vec![stop_from("MANUAL")]);
        assert!(!arb.state().patrol.is_armed());
    }
}
