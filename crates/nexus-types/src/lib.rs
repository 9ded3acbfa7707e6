//! `nexus-types` – shared vocabulary of the rover relay.
//!
//! Everything that crosses a crate boundary lives here: operating modes,
//! cached sensor readings, actuation commands, connection roles, the
//! inbound message classifier ([`wire`]) and the workspace error type.

pub mod wire;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use wire::{Inbound, ManualKind, Passthrough, SensorFrame};

/// Distance reported for a direction that has never been measured.
pub const CLEAR_SENTINEL_CM: f64 = 999.0;

/// Process-wide operating mode.  Exactly one is active at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatingMode {
    #[default]
    Manual,
    Follow,
    Guard,
    Patrol,
    Emergency,
    TargetNav,
}

impl OperatingMode {
    /// Wire name, e.g. `"TARGET_NAV"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingMode::Manual => "MANUAL",
            OperatingMode::Follow => "FOLLOW",
            OperatingMode::Guard => "GUARD",
            OperatingMode::Patrol => "PATROL",
            OperatingMode::Emergency => "EMERGENCY",
            OperatingMode::TargetNav => "TARGET_NAV",
        }
    }

    /// Parse a wire name.  Returns `None` for anything unknown.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MANUAL" => Some(OperatingMode::Manual),
            "FOLLOW" => Some(OperatingMode::Follow),
            "GUARD" => Some(OperatingMode::Guard),
            "PATROL" => Some(OperatingMode::Patrol),
            "EMERGENCY" => Some(OperatingMode::Emergency),
            "TARGET_NAV" => Some(OperatingMode::TargetNav),
            _ => None,
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proximity radar snapshot in centimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadarReading {
    #[serde(default = "clear_sentinel")]
    pub front: f64,
    #[serde(default = "clear_sentinel")]
    pub left: f64,
    #[serde(default = "clear_sentinel")]
    pub right: f64,
}

fn clear_sentinel() -> f64 {
    CLEAR_SENTINEL_CM
}

impl RadarReading {
    pub fn new(front: f64, left: f64, right: f64) -> Self {
        Self { front, left, right }
    }
}

impl Default for RadarReading {
    fn default() -> Self {
        Self::new(CLEAR_SENTINEL_CM, CLEAR_SENTINEL_CM, CLEAR_SENTINEL_CM)
    }
}

/// IMU heading snapshot in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OrientationReading {
    #[serde(default)]
    pub yaw: f64,
}

/// Direction of travel understood by the actuation node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Move {
    Forward,
    Left,
    Right,
    Stop,
}

impl Move {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FORWARD" => Some(Move::Forward),
            "LEFT" => Some(Move::Left),
            "RIGHT" => Some(Move::Right),
            "STOP" => Some(Move::Stop),
            _ => None,
        }
    }
}

/// Provenance of an actuation command.  Display metadata only; priority
/// is decided by which code path is allowed to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandSource {
    Radar,
    Ai,
    Manual,
    Patrol,
    TargetNav,
    Avoid,
}

/// Highest speed the actuation node accepts.
pub const MAX_SPEED: u8 = 120;

/// Node id the actuation node answers to.
pub const ACTUATOR_NODE_ID: u8 = 2;

/// Outbound actuation command, serialised as
/// `{"type":"ACTUATION","node":2,"move":..,"speed":..,"source":..}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ActuationCommand {
    #[serde(rename = "move")]
    pub movement: Move,
    pub speed: u8,
    pub source: CommandSource,
}

impl ActuationCommand {
    /// Build a command; `speed` is clamped to [`MAX_SPEED`].
    pub fn new(movement: Move, speed: u8, source: CommandSource) -> Self {
        Self {
            movement,
            speed: speed.min(MAX_SPEED),
            source,
        }
    }

    /// A zero-speed stop attributed to `source`.
    pub fn stop(source: CommandSource) -> Self {
        Self::new(Move::Stop, 0, source)
    }
}

impl Serialize for ActuationCommand {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("ActuationCommand", 5)?;
        s.serialize_field("type", "ACTUATION")?;
        s.serialize_field("node", &ACTUATOR_NODE_ID)?;
        s.serialize_field("move", &self.movement)?;
        s.serialize_field("speed", &self.speed)?;
        s.serialize_field("source", &self.source)?;
        s.end()
    }
}

/// `{"type":"MODE_STATUS","mode":..}` announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "MODE_STATUS")]
pub struct ModeStatus {
    pub mode: OperatingMode,
}

/// Declared category of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionRole {
    Dashboard,
    SensorNode,
    ActuatorNode,
    CameraNode,
    VisionNode,
}

impl ConnectionRole {
    /// Map a `{"register": ..}` value to a role.  `"yolo"` is the vision
    /// node's historical name.
    pub fn from_registration(s: &str) -> Option<Self> {
        match s {
            "dashboard" => Some(ConnectionRole::Dashboard),
            "sensor" | "sensor-node" => Some(ConnectionRole::SensorNode),
            "actuator" | "actuator-node" => Some(ConnectionRole::ActuatorNode),
            "camera" | "camera-node" => Some(ConnectionRole::CameraNode),
            "vision" | "vision-node" | "yolo" => Some(ConnectionRole::VisionNode),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionRole::Dashboard => "dashboard",
            ConnectionRole::SensorNode => "sensor-node",
            ConnectionRole::ActuatorNode => "actuator-node",
            ConnectionRole::CameraNode => "camera-node",
            ConnectionRole::VisionNode => "vision-node",
        })
    }
}

/// Opaque identity of one transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why the arbiter refused a recognised command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The radar emergency latch is set.
    EmergencyLatched,
    /// Autonomous commands are ignored in `MANUAL`.
    ManualMode,
    /// A manual command arrived less than 500 ms ago.
    OverrideWindow,
    /// Target navigation owns the autonomous channel.
    TargetNavExclusive,
    /// `GUARD` forbids autonomous forward motion.
    GuardForward,
    /// The distance cap left no usable speed.
    NoClearance,
    /// Only the safety monitor may enter `EMERGENCY`.
    EmergencyNotSelectable,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Rejection::EmergencyLatched => "emergency latch set",
            Rejection::ManualMode => "manual mode",
            Rejection::OverrideWindow => "manual override window open",
            Rejection::TargetNavExclusive => "target navigation active",
            Rejection::GuardForward => "guard mode forbids forward motion",
            Rejection::NoClearance => "no clearance for motion",
            Rejection::EmergencyNotSelectable => "emergency mode is not operator-selectable",
        })
    }
}

/// Workspace error type spanning decoding, policy, transport and config.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Rejected by arbitration: {0}")]
    Rejected(Rejection),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unauthorized peer {0}")]
    Unauthorized(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<Rejection> for RelayError {
    fn from(r: Rejection) -> Self {
        RelayError::Rejected(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actuation_command_wire_shape() {
        let cmd = ActuationCommand::stop(CommandSource::Radar);
        let json = serde_json::to_value(cmd).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "ACTUATION",
                "node": 2,
                "move": "STOP",
                "speed": 0,
                "source": "RADAR"
            })
        );
    }

    #[test]
    fn actuation_speed_is_clamped() {
        let cmd = ActuationCommand::new(Move::Forward, 250, CommandSource::Ai);
        assert_eq!(cmd.speed, MAX_SPEED);
    }

    #[test]
    fn target_nav_source_uses_screaming_case() {
        let cmd = ActuationCommand::new(Move::Right, 80, CommandSource::TargetNav);
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"source\":\"TARGET_NAV\""));
        assert!(json.contains("\"move\":\"RIGHT\""));
    }

    #[test]
    fn mode_status_wire_shape() {
        let json = serde_json::to_value(ModeStatus {
            mode: OperatingMode::TargetNav,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "MODE_STATUS", "mode": "TARGET_NAV"}));
    }

    #[test]
    fn mode_names_parse_back() {
        for mode in [
            OperatingMode::Manual,
            OperatingMode::Follow,
            OperatingMode::Guard,
            OperatingMode::Patrol,
            OperatingMode::Emergency,
            OperatingMode::TargetNav,
        ] {
            assert_eq!(OperatingMode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(OperatingMode::parse("turbo"), None);
    }

    #[test]
    fn partial_radar_defaults_to_clear() {
        let r: RadarReading = serde_json::from_str(r#"{"front":25}"#).unwrap();
        assert_eq!(r.front, 25.0);
        assert_eq!(r.left, CLEAR_SENTINEL_CM);
        assert_eq!(r.right, CLEAR_SENTINEL_CM);
    }

    #[test]
    fn yolo_registers_as_vision_node() {
        assert_eq!(
            ConnectionRole::from_registration("yolo"),
            Some(ConnectionRole::VisionNode)
        );
        assert_eq!(ConnectionRole::from_registration("toaster"), None);
    }

    #[test]
    fn relay_error_display() {
        let err = RelayError::from(Rejection::EmergencyLatched);
        assert!(err.to_string().contains("emergency latch"));

        let err = RelayError::Malformed("radar.front is not a number".into());
        assert!(err.to_string().contains("radar.front"));
    }
}
