//! Field-presence driven decoding of inbound text frames.
//!
//! Peers do not agree on a single envelope: the sensor node sends bare
//! `{"node":1, ...}` snapshots, dashboards send `{"type": ..}` commands and
//! the vision node announces itself with `{"register":"yolo"}`.
//! [`Inbound::classify`] inspects which fields are present and turns a
//! decoded JSON value into one typed intent.

use serde_json::{Value, json};

use crate::{ConnectionRole, Move, OperatingMode, OrientationReading, RadarReading, RelayError};

/// Node id used by the sensor node.
pub const SENSOR_NODE_ID: u64 = 1;

/// `true` for frames published by the sensor node.
pub fn is_sensor_frame(value: &Value) -> bool {
    value.get("node").and_then(Value::as_u64) == Some(SENSOR_NODE_ID)
}

/// Operator command families that are forwarded verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualKind {
    Actuation,
    PanTilt,
}

/// Message types relayed to viewers without interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Passthrough {
    /// `{"type":"YOLO", ..}` detections from the vision node.
    Vision,
    /// `{"type":"CAM_STATUS", ..}` from the camera node.
    CameraStatus,
}

/// A decoded sensor-node snapshot.
///
/// Keeps the raw JSON of every field so the fan-out payload echoes exactly
/// what the node reported, alongside the typed readings the controllers
/// consume.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorFrame {
    pub radar: Option<RadarReading>,
    pub imu: Option<OrientationReading>,
    raw_radar: Value,
    raw_imu: Value,
    power: Value,
    temp: Value,
    hum: Value,
    lux: Value,
}

impl SensorFrame {
    /// Normalised fan-out payload `{radar, imu, power, env:{temp,hum,lux}}`.
    /// Absent fields are `null`; no key is ever omitted.
    pub fn telemetry_payload(&self) -> Value {
        json!({
            "radar": self.raw_radar,
            "imu": self.raw_imu,
            "power": self.power,
            "env": {
                "temp": self.temp,
                "hum": self.hum,
                "lux": self.lux,
            }
        })
    }

    fn decode(value: &Value) -> Result<Self, RelayError> {
        let raw_radar = field(value, "radar");
        let raw_imu = field(value, "imu");

        let radar = if raw_radar.is_null() {
            None
        } else {
            Some(
                serde_json::from_value::<RadarReading>(raw_radar.clone())
                    .map_err(|e| RelayError::Malformed(format!("radar: {e}")))?,
            )
        };
        let imu = if raw_imu.is_null() {
            None
        } else {
            Some(
                serde_json::from_value::<OrientationReading>(raw_imu.clone())
                    .map_err(|e| RelayError::Malformed(format!("imu: {e}")))?,
            )
        };

        Ok(Self {
            radar,
            imu,
            raw_radar,
            raw_imu,
            power: field(value, "power"),
            temp: field(value, "temp"),
            hum: field(value, "hum"),
            lux: field(value, "lux"),
        })
    }
}

fn field(value: &Value, key: &str) -> Value {
    value.get(key).cloned().unwrap_or(Value::Null)
}

/// One inbound text frame, classified by the combination of its fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// `{"node":1, radar, imu, power, temp, hum, lux}`
    Sensor(SensorFrame),
    /// `{"type":"ACTUATION"|"PAN_TILT", ..}`, forwarded verbatim when accepted.
    Manual { kind: ManualKind, raw: Value },
    /// `{"type":"AI_CMD","cmd":..}`
    Autonomy(Move),
    /// `{"type":"MODE","mode":..}`
    ModeChange(OperatingMode),
    /// `{"type":"TARGET_LOCK","pan":..}`
    TargetLock { pan: f64 },
    /// `{"type":"FOLLOW_DIST","value":..}`
    FollowDistance(f64),
    /// `{"type":"RELEASE_AUTONOMY"}`
    ReleaseAutonomy,
    /// `{"type":"CAM_REGISTER"}` or `{"register":..}`
    Register(ConnectionRole),
    /// `{"type":"YOLO"|"CAM_STATUS", ..}`
    Passthrough { kind: Passthrough, raw: Value },
    /// Decoded fine but matches no known combination.
    Unrecognized,
}

impl Inbound {
    /// Classify a decoded JSON value.
    ///
    /// # Errors
    ///
    /// [`RelayError::Malformed`] when a recognised message kind carries
    /// fields of the wrong shape (e.g. `radar.front` is a string or `MODE`
    /// names an unknown mode).
    pub fn classify(value: Value) -> Result<Self, RelayError> {
        if is_sensor_frame(&value) {
            return SensorFrame::decode(&value).map(Inbound::Sensor);
        }

        if let Some(kind) = value.get("type").and_then(Value::as_str) {
            return match kind {
                "ACTUATION" => Ok(Inbound::Manual {
                    kind: ManualKind::Actuation,
                    raw: value,
                }),
                "PAN_TILT" => Ok(Inbound::Manual {
                    kind: ManualKind::PanTilt,
                    raw: value,
                }),
                "AI_CMD" => {
                    let cmd = str_field(&value, "cmd")?;
                    Ok(Move::parse(cmd).map_or(Inbound::Unrecognized, Inbound::Autonomy))
                }
                "MODE" => {
                    let name = str_field(&value, "mode")?;
                    OperatingMode::parse(name)
                        .map(Inbound::ModeChange)
                        .ok_or_else(|| RelayError::Malformed(format!("unknown mode {name:?}")))
                }
                "TARGET_LOCK" => Ok(Inbound::TargetLock {
                    pan: num_field(&value, "pan")?,
                }),
                "FOLLOW_DIST" => Ok(Inbound::FollowDistance(num_field(&value, "value")?)),
                "RELEASE_AUTONOMY" => Ok(Inbound::ReleaseAutonomy),
                "CAM_REGISTER" => Ok(Inbound::Register(ConnectionRole::CameraNode)),
                "YOLO" => Ok(Inbound::Passthrough {
                    kind: Passthrough::Vision,
                    raw: value,
                }),
                "CAM_STATUS" => Ok(Inbound::Passthrough {
                    kind: Passthrough::CameraStatus,
                    raw: value,
                }),
                _ => Ok(Inbound::Unrecognized),
            };
        }

        if let Some(name) = value.get("register").and_then(Value::as_str) {
            return Ok(ConnectionRole::from_registration(name)
                .map_or(Inbound::Unrecognized, Inbound::Register));
        }

        Ok(Inbound::Unrecognized)
    }

    /// The role a frame declares, if it is a registration.  Agrees with
    /// [`classify`][Self::classify] returning [`Inbound::Register`].
    pub fn registration(value: &Value) -> Option<ConnectionRole> {
        if is_sensor_frame(value) {
            return None;
        }
        match value.get("type").and_then(Value::as_str) {
            Some(kind) => (kind == "CAM_REGISTER").then_some(ConnectionRole::CameraNode),
            None => value
                .get("register")
                .and_then(Value::as_str)
                .and_then(ConnectionRole::from_registration),
        }
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Result<&'a str, RelayError> {
    value
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| RelayError::Malformed(format!("missing string field {key:?}")))
}

fn num_field(value: &Value, key: &str) -> Result<f64, RelayError> {
    value
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| RelayError::Malformed(format!("missing numeric field {key:?}")))
}
