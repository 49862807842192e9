use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    registry::AcUnit,
    topics::{encode_topic, status_topic, CommandKind},
    types::Power,
};

pub const CELSIUS_SUFFIX: &str = "°C";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: String,
}

impl OutboundMessage {
    pub fn new(protocol_id: &str, kind: CommandKind, payload: impl Into<String>) -> Self {
        Self {
            topic: encode_topic(protocol_id, kind),
            payload: payload.into(),
        }
    }
}

pub fn power_command(unit: &AcUnit) -> OutboundMessage {
    OutboundMessage::new(
        unit.protocol_id(),
        CommandKind::Power,
        Power::from(unit.power).as_wire(),
    )
}

pub fn mode_command(unit: &AcUnit) -> OutboundMessage {
    OutboundMessage::new(unit.protocol_id(), CommandKind::Mode, unit.mode.as_wire())
}

pub fn fan_command(unit: &AcUnit) -> OutboundMessage {
    OutboundMessage::new(
        unit.protocol_id(),
        CommandKind::FanMode,
        unit.fan_speed.as_wire(),
    )
}

pub fn swing_command(unit: &AcUnit) -> OutboundMessage {
    OutboundMessage::new(
        unit.protocol_id(),
        CommandKind::SwingMode,
        unit.swing.as_wire(),
    )
}

pub fn temperature_command(unit: &AcUnit) -> OutboundMessage {
    OutboundMessage::new(
        unit.protocol_id(),
        CommandKind::Temperature,
        encode_temperature(unit.requested_temperature()),
    )
}

/// Wire form: the plain float, no fixed precision.
pub fn encode_temperature(temp_c: f32) -> String {
    temp_c.to_string()
}

pub fn decode_temperature(value: &str) -> Option<f32> {
    value
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|temp| temp.is_finite())
}

pub fn format_current_temperature(temp_c: f32) -> String {
    format!("{temp_c:.1}{CELSIUS_SUFFIX}")
}

pub fn format_setpoint(temp_c: f32) -> String {
    format!("{temp_c:.0}{CELSIUS_SUFFIX}")
}

/// JSON document published on `<base>/<id>/status`. Every field is optional;
/// enumerations travel as their wire tokens and are decoded leniently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    #[serde(
        default,
        deserialize_with = "lenient_token",
        skip_serializing_if = "Option::is_none"
    )]
    pub power: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_token",
        skip_serializing_if = "Option::is_none"
    )]
    pub mode: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_token",
        skip_serializing_if = "Option::is_none"
    )]
    pub fan_mode: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_token",
        skip_serializing_if = "Option::is_none"
    )]
    pub swing_mode: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_temperature",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_temperature: Option<f32>,
    #[serde(
        default,
        deserialize_with = "lenient_temperature",
        skip_serializing_if = "Option::is_none"
    )]
    pub target_temperature: Option<f32>,
}

impl StatusPayload {
    pub fn from_unit(unit: &AcUnit) -> Self {
        Self {
            power: Some(Power::from(unit.power).as_wire().to_string()),
            mode: Some(unit.mode.as_wire().to_string()),
            fan_mode: Some(unit.fan_speed.as_wire().to_string()),
            swing_mode: Some(unit.swing.as_wire().to_string()),
            current_temperature: Some(unit.current_temperature),
            target_temperature: Some(unit.target_temperature()),
        }
    }

    pub fn decode(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

pub fn status_message(unit: &AcUnit) -> Result<OutboundMessage, serde_json::Error> {
    Ok(OutboundMessage {
        topic: status_topic(unit.protocol_id()),
        payload: StatusPayload::from_unit(unit).encode()?,
    })
}

// A field of the wrong JSON type decodes to an empty token, which the enum
// `from_wire` helpers map to their default. Booleans are read as power states.
fn lenient_token<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(token)) => Some(token),
        Some(serde_json::Value::Bool(on)) => Some(Power::from(on).as_wire().to_string()),
        Some(_) => Some(String::new()),
    })
}

// Bridges publish temperatures either as JSON numbers or as strings.
fn lenient_temperature<'de, D>(deserializer: D) -> Result<Option<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(number)) => number
            .as_f64()
            .map(|temp| temp as f32)
            .filter(|temp| temp.is_finite()),
        Some(serde_json::Value::String(text)) => decode_temperature(&text),
        _ => None,
    })
}
