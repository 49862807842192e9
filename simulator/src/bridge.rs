//! Command handling of a simulated AC bridge.

use airco_common::{
    codec::decode_temperature, parse_topic, CommandKind, FanSpeed, HvacMode, Power,
    SwingPosition, UnitId, UnitRegistry,
};
use thiserror::Error;

/// Room temperature the units drift towards while switched off.
const AMBIENT_TEMP_C: f32 = 24.0;
const DRIFT_STEP_C: f32 = 0.5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("not a command topic: {0}")]
    NotACommand(String),
    #[error("unknown unit `{0}`")]
    UnknownUnit(String),
    #[error("invalid {kind} payload `{payload}`")]
    InvalidPayload { kind: &'static str, payload: String },
}

/// Applies one command message. Returns the unit whose status should be republished.
pub fn apply_command(
    registry: &mut UnitRegistry,
    topic: &str,
    payload: &str,
) -> Result<UnitId, CommandError> {
    let Some((protocol_id, kind)) = parse_topic(topic) else {
        return Err(CommandError::NotACommand(topic.to_string()));
    };

    let id = registry
        .find_by_protocol_id(protocol_id)
        .ok_or_else(|| CommandError::UnknownUnit(protocol_id.to_string()))?;
    let invalid = |kind: &'static str| CommandError::InvalidPayload {
        kind,
        payload: payload.to_string(),
    };
    let Some(unit) = registry.get_mut(id) else {
        return Err(CommandError::UnknownUnit(protocol_id.to_string()));
    };

    match kind {
        CommandKind::Power => {
            unit.power = Power::parse_wire(payload).ok_or_else(|| invalid("power"))?.is_on();
        }
        CommandKind::Mode => {
            unit.mode = HvacMode::parse_wire(payload).ok_or_else(|| invalid("mode"))?;
            unit.power = true;
        }
        CommandKind::FanMode => {
            unit.fan_speed = FanSpeed::parse_wire(payload).ok_or_else(|| invalid("fan_mode"))?;
        }
        CommandKind::SwingMode => {
            unit.swing = SwingPosition::parse_wire(payload).ok_or_else(|| invalid("swing_mode"))?;
        }
        CommandKind::Temperature => {
            let temp_c = decode_temperature(payload).ok_or_else(|| invalid("temperature"))?;
            unit.set_setpoint(temp_c);
        }
        CommandKind::Status => return Err(CommandError::NotACommand(topic.to_string())),
    }

    Ok(id)
}

/// Moves each room temperature one step towards the setpoint when running,
/// or towards ambient when off.
pub fn drift_temperatures(registry: &mut UnitRegistry) {
    for id in registry.ids().collect::<Vec<_>>() {
        let Some(unit) = registry.get_mut(id) else {
            continue;
        };
        let goal = if unit.power && unit.mode != HvacMode::FanOnly {
            unit.target_temperature()
        } else {
            AMBIENT_TEMP_C
        };
        let delta = goal - unit.current_temperature;
        unit.current_temperature += delta.clamp(-DRIFT_STEP_C, DRIFT_STEP_C);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use airco_common::config::default_units;

    fn registry() -> UnitRegistry {
        UnitRegistry::from_config(&default_units()).unwrap()
    }

    #[test]
    fn mode_command_switches_unit_on() {
        let mut registry = registry();

        let id = apply_command(&mut registry, "hcy/airco/ac_ehbo/command/mode", "heat").unwrap();

        let unit = registry.get(id).unwrap();
        assert_eq!(id, UnitId(3));
        assert!(unit.power);
        assert_eq!(unit.mode, HvacMode::Heat);
    }

    #[test]
    fn temperature_command_is_clamped() {
        let mut registry = registry();

        apply_command(
            &mut registry,
            "hcy/airco/ac_ehbo/command/temperature",
            "35",
        )
        .unwrap();

        assert_eq!(registry.get(UnitId(3)).unwrap().target_temperature(), 30.0);
    }

    #[test]
    fn rejects_unknown_units_and_payloads() {
        let mut registry = registry();

        assert_eq!(
            apply_command(&mut registry, "hcy/airco/ac_kantine/command/power", "on"),
            Err(CommandError::UnknownUnit("ac_kantine".to_string()))
        );
        assert_eq!(
            apply_command(&mut registry, "hcy/airco/ac_ehbo/command/fan_mode", "turbo"),
            Err(CommandError::InvalidPayload {
                kind: "fan_mode",
                payload: "turbo".to_string()
            })
        );
        assert!(matches!(
            apply_command(&mut registry, "hcy/airco/ac_ehbo/status", "{}"),
            Err(CommandError::NotACommand(_))
        ));
        assert_eq!(registry.get(UnitId(3)).unwrap().fan_speed, FanSpeed::Low);
    }

    #[test]
    fn running_unit_drifts_towards_setpoint() {
        let mut registry = registry();
        apply_command(&mut registry, "hcy/airco/ac_ehbo/command/mode", "cool").unwrap();
        apply_command(
            &mut registry,
            "hcy/airco/ac_ehbo/command/temperature",
            "21",
        )
        .unwrap();

        drift_temperatures(&mut registry);
        assert_eq!(registry.get(UnitId(3)).unwrap().current_temperature, 21.5);
        drift_temperatures(&mut registry);
        drift_temperatures(&mut registry);
        assert_eq!(registry.get(UnitId(3)).unwrap().current_temperature, 21.0);

        // Off units warm up to ambient.
        assert_eq!(registry.get(UnitId(0)).unwrap().current_temperature, 23.5);
    }
}
