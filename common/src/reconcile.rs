use crate::{
    codec::StatusPayload,
    registry::{UnitId, UnitRegistry},
    topics::{parse_topic, CommandKind},
    types::{FanSpeed, HvacMode, Power, SwingPosition},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// Status applied; `changed` is false when the record already matched.
    Applied { unit: UnitId, changed: bool },
    UnknownUnit { protocol_id: String },
    Malformed { unit: UnitId, reason: String },
    /// Not a status topic of this installation.
    Ignored,
}

/// Applies an inbound status message to the matching unit record.
pub fn reconcile(registry: &mut UnitRegistry, topic: &str, payload: &str) -> Reconciliation {
    let Some((protocol_id, CommandKind::Status)) = parse_topic(topic) else {
        return Reconciliation::Ignored;
    };

    let Some(id) = registry.find_by_protocol_id(protocol_id) else {
        return Reconciliation::UnknownUnit {
            protocol_id: protocol_id.to_string(),
        };
    };

    let status = match StatusPayload::decode(payload) {
        Ok(status) => status,
        Err(err) => {
            return Reconciliation::Malformed {
                unit: id,
                reason: err.to_string(),
            }
        }
    };

    let changed = apply_status(registry, id, &status);
    Reconciliation::Applied { unit: id, changed }
}

pub fn apply_status(registry: &mut UnitRegistry, id: UnitId, status: &StatusPayload) -> bool {
    let Some(unit) = registry.get_mut(id) else {
        return false;
    };
    let before = unit.clone();

    if let Some(power) = status.power.as_deref() {
        unit.power = Power::from_wire(power).is_on();
    }
    if let Some(mode) = status.mode.as_deref() {
        unit.mode = HvacMode::from_wire(mode);
    }
    if let Some(fan) = status.fan_mode.as_deref() {
        unit.fan_speed = FanSpeed::from_wire(fan);
    }
    if let Some(swing) = status.swing_mode.as_deref() {
        unit.swing = SwingPosition::from_wire(swing);
    }
    if let Some(temp) = status.current_temperature {
        unit.current_temperature = temp;
    }
    if let Some(temp) = status.target_temperature {
        unit.set_reported_target(temp);
    }

    *unit != before
}
