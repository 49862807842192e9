use serde::{Deserialize, Serialize};

use crate::{
    config::{validate_units, ConfigError, UnitConfig, DEFAULT_TEMP_C, TEMP_MAX_C, TEMP_MIN_C},
    types::{FanSpeed, HvacMode, SwingPosition},
};

/// Position of a unit in the registry. Stable for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub usize);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcUnit {
    #[serde(rename = "name")]
    display_name: String,
    #[serde(rename = "protocolId")]
    protocol_id: String,
    #[serde(rename = "currentTemp")]
    pub current_temperature: f32,
    pub power: bool,
    pub mode: HvacMode,
    #[serde(rename = "fanSpeed")]
    pub fan_speed: FanSpeed,
    pub swing: SwingPosition,
    #[serde(rename = "targetTemp")]
    target_temperature: f32,
    #[serde(rename = "requestedTemp")]
    requested_temperature: f32,
}

impl AcUnit {
    pub fn new(config: &UnitConfig) -> Self {
        Self {
            display_name: config.name.clone(),
            protocol_id: config.protocol_id.clone(),
            current_temperature: DEFAULT_TEMP_C,
            power: false,
            mode: HvacMode::default(),
            fan_speed: FanSpeed::default(),
            swing: SwingPosition::default(),
            target_temperature: DEFAULT_TEMP_C,
            requested_temperature: DEFAULT_TEMP_C,
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn protocol_id(&self) -> &str {
        &self.protocol_id
    }

    pub fn target_temperature(&self) -> f32 {
        self.target_temperature
    }

    pub fn requested_temperature(&self) -> f32 {
        self.requested_temperature
    }

    /// Sets target and requested setpoint together, clamped to the supported range.
    /// Returns whether the stored value changed.
    pub fn set_setpoint(&mut self, temp_c: f32) -> bool {
        if !temp_c.is_finite() {
            return false;
        }
        let clamped = temp_c.clamp(TEMP_MIN_C, TEMP_MAX_C);
        let changed = (self.target_temperature - clamped).abs() > f32::EPSILON
            || (self.requested_temperature - clamped).abs() > f32::EPSILON;
        self.target_temperature = clamped;
        self.requested_temperature = clamped;
        changed
    }

    /// Remote-confirmed setpoint. Leaves the user's requested value alone.
    pub fn set_reported_target(&mut self, temp_c: f32) -> bool {
        if !temp_c.is_finite() {
            return false;
        }
        let clamped = temp_c.clamp(TEMP_MIN_C, TEMP_MAX_C);
        let changed = (self.target_temperature - clamped).abs() > f32::EPSILON;
        self.target_temperature = clamped;
        changed
    }
}

#[derive(Debug, Clone)]
pub struct UnitRegistry {
    units: Vec<AcUnit>,
}

impl UnitRegistry {
    pub fn from_config(units: &[UnitConfig]) -> Result<Self, ConfigError> {
        validate_units(units)?;
        Ok(Self {
            units: units.iter().map(AcUnit::new).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn get(&self, id: UnitId) -> Option<&AcUnit> {
        self.units.get(id.0)
    }

    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut AcUnit> {
        self.units.get_mut(id.0)
    }

    pub fn find_by_protocol_id(&self, protocol_id: &str) -> Option<UnitId> {
        self.units
            .iter()
            .position(|unit| unit.protocol_id == protocol_id)
            .map(UnitId)
    }

    pub fn ids(&self) -> impl Iterator<Item = UnitId> {
        (0..self.units.len()).map(UnitId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (UnitId, &AcUnit)> {
        self.units
            .iter()
            .enumerate()
            .map(|(index, unit)| (UnitId(index), unit))
    }

    pub fn units(&self) -> &[AcUnit] {
        &self.units
    }
}
