use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TEMP_MIN_C: f32 = 16.0;
pub const TEMP_MAX_C: f32 = 30.0;
pub const DEFAULT_TEMP_C: f32 = 22.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no AC units configured")]
    NoUnits,
    #[error("unit #{index} has an empty protocol id")]
    EmptyProtocolId { index: usize },
    #[error("protocol id `{0}` is configured more than once")]
    DuplicateProtocolId(String),
    #[error("protocol id `{0}` may not contain '/', '+' or '#'")]
    InvalidProtocolId(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitConfig {
    pub name: String,
    pub protocol_id: String,
}

impl UnitConfig {
    pub fn new(name: &str, protocol_id: &str) -> Self {
        Self {
            name: name.to_string(),
            protocol_id: protocol_id.to_string(),
        }
    }
}

pub fn default_units() -> Vec<UnitConfig> {
    vec![
        UnitConfig::new("Centrale ruimte", "ac_grote_ruimte_1"),
        UnitConfig::new("Bestuurskamer", "ac_bestuurskamer"),
        UnitConfig::new("Vergaderzaal boven", "ac_vergaderzaal_boven"),
        UnitConfig::new("EHBO", "ac_ehbo"),
        UnitConfig::new("Kleedkamer dames", "ac_kleedkamer_dames"),
        UnitConfig::new(
            "Kleedkamer dames gasten BSO",
            "ac_kleedkamer_dames_gasten_bso",
        ),
        UnitConfig::new("Kleedkamer heren", "ac_kleedkamer_heren"),
        UnitConfig::new("Kleedkamer heren gasten", "ac_kleedkamer_heren_gasten"),
        UnitConfig::new("Scheidsrechters", "ac_scheidsrechters"),
        UnitConfig::new("Materiaalhok binnen", "ac_materiaalhok_binnen"),
        UnitConfig::new("Materiaalhok buiten", "ac_materiaalhok_buiten"),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub units_per_page: usize,
    pub feedback_delay_ms: u64,
    pub notification_ms: u64,
    pub data_update_interval_ms: u64,
    pub connection_check_interval_ms: u64,
    pub mqtt_reconnect_delay_ms: u64,
    pub test_temp_update_ms: u64,
    pub detached: bool,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            units_per_page: 4,
            feedback_delay_ms: 50,
            notification_ms: 1_500,
            data_update_interval_ms: 2_000,
            connection_check_interval_ms: 10_000,
            mqtt_reconnect_delay_ms: 5_000,
            test_temp_update_ms: 30_000,
            detached: false,
        }
    }
}

impl PanelConfig {
    pub fn sanitize(&mut self) {
        self.units_per_page = self.units_per_page.clamp(1, 8);
        self.feedback_delay_ms = self.feedback_delay_ms.min(1_000);
        self.notification_ms = self.notification_ms.clamp(250, 10_000);
        self.data_update_interval_ms = self.data_update_interval_ms.max(250);
        self.connection_check_interval_ms = self.connection_check_interval_ms.max(1_000);
        self.mqtt_reconnect_delay_ms = self.mqtt_reconnect_delay_ms.max(500);
        self.test_temp_update_ms = self.test_temp_update_ms.max(1_000);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub mqtt_client_id: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            mqtt_host: "192.168.1.100".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            mqtt_client_id: "airco-panel".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub panel: PanelConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default = "default_units")]
    pub units: Vec<UnitConfig>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            panel: PanelConfig::default(),
            network: NetworkConfig::default(),
            units: default_units(),
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.panel.sanitize();
        for unit in &mut self.units {
            unit.name = unit.name.trim().to_string();
            unit.protocol_id = unit.protocol_id.trim().to_string();
        }
        if self.network.mqtt_port == 0 {
            self.network.mqtt_port = 1883;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_units(&self.units)
    }
}

pub fn validate_units(units: &[UnitConfig]) -> Result<(), ConfigError> {
    if units.is_empty() {
        return Err(ConfigError::NoUnits);
    }

    for (index, unit) in units.iter().enumerate() {
        if unit.protocol_id.is_empty() {
            return Err(ConfigError::EmptyProtocolId { index });
        }
        if unit.protocol_id.contains(['/', '+', '#']) {
            return Err(ConfigError::InvalidProtocolId(unit.protocol_id.clone()));
        }
        if units[..index]
            .iter()
            .any(|other| other.protocol_id == unit.protocol_id)
        {
            return Err(ConfigError::DuplicateProtocolId(unit.protocol_id.clone()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configuration_is_valid() {
        let runtime = RuntimeConfig::default();
        assert_eq!(runtime.units.len(), 11);
        assert_eq!(runtime.validate(), Ok(()));
    }

    #[test]
    fn rejects_duplicate_protocol_ids() {
        let units = vec![
            UnitConfig::new("EHBO", "ac_ehbo"),
            UnitConfig::new("EHBO 2", "ac_ehbo"),
        ];
        assert_eq!(
            validate_units(&units),
            Err(ConfigError::DuplicateProtocolId("ac_ehbo".to_string()))
        );
    }

    #[test]
    fn rejects_wildcards_and_empty_ids() {
        assert_eq!(validate_units(&[]), Err(ConfigError::NoUnits));
        assert_eq!(
            validate_units(&[UnitConfig::new("a", "")]),
            Err(ConfigError::EmptyProtocolId { index: 0 })
        );
        assert_eq!(
            validate_units(&[UnitConfig::new("a", "ac/+")]),
            Err(ConfigError::InvalidProtocolId("ac/+".to_string()))
        );
    }

    #[test]
    fn sanitize_clamps_panel_values() {
        let mut runtime = RuntimeConfig::default();
        runtime.panel.units_per_page = 0;
        runtime.panel.mqtt_reconnect_delay_ms = 0;
        runtime.network.mqtt_port = 0;
        runtime.units[0].protocol_id = "  ac_grote_ruimte_1 ".to_string();
        runtime.sanitize();

        assert_eq!(runtime.panel.units_per_page, 1);
        assert_eq!(runtime.panel.mqtt_reconnect_delay_ms, 500);
        assert_eq!(runtime.network.mqtt_port, 1883);
        assert_eq!(runtime.units[0].protocol_id, "ac_grote_ruimte_1");
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let runtime: RuntimeConfig =
            serde_json::from_str(r#"{"panel":{"units_per_page":3,"detached":true}}"#).unwrap();
        assert!(runtime.panel.detached);
        assert_eq!(runtime.panel.units_per_page, 3);
        assert_eq!(runtime.panel.feedback_delay_ms, 50);
        assert_eq!(runtime.units, default_units());
        assert_eq!(runtime.network.mqtt_port, 1883);
    }
}
