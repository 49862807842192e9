use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    #[default]
    Cool,
    Heat,
    FanOnly,
    Auto,
    Dry,
}

impl HvacMode {
    pub const ALL: [Self; 5] = [Self::Cool, Self::Heat, Self::FanOnly, Self::Auto, Self::Dry];

    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Cool => "cool",
            Self::Heat => "heat",
            Self::FanOnly => "fan_only",
            Self::Auto => "auto",
            Self::Dry => "dry",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Cool => "Koelen",
            Self::Heat => "Verwarmen",
            Self::FanOnly => "Ventilatie",
            Self::Auto => "Auto",
            Self::Dry => "Drogen",
        }
    }

    /// Indicator colour (RGB) used on unit cards and mode buttons.
    pub fn color(self) -> u32 {
        match self {
            Self::Cool => 0x2B9AF9,
            Self::Heat => 0xFF8100,
            Self::FanOnly => 0x8A8A8A,
            Self::Auto => 0x008000,
            Self::Dry => 0xEFBD07,
        }
    }

    pub fn parse_wire(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_wire().eq_ignore_ascii_case(value))
    }

    /// Lenient decode: unknown tokens fall back to `Cool`.
    pub fn from_wire(value: &str) -> Self {
        Self::parse_wire(value).unwrap_or_default()
    }

    pub fn index(self) -> usize {
        match self {
            Self::Cool => 0,
            Self::Heat => 1,
            Self::FanOnly => 2,
            Self::Auto => 3,
            Self::Dry => 4,
        }
    }

    pub fn from_index(index: usize) -> Self {
        Self::ALL.get(index).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanSpeed {
    #[default]
    Low,
    Medium,
    High,
    Powerful,
}

impl FanSpeed {
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Powerful];

    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Powerful => "powerful",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Low => "Laag",
            Self::Medium => "Gemiddeld",
            Self::High => "Hoog",
            Self::Powerful => "Krachtig",
        }
    }

    pub fn parse_wire(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|speed| speed.as_wire().eq_ignore_ascii_case(value))
    }

    /// Lenient decode: unknown tokens fall back to `Low`.
    pub fn from_wire(value: &str) -> Self {
        Self::parse_wire(value).unwrap_or_default()
    }

    pub fn index(self) -> usize {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Powerful => 3,
        }
    }

    pub fn from_index(index: usize) -> Self {
        Self::ALL.get(index).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwingPosition {
    #[default]
    Swing,
    #[serde(rename = "position_1")]
    Position1,
    #[serde(rename = "position_2")]
    Position2,
    #[serde(rename = "position_3")]
    Position3,
    #[serde(rename = "position_4")]
    Position4,
}

impl SwingPosition {
    pub const ALL: [Self; 5] = [
        Self::Swing,
        Self::Position1,
        Self::Position2,
        Self::Position3,
        Self::Position4,
    ];

    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Swing => "swing",
            Self::Position1 => "position_1",
            Self::Position2 => "position_2",
            Self::Position3 => "position_3",
            Self::Position4 => "position_4",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Swing => "Swing",
            Self::Position1 => "Positie 1",
            Self::Position2 => "Positie 2",
            Self::Position3 => "Positie 3",
            Self::Position4 => "Positie 4",
        }
    }

    pub fn parse_wire(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|swing| swing.as_wire().eq_ignore_ascii_case(value))
    }

    /// Lenient decode: unknown tokens fall back to `Swing`.
    pub fn from_wire(value: &str) -> Self {
        Self::parse_wire(value).unwrap_or_default()
    }

    pub fn index(self) -> usize {
        match self {
            Self::Swing => 0,
            Self::Position1 => 1,
            Self::Position2 => 2,
            Self::Position3 => 3,
            Self::Position4 => 4,
        }
    }

    pub fn from_index(index: usize) -> Self {
        Self::ALL.get(index).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Power {
    On,
    Off,
}

impl Power {
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }

    pub fn parse_wire(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "on" | "true" | "1" => Some(Self::On),
            "off" | "false" | "0" => Some(Self::Off),
            _ => None,
        }
    }

    /// Lenient decode: anything unrecognised reads as off.
    pub fn from_wire(value: &str) -> Self {
        Self::parse_wire(value).unwrap_or(Self::Off)
    }

    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

impl From<bool> for Power {
    fn from(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_tokens_round_trip() {
        for mode in HvacMode::ALL {
            assert_eq!(HvacMode::from_wire(mode.as_wire()), mode);
            assert_eq!(HvacMode::from_index(mode.index()), mode);
        }
    }

    #[test]
    fn fan_tokens_round_trip() {
        for speed in FanSpeed::ALL {
            assert_eq!(FanSpeed::from_wire(speed.as_wire()), speed);
            assert_eq!(FanSpeed::from_index(speed.index()), speed);
        }
    }

    #[test]
    fn swing_tokens_round_trip() {
        for swing in SwingPosition::ALL {
            assert_eq!(SwingPosition::from_wire(swing.as_wire()), swing);
            assert_eq!(SwingPosition::from_index(swing.index()), swing);
        }
    }

    #[test]
    fn unknown_tokens_fall_back_to_first_enumerator() {
        assert_eq!(HvacMode::from_wire("garbage"), HvacMode::Cool);
        assert_eq!(FanSpeed::from_wire("garbage"), FanSpeed::Low);
        assert_eq!(SwingPosition::from_wire("garbage"), SwingPosition::Swing);
        assert_eq!(Power::from_wire("garbage"), Power::Off);

        assert_eq!(HvacMode::parse_wire("garbage"), None);
        assert_eq!(FanSpeed::parse_wire(""), None);
    }

    #[test]
    fn decoding_ignores_case_and_padding() {
        assert_eq!(HvacMode::from_wire(" FAN_ONLY\n"), HvacMode::FanOnly);
        assert_eq!(FanSpeed::from_wire("Powerful"), FanSpeed::Powerful);
        assert_eq!(Power::from_wire("ON"), Power::On);
    }

    #[test]
    fn out_of_range_indices_clamp_to_default() {
        assert_eq!(HvacMode::from_index(5), HvacMode::Cool);
        assert_eq!(FanSpeed::from_index(4), FanSpeed::Low);
        assert_eq!(SwingPosition::from_index(usize::MAX), SwingPosition::Swing);
    }

    #[test]
    fn serde_uses_wire_tokens() {
        assert_eq!(
            serde_json::to_string(&SwingPosition::Position3).unwrap(),
            "\"position_3\""
        );
        assert_eq!(
            serde_json::to_string(&HvacMode::FanOnly).unwrap(),
            "\"fan_only\""
        );
    }
}
