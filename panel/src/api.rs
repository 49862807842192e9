//! Request parsing shared by the host and ESP32 HTTP front-ends.

use airco_common::{
    codec::decode_temperature, Connectivity, FanSpeed, HvacMode, MainScreen, Navigation,
    Notification, OperatingMode, Outcome, Panel, PanelEvent, Power, Screen, SwingPosition,
    TempStep, UnitId, UnitScreen,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("Missing 'value' parameter")]
    MissingValue,
    #[error("Invalid unit index")]
    InvalidIndex,
    #[error("Unknown unit")]
    UnknownUnit,
    #[error("Unknown action")]
    UnknownAction,
    #[error("Invalid power value. Use 'on', 'off' or 'toggle'")]
    InvalidPower,
    #[error("Invalid mode. Use cool, heat, fan_only, auto or dry")]
    InvalidMode,
    #[error("Invalid fan speed. Use low, medium, high or powerful")]
    InvalidFan,
    #[error("Invalid swing. Use swing or position_1..position_4")]
    InvalidSwing,
    #[error("Invalid temperature value")]
    InvalidTemperature,
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::UnknownUnit | Self::UnknownAction => 404,
            _ => 400,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelStatus {
    pub mode: &'static str,
    pub wifi_connected: bool,
    pub mqtt_connected: bool,
    pub unit_count: usize,
}

impl PanelStatus {
    pub fn new(mode: OperatingMode, wifi: bool, mqtt: bool, unit_count: usize) -> Self {
        Self {
            mode: mode.as_str(),
            wifi_connected: wifi,
            mqtt_connected: mqtt,
            unit_count,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub accepted: bool,
    pub changed: bool,
    pub unit: UnitScreen,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterResponse {
    pub changed: bool,
    pub published: usize,
    pub notification: Notification,
}

impl MasterResponse {
    pub fn new(outcome: &Outcome, on: bool, notification_ms: u64) -> Self {
        Self {
            changed: outcome.changed,
            published: outcome.publishes().count(),
            notification: Notification::all_power(on, notification_ms),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationResponse {
    pub changed: bool,
    pub page: usize,
    pub screen: Screen,
}

impl NavigationResponse {
    pub fn new(navigation: &Navigation, changed: bool) -> Self {
        Self {
            changed,
            page: navigation.page(),
            screen: navigation.screen(),
        }
    }
}

/// Whatever the panel currently shows, tagged with `"screen": "main" | "unit"`.
#[derive(Debug, Serialize)]
#[serde(tag = "screen", rename_all = "camelCase")]
pub enum CurrentScreen {
    Main(MainScreen),
    Unit(UnitScreen),
}

impl CurrentScreen {
    pub fn build(panel: &Panel, navigation: &Navigation, connectivity: Connectivity) -> Self {
        if let Screen::Unit(id) = navigation.screen() {
            if let Some(screen) = UnitScreen::build(panel.registry(), id) {
                return Self::Unit(screen);
            }
        }
        Self::Main(MainScreen::build(panel, navigation.page(), connectivity))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationAction {
    NextPage,
    PrevPage,
    OpenUnit(UnitId),
    Back,
}

impl NavigationAction {
    /// Maps `/api/navigation/<action>[?value=<index>]`.
    pub fn parse(action: &str, value: Option<&str>, unit_count: usize) -> Result<Self, ApiError> {
        match action {
            "next" => Ok(Self::NextPage),
            "prev" => Ok(Self::PrevPage),
            "back" => Ok(Self::Back),
            "open" => parse_unit_index(value.ok_or(ApiError::MissingValue)?, unit_count)
                .map(Self::OpenUnit),
            _ => Err(ApiError::UnknownAction),
        }
    }

    /// Returns whether the page or screen changed.
    pub fn apply(self, navigation: &mut Navigation, unit_count: usize, per_page: usize) -> bool {
        match self {
            Self::NextPage => navigation.next_page(unit_count, per_page),
            Self::PrevPage => navigation.prev_page(),
            Self::OpenUnit(id) => navigation.open_unit(id, unit_count),
            Self::Back => navigation.back(),
        }
    }
}

pub fn parse_unit_index(raw: &str, unit_count: usize) -> Result<UnitId, ApiError> {
    let index = raw
        .trim()
        .parse::<usize>()
        .map_err(|_| ApiError::InvalidIndex)?;
    if index >= unit_count {
        return Err(ApiError::UnknownUnit);
    }
    Ok(UnitId(index))
}

/// Maps `<action>[?value=..]` under `/api/units/{index}/` to a panel event.
pub fn parse_unit_event(
    id: UnitId,
    action: &str,
    value: Option<&str>,
) -> Result<PanelEvent, ApiError> {
    match action {
        "power" => match value.ok_or(ApiError::MissingValue)?.trim() {
            v if v.eq_ignore_ascii_case("toggle") => Ok(PanelEvent::TogglePower(id)),
            v => Power::parse_wire(v)
                .map(|power| PanelEvent::SetPower(id, power.is_on()))
                .ok_or(ApiError::InvalidPower),
        },
        "mode" => HvacMode::parse_wire(value.ok_or(ApiError::MissingValue)?)
            .map(|mode| PanelEvent::SelectMode(id, mode))
            .ok_or(ApiError::InvalidMode),
        "fan" => FanSpeed::parse_wire(value.ok_or(ApiError::MissingValue)?)
            .map(|speed| PanelEvent::SelectFanSpeed(id, speed))
            .ok_or(ApiError::InvalidFan),
        "swing" => SwingPosition::parse_wire(value.ok_or(ApiError::MissingValue)?)
            .map(|swing| PanelEvent::SelectSwing(id, swing))
            .ok_or(ApiError::InvalidSwing),
        "temperature/up" => Ok(PanelEvent::StepTemperature(id, TempStep::Up)),
        "temperature/down" => Ok(PanelEvent::StepTemperature(id, TempStep::Down)),
        "temperature" => {
            let raw = value.ok_or(ApiError::MissingValue)?;
            let temp_c = decode_temperature(raw).ok_or(ApiError::InvalidTemperature)?;
            Ok(PanelEvent::SetTemperature(id, temp_c))
        }
        _ => Err(ApiError::UnknownAction),
    }
}

/// Splits `/api/units/3/temperature/up?x=y` into `("3", Some("temperature/up"))`.
#[cfg_attr(not(feature = "esp32"), allow(dead_code))]
pub fn split_unit_path(uri: &str) -> Option<(&str, Option<&str>)> {
    let rest = strip_route(uri, "/api/units/")?;
    Some(match rest.split_once('/') {
        Some((index, action)) => (index, Some(action)),
        None => (rest, None),
    })
}

/// `/api/navigation/next?x=y` -> `next`.
#[cfg_attr(not(feature = "esp32"), allow(dead_code))]
pub fn navigation_path_action(uri: &str) -> Option<&str> {
    strip_route(uri, "/api/navigation/").filter(|action| !action.contains('/'))
}

#[cfg_attr(not(feature = "esp32"), allow(dead_code))]
fn strip_route<'a>(uri: &'a str, prefix: &str) -> Option<&'a str> {
    let path = uri.split_once('?').map_or(uri, |(path, _)| path);
    let rest = path.strip_prefix(prefix)?.trim_end_matches('/');
    (!rest.is_empty()).then_some(rest)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn unit_index_is_bounds_checked() {
        assert_eq!(parse_unit_index("3", 11), Ok(UnitId(3)));
        assert_eq!(parse_unit_index("11", 11), Err(ApiError::UnknownUnit));
        assert_eq!(parse_unit_index("x", 11), Err(ApiError::InvalidIndex));
        assert_eq!(parse_unit_index("-1", 11), Err(ApiError::InvalidIndex));
    }

    #[test]
    fn maps_actions_to_events() {
        let id = UnitId(3);

        assert_eq!(
            parse_unit_event(id, "power", Some("toggle")),
            Ok(PanelEvent::TogglePower(id))
        );
        assert_eq!(
            parse_unit_event(id, "power", Some("OFF")),
            Ok(PanelEvent::SetPower(id, false))
        );
        assert_eq!(
            parse_unit_event(id, "mode", Some("fan_only")),
            Ok(PanelEvent::SelectMode(id, HvacMode::FanOnly))
        );
        assert_eq!(
            parse_unit_event(id, "swing", Some("position_2")),
            Ok(PanelEvent::SelectSwing(id, SwingPosition::Position2))
        );
        assert_eq!(
            parse_unit_event(id, "temperature/down", None),
            Ok(PanelEvent::StepTemperature(id, TempStep::Down))
        );
        assert_eq!(
            parse_unit_event(id, "temperature", Some("21.5")),
            Ok(PanelEvent::SetTemperature(id, 21.5))
        );
    }

    #[test]
    fn rejects_bad_values() {
        let id = UnitId(0);

        assert_eq!(
            parse_unit_event(id, "mode", Some("turbo")),
            Err(ApiError::InvalidMode)
        );
        assert_eq!(
            parse_unit_event(id, "fan", None),
            Err(ApiError::MissingValue)
        );
        assert_eq!(
            parse_unit_event(id, "temperature", Some("warm")),
            Err(ApiError::InvalidTemperature)
        );
        assert_eq!(
            parse_unit_event(id, "defrost", None),
            Err(ApiError::UnknownAction)
        );
        assert_eq!(ApiError::UnknownAction.status_code(), 404);
        assert_eq!(ApiError::InvalidMode.status_code(), 400);
    }

    #[test]
    fn navigation_actions_move_through_pages_and_screens() {
        let mut navigation = Navigation::default();

        assert_eq!(
            NavigationAction::parse("open", None, 11),
            Err(ApiError::MissingValue)
        );
        assert_eq!(
            NavigationAction::parse("open", Some("12"), 11),
            Err(ApiError::UnknownUnit)
        );
        assert_eq!(
            NavigationAction::parse("sideways", None, 11),
            Err(ApiError::UnknownAction)
        );

        let next = NavigationAction::parse("next", None, 11).unwrap();
        assert!(next.apply(&mut navigation, 11, 4));
        assert!(next.apply(&mut navigation, 11, 4));
        assert!(!next.apply(&mut navigation, 11, 4));

        let open = NavigationAction::parse("open", Some("9"), 11).unwrap();
        assert!(open.apply(&mut navigation, 11, 4));
        assert_eq!(navigation.screen(), Screen::Unit(UnitId(9)));
        assert!(NavigationAction::Back.apply(&mut navigation, 11, 4));

        let response = NavigationResponse::new(&navigation, true);
        assert_eq!(response.page, 2);
        assert_eq!(response.screen, Screen::Main);
    }

    #[test]
    fn current_screen_follows_navigation() {
        let panel = Panel::new(&airco_common::RuntimeConfig::default()).unwrap();
        let connectivity = Connectivity {
            wifi: true,
            mqtt: false,
        };
        let mut navigation = Navigation::default();

        let main = serde_json::to_value(CurrentScreen::build(&panel, &navigation, connectivity))
            .unwrap();
        assert_eq!(main["screen"], "main");

        navigation.open_unit(UnitId(3), panel.registry().len());
        let unit = serde_json::to_value(CurrentScreen::build(&panel, &navigation, connectivity))
            .unwrap();
        assert_eq!(unit["screen"], "unit");
        assert_eq!(unit["unit"], 3);
    }

    #[test]
    fn splits_unit_paths() {
        assert_eq!(split_unit_path("/api/units/4"), Some(("4", None)));
        assert_eq!(
            split_unit_path("/api/units/4/temperature/up?x=1"),
            Some(("4", Some("temperature/up")))
        );
        assert_eq!(
            split_unit_path("/api/units/10/mode?value=heat"),
            Some(("10", Some("mode")))
        );
        assert_eq!(split_unit_path("/api/units/"), None);
        assert_eq!(split_unit_path("/api/status"), None);
        assert_eq!(navigation_path_action("/api/navigation/open?value=2"), Some("open"));
        assert_eq!(navigation_path_action("/api/navigation/"), None);
    }
}
