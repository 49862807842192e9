//! What each screen of the panel shows, independent of the renderer.

use serde::Serialize;

use crate::{
    codec::{format_current_temperature, format_setpoint},
    config::{TEMP_MAX_C, TEMP_MIN_C},
    panel::{OperatingMode, Panel},
    registry::{AcUnit, UnitId, UnitRegistry},
};

pub const APP_TITLE: &str = "AC Bediening HCY";
pub const PAGE_LABEL: &str = "Pagina";
pub const NOTIFY_ALL_ON: &str = "All units turned ON";
pub const NOTIFY_ALL_OFF: &str = "All units turned OFF";
pub const CONFIRM_TITLE: &str = "Confirmation";
pub const CONFIRM_ALL_ON: &str = "Turn ON all AC units?";
pub const CONFIRM_ALL_OFF: &str = "Turn OFF all AC units?";
pub const CONFIRM_LABEL: &str = "Confirm";
pub const CANCEL_LABEL: &str = "Cancel";

pub const COLOR_ACCENT: u32 = 0x3FC1C9;
pub const COLOR_ERROR: u32 = 0xFF5757;
pub const COLOR_WARNING: u32 = 0xFFAA00;
pub const COLOR_OFF_OUTLINE: u32 = 0xAAAAAA;
pub const COLOR_DISABLED: u32 = 0x666666;
pub const COLOR_POWER: u32 = 0xFF0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Screen {
    Main,
    Unit(UnitId),
}

/// Screen stack of the panel. Page and selection are bounds-checked against
/// the registry size passed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigation {
    page: usize,
    screen: Screen,
}

impl Default for Navigation {
    fn default() -> Self {
        Self {
            page: 0,
            screen: Screen::Main,
        }
    }
}

impl Navigation {
    pub fn page(&self) -> usize {
        self.page
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn next_page(&mut self, unit_count: usize, per_page: usize) -> bool {
        if self.page + 1 < total_pages(unit_count, per_page) {
            self.page += 1;
            true
        } else {
            false
        }
    }

    pub fn prev_page(&mut self) -> bool {
        if self.page > 0 {
            self.page -= 1;
            true
        } else {
            false
        }
    }

    pub fn open_unit(&mut self, id: UnitId, unit_count: usize) -> bool {
        if id.0 >= unit_count {
            return false;
        }
        self.screen = Screen::Unit(id);
        true
    }

    pub fn back(&mut self) -> bool {
        let changed = self.screen != Screen::Main;
        self.screen = Screen::Main;
        changed
    }
}

pub fn total_pages(unit_count: usize, per_page: usize) -> usize {
    let per_page = per_page.max(1);
    unit_count.div_ceil(per_page).max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Indicator {
    pub filled: bool,
    pub color: u32,
}

impl Indicator {
    pub fn for_unit(unit: &AcUnit) -> Self {
        if unit.power {
            Self {
                filled: true,
                color: unit.mode.color(),
            }
        } else {
            Self {
                filled: false,
                color: COLOR_OFF_OUTLINE,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitCard {
    pub unit: UnitId,
    pub name: String,
    pub temperature: String,
    pub indicator: Indicator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connectivity {
    pub wifi: bool,
    pub mqtt: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusIcons {
    pub wifi_color: u32,
    pub mqtt_color: u32,
    pub test_mode_visible: bool,
    pub test_mode_color: u32,
}

impl StatusIcons {
    pub fn new(connectivity: Connectivity, mode: OperatingMode) -> Self {
        let color = |ok: bool| if ok { COLOR_ACCENT } else { COLOR_ERROR };
        Self {
            wifi_color: color(connectivity.wifi),
            mqtt_color: color(connectivity.wifi && connectivity.mqtt),
            test_mode_visible: mode == OperatingMode::Detached,
            test_mode_color: COLOR_WARNING,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MainScreen {
    pub title: &'static str,
    pub page_indicator: String,
    pub cards: Vec<UnitCard>,
    pub prev_enabled: bool,
    pub next_enabled: bool,
    pub icons: StatusIcons,
}

impl MainScreen {
    pub fn build(panel: &Panel, page: usize, connectivity: Connectivity) -> Self {
        let registry = panel.registry();
        let per_page = panel.config().units_per_page.max(1);
        let pages = total_pages(registry.len(), per_page);
        let page = page.min(pages - 1);

        let cards = registry
            .iter()
            .skip(page * per_page)
            .take(per_page)
            .map(|(id, unit)| UnitCard {
                unit: id,
                name: unit.display_name().to_string(),
                temperature: format_current_temperature(unit.current_temperature),
                indicator: Indicator::for_unit(unit),
            })
            .collect();

        Self {
            title: APP_TITLE,
            page_indicator: format!("{PAGE_LABEL} {}/{pages}", page + 1),
            cards,
            prev_enabled: page > 0,
            next_enabled: page + 1 < pages,
            icons: StatusIcons::new(connectivity, panel.mode()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitScreen {
    pub unit: UnitId,
    pub title: String,
    pub power: bool,
    pub power_button_enabled: bool,
    pub power_button_color: u32,
    pub setpoint: String,
    pub current_temperature: String,
    pub mode: &'static str,
    pub mode_color: u32,
    pub fan_speed: &'static str,
    pub swing: &'static str,
    pub fan_enabled: bool,
    pub swing_enabled: bool,
    pub minus_enabled: bool,
    pub plus_enabled: bool,
}

impl UnitScreen {
    pub fn build(registry: &UnitRegistry, id: UnitId) -> Option<Self> {
        let unit = registry.get(id)?;
        let target = unit.target_temperature();

        Some(Self {
            unit: id,
            title: unit.display_name().to_string(),
            power: unit.power,
            // Power only switches a running unit off; selecting a mode turns it on.
            power_button_enabled: unit.power,
            power_button_color: if unit.power { COLOR_POWER } else { COLOR_DISABLED },
            setpoint: format_setpoint(target),
            current_temperature: format_current_temperature(unit.current_temperature),
            mode: if unit.power {
                unit.mode.display_name()
            } else {
                "OFF"
            },
            mode_color: if unit.power {
                unit.mode.color()
            } else {
                COLOR_DISABLED
            },
            fan_speed: unit.fan_speed.display_name(),
            swing: unit.swing.display_name(),
            fan_enabled: unit.power,
            swing_enabled: unit.power,
            minus_enabled: target > TEMP_MIN_C,
            plus_enabled: target < TEMP_MAX_C,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub text: &'static str,
    pub color: u32,
    pub duration_ms: u64,
}

impl Notification {
    pub fn all_power(on: bool, duration_ms: u64) -> Self {
        if on {
            Self {
                text: NOTIFY_ALL_ON,
                color: COLOR_ACCENT,
                duration_ms,
            }
        } else {
            Self {
                text: NOTIFY_ALL_OFF,
                color: COLOR_ERROR,
                duration_ms,
            }
        }
    }
}

/// Prompt shown before a master ALL ON / ALL OFF is carried out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub title: &'static str,
    pub text: &'static str,
    pub cancel_label: &'static str,
    pub confirm_label: &'static str,
}

impl Confirmation {
    pub fn all_power(on: bool) -> Self {
        Self {
            title: CONFIRM_TITLE,
            text: if on { CONFIRM_ALL_ON } else { CONFIRM_ALL_OFF },
            cancel_label: CANCEL_LABEL,
            confirm_label: CONFIRM_LABEL,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        config::RuntimeConfig,
        panel::{PanelEvent, TempStep},
        types::HvacMode,
    };

    const ONLINE: Connectivity = Connectivity {
        wifi: true,
        mqtt: true,
    };

    fn panel() -> Panel {
        Panel::new(&RuntimeConfig::default()).unwrap()
    }

    #[test]
    fn eleven_units_span_three_pages() {
        assert_eq!(total_pages(11, 4), 3);
        assert_eq!(total_pages(0, 4), 1);
        assert_eq!(total_pages(8, 4), 2);
    }

    #[test]
    fn last_page_holds_remaining_cards() {
        let panel = panel();
        let screen = MainScreen::build(&panel, 2, ONLINE);

        assert_eq!(screen.page_indicator, "Pagina 3/3");
        assert_eq!(screen.cards.len(), 3);
        assert_eq!(screen.cards[0].name, "Scheidsrechters");
        assert!(screen.prev_enabled);
        assert!(!screen.next_enabled);
    }

    #[test]
    fn page_beyond_range_is_clamped() {
        let screen = MainScreen::build(&panel(), 9, ONLINE);
        assert_eq!(screen.page_indicator, "Pagina 3/3");
    }

    #[test]
    fn card_shows_temperature_and_mode_colour() {
        let mut panel = panel();
        panel.handle(PanelEvent::SelectMode(UnitId(0), HvacMode::Heat));

        let screen = MainScreen::build(&panel, 0, ONLINE);

        assert_eq!(screen.cards[0].temperature, "22.0°C");
        assert_eq!(
            screen.cards[0].indicator,
            Indicator {
                filled: true,
                color: 0xFF8100
            }
        );
        assert_eq!(
            screen.cards[1].indicator,
            Indicator {
                filled: false,
                color: COLOR_OFF_OUTLINE
            }
        );
    }

    #[test]
    fn icons_reflect_connectivity() {
        let icons = StatusIcons::new(
            Connectivity {
                wifi: true,
                mqtt: false,
            },
            OperatingMode::Connected,
        );
        assert_eq!(icons.wifi_color, COLOR_ACCENT);
        assert_eq!(icons.mqtt_color, COLOR_ERROR);
        assert!(!icons.test_mode_visible);

        let icons = StatusIcons::new(ONLINE, OperatingMode::Detached);
        assert!(icons.test_mode_visible);
    }

    #[test]
    fn unit_screen_disables_controls_when_off() {
        let panel = panel();
        let screen = UnitScreen::build(panel.registry(), UnitId(3)).unwrap();

        assert_eq!(screen.title, "EHBO");
        assert_eq!(screen.setpoint, "22°C");
        assert_eq!(screen.mode, "OFF");
        assert!(!screen.power_button_enabled);
        assert!(!screen.fan_enabled);
        assert!(!screen.swing_enabled);
    }

    #[test]
    fn unit_screen_limits_temperature_buttons() {
        let mut panel = panel();
        panel.handle(PanelEvent::SetTemperature(UnitId(3), 30.0));
        panel.handle(PanelEvent::StepTemperature(UnitId(3), TempStep::Up));

        let screen = UnitScreen::build(panel.registry(), UnitId(3)).unwrap();
        assert_eq!(screen.setpoint, "30°C");
        assert!(!screen.plus_enabled);
        assert!(screen.minus_enabled);

        assert!(UnitScreen::build(panel.registry(), UnitId(11)).is_none());
    }

    #[test]
    fn navigation_stays_in_bounds() {
        let mut nav = Navigation::default();
        assert!(!nav.prev_page());
        assert!(nav.next_page(11, 4));
        assert!(nav.next_page(11, 4));
        assert!(!nav.next_page(11, 4));
        assert_eq!(nav.page(), 2);

        assert!(!nav.open_unit(UnitId(11), 11));
        assert_eq!(nav.screen(), Screen::Main);
        assert!(nav.open_unit(UnitId(10), 11));
        assert_eq!(nav.screen(), Screen::Unit(UnitId(10)));
        assert!(nav.back());
        assert_eq!(nav.screen(), Screen::Main);
        assert!(!nav.back());
    }

    #[test]
    fn notifications_match_master_control() {
        assert_eq!(Notification::all_power(true, 1_500).text, NOTIFY_ALL_ON);
        assert_eq!(Notification::all_power(false, 1_500).color, COLOR_ERROR);

        let prompt = Confirmation::all_power(false);
        assert_eq!(prompt.title, "Confirmation");
        assert_eq!(prompt.text, "Turn OFF all AC units?");
        assert_eq!(Confirmation::all_power(true).text, CONFIRM_ALL_ON);
    }
}
