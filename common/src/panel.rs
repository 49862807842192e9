use crate::{
    codec::{
        fan_command, mode_command, power_command, swing_command, temperature_command,
        OutboundMessage,
    },
    config::{ConfigError, PanelConfig, RuntimeConfig, TEMP_MAX_C, TEMP_MIN_C},
    reconcile::{reconcile, Reconciliation},
    registry::{UnitId, UnitRegistry},
    types::{FanSpeed, HvacMode, SwingPosition},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    /// No broker: changes are applied locally only.
    Detached,
    /// Changes are applied optimistically and published fire-and-forget.
    Connected,
}

impl OperatingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Detached => "detached",
            Self::Connected => "connected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempStep {
    Up,
    Down,
}

impl TempStep {
    fn delta(self) -> f32 {
        match self {
            Self::Up => 1.0,
            Self::Down => -1.0,
        }
    }
}

/// A user gesture, addressed to a unit explicitly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PanelEvent {
    TogglePower(UnitId),
    SetPower(UnitId, bool),
    SelectMode(UnitId, HvacMode),
    SelectFanSpeed(UnitId, FanSpeed),
    SelectSwing(UnitId, SwingPosition),
    StepTemperature(UnitId, TempStep),
    SetTemperature(UnitId, f32),
    SetAllPower(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelAction {
    Publish(OutboundMessage),
    Delay(u64),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Whether the event was accepted. Rejected events leave the registry untouched.
    pub accepted: bool,
    /// Whether any record field changed value.
    pub changed: bool,
    pub actions: Vec<PanelAction>,
}

impl Outcome {
    fn rejected() -> Self {
        Self::default()
    }

    pub fn publishes(&self) -> impl Iterator<Item = &OutboundMessage> {
        self.actions.iter().filter_map(|action| match action {
            PanelAction::Publish(message) => Some(message),
            PanelAction::Delay(_) => None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Panel {
    config: PanelConfig,
    registry: UnitRegistry,
    mode: OperatingMode,
    drift_tick: u64,
}

impl Panel {
    pub fn new(runtime: &RuntimeConfig) -> Result<Self, ConfigError> {
        let mode = if runtime.panel.detached {
            OperatingMode::Detached
        } else {
            OperatingMode::Connected
        };
        let registry = UnitRegistry::from_config(&runtime.units)?;
        Ok(Self::with_registry(runtime.panel.clone(), registry, mode))
    }

    pub fn with_registry(config: PanelConfig, registry: UnitRegistry, mode: OperatingMode) -> Self {
        Self {
            config,
            registry,
            mode,
            drift_tick: 0,
        }
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn handle(&mut self, event: PanelEvent) -> Outcome {
        let mut outcome = match event {
            PanelEvent::TogglePower(id) => match self.registry.get(id) {
                Some(unit) => {
                    let on = !unit.power;
                    self.set_power(id, on)
                }
                None => Outcome::rejected(),
            },
            PanelEvent::SetPower(id, on) => self.set_power(id, on),
            PanelEvent::SelectMode(id, mode) => self.select_mode(id, mode),
            PanelEvent::SelectFanSpeed(id, speed) => self.select_fan_speed(id, speed),
            PanelEvent::SelectSwing(id, swing) => self.select_swing(id, swing),
            PanelEvent::StepTemperature(id, step) => self.step_temperature(id, step),
            PanelEvent::SetTemperature(id, temp_c) => self.set_temperature(id, temp_c),
            PanelEvent::SetAllPower(on) => self.set_all_power(on),
        };

        if outcome.accepted && self.config.feedback_delay_ms > 0 {
            outcome
                .actions
                .push(PanelAction::Delay(self.config.feedback_delay_ms));
        }
        outcome
    }

    pub fn apply_status(&mut self, topic: &str, payload: &str) -> Reconciliation {
        reconcile(&mut self.registry, topic, payload)
    }

    /// Moves every current temperature along a fixed pattern so detached
    /// screens show changing readings. No-op when connected.
    pub fn simulate_drift(&mut self) -> bool {
        if self.mode != OperatingMode::Detached {
            return false;
        }

        self.drift_tick = self.drift_tick.wrapping_add(1);
        let tick = self.drift_tick;
        let mut changed = false;
        for id in self.registry.ids().collect::<Vec<_>>() {
            if let Some(unit) = self.registry.get_mut(id) {
                let step = (tick.wrapping_add(id.0 as u64) % 8) as f32;
                let next = 20.0 + step * 0.5;
                changed |= (unit.current_temperature - next).abs() > f32::EPSILON;
                unit.current_temperature = next;
            }
        }
        changed
    }

    fn set_power(&mut self, id: UnitId, on: bool) -> Outcome {
        let mode = self.mode;
        let Some(unit) = self.registry.get_mut(id) else {
            return Outcome::rejected();
        };

        let changed = unit.power != on;
        unit.power = on;

        let mut outcome = accepted(changed);
        if mode == OperatingMode::Connected {
            outcome.actions.push(PanelAction::Publish(power_command(unit)));
        }
        outcome
    }

    fn select_mode(&mut self, id: UnitId, mode: HvacMode) -> Outcome {
        let operating_mode = self.mode;
        let Some(unit) = self.registry.get_mut(id) else {
            return Outcome::rejected();
        };

        let changed = !unit.power || unit.mode != mode;
        unit.power = true;
        unit.mode = mode;

        let mut outcome = accepted(changed);
        if operating_mode == OperatingMode::Connected {
            outcome.actions.push(PanelAction::Publish(power_command(unit)));
            outcome.actions.push(PanelAction::Publish(mode_command(unit)));
        }
        outcome
    }

    fn select_fan_speed(&mut self, id: UnitId, speed: FanSpeed) -> Outcome {
        let mode = self.mode;
        let Some(unit) = self.registry.get_mut(id) else {
            return Outcome::rejected();
        };
        if !unit.power {
            return Outcome::rejected();
        }

        let changed = unit.fan_speed != speed;
        unit.fan_speed = speed;

        let mut outcome = accepted(changed);
        if mode == OperatingMode::Connected {
            outcome.actions.push(PanelAction::Publish(fan_command(unit)));
        }
        outcome
    }

    fn select_swing(&mut self, id: UnitId, swing: SwingPosition) -> Outcome {
        let mode = self.mode;
        let Some(unit) = self.registry.get_mut(id) else {
            return Outcome::rejected();
        };
        if !unit.power {
            return Outcome::rejected();
        }

        let changed = unit.swing != swing;
        unit.swing = swing;

        let mut outcome = accepted(changed);
        if mode == OperatingMode::Connected {
            outcome.actions.push(PanelAction::Publish(swing_command(unit)));
        }
        outcome
    }

    fn step_temperature(&mut self, id: UnitId, step: TempStep) -> Outcome {
        let Some(unit) = self.registry.get(id) else {
            return Outcome::rejected();
        };

        let target = unit.target_temperature();
        let at_bound = match step {
            TempStep::Up => target >= TEMP_MAX_C,
            TempStep::Down => target <= TEMP_MIN_C,
        };
        if at_bound {
            return Outcome::rejected();
        }
        let next = (target + step.delta()).clamp(TEMP_MIN_C, TEMP_MAX_C);
        self.set_temperature(id, next)
    }

    fn set_temperature(&mut self, id: UnitId, temp_c: f32) -> Outcome {
        let mode = self.mode;
        let Some(unit) = self.registry.get_mut(id) else {
            return Outcome::rejected();
        };
        if !temp_c.is_finite() {
            return Outcome::rejected();
        }

        let changed = unit.set_setpoint(temp_c);

        let mut outcome = accepted(changed);
        if mode == OperatingMode::Connected {
            outcome
                .actions
                .push(PanelAction::Publish(temperature_command(unit)));
        }
        outcome
    }

    fn set_all_power(&mut self, on: bool) -> Outcome {
        let mut outcome = accepted(false);
        for id in self.registry.ids().collect::<Vec<_>>() {
            let unit_outcome = self.set_power(id, on);
            outcome.changed |= unit_outcome.changed;
            outcome.actions.extend(unit_outcome.actions);
        }
        outcome
    }
}

fn accepted(changed: bool) -> Outcome {
    Outcome {
        accepted: true,
        changed,
        actions: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::RuntimeConfig;

    const EHBO: UnitId = UnitId(3);

    fn connected() -> Panel {
        Panel::new(&RuntimeConfig::default()).unwrap()
    }

    fn detached() -> Panel {
        let mut runtime = RuntimeConfig::default();
        runtime.panel.detached = true;
        Panel::new(&runtime).unwrap()
    }

    fn publish(topic: &str, payload: &str) -> PanelAction {
        PanelAction::Publish(OutboundMessage {
            topic: topic.to_string(),
            payload: payload.to_string(),
        })
    }

    #[test]
    fn mode_selection_powers_unit_on() {
        let mut panel = connected();
        assert!(!panel.registry().get(EHBO).unwrap().power);

        let outcome = panel.handle(PanelEvent::SelectMode(EHBO, HvacMode::Heat));

        let unit = panel.registry().get(EHBO).unwrap();
        assert!(unit.power);
        assert_eq!(unit.mode, HvacMode::Heat);
        assert!(outcome.changed);
        assert_eq!(
            outcome.actions,
            vec![
                publish("hcy/airco/ac_ehbo/command/power", "on"),
                publish("hcy/airco/ac_ehbo/command/mode", "heat"),
                PanelAction::Delay(50),
            ]
        );
    }

    #[test]
    fn fan_and_swing_are_ignored_while_off() {
        let mut panel = connected();
        let before = panel.registry().get(EHBO).unwrap().clone();

        let fan = panel.handle(PanelEvent::SelectFanSpeed(EHBO, FanSpeed::High));
        let swing = panel.handle(PanelEvent::SelectSwing(EHBO, SwingPosition::Position3));

        assert_eq!(fan, Outcome::default());
        assert_eq!(swing, Outcome::default());
        assert_eq!(panel.registry().get(EHBO).unwrap(), &before);
    }

    #[test]
    fn fan_change_publishes_when_on() {
        let mut panel = connected();
        panel.handle(PanelEvent::SetPower(EHBO, true));

        let outcome = panel.handle(PanelEvent::SelectFanSpeed(EHBO, FanSpeed::Powerful));

        assert_eq!(
            panel.registry().get(EHBO).unwrap().fan_speed,
            FanSpeed::Powerful
        );
        assert_eq!(
            outcome.publishes().cloned().collect::<Vec<_>>(),
            vec![OutboundMessage {
                topic: "hcy/airco/ac_ehbo/command/fan_mode".to_string(),
                payload: "powerful".to_string(),
            }]
        );
    }

    #[test]
    fn power_off_leaves_other_fields_alone() {
        let mut panel = connected();
        panel.handle(PanelEvent::SelectMode(EHBO, HvacMode::Dry));
        panel.handle(PanelEvent::SelectSwing(EHBO, SwingPosition::Position1));

        let outcome = panel.handle(PanelEvent::TogglePower(EHBO));

        let unit = panel.registry().get(EHBO).unwrap();
        assert!(!unit.power);
        assert_eq!(unit.mode, HvacMode::Dry);
        assert_eq!(unit.swing, SwingPosition::Position1);
        assert_eq!(
            outcome.actions.first(),
            Some(&publish("hcy/airco/ac_ehbo/command/power", "off"))
        );
    }

    #[test]
    fn temperature_steps_stop_at_bounds() {
        let mut panel = connected();
        panel.handle(PanelEvent::SetTemperature(EHBO, 16.0));

        let down = panel.handle(PanelEvent::StepTemperature(EHBO, TempStep::Down));
        assert!(!down.accepted);
        assert!(down.actions.is_empty());
        assert_eq!(panel.registry().get(EHBO).unwrap().target_temperature(), 16.0);

        panel.handle(PanelEvent::SetTemperature(EHBO, 30.0));
        let up = panel.handle(PanelEvent::StepTemperature(EHBO, TempStep::Up));
        assert!(!up.accepted);
        assert_eq!(panel.registry().get(EHBO).unwrap().target_temperature(), 30.0);
    }

    #[test]
    fn fractional_setpoint_steps_onto_the_bound() {
        let mut panel = connected();
        panel.apply_status(
            "hcy/airco/ac_ehbo/status",
            r#"{"target_temperature":16.5}"#,
        );

        let down = panel.handle(PanelEvent::StepTemperature(EHBO, TempStep::Down));
        assert!(down.accepted);
        assert_eq!(panel.registry().get(EHBO).unwrap().target_temperature(), 16.0);
        assert_eq!(
            down.actions.first(),
            Some(&publish("hcy/airco/ac_ehbo/command/temperature", "16"))
        );

        panel.apply_status(
            "hcy/airco/ac_ehbo/status",
            r#"{"target_temperature":29.5}"#,
        );
        let up = panel.handle(PanelEvent::StepTemperature(EHBO, TempStep::Up));
        assert!(up.accepted);
        assert_eq!(panel.registry().get(EHBO).unwrap().target_temperature(), 30.0);
    }

    #[test]
    fn temperature_step_updates_both_setpoints() {
        let mut panel = connected();

        let outcome = panel.handle(PanelEvent::StepTemperature(EHBO, TempStep::Up));

        let unit = panel.registry().get(EHBO).unwrap();
        assert_eq!(unit.target_temperature(), 23.0);
        assert_eq!(unit.requested_temperature(), 23.0);
        assert_eq!(
            outcome.actions.first(),
            Some(&publish("hcy/airco/ac_ehbo/command/temperature", "23"))
        );
    }

    #[test]
    fn set_temperature_clamps() {
        let mut panel = connected();
        panel.handle(PanelEvent::SetTemperature(EHBO, 12.0));
        assert_eq!(panel.registry().get(EHBO).unwrap().target_temperature(), 16.0);

        let nan = panel.handle(PanelEvent::SetTemperature(EHBO, f32::NAN));
        assert!(!nan.accepted);
    }

    #[test]
    fn detached_mode_never_publishes() {
        let mut panel = detached();

        let outcome = panel.handle(PanelEvent::SelectMode(EHBO, HvacMode::Auto));

        assert!(panel.registry().get(EHBO).unwrap().power);
        assert_eq!(outcome.publishes().count(), 0);
        assert_eq!(outcome.actions, vec![PanelAction::Delay(50)]);
    }

    #[test]
    fn out_of_bounds_unit_is_a_no_op() {
        let mut panel = connected();
        let outcome = panel.handle(PanelEvent::TogglePower(UnitId(42)));
        assert_eq!(outcome, Outcome::default());
    }

    #[test]
    fn all_on_publishes_for_every_unit() {
        let mut panel = connected();

        let outcome = panel.handle(PanelEvent::SetAllPower(true));

        assert!(panel.registry().units().iter().all(|unit| unit.power));
        assert_eq!(outcome.publishes().count(), 11);
        assert!(outcome
            .publishes()
            .all(|message| message.payload == "on" && message.topic.ends_with("/command/power")));
        assert_eq!(outcome.actions.last(), Some(&PanelAction::Delay(50)));
    }

    #[test]
    fn drift_only_runs_detached() {
        let mut panel = connected();
        assert!(!panel.simulate_drift());

        let mut panel = detached();
        assert!(panel.simulate_drift());
        let temps: Vec<f32> = panel
            .registry()
            .units()
            .iter()
            .take(3)
            .map(|unit| unit.current_temperature)
            .collect();
        assert_eq!(temps, vec![20.5, 21.0, 21.5]);
    }

    #[test]
    fn inbound_status_corrects_optimistic_state() {
        let mut panel = connected();
        panel.handle(PanelEvent::SelectMode(EHBO, HvacMode::Heat));

        panel.apply_status("hcy/airco/ac_ehbo/status", r#"{"power":"off","mode":"cool"}"#);

        let unit = panel.registry().get(EHBO).unwrap();
        assert!(!unit.power);
        assert_eq!(unit.mode, HvacMode::Cool);
    }
}
