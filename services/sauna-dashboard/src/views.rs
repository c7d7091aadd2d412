//! Panel renderers
//!
//! Pure projections of a [`ViewState`] into display text. Renderers never
//! write back into the view model.

use std::fmt;

use crate::snapshot::{ErrorEntry, Field, FieldKind, Section, SettingsTab, ViewKey};
use crate::units;
use crate::view_model::ViewState;

const UNKNOWN: &str = "--";

fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

/// Suffix marking a value that is not yet confirmed by the controller
fn sync_marker(state: &ViewState, field: Field) -> &'static str {
    if state.save_failed.contains(&field) {
        " (not saved)"
    } else if state.pending.contains(&field) {
        " (pending)"
    } else {
        ""
    }
}

/// Number of failed polls since the last success, if any
fn stale_polls(state: &ViewState, view: ViewKey) -> Option<u32> {
    state
        .health
        .get(&view)
        .map(|h| h.consecutive_errors)
        .filter(|n| *n > 0)
}

fn write_stale(f: &mut fmt::Formatter<'_>, stale: Option<u32>) -> fmt::Result {
    match stale {
        Some(n) => writeln!(f, "  (stale: {} failed polls)", n),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterIndicator {
    Error,
    On,
    Off,
}

impl fmt::Display for HeaterIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaterIndicator::Error => write!(f, "ERROR"),
            HeaterIndicator::On => write!(f, "ON"),
            HeaterIndicator::Off => write!(f, "OFF"),
        }
    }
}

/// Main status panel
#[derive(Debug, Clone, PartialEq)]
pub struct StatusPanel {
    pub room_temperature: String,
    pub humidity: String,
    pub target_temperature: String,
    pub sauna: String,
    pub light: String,
    pub heater: Option<HeaterIndicator>,
    pub wifi_connected: bool,
    pub has_errors: bool,
    pub stale_polls: Option<u32>,
}

impl StatusPanel {
    pub fn render(state: &ViewState) -> Self {
        let unit = state.unit;
        let Some(status) = &state.status else {
            return Self {
                room_temperature: UNKNOWN.to_string(),
                humidity: UNKNOWN.to_string(),
                target_temperature: UNKNOWN.to_string(),
                sauna: UNKNOWN.to_string(),
                light: UNKNOWN.to_string(),
                heater: None,
                wifi_connected: false,
                has_errors: false,
                stale_polls: stale_polls(state, ViewKey::Status),
            };
        };

        let heater = if status.heater_error {
            HeaterIndicator::Error
        } else if status.heater_on {
            HeaterIndicator::On
        } else {
            HeaterIndicator::Off
        };

        Self {
            room_temperature: units::format(status.hot_room_temp_f, unit),
            humidity: status
                .hot_room_humidity
                .map(|h| format!("{:.0}%", h))
                .unwrap_or_else(|| UNKNOWN.to_string()),
            target_temperature: format!(
                "{}{}",
                units::format(status.target_temp_f, unit),
                sync_marker(state, Field::TARGET_TEMP_F)
            ),
            sauna: format!(
                "{}{}",
                on_off(status.sauna_on),
                sync_marker(state, Field::SAUNA_ON)
            ),
            light: format!(
                "{}{}",
                on_off(status.light_on),
                sync_marker(state, Field::LIGHT_ON)
            ),
            heater: Some(heater),
            wifi_connected: status.wifi_connected,
            has_errors: status.has_errors,
            stale_polls: stale_polls(state, ViewKey::Status),
        }
    }
}

impl fmt::Display for StatusPanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Status")?;
        writeln!(f, "  Room:     {}", self.room_temperature)?;
        writeln!(f, "  Humidity: {}", self.humidity)?;
        writeln!(f, "  Target:   {}", self.target_temperature)?;
        writeln!(f, "  Sauna:    {}", self.sauna)?;
        writeln!(f, "  Light:    {}", self.light)?;
        match self.heater {
            Some(heater) => writeln!(f, "  Heater:   {}", heater)?,
            None => writeln!(f, "  Heater:   {}", UNKNOWN)?,
        }
        writeln!(
            f,
            "  WiFi:     {}",
            if self.wifi_connected {
                "connected"
            } else {
                "disconnected"
            }
        )?;
        if self.has_errors {
            writeln!(f, "  ! Controller reports errors")?;
        }
        write_stale(f, self.stale_polls)
    }
}

/// Fan panel
#[derive(Debug, Clone, PartialEq)]
pub struct FanPanel {
    pub left: String,
    pub right: String,
    pub left_rpm: String,
    pub right_rpm: String,
    pub speed: String,
    pub runtime: String,
    pub stale_polls: Option<u32>,
}

fn rpm(value: Option<u32>) -> String {
    match value {
        Some(rpm) => format!("{} RPM", rpm),
        None => format!("{} RPM", UNKNOWN),
    }
}

impl FanPanel {
    pub fn render(state: &ViewState) -> Self {
        let stale = stale_polls(state, ViewKey::Fans);
        let Some(fans) = &state.fans else {
            return Self {
                left: UNKNOWN.to_string(),
                right: UNKNOWN.to_string(),
                left_rpm: rpm(None),
                right_rpm: rpm(None),
                speed: UNKNOWN.to_string(),
                runtime: UNKNOWN.to_string(),
                stale_polls: stale,
            };
        };

        Self {
            left: format!(
                "{}{}",
                on_off(fans.left_fan_on),
                sync_marker(state, Field::LEFT_FAN_ON)
            ),
            right: format!(
                "{}{}",
                on_off(fans.right_fan_on),
                sync_marker(state, Field::RIGHT_FAN_ON)
            ),
            left_rpm: rpm(fans.left_fan_rpm),
            right_rpm: rpm(fans.right_fan_rpm),
            speed: format!(
                "{}%{}",
                fans.fan_speed_pct,
                sync_marker(state, Field::FAN_SPEED_PCT)
            ),
            runtime: format!(
                "{:.2} h{}",
                fans.running_time_after_sauna_off_hrs,
                sync_marker(state, Field::FAN_RUNTIME_HRS)
            ),
            stale_polls: stale,
        }
    }
}

impl fmt::Display for FanPanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Fans")?;
        writeln!(f, "  Left:    {} ({})", self.left, self.left_rpm)?;
        writeln!(f, "  Right:   {} ({})", self.right, self.right_rpm)?;
        writeln!(f, "  Speed:   {}", self.speed)?;
        writeln!(f, "  Run-on:  {}", self.runtime)?;
        write_stale(f, self.stale_polls)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SettingsRow {
    pub name: &'static str,
    pub value: String,
    pub read_only: bool,
}

/// Settings panel showing the active tab
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsPanel {
    pub tab: SettingsTab,
    pub rows: Vec<SettingsRow>,
    pub loaded: bool,
}

impl SettingsPanel {
    pub fn render(state: &ViewState) -> Self {
        let tab = state.settings_tab;
        let Some(settings) = &state.settings else {
            return Self {
                tab,
                rows: Vec::new(),
                loaded: false,
            };
        };

        let rows = tab
            .fields()
            .filter_map(|spec| {
                let value = settings.get(spec.name)?;
                let marker = Field::setting(spec.name)
                    .map(|field| sync_marker(state, field))
                    .unwrap_or("");
                Some(SettingsRow {
                    name: spec.name,
                    value: format!("{}{}", value, marker),
                    read_only: spec.kind == FieldKind::ReadOnly,
                })
            })
            .collect();

        Self {
            tab,
            rows,
            loaded: true,
        }
    }
}

impl fmt::Display for SettingsPanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Settings [{}]", self.tab)?;
        if !self.loaded {
            return writeln!(f, "  (not loaded)");
        }
        for row in &self.rows {
            let lock = if row.read_only { " (read-only)" } else { "" };
            writeln!(f, "  {:<34} {}{}", row.name, row.value, lock)?;
        }
        Ok(())
    }
}

/// Error log panel, in controller order
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorsPanel {
    pub entries: Vec<ErrorEntry>,
    pub loaded: bool,
}

impl ErrorsPanel {
    pub fn render(state: &ViewState) -> Self {
        match &state.errors {
            Some(log) => Self {
                entries: log.errors.clone(),
                loaded: true,
            },
            None => Self {
                entries: Vec::new(),
                loaded: false,
            },
        }
    }
}

impl fmt::Display for ErrorsPanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Errors")?;
        if !self.loaded {
            return writeln!(f, "  (not loaded)");
        }
        if self.entries.is_empty() {
            return writeln!(f, "  No errors");
        }
        for entry in &self.entries {
            writeln!(f, "  [{}] {}", entry.kind, entry.message)?;
        }
        Ok(())
    }
}
