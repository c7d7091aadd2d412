//! In-memory controller implementing `RemoteStateClient`

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use sauna_dashboard::client::{Command, CommandResult, RemoteStateClient};
use sauna_dashboard::error::TransportError;
use sauna_dashboard::snapshot::{
    ErrorEntry, ErrorLog, FanSnapshot, FieldValue, Section, SettingsRecord, StatusSnapshot,
    ViewKey, ViewPayload,
};

#[derive(Debug, Clone)]
pub struct ControllerState {
    pub status: StatusSnapshot,
    pub fans: FanSnapshot,
    pub settings: SettingsRecord,
    pub errors: ErrorLog,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            status: StatusSnapshot {
                sauna_on: false,
                heater_on: false,
                heater_error: false,
                light_on: false,
                hot_room_temp_f: 72.0,
                hot_room_humidity: Some(35.0),
                target_temp_f: 190.0,
                wifi_connected: true,
                has_errors: false,
            },
            fans: FanSnapshot {
                left_fan_on: false,
                right_fan_on: false,
                fan_speed_pct: 50,
                left_fan_rpm: None,
                right_fan_rpm: None,
                running_time_after_sauna_off_hrs: 1.0,
            },
            settings: SettingsRecord::new()
                .with("max_temp_f", 240)
                .with("preset_medium", 180)
                .with("preset_high", 220)
                .with("serial_port", "/dev/ttyAMA0")
                .with("cpu_temp", 47.5),
            errors: ErrorLog::default(),
        }
    }
}

/// Behaviour knobs and call records of the fake
#[derive(Debug, Default)]
struct Knobs {
    fetch_delay: Duration,
    fail_fetches: bool,
    fail_commands: bool,
    /// Accept commands without changing state
    ignore_commands: bool,
    fetches: HashMap<ViewKey, usize>,
    commands: Vec<Command>,
}

#[derive(Debug, Default)]
pub struct FakeController {
    state: Mutex<ControllerState>,
    knobs: Mutex<Knobs>,
}

impl FakeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: ControllerState) -> Self {
        Self {
            state: Mutex::new(state),
            knobs: Mutex::default(),
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state.lock().unwrap().clone()
    }

    /// Change controller state behind the dashboard's back
    pub fn modify(&self, f: impl FnOnce(&mut ControllerState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn add_error(&self, kind: &str, message: &str) {
        self.modify(|s| {
            s.errors.errors.push(ErrorEntry {
                kind: kind.to_string(),
                message: message.to_string(),
            });
            s.status.has_errors = true;
        });
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        self.knobs.lock().unwrap().fetch_delay = delay;
    }

    pub fn set_fail_fetches(&self, fail: bool) {
        self.knobs.lock().unwrap().fail_fetches = fail;
    }

    pub fn set_fail_commands(&self, fail: bool) {
        self.knobs.lock().unwrap().fail_commands = fail;
    }

    pub fn set_ignore_commands(&self, ignore: bool) {
        self.knobs.lock().unwrap().ignore_commands = ignore;
    }

    pub fn fetch_count(&self, view: ViewKey) -> usize {
        self.knobs
            .lock()
            .unwrap()
            .fetches
            .get(&view)
            .copied()
            .unwrap_or(0)
    }

    pub fn commands(&self) -> Vec<Command> {
        self.knobs.lock().unwrap().commands.clone()
    }

    fn apply(&self, command: &Command) -> CommandResult {
        let mut s = self.state.lock().unwrap();
        match command {
            Command::SetTargetTemperature { temp_f } => {
                s.status.target_temp_f = *temp_f as f64;
                CommandResult::Ack
            }
            Command::SelectPreset(preset) => {
                let target = s
                    .settings
                    .get(preset.setting())
                    .and_then(|v| v.as_f64())
                    .unwrap_or(s.status.target_temp_f);
                s.status.target_temp_f = target;
                CommandResult::TargetTemp(target)
            }
            Command::ToggleSauna => {
                s.status.sauna_on = !s.status.sauna_on;
                CommandResult::SaunaState(s.status.sauna_on)
            }
            Command::ToggleLight => {
                s.status.light_on = !s.status.light_on;
                CommandResult::LightState(s.status.light_on)
            }
            Command::UpdateFans(update) => {
                for (field, value) in update.fields() {
                    s.fans.set(field.name(), &value);
                }
                CommandResult::Ack
            }
            Command::UpdateSettings(record) => {
                for (name, value) in record.iter() {
                    s.settings.set(name, value);
                }
                CommandResult::Ack
            }
            Command::ClearErrors => {
                s.errors.errors.clear();
                s.status.has_errors = false;
                CommandResult::Ack
            }
        }
    }

    /// What the controller would answer without applying the command
    fn echo(&self, command: &Command) -> CommandResult {
        let s = self.state.lock().unwrap();
        match command {
            Command::ToggleSauna => CommandResult::SaunaState(s.status.sauna_on),
            Command::ToggleLight => CommandResult::LightState(s.status.light_on),
            Command::SelectPreset(_) => CommandResult::TargetTemp(s.status.target_temp_f),
            _ => CommandResult::Ack,
        }
    }
}

#[async_trait]
impl RemoteStateClient for FakeController {
    async fn fetch_snapshot(&self, view: ViewKey) -> Result<ViewPayload, TransportError> {
        let (delay, fail) = {
            let mut knobs = self.knobs.lock().unwrap();
            *knobs.fetches.entry(view).or_default() += 1;
            (knobs.fetch_delay, knobs.fail_fetches)
        };
        // Snapshot is taken when the request reaches the controller
        let state = self.state();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(TransportError::Network("connection refused".to_string()));
        }
        Ok(match view {
            ViewKey::Status => ViewPayload::Status(state.status),
            ViewKey::Fans => ViewPayload::Fans(state.fans),
            ViewKey::Settings => ViewPayload::Settings(state.settings),
            ViewKey::Errors => ViewPayload::Errors(state.errors),
        })
    }

    async fn send_command(&self, command: &Command) -> Result<CommandResult, TransportError> {
        let (fail, ignore) = {
            let mut knobs = self.knobs.lock().unwrap();
            knobs.commands.push(command.clone());
            (knobs.fail_commands, knobs.ignore_commands)
        };
        if fail {
            return Err(TransportError::Network("connection refused".to_string()));
        }
        if ignore {
            return Ok(self.echo(command));
        }
        Ok(self.apply(command))
    }
}

/// Setting value as a number, for assertions
pub fn setting_f64(state: &ControllerState, name: &str) -> Option<f64> {
    state.settings.get(name).as_ref().and_then(FieldValue::as_f64)
}
