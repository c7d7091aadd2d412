//! Command dispatch: user intents to controller commands
//!
//! Every intent is validated against the current [`ViewState`] before
//! anything is sent; a rejected intent never reaches the network and
//! leaves the view untouched. Valid intents follow one of two update
//! strategies, see [`UpdateStrategy`].

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::{Command, CommandResult, FanUpdate, Preset, RemoteStateClient};
use crate::config::{CommandsConfig, LimitsConfig};
use crate::error::{DashboardError, TransportError, ValidationError};
use crate::snapshot::{Field, FieldKind, FieldValue, Section, ViewKey};
use crate::units;
use crate::view_model::{EditId, SharedViewModel, ViewState};

/// Something the user asked the dashboard to do
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// Target temperature in the current display unit
    SetTargetTemperature { value: f64 },
    SelectPreset(Preset),
    ToggleSauna,
    ToggleLight,
    UpdateFans(FanUpdate),
    /// Settings field edits by wire name
    UpdateSettings(Vec<(String, FieldValue)>),
    ClearErrors,
}

/// How the view reflects a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStrategy {
    /// Show the edit at once and let the next poll confirm it
    Optimistic,
    /// Show only what the controller returns
    ConfirmThenRender,
}

impl Intent {
    pub fn strategy(&self) -> UpdateStrategy {
        match self {
            Intent::SetTargetTemperature { .. }
            | Intent::UpdateFans(_)
            | Intent::UpdateSettings(_) => UpdateStrategy::Optimistic,
            Intent::SelectPreset(_)
            | Intent::ToggleSauna
            | Intent::ToggleLight
            | Intent::ClearErrors => UpdateStrategy::ConfirmThenRender,
        }
    }
}

/// A validated intent ready to send
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedCommand {
    pub command: Command,
    /// Fields shown optimistically while the command is outstanding
    pub edits: Vec<(Field, FieldValue)>,
}

/// Validates intents, sends commands and updates the view model
pub struct CommandDispatcher {
    client: Arc<dyn RemoteStateClient>,
    model: SharedViewModel,
    limits: LimitsConfig,
    retry: CommandsConfig,
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("limits", &self.limits)
            .field("retry", &self.retry)
            .finish()
    }
}

impl CommandDispatcher {
    pub fn new(
        client: Arc<dyn RemoteStateClient>,
        model: SharedViewModel,
        limits: LimitsConfig,
        retry: CommandsConfig,
    ) -> Self {
        Self {
            client,
            model,
            limits,
            retry,
        }
    }

    /// Validate and send an intent, updating the view per its strategy
    pub async fn dispatch(&self, intent: Intent) -> Result<CommandResult, DashboardError> {
        let state = self.model.view_state().await;
        let prepared = match validate(&intent, &state, &self.limits) {
            Ok(prepared) => prepared,
            Err(e) => {
                info!("Rejected {:?}: {}", intent, e);
                return Err(e.into());
            }
        };

        match intent.strategy() {
            UpdateStrategy::Optimistic => self.send_optimistic(prepared).await,
            UpdateStrategy::ConfirmThenRender => self.send_confirmed(prepared).await,
        }
    }

    async fn send_optimistic(
        &self,
        prepared: PreparedCommand,
    ) -> Result<CommandResult, DashboardError> {
        let PreparedCommand { command, edits } = prepared;
        let now = Instant::now();
        let applied: Vec<(Field, EditId)> = self
            .model
            .update(|vm| {
                edits
                    .into_iter()
                    .filter_map(|(field, value)| {
                        vm.apply_local_edit(field, value, now);
                        vm.pending_edit(field).map(|edit| (field, edit.id))
                    })
                    .collect()
            })
            .await;

        match self.send(&command).await {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!("Failed to save {}: {}", command, e);
                self.model
                    .update(|vm| {
                        for (field, id) in &applied {
                            if !vm.mark_save_failed(*field, *id) {
                                debug!("{} was edited again, not flagging it", field);
                            }
                        }
                    })
                    .await;
                Err(e.into())
            }
        }
    }

    async fn send_confirmed(
        &self,
        prepared: PreparedCommand,
    ) -> Result<CommandResult, DashboardError> {
        let command = prepared.command;
        let result = self.send(&command).await.map_err(|e| {
            warn!("{} failed: {}", command, e);
            DashboardError::from(e)
        })?;

        let confirmed = match &result {
            CommandResult::SaunaState(on) => Some((Field::SAUNA_ON, FieldValue::Bool(*on))),
            CommandResult::LightState(on) => Some((Field::LIGHT_ON, FieldValue::Bool(*on))),
            CommandResult::TargetTemp(t) => Some((Field::TARGET_TEMP_F, FieldValue::Float(*t))),
            CommandResult::Ack => None,
        };
        if let Some((field, value)) = confirmed {
            let now = Instant::now();
            self.model
                .update(|vm| {
                    let ticket = vm.issue_ticket();
                    vm.apply_confirmed(field, value, ticket, now);
                })
                .await;
        }

        if command == Command::ClearErrors {
            self.refetch_errors().await;
        }
        Ok(result)
    }

    /// Render the controller's post-clear error list right away
    async fn refetch_errors(&self) {
        let ticket = self.model.issue_ticket().await;
        match self.client.fetch_snapshot(ViewKey::Errors).await {
            Ok(payload) => {
                self.model.update(|vm| vm.reconcile(ticket, payload)).await;
            }
            Err(e) => warn!("Errors cleared but re-fetch failed: {}", e),
        }
    }

    /// Send once, retrying transient failures of idempotent commands
    async fn send(&self, command: &Command) -> Result<CommandResult, TransportError> {
        let attempts = if command.is_idempotent() {
            self.retry.max_retries + 1
        } else {
            1
        };

        let mut attempt = 1;
        loop {
            match self.client.send_command(command).await {
                Ok(result) => {
                    debug!("{} -> {:?}", command, result);
                    return Ok(result);
                }
                Err(e) if attempt < attempts && is_transient(&e) => {
                    debug!(
                        "{} attempt {}/{} failed: {}, retrying",
                        command, attempt, attempts, e
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_transient(e: &TransportError) -> bool {
    match e {
        TransportError::Network(_) | TransportError::Timeout(_) => true,
        TransportError::Status { status, .. } => *status >= 500,
        TransportError::Malformed(_) | TransportError::Rejected(_) => false,
    }
}

/// Check an intent against the current view and build its command
pub fn validate(
    intent: &Intent,
    state: &ViewState,
    limits: &LimitsConfig,
) -> Result<PreparedCommand, ValidationError> {
    let prepared = match intent {
        Intent::SetTargetTemperature { value } => {
            let temp_f = validate_target(*value, state, limits)?;
            PreparedCommand {
                command: Command::SetTargetTemperature { temp_f },
                edits: vec![(Field::TARGET_TEMP_F, FieldValue::Int(temp_f))],
            }
        }
        Intent::UpdateFans(update) => {
            validate_fans(update, limits)?;
            PreparedCommand {
                command: Command::UpdateFans(update.clone()),
                edits: update.fields(),
            }
        }
        Intent::UpdateSettings(changes) => validate_settings(changes, state)?,
        Intent::SelectPreset(preset) => PreparedCommand {
            command: Command::SelectPreset(*preset),
            edits: Vec::new(),
        },
        Intent::ToggleSauna => PreparedCommand {
            command: Command::ToggleSauna,
            edits: Vec::new(),
        },
        Intent::ToggleLight => PreparedCommand {
            command: Command::ToggleLight,
            edits: Vec::new(),
        },
        Intent::ClearErrors => PreparedCommand {
            command: Command::ClearErrors,
            edits: Vec::new(),
        },
    };
    Ok(prepared)
}

/// Canonical whole-degree °F target for a value entered in the display unit
fn validate_target(
    value: f64,
    state: &ViewState,
    limits: &LimitsConfig,
) -> Result<i64, ValidationError> {
    let unit = state.unit;
    let min_f = limits.min_target_temp_f;
    let max_f = state.max_temp_f().unwrap_or(limits.max_target_temp_f);
    let out_of_range = || ValidationError::OutOfRange {
        field: Field::TARGET_TEMP_F.name().to_string(),
        value,
        min: units::convert(min_f, unit),
        max: units::convert(max_f, unit),
    };

    if !value.is_finite() {
        return Err(out_of_range());
    }
    let temp_f = units::to_canonical(value, unit).round();
    if temp_f < min_f.ceil() || temp_f > max_f.floor() {
        return Err(out_of_range());
    }
    Ok(temp_f as i64)
}

fn validate_fans(update: &FanUpdate, limits: &LimitsConfig) -> Result<(), ValidationError> {
    if update.is_empty() {
        return Err(ValidationError::Empty);
    }
    if let Some(pct) = update.fan_speed_pct {
        if !(0..=limits.max_fan_speed_pct).contains(&pct) {
            return Err(ValidationError::OutOfRange {
                field: Field::FAN_SPEED_PCT.name().to_string(),
                value: pct as f64,
                min: 0.0,
                max: limits.max_fan_speed_pct as f64,
            });
        }
    }
    if let Some(hrs) = update.running_time_after_sauna_off_hrs {
        if !hrs.is_finite() || !(0.0..=limits.max_fan_runtime_hrs).contains(&hrs) {
            return Err(ValidationError::OutOfRange {
                field: Field::FAN_RUNTIME_HRS.name().to_string(),
                value: hrs,
                min: 0.0,
                max: limits.max_fan_runtime_hrs,
            });
        }
    }
    Ok(())
}

/// Merge setting edits into the rendered record and check the result.
///
/// The posted record is the full settings view (snapshot overlaid with
/// pending edits) plus these changes, minus read-only fields.
fn validate_settings(
    changes: &[(String, FieldValue)],
    state: &ViewState,
) -> Result<PreparedCommand, ValidationError> {
    if changes.is_empty() {
        return Err(ValidationError::Empty);
    }
    let Some(current) = &state.settings else {
        return Err(ValidationError::Inconsistent(
            "settings have not been loaded yet".to_string(),
        ));
    };

    let mut record = current.clone();
    let mut edits = Vec::with_capacity(changes.len());
    for (name, value) in changes {
        let field =
            Field::setting(name).ok_or_else(|| ValidationError::UnknownField(name.clone()))?;
        let kind = field
            .spec()
            .map(|spec| spec.kind)
            .ok_or_else(|| ValidationError::UnknownField(name.clone()))?;
        let value = check_value(name, kind, value)?;
        record.set(name, &value);
        edits.push((field, value));
    }

    let max = record.get("max_temp_f").and_then(|v| v.as_f64());
    if let Some(max) = max {
        for preset in [Preset::Medium, Preset::High] {
            let preset_temp = record.get(preset.setting()).and_then(|v| v.as_f64());
            if let Some(temp) = preset_temp.filter(|t| *t > max) {
                return Err(ValidationError::Inconsistent(format!(
                    "{} ({}) exceeds max_temp_f ({})",
                    preset.setting(),
                    temp,
                    max
                )));
            }
        }
    }

    Ok(PreparedCommand {
        command: Command::UpdateSettings(record.writable()),
        edits,
    })
}

/// Type- and range-check one value against its schema, normalizing
/// integral floats to integers
pub fn check_value(
    name: &str,
    kind: FieldKind,
    value: &FieldValue,
) -> Result<FieldValue, ValidationError> {
    let wrong_type = |expected| ValidationError::WrongType {
        field: name.to_string(),
        expected,
    };
    match kind {
        FieldKind::ReadOnly => Err(ValidationError::ReadOnly(name.to_string())),
        FieldKind::Bool => value
            .as_bool()
            .map(FieldValue::Bool)
            .ok_or_else(|| wrong_type("boolean")),
        FieldKind::Text => value
            .as_str()
            .map(|s| FieldValue::Text(s.to_string()))
            .ok_or_else(|| wrong_type("text")),
        FieldKind::Int { min, max } => {
            let v = value.as_i64().ok_or_else(|| wrong_type("integer"))?;
            if !(min..=max).contains(&v) {
                return Err(ValidationError::OutOfRange {
                    field: name.to_string(),
                    value: v as f64,
                    min: min as f64,
                    max: max as f64,
                });
            }
            Ok(FieldValue::Int(v))
        }
        FieldKind::Float { min, max } => {
            let v = value
                .as_f64()
                .filter(|v| v.is_finite())
                .ok_or_else(|| wrong_type("number"))?;
            if !(min..=max).contains(&v) {
                return Err(ValidationError::OutOfRange {
                    field: name.to_string(),
                    value: v,
                    min,
                    max,
                });
            }
            Ok(FieldValue::Float(v))
        }
    }
}
