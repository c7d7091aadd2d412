//! Remote state client for the sauna controller's HTTP API
//!
//! One network call per invocation, no retries. Every failure is folded
//! into a [`TransportError`] here so callers never see raw HTTP errors.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::TransportError;
use crate::io::{HttpClient, HttpResponse};
use crate::snapshot::{Field, FieldValue, SettingsRecord, ViewKey, ViewPayload};

/// Header carrying the anti-forgery token on mutating requests
pub const CSRF_HEADER: &str = "X-CSRFToken";

/// Named target temperature stored on the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Medium,
    High,
}

impl Preset {
    /// Settings field holding this preset's temperature
    pub fn setting(&self) -> &'static str {
        match self {
            Preset::Medium => "preset_medium",
            Preset::High => "preset_high",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Preset::Medium => write!(f, "medium"),
            Preset::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "medium" => Ok(Preset::Medium),
            "high" => Ok(Preset::High),
            other => Err(format!("Unknown preset: {}", other)),
        }
    }
}

/// Partial fan update; absent fields are left unchanged by the controller
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FanUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_fan_on: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_fan_on: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_speed_pct: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running_time_after_sauna_off_hrs: Option<f64>,
}

impl FanUpdate {
    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// The fields this update changes, as view model edits
    pub fn fields(&self) -> Vec<(Field, FieldValue)> {
        let mut fields = Vec::new();
        if let Some(on) = self.left_fan_on {
            fields.push((Field::LEFT_FAN_ON, on.into()));
        }
        if let Some(on) = self.right_fan_on {
            fields.push((Field::RIGHT_FAN_ON, on.into()));
        }
        if let Some(pct) = self.fan_speed_pct {
            fields.push((Field::FAN_SPEED_PCT, pct.into()));
        }
        if let Some(hrs) = self.running_time_after_sauna_off_hrs {
            fields.push((Field::FAN_RUNTIME_HRS, hrs.into()));
        }
        fields
    }
}

/// A request to change controller state
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetTargetTemperature { temp_f: i64 },
    SelectPreset(Preset),
    ToggleSauna,
    ToggleLight,
    UpdateFans(FanUpdate),
    UpdateSettings(SettingsRecord),
    ClearErrors,
}

impl Command {
    /// Version of the command contract spoken by this client
    pub const VERSION: u32 = 1;

    pub fn name(&self) -> &'static str {
        match self {
            Command::SetTargetTemperature { .. } => "set-target-temperature",
            Command::SelectPreset(_) => "select-preset",
            Command::ToggleSauna => "toggle-sauna",
            Command::ToggleLight => "toggle-light",
            Command::UpdateFans(_) => "update-fans",
            Command::UpdateSettings(_) => "update-settings",
            Command::ClearErrors => "clear-errors",
        }
    }

    /// Whether sending this command twice has the same effect as once.
    /// Toggles are not: a blind retry could flip the state back.
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, Command::ToggleSauna | Command::ToggleLight)
    }

    pub fn path(&self) -> &'static str {
        match self {
            Command::SetTargetTemperature { .. } => "/api/temperature/set",
            Command::SelectPreset(_) => "/api/preset/set",
            Command::ToggleSauna => "/api/sauna/toggle",
            Command::ToggleLight => "/api/light/toggle",
            Command::UpdateFans(_) => "/api/fan/update",
            Command::UpdateSettings(_) => "/api/settings/update",
            Command::ClearErrors => "/api/errors/clear",
        }
    }

    /// JSON request body
    pub fn body(&self) -> serde_json::Result<String> {
        match self {
            Command::SetTargetTemperature { temp_f } => {
                serde_json::to_string(&json!({ "temp_f": temp_f }))
            }
            Command::SelectPreset(preset) => serde_json::to_string(&json!({ "preset": preset })),
            Command::UpdateFans(update) => serde_json::to_string(update),
            Command::UpdateSettings(settings) => serde_json::to_string(settings),
            Command::ToggleSauna | Command::ToggleLight | Command::ClearErrors => {
                Ok("{}".to_string())
            }
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/v{}", self.name(), Self::VERSION)
    }
}

/// What the controller returned for a command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    Ack,
    SaunaState(bool),
    LightState(bool),
    TargetTemp(f64),
}

/// Union of the command response shapes
#[derive(Debug, Deserialize)]
struct CommandResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    sauna_on: Option<bool>,
    #[serde(default)]
    light_on: Option<bool>,
    #[serde(default)]
    target_temp_f: Option<f64>,
    #[serde(default, alias = "message")]
    error: Option<String>,
}

/// Network boundary to the controller
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait RemoteStateClient: Send + Sync {
    /// Fetch the complete current payload of one view
    async fn fetch_snapshot(&self, view: ViewKey) -> Result<ViewPayload, TransportError>;

    /// Submit a command and return the controller's answer
    async fn send_command(&self, command: &Command) -> Result<CommandResult, TransportError>;
}

/// [`RemoteStateClient`] over the controller's JSON API
pub struct HttpRemoteStateClient {
    base_url: String,
    http: Arc<dyn HttpClient>,
    csrf_token: Option<String>,
    timeout: Duration,
}

impl fmt::Debug for HttpRemoteStateClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRemoteStateClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpRemoteStateClient {
    pub fn new(base_url: &str, http: Arc<dyn HttpClient>, timeout: Duration) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        tracing::debug!("Created controller client for {}", base_url);
        Self {
            base_url,
            http,
            csrf_token: None,
            timeout,
        }
    }

    /// Attach this token to every mutating request
    pub fn with_csrf_token(mut self, token: impl Into<String>) -> Self {
        self.csrf_token = Some(token.into());
        self
    }

    pub fn snapshot_path(view: ViewKey) -> &'static str {
        match view {
            ViewKey::Status => "/api/status",
            ViewKey::Fans => "/api/fan/status",
            ViewKey::Settings => "/api/settings/get",
            ViewKey::Errors => "/api/errors/get",
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn bounded<F>(&self, call: F) -> Result<HttpResponse, TransportError>
    where
        F: std::future::Future<Output = Result<HttpResponse, TransportError>>,
    {
        let response = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))??;
        if !response.is_success() {
            return Err(TransportError::Status {
                status: response.status,
                body: response.body,
            });
        }
        Ok(response)
    }
}

fn parse<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, TransportError> {
    serde_json::from_str(body).map_err(|e| TransportError::Malformed(e.to_string()))
}

fn interpret(command: &Command, body: &str) -> Result<CommandResult, TransportError> {
    let response: CommandResponse = parse(body)?;
    if response.success == Some(false) {
        return Err(TransportError::Rejected(
            response
                .error
                .unwrap_or_else(|| format!("{} was not applied", command.name())),
        ));
    }

    let missing = |field: &str| {
        TransportError::Malformed(format!("{} response lacks {}", command.name(), field))
    };
    match command {
        Command::ToggleSauna => response
            .sauna_on
            .map(CommandResult::SaunaState)
            .ok_or_else(|| missing("sauna_on")),
        Command::ToggleLight => response
            .light_on
            .map(CommandResult::LightState)
            .ok_or_else(|| missing("light_on")),
        Command::SelectPreset(_) => response
            .target_temp_f
            .map(CommandResult::TargetTemp)
            .ok_or_else(|| missing("target_temp_f")),
        _ => Ok(CommandResult::Ack),
    }
}

#[async_trait]
impl RemoteStateClient for HttpRemoteStateClient {
    async fn fetch_snapshot(&self, view: ViewKey) -> Result<ViewPayload, TransportError> {
        let url = self.url(Self::snapshot_path(view));
        let response = self.bounded(self.http.get(&url)).await?;

        let payload = match view {
            ViewKey::Status => ViewPayload::Status(parse(&response.body)?),
            ViewKey::Fans => ViewPayload::Fans(parse(&response.body)?),
            ViewKey::Settings => ViewPayload::Settings(parse(&response.body)?),
            ViewKey::Errors => ViewPayload::Errors(parse(&response.body)?),
        };
        Ok(payload)
    }

    async fn send_command(&self, command: &Command) -> Result<CommandResult, TransportError> {
        let url = self.url(command.path());
        let body = command
            .body()
            .map_err(|e| TransportError::Malformed(format!("Encoding {}: {}", command, e)))?;

        let mut headers = Vec::new();
        if let Some(token) = &self.csrf_token {
            headers.push((CSRF_HEADER, token.as_str()));
        }

        tracing::debug!("Sending {}", command);
        let response = self
            .bounded(self.http.post_json(&url, &body, &headers))
            .await?;
        interpret(command, &response.body)
    }
}
