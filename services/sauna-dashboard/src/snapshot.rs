//! Snapshot types received from the controller and the field schema
//!
//! Each polled view has its own wire payload. The editable fields of those
//! payloads are described by static schema tables so that pending edits,
//! reconciliation and validation can work on any field without a
//! hand-written match per control.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// An independently polled view of the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKey {
    Status,
    Fans,
    Settings,
    Errors,
}

impl ViewKey {
    pub const ALL: [ViewKey; 4] = [
        ViewKey::Status,
        ViewKey::Fans,
        ViewKey::Settings,
        ViewKey::Errors,
    ];

    /// Schema of the fields a user can edit (or read) in this view
    pub fn fields(&self) -> &'static [FieldSpec] {
        match self {
            ViewKey::Status => STATUS_FIELDS,
            ViewKey::Fans => FAN_FIELDS,
            ViewKey::Settings => SETTINGS_FIELDS,
            ViewKey::Errors => &[],
        }
    }
}

impl fmt::Display for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewKey::Status => write!(f, "status"),
            ViewKey::Fans => write!(f, "fans"),
            ViewKey::Settings => write!(f, "settings"),
            ViewKey::Errors => write!(f, "errors"),
        }
    }
}

/// Settings panel tab a settings field is shown on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingsTab {
    #[default]
    Temperature,
    Heater,
    Modbus,
    Light,
    Display,
    System,
}

impl SettingsTab {
    pub const ALL: [SettingsTab; 6] = [
        SettingsTab::Temperature,
        SettingsTab::Heater,
        SettingsTab::Modbus,
        SettingsTab::Light,
        SettingsTab::Display,
        SettingsTab::System,
    ];

    /// Known settings fields shown on this tab, in display order
    pub fn fields(&self) -> impl Iterator<Item = &'static FieldSpec> + '_ {
        SETTINGS_FIELDS
            .iter()
            .filter(move |spec| spec.tab == Some(*self))
    }
}

impl fmt::Display for SettingsTab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsTab::Temperature => write!(f, "Temperature"),
            SettingsTab::Heater => write!(f, "Heater"),
            SettingsTab::Modbus => write!(f, "Modbus"),
            SettingsTab::Light => write!(f, "Light"),
            SettingsTab::Display => write!(f, "Display"),
            SettingsTab::System => write!(f, "System"),
        }
    }
}

impl std::str::FromStr for SettingsTab {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        SettingsTab::ALL
            .into_iter()
            .find(|tab| tab.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown settings tab: {}", s))
    }
}

/// Value type and bounds of a field
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    Bool,
    Int { min: i64, max: i64 },
    Float { min: f64, max: f64 },
    Text,
    /// Reported by the controller, never sent back
    ReadOnly,
}

/// Static description of one field of a view
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub view: ViewKey,
    pub name: &'static str,
    pub kind: FieldKind,
    pub tab: Option<SettingsTab>,
}

const fn status(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        view: ViewKey::Status,
        name,
        kind,
        tab: None,
    }
}

const fn fan(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        view: ViewKey::Fans,
        name,
        kind,
        tab: None,
    }
}

const fn setting(name: &'static str, tab: SettingsTab, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        view: ViewKey::Settings,
        name,
        kind,
        tab: Some(tab),
    }
}

const TEMP_F: FieldKind = FieldKind::Int { min: 100, max: 250 };
const MINUTES: FieldKind = FieldKind::Int { min: 0, max: 1440 };
const SECONDS: FieldKind = FieldKind::Int { min: 0, max: 7200 };
const REGISTER: FieldKind = FieldKind::Int { min: 0, max: 65535 };
const SERIAL_TIMEOUT: FieldKind = FieldKind::Float {
    min: 0.05,
    max: 10.0,
};
const RETRIES: FieldKind = FieldKind::Int { min: 0, max: 10 };

static STATUS_FIELDS: &[FieldSpec] = &[
    status("sauna_on", FieldKind::Bool),
    status("light_on", FieldKind::Bool),
    status("target_temp_f", TEMP_F),
];

static FAN_FIELDS: &[FieldSpec] = &[
    fan("left_fan_on", FieldKind::Bool),
    fan("right_fan_on", FieldKind::Bool),
    fan("fan_speed_pct", FieldKind::Int { min: 0, max: 100 }),
    fan(
        "running_time_after_sauna_off_hrs",
        FieldKind::Float { min: 0.0, max: 12.0 },
    ),
];

static SETTINGS_FIELDS: &[FieldSpec] = &[
    // Temperature
    setting("max_temp_f", SettingsTab::Temperature, TEMP_F),
    setting("preset_medium", SettingsTab::Temperature, TEMP_F),
    setting("preset_high", SettingsTab::Temperature, TEMP_F),
    setting(
        "lower_threshold_f",
        SettingsTab::Temperature,
        FieldKind::Int { min: 0, max: 30 },
    ),
    setting(
        "upper_threshold_f",
        SettingsTab::Temperature,
        FieldKind::Int { min: 0, max: 30 },
    ),
    setting("cooling_grace_period", SettingsTab::Temperature, SECONDS),
    // Heater health and cycle control
    setting("warmup_time", SettingsTab::Heater, SECONDS),
    setting("cooldown_time", SettingsTab::Heater, SECONDS),
    setting("max_safe_runtime_min", SettingsTab::Heater, MINUTES),
    setting("cycle_on_period_min", SettingsTab::Heater, MINUTES),
    setting("cycle_off_period_min", SettingsTab::Heater, MINUTES),
    setting("high_temp_mode", SettingsTab::Heater, FieldKind::Bool),
    setting("high_temp_threshold_f", SettingsTab::Heater, TEMP_F),
    setting("high_temp_cycle_on_period_min", SettingsTab::Heater, MINUTES),
    setting("high_temp_cycle_off_period_min", SettingsTab::Heater, MINUTES),
    // RS-485 / Modbus
    setting("serial_port", SettingsTab::Modbus, FieldKind::Text),
    setting(
        "baud_rate",
        SettingsTab::Modbus,
        FieldKind::Int {
            min: 1200,
            max: 115_200,
        },
    ),
    setting("modbus_timeout", SettingsTab::Modbus, SERIAL_TIMEOUT),
    setting("rs485_timeout", SettingsTab::Modbus, SERIAL_TIMEOUT),
    setting("modbus_retries", SettingsTab::Modbus, RETRIES),
    setting("rs485_retries", SettingsTab::Modbus, RETRIES),
    setting("temp_sensor_addr", SettingsTab::Modbus, REGISTER),
    setting("humidity_sensor_addr", SettingsTab::Modbus, REGISTER),
    setting("heater_relay_coil_addr", SettingsTab::Modbus, REGISTER),
    setting("hot_room_light_coil_addr", SettingsTab::Modbus, REGISTER),
    setting("right_fan_relay_coil_addr", SettingsTab::Modbus, REGISTER),
    setting("left_fan_relay_coil_addr", SettingsTab::Modbus, REGISTER),
    setting("fan_module_room_temp_addr", SettingsTab::Modbus, REGISTER),
    setting("fan_status_addr", SettingsTab::Modbus, REGISTER),
    setting("fan_speed_addr", SettingsTab::Modbus, REGISTER),
    setting("number_of_fans_addr", SettingsTab::Modbus, REGISTER),
    setting("fan_fault_status_addr", SettingsTab::Modbus, REGISTER),
    setting("fan_module_governor_addr", SettingsTab::Modbus, REGISTER),
    setting("fan_module_reset_governor_value", SettingsTab::Modbus, REGISTER),
    // Light
    setting("light_auto_on_off", SettingsTab::Light, FieldKind::Bool),
    setting("light_off_when_sauna_off", SettingsTab::Light, FieldKind::Bool),
    // Display
    setting(
        "display_brightness",
        SettingsTab::Display,
        FieldKind::Int { min: 0, max: 100 },
    ),
    setting("screen_width", SettingsTab::Display, FieldKind::ReadOnly),
    setting("screen_height", SettingsTab::Display, FieldKind::ReadOnly),
    setting("screen_rotation", SettingsTab::Display, FieldKind::ReadOnly),
    // System
    setting("cpu_temp", SettingsTab::System, FieldKind::ReadOnly),
    setting(
        "cpu_temp_warn",
        SettingsTab::System,
        FieldKind::Int { min: 40, max: 100 },
    ),
    setting(
        "max_sauna_on_time_hrs",
        SettingsTab::System,
        FieldKind::Int { min: 1, max: 24 },
    ),
    setting(
        "log_level",
        SettingsTab::System,
        FieldKind::Int { min: 0, max: 50 },
    ),
];

/// Key of a single field of a view.
///
/// At most one pending edit exists per `Field`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Field {
    view: ViewKey,
    name: &'static str,
}

impl Field {
    pub const SAUNA_ON: Field = Field::new(ViewKey::Status, "sauna_on");
    pub const LIGHT_ON: Field = Field::new(ViewKey::Status, "light_on");
    pub const TARGET_TEMP_F: Field = Field::new(ViewKey::Status, "target_temp_f");
    pub const LEFT_FAN_ON: Field = Field::new(ViewKey::Fans, "left_fan_on");
    pub const RIGHT_FAN_ON: Field = Field::new(ViewKey::Fans, "right_fan_on");
    pub const FAN_SPEED_PCT: Field = Field::new(ViewKey::Fans, "fan_speed_pct");
    pub const FAN_RUNTIME_HRS: Field =
        Field::new(ViewKey::Fans, "running_time_after_sauna_off_hrs");

    const fn new(view: ViewKey, name: &'static str) -> Self {
        Self { view, name }
    }

    /// Look up a known field of a view by its wire name
    pub fn lookup(view: ViewKey, name: &str) -> Option<Field> {
        view.fields()
            .iter()
            .find(|spec| spec.name == name)
            .map(|spec| Field::new(view, spec.name))
    }

    /// Look up a known settings field by its wire name
    pub fn setting(name: &str) -> Option<Field> {
        Self::lookup(ViewKey::Settings, name)
    }

    pub fn view(&self) -> ViewKey {
        self.view
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn spec(&self) -> Option<&'static FieldSpec> {
        self.view.fields().iter().find(|spec| spec.name == self.name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.view, self.name)
    }
}

/// A single field value as carried on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    const NUMERIC_TOLERANCE: f64 = 1e-6;

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            FieldValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Whether a snapshot value confirms this value.
    ///
    /// Integers and floats compare numerically: the controller may echo
    /// `190` for a submitted `190.0`.
    pub fn matches(&self, other: &FieldValue) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => (a - b).abs() < Self::NUMERIC_TOLERANCE,
            _ => self == other,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(value.into())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

/// Field-level access to a snapshot section, used to confirm and overlay
/// pending edits
pub trait Section: Clone {
    /// Current value of a field, if the section carries it
    fn get(&self, name: &str) -> Option<FieldValue>;

    /// Overwrite a field; returns false when the value does not fit
    fn set(&mut self, name: &str, value: &FieldValue) -> bool;
}

/// Payload of the status endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub sauna_on: bool,
    #[serde(default)]
    pub heater_on: bool,
    #[serde(default)]
    pub heater_error: bool,
    #[serde(default)]
    pub light_on: bool,
    pub hot_room_temp_f: f64,
    #[serde(default)]
    pub hot_room_humidity: Option<f64>,
    pub target_temp_f: f64,
    #[serde(default)]
    pub wifi_connected: bool,
    #[serde(default)]
    pub has_errors: bool,
}

impl Section for StatusSnapshot {
    fn get(&self, name: &str) -> Option<FieldValue> {
        match name {
            "sauna_on" => Some(self.sauna_on.into()),
            "light_on" => Some(self.light_on.into()),
            "target_temp_f" => Some(self.target_temp_f.into()),
            _ => None,
        }
    }

    fn set(&mut self, name: &str, value: &FieldValue) -> bool {
        match (name, value) {
            ("sauna_on", FieldValue::Bool(b)) => self.sauna_on = *b,
            ("light_on", FieldValue::Bool(b)) => self.light_on = *b,
            ("target_temp_f", v) => match v.as_f64() {
                Some(t) => self.target_temp_f = t,
                None => return false,
            },
            _ => return false,
        }
        true
    }
}

/// Payload of the fan status endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanSnapshot {
    pub left_fan_on: bool,
    pub right_fan_on: bool,
    pub fan_speed_pct: i64,
    #[serde(default)]
    pub left_fan_rpm: Option<u32>,
    #[serde(default)]
    pub right_fan_rpm: Option<u32>,
    pub running_time_after_sauna_off_hrs: f64,
}

impl Section for FanSnapshot {
    fn get(&self, name: &str) -> Option<FieldValue> {
        match name {
            "left_fan_on" => Some(self.left_fan_on.into()),
            "right_fan_on" => Some(self.right_fan_on.into()),
            "fan_speed_pct" => Some(self.fan_speed_pct.into()),
            "running_time_after_sauna_off_hrs" => {
                Some(self.running_time_after_sauna_off_hrs.into())
            }
            _ => None,
        }
    }

    fn set(&mut self, name: &str, value: &FieldValue) -> bool {
        match (name, value) {
            ("left_fan_on", FieldValue::Bool(b)) => self.left_fan_on = *b,
            ("right_fan_on", FieldValue::Bool(b)) => self.right_fan_on = *b,
            ("fan_speed_pct", v) => match v.as_i64() {
                Some(pct) => self.fan_speed_pct = pct,
                None => return false,
            },
            ("running_time_after_sauna_off_hrs", v) => match v.as_f64() {
                Some(hrs) => self.running_time_after_sauna_off_hrs = hrs,
                None => return false,
            },
            _ => return false,
        }
        true
    }
}

/// The full settings record.
///
/// The controller's field set has grown over time, so the record is kept
/// open: unknown fields are preserved and sent back unchanged, and `null`
/// values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SettingsRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl SettingsRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Record without read-only fields, as posted to the update endpoint
    pub fn writable(&self) -> SettingsRecord {
        let fields = self
            .fields
            .iter()
            .filter(|(name, _)| {
                !matches!(
                    Field::setting(name).and_then(|f| f.spec()).map(|s| s.kind),
                    Some(FieldKind::ReadOnly)
                )
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        SettingsRecord { fields }
    }
}

impl<'de> Deserialize<'de> for SettingsRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Option<FieldValue>>::deserialize(deserializer)?;
        let fields = raw
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v)))
            .collect();
        Ok(SettingsRecord { fields })
    }
}

impl Section for SettingsRecord {
    fn get(&self, name: &str) -> Option<FieldValue> {
        self.fields.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: &FieldValue) -> bool {
        self.fields.insert(name.to_string(), value.clone());
        true
    }
}

/// One entry of the controller's error log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

/// Payload of the errors endpoint, in controller order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLog {
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
}

/// A complete, successfully parsed response for one view
#[derive(Debug, Clone, PartialEq)]
pub enum ViewPayload {
    Status(StatusSnapshot),
    Fans(FanSnapshot),
    Settings(SettingsRecord),
    Errors(ErrorLog),
}

impl ViewPayload {
    pub fn view(&self) -> ViewKey {
        match self {
            ViewPayload::Status(_) => ViewKey::Status,
            ViewPayload::Fans(_) => ViewKey::Fans,
            ViewPayload::Settings(_) => ViewKey::Settings,
            ViewPayload::Errors(_) => ViewKey::Errors,
        }
    }

    /// Current value of a field carried by this payload
    pub fn get(&self, name: &str) -> Option<FieldValue> {
        match self {
            ViewPayload::Status(s) => s.get(name),
            ViewPayload::Fans(f) => f.get(name),
            ViewPayload::Settings(s) => s.get(name),
            ViewPayload::Errors(_) => None,
        }
    }
}
