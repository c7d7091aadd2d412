//! Temperature unit conversion
//!
//! Temperatures are stored canonically in degrees Fahrenheit and never
//! rounded. Rounding to whole degrees happens only in [`to_display`], so
//! `to_canonical(to_display(x))` may differ from `x` by up to one degree.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unit a temperature is displayed in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureUnit {
    #[default]
    Fahrenheit,
    Celsius,
}

impl TemperatureUnit {
    pub fn toggled(self) -> Self {
        match self {
            TemperatureUnit::Fahrenheit => TemperatureUnit::Celsius,
            TemperatureUnit::Celsius => TemperatureUnit::Fahrenheit,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Fahrenheit => "°F",
            TemperatureUnit::Celsius => "°C",
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Exact conversion of a canonical °F value into `unit`
pub fn convert(canonical_f: f64, unit: TemperatureUnit) -> f64 {
    match unit {
        TemperatureUnit::Fahrenheit => canonical_f,
        TemperatureUnit::Celsius => (canonical_f - 32.0) * 5.0 / 9.0,
    }
}

/// Whole-degree display value of a canonical °F temperature
pub fn to_display(canonical_f: f64, unit: TemperatureUnit) -> i64 {
    convert(canonical_f, unit).round() as i64
}

/// Canonical °F value of a temperature entered in `unit`
pub fn to_canonical(display_value: f64, unit: TemperatureUnit) -> f64 {
    match unit {
        TemperatureUnit::Fahrenheit => display_value,
        TemperatureUnit::Celsius => display_value * 9.0 / 5.0 + 32.0,
    }
}

/// Display text such as `"190°F"`
pub fn format(canonical_f: f64, unit: TemperatureUnit) -> String {
    format!("{}{}", to_display(canonical_f, unit), unit.symbol())
}
