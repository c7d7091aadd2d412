//! BDD step definitions for the sauna dashboard

pub mod command_steps;
pub mod reconciliation_steps;

use sauna_dashboard::units::TemperatureUnit;

pub(crate) fn parse_unit(symbol: &str) -> TemperatureUnit {
    match symbol {
        "°F" | "Fahrenheit" => TemperatureUnit::Fahrenheit,
        "°C" | "Celsius" => TemperatureUnit::Celsius,
        other => panic!("Unknown unit: {}", other),
    }
}
