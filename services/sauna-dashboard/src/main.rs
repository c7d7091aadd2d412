//! Sauna dashboard CLI
//!
//! Watches a sauna controller or sends it a single command.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use sauna_dashboard::client::{FanUpdate, Preset};
use sauna_dashboard::dispatcher::Intent;
use sauna_dashboard::snapshot::{FieldValue, SettingsTab, ViewKey};
use sauna_dashboard::units::TemperatureUnit;
use sauna_dashboard::view_model::ViewState;
use sauna_dashboard::views::{ErrorsPanel, FanPanel, SettingsPanel, StatusPanel};
use sauna_dashboard::{load_config, Config, DashboardSession, SessionBuilder};
use tracing::Level;

#[derive(Parser)]
#[command(name = "sauna-dashboard")]
#[command(about = "Sauna controller dashboard")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Controller base URL (overrides config file)
    #[arg(long)]
    base_url: Option<String>,

    /// Anti-forgery token for mutating requests (overrides config file)
    #[arg(long)]
    csrf_token: Option<String>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: Level,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Poll every view and print changes until interrupted
    Watch,
    /// Print the status panel
    Status,
    /// Print the fan panel
    Fans,
    /// Print one settings tab
    Settings {
        #[arg(long, default_value = "temperature")]
        tab: SettingsTab,
    },
    /// Print the controller's error log
    Errors,
    ToggleSauna,
    ToggleLight,
    /// Set the target temperature
    SetTemp {
        value: f64,
        /// Value is in degrees Celsius
        #[arg(long)]
        celsius: bool,
    },
    /// Select a stored preset temperature
    Preset {
        #[arg(value_parser = parse_preset)]
        preset: Preset,
    },
    /// Update fan state
    Fan {
        #[arg(long)]
        left: Option<Switch>,
        #[arg(long)]
        right: Option<Switch>,
        /// Fan speed in percent
        #[arg(long)]
        speed: Option<i64>,
        /// Run-on time after the sauna is switched off, in hours
        #[arg(long)]
        runtime: Option<f64>,
    },
    /// Update settings, e.g. `set max_temp_f=230 light_auto_on_off=true`
    Set {
        #[arg(required = true)]
        assignments: Vec<String>,
    },
    ClearErrors,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Switch {
    On,
    Off,
}

impl From<Switch> for bool {
    fn from(switch: Switch) -> Self {
        matches!(switch, Switch::On)
    }
}

fn parse_preset(s: &str) -> Result<Preset, String> {
    s.parse()
}

/// `name=value`, with the value read as JSON when possible and as text
/// otherwise
fn parse_assignment(assignment: &str) -> Result<(String, FieldValue), String> {
    let (name, raw) = assignment
        .split_once('=')
        .ok_or_else(|| format!("Expected name=value, got '{}'", assignment))?;
    let value = serde_json::from_str::<FieldValue>(raw)
        .unwrap_or_else(|_| FieldValue::Text(raw.to_string()));
    Ok((name.trim().to_string(), value))
}

fn render_all(state: &ViewState) {
    println!("{}", StatusPanel::render(state));
    println!("{}", FanPanel::render(state));
    println!("{}", ErrorsPanel::render(state));
}

/// Fetch a view for display, reporting but tolerating failure
async fn load(session: &DashboardSession, view: ViewKey) {
    if let Err(e) = session.refresh(view).await {
        tracing::warn!("Could not load {} view: {}", view, e);
    }
}

async fn one_shot(
    session: &DashboardSession,
    command: Cmd,
) -> Result<(), Box<dyn std::error::Error>> {
    let intent = match command {
        Cmd::Watch => return Ok(()),
        Cmd::Status => {
            session.refresh(ViewKey::Status).await?;
            println!("{}", StatusPanel::render(&session.view_state().await));
            return Ok(());
        }
        Cmd::Fans => {
            session.refresh(ViewKey::Fans).await?;
            println!("{}", FanPanel::render(&session.view_state().await));
            return Ok(());
        }
        Cmd::Settings { tab } => {
            session.refresh(ViewKey::Settings).await?;
            session.set_settings_tab(tab).await;
            println!("{}", SettingsPanel::render(&session.view_state().await));
            return Ok(());
        }
        Cmd::Errors => {
            session.refresh(ViewKey::Errors).await?;
            println!("{}", ErrorsPanel::render(&session.view_state().await));
            return Ok(());
        }
        Cmd::ToggleSauna => Intent::ToggleSauna,
        Cmd::ToggleLight => Intent::ToggleLight,
        Cmd::SetTemp { value, celsius } => {
            // The controller's max_temp_f bounds the target
            load(session, ViewKey::Settings).await;
            let unit = if celsius {
                TemperatureUnit::Celsius
            } else {
                TemperatureUnit::Fahrenheit
            };
            session.set_display_unit(unit).await;
            Intent::SetTargetTemperature { value }
        }
        Cmd::Preset { preset } => Intent::SelectPreset(preset),
        Cmd::Fan {
            left,
            right,
            speed,
            runtime,
        } => Intent::UpdateFans(FanUpdate {
            left_fan_on: left.map(bool::from),
            right_fan_on: right.map(bool::from),
            fan_speed_pct: speed,
            running_time_after_sauna_off_hrs: runtime,
        }),
        Cmd::Set { assignments } => {
            let changes = assignments
                .iter()
                .map(|a| parse_assignment(a))
                .collect::<Result<Vec<_>, _>>()?;
            session.refresh(ViewKey::Settings).await?;
            Intent::UpdateSettings(changes)
        }
        Cmd::ClearErrors => Intent::ClearErrors,
    };

    let result = session.dispatch(intent).await?;
    tracing::debug!("Command result: {:?}", result);

    load(session, ViewKey::Status).await;
    load(session, ViewKey::Fans).await;
    render_all(&session.view_state().await);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(
        "Parsed command line arguments: config={:?}, base_url={:?}, log_level={:?}",
        args.config,
        args.base_url,
        args.log_level
    );

    let mut config = if let Some(config_path) = &args.config {
        tracing::debug!("Loading configuration from {:?}", config_path);
        load_config(config_path)?
    } else {
        tracing::debug!("Using default configuration");
        Config::default()
    };

    if let Some(base_url) = args.base_url {
        config.server.base_url = base_url;
    }
    if let Some(token) = args.csrf_token {
        config.server.csrf_token = Some(token);
    }

    match args.command.unwrap_or(Cmd::Watch) {
        Cmd::Watch => {
            tracing::info!("Watching controller at {}", config.server.base_url);
            sauna_dashboard::run(config, render_all).await?;
        }
        command => {
            let session = SessionBuilder::new(config).build()?;
            one_shot(&session, command).await?;
        }
    }

    Ok(())
}
