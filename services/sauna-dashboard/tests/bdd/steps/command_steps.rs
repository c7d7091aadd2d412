//! BDD step definitions for commands feature

use std::sync::Arc;
use std::time::Duration;

use cucumber::{given, then, when};

use sauna_dashboard::client::{FanUpdate, Preset};
use sauna_dashboard::config::{CommandsConfig, LimitsConfig};
use sauna_dashboard::dispatcher::{CommandDispatcher, Intent};
use sauna_dashboard::scheduler::PollingScheduler;
use sauna_dashboard::snapshot::{Field, FieldValue, Section, ViewKey};
use sauna_dashboard::units::TemperatureUnit;
use sauna_dashboard::view_model::{SharedViewModel, ViewModel};
use sauna_dashboard::views::{ErrorsPanel, FanPanel};
use sauna_dashboard::DashboardError;

use crate::fake_controller::{setting_f64, FakeController};
use crate::steps::parse_unit;
use crate::world::DashboardWorld;

fn controller(world: &DashboardWorld) -> &Arc<FakeController> {
    world.controller.as_ref().expect("controller not set up")
}

async fn refresh(world: &DashboardWorld, view: ViewKey) {
    let scheduler = PollingScheduler::new(
        controller(world).clone(),
        world.shared.clone().expect("view model not set up"),
    );
    scheduler.refresh(view).await.expect("refresh failed");
}

async fn dispatch(world: &mut DashboardWorld, intent: Intent) {
    let dispatcher = world.dispatcher.as_ref().expect("dispatcher not set up");
    let result = dispatcher.dispatch(intent).await;
    world.dispatch_result = Some(result);
}

#[given(expr = "a connected controller with a target of {int} °F and a maximum of {int} °F")]
async fn connected_controller(world: &mut DashboardWorld, target: i64, max: i64) {
    let fake = Arc::new(FakeController::new());
    fake.modify(|s| {
        s.status.target_temp_f = target as f64;
        s.settings.set("max_temp_f", &FieldValue::Int(max));
    });

    let shared = SharedViewModel::new(ViewModel::new(
        Duration::from_secs(5),
        TemperatureUnit::Fahrenheit,
    ));
    let commands = CommandsConfig {
        max_retries: 2,
        retry_delay: Duration::from_millis(10),
    };
    world.dispatcher = Some(CommandDispatcher::new(
        fake.clone(),
        shared.clone(),
        LimitsConfig::default(),
        commands,
    ));
    world.controller = Some(fake);
    world.shared = Some(shared);

    for view in ViewKey::ALL {
        refresh(world, view).await;
    }
}

#[given(expr = "the display unit is {word}")]
async fn display_unit_is(world: &mut DashboardWorld, unit: String) {
    let unit = parse_unit(&unit);
    let shared = world.shared.as_ref().expect("view model not set up");
    shared.update(|vm| vm.set_display_unit(unit)).await;
}

#[given("the controller is unreachable")]
fn controller_unreachable(world: &mut DashboardWorld) {
    controller(world).set_fail_commands(true);
}

#[given(expr = "the controller reports a {string} error")]
async fn controller_reports_error(world: &mut DashboardWorld, kind: String) {
    controller(world).add_error(&kind, "reported by controller");
    refresh(world, ViewKey::Errors).await;
}

#[when(expr = "the user requests a target of {int} {word}")]
async fn user_requests_target(world: &mut DashboardWorld, value: i64, _unit: String) {
    dispatch(
        world,
        Intent::SetTargetTemperature {
            value: value as f64,
        },
    )
    .await;
}

#[when("the user toggles the sauna")]
async fn user_toggles_sauna(world: &mut DashboardWorld) {
    dispatch(world, Intent::ToggleSauna).await;
}

#[when(expr = "the user sets the fan speed to {int}")]
async fn user_sets_fan_speed(world: &mut DashboardWorld, pct: i64) {
    let update = FanUpdate {
        fan_speed_pct: Some(pct),
        ..Default::default()
    };
    dispatch(world, Intent::UpdateFans(update)).await;
}

#[when(expr = "the user selects the {word} preset")]
async fn user_selects_preset(world: &mut DashboardWorld, preset: String) {
    let preset: Preset = preset.parse().expect("unknown preset");
    dispatch(world, Intent::SelectPreset(preset)).await;
}

#[when(expr = "the user changes setting {string} to {int}")]
async fn user_changes_setting(world: &mut DashboardWorld, name: String, value: i64) {
    dispatch(
        world,
        Intent::UpdateSettings(vec![(name, FieldValue::Int(value))]),
    )
    .await;
}

#[when("the user clears the errors")]
async fn user_clears_errors(world: &mut DashboardWorld) {
    dispatch(world, Intent::ClearErrors).await;
}

#[then("the dispatch succeeded")]
fn dispatch_succeeded(world: &mut DashboardWorld) {
    let result = world.dispatch_result.as_ref().expect("nothing dispatched");
    assert!(result.is_ok(), "dispatch failed: {:?}", result);
}

#[then(expr = "the dispatch failed with a {word} error")]
fn dispatch_failed(world: &mut DashboardWorld, kind: String) {
    let result = world.dispatch_result.as_ref().expect("nothing dispatched");
    match (kind.as_str(), result) {
        ("validation", Err(DashboardError::Validation(_))) => {}
        ("transport", Err(DashboardError::Transport(_))) => {}
        (kind, other) => panic!("expected a {} error, got {:?}", kind, other),
    }
}

#[then("the controller received no commands")]
fn controller_received_nothing(world: &mut DashboardWorld) {
    assert!(controller(world).commands().is_empty());
}

#[then(expr = "the controller received {int} command(s)")]
fn controller_received_count(world: &mut DashboardWorld, count: usize) {
    assert_eq!(controller(world).commands().len(), count);
}

#[then(expr = "the controller received a {string} command")]
fn controller_received_named(world: &mut DashboardWorld, name: String) {
    let commands = controller(world).commands();
    let last = commands.last().expect("no commands received");
    assert_eq!(last.name(), name);
}

#[then(expr = "the controller has a target of {int} °F")]
fn controller_has_target(world: &mut DashboardWorld, target: i64) {
    assert_eq!(controller(world).state().status.target_temp_f, target as f64);
}

#[then(expr = "the controller setting {string} is {int}")]
fn controller_setting_number(world: &mut DashboardWorld, name: String, value: i64) {
    let state = controller(world).state();
    assert_eq!(setting_f64(&state, &name), Some(value as f64));
}

#[then(expr = "the controller setting {string} is {string}")]
fn controller_setting_text(world: &mut DashboardWorld, name: String, value: String) {
    let state = controller(world).state();
    assert_eq!(state.settings.get(&name), Some(FieldValue::Text(value)));
}

#[then(expr = "the fan speed shows {int} marked as not saved")]
async fn fan_speed_not_saved(world: &mut DashboardWorld, pct: i64) {
    let state = world.view_state().await;
    assert!(state.save_failed.contains(&Field::FAN_SPEED_PCT));
    let panel = FanPanel::render(&state);
    assert_eq!(panel.speed, format!("{}% (not saved)", pct));
}

#[then(expr = "the error panel shows {string}")]
async fn error_panel_shows(world: &mut DashboardWorld, text: String) {
    let panel = ErrorsPanel::render(&world.view_state().await);
    assert!(panel.to_string().contains(&text), "panel:\n{}", panel);
}
