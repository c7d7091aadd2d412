//! BDD step definitions for reconciliation feature

use std::time::Duration;

use cucumber::{given, then, when};
use tokio::time::Instant;

use sauna_dashboard::snapshot::{Field, FieldValue, StatusSnapshot, ViewPayload};
use sauna_dashboard::units::{self, TemperatureUnit};
use sauna_dashboard::view_model::{ReconcileOutcome, ViewModel};
use sauna_dashboard::views::StatusPanel;

use crate::steps::parse_unit;
use crate::world::DashboardWorld;

fn status(target_temp_f: f64) -> StatusSnapshot {
    StatusSnapshot {
        sauna_on: false,
        heater_on: false,
        heater_error: false,
        light_on: false,
        hot_room_temp_f: 75.0,
        hot_room_humidity: Some(30.0),
        target_temp_f,
        wifi_connected: true,
        has_errors: false,
    }
}

/// Issue a ticket and reconcile the current remote status at once
fn status_arrives(world: &mut DashboardWorld) {
    let payload = ViewPayload::Status(world.remote_status.clone().expect("no remote status"));
    let model = world.model();
    let ticket = model.issue_ticket();
    let outcome = model.reconcile(ticket, payload);
    world.last_outcome = Some(outcome);
}

fn field_by_label(label: &str) -> Field {
    match label {
        "target" => Field::TARGET_TEMP_F,
        "sauna" => Field::SAUNA_ON,
        "light" => Field::LIGHT_ON,
        other => panic!("Unknown field label: {}", other),
    }
}

#[given(expr = "a dashboard showing a target of {int} °F with a {int} second edit timeout")]
fn dashboard_showing_target(world: &mut DashboardWorld, target: i64, timeout_secs: u64) {
    world.model = Some(ViewModel::new(
        Duration::from_secs(timeout_secs),
        TemperatureUnit::Fahrenheit,
    ));
    world.clock = Some(Instant::now());
    world.remote_status = Some(status(target as f64));
    status_arrives(world);
}

#[given(expr = "a status poll {string} is issued")]
fn poll_issued(world: &mut DashboardWorld, name: String) {
    let ticket = world.model().issue_ticket();
    world.tickets.insert(name, ticket);
}

#[when(expr = "the user sets the target to {int} {word}")]
fn user_sets_target(world: &mut DashboardWorld, value: i64, unit: String) {
    let temp_f = units::to_canonical(value as f64, parse_unit(&unit)).round() as i64;
    let now = world.now();
    world
        .model()
        .apply_local_edit(Field::TARGET_TEMP_F, FieldValue::Int(temp_f), now);
}

#[when(expr = "a status snapshot with a target of {int} °F arrives")]
fn snapshot_with_target_arrives(world: &mut DashboardWorld, target: i64) {
    if let Some(remote) = world.remote_status.as_mut() {
        remote.target_temp_f = target as f64;
    }
    status_arrives(world);
}

#[when("a status snapshot with the sauna on arrives")]
fn snapshot_with_sauna_on_arrives(world: &mut DashboardWorld) {
    if let Some(remote) = world.remote_status.as_mut() {
        remote.sauna_on = true;
    }
    status_arrives(world);
}

#[when(expr = "poll {string} returns a target of {int} °F")]
fn poll_returns_target(world: &mut DashboardWorld, name: String, target: i64) {
    let ticket = world.tickets[&name];
    let outcome = world
        .model()
        .reconcile(ticket, ViewPayload::Status(status(target as f64)));
    world.last_outcome = Some(outcome);
}

#[when(expr = "poll {string} returns the sauna off")]
fn poll_returns_sauna_off(world: &mut DashboardWorld, name: String) {
    let ticket = world.tickets[&name];
    let mut payload = world.remote_status.clone().expect("no remote status");
    payload.sauna_on = false;
    let outcome = world.model().reconcile(ticket, ViewPayload::Status(payload));
    world.last_outcome = Some(outcome);
}

#[when("the controller confirms the sauna is on")]
fn controller_confirms_sauna_on(world: &mut DashboardWorld) {
    let now = world.now();
    let model = world.model();
    let ticket = model.issue_ticket();
    model.apply_confirmed(Field::SAUNA_ON, FieldValue::Bool(true), ticket, now);
}

#[when(expr = "{int} seconds pass")]
fn seconds_pass(world: &mut DashboardWorld, secs: u64) {
    let now = world.now() + Duration::from_secs(secs);
    world.clock = Some(now);
    let expired = world.model().timeout_tick(now);
    world.expired.extend(expired);
}

#[when(expr = "the display unit is switched to {word}")]
fn switch_unit(world: &mut DashboardWorld, unit: String) {
    world.model().set_display_unit(parse_unit(&unit));
}

#[then(expr = "the target shows {int} {word}")]
async fn target_shows(world: &mut DashboardWorld, value: i64, unit: String) {
    let state = world.view_state().await;
    assert_eq!(state.unit, parse_unit(&unit));
    assert_eq!(state.target_temperature(), Some(value));
}

#[then(expr = "the status panel shows the target as {string}")]
async fn panel_shows_target(world: &mut DashboardWorld, expected: String) {
    let panel = StatusPanel::render(&world.view_state().await);
    assert_eq!(panel.target_temperature, expected);
}

#[then(expr = "the sauna shows {word}")]
async fn sauna_shows(world: &mut DashboardWorld, expected: String) {
    let state = world.view_state().await;
    let on = state.status.expect("status not loaded").sauna_on;
    assert_eq!(on, expected == "on", "sauna is {}", if on { "on" } else { "off" });
}

#[then(expr = "the {word} is pending")]
async fn field_is_pending(world: &mut DashboardWorld, label: String) {
    let state = world.view_state().await;
    assert!(state.is_pending(field_by_label(&label)));
}

#[then(expr = "the {word} is held as confirmed")]
async fn field_is_confirmed(world: &mut DashboardWorld, label: String) {
    let state = world.view_state().await;
    assert!(state.is_confirmed(field_by_label(&label)));
}

#[then("no field is held as confirmed")]
async fn no_field_confirmed(world: &mut DashboardWorld) {
    let state = world.view_state().await;
    assert!(state.confirmed.is_empty(), "confirmed: {:?}", state.confirmed);
}

#[then("no field is pending")]
async fn no_field_pending(world: &mut DashboardWorld) {
    let state = world.view_state().await;
    assert!(state.pending.is_empty(), "pending: {:?}", state.pending);
}

#[then(expr = "{int} edit(s) timed out")]
fn edits_timed_out(world: &mut DashboardWorld, count: usize) {
    assert_eq!(world.expired.len(), count);
}

#[then("the last response was stale")]
fn last_response_stale(world: &mut DashboardWorld) {
    assert_eq!(world.last_outcome, Some(ReconcileOutcome::Stale));
}
