//! View model: last-known-good snapshots plus locally pending edits
//!
//! Every field is either synced with the latest snapshot or overlaid by a
//! pending edit. A pending edit is cleared when a snapshot confirms it or
//! when it outlives the edit timeout, whichever comes first. The rendered
//! [`ViewState`] is always recomputed from snapshots, pending edits and
//! presentation state; nothing writes into it directly.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ReconciliationTimeout;
use crate::snapshot::{
    ErrorLog, FanSnapshot, Field, FieldValue, Section, SettingsRecord, SettingsTab,
    StatusSnapshot, ViewKey, ViewPayload,
};
use crate::units::{self, TemperatureUnit};

/// Issue order of a fetch or of a confirmed command result
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Ticket(u64);

/// Identity of one applied edit; a newer edit of the same field gets a
/// new id
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EditId(u64);

/// A locally applied value awaiting server agreement
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEdit {
    pub id: EditId,
    pub value: FieldValue,
    pub applied_at: Instant,
    /// Set when the controller itself returned this value in a command
    /// result; snapshots issued before this ticket cannot override it and
    /// the edit timeout does not apply.
    pub confirmed_at: Option<Ticket>,
    pub save_failed: bool,
}

impl PendingEdit {
    pub fn is_confirmed(&self) -> bool {
        self.confirmed_at.is_some()
    }
}

/// Synchronization state of one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSync {
    Synced,
    Pending,
    SaveFailed,
    /// Returned by the controller, awaiting a newer snapshot
    Confirmed,
}

/// Latest complete payload of every view
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceSnapshot {
    pub status: Option<StatusSnapshot>,
    pub fans: Option<FanSnapshot>,
    pub settings: Option<SettingsRecord>,
    pub errors: Option<ErrorLog>,
}

impl DeviceSnapshot {
    fn get(&self, field: Field) -> Option<FieldValue> {
        match field.view() {
            ViewKey::Status => self.status.as_ref()?.get(field.name()),
            ViewKey::Fans => self.fans.as_ref()?.get(field.name()),
            ViewKey::Settings => self.settings.as_ref()?.get(field.name()),
            ViewKey::Errors => None,
        }
    }
}

/// Polling health of a view
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewHealth {
    pub last_applied: Option<Ticket>,
    pub last_success_epoch_ms: Option<u64>,
    pub consecutive_errors: u32,
}

/// Result of reconciling one payload
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Snapshot replaced; the listed pending edits were cleared
    Applied { cleared: Vec<Field> },
    /// A newer payload for the same view was already applied
    Stale,
}

/// The value renderers draw from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    pub status: Option<StatusSnapshot>,
    pub fans: Option<FanSnapshot>,
    pub settings: Option<SettingsRecord>,
    pub errors: Option<ErrorLog>,
    pub unit: TemperatureUnit,
    pub settings_tab: SettingsTab,
    /// Local edits not yet seen in a snapshot
    pub pending: BTreeSet<Field>,
    /// Values the controller returned for a command, shown until a newer
    /// snapshot arrives
    pub confirmed: BTreeSet<Field>,
    pub save_failed: BTreeSet<Field>,
    pub health: BTreeMap<ViewKey, ViewHealth>,
}

impl ViewState {
    /// Room temperature in whole degrees of the display unit
    pub fn room_temperature(&self) -> Option<i64> {
        self.status
            .as_ref()
            .map(|s| units::to_display(s.hot_room_temp_f, self.unit))
    }

    /// Target temperature in whole degrees of the display unit
    pub fn target_temperature(&self) -> Option<i64> {
        self.status
            .as_ref()
            .map(|s| units::to_display(s.target_temp_f, self.unit))
    }

    /// Rendered value of a field
    pub fn value(&self, field: Field) -> Option<FieldValue> {
        match field.view() {
            ViewKey::Status => self.status.as_ref()?.get(field.name()),
            ViewKey::Fans => self.fans.as_ref()?.get(field.name()),
            ViewKey::Settings => self.settings.as_ref()?.get(field.name()),
            ViewKey::Errors => None,
        }
    }

    pub fn is_pending(&self, field: Field) -> bool {
        self.pending.contains(&field)
    }

    pub fn is_confirmed(&self, field: Field) -> bool {
        self.confirmed.contains(&field)
    }

    /// Maximum target temperature the controller currently allows
    pub fn max_temp_f(&self) -> Option<f64> {
        self.settings
            .as_ref()?
            .get("max_temp_f")
            .and_then(|v| v.as_f64())
    }
}

/// Single source of truth for one dashboard session
#[derive(Debug)]
pub struct ViewModel {
    snapshot: DeviceSnapshot,
    pending: BTreeMap<Field, PendingEdit>,
    unit: TemperatureUnit,
    settings_tab: SettingsTab,
    edit_timeout: Duration,
    next_ticket: u64,
    next_edit: u64,
    health: BTreeMap<ViewKey, ViewHealth>,
}

impl ViewModel {
    pub fn new(edit_timeout: Duration, unit: TemperatureUnit) -> Self {
        Self {
            snapshot: DeviceSnapshot::default(),
            pending: BTreeMap::new(),
            unit,
            settings_tab: SettingsTab::default(),
            edit_timeout,
            next_ticket: 0,
            next_edit: 0,
            health: ViewKey::ALL
                .into_iter()
                .map(|view| (view, ViewHealth::default()))
                .collect(),
        }
    }

    /// Reserve the next ticket in issue order
    pub fn issue_ticket(&mut self) -> Ticket {
        self.next_ticket += 1;
        Ticket(self.next_ticket)
    }

    pub fn snapshot(&self) -> &DeviceSnapshot {
        &self.snapshot
    }

    pub fn pending_edit(&self, field: Field) -> Option<&PendingEdit> {
        self.pending.get(&field)
    }

    pub fn field_sync(&self, field: Field) -> FieldSync {
        match self.pending.get(&field) {
            None => FieldSync::Synced,
            Some(edit) if edit.is_confirmed() => FieldSync::Confirmed,
            Some(edit) if edit.save_failed => FieldSync::SaveFailed,
            Some(_) => FieldSync::Pending,
        }
    }

    fn next_edit_id(&mut self) -> EditId {
        self.next_edit += 1;
        EditId(self.next_edit)
    }

    pub fn health(&self, view: ViewKey) -> Option<&ViewHealth> {
        self.health.get(&view)
    }

    pub fn edit_timeout(&self) -> Duration {
        self.edit_timeout
    }

    /// Record a user edit. A newer edit of the same field replaces the older
    /// one; the superseded edit is returned.
    pub fn apply_local_edit(
        &mut self,
        field: Field,
        value: FieldValue,
        now: Instant,
    ) -> Option<PendingEdit> {
        debug!("Local edit {} = {}", field, value);
        let id = self.next_edit_id();
        self.pending.insert(
            field,
            PendingEdit {
                id,
                value,
                applied_at: now,
                confirmed_at: None,
                save_failed: false,
            },
        )
    }

    /// Record a value the controller returned for a command.
    ///
    /// `ticket` must be issued after the command result was received.
    pub fn apply_confirmed(&mut self, field: Field, value: FieldValue, ticket: Ticket, now: Instant) {
        debug!("Confirmed {} = {} at {:?}", field, value, ticket);
        let id = self.next_edit_id();
        self.pending.insert(
            field,
            PendingEdit {
                id,
                value,
                applied_at: now,
                confirmed_at: Some(ticket),
                save_failed: false,
            },
        );
    }

    /// Flag the edit `id` of `field` after its command failed to reach the
    /// controller. The edit keeps overlaying the view until it times out.
    ///
    /// Returns false when a newer edit or a confirmed value has replaced it
    /// in the meantime; that one is left alone.
    pub fn mark_save_failed(&mut self, field: Field, id: EditId) -> bool {
        match self.pending.get_mut(&field) {
            Some(edit) if edit.id == id && !edit.is_confirmed() => {
                edit.save_failed = true;
                true
            }
            _ => false,
        }
    }

    /// Replace a view's snapshot with a complete payload and clear the
    /// pending edits it confirms.
    pub fn reconcile(&mut self, ticket: Ticket, payload: ViewPayload) -> ReconcileOutcome {
        let view = payload.view();
        let health = self.health.entry(view).or_default();
        if health.last_applied.is_some_and(|last| ticket < last) {
            debug!("Dropping stale {} snapshot {:?}", view, ticket);
            return ReconcileOutcome::Stale;
        }
        health.last_applied = Some(ticket);
        health.last_success_epoch_ms = Some(current_epoch_ms());
        health.consecutive_errors = 0;

        let mut cleared = Vec::new();
        self.pending.retain(|field, edit| {
            if field.view() != view {
                return true;
            }
            let keep = match edit.confirmed_at {
                // The controller already told us this value; only a snapshot
                // issued after that can supersede it.
                Some(confirmed) => ticket < confirmed,
                None => !payload
                    .get(field.name())
                    .is_some_and(|current| edit.value.matches(&current)),
            };
            if !keep {
                cleared.push(*field);
            }
            keep
        });

        match payload {
            ViewPayload::Status(s) => self.snapshot.status = Some(s),
            ViewPayload::Fans(f) => self.snapshot.fans = Some(f),
            ViewPayload::Settings(s) => self.snapshot.settings = Some(s),
            ViewPayload::Errors(e) => self.snapshot.errors = Some(e),
        }

        if !cleared.is_empty() {
            debug!("{} snapshot confirmed {:?}", view, cleared);
        }
        ReconcileOutcome::Applied { cleared }
    }

    /// Count a failed poll; returns the number of consecutive failures
    pub fn record_poll_failure(&mut self, view: ViewKey) -> u32 {
        let health = self.health.entry(view).or_default();
        health.consecutive_errors += 1;
        health.consecutive_errors
    }

    /// Discard local edits older than the edit timeout. Confirmed values
    /// stay until a newer snapshot replaces them.
    pub fn timeout_tick(&mut self, now: Instant) -> Vec<ReconciliationTimeout> {
        let timeout = self.edit_timeout;
        let mut expired = Vec::new();
        self.pending.retain(|field, edit| {
            let age = now.saturating_duration_since(edit.applied_at);
            if edit.is_confirmed() || age < timeout {
                return true;
            }
            expired.push(ReconciliationTimeout {
                field: *field,
                value: edit.value.clone(),
                age,
            });
            false
        });
        expired
    }

    pub fn set_display_unit(&mut self, unit: TemperatureUnit) {
        self.unit = unit;
    }

    pub fn toggle_display_unit(&mut self) -> TemperatureUnit {
        self.unit = self.unit.toggled();
        self.unit
    }

    pub fn display_unit(&self) -> TemperatureUnit {
        self.unit
    }

    pub fn set_settings_tab(&mut self, tab: SettingsTab) {
        self.settings_tab = tab;
    }

    /// Compute the rendered state: snapshots overlaid with pending edits
    pub fn view_state(&self) -> ViewState {
        ViewState {
            status: self.overlay(ViewKey::Status, self.snapshot.status.as_ref()),
            fans: self.overlay(ViewKey::Fans, self.snapshot.fans.as_ref()),
            settings: self.overlay(ViewKey::Settings, self.snapshot.settings.as_ref()),
            errors: self.snapshot.errors.clone(),
            unit: self.unit,
            settings_tab: self.settings_tab,
            pending: self.fields_where(|edit| !edit.is_confirmed()),
            confirmed: self.fields_where(PendingEdit::is_confirmed),
            save_failed: self.fields_where(|edit| edit.save_failed),
            health: self.health.clone(),
        }
    }

    fn fields_where(&self, f: impl Fn(&PendingEdit) -> bool) -> BTreeSet<Field> {
        self.pending
            .iter()
            .filter(|(_, edit)| f(edit))
            .map(|(field, _)| *field)
            .collect()
    }

    fn overlay<S: Section>(&self, view: ViewKey, section: Option<&S>) -> Option<S> {
        let mut section = section?.clone();
        for (field, edit) in self.pending.iter().filter(|(f, _)| f.view() == view) {
            if !section.set(field.name(), &edit.value) {
                warn!("Pending value {} does not fit {}", edit.value, field);
            }
        }
        Some(section)
    }

    /// Value of a field in the latest snapshot, ignoring pending edits
    pub fn snapshot_value(&self, field: Field) -> Option<FieldValue> {
        self.snapshot.get(field)
    }
}

/// Shared, single-writer handle to the session's view model.
///
/// Every mutation takes the write lock, so reconciliations, edits and
/// expiry sweeps coming from independent tasks are serialized, and the
/// resulting [`ViewState`] is published to subscribers after each one.
#[derive(Debug, Clone)]
pub struct SharedViewModel {
    inner: Arc<RwLock<ViewModel>>,
    updates: Arc<watch::Sender<ViewState>>,
}

impl SharedViewModel {
    pub fn new(model: ViewModel) -> Self {
        let (updates, _) = watch::channel(model.view_state());
        Self {
            inner: Arc::new(RwLock::new(model)),
            updates: Arc::new(updates),
        }
    }

    /// Apply a mutation and publish the resulting view state
    pub async fn update<R>(&self, f: impl FnOnce(&mut ViewModel) -> R) -> R {
        let mut model = self.inner.write().await;
        let result = f(&mut model);
        let state = model.view_state();
        self.updates.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        result
    }

    pub async fn read<R>(&self, f: impl FnOnce(&ViewModel) -> R) -> R {
        let model = self.inner.read().await;
        f(&model)
    }

    /// Reserve a ticket without publishing
    pub async fn issue_ticket(&self) -> Ticket {
        self.inner.write().await.issue_ticket()
    }

    pub async fn view_state(&self) -> ViewState {
        self.inner.read().await.view_state()
    }

    /// Receive every published view state change
    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.updates.subscribe()
    }
}

/// Periodically discard expired pending edits until cancelled
pub fn spawn_expiry_sweep(
    model: SharedViewModel,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = cancel.cancelled() => {
                    debug!("Expiry sweep cancelled");
                    break;
                }
            }
            let expired = model.update(|vm| vm.timeout_tick(Instant::now())).await;
            for timeout in expired {
                warn!("{}; showing controller value", timeout);
            }
        }
    })
}

fn current_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
