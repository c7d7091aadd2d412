//! Per-view polling with skip-if-busy semantics
//!
//! Each view polls on its own cadence in its own task. A tick that finds
//! the previous fetch for the same view still outstanding is skipped, not
//! queued. Stopping a view cancels its timer; a fetch already in flight
//! runs to completion but its result is discarded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::RemoteStateClient;
use crate::error::{DashboardError, TransportError};
use crate::snapshot::ViewKey;
use crate::view_model::{ReconcileOutcome, SharedViewModel};

/// Marks a view as having a fetch in flight; cleared on drop
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(Arc::clone(flag)))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// In-flight flags, one per view, shared by every poller of that view
#[derive(Default)]
struct BusyFlags {
    status: Arc<AtomicBool>,
    fans: Arc<AtomicBool>,
    settings: Arc<AtomicBool>,
    errors: Arc<AtomicBool>,
}

impl BusyFlags {
    fn get(&self, view: ViewKey) -> &Arc<AtomicBool> {
        match view {
            ViewKey::Status => &self.status,
            ViewKey::Fans => &self.fans,
            ViewKey::Settings => &self.settings,
            ViewKey::Errors => &self.errors,
        }
    }
}

struct ViewPoller {
    interval: Duration,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Drives periodic refresh of independent views
pub struct PollingScheduler {
    client: Arc<dyn RemoteStateClient>,
    model: SharedViewModel,
    busy: Arc<BusyFlags>,
    pollers: Mutex<HashMap<ViewKey, ViewPoller>>,
}

impl std::fmt::Debug for PollingScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingScheduler").finish_non_exhaustive()
    }
}

impl PollingScheduler {
    pub fn new(client: Arc<dyn RemoteStateClient>, model: SharedViewModel) -> Self {
        Self {
            client,
            model,
            busy: Arc::new(BusyFlags::default()),
            pollers: Mutex::new(HashMap::new()),
        }
    }

    /// Start polling `view` every `interval`, replacing any running poller
    /// for it. The first fetch is issued immediately.
    pub async fn start(&self, view: ViewKey, interval: Duration) {
        let mut pollers = self.pollers.lock().await;
        if let Some(previous) = pollers.remove(&view) {
            previous.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            view,
            interval,
            Arc::clone(&self.client),
            self.model.clone(),
            Arc::clone(self.busy.get(view)),
            cancel.clone(),
        ));
        info!("Polling {} view every {:?}", view, interval);
        pollers.insert(
            view,
            ViewPoller {
                interval,
                cancel,
                handle,
            },
        );
    }

    /// Stop polling `view`. Returns false if it was not running.
    pub async fn stop(&self, view: ViewKey) -> bool {
        let poller = self.pollers.lock().await.remove(&view);
        match poller {
            Some(poller) => {
                poller.cancel.cancel();
                let _ = poller.handle.await;
                info!("Stopped polling {} view", view);
                true
            }
            None => false,
        }
    }

    pub async fn stop_all(&self) {
        let pollers: Vec<_> = self.pollers.lock().await.drain().collect();
        for (view, poller) in pollers {
            poller.cancel.cancel();
            let _ = poller.handle.await;
            debug!("Stopped polling {} view", view);
        }
    }

    pub async fn is_running(&self, view: ViewKey) -> bool {
        self.pollers.lock().await.contains_key(&view)
    }

    pub async fn interval(&self, view: ViewKey) -> Option<Duration> {
        self.pollers.lock().await.get(&view).map(|p| p.interval)
    }

    /// Fetch `view` once, outside its cadence.
    ///
    /// Returns `Ok(false)` without fetching when a fetch for the view is
    /// already outstanding.
    pub async fn refresh(&self, view: ViewKey) -> Result<bool, DashboardError> {
        let Some(_guard) = BusyGuard::try_acquire(self.busy.get(view)) else {
            debug!("Refresh of {} skipped, fetch in flight", view);
            return Ok(false);
        };
        fetch_and_reconcile(view, self.client.as_ref(), &self.model, None).await?;
        Ok(true)
    }
}

async fn poll_loop(
    view: ViewKey,
    period: Duration,
    client: Arc<dyn RemoteStateClient>,
    model: SharedViewModel,
    busy: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => {
                debug!("Polling loop for {} cancelled", view);
                break;
            }
        }

        let Some(guard) = BusyGuard::try_acquire(&busy) else {
            debug!("Skipping {} poll, previous fetch still outstanding", view);
            continue;
        };

        let client = Arc::clone(&client);
        let model = model.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _guard = guard;
            // Failures are already logged and counted
            let _ = fetch_and_reconcile(view, client.as_ref(), &model, Some(&cancel)).await;
        });
    }
}

/// One fetch of `view`, applied to the model unless `cancel` fired while
/// the request was outstanding
async fn fetch_and_reconcile(
    view: ViewKey,
    client: &dyn RemoteStateClient,
    model: &SharedViewModel,
    cancel: Option<&CancellationToken>,
) -> Result<(), TransportError> {
    let ticket = model.issue_ticket().await;
    let result = client.fetch_snapshot(view).await;

    if cancel.is_some_and(|c| c.is_cancelled()) {
        debug!("Discarding {} response for stopped view", view);
        return Ok(());
    }

    match result {
        Ok(payload) => {
            let (previous_failures, outcome) = model
                .update(|vm| {
                    let failures = vm.health(view).map_or(0, |h| h.consecutive_errors);
                    (failures, vm.reconcile(ticket, payload))
                })
                .await;
            if outcome == ReconcileOutcome::Stale {
                debug!("Dropped out-of-order {} response", view);
            } else if previous_failures > 0 {
                info!(
                    "{} view recovered after {} failed polls",
                    view, previous_failures
                );
            }
            Ok(())
        }
        Err(e) => {
            let failures = model.update(|vm| vm.record_poll_failure(view)).await;
            report_failure(view, failures, &e);
            Err(e)
        }
    }
}

fn report_failure(view: ViewKey, failures: u32, e: &TransportError) {
    if failures <= 3 {
        warn!("Failed to poll {} view: {} (attempt {})", view, e, failures);
    } else if failures == 4 {
        error!(
            "Failed to poll {} view after {} attempts, will continue trying silently",
            view, failures
        );
    } else {
        debug!("Failed to poll {} view: {} (attempt {})", view, e, failures);
    }
}
