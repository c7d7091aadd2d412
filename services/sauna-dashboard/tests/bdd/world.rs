//! BDD test world for the sauna dashboard

use std::collections::HashMap;
use std::sync::Arc;

use cucumber::World;
use tokio::time::Instant;

use sauna_dashboard::client::CommandResult;
use sauna_dashboard::dispatcher::CommandDispatcher;
use sauna_dashboard::error::ReconciliationTimeout;
use sauna_dashboard::snapshot::StatusSnapshot;
use sauna_dashboard::view_model::{
    ReconcileOutcome, SharedViewModel, Ticket, ViewModel, ViewState,
};

use crate::fake_controller::FakeController;

#[derive(Debug, Default, World)]
pub struct DashboardWorld {
    // Reconciliation testing, driven with explicit tickets and clock
    pub model: Option<ViewModel>,
    pub clock: Option<Instant>,
    pub remote_status: Option<StatusSnapshot>,
    pub tickets: HashMap<String, Ticket>,
    pub last_outcome: Option<ReconcileOutcome>,
    pub expired: Vec<ReconciliationTimeout>,

    // Command dispatch testing
    pub controller: Option<Arc<FakeController>>,
    pub shared: Option<SharedViewModel>,
    pub dispatcher: Option<CommandDispatcher>,
    pub dispatch_result: Option<sauna_dashboard::Result<CommandResult>>,
}

impl DashboardWorld {
    pub fn model(&mut self) -> &mut ViewModel {
        self.model.as_mut().expect("view model not set up")
    }

    pub fn now(&self) -> Instant {
        self.clock.expect("clock not set up")
    }

    /// Rendered state of whichever model the scenario set up
    pub async fn view_state(&self) -> ViewState {
        match (&self.shared, &self.model) {
            (Some(shared), _) => shared.view_state().await,
            (None, Some(model)) => model.view_state(),
            (None, None) => panic!("no view model set up"),
        }
    }
}
