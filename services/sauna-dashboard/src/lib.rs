//! Sauna dashboard - state sync and command dispatch for a sauna controller
//!
//! Polls the controller's status, fan, settings and error views on
//! independent cadences, reconciles them with locally pending edits and
//! sends user commands back.

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod io;
pub mod scheduler;
pub mod snapshot;
pub mod units;
pub mod view_model;
pub mod views;

pub use config::{load_config, Config};
pub use error::{DashboardError, Result};

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::{CommandResult, HttpRemoteStateClient, RemoteStateClient};
use crate::dispatcher::{CommandDispatcher, Intent};
use crate::io::ReqwestHttpClient;
use crate::scheduler::PollingScheduler;
use crate::snapshot::{SettingsTab, ViewKey};
use crate::units::TemperatureUnit;
use crate::view_model::{SharedViewModel, ViewModel, ViewState};

/// Assembles a [`DashboardSession`]
pub struct SessionBuilder {
    config: Config,
    client: Option<Arc<dyn RemoteStateClient>>,
}

impl SessionBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            client: None,
        }
    }

    /// Use this client instead of HTTP to the configured controller
    pub fn with_client(mut self, client: Arc<dyn RemoteStateClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> Result<DashboardSession> {
        self.config.validate()?;

        let client = match self.client {
            Some(client) => client,
            None => {
                let server = &self.config.server;
                let http = Arc::new(ReqwestHttpClient::new(server.request_timeout)?);
                let mut client =
                    HttpRemoteStateClient::new(&server.base_url, http, server.request_timeout);
                if let Some(token) = &server.csrf_token {
                    client = client.with_csrf_token(token.clone());
                }
                Arc::new(client)
            }
        };

        let model = SharedViewModel::new(ViewModel::new(
            self.config.sync.pending_edit_timeout,
            self.config.display.unit,
        ));
        let scheduler = PollingScheduler::new(Arc::clone(&client), model.clone());
        let dispatcher = CommandDispatcher::new(
            client,
            model.clone(),
            self.config.limits.clone(),
            self.config.commands.clone(),
        );

        Ok(DashboardSession {
            config: self.config,
            model,
            scheduler,
            dispatcher,
            cancel: CancellationToken::new(),
            sweep: None,
        })
    }
}

/// One open dashboard: a view model with its pollers, dispatcher and
/// pending-edit expiry sweep
pub struct DashboardSession {
    config: Config,
    model: SharedViewModel,
    scheduler: PollingScheduler,
    dispatcher: CommandDispatcher,
    cancel: CancellationToken,
    sweep: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for DashboardSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardSession")
            .field("base_url", &self.config.server.base_url)
            .field("running", &self.sweep.is_some())
            .finish()
    }
}

impl DashboardSession {
    /// Start every poller and the expiry sweep
    pub async fn start(&mut self) {
        if self.sweep.is_some() {
            return;
        }
        self.sweep = Some(view_model::spawn_expiry_sweep(
            self.model.clone(),
            self.config.sync.expiry_sweep_interval,
            self.cancel.clone(),
        ));

        let polling = &self.config.polling;
        match polling.settings {
            Some(interval) => self.scheduler.start(ViewKey::Settings, interval).await,
            None => {
                if let Err(e) = self.scheduler.refresh(ViewKey::Settings).await {
                    tracing::warn!("Initial settings fetch failed: {}", e);
                }
            }
        }
        self.scheduler.start(ViewKey::Status, polling.status).await;
        self.scheduler.start(ViewKey::Fans, polling.fans).await;
        self.scheduler.start(ViewKey::Errors, polling.errors).await;

        tracing::info!(
            "Dashboard session started for {}",
            self.config.server.base_url
        );
    }

    /// Stop every poller and the expiry sweep
    pub async fn shutdown(&mut self) {
        self.scheduler.stop_all().await;
        self.cancel.cancel();
        if let Some(sweep) = self.sweep.take() {
            let _ = sweep.await;
        }
        tracing::info!("Dashboard session stopped");
    }

    pub async fn dispatch(&self, intent: Intent) -> Result<CommandResult> {
        self.dispatcher.dispatch(intent).await
    }

    /// Fetch one view now, outside its cadence
    pub async fn refresh(&self, view: ViewKey) -> Result<bool> {
        self.scheduler.refresh(view).await
    }

    pub async fn view_state(&self) -> ViewState {
        self.model.view_state().await
    }

    /// Receive every rendered state change
    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.model.subscribe()
    }

    pub async fn toggle_display_unit(&self) -> TemperatureUnit {
        self.model.update(|vm| vm.toggle_display_unit()).await
    }

    pub async fn set_display_unit(&self, unit: TemperatureUnit) {
        self.model.update(|vm| vm.set_display_unit(unit)).await;
    }

    pub async fn set_settings_tab(&self, tab: SettingsTab) {
        self.model.update(|vm| vm.set_settings_tab(tab)).await;
    }

    pub fn scheduler(&self) -> &PollingScheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Run a watching session until ctrl-c, calling `render` on every change
pub async fn run(config: Config, mut render: impl FnMut(&ViewState)) -> Result<()> {
    let mut session = SessionBuilder::new(config).build()?;
    let mut updates = session.subscribe();
    session.start().await;

    let shutdown = CancellationToken::new();
    let shutdown_for_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                shutdown_for_signal.cancel();
            }
            Err(e) => tracing::error!("Failed to listen for ctrl-c: {}", e),
        }
    });

    render(&updates.borrow_and_update().clone());
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                render(&state);
            }
            _ = shutdown.cancelled() => break,
        }
    }

    session.shutdown().await;
    Ok(())
}
