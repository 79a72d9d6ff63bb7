//! Main application wiring.
//!
//! - Journaled store, replayed from disk and seeded from the config
//! - Bitget connector sharing one price cache across credentials
//! - HTTP gateway, served until Ctrl-C / SIGTERM

use crate::config::AppConfig;
use crate::error::AppResult;
use sigrelay_exchange::{BitgetConnector, DynConnector, OperationSink};
use sigrelay_gateway::{run_server, AppState};
use sigrelay_persistence::JournaledStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Main application.
pub struct Application {
    config: AppConfig,
    store: Arc<JournaledStore>,
    connector: DynConnector,
}

impl Application {
    /// Open storage and build the exchange connector.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;

        let store = Arc::new(JournaledStore::open(&config.persistence.data_dir)?);
        seed(&store, &config);

        let sink: OperationSink = store.clone();
        let connector: DynConnector =
            Arc::new(BitgetConnector::new(config.exchange.clone(), sink)?);

        Ok(Self::with_parts(config, store, connector))
    }

    /// Assemble from pre-built parts.
    pub fn with_parts(
        config: AppConfig,
        store: Arc<JournaledStore>,
        connector: DynConnector,
    ) -> Self {
        Self {
            config,
            store,
            connector,
        }
    }

    pub fn store(&self) -> &Arc<JournaledStore> {
        &self.store
    }

    pub fn state(&self) -> AppState {
        AppState::new(
            self.store.clone(),
            self.connector.clone(),
            self.config.server.clone(),
        )
    }

    /// Serve until a shutdown signal arrives.
    pub async fn run(self) -> AppResult<()> {
        info!(
            addr = %self.config.server.bind_addr(),
            strategies = self.config.strategies.len(),
            subscriptions = self.config.subscriptions.len(),
            mass_trade_configs = self.config.mass_trade_configs.len(),
            "Starting sigrelay"
        );
        run_server(self.state(), shutdown_signal()).await?;
        info!("Shutdown complete");
        Ok(())
    }
}

fn seed(store: &JournaledStore, config: &AppConfig) {
    let credentials = config.resolve_credentials();
    if credentials.len() < config.credentials.len() {
        warn!(
            resolved = credentials.len(),
            configured = config.credentials.len(),
            "Some credentials could not be resolved"
        );
    }

    store.seed_strategies(config.strategies.clone());
    store.seed_subscriptions(config.subscriptions());
    store.seed_credentials(credentials);
    store.seed_mass_trade_configs(config.mass_trade_configs.clone());
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received");
}
