use std::sync::Arc;

use tokio::net::TcpListener;

use herbtrace_ledger::{LocalChain, SystemTxClock, TraceContract};
use herbtrace_store::{CommitLogStore, LogConfig};

use crate::auth::KnownOrgsAuth;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::{build_router, AppState};

/// Provenance ledger server.
pub struct HerbtraceServer {
    config: ServerConfig,
}

impl HerbtraceServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Open the commit log in the data directory and wrap it in a chain.
    pub fn open_chain(&self) -> ServerResult<LocalChain> {
        let store = CommitLogStore::open(
            &self.config.ledger_path(),
            LogConfig {
                sync_mode: self.config.sync_mode.clone(),
            },
        )?;
        Ok(LocalChain::new(
            Arc::new(store),
            Arc::new(SystemTxClock::new()),
            TraceContract::new(self.config.orgs.clone()),
        ))
    }

    /// Route state for `chain` under this server's access settings.
    pub fn state(&self, chain: Arc<LocalChain>) -> AppState {
        let mut state =
            AppState::new(chain).with_anonymous_read(self.config.allow_anonymous_read);
        if self.config.reject_unknown_orgs {
            let orgs = &self.config.orgs;
            state = state.with_auth(Arc::new(KnownOrgsAuth::new([
                orgs.collector_org.clone(),
                orgs.processor_org.clone(),
            ])));
        }
        state
    }

    /// Build the router (useful for testing).
    pub fn router(&self, chain: Arc<LocalChain>) -> axum::Router {
        build_router(self.state(chain))
    }

    /// Start serving requests.
    pub async fn serve(self) -> ServerResult<()> {
        let chain = Arc::new(self.open_chain()?);
        let app = self.router(chain);
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            data_dir = %self.config.data_dir.display(),
            "herbtrace server listening on {}",
            self.config.bind_addr
        );
        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}
