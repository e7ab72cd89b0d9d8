use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use herbtrace_ledger::LocalChain;

use crate::auth::{AuthProvider, Credentials, HeaderAuth, Identity, CREDENTIAL_HEADER};
use crate::error::{ServerError, ServerResult};
use crate::handler;

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    pub chain: Arc<LocalChain>,
    pub auth: Arc<dyn AuthProvider>,
    pub allow_anonymous_read: bool,
}

impl AppState {
    pub fn new(chain: Arc<LocalChain>) -> Self {
        Self {
            chain,
            auth: Arc::new(HeaderAuth),
            allow_anonymous_read: true,
        }
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_anonymous_read(mut self, allow: bool) -> Self {
        self.allow_anonymous_read = allow;
        self
    }

    async fn identify(&self, headers: &HeaderMap) -> ServerResult<Identity> {
        let credentials = Credentials::from_headers(headers)?;
        self.auth.authenticate(&credentials).await
    }

    /// Caller of a read route.
    pub(crate) async fn reader(&self, headers: &HeaderMap) -> ServerResult<Identity> {
        let identity = self.identify(headers).await?;
        if identity.is_anonymous() && !self.allow_anonymous_read {
            return Err(ServerError::MissingCredential(CREDENTIAL_HEADER));
        }
        Ok(identity)
    }

    /// Caller of a write route; always needs a credential.
    pub(crate) async fn writer(&self, headers: &HeaderMap) -> ServerResult<Identity> {
        let identity = self.identify(headers).await?;
        if identity.is_anonymous() {
            return Err(ServerError::MissingCredential(CREDENTIAL_HEADER));
        }
        Ok(identity)
    }
}

/// Build the axum router with all ledger endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/info", get(handler::info_handler))
        .route(
            "/v1/batches",
            get(handler::list_batches).post(handler::create_generated_batch),
        )
        .route(
            "/v1/batches/:id",
            get(handler::batch_history).post(handler::create_batch),
        )
        .route("/v1/batches/:id/processing", post(handler::process_batch))
        .route("/v1/batches/:id/quality", post(handler::add_lab_test))
        .route("/v1/dashboard/processing", get(handler::pending_processing))
        .route("/v1/dashboard/testing", get(handler::pending_testing))
        .route("/v1/provenance/:id", get(handler::provenance))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
