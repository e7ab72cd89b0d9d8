//! HTTP server for the herbal batch provenance ledger.
//!
//! Farmers, processors, and labs submit custody events over JSON; the
//! dashboards and consumer provenance pages read projections of the
//! committed histories. The caller's organization travels in the
//! `x-org-credential` header.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use auth::{AuthProvider, Credentials, HeaderAuth, Identity, KnownOrgsAuth, CREDENTIAL_HEADER};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use router::{build_router, AppState};
pub use server::HerbtraceServer;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use herbtrace_ledger::{LocalChain, ManualTxClock, TraceContract};
    use herbtrace_store::InMemoryKeyedStore;
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    fn app() -> Router {
        let chain = LocalChain::new(
            Arc::new(InMemoryKeyedStore::new()),
            Arc::new(ManualTxClock::new(1_709_287_200)),
            TraceContract::default(),
        );
        build_router(AppState::new(Arc::new(chain)))
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        org: Option<&str>,
        body: &str,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(org) = org {
            request = request.header(CREDENTIAL_HEADER, org);
        }
        let response = app
            .clone()
            .oneshot(request.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn health_endpoint() {
        let (status, body) = send(&app(), "GET", "/v1/health", None, "").await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn info_endpoint() {
        let (status, body) = send(&app(), "GET", "/v1/info", None, "").await;
        assert_eq!(status, 200);
        assert_eq!(body["collector_org"], "Org1MSP");
        assert_eq!(body["processor_org"], "Org2MSP");
    }

    #[tokio::test]
    async fn custody_lifecycle_over_http() {
        let app = app();

        let (status, created) = send(
            &app,
            "POST",
            "/v1/batches/B1",
            Some("Org1MSP"),
            r#"{"type":"collection","species":"Mint","quality":"A+","lat":12.9,"long":77.6,"farmer":"ravi"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created[0]["status"], "pending");
        assert_eq!(created[0]["timestamp"], "2024-03-01T10:00:00.000Z");

        let (status, pending) = send(&app, "GET", "/v1/dashboard/processing", None, "").await;
        assert_eq!(status, 200);
        assert_eq!(pending, json!([{"batchId": "B1", "species": "Mint", "quality": "A+", "status": "pending"}]));

        let (status, processed) = send(
            &app,
            "POST",
            "/v1/batches/B1/processing",
            Some("Org2MSP"),
            r#"{"processType":"Drying","processor":"mill"}"#,
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(processed[0]["status"], "processed");

        let (_, testing) = send(&app, "GET", "/v1/dashboard/testing", None, "").await;
        assert_eq!(testing[0]["processor"], "mill");

        let (status, _) = send(
            &app,
            "POST",
            "/v1/batches/B1/quality",
            Some("Org2MSP"),
            r#"{"labName":"Green Lab","resultStatus":"PASS"}"#,
        )
        .await;
        assert_eq!(status, 200);

        let (status, history) = send(&app, "GET", "/v1/batches/B1", None, "").await;
        assert_eq!(status, 200);
        assert_eq!(history.as_array().unwrap().len(), 3);

        let (_, all) = send(&app, "GET", "/v1/batches", None, "").await;
        assert_eq!(all[0]["Key"], "B1");

        let (status, view) = send(&app, "GET", "/v1/provenance/B1", None, "").await;
        assert_eq!(status, 200);
        assert_eq!(view["entries"][2]["title"], "Lab Test");
        assert_eq!(view["route"][0]["label"], "Collection - ravi");
    }

    #[tokio::test]
    async fn errors_map_to_status_and_json_body() {
        let app = app();

        let (status, body) = send(&app, "POST", "/v1/batches/B1", None, "{}").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["ok"], false);

        let (status, body) = send(&app, "POST", "/v1/batches/B1", Some("Org2MSP"), "{}").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["error"].as_str().unwrap().starts_with("unauthorized"));

        let (status, _) = send(&app, "POST", "/v1/batches/B1", Some("Org1MSP"), "nope").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "POST", "/v1/batches/B1", Some("Org1MSP"), "{}").await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = send(&app, "POST", "/v1/batches/B1", Some("Org1MSP"), "{}").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "the batch B1 already exists");

        let (status, body) =
            send(&app, "POST", "/v1/batches/B2/processing", Some("Org2MSP"), "{}").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "the batch B2 does not exist");

        let (status, _) = send(&app, "GET", "/v1/provenance/B2", None, "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn generated_ids_are_batch_prefixed() {
        let app = app();
        let (status, created) = send(&app, "POST", "/v1/batches", Some("Org1MSP"), "{}").await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(created[0]["batchId"].as_str().unwrap().starts_with("BATCH-"));
    }

    #[tokio::test]
    async fn anonymous_reads_can_be_disabled() {
        let chain = LocalChain::with_store(Arc::new(InMemoryKeyedStore::new()));
        let app = build_router(AppState::new(Arc::new(chain)).with_anonymous_read(false));
        let (status, _) = send(&app, "GET", "/v1/batches", None, "").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, body) = send(&app, "GET", "/v1/batches", Some("Org2MSP"), "").await;
        assert_eq!(status, 200);
        assert_eq!(body, json!([]));
    }
}
