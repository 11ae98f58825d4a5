// zm-broker-cli/src/server.rs
// ============================================================================
// Module: HTTP JSON-RPC Transport
// Description: Serves RpcService::handle over a single POST endpoint,
//              matching the teacher's axum-based MCP HTTP transport.
// Purpose: Give the broker a concrete, ambient transport for the
//          transport-agnostic RPC surface zm-broker-rpc exposes.
// Dependencies: axum, tokio, zm-broker-rpc, serde_json
// ============================================================================

//! ## Overview
//! [`serve_http`] binds one axum router with a single `/rpc` route, exactly
//! as the teacher's MCP server binds `/rpc` for its own HTTP transport. The
//! remote address comes from axum's `ConnectInfo` extractor, which is what
//! [`zm_broker_rpc::dispatch::is_loopback_admin`] checks for the
//! administrative privilege class (§4.5).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::ConnectInfo;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::routing::post;
use serde_json::json;
use zm_broker_rpc::RpcService;
use zm_broker_rpc::envelope;

/// Errors that can occur while binding or running the HTTP transport.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The configured bind address could not be bound.
    #[error("bind failed: {0}")]
    Bind(String),
    /// The server loop exited with an I/O failure.
    #[error("server failed: {0}")]
    Serve(String),
}

/// Builds the axum router: `POST /rpc` for JSON-RPC calls, `GET /health`
/// for a liveness probe (ambient; not part of the RPC surface in §6).
#[must_use]
pub fn build_router(service: Arc<RpcService>) -> Router {
    Router::new().route("/rpc", post(handle_rpc)).route("/health", get(handle_health)).with_state(service)
}

/// Binds `addr` and serves the router until the process is terminated.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the address cannot be bound, or
/// [`ServerError::Serve`] if the server loop exits with an I/O failure.
pub async fn serve_http(addr: SocketAddr, service: Arc<RpcService>) -> Result<(), ServerError> {
    let app = build_router(service);
    let listener =
        tokio::net::TcpListener::bind(addr).await.map_err(|err| ServerError::Bind(err.to_string()))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .map_err(|err| ServerError::Serve(err.to_string()))
}

async fn handle_rpc(
    State(service): State<Arc<RpcService>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let response = match envelope::parse_request(&body) {
        Ok(request) => service.handle(request, peer.ip()),
        Err(err) => envelope::to_response(json!(null), Err(err)),
    };
    Json(response)
}

async fn handle_health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use std::net::Ipv4Addr;

    use axum::Json;
    use zm_broker_core::LocaleTag;
    use zm_broker_core::Validator;
    use zm_broker_rpc::NoopAuditSink;
    use zm_broker_rpc::RpcServiceConfig;
    use zm_broker_rpc::StubParentZoneLookup;
    use zm_broker_store::SqliteStore;

    use super::*;

    fn service() -> Arc<RpcService> {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let validator = Validator::new(
            ["default".to_string()],
            vec![LocaleTag { short: "en".to_string(), full: "en_US".to_string() }],
        );
        Arc::new(RpcService::new(
            store,
            validator,
            Arc::new(NoopAuditSink),
            Arc::new(StubParentZoneLookup),
            RpcServiceConfig { reuse_window_s: 600, enable_add_api_user: true, enable_add_batch_job: true },
        ))
    }

    const LOOPBACK: SocketAddr = SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::LOCALHOST), 0);

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let Json(body) = handle_health().await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn rpc_endpoint_dispatches_version_info() {
        let payload = json!({ "id": 1, "method": "version_info" });
        let body = axum::body::Bytes::from(serde_json::to_vec(&payload).unwrap());
        let Json(response) =
            handle_rpc(State(service()), ConnectInfo(LOOPBACK), body).await;
        assert!(response.result.is_some());
    }

    #[tokio::test]
    async fn rpc_endpoint_maps_malformed_json_to_parse_error() {
        let body = axum::body::Bytes::from_static(b"{not json");
        let Json(response) = handle_rpc(State(service()), ConnectInfo(LOOPBACK), body).await;
        assert_eq!(response.error.unwrap().code, envelope::PARSE_ERROR);
    }

    #[test]
    fn router_builds_with_rpc_and_health_routes() {
        let _router = build_router(service());
    }
}
