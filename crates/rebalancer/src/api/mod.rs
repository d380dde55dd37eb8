//! Status and control HTTP surface. Liveness endpoints are unauthenticated;
//! `/state` and `/controls/*` require the configured token. Every response
//! carries `Cache-Control: no-store` so operators never act on a cached
//! view.

mod liveness;
mod operator;

pub use {
    liveness::{Health, evaluate},
    operator::{OperatorAction, OperatorHandle, OperatorState},
};

use {
    crate::{infra::oracle::PriceOracle, run_loop::RuntimeStatus, state::StateStore},
    axum::{
        Json, Router,
        extract::{Query, State},
        http::{HeaderMap, StatusCode, header},
        middleware::{self, Next},
        response::{IntoResponse, Response},
        routing::{get, post},
    },
    serde::Deserialize,
    std::{collections::HashMap, sync::{Arc, RwLock}},
    tokio::sync::oneshot,
};

#[derive(Clone)]
pub struct ApiContext {
    pub status: Arc<RwLock<RuntimeStatus>>,
    pub store: StateStore,
    pub operator: OperatorHandle,
    pub price_oracle: Arc<dyn PriceOracle>,
    pub auth_token: Option<String>,
    pub stale_after_seconds: i64,
}

impl ApiContext {
    fn status_snapshot(&self) -> RuntimeStatus {
        self.status.read().unwrap().clone()
    }

    fn health(&self) -> Health {
        evaluate(
            &self.status_snapshot(),
            chrono::Utc::now().timestamp(),
            self.stale_after_seconds,
        )
    }
}

pub async fn serve(
    listener: tokio::net::TcpListener,
    context: ApiContext,
    shutdown: oneshot::Receiver<()>,
) -> Result<(), std::io::Error> {
    let app = router(context);
    tracing::info!(addr = ?listener.local_addr().ok(), "serving status API");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown.await.ok();
        })
        .await
}

fn router(context: ApiContext) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/state", get(state))
        .route("/controls", get(controls))
        .route("/controls/pause", post(pause))
        .route("/controls/resume", post(resume))
        .route("/controls/exit", post(exit))
        .route("/controls/rotate", post(rotate))
        .with_state(context)
        .layer(middleware::from_fn(no_store))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

async fn no_store(request: axum::extract::Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

/// Token auth via `X-Bot-Status-Token` header or `?token=` query parameter.
/// Routes stay open when no token is configured.
fn authorized(
    context: &ApiContext,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
) -> bool {
    let Some(expected) = &context.auth_token else {
        return true;
    };
    let header_token = headers
        .get("x-bot-status-token")
        .and_then(|value| value.to_str().ok());
    let query_token = query.get("token").map(String::as_str);
    header_token == Some(expected.as_str()) || query_token == Some(expected.as_str())
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, "missing or invalid status token").into_response()
}

async fn healthz(State(context): State<ApiContext>) -> Response {
    let health = context.health();
    let code = if health.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(health)).into_response()
}

async fn readyz(State(context): State<ApiContext>) -> Response {
    let health = context.health();
    let code = if health.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(health)).into_response()
}

async fn metrics() -> Response {
    observe::metrics::encode_to_string().into_response()
}

async fn state(
    State(context): State<ApiContext>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&context, &headers, &query) {
        return unauthorized();
    }
    let document = match context.store.read().await {
        Ok(document) => document,
        Err(err) => {
            tracing::error!(?err, "state read failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "state unavailable").into_response();
        }
    };
    Json(serde_json::json!({
        "runtime": context.status_snapshot(),
        "health": context.health(),
        "operator": context.operator.snapshot(),
        "priceTelemetry": context.price_oracle.telemetry(),
        "state": document,
    }))
    .into_response()
}

async fn controls(
    State(context): State<ApiContext>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&context, &headers, &query) {
        return unauthorized();
    }
    Json(context.operator.snapshot()).into_response()
}

async fn pause(
    State(context): State<ApiContext>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&context, &headers, &query) {
        return unauthorized();
    }
    context.operator.set_paused(true, chrono::Utc::now().timestamp());
    tracing::info!("operator paused the agent");
    Json(context.operator.snapshot()).into_response()
}

async fn resume(
    State(context): State<ApiContext>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&context, &headers, &query) {
        return unauthorized();
    }
    context.operator.set_paused(false, chrono::Utc::now().timestamp());
    tracing::info!("operator resumed the agent");
    Json(context.operator.snapshot()).into_response()
}

async fn exit(
    State(context): State<ApiContext>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&context, &headers, &query) {
        return unauthorized();
    }
    context
        .operator
        .request(OperatorAction::Exit, chrono::Utc::now().timestamp());
    tracing::info!("operator requested an exit to park");
    Json(context.operator.snapshot()).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RotateBody {
    #[serde(default)]
    pool_id: String,
}

async fn rotate(
    State(context): State<ApiContext>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Option<Json<RotateBody>>,
) -> Response {
    if !authorized(&context, &headers, &query) {
        return unauthorized();
    }
    let pool_id = body.map(|Json(body)| body.pool_id).unwrap_or_default();
    if pool_id.is_empty() {
        return (StatusCode::BAD_REQUEST, "poolId is required").into_response();
    }
    tracing::info!(%pool_id, "operator requested a rotation");
    context.operator.request(
        OperatorAction::Rotate { pool_id },
        chrono::Utc::now().timestamp(),
    );
    Json(context.operator.snapshot()).into_response()
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{infra::oracle::StaticPriceOracle, run_loop::RuntimeStatus},
        std::net::SocketAddr,
    };

    async fn serve_test_api(auth_token: Option<String>) -> (SocketAddr, ApiContext) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path().join("state.json")).await.unwrap();
        // The store outlives this function; keep its directory alive too.
        std::mem::forget(dir);
        let context = ApiContext {
            status: Arc::new(RwLock::new(RuntimeStatus::new(
                chrono::Utc::now().timestamp(),
            ))),
            store,
            operator: OperatorHandle::default(),
            price_oracle: Arc::new(StaticPriceOracle::new(
                Default::default(),
                vec!["USDC".to_string()],
            )),
            auth_token,
            stale_after_seconds: 900,
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(context.clone());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (addr, context)
    }

    #[tokio::test]
    async fn healthz_is_ok_while_starting_and_readyz_is_not() {
        let (addr, _context) = serve_test_api(None).await;
        let client = reqwest::Client::new();

        let response = client
            .get(format!("http://{addr}/healthz"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers()[reqwest::header::CACHE_CONTROL],
            "no-store"
        );

        let response = client
            .get(format!("http://{addr}/readyz"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 503);
    }

    #[tokio::test]
    async fn protected_routes_require_the_token() {
        let (addr, _context) = serve_test_api(Some("sesame".to_string())).await;
        let client = reqwest::Client::new();

        let response = client
            .get(format!("http://{addr}/state"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 401);

        let response = client
            .get(format!("http://{addr}/state"))
            .header("X-Bot-Status-Token", "sesame")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        // Query parameter works too.
        let response = client
            .get(format!("http://{addr}/controls?token=sesame"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        // Liveness stays open.
        let response = client
            .get(format!("http://{addr}/healthz"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn rotate_without_pool_id_is_rejected() {
        let (addr, context) = serve_test_api(None).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("http://{addr}/controls/rotate"))
            .json(&serde_json::json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
        assert!(context.operator.snapshot().pending_action.is_none());

        let response = client
            .post(format!("http://{addr}/controls/rotate"))
            .json(&serde_json::json!({ "poolId": "aave-usdc" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(
            context.operator.snapshot().pending_action,
            Some(OperatorAction::Rotate {
                pool_id: "aave-usdc".to_string()
            })
        );
    }

    #[tokio::test]
    async fn pause_and_resume_toggle_the_flag() {
        let (addr, context) = serve_test_api(None).await;
        let client = reqwest::Client::new();

        client
            .post(format!("http://{addr}/controls/pause"))
            .send()
            .await
            .unwrap();
        assert!(context.operator.paused());

        client
            .post(format!("http://{addr}/controls/resume"))
            .send()
            .await
            .unwrap();
        assert!(!context.operator.paused());
    }

    #[tokio::test]
    async fn state_returns_the_full_document() {
        let (addr, _context) = serve_test_api(None).await;
        let response: serde_json::Value = reqwest::Client::new()
            .get(format!("http://{addr}/state"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(response["runtime"]["startedAt"].is_i64());
        assert!(response["state"]["position"].is_object());
        assert!(response["priceTelemetry"]["fetchFailures"].is_u64());
    }
}
