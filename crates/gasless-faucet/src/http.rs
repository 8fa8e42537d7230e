//! HTTP server and API endpoints for the gasless faucet.

use crate::{
    config::FaucetConfig,
    dispatch::Disbursement,
    eligibility::DenyReason,
    error::{FaucetError, FaucetResult},
    eth::EthereumClient,
    faucet::GasFaucet,
    ports::{bounded, ChainQuery},
    rate_limit::{limit_by_client, ClientRateLimiter},
};
use alloy::primitives::utils::format_ether;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

/// How often idle rate-limit buckets are dropped
const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared application state
#[derive(Clone)]
pub struct SharedState {
    pub faucet: Arc<GasFaucet>,
}

/// Request for gas funding
#[derive(Debug, Serialize, Deserialize)]
pub struct FundRequest {
    #[serde(alias = "userAddress")]
    pub address: String,

    /// Client time in milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// Response after a successful disbursement
#[derive(Debug, Serialize, Deserialize)]
pub struct FundResponse {
    pub message: String,
    pub transaction_hash: String,
    pub address: String,
    pub amount_wei: String,
    pub amount_eth: String,
}

impl From<Disbursement> for FundResponse {
    fn from(disbursement: Disbursement) -> Self {
        Self {
            message: "transaction successful".to_string(),
            transaction_hash: format!("{:#x}", disbursement.transaction_hash),
            address: disbursement.to.to_checksum(None),
            amount_wei: disbursement.amount.to_string(),
            amount_eth: format_ether(disbursement.amount),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub faucet_address: String,
    pub faucet_balance_wei: Option<String>,
    pub tracked_addresses: usize,
}

/// A denied funding request, rendered as 400 with its reason code
pub struct Denied(pub DenyReason);

impl IntoResponse for Denied {
    fn into_response(self) -> Response {
        let status = StatusCode::BAD_REQUEST;
        let mut body = serde_json::json!({
            "error": self.0.message(),
            "reason": self.0.code(),
            "status": status.as_u16()
        });
        if let DenyReason::AlreadyFunded { balance } = self.0 {
            body["balance"] = serde_json::Value::String(balance.to_string());
        }

        (status, Json(body)).into_response()
    }
}

/// Create the HTTP router with all endpoints
pub fn create_router(state: SharedState, limiter: Arc<ClientRateLimiter>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/fund", post(fund))
        .layer(middleware::from_fn_with_state(limiter, limit_by_client))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Root endpoint - liveness
async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": 200,
        "message": "gasless faucet running",
        "endpoints": {
            "POST /fund": "Request gas funding (provide address and timestamp in ms)",
            "GET /health": "Health check",
        }
    }))
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let health = state.faucet.health().await;

    let funded = health
        .faucet_balance
        .map(|balance| balance >= health.disbursement_amount)
        .unwrap_or(false);

    let response = HealthResponse {
        status: if funded { "healthy" } else { "degraded" }.to_string(),
        faucet_address: health.faucet_address.to_checksum(None),
        faucet_balance_wei: health.faucet_balance.map(|balance| balance.to_string()),
        tracked_addresses: health.tracked_addresses,
    };

    info!("Health check completed: {:?}", response);
    Json(response)
}

/// Evaluate a funding request and disburse on success
///
/// Bodies that fail to parse never reach the evaluator; they are answered as
/// [`FaucetError::InvalidRequest`].
async fn fund(
    State(state): State<SharedState>,
    payload: Result<Json<FundRequest>, JsonRejection>,
) -> FaucetResult<Response> {
    let Json(request) = payload.map_err(|rejection| {
        warn!("Malformed funding request: {}", rejection.body_text());
        FaucetError::InvalidRequest(rejection.body_text())
    })?;

    info!("Funding request for {} (timestamp {})", request.address, request.timestamp);

    let response = match state.faucet.fund(&request.address, request.timestamp).await {
        Ok(disbursement) => Json(FundResponse::from(disbursement)).into_response(),
        Err(reason) => Denied(reason).into_response(),
    };
    Ok(response)
}

/// Start the HTTP server
pub async fn start_server(config: &FaucetConfig) -> FaucetResult<()> {
    info!("Starting gasless faucet...");

    let ethereum_client = Arc::new(EthereumClient::new(&config.ethereum)?);
    let faucet = Arc::new(GasFaucet::from_config(config, ethereum_client.clone())?);

    info!("Checking faucet wallet {}...", ethereum_client.get_faucet_address());
    check_faucet_funds(&ethereum_client, config).await;

    let limiter = Arc::new(ClientRateLimiter::per_minute(
        config.rate_limit.requests_per_minute,
    ));

    // Start cleanup task
    let cleanup_limiter = limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RATE_LIMIT_CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            cleanup_limiter.cleanup();
        }
    });

    let app = create_router(SharedState { faucet }, limiter);

    let bind_addr = format!("{}:{}", config.http.bind_address, config.http.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", bind_addr, e))?;

    info!("Gasless faucet listening on {}", bind_addr);
    info!("Endpoints:");
    info!("  GET  /         - Liveness");
    info!("  GET  /health   - Health check");
    info!("  POST /fund     - Request gas funding");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

/// Log the faucet wallet balance; an empty wallet does not stop startup
async fn check_faucet_funds(client: &EthereumClient, config: &FaucetConfig) {
    let timeout = Duration::from_secs(config.ethereum.request_timeout_secs);
    let balance = bounded(
        timeout,
        "faucet balance query",
        client.native_balance(client.get_faucet_address()),
    )
    .await;

    match (balance, config.ethereum.disbursement_amount()) {
        (Ok(balance), Ok(amount)) if balance < amount => {
            warn!(
                "Faucet balance {} ETH is below one disbursement ({} ETH)",
                format_ether(balance),
                format_ether(amount)
            );
        }
        (Ok(balance), _) => info!("Faucet balance: {} ETH", format_ether(balance)),
        (Err(e), _) => warn!("Could not reach Ethereum node: {}", e),
    }
}
