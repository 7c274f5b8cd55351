//! Simple REST API server example for the card ledger.
//!
//! Run with: `cargo run --example server`
//!
//! Every request names its user in the `x-user-id` header. Amounts are
//! decimal strings, as everywhere else in the ledger's JSON.
//!
//! ## Endpoints
//!
//! - `POST /credit` - Grant credit `{"amount"}`
//! - `POST /purchases` - Authorize a purchase `{"amount", "name"?}`
//! - `POST /purchases/clear` - Clear a pending purchase `{"id"}`
//! - `POST /purchases/settle` - Settle a pending purchase `{"id", "finalAmount"}`
//! - `POST /payments` - Initiate a payment `{"amount", "name"?}`
//! - `POST /payments/cancel` - Cancel a pending payment `{"id"}`
//! - `POST /payments/post` - Post a pending payment `{"id"}`
//! - `GET /balances` - Current balances
//! - `GET /transactions` - Pending and settled transactions
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X POST http://localhost:3000/credit \
//!   -H "x-user-id: alice" -H "Content-Type: application/json" \
//!   -d '{"amount": "500.00"}'
//!
//! curl -X POST http://localhost:3000/purchases \
//!   -H "x-user-id: alice" -H "Content-Type: application/json" \
//!   -d '{"amount": "42.50", "name": "Coffee beans"}'
//!
//! curl -X POST http://localhost:3000/purchases/settle \
//!   -H "x-user-id: alice" -H "Content-Type: application/json" \
//!   -d '{"id": 1, "finalAmount": "45.00"}'
//!
//! curl http://localhost:3000/balances -H "x-user-id: alice"
//! ```

use axum::{
    Json, Router,
    extract::{FromRequestParts, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use card_ledger_rs::{
    Balance, Engine, LedgerError, LedgerResponse, TransactionHistory, TransactionId, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;

pub const USER_HEADER: &str = "x-user-id";

// === Request/Response DTOs ===

/// Body of authorize and initiate requests.
#[derive(Debug, Deserialize, Serialize)]
pub struct AmountRequest {
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Body of clear, cancel and post requests.
#[derive(Debug, Deserialize, Serialize)]
pub struct IdRequest {
    pub id: TransactionId,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    pub id: TransactionId,
    pub final_amount: Decimal,
}

/// Response body for errors.
#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the ledger engine.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

// === Caller Identity ===

/// The user named by the `x-user-id` header. Authentication happens upstream.
pub struct CurrentUser(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|user| !user.is_empty())
            .map(|user| CurrentUser(UserId::from(user)))
            .ok_or(AppError::MissingUser)
    }
}

// === Error Handling ===

pub enum AppError {
    MissingUser,
    Ledger(LedgerError),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        AppError::Ledger(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error) = match self {
            AppError::MissingUser => (
                StatusCode::UNAUTHORIZED,
                "MISSING_USER",
                format!("missing {USER_HEADER} header"),
            ),
            AppError::Ledger(err) => {
                let status = match &err {
                    LedgerError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
                    LedgerError::InsufficientBalance { .. }
                    | LedgerError::ExcessPayment { .. }
                    | LedgerError::AmountOverflow(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    LedgerError::ZeroPayableBalance => StatusCode::CONFLICT,
                    LedgerError::NoBalanceRecord(_) | LedgerError::TransactionNotFound { .. } => {
                        StatusCode::NOT_FOUND
                    }
                    LedgerError::StoreFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
                };
                (status, err.code(), err.to_string())
            }
        };

        (
            status,
            Json(ErrorResponse {
                error,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

type LedgerResult = Result<Json<LedgerResponse>, AppError>;

// === Handlers ===

/// POST /credit - Raise the available balance.
async fn grant_credit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<AmountRequest>,
) -> Result<Json<Balance>, AppError> {
    Ok(Json(state.engine.grant_credit(&user, request.amount)?))
}

/// POST /purchases - Authorize a purchase.
async fn authorize_purchase(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<AmountRequest>,
) -> Result<(StatusCode, Json<LedgerResponse>), AppError> {
    let response = state
        .engine
        .authorize_purchase(&user, request.amount, request.name.as_deref())?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /purchases/clear - Clear a pending purchase.
async fn clear_purchase(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<IdRequest>,
) -> LedgerResult {
    Ok(Json(state.engine.clear_purchase(&user, request.id)?))
}

/// POST /purchases/settle - Settle a pending purchase at its final amount.
async fn settle_purchase(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<SettleRequest>,
) -> LedgerResult {
    Ok(Json(state.engine.settle_purchase(
        &user,
        request.id,
        request.final_amount,
    )?))
}

/// POST /payments - Initiate a payment.
async fn initiate_payment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<AmountRequest>,
) -> Result<(StatusCode, Json<LedgerResponse>), AppError> {
    let response = state
        .engine
        .initiate_payment(&user, request.amount, request.name.as_deref())?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /payments/cancel - Cancel a pending payment.
async fn cancel_payment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<IdRequest>,
) -> LedgerResult {
    Ok(Json(state.engine.cancel_payment(&user, request.id)?))
}

/// POST /payments/post - Post a pending payment.
async fn post_payment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<IdRequest>,
) -> LedgerResult {
    Ok(Json(state.engine.post_payment(&user, request.id)?))
}

/// GET /balances - Current balances of the caller.
async fn balances(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Balance>, AppError> {
    Ok(Json(state.engine.balances(&user)?))
}

/// GET /transactions - Pending and settled transactions of the caller.
async fn transactions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<TransactionHistory>, AppError> {
    Ok(Json(state.engine.transactions(&user)?))
}

// === Router ===

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/credit", post(grant_credit))
        .route("/purchases", post(authorize_purchase))
        .route("/purchases/clear", post(clear_purchase))
        .route("/purchases/settle", post(settle_purchase))
        .route("/payments", post(initiate_payment))
        .route("/payments/cancel", post(cancel_payment))
        .route("/payments/post", post(post_payment))
        .route("/balances", get(balances))
        .route("/transactions", get(transactions))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let state = AppState {
        engine: Arc::new(Engine::new()),
    };

    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    tracing::info!(addr = %listener.local_addr()?, "card ledger API listening");

    axum::serve(listener, app).await?;
    Ok(())
}
