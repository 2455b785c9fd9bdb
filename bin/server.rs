// Balance Ledger - Web Server
// REST API with Axum over the SQLite-backed ledger service

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use balance_ledger::{
    logging, parse_date, validate_batch, Config, CreditCard, LedgerError, LedgerService,
    RawObservation, SqliteStore,
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared application state
#[derive(Clone)]
struct AppState {
    ledger: Arc<LedgerService<SqliteStore>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ApiError>,
}

#[derive(Serialize)]
struct ApiError {
    code: &'static str,
    message: String,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(ApiResponse {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }
}

/// Client mistakes are 400, write conflicts 409, the rest 500
fn error_response(operation: &str, err: LedgerError) -> Response {
    let status = if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else if matches!(err, LedgerError::Conflict(_)) {
        StatusCode::CONFLICT
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(operation, error = %err, "request failed");
    } else {
        warn!(operation, error = %err, "request rejected");
    }

    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(ApiError {
                code: err.code(),
                message: err.to_string(),
            }),
        }),
    )
        .into_response()
}

fn respond<T: Serialize>(operation: &str, result: balance_ledger::Result<T>) -> Response {
    match result {
        Ok(data) => ApiResponse::ok(data),
        Err(e) => error_response(operation, e),
    }
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Deserialize)]
struct CreateUserPayload {
    name: String,
    email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserIdQuery {
    user_id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddCreditCardPayload {
    user_id: i64,
    card_issuance_bank: String,
    card_number: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CardNumberQuery {
    credit_card_number: String,
}

#[derive(Deserialize)]
struct DateQuery {
    date: String,
}

#[derive(Deserialize)]
struct RangeQuery {
    from: String,
    to: String,
}

/// Card listing (no internal ids)
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreditCardView {
    issuance_bank: String,
    number: String,
}

impl From<CreditCard> for CreditCardView {
    fn from(card: CreditCard) -> Self {
        Self {
            issuance_bank: card.issuance_bank,
            number: card.number,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BalanceView {
    date: String,
    balance: f64,
}

impl BalanceView {
    fn new(date: chrono::NaiveDate, balance: balance_ledger::Amount) -> Self {
        Self {
            date: date.to_string(),
            balance: balance.to_f64(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReconcileSummary {
    credit_card_number: String,
    observations: usize,
    shifted: usize,
    checkpoints: usize,
    topped_up: bool,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    ApiResponse::ok("OK")
}

/// PUT /user - Create a user, returns the new id
async fn create_user(State(state): State<AppState>, Json(payload): Json<CreateUserPayload>) -> Response {
    let result = state
        .ledger
        .store()
        .create_user(&payload.name, &payload.email)
        .map(|user| user.id);
    respond("create_user", result)
}

/// DELETE /user?userId= - Delete a user and everything they own
async fn delete_user(State(state): State<AppState>, Query(query): Query<UserIdQuery>) -> Response {
    let result = state
        .ledger
        .store()
        .delete_user(query.user_id)
        .map(|_| "User deleted successfully");
    respond("delete_user", result)
}

/// POST /credit-card - Register a card for a user, returns the card id
async fn add_credit_card(
    State(state): State<AppState>,
    Json(payload): Json<AddCreditCardPayload>,
) -> Response {
    let result = state
        .ledger
        .store()
        .add_credit_card(payload.user_id, &payload.card_issuance_bank, &payload.card_number)
        .map(|card| card.id);
    respond("add_credit_card", result)
}

/// GET /credit-card/all?userId= - All cards of a user
async fn list_cards(State(state): State<AppState>, Query(query): Query<UserIdQuery>) -> Response {
    let result = state
        .ledger
        .store()
        .list_cards_for_user(query.user_id)
        .map(|cards| cards.into_iter().map(CreditCardView::from).collect::<Vec<_>>());
    respond("list_cards", result)
}

/// GET /credit-card/user-id?creditCardNumber= - Owner of a card
async fn card_owner(State(state): State<AppState>, Query(query): Query<CardNumberQuery>) -> Response {
    let result = state.ledger.store().user_id_for_card(&query.credit_card_number);
    respond("card_owner", result)
}

/// POST /credit-card/update-balance - Reconcile a batch of reported balances
async fn update_balance(
    State(state): State<AppState>,
    Json(payload): Json<Vec<RawObservation>>,
) -> Response {
    let today = Local::now().date_naive();

    let result = validate_batch(&payload, today)
        .and_then(|observations| state.ledger.reconcile_batch_on(&observations, today))
        .map(|reports| {
            reports
                .into_iter()
                .map(|r| ReconcileSummary {
                    observations: r.adjustments.len(),
                    shifted: r.shifted_count(),
                    checkpoints: r.timeline.len(),
                    topped_up: r.topped_up,
                    credit_card_number: r.account_ref,
                })
                .collect::<Vec<_>>()
        });

    if let Ok(summaries) = &result {
        info!(cards = summaries.len(), entries = payload.len(), "balance update applied");
    }
    respond("update_balance", result)
}

fn decode_card(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// GET /credit-card/:number/balance-history - Stored checkpoints
async fn balance_history(State(state): State<AppState>, Path(number): Path<String>) -> Response {
    let number = decode_card(&number);
    let result = state.ledger.timeline(&number).map(|timeline| {
        timeline
            .checkpoints()
            .iter()
            .map(|c| BalanceView::new(c.date, c.balance))
            .collect::<Vec<_>>()
    });
    respond("balance_history", result)
}

/// GET /credit-card/:number/balance?date= - Carried-forward balance on a date
async fn balance_on(
    State(state): State<AppState>,
    Path(number): Path<String>,
    Query(query): Query<DateQuery>,
) -> Response {
    let number = decode_card(&number);
    let result = parse_date(&query.date)
        .and_then(|date| state.ledger.balance_at(&number, date).map(|b| (date, b)))
        .map(|(date, balance)| balance.map(|b| BalanceView::new(date, b)));
    respond("balance_on", result)
}

/// GET /credit-card/:number/daily?from=&to= - One balance per day
async fn daily_balances(
    State(state): State<AppState>,
    Path(number): Path<String>,
    Query(query): Query<RangeQuery>,
) -> Response {
    let number = decode_card(&number);
    let result = parse_date(&query.from)
        .and_then(|from| Ok((from, parse_date(&query.to)?)))
        .and_then(|(from, to)| state.ledger.daily_balances(&number, from, to))
        .map(|days| {
            days.into_iter()
                .map(|(date, balance)| BalanceView::new(date, balance))
                .collect::<Vec<_>>()
        });
    respond("daily_balances", result)
}

// ============================================================================
// Main Server
// ============================================================================

fn router(state: AppState) -> Router {
    let api_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .route("/user", put(create_user).delete(delete_user))
        .route("/credit-card", post(add_credit_card))
        .route("/credit-card/all", get(list_cards))
        .route("/credit-card/user-id", get(card_owner))
        .route("/credit-card/update-balance", post(update_balance))
        .route("/credit-card/:number/balance-history", get(balance_history))
        .route("/credit-card/:number/balance", get(balance_on))
        .route("/credit-card/:number/daily", get(daily_balances))
        .nest("/api", api_routes)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    logging::init_tracing(&config.log_filter);

    info!("🌐 Balance Ledger - Web Server");

    let store = SqliteStore::open(&config.database_path)?;
    info!(path = ?config.database_path, "✓ Database opened");

    let state = AppState {
        ledger: Arc::new(LedgerService::new(store)),
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("🚀 Server running on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
