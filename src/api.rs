use axum::{
    Json, Router, debug_handler,
    extract::{Query, State},
    http::{HeaderName, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;

use crate::{
    engine,
    errors::BookError,
    orders::{OrderRequest, PendingOrder},
    state::AppState,
    store::StoreError,
    trade::Trade,
};

/// Largest trade page a client can ask for; requests above it are clamped
/// and the clamp echoed in the `x-effective-limit` header.
const MAX_TRADE_PAGE: usize = 1000;
const DEFAULT_TRADE_PAGE: usize = 100;

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct OrderAck {
    pub id: u64,
}

#[derive(serde::Serialize)]
pub struct BookListing {
    pub pending_orders: Vec<PendingOrder>,
    pub completed_orders: Vec<Trade>,
}

#[derive(serde::Deserialize)]
pub struct TradeQuery {
    pub limit: Option<usize>,
    pub after: Option<String>,
}

#[derive(serde::Serialize)]
pub struct TradePage {
    pub items: Vec<Trade>,
    pub next: Option<String>,
}

/// JSON error body with the matching status code.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<BookError> for ApiError {
    fn from(e: BookError) -> Self {
        match e {
            BookError::InvalidInput(msg) => ApiError {
                status: StatusCode::BAD_REQUEST,
                message: msg,
            },
            BookError::NotFound(id) => ApiError {
                status: StatusCode::NOT_FOUND,
                message: format!("order {id} not found"),
            },
            BookError::Storage(e) => {
                error!("storage failure: {e}");
                ApiError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "storage failure".into(),
                }
            }
        }
    }
}

/// Accept an order and synchronously run a matching pass.
///
/// The ack carries only the assigned id: once the insert succeeds the
/// submission has succeeded, whatever happens during matching.
#[debug_handler]
pub async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<OrderRequest>,
) -> Result<Json<OrderAck>, ApiError> {
    let book = state.book.lock().unwrap();
    let log = state.trade_log.lock().unwrap();

    let id = book.insert(&payload)?;
    let _ = engine::match_once(&book, &log);
    Ok(Json(OrderAck { id }))
}

/// Both listings at once, each ascending by id.
#[debug_handler]
pub async fn list_orders(State(state): State<AppState>) -> Result<Json<BookListing>, ApiError> {
    let book = state.book.lock().unwrap();
    let log = state.trade_log.lock().unwrap();

    let pending_orders = book.pending()?;
    let completed_orders = log.all()?;
    Ok(Json(BookListing {
        pending_orders,
        completed_orders,
    }))
}

/// Paged trade history with an opaque `after` cursor.
#[debug_handler]
pub async fn get_trades(
    State(state): State<AppState>,
    Query(q): Query<TradeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let effective = q.limit.unwrap_or(DEFAULT_TRADE_PAGE).min(MAX_TRADE_PAGE);

    let log = state.trade_log.lock().unwrap();
    let (items, next) = log.page(q.after.as_deref(), effective).map_err(|e| match e {
        StoreError::BadCursor => ApiError {
            status: StatusCode::BAD_REQUEST,
            message: "invalid cursor".into(),
        },
        other => ApiError::from(BookError::Storage(other)),
    })?;

    Ok((
        AppendHeaders([(
            HeaderName::from_static("x-effective-limit"),
            effective.to_string(),
        )]),
        Json(TradePage { items, next }),
    ))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/trades", get(get_trades))
        // the listing endpoints get polled from a browser front end
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
