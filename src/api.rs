//! Ingress/egress (spec component D): the single-book axum route surface.
//! Generalizes the teacher's `LoggedJson` extractor, `ApiErr` helper, and
//! `TraceLayer` wiring; route surface and JSON shapes instead follow
//! `original_source/src/interface/trading_interface.py` (no per-request
//! pair routing — one book per process).
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        FromRequest, Path, Request, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use crate::engine::AppState;
use crate::errors::EngineError;
use crate::fill::Fill;
use crate::orderbook::BookSnapshot;
use crate::orders::{Order, OrderKind, Side};
use crate::risk::ClientRiskState;

type ApiErr = (StatusCode, Json<serde_json::Value>);

fn bad_request(msg: impl Into<String>) -> ApiErr {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": msg.into() })))
}

/// Depth returned by `GET /book`; enough to see a few levels of queue
/// without shipping the whole book on every poll.
const SNAPSHOT_LEVELS: usize = 10;

pub struct LoggedJson<T>(pub T);

impl<S, T> FromRequest<S> for LoggedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiErr;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| bad_request(e.to_string()))?;

        match serde_json::from_slice::<T>(&bytes) {
            Ok(val) => Ok(LoggedJson(val)),
            Err(e) => {
                let preview = String::from_utf8_lossy(&bytes);
                let preview = &preview[..preview.len().min(4096)];
                warn!(error = %e, %method, %uri, body_preview = %preview, "order rejected: JSON deserialization failed");
                Err(bad_request(e.to_string()))
            }
        }
    }
}

/// Request payload for `POST /order`.
///
/// `symbol`, if present, is checked against the process's configured symbol
/// and rejected on mismatch — it never selects a book.
#[derive(Deserialize)]
pub struct NewOrderRequest {
    pub client_id: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub kind: OrderKind,
    pub price: Option<f64>,
    pub size: u64,
    pub symbol: Option<String>,
}

/// An order's coarse lifecycle stage as reported to a client on admission,
/// distinct from the richer internal [`crate::orders::OrderStatus`] (which
/// also tracks `pending`/`canceled`, irrelevant to an admission ack).
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Accepted,
    PartiallyFilled,
    Filled,
    Rejected,
}

impl From<crate::orders::OrderStatus> for AckStatus {
    fn from(status: crate::orders::OrderStatus) -> Self {
        use crate::orders::OrderStatus;
        match status {
            OrderStatus::Active | OrderStatus::Pending => AckStatus::Accepted,
            OrderStatus::PartiallyFilled => AckStatus::PartiallyFilled,
            OrderStatus::Filled => AckStatus::Filled,
            OrderStatus::Rejected => AckStatus::Rejected,
            OrderStatus::Canceled => AckStatus::Accepted,
        }
    }
}

#[derive(Serialize)]
pub struct OrderAck {
    pub order_id: u64,
    pub status: AckStatus,
    pub fills: Vec<Fill>,
}

#[derive(Serialize)]
pub struct RiskStateView {
    pub client_id: String,
    pub position: i64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub daily_pnl: f64,
    pub blocked: bool,
}

impl RiskStateView {
    fn from_state(client_id: String, state: ClientRiskState) -> Self {
        Self {
            client_id,
            position: state.position,
            realized_pnl: state.realized_pnl,
            unrealized_pnl: state.unrealized_pnl,
            daily_pnl: state.total_pnl(),
            blocked: state.blocked,
        }
    }
}

/// `GET /order/{order_id}`'s wire shape. The internal [`Order`] stores
/// `limit_price` as tick-quantized ticks; this view converts it back to
/// dollars so callers see the same price unit as `GET /book` and a fill's
/// `price`, never a raw tick count.
#[derive(Serialize)]
pub struct OrderView {
    pub order_id: u64,
    pub client_id: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub kind: OrderKind,
    pub limit_price: Option<f64>,
    pub original_size: u64,
    pub remaining_size: u64,
    pub arrival_seq: u64,
    pub timestamp: std::time::SystemTime,
    pub status: crate::orders::OrderStatus,
}

impl OrderView {
    fn from_order(order: Order, tick_size: f64) -> Self {
        Self {
            order_id: order.order_id,
            client_id: order.client_id,
            side: order.side,
            kind: order.kind,
            limit_price: order.limit_price.map(|ticks| ticks as f64 * tick_size),
            original_size: order.original_size,
            remaining_size: order.remaining_size,
            arrival_seq: order.arrival_seq,
            timestamp: order.timestamp,
            status: order.status,
        }
    }
}

/// A push frame over `/ws/md` or `/ws/fills/{client_id}`, tagged so a single
/// client connection type can in principle multiplex both:
/// ```text
/// {"type": "snapshot", "data": { ...BookSnapshot }}
/// {"type": "fill", "data": { ...Fill }}
/// ```
#[derive(Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WsFrame {
    Snapshot(BookSnapshot),
    Fill(Fill),
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

/// `POST /order` — admits an order through the risk gate and matching
/// engine, returning its id and any fills generated synchronously.
pub async fn create_order(
    State(state): State<AppState>,
    LoggedJson(payload): LoggedJson<NewOrderRequest>,
) -> Result<Json<OrderAck>, EngineError> {
    if let Some(symbol) = &payload.symbol {
        let engine = state.engine.lock().await;
        if symbol != engine.symbol.as_str() {
            return Err(EngineError::BadRequest(format!(
                "symbol `{symbol}` does not match this process's configured symbol `{}`",
                engine.symbol
            )));
        }
    }

    let mut engine = state.engine.lock().await;
    let (order_id, fills) = engine.submit(
        payload.client_id,
        payload.side,
        payload.kind,
        payload.price,
        payload.size,
    )?;
    let status = engine
        .order(order_id)
        .map(|o| o.status.into())
        .unwrap_or(AckStatus::Rejected);
    info!(order_id, fill_count = fills.len(), "order admitted");
    Ok(Json(OrderAck {
        order_id,
        status,
        fills,
    }))
}

/// `POST /cancel/{order_id}`
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<u64>,
) -> Result<impl IntoResponse, EngineError> {
    let mut engine = state.engine.lock().await;
    engine.cancel(order_id)?;
    info!(order_id, "order canceled");
    Ok(Json(json!({ "order_id": order_id, "status": "canceled" })))
}

/// `GET /book`
pub async fn get_book(State(state): State<AppState>) -> impl IntoResponse {
    let engine = state.engine.lock().await;
    Json(engine.snapshot(SNAPSHOT_LEVELS))
}

/// `GET /order/{order_id}`
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<u64>,
) -> Result<Json<OrderView>, EngineError> {
    let engine = state.engine.lock().await;
    let tick_size = engine.book.tick_size;
    engine
        .order(order_id)
        .map(|o| Json(OrderView::from_order(o, tick_size)))
        .ok_or_else(|| EngineError::NotFound(format!("order {order_id} not found")))
}

/// `GET /fills/{client_id}`
pub async fn get_fills(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> impl IntoResponse {
    let engine = state.engine.lock().await;
    Json(engine.fills_for(&client_id))
}

/// `GET /risk/{client_id}`
pub async fn get_risk_state(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> impl IntoResponse {
    let engine = state.engine.lock().await;
    let risk_state = engine.risk_state(&client_id);
    Json(RiskStateView::from_state(client_id, risk_state))
}

/// `GET /ws/md` — pushes book snapshots at the market-data producer's
/// cadence, starting with one immediately on connect.
pub async fn ws_market_data(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_md_socket(socket, state))
}

async fn handle_md_socket(mut socket: WebSocket, state: AppState) {
    let mut rx = state.snapshot_tx.subscribe();

    let initial = {
        let engine = state.engine.lock().await;
        engine.snapshot(SNAPSHOT_LEVELS)
    };
    if send_frame(&mut socket, &WsFrame::Snapshot(initial)).await.is_err() {
        return;
    }

    loop {
        match rx.recv().await {
            Ok(snapshot) => {
                if send_frame(&mut socket, &WsFrame::Snapshot(snapshot))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "market data subscriber lagged, snapshots dropped");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// `GET /ws/fills/{client_id}` — pushes fills as they're generated for
/// `client_id`, as soon as the writer records them.
pub async fn ws_fills(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_fills_socket(socket, state, client_id))
}

async fn handle_fills_socket(mut socket: WebSocket, state: AppState, client_id: String) {
    let mut rx = {
        let mut engine = state.engine.lock().await;
        engine.subscribe_fills(client_id)
    };

    while let Some(fill) = rx.recv().await {
        if send_frame(&mut socket, &WsFrame::Fill(fill)).await.is_err() {
            break;
        }
    }
}

async fn send_frame(socket: &mut WebSocket, frame: &WsFrame) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).expect("WsFrame always serializes");
    socket.send(Message::Text(text.into())).await
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/order", post(create_order))
        .route("/cancel/{order_id}", post(cancel_order))
        .route("/book", get(get_book))
        .route("/order/{order_id}", get(get_order))
        .route("/fills/{client_id}", get(get_fills))
        .route("/risk/{client_id}", get(get_risk_state))
        .route("/health", get(health))
        .route("/ws/md", get(ws_market_data))
        .route("/ws/fills/{client_id}", get(ws_fills))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .include_headers(false)
                        .level(tracing::Level::TRACE),
                )
                .on_response(DefaultOnResponse::new().level(tracing::Level::TRACE)),
        )
        .with_state(state)
}
