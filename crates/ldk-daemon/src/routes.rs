//! Axum router and HTTP handlers for ldk-daemon.
//!
//! `build_router` is the single entry point; `main.rs` attaches the CORS and
//! tracing layers so tests can drive the bare router.
//!
//! Mutations and all errors honour `Accept: text/plain`, answering with a
//! single `SUCCESS: <message>` / `ERROR: <message>` line for storefront
//! integrations. Everything else is JSON.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ldk_orders::{ErrorKind, OrderError, MSG_MISSING_FIELDS};
use serde::Serialize;
use tracing::{debug, error};

use crate::{
    api_types::{
        CreateOrderRequest, CreateOrderResponse, DeleteOrderResponse, ErrorResponse,
        FulfillOrderResponse, HealthResponse, ListParams, OrderDetailResponse, OrderListResponse,
        OrderView, StateProgressView, StockResponse,
    },
    state::AppState,
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/orders", get(list_orders).post(create_order))
        .route("/v1/orders/:id", get(get_order).delete(delete_order))
        .route("/v1/orders/:id/fulfill", post(fulfill_order))
        .route("/v1/orders/:id/export.csv", get(export_order))
        .route("/v1/leads/stock", get(lead_stock))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Reply format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Format {
    Json,
    PlainText,
}

impl Format {
    fn from_headers(headers: &HeaderMap) -> Self {
        let plain = headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.split(',').any(|t| t.trim().starts_with("text/plain")));
        if plain {
            Format::PlainText
        } else {
            Format::Json
        }
    }
}

fn plain_text(status: StatusCode, ok: bool, message: &str) -> Response {
    let prefix = if ok { "SUCCESS" } else { "ERROR" };
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!("{prefix}: {message}"),
    )
        .into_response()
}

fn reply<T: Serialize>(format: Format, message: &str, body: T) -> Response {
    match format {
        Format::PlainText => plain_text(StatusCode::OK, true, message),
        Format::Json => (StatusCode::OK, Json(body)).into_response(),
    }
}

pub(crate) fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Persistence => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Validation
        | ErrorKind::DuplicateOrder
        | ErrorKind::AlreadyProcessed
        | ErrorKind::InvalidStateTransition
        | ErrorKind::NotFulfilled => StatusCode::BAD_REQUEST,
    }
}

/// An `OrderError` paired with the format the client asked for.
pub(crate) struct ApiError {
    err: OrderError,
    format: Format,
}

impl ApiError {
    fn with(format: Format) -> impl FnOnce(OrderError) -> ApiError {
        move |err| ApiError { err, format }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.err.kind();
        let status = status_for(kind);
        if kind == ErrorKind::Persistence {
            error!(error = %self.err, "request failed");
        }
        let message = self.err.to_string();
        match self.format {
            Format::PlainText => plain_text(status, false, &message),
            Format::Json => (
                status,
                Json(ErrorResponse {
                    error: message,
                    kind: kind.as_str().to_string(),
                }),
            )
                .into_response(),
        }
    }
}

/// Non-numeric ids can never name an order.
fn parse_order_id(raw: &str) -> Result<i64, OrderError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| OrderError::NotFound { order_id: 0 })
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/orders
// ---------------------------------------------------------------------------

pub(crate) async fn create_order(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let format = Format::from_headers(&headers);

    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            debug!(%rejection, "create body rejected");
            return Err(ApiError {
                err: OrderError::Validation(MSG_MISSING_FIELDS.to_string()),
                format,
            });
        }
    };

    let out = st.orders.create(&req).await.map_err(ApiError::with(format))?;

    Ok(reply(
        format,
        &out.message(),
        CreateOrderResponse {
            success: true,
            message: out.message(),
            order_id: out.order_id,
            assigned: out.assigned,
            status: out.status,
        },
    ))
}

// ---------------------------------------------------------------------------
// POST /v1/orders/:id/fulfill
// ---------------------------------------------------------------------------

pub(crate) async fn fulfill_order(
    State(st): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let format = Format::from_headers(&headers);
    let order_id = parse_order_id(&raw_id).map_err(ApiError::with(format))?;

    let out = st
        .orders
        .fulfill(order_id)
        .await
        .map_err(ApiError::with(format))?;

    Ok(reply(
        format,
        &out.message(),
        FulfillOrderResponse {
            success: true,
            message: out.message(),
            order_id: out.order_id,
            assigned: out.assigned,
            fulfilled_count: out.fulfilled_count,
            quantity: out.quantity,
            status: out.status,
        },
    ))
}

// ---------------------------------------------------------------------------
// DELETE /v1/orders/:id
// ---------------------------------------------------------------------------

pub(crate) async fn delete_order(
    State(st): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let format = Format::from_headers(&headers);
    let order_id = parse_order_id(&raw_id).map_err(ApiError::with(format))?;

    let out = st
        .orders
        .delete(order_id)
        .await
        .map_err(ApiError::with(format))?;

    Ok(reply(
        format,
        &out.message(),
        DeleteOrderResponse {
            success: true,
            message: out.message(),
            order_id: out.order_id,
            released: out.released,
        },
    ))
}

// ---------------------------------------------------------------------------
// GET /v1/orders/:id/export.csv
// ---------------------------------------------------------------------------

pub(crate) async fn export_order(
    State(st): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let format = Format::from_headers(&headers);
    let order_id = parse_order_id(&raw_id).map_err(ApiError::with(format))?;

    let export = st
        .orders
        .export(order_id)
        .await
        .map_err(ApiError::with(format))?;
    let body = export
        .to_csv()
        .map_err(|e| ApiError::with(format)(OrderError::Persistence(e)))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", export.file_name()),
            ),
        ],
        body,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// GET /v1/orders/:id
// ---------------------------------------------------------------------------

pub(crate) async fn get_order(
    State(st): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<OrderDetailResponse>, ApiError> {
    let format = Format::from_headers(&headers);
    let order_id = parse_order_id(&raw_id).map_err(ApiError::with(format))?;

    let detail = st.orders.get(order_id).await.map_err(ApiError::with(format))?;

    Ok(Json(OrderDetailResponse {
        order: OrderView::from_record(&detail.order, st.display_tz),
        progress: detail.progress.iter().map(StateProgressView::from).collect(),
    }))
}

// ---------------------------------------------------------------------------
// GET /v1/orders?page=N
// ---------------------------------------------------------------------------

pub(crate) async fn list_orders(
    State(st): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
) -> Result<Json<OrderListResponse>, ApiError> {
    let format = Format::from_headers(&headers);
    let page = params
        .page
        .as_deref()
        .and_then(|p| p.trim().parse::<i64>().ok())
        .unwrap_or(1);

    let page = st.orders.list(page).await.map_err(ApiError::with(format))?;

    Ok(Json(OrderListResponse {
        orders: page
            .orders
            .iter()
            .map(|o| OrderView::from_record(o, st.display_tz))
            .collect(),
        page: page.page,
        page_size: page.page_size,
        total: page.total,
        total_pages: page.total_pages,
    }))
}

// ---------------------------------------------------------------------------
// GET /v1/leads/stock
// ---------------------------------------------------------------------------

pub(crate) async fn lead_stock(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StockResponse>, ApiError> {
    let format = Format::from_headers(&headers);
    let states = st.orders.stock().await.map_err(ApiError::with(format))?;

    Ok(Json(StockResponse {
        total_free: states.iter().map(|s| s.free_leads).sum(),
        states,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn accept(v: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::ACCEPT, HeaderValue::from_str(v).unwrap());
        h
    }

    #[test]
    fn plain_text_is_negotiated_from_accept() {
        assert_eq!(Format::from_headers(&accept("text/plain")), Format::PlainText);
        assert_eq!(
            Format::from_headers(&accept("application/json, text/plain;q=0.5")),
            Format::PlainText
        );
        assert_eq!(Format::from_headers(&accept("application/json")), Format::Json);
        assert_eq!(Format::from_headers(&HeaderMap::new()), Format::Json);
    }

    #[test]
    fn error_kinds_map_to_status_codes() {
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::DuplicateOrder), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(ErrorKind::InvalidStateTransition),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(ErrorKind::Persistence),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn non_numeric_id_reads_as_not_found() {
        assert!(matches!(
            parse_order_id("abc"),
            Err(OrderError::NotFound { .. })
        ));
        assert_eq!(parse_order_id(" 42 ").unwrap(), 42);
    }
}
