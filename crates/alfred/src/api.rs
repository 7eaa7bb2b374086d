use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::Path;
use axum::extract::Request;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::middleware;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::device::DeviceClass;
use crate::device::ErrorKind;
use crate::dispatch::DispatchRequest;
use crate::dispatch::DispatchResponse;
use crate::dispatch::Dispatcher;
use crate::net::hue::APPLICATION_KEY_HEADER;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
}

#[derive(Serialize)]
struct RejectedResponse {
    error: String,
}

/// Shared application state
struct AppState {
    version: &'static str,
    dispatcher: Dispatcher,
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
        }),
    )
}

/// Handler for GET|POST /api/v1/device/outlet/:brand/:id/:action
#[tracing::instrument(skip(state, body))]
async fn outlet_action(
    State(state): State<Arc<AppState>>,
    Path((brand, id, action)): Path<(String, String, String)>,
    body: Bytes,
) -> Response {
    let mut request = DispatchRequest::new(DeviceClass::Outlet, brand, id, action);
    request.payload = payload(body);
    respond(state.dispatcher.dispatch(request).await)
}

/// Handler for PUT|GET /api/v1/device/light/:brand/:bridge/:id/:action
#[tracing::instrument(skip(state, headers, body))]
async fn light_action(
    State(state): State<Arc<AppState>>,
    Path((brand, bridge, id, action)): Path<(String, String, String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut request = DispatchRequest::new(DeviceClass::Light, brand, id, action);
    request.payload = payload(body);
    request.credential = application_key(&headers);
    request.bridge = Some(bridge);
    respond(state.dispatcher.dispatch(request).await)
}

/// Handler for GET /api/v1/device/light/:brand/:bridge/:action
#[tracing::instrument(skip(state, headers))]
async fn light_bulk_action(
    State(state): State<Arc<AppState>>,
    Path((brand, bridge, action)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    let mut request = DispatchRequest::new(DeviceClass::Light, brand, "", action);
    request.credential = application_key(&headers);
    request.bridge = Some(bridge);
    respond(state.dispatcher.dispatch(request).await)
}

/// Reject light requests that carry no bridge application key.
async fn require_application_key(request: Request, next: Next) -> Response {
    if application_key(request.headers()).is_none() {
        tracing::debug!("Rejecting request without {} header", APPLICATION_KEY_HEADER);
        return (
            StatusCode::BAD_REQUEST,
            Json(RejectedResponse {
                error: format!("{} header is required", APPLICATION_KEY_HEADER),
            }),
        )
            .into_response();
    }
    next.run(request).await
}

fn application_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(APPLICATION_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn payload(body: Bytes) -> Option<Vec<u8>> {
    (!body.is_empty()).then(|| body.to_vec())
}

fn respond(response: DispatchResponse) -> Response {
    let status = response
        .error_kind()
        .map(status_code)
        .unwrap_or(StatusCode::OK);
    (status, Json(response)).into_response()
}

/// HTTP status for a failed action.
pub fn status_code(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::UnsupportedBrand | ErrorKind::UnsupportedAction | ErrorKind::InvalidRequest => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::NoDevicesFound => StatusCode::NOT_FOUND,
        ErrorKind::DeviceActionFailed | ErrorKind::MalformedDeviceResponse => {
            StatusCode::BAD_GATEWAY
        }
        ErrorKind::TransientNetworkFailure => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Create the API router with all endpoints
pub fn create_router(dispatcher: Dispatcher) -> Router {
    let state = Arc::new(AppState {
        version: env!("CARGO_PKG_VERSION"),
        dispatcher,
    });

    let lights = Router::new()
        .route(
            "/api/v1/device/light/:brand/:bridge/:id/:action",
            get(light_action).put(light_action),
        )
        .route(
            "/api/v1/device/light/:brand/:bridge/:action",
            get(light_bulk_action),
        )
        .route_layer(middleware::from_fn(require_application_key));

    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route(
            "/api/v1/device/outlet/:brand/:id/:action",
            get(outlet_action).post(outlet_action),
        )
        .merge(lights)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// Binds to `listen:port` and serves until `shutdown_rx` fires.
pub async fn serve(
    listen: &str,
    port: u16,
    dispatcher: Dispatcher,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(dispatcher);

    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}
