//! Defines the Axum API routes and handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use tracing::warn;

use crate::axis::AxisDevice;
use crate::controller::ControllerDevice;
use crate::error::DeviceError;
use crate::hexapod::HexapodAttribute;
use crate::registry::{DeviceRegistry, RegistryError};
use crate::web::events::axis_events;
use crate::web::models::{
    AttributeResponse, AxisLimitsResponse, AxisNamesResponse, AxisStateResponse, AxisStatusResponse,
    AxisSummary, AxisUnitResponse, ControllerStatusResponse, ControllerSummary, ErrorCodeResponse,
    PivotBody, PositionCommandRequest, ValueRequest, VelocityRequest, WriteResponse,
};

/// Helper to create a JSON error response with a message and status code
fn json_error(message: &str, status: StatusCode) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

/// Error returned by handlers, mapped onto an HTTP status.
#[derive(Debug)]
pub struct ApiError(RegistryError);

impl<E: Into<RegistryError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            RegistryError::UnknownDevice(_) => StatusCode::NOT_FOUND,
            RegistryError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RegistryError::Device(err) => match err {
                DeviceError::UnknownAxis { .. } => StatusCode::NOT_FOUND,
                DeviceError::NotReady { .. } => StatusCode::CONFLICT,
                DeviceError::Unreachable { .. }
                | DeviceError::OutOfRange { .. }
                | DeviceError::InvalidRequest(_)
                | DeviceError::Unsupported { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                DeviceError::Gcs(_) => StatusCode::BAD_GATEWAY,
                DeviceError::Memorized(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        json_error(&self.0.to_string(), status)
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub struct AppStateInner {
    pub registry: Arc<DeviceRegistry>,
    /// Poll period of the axis event streams.
    pub event_interval: Duration,
}
pub type AppState = Arc<AppStateInner>;

type DevicePath = Path<(String, String, String)>;
type AxisPath = Path<(String, String, String, String)>;

/// Creates the Axum router with all the API endpoints.
pub fn create_router(registry: Arc<DeviceRegistry>) -> Router {
    create_router_with_state(Arc::new(AppStateInner {
        registry,
        event_interval: Duration::from_millis(200),
    }))
}

pub fn create_router_with_state(state: AppState) -> Router {
    const CTRL: &str = "/api/v1/controllers/{domain}/{family}/{member}";
    const AXIS: &str = "/api/v1/axes/{domain}/{family}/{member}";
    Router::new()
        .route("/api/v1/controllers", get(list_controllers))
        .route(CTRL, get(controller_status))
        .route(&format!("{CTRL}/init"), post(controller_init))
        .route(&format!("{CTRL}/axes"), get(controller_axes))
        .route(&format!("{CTRL}/axes/{{axis}}"), get(controller_axis_state))
        .route(&format!("{CTRL}/axes/{{axis}}/limits"), get(controller_axis_limits))
        .route(&format!("{CTRL}/axes/{{axis}}/unit"), get(controller_axis_unit))
        .route(&format!("{CTRL}/position"), post(controller_position))
        .route(&format!("{CTRL}/velocity"), post(controller_velocity))
        .route(&format!("{CTRL}/pivot"), get(controller_pivot).post(controller_set_pivot))
        .route(&format!("{CTRL}/find_references"), post(controller_find_references))
        .route(&format!("{CTRL}/halt"), post(controller_halt))
        .route(&format!("{CTRL}/stop"), post(controller_stop))
        .route(&format!("{CTRL}/attributes"), get(list_attributes))
        .route(
            &format!("{CTRL}/attributes/{{name}}"),
            get(read_attribute).put(write_attribute),
        )
        .route("/api/v1/axes", get(list_axes))
        .route(AXIS, get(axis_status))
        .route(&format!("{AXIS}/init"), post(axis_init))
        .route(&format!("{AXIS}/position"), put(axis_set_position))
        .route(&format!("{AXIS}/velocity"), put(axis_set_velocity))
        .route(&format!("{AXIS}/inverted"), put(axis_set_inverted))
        .route(&format!("{AXIS}/halt"), post(axis_halt))
        .route(&format!("{AXIS}/stop"), post(axis_stop))
        .route(&format!("{AXIS}/events"), get(axis_event_stream))
        .with_state(state)
}

/// For tests: create a router around an existing state
pub fn app_with_state(state: AppState) -> Router {
    create_router_with_state(state)
}

fn device_name((domain, family, member): (String, String, String)) -> String {
    format!("{domain}/{family}/{member}")
}

fn controller(state: &AppState, path: (String, String, String)) -> Result<Arc<ControllerDevice>, ApiError> {
    Ok(state.registry.controller(&device_name(path))?)
}

fn axis_device(state: &AppState, path: (String, String, String)) -> Result<Arc<AxisDevice>, ApiError> {
    Ok(state.registry.axis(&device_name(path))?)
}

fn ok() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "result": "ok" }))
}

// ==================== Controllers ====================

async fn list_controllers(State(state): State<AppState>) -> Json<Vec<ControllerSummary>> {
    let mut out = Vec::new();
    for ctrl in state.registry.controllers() {
        out.push(ControllerSummary {
            address: ctrl.address().to_string(),
            name: ctrl.config().name.clone(),
            kind: ctrl.kind(),
            state: ctrl.state().await,
            status: ctrl.status().await,
        });
    }
    Json(out)
}

async fn controller_status(State(state): State<AppState>, Path(path): DevicePath) -> ApiResult<ControllerStatusResponse> {
    let ctrl = controller(&state, path)?;
    if let Err(e) = ctrl.refresh().await {
        warn!("{}: refresh failed: {}", ctrl.address(), e);
    }
    let connection = ctrl
        .config()
        .connection()
        .map(|c| c.to_string())
        .unwrap_or_default();
    Ok(Json(ControllerStatusResponse {
        address: ctrl.address().to_string(),
        name: ctrl.config().name.clone(),
        kind: ctrl.kind(),
        connection,
        state: ctrl.state().await,
        status: ctrl.status().await,
        idn: ctrl.idn().await,
        axes: ctrl.get_axis_names().await.unwrap_or_default(),
        snapshot: ctrl.snapshot().await,
    }))
}

async fn controller_init(State(state): State<AppState>, Path(path): DevicePath) -> ApiResult<serde_json::Value> {
    state.registry.init_controller(&device_name(path)).await?;
    Ok(ok())
}

async fn controller_axes(State(state): State<AppState>, Path(path): DevicePath) -> ApiResult<AxisNamesResponse> {
    let ctrl = controller(&state, path)?;
    Ok(Json(AxisNamesResponse {
        axes: ctrl.get_axis_names().await?,
    }))
}

async fn controller_axis_state(
    State(state): State<AppState>,
    Path((d, f, m, axis)): AxisPath,
) -> ApiResult<AxisStateResponse> {
    let ctrl = controller(&state, (d, f, m))?;
    let axis_state = ctrl.query_axis_state(&axis).await?;
    Ok(Json(AxisStateResponse {
        axis,
        values: axis_state.to_values(),
        state: axis_state,
    }))
}

async fn controller_axis_limits(
    State(state): State<AppState>,
    Path((d, f, m, axis)): AxisPath,
) -> ApiResult<AxisLimitsResponse> {
    let ctrl = controller(&state, (d, f, m))?;
    let (min, max) = ctrl.query_axis_limits(&axis).await?;
    Ok(Json(AxisLimitsResponse { axis, min, max }))
}

async fn controller_axis_unit(
    State(state): State<AppState>,
    Path((d, f, m, axis)): AxisPath,
) -> ApiResult<AxisUnitResponse> {
    let ctrl = controller(&state, (d, f, m))?;
    let unit = ctrl.query_axis_unit(&axis).await?;
    Ok(Json(AxisUnitResponse { axis, unit }))
}

async fn controller_position(
    State(state): State<AppState>,
    Path(path): DevicePath,
    Json(payload): Json<PositionCommandRequest>,
) -> ApiResult<ErrorCodeResponse> {
    let ctrl = controller(&state, path)?;
    let error_code = match payload {
        PositionCommandRequest::Target { axis, target } => ctrl.set_position(&axis, target).await?,
        PositionCommandRequest::Request { request } => ctrl.set_position_request(&request).await?,
    };
    Ok(Json(ErrorCodeResponse { error_code }))
}

async fn controller_velocity(
    State(state): State<AppState>,
    Path(path): DevicePath,
    Json(payload): Json<VelocityRequest>,
) -> ApiResult<serde_json::Value> {
    let ctrl = controller(&state, path)?;
    ctrl.set_velocity(payload.axis.as_deref(), payload.value).await?;
    Ok(ok())
}

async fn controller_pivot(State(state): State<AppState>, Path(path): DevicePath) -> ApiResult<PivotBody> {
    let ctrl = controller(&state, path)?;
    Ok(Json(PivotBody {
        pivot: ctrl.pivot_point().await?.to_vec(),
    }))
}

async fn controller_set_pivot(
    State(state): State<AppState>,
    Path(path): DevicePath,
    Json(payload): Json<PivotBody>,
) -> ApiResult<serde_json::Value> {
    let ctrl = controller(&state, path)?;
    ctrl.set_pivot_point(&payload.pivot).await?;
    Ok(ok())
}

async fn controller_find_references(State(state): State<AppState>, Path(path): DevicePath) -> ApiResult<serde_json::Value> {
    controller(&state, path)?.find_references().await?;
    Ok(ok())
}

async fn controller_halt(State(state): State<AppState>, Path(path): DevicePath) -> ApiResult<serde_json::Value> {
    controller(&state, path)?.halt().await?;
    Ok(ok())
}

async fn controller_stop(State(state): State<AppState>, Path(path): DevicePath) -> ApiResult<serde_json::Value> {
    controller(&state, path)?.stop().await?;
    Ok(ok())
}

// ==================== Hexapod Attributes ====================

async fn attribute_response(ctrl: &ControllerDevice, attr: HexapodAttribute) -> Result<AttributeResponse, ApiError> {
    Ok(AttributeResponse {
        name: attr.to_string(),
        value: attr.read(ctrl).await?,
        unit: attr.unit(),
        writable: attr.writable(),
    })
}

async fn list_attributes(State(state): State<AppState>, Path(path): DevicePath) -> ApiResult<Vec<AttributeResponse>> {
    let ctrl = controller(&state, path)?;
    let mut out = Vec::new();
    for attr in HexapodAttribute::all() {
        out.push(attribute_response(&ctrl, attr).await?);
    }
    Ok(Json(out))
}

async fn read_attribute(
    State(state): State<AppState>,
    Path((d, f, m, name)): AxisPath,
) -> ApiResult<AttributeResponse> {
    let ctrl = controller(&state, (d, f, m))?;
    let attr: HexapodAttribute = name.parse()?;
    Ok(Json(attribute_response(&ctrl, attr).await?))
}

async fn write_attribute(
    State(state): State<AppState>,
    Path((d, f, m, name)): AxisPath,
    Json(payload): Json<ValueRequest<f64>>,
) -> ApiResult<WriteResponse> {
    let ctrl = controller(&state, (d, f, m))?;
    let attr: HexapodAttribute = name.parse()?;
    let error_code = attr.write(&ctrl, payload.value).await?;
    Ok(Json(WriteResponse { error_code }))
}

// ==================== Axes ====================

async fn list_axes(State(state): State<AppState>) -> Json<Vec<AxisSummary>> {
    let mut out = Vec::new();
    for axis in state.registry.axes() {
        out.push(AxisSummary {
            address: axis.address().to_string(),
            controller: axis.controller().address().to_string(),
            axis: axis.axis().to_string(),
            state: axis.state().await,
            status: axis.status().await,
        });
    }
    Json(out)
}

async fn axis_status(State(state): State<AppState>, Path(path): DevicePath) -> ApiResult<AxisStatusResponse> {
    let axis = axis_device(&state, path)?;
    let inverted = axis.inverted().await;
    // Hardware reads fail while the axis is not operational; report them as absent.
    let axis_state = axis.axis_state().await.ok();
    let position = axis_state.map(|s| if inverted { -s.position } else { s.position });
    Ok(Json(AxisStatusResponse {
        address: axis.address().to_string(),
        controller: axis.controller().address().to_string(),
        axis: axis.axis().to_string(),
        state: axis.state().await,
        status: axis.status().await,
        position,
        velocity: axis_state.and_then(|s| s.velocity),
        limit_switch: axis_state.map(|s| s.limit),
        referenced: axis_state.map(|s| s.referenced),
        inverted,
        unit: axis.unit().await,
        travel_range: axis.travel_range().await,
    }))
}

async fn axis_init(State(state): State<AppState>, Path(path): DevicePath) -> ApiResult<serde_json::Value> {
    axis_device(&state, path)?.init().await?;
    Ok(ok())
}

async fn axis_set_position(
    State(state): State<AppState>,
    Path(path): DevicePath,
    Json(payload): Json<ValueRequest<f64>>,
) -> ApiResult<ErrorCodeResponse> {
    let error_code = axis_device(&state, path)?.set_position(payload.value).await?;
    Ok(Json(ErrorCodeResponse { error_code }))
}

async fn axis_set_velocity(
    State(state): State<AppState>,
    Path(path): DevicePath,
    Json(payload): Json<ValueRequest<f64>>,
) -> ApiResult<serde_json::Value> {
    axis_device(&state, path)?.set_velocity(payload.value).await?;
    Ok(ok())
}

async fn axis_set_inverted(
    State(state): State<AppState>,
    Path(path): DevicePath,
    Json(payload): Json<ValueRequest<bool>>,
) -> ApiResult<serde_json::Value> {
    axis_device(&state, path)?.set_inverted(payload.value).await?;
    Ok(ok())
}

async fn axis_halt(State(state): State<AppState>, Path(path): DevicePath) -> ApiResult<serde_json::Value> {
    axis_device(&state, path)?.halt().await?;
    Ok(ok())
}

async fn axis_stop(State(state): State<AppState>, Path(path): DevicePath) -> ApiResult<serde_json::Value> {
    axis_device(&state, path)?.stop().await?;
    Ok(ok())
}

async fn axis_event_stream(State(state): State<AppState>, Path(path): DevicePath) -> Result<Response, ApiError> {
    let axis = axis_device(&state, path)?;
    Ok(axis_events(axis, state.event_interval).into_response())
}
