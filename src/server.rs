use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use futures::stream;
use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::camera::{CameraError, FrameSource, MULTIPART_CONTENT_TYPE, multipart_part};
use crate::health::{self, HealthError, HealthSource};
use crate::messages::{CameraModeRequest, ControlRequest, HealthReport, SpeedReport};
use crate::motor::{CommandSet, FirmataError};
use crate::runtime::Runtime;

const HOME_PAGE: &str = include_str!("../assets/home.html");
const CONTROL_PAGE: &str = include_str!("../assets/control.html");

pub type SharedCamera = Arc<Mutex<Box<dyn FrameSource>>>;

pub struct AppState {
    pub runtime: Mutex<Runtime>,
    pub camera: Option<SharedCamera>,
    pub health: Arc<dyn HealthSource>,
}

pub fn create_router(
    runtime: Runtime,
    camera: Option<Box<dyn FrameSource>>,
    health: Arc<dyn HealthSource>,
) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState {
        runtime: Mutex::new(runtime),
        camera: camera.map(|c| Arc::new(Mutex::new(c))),
        health,
    });

    let router = Router::new()
        .route("/", get(home))
        .route("/control", get(control_page).post(control))
        .route("/speed", get(speed))
        .route("/video_feed", get(video_feed))
        .route("/system_health", get(system_health))
        .route("/camera_mode", post(camera_mode))
        .with_state(state.clone());

    (router, state)
}

/* === Pages === */

async fn home() -> Html<&'static str> {
    Html(HOME_PAGE)
}

async fn control_page() -> Html<&'static str> {
    Html(CONTROL_PAGE)
}

/* === Driving === */

async fn control(
    extract::State(state): extract::State<Arc<AppState>>,
    extract::Json(payload): extract::Json<ControlRequest>,
) -> Result<StatusCode, ApiError> {
    let commands = CommandSet::parse(&payload.command);
    state.runtime.lock().await.on_command(&commands)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn speed(extract::State(state): extract::State<Arc<AppState>>) -> Json<SpeedReport> {
    let drive = state.runtime.lock().await.state();
    Json(SpeedReport {
        speed: drive.actual_speed,
    })
}

/* === Camera === */

async fn video_feed(
    extract::State(state): extract::State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let camera = state.camera.clone().ok_or(ApiError::CameraDisabled)?;

    // One part per frame until the camera fails
    let frames = stream::unfold(camera, |camera| async move {
        let frame = camera.lock().await.next_frame().await;
        match frame {
            Ok(frame) => Some((Ok::<_, CameraError>(multipart_part(&frame)), camera)),
            Err(e) => {
                warn!("Ending video stream: {}", e);
                None
            }
        }
    });

    Ok((
        [(header::CONTENT_TYPE, MULTIPART_CONTENT_TYPE)],
        Body::from_stream(frames),
    )
        .into_response())
}

async fn camera_mode(
    extract::State(state): extract::State<Arc<AppState>>,
    extract::Json(payload): extract::Json<CameraModeRequest>,
) -> Result<StatusCode, ApiError> {
    let camera = state.camera.as_ref().ok_or(ApiError::CameraDisabled)?;

    // A failed switch leaves the stream to restart on the next frame request
    if let Err(e) = camera.lock().await.set_mode(payload.mode).await {
        warn!("Failed to switch camera to {:?}: {}", payload.mode, e);
    }
    Ok(StatusCode::NO_CONTENT)
}

/* === Health === */

async fn system_health(
    extract::State(state): extract::State<Arc<AppState>>,
) -> Result<Json<HealthReport>, ApiError> {
    Ok(Json(health::collect(state.health.as_ref()).await?))
}

/* === Errors === */

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("motor bus error: {0}")]
    Motor(#[from] FirmataError),

    #[error("health probe failed: {0}")]
    Health(#[from] HealthError),

    #[error("camera is disabled")]
    CameraDisabled,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::CameraDisabled => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Motor(_) | ApiError::Health(_) => {
                error!("{}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}
