use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::debug;

use crate::adapters::http::state::HttpState;
use crate::application::dto::{ConfigResponse, ErrorResponse, ImageDetectionResponse, UiEvent, VideoUploadQuery};
use crate::domain::camera::CameraInfo;
use crate::domain::errors::DomainError;
use crate::domain::session::SessionView;

/// `DomainError` como `{ "error": ... }` con el status que corresponde.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            DomainError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            DomainError::NotFound(_) => StatusCode::NOT_FOUND,
            DomainError::Inference(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DomainError::DeviceUnavailable(_) | DomainError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            DomainError::ModelLoad(_) | DomainError::OperationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        debug!(%status, "petición fallida: {}", self.0);
        (status, Json(ErrorResponse { error: self.0.to_string() })).into_response()
    }
}

pub async fn get_config(State(st): State<HttpState>) -> Json<ConfigResponse> {
    Json(st.config.as_ref().clone())
}

pub async fn get_session(State(st): State<HttpState>) -> Json<SessionView> {
    Json(st.session.view())
}

pub async fn post_event(
    State(st): State<HttpState>,
    Json(event): Json<UiEvent>,
) -> Result<Json<SessionView>, ApiError> {
    let view = st.session.dispatch(event.into()).await?;
    Ok(Json(view))
}

pub async fn post_image(
    State(st): State<HttpState>,
    body: Bytes,
) -> Result<Json<ImageDetectionResponse>, ApiError> {
    let result = st.session.detect_image(body.to_vec()).await?;
    Ok(Json(result.into()))
}

pub async fn post_video(
    State(st): State<HttpState>,
    Query(query): Query<VideoUploadQuery>,
    body: Bytes,
) -> Result<Json<SessionView>, ApiError> {
    let name = query.name.unwrap_or_else(|| "upload".to_string());
    let view = st.session.start_video(name, body.to_vec()).await?;
    Ok(Json(view))
}

pub async fn list_cameras(State(st): State<HttpState>) -> Result<Json<Vec<CameraInfo>>, ApiError> {
    Ok(Json(st.cameras.list_cameras().await?))
}
