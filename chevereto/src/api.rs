use crate::auth::{AuthenticatedUser, Authenticator};
use crate::metrics_defs::SETTINGS_SAVED;
use crate::probe::{ProbeError, Prober};
use crate::relay::{InboundFile, Relay, RelayError, SOURCE_FIELD, UploadedImage};
use crate::settings::{ConnectionSettings, SettingsError, normalize_domain};
use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, FromRef, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use config_store::ConfigStore;
use serde::{Deserialize, Serialize};
use shared::counter;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Chunks of the inbound file buffered between the client and Chevereto.
const FORWARD_BUFFER: usize = 8;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ConfigStore>,
    pub prober: Prober,
    pub relay: Relay,
    pub authenticator: Arc<dyn Authenticator>,
}

impl FromRef<AppState> for Arc<dyn Authenticator> {
    fn from_ref(state: &AppState) -> Self {
        state.authenticator.clone()
    }
}

pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/settings", get(get_settings).put(save_settings))
        .route("/test", post(test_connection))
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::disable()),
        );

    Router::new()
        .nest("/api/chevereto", routes)
        .with_state(state)
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("The request requires valid authorization token.")]
    Unauthorized,

    #[error("Invalid request body")]
    InvalidBody(#[source] JsonRejection),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Settings(SettingsError::Load(_) | SettingsError::Save(_))
            | ApiError::Relay(RelayError::Settings(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Serialize)]
struct ApiErrorResponse {
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = ?self, "Request failed");
        }

        let body = Json(ApiErrorResponse {
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

async fn get_settings(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<ConnectionSettings>, ApiError> {
    let settings = ConnectionSettings::load(state.store.as_ref(), &user_id).await?;
    Ok(Json(settings))
}

#[derive(Serialize)]
struct SaveResponse {
    success: bool,
}

async fn save_settings(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    body: Result<Json<ConnectionSettings>, JsonRejection>,
) -> Result<Json<SaveResponse>, ApiError> {
    let Json(settings) = body.map_err(ApiError::InvalidBody)?;

    let settings = settings.normalize()?;
    settings.save(state.store.as_ref(), &user_id).await?;

    counter!(SETTINGS_SAVED).increment(1);
    tracing::info!(user_id, enabled = settings.enabled, "Saved Chevereto settings");

    Ok(Json(SaveResponse { success: true }))
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct TestRequest {
    domain: String,
    api_key: String,
}

#[derive(Serialize)]
struct TestResponse {
    success: bool,
    message: String,
}

async fn test_connection(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    body: Result<Json<TestRequest>, JsonRejection>,
) -> Result<Json<TestResponse>, ApiError> {
    let Json(request) = body.map_err(ApiError::InvalidBody)?;

    let domain = normalize_domain(&request.domain);
    let result = state.prober.probe(&domain, &request.api_key).await?;
    tracing::info!(user_id, result = ?result, "Probed Chevereto instance");

    Ok(Json(TestResponse {
        success: result.is_reachable(),
        message: result.message(),
    }))
}

async fn upload(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadedImage>, ApiError> {
    if let Ok(mut multipart) = multipart {
        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(error = %e, "Unreadable multipart body");
                    break;
                }
            };
            if field.name() != Some(SOURCE_FIELD) {
                continue;
            }

            let image = relay_field(&state.relay, &user_id, field).await?;
            return Ok(Json(image));
        }
    }

    let image = state.relay.relay_upload(&user_id, None).await?;
    Ok(Json(image))
}

/// Relays `field` while it is still being received. The outbound body reads
/// from a bounded channel that is fed from the inbound field, so the file is
/// never held in memory as a whole.
async fn relay_field(
    relay: &Relay,
    user_id: &str,
    field: Field<'_>,
) -> Result<UploadedImage, RelayError> {
    let filename = field.file_name().unwrap_or_default().to_string();
    let (tx, rx) = mpsc::channel(FORWARD_BUFFER);

    let chunks = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });
    let file = InboundFile::new(filename, reqwest::Body::wrap_stream(chunks));

    // The relay drops the body when it fails early, which ends the pump.
    let (result, ()) = tokio::join!(
        relay.relay_upload(user_id, Some(file)),
        forward_chunks(field, tx)
    );
    result
}

async fn forward_chunks(mut field: Field<'_>, tx: mpsc::Sender<Result<Bytes, MultipartError>>) {
    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => Ok(chunk),
            Ok(None) => return,
            Err(e) => Err(e),
        };
        let failed = chunk.is_err();

        if tx.send(chunk).await.is_err() || failed {
            return;
        }
    }
}
