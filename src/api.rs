//! HTTP API used by the study game client.
//!
//! Every game route is keyed by the player id path segment.

use axum::{
    extract::{Multipart, Path, State},
    http::HeaderValue,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::Settings;
use crate::error::{StudyError, StudyResult};
use crate::state::AppState;
use crate::types::*;

/// Prompt shown above every streetview
const ROUND_MESSAGE: &str = "Your guess: Where has this Google Streetview picture been taken?";

/// Multipart field carrying the uploaded image
const UPLOAD_FIELD: &str = "file";

/// Routes of the study API, without prefix or middleware
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/find/{id_type}/{tracked_id}", get(find_by_tracked_id))
        .route("/{player}/streetview", post(streetview))
        .route("/{player}/predict", post(predict))
        .route("/{player}/explain", post(explain))
        .route("/{player}/score", post(score))
        .route("/{player}/has_completed/{total_rounds}", get(has_completed))
        .route("/{player}/final_score", get(final_score))
        .route("/{player}/msg", get(message))
        .route("/{player}/attentioncheck", get(attention_check))
}

/// GET /find/{id_type}/{tracked_id}
pub async fn find_by_tracked_id(
    State(state): State<Arc<AppState>>,
    Path((id_type, tracked_id)): Path<(String, String)>,
) -> StudyResult<Json<Record>> {
    let id_type = TrackedIdType::parse(&id_type).ok_or_else(|| {
        StudyError::BadRequest(format!(
            "id type must be prediction_id or explanation_id, got {}",
            id_type
        ))
    })?;
    Ok(Json(state.find_by_tracked_id(id_type, &tracked_id).await?))
}

/// POST /{player}/streetview
///
/// Records the submitted score and returns the image for `rounds`.
pub async fn streetview(
    State(state): State<Arc<AppState>>,
    Path(player): Path<PlayerId>,
    Json(request): Json<ScoreRequest>,
) -> StudyResult<Json<Streetview>> {
    Ok(Json(state.advance_round(&player, &request).await?))
}

/// POST /{player}/predict
pub async fn predict(
    State(state): State<Arc<AppState>>,
    Path(player): Path<PlayerId>,
    multipart: Multipart,
) -> StudyResult<Json<Value>> {
    let image = read_upload(multipart).await?;
    Ok(Json(
        state
            .replay_response(&player, ResponseRoute::Predict, &image)
            .await?,
    ))
}

/// POST /{player}/explain
pub async fn explain(
    State(state): State<Arc<AppState>>,
    Path(player): Path<PlayerId>,
    multipart: Multipart,
) -> StudyResult<Json<Value>> {
    let image = read_upload(multipart).await?;
    Ok(Json(
        state
            .replay_response(&player, ResponseRoute::Explain, &image)
            .await?,
    ))
}

/// POST /{player}/score
pub async fn score(
    State(state): State<Arc<AppState>>,
    Path(player): Path<PlayerId>,
    Json(request): Json<ScoreRequest>,
) -> StudyResult<Json<ScoreRecord>> {
    Ok(Json(state.record_score(&player, &request).await?))
}

/// GET /{player}/has_completed/{total_rounds}
pub async fn has_completed(
    State(state): State<Arc<AppState>>,
    Path((player, total_rounds)): Path<(PlayerId, u32)>,
) -> StudyResult<Json<FinishedResponse>> {
    let has_finished = state.has_completed(&player, total_rounds).await?;
    Ok(Json(FinishedResponse { has_finished }))
}

/// GET /{player}/final_score
pub async fn final_score(
    State(state): State<Arc<AppState>>,
    Path(player): Path<PlayerId>,
) -> StudyResult<Json<ScoreRecord>> {
    Ok(Json(state.final_score(&player).await?))
}

/// GET /{player}/msg
pub async fn message(Path(_player): Path<PlayerId>) -> Json<MessageResponse> {
    Json(MessageResponse {
        data: ROUND_MESSAGE.to_string(),
    })
}

/// GET /{player}/attentioncheck
pub async fn attention_check(
    State(state): State<Arc<AppState>>,
    Path(player): Path<PlayerId>,
) -> StudyResult<Json<AttentionCheckResponse>> {
    let attention_check = state.attention_check_passed(&player).await?;
    Ok(Json(AttentionCheckResponse { attention_check }))
}

/// Bytes of the uploaded `file` field
async fn read_upload(mut multipart: Multipart) -> StudyResult<Vec<u8>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| StudyError::BadRequest(format!("Invalid upload: {}", e)))?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| StudyError::BadRequest(format!("Invalid upload: {}", e)))?;
            return Ok(bytes.to_vec());
        }
    }
    Err(StudyError::BadRequest(format!(
        "Missing multipart field '{}'",
        UPLOAD_FIELD
    )))
}

/// Full application: routes nested under the configured prefix, with CORS
/// for the configured origins and request tracing
pub fn app(state: Arc<AppState>, settings: &Settings) -> StudyResult<Router> {
    let origins = settings
        .allowed_origins
        .iter()
        .map(|origin| {
            if origin == "*" {
                return Err(StudyError::Config(
                    "Wildcard CORS origin cannot be combined with credentials".to_string(),
                ));
            }
            HeaderValue::from_str(origin)
                .map_err(|_| StudyError::Config(format!("Invalid CORS origin: {}", origin)))
        })
        .collect::<StudyResult<Vec<_>>>()?;

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request());

    let routes = router();
    let routes = if settings.path_prefix.is_empty() {
        routes
    } else {
        Router::new().nest(&settings.path_prefix, routes)
    };

    Ok(routes
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}
