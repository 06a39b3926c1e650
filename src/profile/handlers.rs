use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::{
        dto::{MeResponse, MessageResponse},
        extractors::CurrentUser,
    },
    error::ApiError,
    state::AppState,
    users::ProfileChanges,
};

use super::dto::{MypageResponse, MypageUser, UpdateProfileRequest};
use super::repo;

const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/profile/me", put(update_me))
        .route("/profile/mypage", get(mypage))
        .route(
            "/profile/avatar",
            post(upload_avatar).layer(DefaultBodyLimit::max(MAX_AVATAR_BYTES)),
        )
        .route("/profile/avatar/:user_id", get(get_avatar))
}

#[instrument(skip(state, user, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<MeResponse>, ApiError> {
    let username = match payload.username {
        Some(name) => {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ApiError::Validation("Username must not be empty".into()));
            }
            Some(name)
        }
        None => None,
    };

    let updated = state
        .users
        .update_profile(
            user.id,
            ProfileChanges {
                username,
                department: payload.department,
            },
        )
        .await?;
    Ok(Json(MeResponse::from(updated)))
}

#[instrument(skip(state, user))]
pub async fn mypage(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<MypageResponse>, ApiError> {
    let stats = repo::stats_for(&state.db, user.id).await?;
    let knowledges = repo::authored_by(&state.db, user.id).await?;

    Ok(Json(MypageResponse {
        user: MypageUser::from(&user),
        stats: stats.into(),
        knowledges: knowledges.into_iter().map(Into::into).collect(),
    }))
}

/// Multipart with a single `file` field. The image lands in the users
/// table, not in object storage, so profile pages need no presigning.
#[instrument(skip(state, user, mp))]
pub async fn upload_avatar(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut mp: Multipart,
) -> Result<Json<MessageResponse>, ApiError> {
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::Validation(format!("invalid multipart body: {e}")))?;
        if data.is_empty() {
            return Err(ApiError::Validation("file is empty".into()));
        }
        state.users.update_avatar(user.id, data, content_type).await?;
        return Ok(Json(MessageResponse {
            message: "Avatar updated successfully",
        }));
    }
    Err(ApiError::Validation("file is required".into()))
}

#[instrument(skip(state))]
pub async fn get_avatar(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let (data, content_type) = state
        .users
        .load_avatar(user_id)
        .await?
        .ok_or(ApiError::NotFound("Avatar"))?;

    let content_type = HeaderValue::from_str(&content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    Ok(([(header::CONTENT_TYPE, content_type)], data).into_response())
}
