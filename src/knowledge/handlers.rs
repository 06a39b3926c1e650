use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Redirect,
    routing::{delete, get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::{dto::MessageResponse, extractors::CurrentUser},
    error::ApiError,
    state::AppState,
};

use super::dto::{
    AddCollaboratorRequest, CommentEntry, CreatedKnowledgeResponse, KnowledgeDetail,
    KnowledgeSummary, NewCommentRequest, Pagination,
};
use super::repo::{self, NewKnowledge};
use super::service::{self, UploadItem};

const PRESIGN_TTL_SECS: u64 = 600;
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/knowledge", get(list_knowledge))
        .route("/knowledge/:id", get(get_knowledge))
        .route("/knowledge/:id/comments", get(list_comments))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/knowledge", post(create_knowledge))
        .route("/knowledge/:id", delete(delete_knowledge))
        .route("/knowledge/:id/comments", post(create_comment))
        .route("/knowledge/:id/collaborators", post(add_collaborator))
        .route("/knowledge/:id/files/:file_id", get(download_file))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

fn bad_multipart(e: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::Validation(format!("invalid multipart body: {e}"))
}

/// POST /knowledge (multipart): text fields `title`, `method`, `target`,
/// `description`, plus optional `files`.
#[instrument(skip(state, user, mp))]
pub async fn create_knowledge(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut mp: Multipart,
) -> Result<(StatusCode, HeaderMap, Json<CreatedKnowledgeResponse>), ApiError> {
    let mut title = None;
    let mut method = None;
    let mut target = None;
    let mut description = None;
    let mut files: Vec<UploadItem> = Vec::new();

    while let Some(field) = mp.next_field().await.map_err(bad_multipart)? {
        let name = field.name().map(|s| s.to_string()).unwrap_or_default();
        match name.as_str() {
            "title" => title = Some(field.text().await.map_err(bad_multipart)?),
            "method" => method = Some(field.text().await.map_err(bad_multipart)?),
            "target" => target = Some(field.text().await.map_err(bad_multipart)?),
            "description" => description = Some(field.text().await.map_err(bad_multipart)?),
            "files" | "files[]" => {
                let file_name = field
                    .file_name()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "file".into());
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".into());
                let body = field.bytes().await.map_err(bad_multipart)?;
                files.push(UploadItem {
                    file_name,
                    content_type,
                    body,
                });
            }
            _ => {}
        }
    }

    let fields = NewKnowledge {
        title: required_field(title, "title")?,
        method: required_field(method, "method")?,
        target: required_field(target, "target")?,
        description: required_field(description, "description")?,
    };

    let (knowledge, file_ids) = service::create_with_files(&state, &user, fields, files).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/knowledge/{}", knowledge.id).parse() {
        headers.insert(axum::http::header::LOCATION, location);
    }

    Ok((
        StatusCode::CREATED,
        headers,
        Json(CreatedKnowledgeResponse {
            id: knowledge.id,
            created_at: knowledge.created_at,
            file_ids,
        }),
    ))
}

fn required_field(value: Option<String>, name: &str) -> Result<String, ApiError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ApiError::Validation(format!("{name} is required"))),
    }
}

#[instrument(skip(state))]
pub async fn list_knowledge(
    State(state): State<AppState>,
    Query(p): Query<Pagination>,
) -> Result<Json<Vec<KnowledgeSummary>>, ApiError> {
    let skip = p.skip.max(0);
    let limit = p.limit.clamp(1, 100);
    let rows = repo::list(&state.db, skip, limit).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state))]
pub async fn get_knowledge(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<KnowledgeDetail>, ApiError> {
    let knowledge = repo::fetch_and_bump_views(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("Knowledge"))?;

    let files = repo::files_for(&state.db, id).await?;
    let comments = repo::comments_for(&state.db, id).await?;
    let collaborators = repo::collaborators_for(&state.db, id).await?;

    Ok(Json(KnowledgeDetail {
        id: knowledge.id,
        author_id: knowledge.author_id,
        title: knowledge.title,
        method: knowledge.method,
        target: knowledge.target,
        description: knowledge.description,
        views: knowledge.views,
        created_at: knowledge.created_at,
        files: files.into_iter().map(Into::into).collect(),
        comments: comments.into_iter().map(Into::into).collect(),
        collaborators: collaborators.into_iter().map(Into::into).collect(),
    }))
}

#[instrument(skip(state, user))]
pub async fn delete_knowledge(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    service::delete(&state, &user, id).await?;
    Ok(Json(MessageResponse {
        message: "Knowledge deleted successfully",
    }))
}

#[instrument(skip(state, user, payload))]
pub async fn create_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<NewCommentRequest>,
) -> Result<Json<CommentEntry>, ApiError> {
    let content = payload.content.trim();
    if content.is_empty() {
        return Err(ApiError::Validation("content is required".into()));
    }
    let (comment_id, created_at) = service::add_comment(&state, &user, id, content).await?;
    Ok(Json(CommentEntry {
        id: comment_id,
        author_id: user.id,
        author_username: user.username,
        content: content.to_string(),
        created_at,
    }))
}

#[instrument(skip(state))]
pub async fn list_comments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<CommentEntry>>, ApiError> {
    if !repo::exists(&state.db, id).await? {
        return Err(ApiError::NotFound("Knowledge"));
    }
    let rows = repo::comments_for(&state.db, id).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state, user))]
pub async fn add_collaborator(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddCollaboratorRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    service::add_collaborator(&state, &user, id, payload.user_id).await?;
    Ok(Json(MessageResponse {
        message: "Collaborator added successfully",
    }))
}

/// Temporary redirect to a presigned URL; the service never streams
/// attachment bytes itself.
#[instrument(skip(state, _user))]
pub async fn download_file(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path((id, file_id)): Path<(Uuid, Uuid)>,
) -> Result<Redirect, ApiError> {
    let key = repo::file_key(&state.db, id, file_id)
        .await?
        .ok_or(ApiError::NotFound("File"))?;
    let url = state.storage.presign_get(&key, PRESIGN_TTL_SECS).await?;
    Ok(Redirect::temporary(&url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_fields_reject_blank_values() {
        assert_eq!(required_field(Some(" How to ".into()), "title").unwrap(), "How to");
        assert!(required_field(Some("   ".into()), "title").is_err());
        assert!(required_field(None, "method").is_err());
    }

    #[test]
    fn pagination_defaults_apply() {
        let p: Pagination = serde_json::from_str("{}").unwrap();
        assert_eq!(p.skip, 0);
        assert_eq!(p.limit, 10);

        let p: Pagination = serde_json::from_str(r#"{"skip": 40, "limit": 25}"#).unwrap();
        assert_eq!(p.skip, 40);
        assert_eq!(p.limit, 25);
    }
}
