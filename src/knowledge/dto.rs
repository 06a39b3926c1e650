use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::{CollaboratorRow, CommentRow, KnowledgeFile, KnowledgeSummaryRow};

fn default_limit() -> i64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

#[derive(Debug, Serialize)]
pub struct KnowledgeSummary {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub title: String,
    pub method: String,
    pub target: String,
    pub description: String,
    pub views: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<KnowledgeSummaryRow> for KnowledgeSummary {
    fn from(row: KnowledgeSummaryRow) -> Self {
        Self {
            id: row.id,
            author_id: row.author_id,
            author_username: row.author_username,
            title: row.title,
            method: row.method,
            target: row.target,
            description: row.description,
            views: row.views,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FileEntry {
    pub id: Uuid,
    pub file_name: String,
    pub content_type: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<KnowledgeFile> for FileEntry {
    fn from(f: KnowledgeFile) -> Self {
        Self {
            id: f.id,
            file_name: f.file_name,
            content_type: f.content_type,
            created_at: f.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CommentEntry {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<CommentRow> for CommentEntry {
    fn from(c: CommentRow) -> Self {
        Self {
            id: c.id,
            author_id: c.author_id,
            author_username: c.author_username,
            content: c.content,
            created_at: c.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CollaboratorEntry {
    pub user_id: Uuid,
    pub username: String,
}

impl From<CollaboratorRow> for CollaboratorEntry {
    fn from(c: CollaboratorRow) -> Self {
        Self {
            user_id: c.user_id,
            username: c.username,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct KnowledgeDetail {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub method: String,
    pub target: String,
    pub description: String,
    pub views: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub files: Vec<FileEntry>,
    pub comments: Vec<CommentEntry>,
    pub collaborators: Vec<CollaboratorEntry>,
}

#[derive(Debug, Serialize)]
pub struct CreatedKnowledgeResponse {
    pub id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub file_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct NewCommentRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct AddCollaboratorRequest {
    pub user_id: Uuid,
}
