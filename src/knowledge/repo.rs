use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Knowledge {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub method: String,
    pub target: String,
    pub description: String,
    pub views: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct KnowledgeSummaryRow {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub title: String,
    pub method: String,
    pub target: String,
    pub description: String,
    pub views: i64,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct KnowledgeFile {
    pub id: Uuid,
    pub file_name: String,
    pub s3_key: String,
    pub content_type: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct CommentRow {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub content: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct CollaboratorRow {
    pub user_id: Uuid,
    pub username: String,
}

pub struct NewKnowledge {
    pub title: String,
    pub method: String,
    pub target: String,
    pub description: String,
}

pub async fn insert(
    db: &PgPool,
    id: Uuid,
    author_id: Uuid,
    fields: &NewKnowledge,
) -> anyhow::Result<Knowledge> {
    let row = sqlx::query_as::<_, Knowledge>(
        r#"
        INSERT INTO knowledge (id, author_id, title, method, target, description)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, author_id, title, method, target, description, views, created_at
        "#,
    )
    .bind(id)
    .bind(author_id)
    .bind(&fields.title)
    .bind(&fields.method)
    .bind(&fields.target)
    .bind(&fields.description)
    .fetch_one(db)
    .await?;
    Ok(row)
}

pub async fn insert_file_tx(
    tx: &mut Transaction<'_, Postgres>,
    file_id: Uuid,
    knowledge_id: Uuid,
    file_name: &str,
    s3_key: &str,
    content_type: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO knowledge_files (id, knowledge_id, file_name, s3_key, content_type)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(file_id)
    .bind(knowledge_id)
    .bind(file_name)
    .bind(s3_key)
    .bind(content_type)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn list(
    db: &PgPool,
    skip: i64,
    limit: i64,
) -> anyhow::Result<Vec<KnowledgeSummaryRow>> {
    let rows = sqlx::query_as::<_, KnowledgeSummaryRow>(
        r#"
        SELECT k.id, k.author_id, u.username AS author_username,
               k.title, k.method, k.target, k.description, k.views, k.created_at
        FROM knowledge k
        JOIN users u ON u.id = k.author_id
        ORDER BY k.created_at DESC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit)
    .bind(skip)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Loads one knowledge entry and counts the view in the same statement, so
/// concurrent readers each bump the counter exactly once.
pub async fn fetch_and_bump_views(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Knowledge>> {
    let row = sqlx::query_as::<_, Knowledge>(
        r#"
        UPDATE knowledge
        SET views = views + 1
        WHERE id = $1
        RETURNING id, author_id, title, method, target, description, views, created_at
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

pub async fn exists(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
    let found: Option<(Uuid,)> =
        sqlx::query_as(r#"SELECT id FROM knowledge WHERE id = $1"#)
            .bind(id)
            .fetch_optional(db)
            .await?;
    Ok(found.is_some())
}

pub async fn author_of(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Uuid>> {
    let row: Option<(Uuid,)> =
        sqlx::query_as(r#"SELECT author_id FROM knowledge WHERE id = $1"#)
            .bind(id)
            .fetch_optional(db)
            .await?;
    Ok(row.map(|(author_id,)| author_id))
}

pub async fn files_for(db: &PgPool, knowledge_id: Uuid) -> anyhow::Result<Vec<KnowledgeFile>> {
    let rows = sqlx::query_as::<_, KnowledgeFile>(
        r#"
        SELECT id, file_name, s3_key, content_type, created_at
        FROM knowledge_files
        WHERE knowledge_id = $1
        ORDER BY created_at ASC
        "#,
    )
    .bind(knowledge_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn file_key(
    db: &PgPool,
    knowledge_id: Uuid,
    file_id: Uuid,
) -> anyhow::Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as(
        r#"SELECT s3_key FROM knowledge_files WHERE id = $1 AND knowledge_id = $2"#,
    )
    .bind(file_id)
    .bind(knowledge_id)
    .fetch_optional(db)
    .await?;
    Ok(row.map(|(key,)| key))
}

pub async fn comments_for(db: &PgPool, knowledge_id: Uuid) -> anyhow::Result<Vec<CommentRow>> {
    let rows = sqlx::query_as::<_, CommentRow>(
        r#"
        SELECT c.id, c.author_id, u.username AS author_username, c.content, c.created_at
        FROM knowledge_comments c
        JOIN users u ON u.id = c.author_id
        WHERE c.knowledge_id = $1
        ORDER BY c.created_at ASC
        "#,
    )
    .bind(knowledge_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn insert_comment(
    db: &PgPool,
    id: Uuid,
    knowledge_id: Uuid,
    author_id: Uuid,
    content: &str,
) -> anyhow::Result<(Uuid, OffsetDateTime)> {
    let row: (Uuid, OffsetDateTime) = sqlx::query_as(
        r#"
        INSERT INTO knowledge_comments (id, knowledge_id, author_id, content)
        VALUES ($1, $2, $3, $4)
        RETURNING id, created_at
        "#,
    )
    .bind(id)
    .bind(knowledge_id)
    .bind(author_id)
    .bind(content)
    .fetch_one(db)
    .await?;
    Ok(row)
}

pub async fn collaborators_for(
    db: &PgPool,
    knowledge_id: Uuid,
) -> anyhow::Result<Vec<CollaboratorRow>> {
    let rows = sqlx::query_as::<_, CollaboratorRow>(
        r#"
        SELECT c.user_id, u.username
        FROM knowledge_collaborators c
        JOIN users u ON u.id = c.user_id
        WHERE c.knowledge_id = $1
        ORDER BY c.created_at ASC
        "#,
    )
    .bind(knowledge_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Adding the same collaborator twice is a no-op.
pub async fn add_collaborator(
    db: &PgPool,
    knowledge_id: Uuid,
    user_id: Uuid,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO knowledge_collaborators (knowledge_id, user_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(knowledge_id)
    .bind(user_id)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn file_keys(db: &PgPool, knowledge_id: Uuid) -> anyhow::Result<Vec<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as(r#"SELECT s3_key FROM knowledge_files WHERE knowledge_id = $1"#)
            .bind(knowledge_id)
            .fetch_all(db)
            .await?;
    Ok(rows.into_iter().map(|(key,)| key).collect())
}

/// Comments, files and collaborators go with it via ON DELETE CASCADE.
pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
    sqlx::query(r#"DELETE FROM knowledge WHERE id = $1"#)
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}
