use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, FromRow)]
pub struct MypageStats {
    pub knowledge_count: i64,
    pub total_views: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct AuthoredKnowledge {
    pub id: Uuid,
    pub title: String,
    pub views: i64,
    pub created_at: OffsetDateTime,
}

pub async fn stats_for(db: &PgPool, user_id: Uuid) -> anyhow::Result<MypageStats> {
    // SUM over BIGINT comes back NUMERIC, hence the cast
    let row = sqlx::query_as::<_, MypageStats>(
        r#"
        SELECT COUNT(*) AS knowledge_count,
               COALESCE(SUM(views), 0)::BIGINT AS total_views
        FROM knowledge
        WHERE author_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(db)
    .await?;
    Ok(row)
}

pub async fn authored_by(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<AuthoredKnowledge>> {
    let rows = sqlx::query_as::<_, AuthoredKnowledge>(
        r#"
        SELECT id, title, views, created_at
        FROM knowledge
        WHERE author_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}
