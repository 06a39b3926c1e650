use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::store::{
    ConflictField, GamificationUpdate, NewUser, ProfileChanges, StoreError, User, UserStore,
};

/// Postgres-backed user store. Uniqueness comes from the named constraints
/// in the schema, so a racing duplicate insert is translated into the same
/// typed conflict the fast-path check would have produced.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn conflict_from_constraint(name: &str) -> Option<ConflictField> {
    match name {
        "users_email_key" => Some(ConflictField::Email),
        "users_username_key" => Some(ConflictField::Username),
        _ => None,
    }
}

fn translate_unique_violation(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.code().as_deref() == Some("23505") {
            if let Some(field) = db_err.constraint().and_then(conflict_from_constraint) {
                return StoreError::Conflict(field);
            }
        }
    }
    StoreError::Database(e)
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, new_user: NewUser) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, username, password_hash, department, level, current_xp, points)
            VALUES ($1, $2, $3, $4, 1, 0, 0)
            RETURNING id, email, username, password_hash, department, is_admin,
                      level, current_xp, points, version, created_at, updated_at
            "#,
        )
        .bind(&new_user.email)
        .bind(&new_user.username)
        .bind(&new_user.password_hash)
        .bind(&new_user.department)
        .fetch_one(&self.db)
        .await
        .map_err(translate_unique_violation)?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, password_hash, department, is_admin,
                   level, current_xp, points, version, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, password_hash, department, is_admin,
                   level, current_xp, points, version, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, password_hash, department, is_admin,
                   level, current_xp, points, version, created_at, updated_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET username = COALESCE($2, username),
                department = COALESCE($3, department),
                version = version + 1,
                updated_at = now()
            WHERE id = $1
            RETURNING id, email, username, password_hash, department, is_admin,
                      level, current_xp, points, version, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&changes.username)
        .bind(&changes.department)
        .fetch_optional(&self.db)
        .await
        .map_err(translate_unique_violation)?;
        user.ok_or(StoreError::NotFound)
    }

    async fn update_avatar(
        &self,
        id: Uuid,
        data: bytes::Bytes,
        content_type: String,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET avatar = $2, avatar_content_type = $3,
                version = version + 1,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(data.to_vec())
        .bind(content_type)
        .execute(&self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn load_avatar(&self, id: Uuid) -> Result<Option<(Vec<u8>, String)>, StoreError> {
        let row = sqlx::query_as::<_, (Option<Vec<u8>>, Option<String>)>(
            r#"
            SELECT avatar, avatar_content_type
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(match row {
            Some((Some(data), Some(content_type))) => Some((data, content_type)),
            _ => None,
        })
    }

    async fn apply_gamification(
        &self,
        id: Uuid,
        update: GamificationUpdate,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET level = $2, current_xp = $3, points = $4,
                version = version + 1,
                updated_at = now()
            WHERE id = $1 AND version = $5
            "#,
        )
        .bind(id)
        .bind(update.level)
        .bind(update.current_xp)
        .bind(update.points)
        .bind(expected_version)
        .execute(&self.db)
        .await?;
        // a vanished row also lands here; the retry loop's re-read sorts
        // the two cases apart
        if result.rows_affected() == 0 {
            return Err(StoreError::VersionConflict);
        }
        Ok(())
    }

    async fn top_by_points(&self, limit: i64) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, password_hash, department, is_admin,
                   level, current_xp, points, version, created_at, updated_at
            FROM users
            ORDER BY points DESC, id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn top_by_level(&self, limit: i64) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, password_hash, department, is_admin,
                   level, current_xp, points, version, created_at, updated_at
            FROM users
            ORDER BY level DESC, current_xp DESC, id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn count_ahead_by_points(&self, of: &User) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM users
            WHERE points > $1 OR (points = $1 AND id < $2)
            "#,
        )
        .bind(of.points)
        .bind(of.id)
        .fetch_one(&self.db)
        .await?;
        Ok(count)
    }

    async fn count_ahead_by_level(&self, of: &User) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM users
            WHERE level > $1
               OR (level = $1 AND current_xp > $2)
               OR (level = $1 AND current_xp = $2 AND id < $3)
            "#,
        )
        .bind(of.level)
        .bind(of.current_xp)
        .bind(of.id)
        .fetch_one(&self.db)
        .await?;
        Ok(count)
    }
}
