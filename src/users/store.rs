use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub department: Option<String>,
    pub is_admin: bool,
    /// Current level, always >= 1.
    pub level: i32,
    /// XP accumulated within the current level (remainder after level-ups).
    pub current_xp: i32,
    /// Lifetime accumulated XP; never reset by level-ups.
    pub points: i64,
    /// Optimistic-concurrency counter, bumped on every row mutation.
    pub version: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Insert payload for registration. Gamification fields start at
/// level 1 / 0 xp / 0 points.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub department: Option<String>,
}

/// Partial profile update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub department: Option<String>,
}

/// New gamification state written by the leveling engine.
#[derive(Debug, Clone, Copy)]
pub struct GamificationUpdate {
    pub level: i32,
    pub current_xp: i32,
    pub points: i64,
}

/// Which unique column a write collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictField {
    Email,
    Username,
}

impl std::fmt::Display for ConflictField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictField::Email => write!(f, "email"),
            ConflictField::Username => write!(f, "username"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} already taken")]
    Conflict(ConflictField),
    #[error("row version changed underneath the update")]
    VersionConflict,
    #[error("user not found")]
    NotFound,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Data-access contract for user records. The Postgres implementation is
/// the real store; the in-memory one backs `AppState::fake()` and the
/// unit tests.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user. Fails with `Conflict` if email or username is
    /// already taken (the store's uniqueness guarantee is authoritative;
    /// callers may pre-check only as a fast path).
    async fn insert(&self, new_user: NewUser) -> Result<User, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn update_profile(&self, id: Uuid, changes: ProfileChanges)
        -> Result<User, StoreError>;

    async fn update_avatar(
        &self,
        id: Uuid,
        data: bytes::Bytes,
        content_type: String,
    ) -> Result<(), StoreError>;

    /// Avatar bytes and content type, `None` when the user has none set
    /// (or does not exist).
    async fn load_avatar(&self, id: Uuid) -> Result<Option<(Vec<u8>, String)>, StoreError>;

    /// Compare-and-swap write of the gamification fields. Fails with
    /// `VersionConflict` when `expected_version` no longer matches the
    /// row, in which case the caller re-reads and retries.
    async fn apply_gamification(
        &self,
        id: Uuid,
        update: GamificationUpdate,
        expected_version: i64,
    ) -> Result<(), StoreError>;

    /// Points ranking: points desc, id asc.
    async fn top_by_points(&self, limit: i64) -> Result<Vec<User>, StoreError>;

    /// Level ranking: level desc, current_xp desc, id asc.
    async fn top_by_level(&self, limit: i64) -> Result<Vec<User>, StoreError>;

    /// Users strictly ahead of `of` in the points ordering (tie-breaks
    /// included), so `1 + count` equals the list position.
    async fn count_ahead_by_points(&self, of: &User) -> Result<i64, StoreError>;

    /// Users strictly ahead of `of` in the level ordering.
    async fn count_ahead_by_level(&self, of: &User) -> Result<i64, StoreError>;
}
