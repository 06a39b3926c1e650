use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::users::User;

fn default_limit() -> i64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct RankingQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

/// One leaderboard row. Deliberately a projection: rankings are public and
/// must not leak emails or credential material.
#[derive(Debug, Serialize)]
pub struct RankEntry {
    pub id: Uuid,
    pub username: String,
    pub department: Option<String>,
    pub level: i32,
    pub current_xp: i32,
    pub points: i64,
}

impl From<User> for RankEntry {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            department: user.department,
            level: user.level,
            current_xp: user.current_xp,
            points: user.points,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MyRankResponse {
    pub points_rank: i64,
    pub level_rank: i64,
}
