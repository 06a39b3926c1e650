use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::{AuthoredKnowledge, MypageStats};
use crate::users::User;

/// Absent fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MypageUser {
    pub id: Uuid,
    pub username: String,
    pub level: i32,
    pub current_xp: i32,
    pub points: i64,
}

impl From<&User> for MypageUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            level: user.level,
            current_xp: user.current_xp,
            points: user.points,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MypageStatsOut {
    pub knowledge_count: i64,
    pub total_views: i64,
}

impl From<MypageStats> for MypageStatsOut {
    fn from(s: MypageStats) -> Self {
        Self {
            knowledge_count: s.knowledge_count,
            total_views: s.total_views,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MypageKnowledge {
    pub id: Uuid,
    pub title: String,
    pub views: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<AuthoredKnowledge> for MypageKnowledge {
    fn from(k: AuthoredKnowledge) -> Self {
        Self {
            id: k.id,
            title: k.title,
            views: k.views,
            created_at: k.created_at,
        }
    }
}

/// The profile page in one response: who the user is, how much they have
/// shared, and what they shared.
#[derive(Debug, Serialize)]
pub struct MypageResponse {
    pub user: MypageUser,
    pub stats: MypageStatsOut,
    pub knowledges: Vec<MypageKnowledge>,
}
