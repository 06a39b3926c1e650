use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub username: String,
    #[serde(default)]
    pub department: Option<String>,
}

/// OAuth2 password-grant form. `username` carries the email address.
#[derive(Debug, Deserialize)]
pub struct TokenForm {
    pub username: String,
    pub password: String,
}

/// JSON login body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Response returned after a successful login or token request.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Profile of the authenticated caller, with the level progress the
/// clients render next to the avatar.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub department: Option<String>,
    pub is_admin: bool,
    pub level: i32,
    pub current_xp: i32,
    pub points: i64,
    pub required_xp: i32,
    pub xp_to_next_level: i32,
}

impl From<crate::users::User> for MeResponse {
    fn from(user: crate::users::User) -> Self {
        let required = crate::xp::required_xp(user.level);
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            department: user.department,
            is_admin: user.is_admin,
            level: user.level,
            current_xp: user.current_xp,
            points: user.points,
            required_xp: required,
            xp_to_next_level: required - user.current_xp,
        }
    }
}
