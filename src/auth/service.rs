use std::sync::Arc;

use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use super::dto::RegisterRequest;
use super::jwt::JwtKeys;
use super::password::{hash_password, verify_password};
use crate::{
    error::ApiError,
    state::AppState,
    users::{ConflictField, NewUser, User, UserStore},
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Registration and credential checks, shared by the JSON and the OAuth2
/// form login endpoints.
#[derive(Clone)]
pub struct Authenticator {
    users: Arc<dyn UserStore>,
    keys: JwtKeys,
}

impl FromRef<AppState> for Authenticator {
    fn from_ref(state: &AppState) -> Self {
        Self {
            users: state.users.clone(),
            keys: JwtKeys::from_ref(state),
        }
    }
}

impl Authenticator {
    pub fn new(users: Arc<dyn UserStore>, keys: JwtKeys) -> Self {
        Self { users, keys }
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<User, ApiError> {
        let email = normalize_email(&req.email);
        if !is_valid_email(&email) {
            warn!("registration with invalid email shape");
            return Err(ApiError::Validation("Invalid email address".into()));
        }
        if req.password.len() < 8 {
            return Err(ApiError::Validation(
                "Password must be at least 8 characters".into(),
            ));
        }
        let username = req.username.trim().to_string();
        if username.is_empty() {
            return Err(ApiError::Validation("Username must not be empty".into()));
        }

        // fast-path duplicate checks, email before username; the unique
        // constraints settle whatever races past these reads
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(ApiError::Conflict(ConflictField::Email));
        }
        if self.users.find_by_username(&username).await?.is_some() {
            return Err(ApiError::Conflict(ConflictField::Username));
        }

        let password_hash = hash_password(&req.password)?;
        let user = self
            .users
            .insert(NewUser {
                email,
                username,
                password_hash,
                department: req.department,
            })
            .await?;
        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Exchanges an email and password for an access token. Unknown email
    /// and wrong password fail identically.
    pub async fn login(&self, email: &str, password: &str) -> Result<String, ApiError> {
        let email = normalize_email(email);
        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(ApiError::BadCredentials)?;
        if !verify_password(password, &user.password_hash) {
            warn!(user_id = %user.id, "login with wrong password");
            return Err(ApiError::BadCredentials);
        }
        let token = self.keys.sign_access(user.id)?;
        info!(user_id = %user.id, "user logged in");
        Ok(token)
    }
}
