use axum::{
    extract::{FromRef, State},
    routing::{get, post},
    Form, Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{LoginRequest, MeResponse, MessageResponse, RegisterRequest, TokenForm,
              TokenResponse},
        extractors::CurrentUser,
        service::Authenticator,
    },
    error::ApiError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/token", post(token))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let auth = Authenticator::from_ref(&state);
    auth.register(payload).await?;
    Ok(Json(MessageResponse {
        message: "User created successfully",
    }))
}

/// OAuth2 password-grant endpoint; the form's `username` field carries the
/// email address.
#[instrument(skip(state, form))]
pub async fn token(
    State(state): State<AppState>,
    Form(form): Form<TokenForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    let auth = Authenticator::from_ref(&state);
    let access_token = auth.login(&form.username, &form.password).await?;
    Ok(Json(TokenResponse::bearer(access_token)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let auth = Authenticator::from_ref(&state);
    let access_token = auth.login(&payload.email, &payload.password).await?;
    Ok(Json(TokenResponse::bearer(access_token)))
}

#[instrument(skip(user))]
pub async fn me(CurrentUser(user): CurrentUser) -> Json<MeResponse> {
    Json(MeResponse::from(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::{GamificationUpdate, NewUser};

    #[tokio::test]
    async fn register_creates_user_with_normalized_email() {
        let state = AppState::fake();
        let Json(res) = register(
            State(state.clone()),
            Json(RegisterRequest {
                email: " Alice@Example.JP ".into(),
                password: "hunter2hunter2".into(),
                username: "alice".into(),
                department: Some("dev".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(res.message, "User created successfully");

        let stored = state
            .users
            .find_by_email("alice@example.jp")
            .await
            .unwrap()
            .expect("user stored under normalized email");
        assert_eq!(stored.username, "alice");
    }

    #[tokio::test]
    async fn form_and_json_login_accept_the_same_credentials() {
        let state = AppState::fake();
        register(
            State(state.clone()),
            Json(RegisterRequest {
                email: "bob@example.jp".into(),
                password: "hunter2hunter2".into(),
                username: "bob".into(),
                department: None,
            }),
        )
        .await
        .unwrap();

        let Json(via_form) = token(
            State(state.clone()),
            Form(TokenForm {
                username: "bob@example.jp".into(),
                password: "hunter2hunter2".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(via_form.token_type, "bearer");

        let Json(via_json) = login(
            State(state.clone()),
            Json(LoginRequest {
                email: "bob@example.jp".into(),
                password: "hunter2hunter2".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(via_json.token_type, "bearer");
        assert!(!via_json.access_token.is_empty());
    }

    #[tokio::test]
    async fn me_derives_level_progress() {
        let state = AppState::fake();
        let user = state
            .users
            .insert(NewUser {
                email: "carol@example.jp".into(),
                username: "carol".into(),
                password_hash: "hash".into(),
                department: None,
            })
            .await
            .unwrap();
        state
            .users
            .apply_gamification(
                user.id,
                GamificationUpdate {
                    level: 3,
                    current_xp: 5,
                    points: 45,
                },
                user.version,
            )
            .await
            .unwrap();
        let user = state.users.find_by_id(user.id).await.unwrap().unwrap();

        let Json(res) = me(CurrentUser(user)).await;
        assert_eq!(res.level, 3);
        assert_eq!(res.required_xp, 30);
        assert_eq!(res.xp_to_next_level, 25);
        assert_eq!(res.points, 45);
    }

    #[test]
    fn token_response_serializes_bearer() {
        let json = serde_json::to_string(&TokenResponse::bearer("abc".into())).unwrap();
        assert!(json.contains("\"token_type\":\"bearer\""));
        assert!(json.contains("\"access_token\":\"abc\""));
    }
}
