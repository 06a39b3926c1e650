use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use tracing::instrument;

use crate::{auth::extractors::CurrentUser, error::ApiError, state::AppState};

use super::dto::{MyRankResponse, RankEntry, RankingQuery};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ranking/points", get(by_points))
        .route("/ranking/level", get(by_level))
        .route("/ranking/my-rank", get(my_rank))
}

#[instrument(skip(state))]
pub async fn by_points(
    State(state): State<AppState>,
    Query(q): Query<RankingQuery>,
) -> Result<Json<Vec<RankEntry>>, ApiError> {
    let users = state.users.top_by_points(q.limit.clamp(1, 100)).await?;
    Ok(Json(users.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state))]
pub async fn by_level(
    State(state): State<AppState>,
    Query(q): Query<RankingQuery>,
) -> Result<Json<Vec<RankEntry>>, ApiError> {
    let users = state.users.top_by_level(q.limit.clamp(1, 100)).await?;
    Ok(Json(users.into_iter().map(Into::into).collect()))
}

/// Rank = 1 + number of users strictly ahead under the same ordering the
/// leaderboards use, so a user's rank always matches their list position.
#[instrument(skip(state, user))]
pub async fn my_rank(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<MyRankResponse>, ApiError> {
    let points_rank = 1 + state.users.count_ahead_by_points(&user).await?;
    let level_rank = 1 + state.users.count_ahead_by_level(&user).await?;
    Ok(Json(MyRankResponse {
        points_rank,
        level_rank,
    }))
}
