use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::ApiError,
    users::{GamificationUpdate, StoreError, UserStore},
};

pub const XP_PER_KNOWLEDGE: u32 = 10;
pub const XP_PER_COMMENT: u32 = 10;

const MAX_WRITE_ATTEMPTS: u32 = 5;

/// XP needed to advance from `level` to `level + 1`.
pub fn required_xp(level: i32) -> i32 {
    level * 10
}

/// Gamification state after an award, as written to the store.
#[derive(Debug, Clone, Copy)]
pub struct AwardOutcome {
    pub level: i32,
    pub current_xp: i32,
    pub points: i64,
    pub leveled_up: bool,
}

/// Applies XP awards with a per-user lock plus a version check on the
/// write. The lock serializes awards within this process; the version
/// check catches writers elsewhere, in which case the award is retried a
/// bounded number of times against fresh state.
pub struct XpEngine {
    users: Arc<dyn UserStore>,
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl XpEngine {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self {
            users,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, user_id: Uuid) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(user_id).or_default().clone()
    }

    pub async fn award(&self, user_id: Uuid, delta: u32) -> Result<AwardOutcome, ApiError> {
        let delta = i32::try_from(delta)
            .map_err(|_| ApiError::Validation("XP award too large".into()))?;
        if delta == 0 {
            let user = self
                .users
                .find_by_id(user_id)
                .await?
                .ok_or(ApiError::UserNotFound)?;
            return Ok(AwardOutcome {
                level: user.level,
                current_xp: user.current_xp,
                points: user.points,
                leveled_up: false,
            });
        }

        let lock = self.lock_for(user_id);
        let result = {
            let _guard = lock.lock().await;
            self.award_locked(user_id, delta).await
        };
        drop(lock);
        self.evict_idle(user_id);
        result
    }

    async fn award_locked(&self, user_id: Uuid, delta: i32) -> Result<AwardOutcome, ApiError> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let user = self
                .users
                .find_by_id(user_id)
                .await?
                .ok_or(ApiError::UserNotFound)?;
            let (level, current_xp) = advance(user.level, user.current_xp, delta);
            let update = GamificationUpdate {
                level,
                current_xp,
                points: user.points + delta as i64,
            };
            match self
                .users
                .apply_gamification(user.id, update, user.version)
                .await
            {
                Ok(()) => {
                    let leveled_up = level > user.level;
                    if leveled_up {
                        info!(user_id = %user_id, from = user.level, to = level, "level up");
                    }
                    return Ok(AwardOutcome {
                        level,
                        current_xp,
                        points: update.points,
                        leveled_up,
                    });
                }
                Err(StoreError::VersionConflict) => {
                    debug!(user_id = %user_id, attempt, "stale version on xp write, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ApiError::ConcurrencyConflict)
    }

    /// Removes the per-user entry once the map is its only owner, so the
    /// map tracks in-flight awards rather than every user ever awarded.
    fn evict_idle(&self, user_id: Uuid) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = locks.get(&user_id) {
            if Arc::strong_count(entry) == 1 {
                locks.remove(&user_id);
            }
        }
    }
}

/// Carry-remainder level-up: surplus XP rolls into the next level, so the
/// resulting `(level, current_xp)` depends only on lifetime XP. The
/// cascade runs on i64; banked xp plus a near-maximal delta exceeds i32
/// before the remainder drops back under the level threshold.
fn advance(level: i32, xp: i32, delta: i32) -> (i32, i32) {
    let mut level = i64::from(level);
    let mut xp = i64::from(xp) + i64::from(delta);
    // same threshold as required_xp, widened to i64
    while xp >= level * 10 {
        xp -= level * 10;
        level += 1;
    }
    (level as i32, xp as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::{MemoryUserStore, NewUser, User};
    use async_trait::async_trait;

    async fn fresh_user(users: &dyn UserStore, tag: &str) -> User {
        users
            .insert(NewUser {
                email: format!("{tag}@example.jp"),
                username: tag.into(),
                password_hash: "hash".into(),
                department: None,
            })
            .await
            .unwrap()
    }

    #[test]
    fn required_xp_scales_linearly() {
        assert_eq!(required_xp(1), 10);
        assert_eq!(required_xp(3), 30);
        assert_eq!(required_xp(10), 100);
    }

    #[test]
    fn advance_carries_surplus_into_the_next_level() {
        // level 3 at 29 xp, one more point crosses the threshold exactly
        assert_eq!(advance(3, 29, 1), (4, 0));
        // surplus rolls over
        assert_eq!(advance(3, 29, 6), (4, 5));
        // large delta cascades: 100 xp from fresh exhausts levels 1-4
        assert_eq!(advance(1, 0, 100), (5, 0));
    }

    #[test]
    fn advance_does_not_wrap_on_maximal_deltas() {
        // levels 1..L consume 5*L*(L-1) lifetime xp; i32::MAX lands at
        // level 20724 with 166_387 left over
        let (level, xp) = advance(1, 0, i32::MAX);
        assert_eq!((level, xp), (20_724, 166_387));

        // a second maximal delta on top of the banked remainder
        let (level, xp) = advance(level, xp, i32::MAX);
        assert_eq!((level, xp), (29_309, 26_434));
        assert!(xp >= 0);
        assert!(xp < required_xp(level));
    }

    #[tokio::test]
    async fn zero_delta_reads_without_writing() {
        let users: Arc<MemoryUserStore> = Arc::new(MemoryUserStore::new());
        let engine = XpEngine::new(users.clone());
        let user = fresh_user(users.as_ref(), "a").await;

        let outcome = engine.award(user.id, 0).await.unwrap();
        assert_eq!(outcome.points, 0);
        assert!(!outcome.leveled_up);

        let reloaded = users.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.version, user.version);
    }

    #[tokio::test]
    async fn split_awards_equal_one_big_award() {
        let users: Arc<MemoryUserStore> = Arc::new(MemoryUserStore::new());
        let engine = XpEngine::new(users.clone());
        let split = fresh_user(users.as_ref(), "split").await;
        let whole = fresh_user(users.as_ref(), "whole").await;

        engine.award(split.id, 7).await.unwrap();
        engine.award(split.id, 8).await.unwrap();
        engine.award(whole.id, 15).await.unwrap();

        let split = users.find_by_id(split.id).await.unwrap().unwrap();
        let whole = users.find_by_id(whole.id).await.unwrap().unwrap();
        assert_eq!(
            (split.level, split.current_xp, split.points),
            (whole.level, whole.current_xp, whole.points)
        );
    }

    #[tokio::test]
    async fn award_reports_level_ups() {
        let users: Arc<MemoryUserStore> = Arc::new(MemoryUserStore::new());
        let engine = XpEngine::new(users.clone());
        let user = fresh_user(users.as_ref(), "a").await;

        let outcome = engine.award(user.id, 10).await.unwrap();
        assert!(outcome.leveled_up);
        assert_eq!((outcome.level, outcome.current_xp), (2, 0));

        let outcome = engine.award(user.id, 3).await.unwrap();
        assert!(!outcome.leveled_up);
        assert_eq!((outcome.level, outcome.current_xp), (2, 3));
        assert_eq!(outcome.points, 13);
    }

    #[tokio::test]
    async fn award_to_unknown_user_is_not_found() {
        let engine = XpEngine::new(Arc::new(MemoryUserStore::new()));
        let err = engine.award(Uuid::new_v4(), 10).await.unwrap_err();
        assert!(matches!(err, ApiError::UserNotFound));
    }

    #[tokio::test]
    async fn back_to_back_maximal_awards_stay_exact() {
        let users: Arc<MemoryUserStore> = Arc::new(MemoryUserStore::new());
        let engine = XpEngine::new(users.clone());
        let user = fresh_user(users.as_ref(), "max").await;

        engine.award(user.id, i32::MAX as u32).await.unwrap();
        let outcome = engine.award(user.id, i32::MAX as u32).await.unwrap();

        assert_eq!(outcome.points, 2 * i32::MAX as i64);
        assert_eq!((outcome.level, outcome.current_xp), (29_309, 26_434));

        let stored = users.find_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.current_xp >= 0);
        assert_eq!(stored.points, outcome.points);
    }

    #[tokio::test]
    async fn lock_map_holds_only_in_flight_awards() {
        let users: Arc<MemoryUserStore> = Arc::new(MemoryUserStore::new());
        let engine = XpEngine::new(users.clone());

        for tag in ["a", "b", "c"] {
            let user = fresh_user(users.as_ref(), tag).await;
            engine.award(user.id, 10).await.unwrap();
        }

        assert!(engine.locks.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_awards_lose_nothing() {
        let users: Arc<MemoryUserStore> = Arc::new(MemoryUserStore::new());
        let engine = Arc::new(XpEngine::new(users.clone()));
        let user = fresh_user(users.as_ref(), "busy").await;

        let mut handles = Vec::new();
        for _ in 0..50 {
            let engine = engine.clone();
            let user_id = user.id;
            handles.push(tokio::spawn(async move { engine.award(user_id, 10).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // 500 lifetime xp: levels 1-9 consume 10+20+...+90 = 450,
        // leaving 50 toward level 10's threshold of 100
        let final_state = users.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(final_state.points, 500);
        assert_eq!((final_state.level, final_state.current_xp), (10, 50));
        assert!(engine.locks.lock().unwrap().is_empty());
    }

    /// Store whose gamification writes never succeed, for the retry-budget
    /// path.
    struct ContendedStore {
        inner: MemoryUserStore,
    }

    #[async_trait]
    impl UserStore for ContendedStore {
        async fn insert(&self, new_user: NewUser) -> Result<User, StoreError> {
            self.inner.insert(new_user).await
        }
        async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
            self.inner.find_by_id(id).await
        }
        async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
            self.inner.find_by_email(email).await
        }
        async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
            self.inner.find_by_username(username).await
        }
        async fn update_profile(
            &self,
            id: Uuid,
            changes: crate::users::ProfileChanges,
        ) -> Result<User, StoreError> {
            self.inner.update_profile(id, changes).await
        }
        async fn update_avatar(
            &self,
            id: Uuid,
            data: bytes::Bytes,
            content_type: String,
        ) -> Result<(), StoreError> {
            self.inner.update_avatar(id, data, content_type).await
        }
        async fn load_avatar(&self, id: Uuid) -> Result<Option<(Vec<u8>, String)>, StoreError> {
            self.inner.load_avatar(id).await
        }
        async fn apply_gamification(
            &self,
            _id: Uuid,
            _update: GamificationUpdate,
            _expected_version: i64,
        ) -> Result<(), StoreError> {
            Err(StoreError::VersionConflict)
        }
        async fn top_by_points(&self, limit: i64) -> Result<Vec<User>, StoreError> {
            self.inner.top_by_points(limit).await
        }
        async fn top_by_level(&self, limit: i64) -> Result<Vec<User>, StoreError> {
            self.inner.top_by_level(limit).await
        }
        async fn count_ahead_by_points(&self, of: &User) -> Result<i64, StoreError> {
            self.inner.count_ahead_by_points(of).await
        }
        async fn count_ahead_by_level(&self, of: &User) -> Result<i64, StoreError> {
            self.inner.count_ahead_by_level(of).await
        }
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let store = Arc::new(ContendedStore {
            inner: MemoryUserStore::new(),
        });
        let user = fresh_user(store.as_ref(), "a").await;
        let engine = XpEngine::new(store);

        let err = engine.award(user.id, 10).await.unwrap_err();
        assert!(matches!(err, ApiError::ConcurrencyConflict));
    }
}
