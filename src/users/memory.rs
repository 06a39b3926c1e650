use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::{
    ConflictField, GamificationUpdate, NewUser, ProfileChanges, StoreError, User, UserStore,
};

struct Record {
    user: User,
    avatar: Option<(Vec<u8>, String)>,
}

/// In-memory `UserStore` with the same observable contract as the Postgres
/// store: email-before-username conflict reporting, version-checked
/// gamification writes, identical ranking order. Backs `AppState::fake()`
/// and the core test-suite.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: RwLock<HashMap<Uuid, Record>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Points ordering: points desc, id asc. `Less` means `a` lists before `b`.
fn points_order(a: &User, b: &User) -> Ordering {
    b.points.cmp(&a.points).then_with(|| a.id.cmp(&b.id))
}

/// Level ordering: level desc, current_xp desc, id asc.
fn level_order(a: &User, b: &User) -> Ordering {
    b.level
        .cmp(&a.level)
        .then_with(|| b.current_xp.cmp(&a.current_xp))
        .then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, new_user: NewUser) -> Result<User, StoreError> {
        // single write lock makes check-then-insert atomic, mirroring what
        // the unique constraints give the Postgres store
        let mut map = self.inner.write().await;
        if map.values().any(|r| r.user.email == new_user.email) {
            return Err(StoreError::Conflict(ConflictField::Email));
        }
        if map.values().any(|r| r.user.username == new_user.username) {
            return Err(StoreError::Conflict(ConflictField::Username));
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            username: new_user.username,
            password_hash: new_user.password_hash,
            department: new_user.department,
            is_admin: false,
            level: 1,
            current_xp: 0,
            points: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        map.insert(
            user.id,
            Record {
                user: user.clone(),
                avatar: None,
            },
        );
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let map = self.inner.read().await;
        Ok(map.get(&id).map(|r| r.user.clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let map = self.inner.read().await;
        Ok(map
            .values()
            .find(|r| r.user.email == email)
            .map(|r| r.user.clone()))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let map = self.inner.read().await;
        Ok(map
            .values()
            .find(|r| r.user.username == username)
            .map(|r| r.user.clone()))
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> Result<User, StoreError> {
        let mut map = self.inner.write().await;
        if let Some(username) = &changes.username {
            if map
                .values()
                .any(|r| r.user.id != id && r.user.username == *username)
            {
                return Err(StoreError::Conflict(ConflictField::Username));
            }
        }
        let record = map.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(username) = changes.username {
            record.user.username = username;
        }
        if let Some(department) = changes.department {
            record.user.department = Some(department);
        }
        record.user.version += 1;
        record.user.updated_at = OffsetDateTime::now_utc();
        Ok(record.user.clone())
    }

    async fn update_avatar(
        &self,
        id: Uuid,
        data: bytes::Bytes,
        content_type: String,
    ) -> Result<(), StoreError> {
        let mut map = self.inner.write().await;
        let record = map.get_mut(&id).ok_or(StoreError::NotFound)?;
        record.avatar = Some((data.to_vec(), content_type));
        record.user.version += 1;
        record.user.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn load_avatar(&self, id: Uuid) -> Result<Option<(Vec<u8>, String)>, StoreError> {
        let map = self.inner.read().await;
        Ok(map.get(&id).and_then(|r| r.avatar.clone()))
    }

    async fn apply_gamification(
        &self,
        id: Uuid,
        update: GamificationUpdate,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        let mut map = self.inner.write().await;
        let record = match map.get_mut(&id) {
            Some(r) => r,
            None => return Err(StoreError::VersionConflict),
        };
        if record.user.version != expected_version {
            return Err(StoreError::VersionConflict);
        }
        record.user.level = update.level;
        record.user.current_xp = update.current_xp;
        record.user.points = update.points;
        record.user.version += 1;
        record.user.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn top_by_points(&self, limit: i64) -> Result<Vec<User>, StoreError> {
        let map = self.inner.read().await;
        let mut users: Vec<User> = map.values().map(|r| r.user.clone()).collect();
        users.sort_by(points_order);
        users.truncate(limit.max(0) as usize);
        Ok(users)
    }

    async fn top_by_level(&self, limit: i64) -> Result<Vec<User>, StoreError> {
        let map = self.inner.read().await;
        let mut users: Vec<User> = map.values().map(|r| r.user.clone()).collect();
        users.sort_by(level_order);
        users.truncate(limit.max(0) as usize);
        Ok(users)
    }

    async fn count_ahead_by_points(&self, of: &User) -> Result<i64, StoreError> {
        let map = self.inner.read().await;
        Ok(map
            .values()
            .filter(|r| points_order(&r.user, of) == Ordering::Less)
            .count() as i64)
    }

    async fn count_ahead_by_level(&self, of: &User) -> Result<i64, StoreError> {
        let map = self.inner.read().await;
        Ok(map
            .values()
            .filter(|r| level_order(&r.user, of) == Ordering::Less)
            .count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str, username: &str) -> NewUser {
        NewUser {
            email: email.into(),
            username: username.into(),
            password_hash: "hash".into(),
            department: None,
        }
    }

    #[tokio::test]
    async fn insert_starts_fresh_users_at_level_one() {
        let store = MemoryUserStore::new();
        let user = store.insert(new_user("a@x.jp", "a")).await.unwrap();
        assert_eq!(user.level, 1);
        assert_eq!(user.current_xp, 0);
        assert_eq!(user.points, 0);
        assert!(!user.is_admin);
    }

    #[tokio::test]
    async fn duplicate_email_wins_over_duplicate_username() {
        let store = MemoryUserStore::new();
        store.insert(new_user("a@x.jp", "a")).await.unwrap();

        let err = store.insert(new_user("a@x.jp", "b")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ConflictField::Email)));

        let err = store.insert(new_user("b@x.jp", "a")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ConflictField::Username)));

        // both taken: email is reported first
        let err = store.insert(new_user("a@x.jp", "a")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ConflictField::Email)));
    }

    #[tokio::test]
    async fn gamification_write_is_version_checked() {
        let store = MemoryUserStore::new();
        let user = store.insert(new_user("a@x.jp", "a")).await.unwrap();

        let update = GamificationUpdate {
            level: 2,
            current_xp: 5,
            points: 15,
        };
        store
            .apply_gamification(user.id, update, user.version)
            .await
            .unwrap();

        // stale version is rejected
        let err = store
            .apply_gamification(user.id, update, user.version)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict));

        let reloaded = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.level, 2);
        assert_eq!(reloaded.current_xp, 5);
        assert_eq!(reloaded.points, 15);
        assert_eq!(reloaded.version, user.version + 1);
    }

    #[tokio::test]
    async fn update_profile_rejects_taken_username() {
        let store = MemoryUserStore::new();
        store.insert(new_user("a@x.jp", "a")).await.unwrap();
        let b = store.insert(new_user("b@x.jp", "b")).await.unwrap();

        let err = store
            .update_profile(
                b.id,
                ProfileChanges {
                    username: Some("a".into()),
                    department: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ConflictField::Username)));

        // keeping your own username is not a conflict
        let same = store
            .update_profile(
                b.id,
                ProfileChanges {
                    username: Some("b".into()),
                    department: Some("sales".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(same.username, "b");
        assert_eq!(same.department.as_deref(), Some("sales"));
    }

    async fn seed_points(store: &MemoryUserStore, spec: &[(&str, i64)]) {
        for (name, points) in spec {
            let user = store
                .insert(new_user(&format!("{name}@x.jp"), name))
                .await
                .unwrap();
            let update = GamificationUpdate {
                level: 1,
                current_xp: 0,
                points: *points,
            };
            store
                .apply_gamification(user.id, update, user.version)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn points_ranking_breaks_ties_by_id() {
        let store = MemoryUserStore::new();
        seed_points(&store, &[("a", 30), ("b", 50), ("c", 30), ("d", 10)]).await;

        let top = store.top_by_points(10).await.unwrap();
        assert_eq!(top.len(), 4);
        assert_eq!(top[0].points, 50);
        assert_eq!(top[1].points, 30);
        assert_eq!(top[2].points, 30);
        assert_eq!(top[3].points, 10);
        // tied block is ordered by id ascending
        assert!(top[1].id < top[2].id);
    }

    #[tokio::test]
    async fn my_rank_matches_list_position() {
        let store = MemoryUserStore::new();
        seed_points(&store, &[("a", 30), ("b", 50), ("c", 30), ("d", 10)]).await;

        let listing = store.top_by_points(10).await.unwrap();
        for (position, user) in listing.iter().enumerate() {
            let rank = 1 + store.count_ahead_by_points(user).await.unwrap();
            assert_eq!(rank, position as i64 + 1, "user {}", user.username);
        }
    }

    #[tokio::test]
    async fn level_ranking_orders_by_level_then_xp() {
        let store = MemoryUserStore::new();
        let specs: &[(&str, i32, i32)] = &[("a", 3, 5), ("b", 5, 0), ("c", 3, 20), ("d", 1, 9)];
        for (name, level, xp) in specs {
            let user = store
                .insert(new_user(&format!("{name}@x.jp"), name))
                .await
                .unwrap();
            let update = GamificationUpdate {
                level: *level,
                current_xp: *xp,
                points: 0,
            };
            store
                .apply_gamification(user.id, update, user.version)
                .await
                .unwrap();
        }

        let top = store.top_by_level(10).await.unwrap();
        let order: Vec<&str> = top.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a", "d"]);

        for (position, user) in top.iter().enumerate() {
            let rank = 1 + store.count_ahead_by_level(user).await.unwrap();
            assert_eq!(rank, position as i64 + 1);
        }
    }
}
