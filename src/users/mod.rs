mod memory;
mod pg;
mod store;

pub use memory::MemoryUserStore;
pub use pg::PgUserStore;
pub use store::{
    ConflictField, GamificationUpdate, NewUser, ProfileChanges, StoreError, User, UserStore,
};
