//! Client subscription tracking: expiry arithmetic, a cached key-value
//! backed store, mutation helpers and reminder scheduling.

pub mod categories;
pub mod clients;
pub mod config;
pub mod error;
pub mod expiry;
pub mod forms;
pub mod id;
pub mod logging;
pub mod model;
pub mod notifications;
pub mod overview;
pub mod storage;
pub mod store;
pub mod time;
pub mod util;

pub use categories::{add_category, delete_category, get_category_by_id, update_category};
pub use clients::{add_client, delete_client, get_client_by_id, update_client};
pub use config::{AppConfig, LogConfig};
pub use error::{AppError, AppResult};
pub use expiry::{compute_expiry, days_until_expiry, is_expired, Expiry, ExpiryCalculator};
pub use forms::{create_category, create_client, NewCategory, NewClient};
pub use model::{Category, CategoryPatch, Client, ClientPatch, SubscriptionDuration};
pub use notifications::{Notifier, RecordingNotifier, ReminderScheduler};
pub use overview::{client_overview, ClientStatus, ExpiryLevel, SortOrder};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StoreHandle};
pub use store::{MutationHook, Snapshot, SubscriptionStore};

/// Build commit recorded at compile time, if git was available.
pub fn build_commit() -> &'static str {
    option_env!("SUBMON_GIT_HASH").unwrap_or("unknown")
}
