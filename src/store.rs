//! Canonical in-memory copies of the client and category collections, kept in
//! step with durable storage.
//!
//! Every write replaces a whole collection: the new list is serialized, written
//! under the collection's key, and only then swapped into the cache. Readers get
//! `Arc` snapshots and never see a half-applied change. Writers of the same
//! collection queue on an async mutex, so read-modify-write sequences cannot
//! interleave.

use std::fmt;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::model::{Category, Client};
use crate::storage::StoreHandle;
use crate::time::{Clock, SystemClock};
use crate::util::run_fenced;
use crate::{AppError, AppResult};

pub const CLIENTS_KEY: &str = "@subscription_monitor_clients";
pub const CATEGORIES_KEY: &str = "@subscription_monitor_categories";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Clients,
    Categories,
}

impl CollectionKind {
    pub fn storage_key(self) -> &'static str {
        match self {
            CollectionKind::Clients => CLIENTS_KEY,
            CollectionKind::Categories => CATEGORIES_KEY,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CollectionKind::Clients => "clients",
            CollectionKind::Categories => "categories",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entity persisted as one whole collection.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: CollectionKind;

    fn id(&self) -> &str;

    fn collection(store: &SubscriptionStore) -> &Collection<Self>;
}

impl Record for Client {
    const KIND: CollectionKind = CollectionKind::Clients;

    fn id(&self) -> &str {
        &self.id
    }

    fn collection(store: &SubscriptionStore) -> &Collection<Self> {
        &store.clients
    }
}

impl Record for Category {
    const KIND: CollectionKind = CollectionKind::Categories;

    fn id(&self) -> &str {
        &self.id
    }

    fn collection(store: &SubscriptionStore) -> &Collection<Self> {
        &store.categories
    }
}

pub struct Collection<T> {
    cache: RwLock<Arc<Vec<T>>>,
    writer: Mutex<()>,
}

impl<T: Record> Collection<T> {
    fn new(items: Vec<T>) -> Self {
        Self {
            cache: RwLock::new(Arc::new(items)),
            writer: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<Vec<T>> {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn find(&self, id: &str) -> Option<T> {
        self.snapshot().iter().find(|item| item.id() == id).cloned()
    }

    fn replace(&self, items: Arc<Vec<T>>) {
        let mut guard = self.cache.write().unwrap_or_else(|e| e.into_inner());
        *guard = items;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub clients: Arc<Vec<Client>>,
    pub categories: Arc<Vec<Category>>,
}

/// Post-commit observer of client mutations. Runs after the write succeeded;
/// panics are contained and never reach the caller.
pub trait MutationHook: Send + Sync {
    fn client_added(&self, _client: &Client) {}

    fn client_updated(&self, _before: &Client, _after: &Client) {}

    fn client_deleted(&self, _client: &Client) {}
}

pub struct StoreBuilder {
    storage: StoreHandle,
    clock: Arc<dyn Clock>,
    hooks: Vec<Arc<dyn MutationHook>>,
}

impl StoreBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn hook(mut self, hook: Arc<dyn MutationHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub async fn open(self) -> SubscriptionStore {
        let clients = read_collection::<Client>(&self.storage).await;
        let categories = read_collection::<Category>(&self.storage).await;
        info!(
            target: "submon",
            event = "store_loaded",
            clients = clients.len(),
            categories = categories.len()
        );
        SubscriptionStore {
            storage: self.storage,
            clock: self.clock,
            hooks: self.hooks,
            clients: Collection::new(clients),
            categories: Collection::new(categories),
        }
    }
}

pub struct SubscriptionStore {
    storage: StoreHandle,
    clock: Arc<dyn Clock>,
    hooks: Vec<Arc<dyn MutationHook>>,
    clients: Collection<Client>,
    categories: Collection<Category>,
}

impl SubscriptionStore {
    pub fn builder(storage: StoreHandle) -> StoreBuilder {
        StoreBuilder {
            storage,
            clock: Arc::new(SystemClock),
            hooks: Vec::new(),
        }
    }

    /// Open with the system clock and no hooks.
    pub async fn open(storage: StoreHandle) -> Self {
        Self::builder(storage).open().await
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    pub fn clients(&self) -> Arc<Vec<Client>> {
        self.clients.snapshot()
    }

    pub fn categories(&self) -> Arc<Vec<Category>> {
        self.categories.snapshot()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            clients: self.clients(),
            categories: self.categories(),
        }
    }

    pub fn get<T: Record>(&self, id: &str) -> Option<T> {
        T::collection(self).find(id)
    }

    /// Re-read both collections from durable storage and adopt them.
    ///
    /// Missing or malformed records come back empty; this never fails.
    pub async fn load(&self) -> Snapshot {
        let _clients_guard = self.clients.writer.lock().await;
        let _categories_guard = self.categories.writer.lock().await;
        let clients = Arc::new(read_collection::<Client>(&self.storage).await);
        let categories = Arc::new(read_collection::<Category>(&self.storage).await);
        self.clients.replace(clients.clone());
        self.categories.replace(categories.clone());
        Snapshot {
            clients,
            categories,
        }
    }

    /// Persist `items` as the complete collection, then adopt it as the cache.
    pub async fn save<T: Record>(&self, items: Vec<T>) -> AppResult<Arc<Vec<T>>> {
        let _guard = T::collection(self).writer.lock().await;
        self.persist_locked(items).await
    }

    /// Serialized read-modify-write. `f` sees the current collection and
    /// returns the replacement plus a result, or `None` to leave storage
    /// untouched.
    pub(crate) async fn mutate<T, R, F>(&self, f: F) -> AppResult<Option<R>>
    where
        T: Record,
        F: FnOnce(&[T]) -> Option<(Vec<T>, R)>,
    {
        let collection = T::collection(self);
        let _guard = collection.writer.lock().await;
        let current = collection.snapshot();
        match f(current.as_slice()) {
            Some((next, outcome)) => {
                self.persist_locked(next).await?;
                Ok(Some(outcome))
            }
            None => Ok(None),
        }
    }

    pub(crate) fn notify<F>(&self, label: &'static str, f: F)
    where
        F: Fn(&dyn MutationHook),
    {
        for hook in &self.hooks {
            run_fenced(label, || f(hook.as_ref()));
        }
    }

    async fn persist_locked<T: Record>(&self, items: Vec<T>) -> AppResult<Arc<Vec<T>>> {
        let kind = T::KIND;
        let payload = serde_json::to_string(&items)
            .map_err(|err| write_failed(kind, AppError::from(err)))?;
        let storage = self.storage.clone();
        let written = blocking(move || storage.set_item(kind.storage_key(), &payload)).await?;
        match written {
            Ok(()) => {
                let items = Arc::new(items);
                T::collection(self).replace(items.clone());
                info!(
                    target: "submon",
                    event = "collection_saved",
                    collection = kind.as_str(),
                    len = items.len()
                );
                Ok(items)
            }
            Err(err) => {
                let err = write_failed(kind, AppError::from(err));
                error!(
                    target: "submon",
                    event = "collection_save_failed",
                    collection = kind.as_str(),
                    error = %err
                );
                Err(err)
            }
        }
    }
}

fn write_failed(kind: CollectionKind, cause: AppError) -> AppError {
    AppError::new(
        AppError::STORAGE_WRITE_FAILED,
        format!("Could not save {kind}. Please try again."),
    )
    .with_context("collection", kind.as_str())
    .with_cause(cause)
}

async fn blocking<R, F>(f: F) -> AppResult<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|err| {
        AppError::new("RUNTIME/TASK_FAILED", "Storage task did not complete")
            .with_context("error", err.to_string())
    })
}

/// Best-effort read: any failure yields an empty collection.
async fn read_collection<T: Record>(storage: &StoreHandle) -> Vec<T> {
    let kind = T::KIND;
    let storage = storage.clone();
    let raw = match blocking(move || storage.get_item(kind.storage_key()))
        .await
        .and_then(|read| read.map_err(AppError::from))
    {
        Ok(raw) => raw,
        Err(err) => {
            warn!(
                target: "submon",
                event = "collection_read_failed",
                collection = kind.as_str(),
                error = %err
            );
            None
        }
    };

    let Some(raw) = raw else {
        return Vec::new();
    };
    if raw.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<T>>(&raw) {
        Ok(items) => items,
        Err(err) => {
            warn!(
                target: "submon",
                event = "collection_decode_failed",
                collection = kind.as_str(),
                error = %AppError::from(err)
            );
            Vec::new()
        }
    }
}
