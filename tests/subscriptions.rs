use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use submon_lib::model::{CategoryPatch, ClientPatch};
use submon_lib::storage::{MemoryStore, StoreHandle};
use submon_lib::store::{MutationHook, SubscriptionStore, CATEGORIES_KEY, CLIENTS_KEY};
use submon_lib::time::{FixedClock, MS_PER_DAY};
use submon_lib::{
    add_client, create_category, create_client, delete_category, delete_client,
    days_until_expiry, get_client_by_id, update_category, update_client, AppError, Client,
    NewCategory, NewClient, SubscriptionDuration,
};

const NOW: i64 = 1_717_200_000_000;

async fn open_at(handle: StoreHandle, now: i64) -> SubscriptionStore {
    SubscriptionStore::builder(handle)
        .clock(Arc::new(FixedClock::new(now)))
        .open()
        .await
}

fn new_client(name: &str, category_id: &str, start: i64) -> NewClient {
    NewClient {
        name: name.into(),
        email: None,
        phone: None,
        category_id: category_id.into(),
        subscription_start_date: start,
        subscription_duration: SubscriptionDuration::OneWeek,
        notes: None,
        amount_paid: None,
    }
}

fn hosting() -> NewCategory {
    NewCategory {
        name: "Hosting".into(),
        description: None,
    }
}

#[tokio::test]
async fn weekly_client_started_now_has_seven_days_left() {
    let store = open_at(StoreHandle::in_memory(), NOW).await;
    let hosting = create_category(&store, &hosting()).await.expect("category");
    let acme = create_client(&store, &new_client("Acme", &hosting.id, NOW))
        .await
        .expect("client");

    assert_eq!(
        days_until_expiry(acme.subscription_start_date, &acme.subscription_duration, NOW),
        7
    );
    assert_eq!(store.clients().len(), 1);
    assert_eq!(get_client_by_id(&store, &acme.id), Some(acme));
}

#[tokio::test]
async fn empty_storage_loads_empty_collections() {
    let store = SubscriptionStore::open(StoreHandle::in_memory()).await;
    let snapshot = store.load().await;
    assert!(snapshot.clients.is_empty());
    assert!(snapshot.categories.is_empty());
}

#[tokio::test]
async fn saved_collections_survive_a_reload() {
    let handle = StoreHandle::in_memory();
    let store = open_at(handle.clone(), NOW).await;
    let category = create_category(
        &store,
        &NewCategory {
            name: "Gym".into(),
            description: Some("Monthly passes".into()),
        },
    )
    .await
    .expect("category");
    let mut input = new_client("Dana", &category.id, NOW - MS_PER_DAY);
    input.subscription_duration = SubscriptionDuration::OneMonth;
    input.amount_paid = Some(49.5);
    let client = create_client(&store, &input).await.expect("client");

    let reopened = open_at(handle, NOW).await;
    assert_eq!(reopened.clients().as_slice(), &[client]);
    assert_eq!(reopened.categories().as_slice(), &[category]);
}

#[tokio::test]
async fn save_then_load_returns_the_saved_collection() {
    let store = open_at(StoreHandle::in_memory(), NOW).await;
    let mut legacy = client("c-2", "Legacy");
    legacy.subscription_duration = SubscriptionDuration::parse("QUARTERLY");
    let clients = vec![client("c-1", "Acme"), legacy];

    let saved = store.save(clients.clone()).await.expect("save");
    assert_eq!(saved.as_slice(), clients.as_slice());
    let loaded = store.load().await;
    assert_eq!(loaded.clients.as_slice(), clients.as_slice());
    assert!(loaded.categories.is_empty());
}

#[tokio::test]
async fn deleting_a_category_keeps_its_clients() {
    let store = open_at(StoreHandle::in_memory(), NOW).await;
    let category = create_category(&store, &hosting()).await.expect("category");
    let client = create_client(&store, &new_client("Acme", &category.id, NOW))
        .await
        .expect("client");

    let removed = delete_category(&store, &category.id).await.expect("delete");
    assert_eq!(removed.map(|c| c.id), Some(category.id.clone()));
    assert!(store.categories().is_empty());
    assert_eq!(store.clients().as_slice(), &[client]);
}

#[tokio::test]
async fn missing_ids_leave_everything_unchanged() {
    let memory = Arc::new(MemoryStore::new());
    let store = open_at(StoreHandle::new(memory.clone()), NOW).await;
    let category = create_category(&store, &hosting()).await.expect("category");
    let client = create_client(&store, &new_client("Acme", &category.id, NOW))
        .await
        .expect("client");
    let stored_clients = memory.raw(CLIENTS_KEY);
    let stored_categories = memory.raw(CATEGORIES_KEY);

    let patch = ClientPatch {
        name: Some("Ghost".into()),
        ..Default::default()
    };
    assert_eq!(update_client(&store, "nope", &patch).await.expect("update"), None);
    assert_eq!(delete_client(&store, "nope").await.expect("delete"), None);
    let rename = CategoryPatch {
        name: Some("Ghost".into()),
        description: None,
    };
    assert_eq!(
        update_category(&store, "nope", &rename).await.expect("update"),
        None
    );

    assert_eq!(store.clients().as_slice(), &[client]);
    assert_eq!(memory.raw(CLIENTS_KEY), stored_clients);
    assert_eq!(memory.raw(CATEGORIES_KEY), stored_categories);
}

#[tokio::test]
async fn update_merges_patch_and_stamps_updated_at() {
    let clock = Arc::new(FixedClock::new(NOW));
    let store = SubscriptionStore::builder(StoreHandle::in_memory())
        .clock(clock.clone())
        .open()
        .await;
    let category = create_category(&store, &hosting()).await.expect("category");
    let mut input = new_client("Acme", &category.id, NOW);
    input.email = Some("ops@acme.test".into());
    let client = create_client(&store, &input).await.expect("client");

    clock.advance(5_000);
    let patch: ClientPatch = serde_json::from_str(
        r#"{"email": null, "subscriptionDuration": "ONE_YEAR", "id": "hijack", "createdAt": 1}"#,
    )
    .expect("patch");
    let updated = update_client(&store, &client.id, &patch)
        .await
        .expect("update")
        .expect("present");

    assert_eq!(updated.id, client.id);
    assert_eq!(updated.created_at, client.created_at);
    assert_eq!(updated.updated_at, NOW + 5_000);
    assert_eq!(updated.email, None);
    assert_eq!(updated.subscription_duration, SubscriptionDuration::OneYear);
    assert_eq!(updated.name, "Acme");
    assert_eq!(store.clients().as_slice(), &[updated]);
}

#[tokio::test]
async fn failed_write_keeps_cache_and_skips_hooks() {
    let memory = Arc::new(MemoryStore::new());
    let hook = Arc::new(CountingHook::default());
    let store = SubscriptionStore::builder(StoreHandle::new(memory.clone()))
        .clock(Arc::new(FixedClock::new(NOW)))
        .hook(hook.clone())
        .open()
        .await;
    memory.set_fail_writes(true);

    let err: AppError = add_client(&store, client("c-1", "Acme"))
        .await
        .expect_err("write fails");
    assert_eq!(err.code(), AppError::STORAGE_WRITE_FAILED);
    assert_eq!(
        err.context().get("collection").map(String::as_str),
        Some("clients")
    );
    assert!(store.clients().is_empty());
    assert_eq!(memory.raw(CLIENTS_KEY), None);
    assert_eq!(hook.added.load(Ordering::SeqCst), 0);

    memory.set_fail_writes(false);
    add_client(&store, client("c-1", "Acme")).await.expect("retry");
    assert_eq!(store.clients().len(), 1);
    assert_eq!(hook.added.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_adds_lose_no_updates() {
    let handle = StoreHandle::in_memory();
    let store = Arc::new(open_at(handle.clone(), NOW).await);

    let mut tasks = Vec::new();
    for n in 0..24 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            add_client(&store, client(&format!("c-{n}"), &format!("Client {n}"))).await
        }));
    }
    for task in tasks {
        task.await.expect("join").expect("add");
    }

    assert_eq!(store.clients().len(), 24);
    let reopened = open_at(handle, NOW).await;
    let mut ids: Vec<_> = reopened.clients().iter().map(|c| c.id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 24);
}

#[tokio::test]
async fn panicking_hook_does_not_fail_the_mutation() {
    let counter = Arc::new(CountingHook::default());
    let store = SubscriptionStore::builder(StoreHandle::in_memory())
        .clock(Arc::new(FixedClock::new(NOW)))
        .hook(Arc::new(PanickingHook))
        .hook(counter.clone())
        .open()
        .await;

    let added = add_client(&store, client("c-1", "Acme")).await.expect("add");
    assert_eq!(store.clients().as_slice(), &[added]);
    assert_eq!(counter.added.load(Ordering::SeqCst), 1);

    delete_client(&store, "c-1").await.expect("delete");
    assert!(store.clients().is_empty());
    assert_eq!(counter.deleted.load(Ordering::SeqCst), 1);
}

fn client(id: &str, name: &str) -> Client {
    Client {
        id: id.into(),
        name: name.into(),
        email: None,
        phone: None,
        category_id: "cat".into(),
        subscription_start_date: NOW,
        subscription_duration: SubscriptionDuration::OneMonth,
        notes: None,
        amount_paid: None,
        created_at: NOW,
        updated_at: NOW,
    }
}

#[derive(Default)]
struct CountingHook {
    added: AtomicUsize,
    deleted: AtomicUsize,
}

impl MutationHook for CountingHook {
    fn client_added(&self, _client: &Client) {
        self.added.fetch_add(1, Ordering::SeqCst);
    }

    fn client_deleted(&self, _client: &Client) {
        self.deleted.fetch_add(1, Ordering::SeqCst);
    }
}

struct PanickingHook;

impl MutationHook for PanickingHook {
    fn client_added(&self, _client: &Client) {
        panic!("hook exploded");
    }

    fn client_deleted(&self, _client: &Client) {
        panic!("hook exploded again");
    }
}
