use tracing::{debug, info};

use crate::model::{Client, ClientPatch};
use crate::store::SubscriptionStore;
use crate::AppResult;

/// Append `client` to the collection, then notify hooks.
///
/// Field validation belongs to the caller; see [`crate::forms::create_client`].
pub async fn add_client(store: &SubscriptionStore, client: Client) -> AppResult<Client> {
    let record = client.clone();
    store
        .mutate::<Client, _, _>(move |current| {
            let mut next = current.to_vec();
            next.push(record);
            Some((next, ()))
        })
        .await?;
    info!(target: "submon", event = "client_added", id = %client.id);
    store.notify("client_added", |hook| hook.client_added(&client));
    Ok(client)
}

/// Merge `patch` over every client with `id` and stamp `updatedAt`.
///
/// Legacy data can hold duplicate ids; all of them are updated and the first
/// is returned. An unknown id is an idempotent no-op and returns `Ok(None)`.
pub async fn update_client(
    store: &SubscriptionStore,
    id: &str,
    patch: &ClientPatch,
) -> AppResult<Option<Client>> {
    let now = store.now_ms();
    let outcome = store
        .mutate::<Client, _, _>(|current| {
            let mut changed = Vec::new();
            let next: Vec<Client> = current
                .iter()
                .map(|client| {
                    if client.id != id {
                        return client.clone();
                    }
                    let after = patch.apply(client, now);
                    changed.push((client.clone(), after.clone()));
                    after
                })
                .collect();
            if changed.is_empty() {
                None
            } else {
                Some((next, changed))
            }
        })
        .await?;

    match outcome {
        Some(changed) => {
            info!(target: "submon", event = "client_updated", id = %id, count = changed.len());
            for (before, after) in &changed {
                store.notify("client_updated", |hook| hook.client_updated(before, after));
            }
            Ok(changed.into_iter().next().map(|(_, after)| after))
        }
        None => {
            debug!(target: "submon", event = "client_update_skipped", id = %id, reason = "not_found");
            Ok(None)
        }
    }
}

/// Remove every client with `id` and return the first one removed.
/// Unknown ids are a no-op and return `Ok(None)`.
pub async fn delete_client(store: &SubscriptionStore, id: &str) -> AppResult<Option<Client>> {
    let removed = store
        .mutate::<Client, _, _>(|current| {
            let (removed, kept): (Vec<Client>, Vec<Client>) =
                current.iter().cloned().partition(|c| c.id == id);
            if removed.is_empty() {
                None
            } else {
                Some((kept, removed))
            }
        })
        .await?;

    match removed {
        Some(removed) => {
            info!(target: "submon", event = "client_deleted", id = %id, count = removed.len());
            for client in &removed {
                store.notify("client_deleted", |hook| hook.client_deleted(client));
            }
            Ok(removed.into_iter().next())
        }
        None => {
            debug!(target: "submon", event = "client_delete_skipped", id = %id, reason = "not_found");
            Ok(None)
        }
    }
}

pub fn get_client_by_id(store: &SubscriptionStore, id: &str) -> Option<Client> {
    store.get::<Client>(id)
}
