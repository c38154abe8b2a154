use tracing::{debug, info};

use crate::model::{Category, CategoryPatch};
use crate::store::SubscriptionStore;
use crate::AppResult;

pub async fn add_category(store: &SubscriptionStore, category: Category) -> AppResult<Category> {
    let record = category.clone();
    store
        .mutate::<Category, _, _>(move |current| {
            let mut next = current.to_vec();
            next.push(record);
            Some((next, ()))
        })
        .await?;
    info!(target: "submon", event = "category_added", id = %category.id);
    Ok(category)
}

/// Applies `patch` to every category with `id` and returns the first.
/// Unknown ids are a no-op and return `Ok(None)`.
pub async fn update_category(
    store: &SubscriptionStore,
    id: &str,
    patch: &CategoryPatch,
) -> AppResult<Option<Category>> {
    let updated = store
        .mutate::<Category, _, _>(|current| {
            let mut first = None;
            let next: Vec<Category> = current
                .iter()
                .map(|category| {
                    if category.id != id {
                        return category.clone();
                    }
                    let after = patch.apply(category);
                    first.get_or_insert_with(|| after.clone());
                    after
                })
                .collect();
            first.map(|after| (next, after))
        })
        .await?;
    match &updated {
        Some(_) => info!(target: "submon", event = "category_updated", id = %id),
        None => debug!(
            target: "submon",
            event = "category_update_skipped",
            id = %id,
            reason = "not_found"
        ),
    }
    Ok(updated)
}

/// Removes every category with `id`, returning the first. Clients pointing at
/// it keep their `categoryId` and render without a category.
pub async fn delete_category(store: &SubscriptionStore, id: &str) -> AppResult<Option<Category>> {
    let removed = store
        .mutate::<Category, _, _>(|current| {
            let (removed, kept): (Vec<Category>, Vec<Category>) =
                current.iter().cloned().partition(|c| c.id == id);
            removed.into_iter().next().map(|first| (kept, first))
        })
        .await?;
    match &removed {
        Some(_) => info!(target: "submon", event = "category_deleted", id = %id),
        None => debug!(
            target: "submon",
            event = "category_delete_skipped",
            id = %id,
            reason = "not_found"
        ),
    }
    Ok(removed)
}

pub fn get_category_by_id(store: &SubscriptionStore, id: &str) -> Option<Category> {
    store.get::<Category>(id)
}
