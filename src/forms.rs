//! Input validation and record construction for new categories and clients.
//!
//! Failures here happen before the store is touched.

use serde::Deserialize;
use tracing::info;

use crate::categories::add_category;
use crate::clients::add_client;
use crate::id::new_uuid_v7;
use crate::model::{
    Category, Client, SubscriptionDuration, VALIDATION_AMOUNT_INVALID,
    VALIDATION_CATEGORY_NOT_FOUND, VALIDATION_CATEGORY_REQUIRED, VALIDATION_NAME_REQUIRED,
    VALIDATION_NO_CATEGORIES,
};
use crate::store::SubscriptionStore;
use crate::{AppError, AppResult};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClient {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub category_id: String,
    pub subscription_start_date: i64,
    pub subscription_duration: SubscriptionDuration,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub amount_paid: Option<f64>,
}

/// Trimmed text, or `None` when blank.
fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required_name(name: &str, message: &str) -> AppResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::new(VALIDATION_NAME_REQUIRED, message).with_context("field", "name"));
    }
    Ok(trimmed.to_string())
}

pub fn build_category(input: &NewCategory, now: i64) -> AppResult<Category> {
    Ok(Category {
        id: new_uuid_v7(),
        name: required_name(&input.name, "Please enter a category name")?,
        description: clean(input.description.as_deref()),
        created_at: now,
    })
}

pub fn build_client(input: &NewClient, categories: &[Category], now: i64) -> AppResult<Client> {
    let name = required_name(&input.name, "Please enter client name")?;

    let category_id = input.category_id.trim();
    if category_id.is_empty() {
        return Err(AppError::new(
            VALIDATION_CATEGORY_REQUIRED,
            "Please select a service category",
        )
        .with_context("field", "categoryId"));
    }
    if categories.is_empty() {
        return Err(AppError::new(
            VALIDATION_NO_CATEGORIES,
            "Please add at least one category first",
        ));
    }
    if !categories.iter().any(|c| c.id == category_id) {
        return Err(AppError::new(
            VALIDATION_CATEGORY_NOT_FOUND,
            "The selected category no longer exists",
        )
        .with_context("categoryId", category_id));
    }

    if let Some(amount) = input.amount_paid {
        if !amount.is_finite() || amount < 0.0 {
            return Err(AppError::new(
                VALIDATION_AMOUNT_INVALID,
                "Amount paid must be a non-negative number",
            )
            .with_context("amountPaid", amount.to_string()));
        }
    }

    Ok(Client {
        id: new_uuid_v7(),
        name,
        email: clean(input.email.as_deref()),
        phone: clean(input.phone.as_deref()),
        category_id: category_id.to_string(),
        subscription_start_date: input.subscription_start_date,
        subscription_duration: input.subscription_duration.clone(),
        notes: clean(input.notes.as_deref()),
        amount_paid: input.amount_paid,
        created_at: now,
        updated_at: now,
    })
}

pub async fn create_category(store: &SubscriptionStore, input: &NewCategory) -> AppResult<Category> {
    let category = build_category(input, store.now_ms()).map_err(log_rejected)?;
    add_category(store, category).await
}

pub async fn create_client(store: &SubscriptionStore, input: &NewClient) -> AppResult<Client> {
    let client =
        build_client(input, &store.categories(), store.now_ms()).map_err(log_rejected)?;
    add_client(store, client).await
}

fn log_rejected(err: AppError) -> AppError {
    info!(target: "submon", event = "validation_rejected", code = err.code());
    err
}
