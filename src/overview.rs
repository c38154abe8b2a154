use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;
use ts_rs::TS;

use crate::expiry::ExpiryCalculator;
use crate::model::Client;
use crate::store::Snapshot;

pub const DEFAULT_DUE_SOON_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Name,
    #[default]
    Expiry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ExpiryLevel {
    Active,
    DueSoon,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ClientStatus {
    pub client: Client,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub category_name: Option<String>,
    #[ts(type = "number")]
    pub expires_at: i64,
    #[ts(type = "number")]
    pub days_left: i64,
    pub expired: bool,
    pub level: ExpiryLevel,
    pub label: String,
}

pub fn status_label(expired: bool, days_left: i64) -> String {
    if expired {
        return "Expired".to_string();
    }
    match days_left {
        0 => "Expires today".to_string(),
        1 => "Expires tomorrow".to_string(),
        n => format!("{n} days left"),
    }
}

pub fn status_level(expired: bool, days_left: i64, due_soon_days: i64) -> ExpiryLevel {
    if expired {
        ExpiryLevel::Expired
    } else if days_left <= due_soon_days {
        ExpiryLevel::DueSoon
    } else {
        ExpiryLevel::Active
    }
}

fn compare_names(a: &Client, b: &Client) -> Ordering {
    a.name
        .to_lowercase()
        .cmp(&b.name.to_lowercase())
        .then_with(|| a.name.cmp(&b.name))
}

/// One status row per client, every row evaluated against the same `now`.
///
/// Clients whose category no longer exists get `category_name: None`.
pub fn client_overview(
    snapshot: &Snapshot,
    calculator: &ExpiryCalculator,
    now_ms: i64,
    sort: SortOrder,
    due_soon_days: i64,
) -> Vec<ClientStatus> {
    let names: HashMap<&str, &str> = snapshot
        .categories
        .iter()
        .map(|c| (c.id.as_str(), c.name.as_str()))
        .collect();

    let mut rows: Vec<ClientStatus> = snapshot
        .clients
        .iter()
        .map(|client| {
            let expiry = calculator.evaluate(
                client.subscription_start_date,
                &client.subscription_duration,
                now_ms,
            );
            ClientStatus {
                client: client.clone(),
                category_name: names.get(client.category_id.as_str()).map(|n| n.to_string()),
                expires_at: expiry.expires_at,
                days_left: expiry.days_left,
                expired: expiry.expired,
                level: status_level(expiry.expired, expiry.days_left, due_soon_days),
                label: status_label(expiry.expired, expiry.days_left),
            }
        })
        .collect();

    match sort {
        SortOrder::Name => rows.sort_by(|a, b| compare_names(&a.client, &b.client)),
        SortOrder::Expiry => rows.sort_by_key(|row| row.expires_at),
    }
    rows
}
