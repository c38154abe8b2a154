use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ts_rs::TS;

pub const VALIDATION_NAME_REQUIRED: &str = "VALIDATION/NAME_REQUIRED";
pub const VALIDATION_CATEGORY_REQUIRED: &str = "VALIDATION/CATEGORY_REQUIRED";
pub const VALIDATION_NO_CATEGORIES: &str = "VALIDATION/NO_CATEGORIES";
pub const VALIDATION_CATEGORY_NOT_FOUND: &str = "VALIDATION/CATEGORY_NOT_FOUND";
pub const VALIDATION_AMOUNT_INVALID: &str = "VALIDATION/AMOUNT_INVALID";

/// Length of a subscription term.
///
/// Stored as `ONE_WEEK`, `ONE_MONTH` or `ONE_YEAR`. Any other tag read back
/// from storage is kept verbatim in [`SubscriptionDuration::Unknown`] so it
/// survives a rewrite of the collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionDuration {
    OneWeek,
    OneMonth,
    OneYear,
    Unknown(String),
}

impl SubscriptionDuration {
    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionDuration::OneWeek => "ONE_WEEK",
            SubscriptionDuration::OneMonth => "ONE_MONTH",
            SubscriptionDuration::OneYear => "ONE_YEAR",
            SubscriptionDuration::Unknown(tag) => tag.as_str(),
        }
    }

    pub fn parse(tag: &str) -> Self {
        match tag {
            "ONE_WEEK" => SubscriptionDuration::OneWeek,
            "ONE_MONTH" => SubscriptionDuration::OneMonth,
            "ONE_YEAR" => SubscriptionDuration::OneYear,
            other => SubscriptionDuration::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for SubscriptionDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SubscriptionDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SubscriptionDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(SubscriptionDuration::parse(&tag))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub description: Option<String>,
    #[ts(type = "number")]
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Client {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub phone: Option<String>,
    pub category_id: String,
    #[ts(type = "number")]
    pub subscription_start_date: i64,
    #[ts(type = "\"ONE_WEEK\" | \"ONE_MONTH\" | \"ONE_YEAR\"")]
    pub subscription_duration: SubscriptionDuration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub amount_paid: Option<f64>,
    #[ts(type = "number")]
    pub created_at: i64,
    #[ts(type = "number")]
    pub updated_at: i64,
}

/// Distinguishes "field absent" from "field explicitly null" in patches.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial client update. `None` leaves a field as is; for optional fields
/// `Some(None)` clears it. Identity and timestamps are not patchable.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub phone: Option<Option<String>>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub subscription_start_date: Option<i64>,
    #[serde(default)]
    pub subscription_duration: Option<SubscriptionDuration>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub amount_paid: Option<Option<f64>>,
}

impl ClientPatch {
    pub fn apply(&self, client: &Client, now: i64) -> Client {
        let mut next = client.clone();
        if let Some(name) = &self.name {
            next.name = name.clone();
        }
        if let Some(email) = &self.email {
            next.email = email.clone();
        }
        if let Some(phone) = &self.phone {
            next.phone = phone.clone();
        }
        if let Some(category_id) = &self.category_id {
            next.category_id = category_id.clone();
        }
        if let Some(start) = self.subscription_start_date {
            next.subscription_start_date = start;
        }
        if let Some(duration) = &self.subscription_duration {
            next.subscription_duration = duration.clone();
        }
        if let Some(notes) = &self.notes {
            next.notes = notes.clone();
        }
        if let Some(amount) = self.amount_paid {
            next.amount_paid = amount;
        }
        next.updated_at = now;
        next
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

impl CategoryPatch {
    pub fn apply(&self, category: &Category) -> Category {
        let mut next = category.clone();
        if let Some(name) = &self.name {
            next.name = name.clone();
        }
        if let Some(description) = &self.description {
            next.description = description.clone();
        }
        next
    }
}
