//! Local expiry reminders.
//!
//! The host platform sits behind [`Notifier`]. [`ReminderScheduler`] turns a
//! client into a one-shot alert at its expiry instant and is wired into the
//! store as a [`MutationHook`], so reminder trouble never reaches the
//! mutation that caused it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::expiry::ExpiryCalculator;
use crate::model::Client;
use crate::store::MutationHook;
use crate::time::Clock;

pub const ALERT_TITLE: &str = "Subscription Renewal Due";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notifications are not supported on this platform")]
    Unsupported,
    #[error("notification permission was not granted")]
    PermissionDenied,
    #[error("platform notification call failed: {0}")]
    Platform(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiryAlert {
    pub client_id: String,
    pub title: String,
    pub body: String,
    pub fire_at_ms: i64,
}

impl ExpiryAlert {
    pub fn for_client(client: &Client, fire_at_ms: i64) -> Self {
        Self {
            client_id: client.id.clone(),
            title: ALERT_TITLE.to_string(),
            body: format!("{}'s subscription is expiring soon!", client.name),
            fire_at_ms,
        }
    }
}

/// Host platform local-notification API.
pub trait Notifier: Send + Sync {
    fn is_supported(&self) -> bool {
        true
    }

    fn permission_status(&self) -> PermissionStatus;

    fn request_permission(&self) -> PermissionStatus;

    /// Schedule a one-shot alert; returns the platform handle.
    fn schedule(&self, alert: &ExpiryAlert) -> Result<String, NotifyError>;

    fn cancel(&self, handle: &str) -> Result<(), NotifyError>;

    fn cancel_all(&self) -> Result<(), NotifyError>;
}

pub struct ReminderScheduler {
    notifier: Arc<dyn Notifier>,
    calculator: ExpiryCalculator,
    clock: Arc<dyn Clock>,
    handles: Mutex<HashMap<String, String>>,
}

impl ReminderScheduler {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        calculator: ExpiryCalculator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            notifier,
            calculator,
            clock,
            handles: Mutex::new(HashMap::new()),
        }
    }

    fn ensure_permission(&self) -> bool {
        if self.notifier.permission_status() == PermissionStatus::Granted {
            return true;
        }
        self.notifier.request_permission() == PermissionStatus::Granted
    }

    /// Schedule the expiry alert for `client`. Any obstacle (unsupported
    /// platform, no permission, expiry already passed, platform error) is
    /// logged and yields `None`.
    pub fn schedule_for_client(&self, client: &Client) -> Option<String> {
        if !self.notifier.is_supported() {
            info!(
                target: "submon",
                event = "reminder_skipped",
                reason = "unsupported",
                client_id = %client.id
            );
            return None;
        }
        if !self.ensure_permission() {
            warn!(
                target: "submon",
                event = "reminder_skipped",
                reason = "permission_denied",
                client_id = %client.id
            );
            return None;
        }

        let expires_at = self
            .calculator
            .expiry_ms(client.subscription_start_date, &client.subscription_duration);
        if expires_at <= self.clock.now_ms() {
            info!(
                target: "submon",
                event = "reminder_skipped",
                reason = "already_expired",
                client_id = %client.id
            );
            return None;
        }

        let alert = ExpiryAlert::for_client(client, expires_at);
        match self.notifier.schedule(&alert) {
            Ok(handle) => {
                info!(
                    target: "submon",
                    event = "reminder_scheduled",
                    client_id = %client.id,
                    handle = %handle,
                    fire_at_ms = expires_at
                );
                let mut guard = self.handles.lock().unwrap_or_else(|e| e.into_inner());
                guard.insert(client.id.clone(), handle.clone());
                Some(handle)
            }
            Err(err) => {
                warn!(
                    target: "submon",
                    event = "reminder_schedule_failed",
                    client_id = %client.id,
                    error = %err
                );
                None
            }
        }
    }

    pub fn cancel(&self, handle: &str) {
        if !self.notifier.is_supported() {
            return;
        }
        match self.notifier.cancel(handle) {
            Ok(()) => info!(target: "submon", event = "reminder_cancelled", handle = %handle),
            Err(err) => warn!(
                target: "submon",
                event = "reminder_cancel_failed",
                handle = %handle,
                error = %err
            ),
        }
    }

    pub fn cancel_all(&self) {
        if !self.notifier.is_supported() {
            return;
        }
        match self.notifier.cancel_all() {
            Ok(()) => {
                self.handles
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .clear();
                info!(target: "submon", event = "reminders_cancelled_all");
            }
            Err(err) => warn!(
                target: "submon",
                event = "reminder_cancel_all_failed",
                error = %err
            ),
        }
    }

    pub fn handle_for(&self, client_id: &str) -> Option<String> {
        self.handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(client_id)
            .cloned()
    }

    fn cancel_for_client(&self, client_id: &str) {
        let handle = self
            .handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(client_id);
        if let Some(handle) = handle {
            self.cancel(&handle);
        }
    }
}

impl MutationHook for ReminderScheduler {
    fn client_added(&self, client: &Client) {
        self.schedule_for_client(client);
    }

    fn client_updated(&self, before: &Client, after: &Client) {
        let term_changed = before.subscription_start_date != after.subscription_start_date
            || before.subscription_duration != after.subscription_duration;
        if term_changed || before.name != after.name {
            self.cancel_for_client(&before.id);
            self.schedule_for_client(after);
        }
    }

    fn client_deleted(&self, client: &Client) {
        self.cancel_for_client(&client.id);
    }
}

/// In-process notifier that keeps scheduled alerts in memory.
pub struct RecordingNotifier {
    supported: bool,
    permission: Mutex<PermissionStatus>,
    grant_on_request: bool,
    fail_schedule: bool,
    next_handle: AtomicU64,
    scheduled: Mutex<Vec<(String, ExpiryAlert)>>,
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::granted()
    }
}

impl RecordingNotifier {
    pub fn granted() -> Self {
        Self::build(true, PermissionStatus::Granted, true, false)
    }

    /// Permission starts undetermined and every request is refused.
    pub fn denying() -> Self {
        Self::build(true, PermissionStatus::Undetermined, false, false)
    }

    pub fn unsupported() -> Self {
        Self::build(false, PermissionStatus::Denied, false, false)
    }

    /// Permission is granted but every schedule call errors.
    pub fn failing() -> Self {
        Self::build(true, PermissionStatus::Granted, true, true)
    }

    fn build(
        supported: bool,
        permission: PermissionStatus,
        grant_on_request: bool,
        fail_schedule: bool,
    ) -> Self {
        Self {
            supported,
            permission: Mutex::new(permission),
            grant_on_request,
            fail_schedule,
            next_handle: AtomicU64::new(1),
            scheduled: Mutex::new(Vec::new()),
        }
    }

    pub fn scheduled(&self) -> Vec<(String, ExpiryAlert)> {
        self.scheduled
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn permission_status(&self) -> PermissionStatus {
        *self.permission.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn request_permission(&self) -> PermissionStatus {
        let mut guard = self.permission.lock().unwrap_or_else(|e| e.into_inner());
        *guard = if self.grant_on_request {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        };
        *guard
    }

    fn schedule(&self, alert: &ExpiryAlert) -> Result<String, NotifyError> {
        if !self.supported {
            return Err(NotifyError::Unsupported);
        }
        if self.permission_status() != PermissionStatus::Granted {
            return Err(NotifyError::PermissionDenied);
        }
        if self.fail_schedule {
            return Err(NotifyError::Platform("scheduler offline".into()));
        }
        let handle = format!("alert-{}", self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.scheduled
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((handle.clone(), alert.clone()));
        Ok(handle)
    }

    fn cancel(&self, handle: &str) -> Result<(), NotifyError> {
        self.scheduled
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(h, _)| h != handle);
        Ok(())
    }

    fn cancel_all(&self) -> Result<(), NotifyError> {
        self.scheduled
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        Ok(())
    }
}
