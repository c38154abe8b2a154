use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::error;

pub fn panic_payload(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run `f`, turning a panic into `None` plus an error log.
pub fn run_fenced<T, F>(label: &'static str, f: F) -> Option<T>
where
    F: FnOnce() -> T,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            error!(
                target: "submon",
                event = "panic_caught",
                hook = label,
                message = %panic_payload(payload.as_ref())
            );
            None
        }
    }
}
