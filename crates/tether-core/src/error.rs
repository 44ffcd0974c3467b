use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::{ElementId, ObjectKey};

/// A cleanup action that failed while the lifecycle runtime was retiring
/// an object, a deleted element, or a pooled component.
///
/// These never propagate: the runtime logs them, keeps going with the
/// remaining actions, and hands them back in the corresponding report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupError {
    TagCallbackPanicked {
        key: ObjectKey,
        tag: String,
        message: String,
    },
    OwnerPurgePanicked {
        id: ElementId,
        message: String,
    },
    /// The dependency graph panicked while releasing or clearing `id`.
    BindingReleasePanicked {
        id: ElementId,
        message: String,
    },
    ResetAttachmentPanicked {
        reuse_key: String,
        message: String,
    },
}

impl std::fmt::Display for CleanupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CleanupError::TagCallbackPanicked { key, tag, message } => {
                write!(f, "cleanup callback '{tag}' of {key} panicked: {message}")
            }
            CleanupError::OwnerPurgePanicked { id, message } => {
                write!(f, "owning view panicked while purging element {id}: {message}")
            }
            CleanupError::BindingReleasePanicked { id, message } => {
                write!(f, "dependency graph panicked while releasing {id}: {message}")
            }
            CleanupError::ResetAttachmentPanicked { reuse_key, message } => {
                write!(
                    f,
                    "recycled component '{reuse_key}' panicked in reset_attachment: {message}"
                )
            }
        }
    }
}

impl std::error::Error for CleanupError {}

/// Runs `f`, converting a panic into its message.
pub(crate) fn run_guarded(f: impl FnOnce()) -> Result<(), String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(panic_message)
}

/// Runs `f`, converting a panic into its message and keeping the return value otherwise.
pub(crate) fn call_guarded<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(panic_message)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
