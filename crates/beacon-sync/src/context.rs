//! # Request Context
//!
//! Thread-local workspace/device binding for code that runs on behalf of a
//! session.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Context Binding                                   │
//! │                                                                         │
//! │  let _ctx = ContextGuard::bind("ws-1", "dev-a");                       │
//! │  ... current_workspace() == Some("ws-1") ...                           │
//! │  ... current_device()    == Some("dev-a") ...                          │
//! │  // guard dropped → previous binding restored (usually none)           │
//! │                                                                         │
//! │  The guard restores the PREVIOUS binding on drop, so nested scopes     │
//! │  compose, and drop runs during unwinding, so a panicking handler       │
//! │  never leaks its binding into the next task on the thread.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The binding is thread-local, not task-local: hold it across synchronous
//! stretches (a log statement, a presence update), never across an await.

use std::cell::RefCell;

// =============================================================================
// Request Context
// =============================================================================

/// The identity a piece of work runs under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Workspace the work belongs to.
    pub workspace: String,

    /// Device that triggered the work.
    pub device: String,
}

thread_local! {
    static CURRENT: RefCell<Option<RequestContext>> = const { RefCell::new(None) };
}

/// Returns the workspace bound on this thread, if any.
pub fn current_workspace() -> Option<String> {
    CURRENT.with(|c| c.borrow().as_ref().map(|ctx| ctx.workspace.clone()))
}

/// Returns the device bound on this thread, if any.
pub fn current_device() -> Option<String> {
    CURRENT.with(|c| c.borrow().as_ref().map(|ctx| ctx.device.clone()))
}

// =============================================================================
// Context Guard
// =============================================================================

/// RAII binding of a [`RequestContext`] to the current thread.
///
/// Restores the previous binding when dropped.
#[must_use = "the binding ends when the guard is dropped"]
pub struct ContextGuard {
    previous: Option<RequestContext>,
}

impl ContextGuard {
    /// Binds a workspace/device pair to the current thread.
    pub fn bind(workspace: &str, device: &str) -> Self {
        let next = RequestContext {
            workspace: workspace.to_string(),
            device: device.to_string(),
        };
        let previous = CURRENT.with(|c| c.borrow_mut().replace(next));
        ContextGuard { previous }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|c| *c.borrow_mut() = previous);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_and_clear() {
        assert_eq!(current_workspace(), None);

        {
            let _guard = ContextGuard::bind("ws-1", "dev-a");
            assert_eq!(current_workspace(), Some("ws-1".to_string()));
            assert_eq!(current_device(), Some("dev-a".to_string()));
        }

        assert_eq!(current_workspace(), None);
        assert_eq!(current_device(), None);
    }

    #[test]
    fn test_nested_binds_restore_outer() {
        let _outer = ContextGuard::bind("ws-outer", "dev-1");

        {
            let _inner = ContextGuard::bind("ws-inner", "dev-2");
            assert_eq!(current_workspace(), Some("ws-inner".to_string()));
        }

        assert_eq!(current_workspace(), Some("ws-outer".to_string()));
        assert_eq!(current_device(), Some("dev-1".to_string()));
    }

    #[test]
    fn test_panic_does_not_leak_binding() {
        let result = std::panic::catch_unwind(|| {
            let _guard = ContextGuard::bind("ws-panic", "dev-x");
            panic!("boom");
        });
        assert!(result.is_err());

        // Unwinding ran the guard's drop
        assert_eq!(current_workspace(), None);
    }
}
