use crate::error::{CaptureError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

static GLOBAL_SESSIONS: LazyLock<Arc<SessionRegistry>> =
    LazyLock::new(|| Arc::new(SessionRegistry::new()));

/// Admits at most one capture session at a time. First caller wins, others are rejected.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    active: AtomicBool,
}

impl SessionRegistry {
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
        }
    }

    /// The process-wide registry used unless a capturer is given its own.
    pub fn global() -> Arc<Self> {
        GLOBAL_SESSIONS.clone()
    }

    pub fn try_acquire(self: &Arc<Self>) -> Result<SessionGuard> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CaptureError::CaptureInProgress)?;
        Ok(SessionGuard {
            registry: self.clone(),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Holds the registry for one session. Dropping it releases the slot.
#[derive(Debug)]
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
}

impl SessionGuard {
    /// Releases the slot now. Same as dropping the guard.
    pub fn release(self) {}
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.active.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_rejected_until_release() {
        let registry = Arc::new(SessionRegistry::new());
        let guard = registry.try_acquire().unwrap();
        assert!(registry.is_active());
        assert!(matches!(
            registry.try_acquire(),
            Err(CaptureError::CaptureInProgress)
        ));

        guard.release();
        assert!(!registry.is_active());
        let _again = registry.try_acquire().unwrap();
    }

    #[test]
    fn rejected_acquire_leaves_holder_untouched() {
        let registry = Arc::new(SessionRegistry::new());
        let _guard = registry.try_acquire().unwrap();
        let _ = registry.try_acquire();
        assert!(registry.is_active());
    }

    #[test]
    fn global_is_shared() {
        assert!(Arc::ptr_eq(&SessionRegistry::global(), &SessionRegistry::global()));
    }
}
