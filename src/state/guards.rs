use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One-shot in-flight flag for a single operation.
///
/// A second `try_begin` while the first token is alive fails immediately; the
/// caller reports "already in progress" instead of queueing.
#[derive(Clone, Default)]
pub struct OperationGuard {
    busy: Arc<AtomicBool>,
}

/// Clears the owning guard when dropped, whatever path the operation took.
pub struct InFlight {
    busy: Arc<AtomicBool>,
}

impl OperationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_begin(&self) -> Option<InFlight> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight {
                busy: self.busy.clone(),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
