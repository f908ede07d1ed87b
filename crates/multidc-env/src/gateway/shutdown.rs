use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared "gateway closed" guard
///
/// Clones share the same flag. The flag is set on the first close attempt,
/// successful or not, and never cleared, so a gateway shared by several
/// environments is torn down at most once.
#[derive(Debug, Clone, Default)]
pub struct GatewayShutdown {
    closed: Arc<AtomicBool>,
}

impl GatewayShutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true for exactly one caller across all clones
    pub fn try_begin_close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
