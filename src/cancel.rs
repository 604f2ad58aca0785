use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::ConnectorError;

/// Cooperative cancellation signal shared between the host and a running
/// sync or enrollment pass. Polled at loop boundaries; in-flight HTTP
/// calls are never aborted early.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Returns `Err(Cancelled)` once the token has been signalled.
    pub fn check(&self) -> Result<(), ConnectorError> {
        if self.is_cancelled() {
            Err(ConnectorError::Cancelled)
        } else {
            Ok(())
        }
    }
}
