//! Cancellation handle for in-flight sends

use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/// Requests that an in-flight send stop reading from the transport
///
/// Clones share one slot holding the token of the current send, so a handle
/// taken once keeps reaching whichever send is running. A cancelled stream
/// ends at its next suspension point and leaves the history untouched.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    token: Arc<Mutex<CancellationToken>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the current send
    pub fn cancel(&self) {
        self.current().cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.current().is_cancelled()
    }

    /// Resolves once the current send is cancelled
    pub fn cancelled(&self) -> WaitForCancellationFutureOwned {
        self.current().cancelled_owned()
    }

    /// Arm a fresh token for a new send if the last one was cancelled
    pub(crate) fn rearm(&self) {
        let mut token = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
    }

    fn current(&self) -> CancellationToken {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
