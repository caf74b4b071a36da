//! Control handle over one transport connection.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use uuid::Uuid;

/// Shared by the connection loop, the authentication gate and the session.
///
/// `close()` is immediate. `schedule_close()` asks the connection to close
/// once the reply to the current call has been queued.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: Uuid,
    close_scheduled: AtomicBool,
    closed: watch::Sender<bool>,
}

impl ConnectionHandle {
    /// Create a handle for a new connection.
    #[must_use]
    pub fn new() -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            close_scheduled: AtomicBool::new(false),
            closed,
        }
    }

    /// Connection id, used in logs.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Close after the in-flight reply is written.
    pub fn schedule_close(&self) {
        self.close_scheduled.store(true, Ordering::SeqCst);
    }

    /// Consume a pending [`ConnectionHandle::schedule_close`] request.
    pub fn take_scheduled_close(&self) -> bool {
        self.close_scheduled.swap(false, Ordering::SeqCst)
    }

    /// Close the transport now. Idempotent.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    /// Whether the transport has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the transport is closed.
    pub async fn closed(&self) {
        let mut receiver = self.closed.subscribe();
        // The sender lives in `self`, so this only returns once closed
        let _ = receiver.wait_for(|closed| *closed).await;
    }
}

impl Default for ConnectionHandle {
    fn default() -> Self {
        Self::new()
    }
}
