//! Force-close handle shared by the server and in-flight requests.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// Cancelled once the shutdown grace period runs out. Stream relays are
/// spawned through it so the server can wait for them to wind down.
#[derive(Clone, Default)]
pub struct ShutdownHandle {
    token: CancellationToken,
    relays: TaskTracker,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a relay task that `force_close` waits for
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.relays.spawn(task)
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel every in-flight request and wait for the relays to exit
    pub async fn force_close(&self) {
        self.token.cancel();
        self.relays.close();
        self.relays.wait().await;
    }
}
