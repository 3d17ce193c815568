use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// A background loop plus the token that asks it to exit.
///
/// Loops must check the token at the top of every iteration and race it
/// against their sleep; `shutdown` cancels and then joins, so once it
/// returns the loop body is no longer running.
#[derive(Debug)]
pub struct Worker {
    name: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Spawn `body` on the current tokio runtime. `None` outside a runtime.
    pub fn spawn<F, Fut>(name: impl Into<String>, body: F) -> Option<Self>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let cancel = CancellationToken::new();
        let handle = runtime.spawn(body(cancel.clone()));
        Some(Self {
            name: name.into(),
            cancel,
            handle,
        })
    }

    /// Ask the loop to exit without waiting for it.
    pub fn signal(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel and join.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        match self.handle.await {
            Ok(()) => debug!("{} worker exited", self.name),
            Err(e) if e.is_panic() => error!("{} worker panicked: {}", self.name, e),
            Err(e) => debug!("{} worker aborted: {}", self.name, e),
        }
    }
}
