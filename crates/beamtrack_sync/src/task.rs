use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// What a slot does when asked to perform while a run is still active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    /// Ignore the new request.
    Drop,
    /// Cancel the active run and start the new one.
    Restartable,
}

struct ActiveRun {
    token: CancellationToken,
    handle: JoinHandle<()>,
    done: watch::Receiver<bool>,
}

impl ActiveRun {
    fn is_active(&self) -> bool {
        !self.handle.is_finished() && !*self.done.borrow()
    }

    fn cancel(self) {
        self.token.cancel();
        self.handle.abort();
    }
}

/// Signals completion even when the run is aborted mid-await.
struct DoneGuard(watch::Sender<bool>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}

/// Holds at most one running instance of a task. Dropping the slot cancels it.
pub struct TaskSlot {
    name: &'static str,
    policy: Concurrency,
    active: Mutex<Option<ActiveRun>>,
}

impl TaskSlot {
    pub fn new(name: &'static str, policy: Concurrency) -> Self {
        Self {
            name,
            policy,
            active: Mutex::new(None),
        }
    }

    pub fn drop_policy(name: &'static str) -> Self {
        Self::new(name, Concurrency::Drop)
    }

    pub fn restartable(name: &'static str) -> Self {
        Self::new(name, Concurrency::Restartable)
    }

    /// Spawns `task` with a fresh cancellation token. Returns `false` when the
    /// drop policy ignored the request.
    pub fn perform<F, Fut>(&self, task: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut active = self.lock();
        if let Some(run) = active.take() {
            if run.is_active() {
                match self.policy {
                    Concurrency::Drop => {
                        debug!(task = self.name, "task already running; request dropped");
                        *active = Some(run);
                        return false;
                    }
                    Concurrency::Restartable => {
                        debug!(task = self.name, "restarting task");
                        run.cancel();
                    }
                }
            }
        }

        let token = CancellationToken::new();
        let (done_tx, done) = watch::channel(false);
        let future = task(token.clone());
        let handle = tokio::spawn(async move {
            let _done = DoneGuard(done_tx);
            future.await;
        });
        *active = Some(ActiveRun {
            token,
            handle,
            done,
        });
        true
    }

    pub fn cancel(&self) {
        if let Some(run) = self.lock().take() {
            if run.is_active() {
                debug!(task = self.name, "task cancelled");
            }
            run.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().as_ref().is_some_and(ActiveRun::is_active)
    }

    /// Resolves once the current run, if any, has finished or been cancelled.
    pub async fn wait_idle(&self) {
        let done = self.lock().as_ref().map(|run| run.done.clone());
        if let Some(mut done) = done {
            let _ = done.wait_for(|finished| *finished).await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
