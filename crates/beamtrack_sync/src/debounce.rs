use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::task::TaskSlot;

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(250);

type Emitter = Arc<dyn Fn(String) + Send + Sync>;

/// Text filter that only reports a value once typing has settled.
pub struct DebouncedFilter {
    quiet: Duration,
    pending: TaskSlot,
    last_emitted: Arc<Mutex<Option<String>>>,
    emit: Emitter,
}

impl DebouncedFilter {
    pub fn new(quiet: Duration, on_settled: impl Fn(String) + Send + Sync + 'static) -> Self {
        Self {
            quiet,
            pending: TaskSlot::restartable("debounced-filter"),
            last_emitted: Arc::new(Mutex::new(None)),
            emit: Arc::new(on_settled),
        }
    }

    pub fn channel(quiet: Duration) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let filter = Self::new(quiet, move |value| {
            let _ = tx.send(value);
        });
        (filter, rx)
    }

    /// Records a keystroke; supersedes any emission still waiting.
    pub fn input(&self, text: impl Into<String>) {
        let text = text.into();
        let deadline = Instant::now() + self.quiet;
        let last_emitted = self.last_emitted.clone();
        let emit = self.emit.clone();

        self.pending.perform(move |token| async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = sleep_until(deadline) => {
                    if token.is_cancelled() {
                        return;
                    }
                    let mut last = last_emitted.lock().unwrap_or_else(PoisonError::into_inner);
                    if last.as_deref() == Some(text.as_str()) {
                        return;
                    }
                    debug!(value = %text, "filter settled");
                    *last = Some(text.clone());
                    drop(last);
                    emit(text);
                }
            }
        });
    }

    /// Resets to `""` right away, dropping any pending emission.
    pub fn clear(&self) {
        self.pending.cancel();
        *self
            .last_emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(String::new());
        (self.emit)(String::new());
    }

    /// Drops a pending emission without emitting anything.
    pub fn cancel(&self) {
        self.pending.cancel();
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_running()
    }
}
