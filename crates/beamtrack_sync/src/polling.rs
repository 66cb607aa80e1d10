use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::task::TaskSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Running,
    Cancelled,
}

/// Returned by each poll invocation to decide whether another one is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollControl {
    Continue,
    Halt,
}

impl From<bool> for PollControl {
    fn from(keep_going: bool) -> Self {
        if keep_going {
            Self::Continue
        } else {
            Self::Halt
        }
    }
}

/// Runs an operation now and again after every interval until halted or stopped.
pub struct PollingTask {
    name: &'static str,
    slot: TaskSlot,
    generation: Arc<AtomicU64>,
    state: Arc<watch::Sender<PollState>>,
}

impl PollingTask {
    pub fn new(name: &'static str) -> Self {
        let (state, _) = watch::channel(PollState::Idle);
        Self {
            name,
            slot: TaskSlot::restartable(name),
            generation: Arc::new(AtomicU64::new(0)),
            state: Arc::new(state),
        }
    }

    /// Replaces any existing schedule.
    pub fn start<F, Fut>(&self, interval: Duration, mut operation: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = PollControl> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let current = self.generation.clone();
        let state = self.state.clone();
        let name = self.name;
        self.state.send_replace(PollState::Running);
        info!(task = name, interval_ms = interval.as_millis() as u64, "polling started");

        self.slot.perform(move |token| async move {
            let mut runs: u64 = 0;
            loop {
                let control = tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    control = operation() => control,
                };
                runs += 1;

                if control == PollControl::Halt {
                    if current.load(Ordering::SeqCst) == generation {
                        state.send_replace(PollState::Idle);
                    }
                    info!(task = name, runs, "polling halted");
                    return;
                }

                debug!(task = name, runs, "poll complete; waiting for next interval");
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });
    }

    /// Cancels the pending wait or in-flight invocation.
    pub fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.slot.cancel();
        if *self.state.borrow() != PollState::Cancelled {
            info!(task = self.name, "polling stopped");
        }
        self.state.send_replace(PollState::Cancelled);
    }

    pub fn state(&self) -> PollState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.slot.is_running()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::{PollControl, PollState, PollingTask};

    const FIVE_MINUTES: Duration = Duration::from_secs(300);

    fn counting(counter: &Arc<AtomicUsize>) -> impl FnMut() -> std::future::Ready<PollControl> {
        let counter = counter.clone();
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(PollControl::Continue)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_immediately_then_every_interval() {
        let polls = Arc::new(AtomicUsize::new(0));
        let task = PollingTask::new("list-refresh");
        task.start(FIVE_MINUTES, counting(&polls));

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(polls.load(Ordering::SeqCst), 1);
        assert_eq!(task.state(), PollState::Running);

        tokio::time::sleep(FIVE_MINUTES * 2).await;
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_interval_prevents_further_runs() {
        let polls = Arc::new(AtomicUsize::new(0));
        let task = PollingTask::new("list-refresh");
        task.start(FIVE_MINUTES, counting(&polls));
        tokio::time::sleep(Duration::from_secs(10)).await;

        task.stop();
        tokio::time::sleep(FIVE_MINUTES * 3).await;
        assert_eq!(polls.load(Ordering::SeqCst), 1);
        assert_eq!(task.state(), PollState::Cancelled);
        assert!(!task.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn halt_signal_returns_to_idle() {
        let polls = Arc::new(AtomicUsize::new(0));
        let task = PollingTask::new("reltime");
        let counter = polls.clone();
        task.start(Duration::from_secs(60), move || {
            let seen = counter.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(PollControl::from(seen < 2))
        });

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(polls.load(Ordering::SeqCst), 2);
        assert_eq!(task.state(), PollState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_keeps_single_schedule() {
        let polls = Arc::new(AtomicUsize::new(0));
        let task = PollingTask::new("list-refresh");
        task.start(FIVE_MINUTES, counting(&polls));
        task.start(FIVE_MINUTES, counting(&polls));

        tokio::time::sleep(FIVE_MINUTES + Duration::from_secs(1)).await;
        assert_eq!(polls.load(Ordering::SeqCst), 2);
    }
}
