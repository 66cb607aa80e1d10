use std::sync::Arc;
use std::time::Duration;

use beamtrack_backend::BeamBackend;
use beamtrack_contract::Beam;
use beamtrack_transfer::BeamStatus;
use tracing::{debug, info, warn};

use crate::cache::ObjectCache;
use crate::task::TaskSlot;

pub const DEFAULT_LIVE_INTERVAL: Duration = Duration::from_secs(5);

/// Keeps reloading one in-progress beam into the cache until it completes.
pub struct LiveRefresh {
    backend: Arc<dyn BeamBackend>,
    cache: ObjectCache,
    interval: Duration,
    slot: TaskSlot,
}

impl LiveRefresh {
    pub fn new(backend: Arc<dyn BeamBackend>, cache: ObjectCache, interval: Duration) -> Self {
        Self {
            backend,
            cache,
            interval,
            slot: TaskSlot::drop_policy("live-refresh"),
        }
    }

    /// Returns `false` when the beam is already complete or a refresh is active.
    pub fn start(&self, beam: &Beam) -> bool {
        if beam.completed {
            return false;
        }

        let beam_id = beam.id;
        let backend = self.backend.clone();
        let cache = self.cache.clone();
        let interval = self.interval;

        let started = self.slot.perform(move |token| async move {
            info!(beam_id, "live refresh started");
            let mut reloads: u32 = 0;
            loop {
                let reloaded = tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    reloaded = backend.get_beam(beam_id) => reloaded,
                };
                if token.is_cancelled() {
                    return;
                }
                reloads += 1;

                match reloaded {
                    Ok(fresh) => {
                        let status = BeamStatus::of(&fresh);
                        cache.upsert_beam(fresh);
                        if status.is_terminal() {
                            info!(beam_id, reloads, ?status, "beam finished; live refresh stopped");
                            return;
                        }
                        debug!(beam_id, reloads, "beam still in progress");
                    }
                    Err(error) => {
                        warn!(beam_id, error = %error, "beam reload failed; retrying next interval");
                    }
                }

                tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });

        if !started {
            debug!(beam_id, "live refresh already active");
        }
        started
    }

    pub fn cancel(&self) {
        self.slot.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.slot.is_running()
    }

    pub async fn wait(&self) {
        self.slot.wait_idle().await;
    }
}
