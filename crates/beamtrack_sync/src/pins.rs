use std::sync::Arc;

use beamtrack_backend::BeamBackend;
use beamtrack_contract::BeamId;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::cache::{CacheEvent, ObjectCache};
use crate::session::Session;
use crate::task::TaskSlot;

/// Whether the signed-in user has pinned one beam, kept current as the beam or
/// the session changes.
pub struct PinTracker {
    backend: Arc<dyn BeamBackend>,
    cache: ObjectCache,
    session: Session,
    beam_id: BeamId,
    pinned: Arc<watch::Sender<bool>>,
    watcher: TaskSlot,
    toggle: TaskSlot,
}

impl PinTracker {
    pub fn new(
        backend: Arc<dyn BeamBackend>,
        cache: ObjectCache,
        session: Session,
        beam_id: BeamId,
    ) -> Self {
        let (pinned, _) = watch::channel(is_pinned(&cache, &session, beam_id));
        Self {
            backend,
            cache,
            session,
            beam_id,
            pinned: Arc::new(pinned),
            watcher: TaskSlot::drop_policy("pin-watcher"),
            toggle: TaskSlot::restartable("pin-toggle"),
        }
    }

    /// Begins following cache and session changes.
    pub fn start(&self) {
        let cache = self.cache.clone();
        let session = self.session.clone();
        let pinned = self.pinned.clone();
        let beam_id = self.beam_id;
        let mut events = self.cache.subscribe();
        let mut user = self.session.subscribe();
        publish(&pinned, &cache, &session, beam_id);

        self.watcher.perform(move |token| async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    changed = user.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                    event = events.recv() => match event {
                        Ok(CacheEvent::BeamChanged(changed)) if changed == beam_id => {}
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(beam_id, skipped, "pin watcher lagged; recomputing");
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    },
                }
                publish(&pinned, &cache, &session, beam_id);
            }
        });
    }

    pub fn stop(&self) {
        self.watcher.cancel();
        self.toggle.cancel();
    }

    pub fn is_pinned(&self) -> bool {
        *self.pinned.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.pinned.subscribe()
    }

    /// Flips the pin. Returns `false` when nobody is signed in.
    pub fn toggle(&self) -> bool {
        let should_pin = !self.is_pinned();
        self.set_pinned(should_pin)
    }

    pub fn set_pinned(&self, should_pin: bool) -> bool {
        if !self.session.is_authenticated() {
            debug!(beam_id = self.beam_id, "pin ignored without a session");
            return false;
        }

        let backend = self.backend.clone();
        let cache = self.cache.clone();
        let session = self.session.clone();
        let pinned = self.pinned.clone();
        let beam_id = self.beam_id;

        self.toggle.perform(move |token| async move {
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                outcome = async {
                    backend.set_pin(beam_id, should_pin).await?;
                    backend.get_beam(beam_id).await
                } => outcome,
            };
            if token.is_cancelled() {
                return;
            }

            match outcome {
                Ok(beam) => {
                    cache.upsert_beam(beam);
                    info!(beam_id, should_pin, "pin updated");
                }
                Err(error) if error.is_unauthorized() => {
                    warn!(beam_id, error = %error, "pin rejected; session no longer valid");
                    session.invalidate();
                }
                Err(error) => {
                    warn!(beam_id, error = %error, "pin request failed");
                }
            }
            publish(&pinned, &cache, &session, beam_id);
        })
    }

    pub async fn wait(&self) {
        self.toggle.wait_idle().await;
    }
}

fn is_pinned(cache: &ObjectCache, session: &Session, beam_id: BeamId) -> bool {
    session.user_id().is_some_and(|user_id| {
        cache
            .beam(beam_id)
            .is_some_and(|beam| beam.is_pinned_by(user_id))
    })
}

fn publish(pinned: &watch::Sender<bool>, cache: &ObjectCache, session: &Session, beam_id: BeamId) {
    let value = is_pinned(cache, session, beam_id);
    pinned.send_if_modified(|current| {
        if *current == value {
            return false;
        }
        *current = value;
        true
    });
}
