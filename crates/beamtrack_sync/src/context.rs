use std::sync::Arc;

use anyhow::{Context, Result};
use beamtrack_backend::{BeamBackend, HttpBeamBackend};
use beamtrack_contract::BeamId;
use tokio::sync::watch;
use tracing::info;

use crate::cache::ObjectCache;
use crate::config::SyncConfig;
use crate::session::Session;
use crate::views::{BeamDetailView, BeamListView};
use crate::workflows::Workflows;

/// Beam currently highlighted in the list.
#[derive(Clone)]
pub struct Selection {
    selected: Arc<watch::Sender<Option<BeamId>>>,
}

impl Default for Selection {
    fn default() -> Self {
        let (selected, _) = watch::channel(None);
        Self {
            selected: Arc::new(selected),
        }
    }
}

impl Selection {
    pub fn select(&self, beam_id: BeamId) {
        self.selected.send_if_modified(|current| {
            let changed = *current != Some(beam_id);
            *current = Some(beam_id);
            changed
        });
    }

    pub fn clear(&self) {
        self.selected.send_if_modified(|current| current.take().is_some());
    }

    pub fn current(&self) -> Option<BeamId> {
        *self.selected.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<BeamId>> {
        self.selected.subscribe()
    }
}

/// Shared handles every view is built from.
#[derive(Clone)]
pub struct AppContext {
    pub backend: Arc<dyn BeamBackend>,
    pub cache: ObjectCache,
    pub session: Session,
    pub selection: Selection,
    pub config: Arc<SyncConfig>,
    workflows: Workflows,
}

impl AppContext {
    pub fn new(backend: Arc<dyn BeamBackend>, config: SyncConfig) -> Self {
        let cache = ObjectCache::new();
        let session = Session::anonymous();
        let workflows = Workflows::new(backend.clone(), cache.clone(), session.clone());
        Self {
            backend,
            cache,
            session,
            selection: Selection::default(),
            config: Arc::new(config),
            workflows,
        }
    }

    /// Builds the HTTP backend described by `config.backend`.
    pub fn connect(config: SyncConfig) -> Result<Self> {
        let backend = HttpBeamBackend::new(&config.backend)
            .with_context(|| format!("failed to set up backend {}", config.backend.base_url))?;
        info!(base_url = %config.backend.base_url, "beam backend configured");
        Ok(Self::new(Arc::new(backend), config))
    }

    /// Every handle shares one in-flight submission flag.
    pub fn workflows(&self) -> Workflows {
        self.workflows.clone()
    }

    pub fn beam_list(&self) -> BeamListView {
        BeamListView::new(self)
    }

    pub fn pinned_list(&self) -> BeamListView {
        BeamListView::pinned(self)
    }

    pub fn beam_detail(&self, beam_id: BeamId) -> BeamDetailView {
        BeamDetailView::new(self, beam_id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use beamtrack_backend::{InMemoryBeamBackend, Operation};
    use beamtrack_transfer::{AuthChoice, NewBeamForm};

    use super::{AppContext, Selection};
    use crate::config::SyncConfig;
    use crate::error::SyncError;

    #[test]
    fn selection_notifies_only_on_change() {
        let selection = Selection::default();
        let mut watcher = selection.subscribe();
        selection.select(4);
        assert!(watcher.has_changed().expect("sender alive"));
        watcher.borrow_and_update();

        selection.select(4);
        assert!(!watcher.has_changed().expect("sender alive"));
        selection.clear();
        assert_eq!(selection.current(), None);
    }

    #[test]
    fn connect_rejects_bad_backend_url() {
        let mut config = SyncConfig::default();
        config.backend.base_url = "::not a url::".to_string();
        let err = AppContext::connect(config).err().expect("bad url rejected");
        assert!(format!("{err:#}").contains("failed to set up backend"));
    }

    #[tokio::test(start_paused = true)]
    async fn second_submit_through_another_handle_is_rejected() {
        let backend = Arc::new(InMemoryBeamBackend::new());
        backend.push_latency(Operation::CreateBeam, Duration::from_secs(2));
        let ctx = AppContext::new(backend.clone(), SyncConfig::default());
        let form = NewBeamForm {
            user: "root".to_string(),
            host: "lab-9".to_string(),
            directory: "/var/crash".to_string(),
            auth: AuthChoice::Password,
            password: "hunter2".to_string(),
            ..NewBeamForm::default()
        };

        let first_handle = ctx.workflows();
        let second_handle = ctx.workflows();
        let (first, second) = tokio::join!(first_handle.submit(&form), second_handle.submit(&form));

        assert!(first.is_ok());
        assert!(matches!(second, Err(SyncError::SubmissionInFlight)));
        assert_eq!(backend.calls(Operation::CreateBeam), 1);
        assert!(!ctx.workflows().is_submitting());
    }
}
