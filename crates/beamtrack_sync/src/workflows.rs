use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use beamtrack_backend::BeamBackend;
use beamtrack_contract::{
    ApiError, AppInfo, Beam, BeamId, IssueId, StorageSummary, TagSummary, Tracker, TrackerId,
    User, UserId,
};
use beamtrack_transfer::{submission_error_message, NewBeamForm};
use tracing::{info, warn};

use crate::cache::ObjectCache;
use crate::error::SyncError;
use crate::session::Session;

/// One-shot user actions: each sends its request, then reloads what changed.
#[derive(Clone)]
pub struct Workflows {
    backend: Arc<dyn BeamBackend>,
    cache: ObjectCache,
    session: Session,
    submitting: Arc<AtomicBool>,
}

struct SubmitGuard(Arc<AtomicBool>);

impl Drop for SubmitGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Workflows {
    pub fn new(backend: Arc<dyn BeamBackend>, cache: ObjectCache, session: Session) -> Self {
        Self {
            backend,
            cache,
            session,
            submitting: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn assign_issue(
        &self,
        beam_id: BeamId,
        tracker_id: TrackerId,
        id_in_tracker: &str,
    ) -> Result<Beam, SyncError> {
        let id_in_tracker = id_in_tracker.trim();
        if id_in_tracker.is_empty() {
            return Err(SyncError::EmptyIssueId);
        }

        let issue = self
            .backend
            .create_issue(tracker_id, id_in_tracker)
            .await
            .map_err(|error| self.failed(error))?;
        let issue_id = issue.id;
        self.cache.upsert_issue(issue);

        self.backend
            .attach_issue(beam_id, issue_id)
            .await
            .map_err(|error| self.failed(error))?;
        info!(beam_id, issue_id, tracker_id, "issue assigned");
        self.reload(beam_id).await
    }

    pub async fn remove_issue(&self, beam_id: BeamId, issue_id: IssueId) -> Result<Beam, SyncError> {
        self.backend
            .detach_issue(beam_id, issue_id)
            .await
            .map_err(|error| self.failed(error))?;
        info!(beam_id, issue_id, "issue removed");
        self.reload(beam_id).await
    }

    pub async fn save_tags(&self, beam_id: BeamId, tags: &[String]) -> Result<Beam, SyncError> {
        self.backend
            .update_tags(beam_id, tags)
            .await
            .map_err(|error| self.failed(error))?;
        self.reload(beam_id).await
    }

    pub async fn save_comment(&self, beam_id: BeamId, comment: &str) -> Result<Beam, SyncError> {
        self.backend
            .update_comment(beam_id, comment)
            .await
            .map_err(|error| self.failed(error))?;
        self.reload(beam_id).await
    }

    /// Validates and submits a new beam. A second call while one is in flight
    /// is rejected without touching the backend.
    pub async fn submit(&self, form: &NewBeamForm) -> Result<Beam, SyncError> {
        if self
            .submitting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("submission already in progress; ignoring");
            return Err(SyncError::SubmissionInFlight);
        }
        let _guard = SubmitGuard(self.submitting.clone());

        let request = form.validate()?;
        let beam = self
            .backend
            .create_beam(&request)
            .await
            .map_err(|error| self.failed(error))?;
        info!(beam_id = beam.id, host = %beam.host, "beam submitted");
        Ok(self.cache.upsert_beam(beam))
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::SeqCst)
    }

    pub async fn resolve_alias(&self, alias: &str) -> Result<BeamId, SyncError> {
        self.backend
            .resolve_alias(alias)
            .await
            .map_err(|error| self.failed(error))
    }

    pub async fn load_user(&self, user_id: UserId) -> Result<User, SyncError> {
        let user = self
            .backend
            .get_user(user_id)
            .await
            .map_err(|error| self.failed(error))?;
        self.cache.upsert_user(user.clone());
        Ok(user)
    }

    pub async fn load_trackers(&self) -> Result<Vec<Tracker>, SyncError> {
        let trackers = self
            .backend
            .list_trackers()
            .await
            .map_err(|error| self.failed(error))?;
        self.cache.set_trackers(trackers.clone());
        Ok(trackers)
    }

    pub async fn load_tags(&self) -> Result<Vec<TagSummary>, SyncError> {
        self.backend
            .list_tags()
            .await
            .map_err(|error| self.failed(error))
    }

    pub async fn app_info(&self) -> Result<AppInfo, SyncError> {
        self.backend
            .app_info()
            .await
            .map_err(|error| self.failed(error))
    }

    pub async fn storage_summary(&self) -> Result<StorageSummary, SyncError> {
        self.backend
            .storage_summary()
            .await
            .map_err(|error| self.failed(error))
    }

    async fn reload(&self, beam_id: BeamId) -> Result<Beam, SyncError> {
        let beam = self
            .backend
            .get_beam(beam_id)
            .await
            .map_err(|error| self.failed(error))?;
        Ok(self.cache.upsert_beam(beam))
    }

    fn failed(&self, error: ApiError) -> SyncError {
        if error.is_unauthorized() {
            warn!(error = %error, "backend rejected credentials; invalidating session");
            self.session.invalidate();
        }
        SyncError::Api(error)
    }
}

/// Text shown to the user for a failed workflow.
pub fn user_message(error: &SyncError) -> String {
    match error {
        SyncError::Api(api) => submission_error_message(api),
        other => other.to_string(),
    }
}
