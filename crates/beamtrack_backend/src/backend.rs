use async_trait::async_trait;
use beamtrack_contract::{
    ApiError, AppInfo, Beam, BeamCriteria, BeamFile, BeamId, FileQuery, Issue, IssueId,
    PageRequest, PagedResult, StorageSummary, TagSummary, Tracker, TrackerId, User, UserId,
};
use beamtrack_transfer::NewBeamRequest;

/// The REST surface the client consumes. Every call is one round trip.
#[async_trait]
pub trait BeamBackend: Send + Sync {
    async fn query_beams(
        &self,
        criteria: &BeamCriteria,
        request: PageRequest,
    ) -> Result<PagedResult<Beam>, ApiError>;

    /// Authoritative copy of a single beam; used to reload cached records.
    async fn get_beam(&self, beam_id: BeamId) -> Result<Beam, ApiError>;

    async fn query_files(&self, query: &FileQuery) -> Result<PagedResult<BeamFile>, ApiError>;

    async fn create_beam(&self, request: &NewBeamRequest) -> Result<Beam, ApiError>;

    async fn update_tags(&self, beam_id: BeamId, tags: &[String]) -> Result<(), ApiError>;

    async fn update_comment(&self, beam_id: BeamId, comment: &str) -> Result<(), ApiError>;

    /// Pins or unpins the beam for the authenticated user.
    async fn set_pin(&self, beam_id: BeamId, should_pin: bool) -> Result<(), ApiError>;

    async fn create_issue(
        &self,
        tracker_id: TrackerId,
        id_in_tracker: &str,
    ) -> Result<Issue, ApiError>;

    async fn attach_issue(&self, beam_id: BeamId, issue_id: IssueId) -> Result<(), ApiError>;

    async fn detach_issue(&self, beam_id: BeamId, issue_id: IssueId) -> Result<(), ApiError>;

    async fn get_user(&self, user_id: UserId) -> Result<User, ApiError>;

    async fn list_trackers(&self) -> Result<Vec<Tracker>, ApiError>;

    async fn list_tags(&self) -> Result<Vec<TagSummary>, ApiError>;

    async fn resolve_alias(&self, alias: &str) -> Result<BeamId, ApiError>;

    async fn app_info(&self) -> Result<AppInfo, ApiError>;

    async fn storage_summary(&self) -> Result<StorageSummary, ApiError>;
}
