use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use beamtrack_contract::{
    ApiError, AppInfo, Beam, BeamCriteria, BeamFile, BeamId, FileId, FileQuery, Issue, IssueId,
    PageMeta, PageRequest, PagedResult, StorageSummary, TagSummary, Tracker, TrackerId, User,
    UserId,
};
use beamtrack_transfer::NewBeamRequest;
use chrono::Utc;
use http::StatusCode;
use tracing::debug;

use crate::backend::BeamBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    QueryBeams,
    GetBeam,
    QueryFiles,
    CreateBeam,
    UpdateTags,
    UpdateComment,
    SetPin,
    CreateIssue,
    AttachIssue,
    DetachIssue,
    GetUser,
    ListTrackers,
    ListTags,
    ResolveAlias,
    AppInfo,
    StorageSummary,
}

/// Backend held entirely in memory, with scriptable latency and failures.
#[derive(Debug, Default)]
pub struct InMemoryBeamBackend {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    beams: BTreeMap<BeamId, Beam>,
    files: BTreeMap<FileId, BeamFile>,
    issues: BTreeMap<IssueId, Issue>,
    users: BTreeMap<UserId, User>,
    trackers: BTreeMap<TrackerId, Tracker>,
    aliases: HashMap<String, BeamId>,
    info: Option<AppInfo>,
    summary: Option<StorageSummary>,
    session_user: Option<UserId>,
    next_id: u64,
    calls: HashMap<Operation, usize>,
    reloads: HashMap<BeamId, usize>,
    complete_after: HashMap<BeamId, usize>,
    failures: VecDeque<(Operation, ApiError)>,
    latencies: HashMap<Operation, VecDeque<Duration>>,
    beam_queries: Vec<(BeamCriteria, PageRequest)>,
    file_queries: Vec<FileQuery>,
}

impl MemoryState {
    fn allocate_id(&mut self) -> u64 {
        let highest = [
            self.beams.keys().next_back(),
            self.issues.keys().next_back(),
            self.files.keys().next_back(),
        ]
        .into_iter()
        .flatten()
        .copied()
        .max()
        .unwrap_or(0);
        self.next_id = self.next_id.max(highest) + 1;
        self.next_id
    }

    fn beam_mut(&mut self, beam_id: BeamId) -> Result<&mut Beam, ApiError> {
        self.beams
            .get_mut(&beam_id)
            .ok_or_else(|| ApiError::not_found("No such beam"))
    }

    fn matches(&self, beam: &Beam, criteria: &BeamCriteria) -> bool {
        match criteria {
            BeamCriteria::All => true,
            BeamCriteria::Tag(raw) => raw.split(';').any(|tag| beam.has_tag(tag)),
            BeamCriteria::Email(email) => self
                .users
                .values()
                .find(|user| user.email.as_deref() == Some(email.as_str()))
                .is_some_and(|user| beam.initiator == Some(user.id)),
            BeamCriteria::Uid(uid) => beam.initiator == Some(*uid),
            BeamCriteria::Pinned => self
                .session_user
                .is_some_and(|user_id| beam.is_pinned_by(user_id)),
        }
    }
}

impl InMemoryBeamBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_beam(&self, beam: Beam) {
        self.lock().beams.insert(beam.id, beam);
    }

    pub fn insert_file(&self, file: BeamFile) {
        self.lock().files.insert(file.id, file);
    }

    pub fn insert_user(&self, user: User) {
        self.lock().users.insert(user.id, user);
    }

    pub fn insert_tracker(&self, tracker: Tracker) {
        self.lock().trackers.insert(tracker.id, tracker);
    }

    pub fn insert_alias(&self, alias: impl Into<String>, beam_id: BeamId) {
        self.lock().aliases.insert(alias.into(), beam_id);
    }

    pub fn set_info(&self, info: AppInfo) {
        self.lock().info = Some(info);
    }

    pub fn set_storage_summary(&self, summary: StorageSummary) {
        self.lock().summary = Some(summary);
    }

    /// User the backend treats as authenticated for pin requests.
    pub fn set_session_user(&self, user_id: Option<UserId>) {
        self.lock().session_user = user_id;
    }

    /// Flips the beam to completed on its `reloads`-th fetch.
    pub fn complete_after(&self, beam_id: BeamId, reloads: usize) {
        self.lock().complete_after.insert(beam_id, reloads);
    }

    /// The next call of `operation` fails with `error`.
    pub fn fail_next(&self, operation: Operation, error: ApiError) {
        self.lock().failures.push_back((operation, error));
    }

    /// The next call of `operation` takes `delay` before answering.
    pub fn push_latency(&self, operation: Operation, delay: Duration) {
        self.lock()
            .latencies
            .entry(operation)
            .or_default()
            .push_back(delay);
    }

    pub fn calls(&self, operation: Operation) -> usize {
        self.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    pub fn reloads(&self, beam_id: BeamId) -> usize {
        self.lock().reloads.get(&beam_id).copied().unwrap_or(0)
    }

    pub fn beam_queries(&self) -> Vec<(BeamCriteria, PageRequest)> {
        self.lock().beam_queries.clone()
    }

    pub fn file_queries(&self) -> Vec<FileQuery> {
        self.lock().file_queries.clone()
    }

    pub fn beam(&self, beam_id: BeamId) -> Option<Beam> {
        self.lock().beams.get(&beam_id).cloned()
    }

    pub fn issue(&self, issue_id: IssueId) -> Option<Issue> {
        self.lock().issues.get(&issue_id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn enter(&self, operation: Operation) -> Result<(), ApiError> {
        let delay = {
            let mut state = self.lock();
            *state.calls.entry(operation).or_default() += 1;
            state
                .latencies
                .get_mut(&operation)
                .and_then(VecDeque::pop_front)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        let position = state
            .failures
            .iter()
            .position(|(candidate, _)| *candidate == operation);
        let scripted = position.and_then(|index| state.failures.remove(index));
        match scripted {
            Some((_, error)) => {
                debug!(?operation, error = %error, "in-memory backend failing call");
                Err(error)
            }
            None => Ok(()),
        }
    }
}

fn page_of<T: Clone>(items: &[T], request: PageRequest) -> PagedResult<T> {
    let offset = usize::try_from(request.offset()).unwrap_or(usize::MAX);
    let page = items
        .iter()
        .skip(offset)
        .take(request.per_page as usize)
        .cloned()
        .collect();
    PagedResult {
        items: page,
        meta: PageMeta {
            total: Some(items.len() as u64),
            total_pages: None,
        },
        request,
    }
}

#[async_trait]
impl BeamBackend for InMemoryBeamBackend {
    async fn query_beams(
        &self,
        criteria: &BeamCriteria,
        request: PageRequest,
    ) -> Result<PagedResult<Beam>, ApiError> {
        self.enter(Operation::QueryBeams).await?;
        let mut state = self.lock();
        state.beam_queries.push((criteria.clone(), request));
        let matching: Vec<Beam> = state
            .beams
            .values()
            .rev()
            .filter(|beam| state.matches(beam, criteria))
            .cloned()
            .collect();
        Ok(page_of(&matching, request))
    }

    async fn get_beam(&self, beam_id: BeamId) -> Result<Beam, ApiError> {
        self.enter(Operation::GetBeam).await?;
        let mut state = self.lock();
        if !state.beams.contains_key(&beam_id) {
            return Err(ApiError::not_found("No such beam"));
        }

        let reloads = {
            let count = state.reloads.entry(beam_id).or_default();
            *count += 1;
            *count
        };
        let completes = state
            .complete_after
            .get(&beam_id)
            .is_some_and(|threshold| reloads >= *threshold);

        let beam = state.beam_mut(beam_id)?;
        if completes {
            beam.completed = true;
        }
        Ok(beam.clone())
    }

    async fn query_files(&self, query: &FileQuery) -> Result<PagedResult<BeamFile>, ApiError> {
        self.enter(Operation::QueryFiles).await?;
        let mut state = self.lock();
        state.file_queries.push(query.clone());

        let mut matching: Vec<BeamFile> = state
            .files
            .values()
            .filter(|file| file.beam == query.beam_id)
            .filter(|file| {
                query
                    .filter
                    .as_deref()
                    .map_or(true, |needle| file.file_name.contains(needle))
            })
            .cloned()
            .collect();
        matching.sort_by(|left, right| left.file_name.cmp(&right.file_name));

        let per_page = query.limit.max(1);
        let page = u32::try_from(query.offset / u64::from(per_page))
            .unwrap_or(u32::MAX)
            .saturating_add(1);
        Ok(page_of(&matching, PageRequest::new(page, per_page)))
    }

    async fn create_beam(&self, request: &NewBeamRequest) -> Result<Beam, ApiError> {
        self.enter(Operation::CreateBeam).await?;
        if request.directory == "/" {
            return Err(ApiError::with_detail(
                StatusCode::CONFLICT,
                "Invalid beam directory",
            ));
        }

        let mut state = self.lock();
        let id = state.allocate_id();
        let mut beam = Beam::pending(id, Utc::now(), &request.host, &request.directory);
        beam.user = Some(request.user.clone());
        beam.auth_method = Some(request.auth_method);
        beam.comment = request.comment.clone();
        beam.tags = request.tags.clone();
        beam.initiator = state.session_user;
        beam.beam_type = request.beam_type.clone();
        state.beams.insert(id, beam.clone());
        Ok(beam)
    }

    async fn update_tags(&self, beam_id: BeamId, tags: &[String]) -> Result<(), ApiError> {
        self.enter(Operation::UpdateTags).await?;
        let mut state = self.lock();
        let beam = state.beam_mut(beam_id)?;
        let mut unique: Vec<String> = Vec::with_capacity(tags.len());
        for tag in tags {
            if !unique.contains(tag) {
                unique.push(tag.clone());
            }
        }
        beam.tags = unique;
        Ok(())
    }

    async fn update_comment(&self, beam_id: BeamId, comment: &str) -> Result<(), ApiError> {
        self.enter(Operation::UpdateComment).await?;
        let mut state = self.lock();
        let beam = state.beam_mut(beam_id)?;
        beam.comment = Some(comment.to_string());
        Ok(())
    }

    async fn set_pin(&self, beam_id: BeamId, should_pin: bool) -> Result<(), ApiError> {
        self.enter(Operation::SetPin).await?;
        let mut state = self.lock();
        let user_id = state
            .session_user
            .ok_or_else(|| ApiError::status(StatusCode::UNAUTHORIZED))?;
        let beam = state.beam_mut(beam_id)?;
        let pinned = beam.is_pinned_by(user_id);
        if should_pin && !pinned {
            beam.pins.push(user_id);
        } else if !should_pin && pinned {
            beam.pins.retain(|existing| *existing != user_id);
        }
        Ok(())
    }

    async fn create_issue(
        &self,
        tracker_id: TrackerId,
        id_in_tracker: &str,
    ) -> Result<Issue, ApiError> {
        self.enter(Operation::CreateIssue).await?;
        let id_in_tracker = id_in_tracker.trim();
        if id_in_tracker.is_empty() {
            return Err(ApiError::with_detail(StatusCode::CONFLICT, "Invalid issue id"));
        }

        let mut state = self.lock();
        if let Some(existing) = state
            .issues
            .values()
            .find(|issue| issue.tracker_id == tracker_id && issue.id_in_tracker == id_in_tracker)
        {
            return Ok(existing.clone());
        }

        let issue = Issue {
            id: state.allocate_id(),
            tracker_id,
            id_in_tracker: id_in_tracker.to_string(),
            open: true,
            url: None,
        };
        state.issues.insert(issue.id, issue.clone());
        Ok(issue)
    }

    async fn attach_issue(&self, beam_id: BeamId, issue_id: IssueId) -> Result<(), ApiError> {
        self.enter(Operation::AttachIssue).await?;
        let mut state = self.lock();
        if !state.issues.contains_key(&issue_id) {
            return Err(ApiError::not_found("Issue not found"));
        }
        let beam = state.beam_mut(beam_id)?;
        if !beam.issues.contains(&issue_id) {
            beam.issues.push(issue_id);
        }
        Ok(())
    }

    async fn detach_issue(&self, beam_id: BeamId, issue_id: IssueId) -> Result<(), ApiError> {
        self.enter(Operation::DetachIssue).await?;
        let mut state = self.lock();
        if !state.issues.contains_key(&issue_id) {
            return Err(ApiError::not_found("Issue not found"));
        }
        let beam = state.beam_mut(beam_id)?;
        beam.issues.retain(|existing| *existing != issue_id);
        Ok(())
    }

    async fn get_user(&self, user_id: UserId) -> Result<User, ApiError> {
        self.enter(Operation::GetUser).await?;
        self.lock()
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| ApiError::not_found("No such user"))
    }

    async fn list_trackers(&self) -> Result<Vec<Tracker>, ApiError> {
        self.enter(Operation::ListTrackers).await?;
        Ok(self.lock().trackers.values().cloned().collect())
    }

    async fn list_tags(&self) -> Result<Vec<TagSummary>, ApiError> {
        self.enter(Operation::ListTags).await?;
        let state = self.lock();
        let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
        for beam in state.beams.values().filter(|beam| !beam.deleted) {
            for tag in &beam.tags {
                *counts.entry(tag.as_str()).or_default() += 1;
            }
        }
        Ok(counts
            .into_iter()
            .map(|(tag, number_of_beams)| TagSummary {
                tag: tag.to_string(),
                number_of_beams,
            })
            .collect())
    }

    async fn resolve_alias(&self, alias: &str) -> Result<BeamId, ApiError> {
        self.enter(Operation::ResolveAlias).await?;
        self.lock()
            .aliases
            .get(alias)
            .copied()
            .ok_or_else(|| ApiError::not_found("No such alias"))
    }

    async fn app_info(&self) -> Result<AppInfo, ApiError> {
        self.enter(Operation::AppInfo).await?;
        self.lock()
            .info
            .clone()
            .ok_or_else(|| ApiError::not_found("No info"))
    }

    async fn storage_summary(&self) -> Result<StorageSummary, ApiError> {
        self.enter(Operation::StorageSummary).await?;
        self.lock()
            .summary
            .ok_or_else(|| ApiError::not_found("No summary"))
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryBeamBackend, Operation};
    use crate::BeamBackend;
    use beamtrack_contract::{ApiError, Beam, BeamCriteria, PageRequest, User};
    use chrono::Utc;
    use http::StatusCode;

    fn seeded() -> InMemoryBeamBackend {
        let backend = InMemoryBeamBackend::new();
        for id in 1..=5 {
            let mut beam = Beam::pending(id, Utc::now(), format!("host-{id}"), "/logs");
            beam.initiator = Some(if id % 2 == 0 { 2 } else { 3 });
            beam.tags = if id <= 2 {
                vec!["urgent".to_string()]
            } else {
                vec!["infra".to_string()]
            };
            backend.insert_beam(beam);
        }
        backend.insert_user(User {
            id: 2,
            name: None,
            email: Some("even@example.com".to_string()),
        });
        backend
    }

    #[tokio::test]
    async fn tag_query_matches_any_listed_tag_newest_first() {
        let backend = seeded();
        let result = backend
            .query_beams(&BeamCriteria::Tag("urgent;nope".to_string()), PageRequest::new(1, 10))
            .await
            .expect("query");
        let ids: Vec<u64> = result.items.iter().map(|beam| beam.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(result.meta.total, Some(2));
    }

    #[tokio::test]
    async fn pinned_query_only_matches_session_user_pins() {
        let backend = seeded();
        let mut other = backend.beam(1).expect("seeded");
        other.pins = vec![7];
        backend.insert_beam(other);
        let mut mine = backend.beam(4).expect("seeded");
        mine.pins = vec![2, 7];
        backend.insert_beam(mine);

        let anonymous = backend
            .query_beams(&BeamCriteria::Pinned, PageRequest::new(1, 10))
            .await
            .expect("query");
        assert!(anonymous.items.is_empty());

        backend.set_session_user(Some(2));
        let result = backend
            .query_beams(&BeamCriteria::Pinned, PageRequest::new(1, 10))
            .await
            .expect("query");
        let ids: Vec<u64> = result.items.iter().map(|beam| beam.id).collect();
        assert_eq!(ids, vec![4]);
    }

    #[tokio::test]
    async fn email_criteria_resolves_initiator() {
        let backend = seeded();
        let result = backend
            .query_beams(
                &BeamCriteria::Email("even@example.com".to_string()),
                PageRequest::new(1, 10),
            )
            .await
            .expect("query");
        let ids: Vec<u64> = result.items.iter().map(|beam| beam.id).collect();
        assert_eq!(ids, vec![4, 2]);
    }

    #[tokio::test]
    async fn scripted_failure_applies_once() {
        let backend = seeded();
        backend.fail_next(Operation::GetBeam, ApiError::status(StatusCode::BAD_GATEWAY));
        assert!(backend.get_beam(1).await.is_err());
        assert!(backend.get_beam(1).await.is_ok());
        assert_eq!(backend.calls(Operation::GetBeam), 2);
        assert_eq!(backend.reloads(1), 1);
    }

    #[tokio::test]
    async fn completion_flips_on_configured_reload() {
        let backend = seeded();
        backend.complete_after(3, 2);
        assert!(!backend.get_beam(3).await.expect("first").completed);
        assert!(backend.get_beam(3).await.expect("second").completed);
    }

    #[tokio::test]
    async fn pin_requires_session_user() {
        let backend = seeded();
        let err = backend.set_pin(1, true).await.unwrap_err();
        assert!(err.is_unauthorized());

        backend.set_session_user(Some(2));
        backend.set_pin(1, true).await.expect("pin");
        backend.set_pin(1, true).await.expect("pin again");
        assert_eq!(backend.beam(1).expect("beam").pins, vec![2]);
        backend.set_pin(1, false).await.expect("unpin");
        assert!(backend.beam(1).expect("beam").pins.is_empty());
    }

    #[tokio::test]
    async fn issue_creation_reuses_existing_tracker_issue() {
        let backend = seeded();
        let first = backend.create_issue(1, " OPS-12 ").await.expect("create");
        let second = backend.create_issue(1, "OPS-12").await.expect("reuse");
        assert_eq!(first.id, second.id);
        assert!(backend.create_issue(1, "  ").await.unwrap_err().is_conflict());
    }
}
