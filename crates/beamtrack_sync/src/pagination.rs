use std::cmp::Reverse;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use beamtrack_backend::BeamBackend;
use beamtrack_contract::{
    ApiError, Beam, BeamCriteria, BeamFile, BeamId, FileQuery, PageRequest, PagedResult,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::ObjectCache;
use crate::error::ErrorState;
use crate::task::TaskSlot;

pub const BEAMS_PER_PAGE: u32 = 50;
pub const FILES_PER_PAGE: u32 = 20;

/// Upper bound on queries issued for one request, clamping follow-ups included.
const MAX_QUERIES_PER_REQUEST: u32 = 3;

/// A backend collection the controller can page through.
#[async_trait]
pub trait PagedQuery: Send + Sync + 'static {
    type Item: Clone + Send + Sync + 'static;
    type Criteria: Clone + Debug + PartialEq + Send + Sync + 'static;

    fn name(&self) -> &'static str;

    fn per_page(&self) -> u32;

    async fn fetch(
        &self,
        criteria: &Self::Criteria,
        request: PageRequest,
    ) -> Result<PagedResult<Self::Item>, ApiError>;

    /// Runs once per accepted page, before it becomes visible.
    fn accept(&self, _criteria: &Self::Criteria, items: Vec<Self::Item>) -> Vec<Self::Item> {
        items
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    Home,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListStatus {
    Idle,
    Loading,
    Ready,
    Fallback(Fallback),
    Failed(ErrorState),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListView<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: Option<u64>,
    pub total_pages: u32,
    pub status: ListStatus,
}

impl<T> ListView<T> {
    fn empty(per_page: u32) -> Self {
        Self {
            items: Vec::new(),
            page: 1,
            per_page,
            total: None,
            total_pages: 0,
            status: ListStatus::Idle,
        }
    }

    pub fn has_next_page(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_previous_page(&self) -> bool {
        self.page > 1
    }
}

struct ControllerState<C> {
    criteria: C,
    page: u32,
    per_page: u32,
    generation: u64,
}

/// Drives one paged list: one query per request, newest request wins.
pub struct QueryController<Q: PagedQuery> {
    query: Arc<Q>,
    state: Arc<Mutex<ControllerState<Q::Criteria>>>,
    view: Arc<watch::Sender<ListView<Q::Item>>>,
    slot: TaskSlot,
}

impl<Q: PagedQuery> QueryController<Q> {
    pub fn new(query: Q, criteria: Q::Criteria) -> Self {
        let per_page = query.per_page();
        let (view, _) = watch::channel(ListView::empty(per_page));
        Self {
            slot: TaskSlot::restartable(query.name()),
            query: Arc::new(query),
            state: Arc::new(Mutex::new(ControllerState {
                criteria,
                page: 1,
                per_page,
                generation: 0,
            })),
            view: Arc::new(view),
        }
    }

    pub fn criteria(&self) -> Q::Criteria {
        self.lock().criteria.clone()
    }

    pub fn page(&self) -> u32 {
        self.lock().page
    }

    pub fn per_page(&self) -> u32 {
        self.lock().per_page
    }

    /// Takes effect with the next query.
    pub fn set_per_page(&self, per_page: u32) {
        self.lock().per_page = per_page.max(1);
    }

    pub fn view(&self) -> ListView<Q::Item> {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ListView<Q::Item>> {
        self.view.subscribe()
    }

    /// Changes criteria and page together without querying.
    pub fn set_silently(&self, criteria: Q::Criteria, page: u32) {
        let mut state = self.lock();
        state.criteria = criteria;
        state.page = page.max(1);
    }

    pub fn navigate(&self, criteria: Q::Criteria, page: u32) {
        self.set_silently(criteria, page);
        self.issue();
    }

    /// Keeps the current page; out-of-range pages are clamped on response.
    pub fn set_criteria(&self, criteria: Q::Criteria) {
        self.lock().criteria = criteria;
        self.issue();
    }

    pub fn set_page(&self, page: u32) {
        self.lock().page = page.max(1);
        self.issue();
    }

    pub fn next_page(&self) -> bool {
        let total_pages = self.view.borrow().total_pages;
        {
            let mut state = self.lock();
            if total_pages != 0 && state.page >= total_pages {
                return false;
            }
            state.page += 1;
        }
        self.issue();
        true
    }

    pub fn previous_page(&self) -> bool {
        {
            let mut state = self.lock();
            if state.page <= 1 {
                return false;
            }
            state.page -= 1;
        }
        self.issue();
        true
    }

    pub fn refresh(&self) {
        self.issue();
    }

    pub fn cancel(&self) {
        self.lock().generation += 1;
        self.slot.cancel();
        self.view.send_if_modified(|view| {
            if view.status != ListStatus::Loading {
                return false;
            }
            view.status = ListStatus::Idle;
            true
        });
    }

    pub fn is_loading(&self) -> bool {
        self.slot.is_running()
    }

    /// Resolves once the latest request has settled.
    pub async fn wait(&self) {
        self.slot.wait_idle().await;
    }

    fn issue(&self) {
        let (criteria, page, per_page, generation) = {
            let mut state = self.lock();
            state.generation += 1;
            (
                state.criteria.clone(),
                state.page,
                state.per_page,
                state.generation,
            )
        };
        self.view.send_modify(|view| view.status = ListStatus::Loading);

        let query = self.query.clone();
        let state = self.state.clone();
        let view = self.view.clone();
        debug!(list = query.name(), ?criteria, page, "issuing list query");

        self.slot.perform(move |token| async move {
            let mut request = PageRequest::new(page, per_page);
            let mut issued = 0;

            loop {
                issued += 1;
                let result = tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    result = query.fetch(&criteria, request) => result,
                };

                let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
                if token.is_cancelled() || guard.generation != generation {
                    debug!(list = query.name(), "discarding superseded list response");
                    return;
                }

                match result {
                    Ok(result) => {
                        let total_pages = result.meta.page_count(per_page);
                        if total_pages == 0 && request.page > 1 {
                            guard.page = 1;
                        } else if request.page > total_pages && total_pages > 0 {
                            if issued < MAX_QUERIES_PER_REQUEST {
                                info!(
                                    list = query.name(),
                                    requested = request.page,
                                    clamped = total_pages,
                                    "page out of range; clamping"
                                );
                                guard.page = total_pages;
                                request = PageRequest::new(total_pages, per_page);
                                drop(guard);
                                continue;
                            }
                            // The items on hand belong to the last page asked for.
                            warn!(
                                list = query.name(),
                                page = request.page,
                                total_pages,
                                "page still out of range after clamping"
                            );
                            guard.page = request.page;
                        }

                        let items = query.accept(&criteria, result.items);
                        view.send_replace(ListView {
                            items,
                            page: guard.page,
                            per_page,
                            total: result.meta.total,
                            total_pages,
                            status: ListStatus::Ready,
                        });
                    }
                    Err(error) if error.is_not_found() => {
                        warn!(list = query.name(), error = %error, "list query not found; falling back to home");
                        view.send_modify(|view| view.status = ListStatus::Fallback(Fallback::Home));
                    }
                    Err(error) => {
                        warn!(list = query.name(), error = %error, "list query failed");
                        view.send_modify(|view| {
                            view.status = ListStatus::Failed(ErrorState::from_api(&error));
                        });
                    }
                }
                return;
            }
        });
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState<Q::Criteria>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Beams matching the list criteria, newest first, soft-deleted ones hidden.
pub struct BeamListQuery {
    backend: Arc<dyn BeamBackend>,
    cache: ObjectCache,
    per_page: u32,
}

impl BeamListQuery {
    pub fn new(backend: Arc<dyn BeamBackend>, cache: ObjectCache, per_page: u32) -> Self {
        Self {
            backend,
            cache,
            per_page,
        }
    }
}

#[async_trait]
impl PagedQuery for BeamListQuery {
    type Item = Beam;
    type Criteria = BeamCriteria;

    fn name(&self) -> &'static str {
        "beam-list"
    }

    fn per_page(&self) -> u32 {
        self.per_page
    }

    async fn fetch(
        &self,
        criteria: &BeamCriteria,
        request: PageRequest,
    ) -> Result<PagedResult<Beam>, ApiError> {
        self.backend.query_beams(criteria, request).await
    }

    fn accept(&self, _criteria: &BeamCriteria, items: Vec<Beam>) -> Vec<Beam> {
        let mut visible: Vec<Beam> = self
            .cache
            .upsert_beams(items)
            .into_iter()
            .filter(|beam| !beam.deleted)
            .collect();
        visible.sort_by_key(|beam| Reverse(beam.start));
        visible
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCriteria {
    pub beam_id: BeamId,
    pub filter: Option<String>,
}

impl FileCriteria {
    pub fn new(beam_id: BeamId, filter: Option<String>) -> Self {
        Self {
            beam_id,
            filter: filter.filter(|value| !value.is_empty()),
        }
    }
}

/// Files of one beam, optionally narrowed by a name filter.
pub struct FileListQuery {
    backend: Arc<dyn BeamBackend>,
    cache: ObjectCache,
    per_page: u32,
}

impl FileListQuery {
    pub fn new(backend: Arc<dyn BeamBackend>, cache: ObjectCache, per_page: u32) -> Self {
        Self {
            backend,
            cache,
            per_page,
        }
    }
}

#[async_trait]
impl PagedQuery for FileListQuery {
    type Item = BeamFile;
    type Criteria = FileCriteria;

    fn name(&self) -> &'static str {
        "file-list"
    }

    fn per_page(&self) -> u32 {
        self.per_page
    }

    async fn fetch(
        &self,
        criteria: &FileCriteria,
        request: PageRequest,
    ) -> Result<PagedResult<BeamFile>, ApiError> {
        let query = FileQuery::page(criteria.beam_id, criteria.filter.clone(), request);
        self.backend.query_files(&query).await
    }

    fn accept(&self, criteria: &FileCriteria, items: Vec<BeamFile>) -> Vec<BeamFile> {
        self.cache.replace_files(criteria.beam_id, items.clone());
        items
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use beamtrack_backend::{InMemoryBeamBackend, Operation};
    use beamtrack_contract::{
        ApiError, Beam, BeamCriteria, BeamFile, PageMeta, PageRequest, PagedResult,
    };
    use chrono::{Duration as ChronoDuration, Utc};
    use http::StatusCode;

    use super::{
        BeamListQuery, Fallback, FileCriteria, FileListQuery, ListStatus, PagedQuery,
        QueryController, BEAMS_PER_PAGE, FILES_PER_PAGE,
    };
    use crate::cache::ObjectCache;
    use crate::error::ErrorKind;

    fn backend_with_beams(count: u64) -> Arc<InMemoryBeamBackend> {
        let backend = Arc::new(InMemoryBeamBackend::new());
        let base = Utc::now();
        for id in 1..=count {
            let mut beam = Beam::pending(
                id,
                base - ChronoDuration::minutes(id as i64),
                "lab",
                "/var/log",
            );
            beam.tags = vec!["infra".to_string()];
            backend.insert_beam(beam);
        }
        backend
    }

    /// Reports fewer pages on every call, as if items vanish between queries.
    struct ShrinkingQuery {
        calls: AtomicU32,
    }

    #[async_trait]
    impl PagedQuery for ShrinkingQuery {
        type Item = String;
        type Criteria = ();

        fn name(&self) -> &'static str {
            "shrinking"
        }

        fn per_page(&self) -> u32 {
            10
        }

        async fn fetch(
            &self,
            _criteria: &(),
            request: PageRequest,
        ) -> Result<PagedResult<String>, ApiError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let total_pages = [5, 3, 2, 1][call as usize % 4];
            Ok(PagedResult {
                items: vec![format!("page-{}", request.page)],
                meta: PageMeta {
                    total: None,
                    total_pages: Some(total_pages),
                },
                request,
            })
        }
    }

    fn beam_controller(backend: &Arc<InMemoryBeamBackend>) -> QueryController<BeamListQuery> {
        QueryController::new(
            BeamListQuery::new(backend.clone(), ObjectCache::new(), BEAMS_PER_PAGE),
            BeamCriteria::All,
        )
    }

    fn files_backend(count: u64) -> Arc<InMemoryBeamBackend> {
        let backend = backend_with_beams(1);
        for id in 1..=count {
            backend.insert_file(BeamFile {
                id: 100 + id,
                beam: 1,
                file_name: format!("file-{id:03}.log"),
                status: Some("uploaded".to_string()),
                size: Some(10),
                mtime: None,
                storage_name: None,
                url: None,
            });
        }
        backend
    }

    #[tokio::test]
    async fn out_of_range_page_is_clamped_with_follow_up_query() {
        let backend = files_backend(45);
        let controller = QueryController::new(
            FileListQuery::new(backend.clone(), ObjectCache::new(), FILES_PER_PAGE),
            FileCriteria::new(1, None),
        );

        controller.set_page(5);
        controller.wait().await;

        let offsets: Vec<u64> = backend
            .file_queries()
            .iter()
            .map(|query| query.offset)
            .collect();
        assert_eq!(offsets, vec![80, 40]);

        let view = controller.view();
        assert_eq!(view.page, 3);
        assert_eq!(view.total_pages, 3);
        assert_eq!(view.items.len(), 5);
        assert_eq!(view.status, ListStatus::Ready);
        assert!(!view.has_next_page());
    }

    #[tokio::test]
    async fn exhausted_clamping_labels_items_with_their_own_page() {
        let controller = QueryController::new(
            ShrinkingQuery {
                calls: AtomicU32::new(0),
            },
            (),
        );

        controller.set_page(9);
        controller.wait().await;

        let view = controller.view();
        assert_eq!(view.items, vec!["page-3".to_string()]);
        assert_eq!(view.page, 3);
        assert_eq!(controller.page(), 3);
        assert_eq!(view.total_pages, 2);
        assert_eq!(view.status, ListStatus::Ready);
    }

    #[tokio::test]
    async fn page_size_override_applies_to_next_query() {
        let backend = backend_with_beams(25);
        let controller = beam_controller(&backend);
        controller.set_per_page(10);
        controller.set_page(2);
        controller.wait().await;

        assert_eq!(
            backend.beam_queries().last().map(|(_, request)| *request),
            Some(PageRequest::new(2, 10))
        );
        let view = controller.view();
        assert_eq!(view.items.len(), 10);
        assert_eq!(view.per_page, 10);
        assert_eq!(view.total_pages, 3);
    }

    #[tokio::test]
    async fn beam_list_hides_deleted_and_sorts_newest_first() {
        let backend = backend_with_beams(4);
        let mut deleted = backend.beam(2).expect("seeded");
        deleted.deleted = true;
        backend.insert_beam(deleted);

        let controller = beam_controller(&backend);
        controller.refresh();
        controller.wait().await;

        let ids: Vec<u64> = controller.view().items.iter().map(|beam| beam.id).collect();
        assert_eq!(ids, vec![1, 3, 4]);
        assert_eq!(backend.calls(Operation::QueryBeams), 1);
    }

    #[tokio::test]
    async fn not_found_falls_back_home() {
        let backend = backend_with_beams(2);
        backend.fail_next(Operation::QueryBeams, ApiError::not_found("No such tag"));
        let controller = beam_controller(&backend);

        controller.set_criteria(BeamCriteria::Tag("ghost".to_string()));
        controller.wait().await;
        assert_eq!(
            controller.view().status,
            ListStatus::Fallback(Fallback::Home)
        );
    }

    #[tokio::test]
    async fn other_failures_surface_error_state_and_keep_items() {
        let backend = backend_with_beams(2);
        let controller = beam_controller(&backend);
        controller.refresh();
        controller.wait().await;

        backend.fail_next(
            Operation::QueryBeams,
            ApiError::status(StatusCode::INTERNAL_SERVER_ERROR),
        );
        controller.refresh();
        controller.wait().await;

        let view = controller.view();
        assert_eq!(view.items.len(), 2);
        match view.status {
            ListStatus::Failed(state) => assert_eq!(state.kind, ErrorKind::Generic),
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn newer_request_supersedes_in_flight_query() {
        let backend = backend_with_beams(3);
        backend.push_latency(Operation::QueryBeams, Duration::from_secs(2));
        let controller = beam_controller(&backend);

        controller.set_criteria(BeamCriteria::Tag("slow".to_string()));
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.set_criteria(BeamCriteria::Tag("infra".to_string()));
        controller.wait().await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(controller.view().items.len(), 3);
        assert_eq!(
            controller.criteria(),
            BeamCriteria::Tag("infra".to_string())
        );
        assert_eq!(backend.beam_queries().len(), 1);
    }

    #[tokio::test]
    async fn page_navigation_respects_bounds() {
        let backend = backend_with_beams(60);
        let controller = beam_controller(&backend);
        assert!(!controller.previous_page());

        controller.refresh();
        controller.wait().await;
        assert_eq!(controller.view().total_pages, 2);

        assert!(controller.next_page());
        controller.wait().await;
        assert_eq!(controller.view().items.len(), 10);
        assert!(!controller.next_page());
        assert!(controller.previous_page());
        controller.wait().await;
        assert_eq!(controller.page(), 1);
    }
}
