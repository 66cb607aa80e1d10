use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use beamtrack_contract::{Beam, BeamCriteria, BeamFile, BeamId};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::context::{AppContext, Selection};
use crate::debounce::DebouncedFilter;
use crate::error::ErrorState;
use crate::live_refresh::LiveRefresh;
use crate::pagination::{
    BeamListQuery, Fallback, FileCriteria, FileListQuery, ListView, QueryController,
};
use crate::params::RouteParams;
use crate::pins::PinTracker;
use crate::polling::{PollControl, PollState, PollingTask};
use crate::relative_time::RelativeTimeTicker;
use crate::tags::TagFilterBinding;

/// Post-load step every view runs once its model is in place.
pub fn after_model(route: &'static str, selection: &Selection, selected: Option<BeamId>) {
    if let Some(beam_id) = selected {
        selection.select(beam_id);
    }
    debug!(route, ?selected, "model loaded");
}

fn lock_params(params: &Mutex<RouteParams>) -> MutexGuard<'_, RouteParams> {
    params.lock().unwrap_or_else(PoisonError::into_inner)
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    /// Filtered by the `tag`, `email` and `uid` parameters.
    Beams,
    /// Beams the session user pinned; filter parameters are ignored.
    Pinned,
}

impl ListMode {
    fn route(self) -> &'static str {
        match self {
            Self::Beams => "beams",
            Self::Pinned => "pinned",
        }
    }
}

/// The beam list route: filtered, paged, refreshed every few minutes, with
/// relative start times kept current.
pub struct BeamListView {
    ctx: AppContext,
    mode: ListMode,
    controller: Arc<QueryController<BeamListQuery>>,
    tags: TagFilterBinding,
    refresh: PollingTask,
    ticker: RelativeTimeTicker,
    params: Mutex<RouteParams>,
}

impl BeamListView {
    pub fn new(ctx: &AppContext) -> Self {
        Self::with_mode(ctx, ListMode::Beams)
    }

    pub fn pinned(ctx: &AppContext) -> Self {
        Self::with_mode(ctx, ListMode::Pinned)
    }

    fn with_mode(ctx: &AppContext, mode: ListMode) -> Self {
        let query = BeamListQuery::new(
            ctx.backend.clone(),
            ctx.cache.clone(),
            ctx.config.paging.beams_per_page,
        );
        let criteria = match mode {
            ListMode::Beams => BeamCriteria::All,
            ListMode::Pinned => BeamCriteria::Pinned,
        };
        Self {
            ctx: ctx.clone(),
            mode,
            controller: Arc::new(QueryController::new(query, criteria)),
            tags: TagFilterBinding::new(""),
            refresh: PollingTask::new("beam-list-refresh"),
            ticker: RelativeTimeTicker::new(
                ctx.cache.clone(),
                ctx.config.polling.relative_time(),
            ),
            params: Mutex::new(RouteParams::default()),
        }
    }

    pub fn mode(&self) -> ListMode {
        self.mode
    }

    /// Applies `params` and starts the periodic refresh, whose first run loads
    /// the list, alongside the relative-time ticker.
    pub fn activate(&self, params: RouteParams) {
        info!(mode = ?self.mode, query = %params.to_query_string(), "beam list activated");
        self.apply(params);

        let controller = self.controller.clone();
        let selection = self.ctx.selection.clone();
        let route = self.mode.route();
        self.refresh
            .start(self.ctx.config.polling.list_refresh(), move || {
                let controller = controller.clone();
                let selection = selection.clone();
                async move {
                    controller.refresh();
                    controller.wait().await;
                    let first = match selection.current() {
                        Some(_) => None,
                        None => controller.view().items.first().map(|beam| beam.id),
                    };
                    after_model(route, &selection, first);
                    PollControl::Continue
                }
            });
        self.ticker.start();
    }

    pub fn navigate(&self, params: RouteParams) {
        self.apply(params);
        self.controller.refresh();
    }

    pub fn add_tag(&self, tag: &str) -> bool {
        self.tags.add_tag(tag) && self.tag_filter_changed()
    }

    pub fn remove_tag(&self, tag: &str) -> bool {
        self.tags.remove_tag(tag) && self.tag_filter_changed()
    }

    pub fn clear_tags(&self) -> bool {
        self.tags.clear() && self.tag_filter_changed()
    }

    pub fn tags(&self) -> Vec<String> {
        self.tags.tags()
    }

    pub fn subscribe_tag_filter(&self) -> watch::Receiver<String> {
        self.tags.subscribe()
    }

    pub fn select(&self, beam_id: BeamId) {
        self.ctx.selection.select(beam_id);
    }

    pub fn selected(&self) -> Option<BeamId> {
        self.ctx.selection.current()
    }

    pub fn next_page(&self) -> bool {
        self.controller.next_page()
    }

    pub fn previous_page(&self) -> bool {
        self.controller.previous_page()
    }

    pub fn route_params(&self) -> RouteParams {
        let mut params = lock_params(&self.params).clone();
        let page = self.controller.page();
        params.page = (page > 1).then_some(page);
        params
    }

    pub fn view(&self) -> ListView<Beam> {
        self.controller.view()
    }

    pub fn subscribe(&self) -> watch::Receiver<ListView<Beam>> {
        self.controller.subscribe()
    }

    pub async fn wait(&self) {
        self.controller.wait().await;
    }

    pub fn relative_time_state(&self) -> PollState {
        self.ticker.state()
    }

    pub fn deactivate(&self) {
        self.refresh.stop();
        self.ticker.stop();
        self.controller.cancel();
    }

    fn apply(&self, params: RouteParams) {
        self.tags.set_filter(params.tag.as_deref().unwrap_or(""));
        let request = params.page_request(self.ctx.config.paging.beams_per_page);
        self.controller.set_per_page(request.per_page);
        self.controller
            .set_silently(self.criteria_for(&params), request.page);
        *lock_params(&self.params) = params;
    }

    fn criteria_for(&self, params: &RouteParams) -> BeamCriteria {
        match self.mode {
            ListMode::Beams => params.criteria(),
            ListMode::Pinned => BeamCriteria::Pinned,
        }
    }

    fn tag_filter_changed(&self) -> bool {
        let criteria = {
            let mut params = lock_params(&self.params);
            params.tag = non_empty(self.tags.filter());
            self.criteria_for(&params)
        };
        self.controller.set_criteria(criteria);
        true
    }
}

impl Drop for BeamListView {
    fn drop(&mut self) {
        self.deactivate();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailStatus {
    Loading,
    Ready,
    Fallback(Fallback),
    Failed(ErrorState),
}

/// One beam with its files, refreshed live until the transfer completes.
pub struct BeamDetailView {
    ctx: AppContext,
    beam_id: BeamId,
    live: LiveRefresh,
    files: Arc<QueryController<FileListQuery>>,
    filter: DebouncedFilter,
    pins: PinTracker,
    status: watch::Sender<DetailStatus>,
    params: Arc<Mutex<RouteParams>>,
}

impl BeamDetailView {
    pub fn new(ctx: &AppContext, beam_id: BeamId) -> Self {
        let query = FileListQuery::new(
            ctx.backend.clone(),
            ctx.cache.clone(),
            ctx.config.paging.files_per_page,
        );
        let files = Arc::new(QueryController::new(
            query,
            FileCriteria::new(beam_id, None),
        ));
        let params = Arc::new(Mutex::new(RouteParams::default()));

        let filter = {
            let files = files.clone();
            let params = params.clone();
            DebouncedFilter::new(ctx.config.polling.debounce(), move |value| {
                lock_params(&params).file_filter = non_empty(value.clone());
                files.set_criteria(FileCriteria::new(beam_id, Some(value)));
            })
        };

        let (status, _) = watch::channel(DetailStatus::Loading);
        Self {
            ctx: ctx.clone(),
            beam_id,
            live: LiveRefresh::new(
                ctx.backend.clone(),
                ctx.cache.clone(),
                ctx.config.polling.live_refresh(),
            ),
            files,
            filter,
            pins: PinTracker::new(
                ctx.backend.clone(),
                ctx.cache.clone(),
                ctx.session.clone(),
                beam_id,
            ),
            status,
            params,
        }
    }

    /// Loads the beam and trackers, then starts live refresh, pin tracking and
    /// the file list.
    pub async fn activate(&self, params: RouteParams) -> DetailStatus {
        self.status.send_replace(DetailStatus::Loading);
        *lock_params(&self.params) = params.clone();
        let beam_id = self.beam_id;

        let beam = match self.ctx.backend.get_beam(beam_id).await {
            Ok(beam) => self.ctx.cache.upsert_beam(beam),
            Err(error) if error.is_not_found() => {
                warn!(beam_id, "beam not found; falling back to home");
                return self.settle(DetailStatus::Fallback(Fallback::Home));
            }
            Err(error) => {
                warn!(beam_id, error = %error, "failed to load beam");
                if error.is_unauthorized() {
                    self.ctx.session.invalidate();
                }
                return self.settle(DetailStatus::Failed(ErrorState::from_api(&error)));
            }
        };

        if let Err(error) = self.ctx.workflows().load_trackers().await {
            warn!(beam_id, error = %error, "failed to load trackers");
        }

        after_model("beams.beam", &self.ctx.selection, Some(beam_id));
        self.live.start(&beam);
        self.pins.start();
        self.files.navigate(
            FileCriteria::new(beam_id, params.file_filter.clone()),
            params.file_page.unwrap_or(1),
        );
        info!(beam_id, completed = beam.completed, "beam detail activated");
        self.settle(DetailStatus::Ready)
    }

    /// Reloads the beam on demand.
    pub async fn refresh(&self) -> Option<Beam> {
        match self.ctx.backend.get_beam(self.beam_id).await {
            Ok(beam) => Some(self.ctx.cache.upsert_beam(beam)),
            Err(error) => {
                warn!(beam_id = self.beam_id, error = %error, "manual refresh failed");
                None
            }
        }
    }

    pub fn beam(&self) -> Option<Beam> {
        self.ctx.cache.beam(self.beam_id)
    }

    pub fn status(&self) -> DetailStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<DetailStatus> {
        self.status.subscribe()
    }

    pub fn filter_input(&self, text: &str) {
        self.filter.input(text);
    }

    pub fn clear_filter(&self) {
        self.filter.clear();
    }

    pub fn files(&self) -> ListView<BeamFile> {
        self.files.view()
    }

    pub fn next_file_page(&self) -> bool {
        self.files.next_page()
    }

    pub fn previous_file_page(&self) -> bool {
        self.files.previous_page()
    }

    pub async fn wait_for_files(&self) {
        self.files.wait().await;
    }

    pub fn toggle_pin(&self) -> bool {
        self.pins.toggle()
    }

    pub fn is_pinned(&self) -> bool {
        self.pins.is_pinned()
    }

    pub fn subscribe_pinned(&self) -> watch::Receiver<bool> {
        self.pins.subscribe()
    }

    pub async fn wait_for_pin(&self) {
        self.pins.wait().await;
    }

    pub fn is_live(&self) -> bool {
        self.live.is_running()
    }

    pub fn route_params(&self) -> RouteParams {
        let mut params = lock_params(&self.params).clone();
        let page = self.files.page();
        params.file_page = (page > 1).then_some(page);
        params
    }

    pub fn deactivate(&self) {
        self.live.cancel();
        self.files.cancel();
        self.filter.cancel();
        self.pins.stop();
    }

    fn settle(&self, status: DetailStatus) -> DetailStatus {
        self.status.send_replace(status.clone());
        status
    }
}

impl Drop for BeamDetailView {
    fn drop(&mut self) {
        self.deactivate();
    }
}
