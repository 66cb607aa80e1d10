use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use beamtrack_contract::{Beam, BeamFile, BeamId, Issue, IssueId, Tracker, User, UserId};
use futures::stream::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    BeamChanged(BeamId),
    FilesChanged(BeamId),
    UserChanged(UserId),
    IssueChanged(IssueId),
    TrackersChanged,
    /// Every cached beam had its `tick` bumped.
    Ticked,
}

#[derive(Debug, Default)]
struct CacheState {
    beams: HashMap<BeamId, Beam>,
    files: HashMap<BeamId, Vec<BeamFile>>,
    users: HashMap<UserId, User>,
    issues: HashMap<IssueId, Issue>,
    trackers: BTreeMap<u64, Tracker>,
}

/// Client-side store every view binds to. Writes replace whole records.
#[derive(Clone)]
pub struct ObjectCache {
    state: Arc<RwLock<CacheState>>,
    events: broadcast::Sender<CacheEvent>,
}

impl Default for ObjectCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectCache {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(CacheState::default())),
            events,
        }
    }

    /// Stores `beam`, keeping the local `tick` of any record it replaces.
    pub fn upsert_beam(&self, mut beam: Beam) -> Beam {
        beam.normalize();
        {
            let mut state = self.write();
            if let Some(existing) = state.beams.get(&beam.id) {
                beam.tick = existing.tick;
            }
            state.beams.insert(beam.id, beam.clone());
        }
        self.emit(CacheEvent::BeamChanged(beam.id));
        beam
    }

    pub fn upsert_beams(&self, beams: impl IntoIterator<Item = Beam>) -> Vec<Beam> {
        beams
            .into_iter()
            .map(|beam| self.upsert_beam(beam))
            .collect()
    }

    pub fn beam(&self, beam_id: BeamId) -> Option<Beam> {
        self.read().beams.get(&beam_id).cloned()
    }

    pub fn beam_count(&self) -> usize {
        self.read().beams.len()
    }

    pub fn replace_files(&self, beam_id: BeamId, files: Vec<BeamFile>) {
        self.write().files.insert(beam_id, files);
        self.emit(CacheEvent::FilesChanged(beam_id));
    }

    pub fn files(&self, beam_id: BeamId) -> Vec<BeamFile> {
        self.read().files.get(&beam_id).cloned().unwrap_or_default()
    }

    pub fn upsert_user(&self, user: User) {
        let user_id = user.id;
        self.write().users.insert(user_id, user);
        self.emit(CacheEvent::UserChanged(user_id));
    }

    pub fn user(&self, user_id: UserId) -> Option<User> {
        self.read().users.get(&user_id).cloned()
    }

    pub fn upsert_issue(&self, issue: Issue) {
        let issue_id = issue.id;
        self.write().issues.insert(issue_id, issue);
        self.emit(CacheEvent::IssueChanged(issue_id));
    }

    pub fn issue(&self, issue_id: IssueId) -> Option<Issue> {
        self.read().issues.get(&issue_id).cloned()
    }

    pub fn set_trackers(&self, trackers: Vec<Tracker>) {
        {
            let mut state = self.write();
            state.trackers = trackers
                .into_iter()
                .map(|tracker| (tracker.id, tracker))
                .collect();
        }
        self.emit(CacheEvent::TrackersChanged);
    }

    pub fn trackers(&self) -> Vec<Tracker> {
        self.read().trackers.values().cloned().collect()
    }

    /// Bumps `tick` on every cached beam; returns how many were touched.
    pub fn tick_beams(&self) -> usize {
        let touched = {
            let mut state = self.write();
            for beam in state.beams.values_mut() {
                beam.tick = beam.tick.wrapping_add(1);
            }
            state.beams.len()
        };
        self.emit(CacheEvent::Ticked);
        touched
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Change events as a stream; lagged receivers skip what they missed.
    pub fn changes(&self) -> impl Stream<Item = CacheEvent> + Send + 'static {
        BroadcastStream::new(self.events.subscribe())
            .filter_map(|event| async move { event.ok() })
    }

    fn emit(&self, event: CacheEvent) {
        debug!(?event, "object cache changed");
        let _ = self.events.send(event);
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
