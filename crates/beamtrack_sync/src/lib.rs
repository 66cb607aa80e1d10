pub mod cache;
pub mod config;
pub mod context;
pub mod debounce;
pub mod error;
pub mod live_refresh;
pub mod pagination;
pub mod params;
pub mod pins;
pub mod polling;
pub mod relative_time;
pub mod session;
pub mod tags;
pub mod task;
pub mod telemetry;
pub mod views;
pub mod workflows;

pub use cache::{CacheEvent, ObjectCache};
pub use config::SyncConfig;
pub use context::{AppContext, Selection};
pub use debounce::DebouncedFilter;
pub use error::{ErrorKind, ErrorState, SyncError};
pub use live_refresh::LiveRefresh;
pub use pagination::{
    BeamListQuery, Fallback, FileCriteria, FileListQuery, ListStatus, ListView, PagedQuery,
    QueryController,
};
pub use params::RouteParams;
pub use pins::PinTracker;
pub use polling::{PollControl, PollState, PollingTask};
pub use relative_time::{describe_age, RelativeTimeTicker};
pub use session::Session;
pub use tags::{TagFilterBinding, TagSet};
pub use task::{Concurrency, TaskSlot};
pub use telemetry::init_tracing;
pub use views::{after_model, BeamDetailView, BeamListView, DetailStatus, ListMode};
pub use workflows::{user_message, Workflows};
