use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::cache::ObjectCache;
use crate::polling::{PollControl, PollState, PollingTask};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Bumps every cached beam's `tick` so relative timestamps get re-rendered.
pub struct RelativeTimeTicker {
    cache: ObjectCache,
    interval: Duration,
    task: PollingTask,
}

impl RelativeTimeTicker {
    pub fn new(cache: ObjectCache, interval: Duration) -> Self {
        Self {
            cache,
            interval,
            task: PollingTask::new("relative-time"),
        }
    }

    pub fn start(&self) {
        let cache = self.cache.clone();
        self.task.start(self.interval, move || {
            let touched = cache.tick_beams();
            debug!(touched, "relative time tick");
            std::future::ready(PollControl::Continue)
        });
    }

    pub fn stop(&self) {
        self.task.stop();
    }

    pub fn state(&self) -> PollState {
        self.task.state()
    }
}

/// Coarse "time ago" label for a past instant.
pub fn describe_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(then);
    let minutes = elapsed.num_minutes();
    if minutes < 1 {
        return "just now".to_string();
    }
    if minutes < 60 {
        return plural(minutes, "minute");
    }
    let hours = elapsed.num_hours();
    if hours < 24 {
        return plural(hours, "hour");
    }
    plural(elapsed.num_days(), "day")
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{count} {unit}s ago")
    }
}
