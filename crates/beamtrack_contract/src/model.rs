use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type BeamId = u64;
pub type FileId = u64;
pub type IssueId = u64;
pub type TrackerId = u64;
pub type UserId = u64;
pub type StoredKeyId = u64;

/// Shown when a user has neither a name nor an email on record.
pub const UNKNOWN_USER_PLACEHOLDER: &str = "...";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Rsa,
    Password,
    StoredKey,
    Independent,
}

/// A tracked file transfer ("beam").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Beam {
    pub id: BeamId,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, rename = "error")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub directory: String,
    #[serde(default)]
    pub auth_method: Option<AuthMethod>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, rename = "purge_time")]
    pub purge_countdown: Option<u32>,
    #[serde(default)]
    pub issues: Vec<IssueId>,
    #[serde(default)]
    pub pins: Vec<UserId>,
    #[serde(default)]
    pub initiator: Option<UserId>,
    #[serde(default, rename = "type")]
    pub beam_type: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    /// Client-side counter bumped to force relative-time displays to recompute.
    #[serde(skip)]
    pub tick: u64,
}

impl Beam {
    pub fn pending(
        id: BeamId,
        start: DateTime<Utc>,
        host: impl Into<String>,
        directory: impl Into<String>,
    ) -> Self {
        Self {
            id,
            start,
            completed: false,
            error_message: None,
            size: 0,
            host: host.into(),
            user: None,
            directory: directory.into(),
            auth_method: None,
            comment: None,
            tags: Vec::new(),
            purge_countdown: None,
            issues: Vec::new(),
            pins: Vec::new(),
            initiator: None,
            beam_type: None,
            deleted: false,
            tick: 0,
        }
    }

    /// An unfinished beam can carry neither an error nor a purge countdown.
    pub fn is_consistent(&self) -> bool {
        self.completed || (self.error_message.is_none() && self.purge_countdown.is_none())
    }

    pub fn normalize(&mut self) {
        if !self.completed {
            self.error_message = None;
            self.purge_countdown = None;
        }
    }

    pub fn is_pinned_by(&self, user_id: UserId) -> bool {
        self.pins.contains(&user_id)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|existing| existing == tag)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BeamFile {
    pub id: FileId,
    pub beam: BeamId,
    pub file_name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub mtime: Option<DateTime<Utc>>,
    #[serde(default)]
    pub storage_name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Issue {
    pub id: IssueId,
    pub tracker_id: TrackerId,
    pub id_in_tracker: String,
    #[serde(default)]
    pub open: bool,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tracker {
    pub id: TrackerId,
    pub name: String,
    #[serde(rename = "type")]
    pub tracker_type: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl User {
    pub fn display_name(&self) -> &str {
        [self.name.as_deref(), self.email.as_deref()]
            .into_iter()
            .flatten()
            .find(|value| !value.is_empty())
            .unwrap_or(UNKNOWN_USER_PLACEHOLDER)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppInfo {
    pub version: String,
    #[serde(default)]
    pub transporter: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageSummary {
    pub total_space: u64,
    pub used_space: u64,
    pub free_space: u64,
}

impl StorageSummary {
    pub fn used_percent(&self) -> u8 {
        if self.total_space == 0 {
            return 0;
        }
        let percent = (self.used_space as f64 / self.total_space as f64 * 100.0).round();
        percent.clamp(0.0, 100.0) as u8
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagSummary {
    #[serde(rename = "id")]
    pub tag: String,
    pub number_of_beams: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BeamAlias {
    pub beam_id: BeamId,
}
