use beamtrack_contract::Beam;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BeamStatus {
    InProgress,
    Success,
    Failed,
    Deleted,
}

impl BeamStatus {
    pub fn of(beam: &Beam) -> Self {
        if beam.deleted {
            Self::Deleted
        } else if !beam.completed {
            Self::InProgress
        } else if beam.error_message.is_some() {
            Self::Failed
        } else {
            Self::Success
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// Days left before a finished beam is vacuumed; `None` while it is still running or gone.
pub fn days_until_purge(beam: &Beam) -> Option<u32> {
    match BeamStatus::of(beam) {
        BeamStatus::Success | BeamStatus::Failed => beam.purge_countdown,
        BeamStatus::InProgress | BeamStatus::Deleted => None,
    }
}
