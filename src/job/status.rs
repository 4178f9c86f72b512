use serde::Serialize;
use tokio::time::Instant;

use crate::job::strategy::CredentialIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Running,
    Paused,
}

/// Point-in-time view of a job, as returned by every control operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub running: bool,
    pub paused: bool,
    pub state: JobState,
    pub max_id: i64,
    pub completed_count: i64,
    pub percent: i64,
    pub current_start_id: i64,
    pub current_end_id_next: i64,
    pub last_processed_range: Option<(i64, i64)>,
    pub next_run_seconds: Option<u64>,
    pub interval_sec: u64,
    pub batch_size: i64,
    pub failed_windows: u64,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub alternation: Option<AlternationStatus>,
}

/// Extra fields reported only by the alternating (dual credential) job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternationStatus {
    pub next_client_id: CredentialIndex,
    pub alternating: bool,
    pub last_error: Option<String>,
}

/// The in-memory fields a snapshot is derived from. Read under the scheduler lock.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Progress {
    pub running: bool,
    pub paused: bool,
    pub max_id: i64,
    pub completed_count: i64,
    pub current_start_id: i64,
    pub batch_size: i64,
}

impl Progress {
    pub fn state(&self) -> JobState {
        if self.paused {
            JobState::Paused
        } else if self.running {
            JobState::Running
        } else {
            JobState::Idle
        }
    }

    /// Whole percent of the catalog done, 0 for an empty catalog.
    pub fn percent(&self) -> i64 {
        if self.max_id <= 0 {
            return 0;
        }
        (self.completed_count.max(0) * 100 / self.max_id).min(100)
    }

    /// Last id the next window would cover.
    pub fn next_window_end(&self) -> i64 {
        if self.current_start_id > 0 {
            self.max_id.min(self.current_start_id + self.batch_size - 1)
        } else {
            0
        }
    }
}

/// Whole seconds until `next_run_at`, floored at zero.
pub(crate) fn seconds_until(next_run_at: Option<Instant>, now: Instant) -> Option<u64> {
    next_run_at.map(|at| at.saturating_duration_since(now).as_secs())
}
