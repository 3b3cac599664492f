use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default timeout applied when a submitter supplies `timeout_seconds <= 0`.
pub const DEFAULT_TIMEOUT_SECONDS: i64 = 300;

/// Default dispatch priority when a submitter omits one.
pub const DEFAULT_PRIORITY: i32 = 5;

/// Valid inclusive range for job priority.
pub const PRIORITY_RANGE: std::ops::RangeInclusive<i32> = 1..=10;

/// Lifecycle state of a [`Job`].
///
/// Permitted transitions: `Queued -> Running`, `Queued -> Canceled`,
/// `Running -> Completed | Failed | Canceled`. [`JobStatus::is_terminal`]
/// marks the states that, once entered, are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl JobStatus {
    /// Terminal states are immutable once entered.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Canceled
        )
    }

    /// Whether `self -> next` is a permitted lifecycle transition.
    #[must_use]
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Queued, Canceled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Canceled)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// A unit of remote-command work, as stored durably in S.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub command: String,
    pub args: Option<String>,
    pub original_script: Option<String>,
    pub shell: Option<String>,
    pub server_id: Uuid,
    pub timeout_seconds: i64,
    pub priority: i32,
    pub status: JobStatus,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Builds a new job in the `queued` state, normalizing `timeout_seconds`
    /// and `priority` to their documented defaults.
    #[must_use]
    pub fn new(command: String, server_id: Uuid, timeout_seconds: i64, priority: i32) -> Self {
        let timeout_seconds = if timeout_seconds <= 0 {
            DEFAULT_TIMEOUT_SECONDS
        } else {
            timeout_seconds
        };

        Self {
            id: Uuid::new_v4(),
            command,
            args: None,
            original_script: None,
            shell: None,
            server_id,
            timeout_seconds,
            priority,
            status: JobStatus::Queued,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Whether this is a script job (piped to a shell) rather than a simple
    /// command invocation.
    #[must_use]
    pub fn is_script(&self) -> bool {
        self.original_script.is_some()
    }

    /// The effective command line sent to the remote host for non-script
    /// jobs: `command`, optionally followed by a space and `args`.
    #[must_use]
    pub fn effective_command_line(&self) -> String {
        match &self.args {
            Some(args) if !args.is_empty() => format!("{} {args}", self.command),
            _ => self.command.clone(),
        }
    }
}

/// A partial update applied to a [`Job`] row. `None` fields are left
/// untouched; this mirrors the store's `UPDATE ... SET col = col` pattern
/// for unspecified columns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub exit_code: Option<Option<i32>>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub error: Option<Option<String>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobPatch {
    /// A patch that only transitions `status`, stamping `started_at` on
    /// first entry to `running`.
    #[must_use]
    pub fn to_running(started_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Running),
            started_at: Some(started_at),
            ..Default::default()
        }
    }

    /// A patch that transitions to a terminal state with a diagnostic and
    /// no exit code (used for resolution/session failures and cancellation).
    #[must_use]
    pub fn to_terminal_with_error(
        status: JobStatus,
        error: impl Into<String>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        debug_assert!(status.is_terminal());
        Self {
            status: Some(status),
            error: Some(Some(error.into())),
            finished_at: Some(finished_at),
            ..Default::default()
        }
    }

    /// A patch that transitions to a terminal state driven by a remote exit
    /// code: `completed` if zero, `failed` otherwise.
    #[must_use]
    pub fn to_terminal_with_exit_code(exit_code: i32, finished_at: DateTime<Utc>) -> Self {
        let status = if exit_code == 0 {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        Self {
            status: Some(status),
            exit_code: Some(Some(exit_code)),
            finished_at: Some(finished_at),
            ..Default::default()
        }
    }

    /// A patch carrying only an incremental output flush.
    #[must_use]
    pub fn flush(stdout: String, stderr: String) -> Self {
        Self {
            stdout: Some(stdout),
            stderr: Some(stderr),
            ..Default::default()
        }
    }
}
