use uuid::Uuid;

/// The submitter-facing description of a job to enqueue (§4.3). `None`
/// fields take the defaults documented on [`fleetq_core::Job::new`] and
/// [`fleetq_core::DEFAULT_PRIORITY`].
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub command: String,
    pub args: Option<String>,
    pub original_script: Option<String>,
    pub shell: Option<String>,
    pub server_id: Uuid,
    pub timeout_seconds: Option<i64>,
    pub priority: Option<i32>,
}

/// Fields a caller may override when duplicating or rerunning a job; all
/// other fields are inherited verbatim from the source job.
#[derive(Debug, Clone, Default)]
pub struct JobOverrides {
    pub server_id: Option<Uuid>,
    pub timeout_seconds: Option<i64>,
}
