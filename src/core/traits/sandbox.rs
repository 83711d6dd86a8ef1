use crate::core::{domain::Job, metadata::Metadata};

/// Everything the sandbox hands back after running one job.
#[derive(Clone, Debug, Default)]
pub struct RawOutput {
    pub stdout: String,
    pub stderr: String,
    pub metadata: Metadata,
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Failed to initialise box {box_id}: {msg}")]
    Init { box_id: usize, msg: String },
    #[error("Failed to launch sandbox: {msg}")]
    Spawn { msg: String },
    #[error("Filesystem error: {msg}")]
    Io { msg: String },
    #[error("Failed to read metadata: {msg}")]
    Metadata { msg: String },
}

impl SandboxError {
    pub fn io(err: std::io::Error) -> Self {
        SandboxError::Io {
            msg: err.to_string(),
        }
    }
}

/// Isolation primitive that owns the actual process, namespace and
/// cgroup mechanics. Box numbers are stable for the lifetime of the process.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Sandbox: std::fmt::Debug + Send + Sync {
    /// Creates the private state directory of a box. Called once at start-up.
    async fn provision(&self, box_id: usize) -> Result<(), SandboxError>;

    /// Resets a box to a clean environment.
    async fn init(&self, box_id: usize) -> Result<(), SandboxError>;

    /// Runs the job's script to completion. A non-zero exit of the script is
    /// reported through the metadata, not as an error.
    async fn execute(&self, box_id: usize, job: &Job) -> Result<RawOutput, SandboxError>;
}
