use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::{
    domain::{ExecutionResult, Job, Status},
    traits::sandbox::{RawOutput, Sandbox, SandboxError},
};

/// Status isolate reports when it killed the program for running too long.
const SANDBOX_TIMEOUT_CODE: &str = "TO";

#[derive(Clone, Debug, thiserror::Error)]
pub enum BoxError {
    #[error("Box {box_id} was busy")]
    Busy { box_id: usize },
    #[error("Box {box_id} failed to initialise: {source}")]
    InitFailed { box_id: usize, source: SandboxError },
    #[error("Box {box_id} failed to run script: {source}")]
    RunFailed { box_id: usize, source: SandboxError },
    #[error("Box {box_id} panicked while running a job")]
    Panicked { box_id: usize },
}

/// One numbered, reusable sandbox. At most one job runs in it at a time.
#[derive(Debug)]
pub struct SandboxBox {
    id: usize,
    busy: AtomicBool,
    sandbox: Arc<dyn Sandbox>,
}

impl SandboxBox {
    pub fn new(id: usize, sandbox: Arc<dyn Sandbox>) -> Self {
        Self {
            id,
            busy: AtomicBool::new(false),
            sandbox,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Marks the box busy. Returns `None` if someone else holds it.
    pub fn try_lease(self: &Arc<Self>) -> Option<BoxLease> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BoxLease {
                owner: Arc::clone(self),
            })
    }

    /// Runs a job, failing straight away if the box is already in use.
    pub async fn run(self: &Arc<Self>, job: &Job) -> Result<ExecutionResult, BoxError> {
        let lease = self.try_lease().ok_or(BoxError::Busy { box_id: self.id })?;
        lease.run(job).await
    }
}

/// Exclusive hold on a box. Dropping it frees the box, also when
/// initialisation or execution failed.
#[derive(Debug)]
pub struct BoxLease {
    owner: Arc<SandboxBox>,
}

impl BoxLease {
    pub fn box_id(&self) -> usize {
        self.owner.id
    }

    #[tracing::instrument(skip(self, job), fields(box_id = self.owner.id))]
    pub async fn run(&self, job: &Job) -> Result<ExecutionResult, BoxError> {
        let box_id = self.owner.id;
        let sandbox = &self.owner.sandbox;

        sandbox.init(box_id).await.map_err(|source| {
            tracing::error!(error = %source, "Box initialisation failed");
            BoxError::InitFailed { box_id, source }
        })?;

        tracing::debug!(script = %job.script.display(), "Executing job");
        let raw = sandbox.execute(box_id, job).await.map_err(|source| {
            tracing::error!(error = %source, "Sandbox invocation failed");
            BoxError::RunFailed { box_id, source }
        })?;

        let result = classify(job, raw);
        tracing::debug!(
            status = %result.status,
            time = result.time,
            memory = result.memory,
            exit_code = result.exit_code,
            "Job finished"
        );
        Ok(result)
    }
}

impl Drop for BoxLease {
    fn drop(&mut self) {
        self.owner.busy.store(false, Ordering::Release);
    }
}

/// Turns raw sandbox telemetry into a result. Running over the time limit
/// wins over everything, then a non-zero exit code, then whatever the
/// sandbox itself reported.
pub fn classify(job: &Job, raw: RawOutput) -> ExecutionResult {
    let meta = raw.metadata;
    let time = meta.time();
    let exit_code = meta.exit_code();
    let reported = meta.status();

    let over_limit = job.time_limit.is_some_and(|limit| time > limit);
    let timed_out = matches!(&reported, Some(Status::Native(code)) if code == SANDBOX_TIMEOUT_CODE);

    let status = if over_limit || timed_out {
        Status::TimeLimitExceeded
    } else if exit_code != 0 {
        Status::RuntimeError
    } else {
        reported.unwrap_or_default()
    };

    ExecutionResult {
        stdout: raw.stdout,
        stderr: raw.stderr,
        status,
        time,
        memory: meta.max_rss(),
        exit_code,
    }
}
