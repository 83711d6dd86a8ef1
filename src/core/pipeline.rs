use std::fs::Permissions;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::FuturesUnordered;
use tokio::{fs, sync::mpsc::Sender};
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::{
    constants::{EVENT_TX_ERR, INPUT_FILE_NAME, SCRATCH_PREFIX, SOURCE_FILE_NAME},
    core::{
        domain::{ExecutionResult, Job, LanguageScripts, Submission},
        scheduler::{BoxPool, SchedulerError},
        traits::registry::LanguageRegistry,
    },
};

/// Progress of one submission, delivered as soon as it is known.
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineEvent {
    Build(ExecutionResult),
    /// `index` points into the submission's inputs. Runs finish in any order.
    Run { index: usize, result: ExecutionResult },
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Unrecognised language: {0}")]
    UnknownLanguage(String),
    #[error("Failed to prepare scratch directory: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Builds a submission once, then runs it against every input.
#[derive(Debug)]
pub struct Pipeline {
    pool: Arc<BoxPool>,
    registry: Arc<dyn LanguageRegistry>,
    scratch_root: PathBuf,
}

impl Pipeline {
    pub fn new<P: AsRef<Path>>(
        pool: Arc<BoxPool>,
        registry: Arc<dyn LanguageRegistry>,
        scratch_root: P,
    ) -> Self {
        Self {
            pool,
            registry,
            scratch_root: scratch_root.as_ref().into(),
        }
    }

    pub fn registry(&self) -> &Arc<dyn LanguageRegistry> {
        &self.registry
    }

    /// Processes a submission, emitting exactly one `Build` event and, when
    /// the build exited with zero, one `Run` event per input.
    ///
    /// A failure of the build job itself (the box, not the submitted code)
    /// is returned as an error. Failures of single runs are reported as
    /// system-error results for that input only. Every scratch directory
    /// created here is removed before returning.
    #[tracing::instrument(
        skip(self, submission, events),
        fields(id = %submission.id, language = %submission.language, inputs = submission.inputs.len())
    )]
    pub async fn run(
        &self,
        submission: Submission,
        events: Sender<PipelineEvent>,
    ) -> Result<(), PipelineError> {
        let scripts = self
            .registry
            .scripts(&submission.language)
            .ok_or_else(|| PipelineError::UnknownLanguage(submission.language.clone()))?;

        let source_dir = self.create_scratch_dir(0o777).await?;
        let outcome = self
            .build_and_run(&submission, &scripts, &source_dir, &events)
            .await;
        self.remove_scratch_dir(&source_dir).await;

        match &outcome {
            Ok(()) => tracing::info!("Submission processed"),
            Err(e) => tracing::error!(error = %e, "Submission aborted"),
        }
        outcome
    }

    async fn build_and_run(
        &self,
        submission: &Submission,
        scripts: &LanguageScripts,
        source_dir: &Path,
        events: &Sender<PipelineEvent>,
    ) -> Result<(), PipelineError> {
        fs::write(source_dir.join(SOURCE_FILE_NAME), &submission.source).await?;

        let build = self.pool.submit(Job::build(scripts, source_dir)).await?;
        let built = build.succeeded();
        tracing::info!(
            status = %build.status,
            exit_code = build.exit_code,
            time = build.time,
            "Build finished"
        );
        emit(events, PipelineEvent::Build(build)).await;

        if !built {
            tracing::debug!("Build failed, skipping runs");
            return Ok(());
        }

        fs::set_permissions(source_dir, Permissions::from_mode(0o755)).await?;

        let mut runs: FuturesUnordered<_> = submission
            .inputs
            .iter()
            .enumerate()
            .map(|(index, input)| async move {
                let result = self
                    .run_input(submission, scripts, source_dir, input)
                    .await
                    .unwrap_or_else(|e| {
                        tracing::error!(index, error = %e, "Run failed");
                        ExecutionResult::system_error()
                    });
                (index, result)
            })
            .collect();

        while let Some((index, result)) = runs.next().await {
            tracing::debug!(index, status = %result.status, "Run finished");
            emit(events, PipelineEvent::Run { index, result }).await;
        }

        Ok(())
    }

    async fn run_input(
        &self,
        submission: &Submission,
        scripts: &LanguageScripts,
        source_dir: &Path,
        input: &str,
    ) -> Result<ExecutionResult, PipelineError> {
        let input_dir = self.create_scratch_dir(0o755).await?;

        let result = async {
            fs::write(input_dir.join(INPUT_FILE_NAME), input).await?;
            let job = Job::run(scripts, submission, source_dir, &input_dir);
            Ok::<_, PipelineError>(self.pool.submit(job).await?)
        }
        .await;

        self.remove_scratch_dir(&input_dir).await;
        result
    }

    async fn create_scratch_dir(&self, mode: u32) -> io::Result<PathBuf> {
        let dir = self
            .scratch_root
            .join(format!("{}-{}", SCRATCH_PREFIX, Uuid::new_v4()));

        fs::create_dir_all(&dir).await?;
        if let Err(e) = fs::set_permissions(&dir, Permissions::from_mode(mode)).await {
            self.remove_scratch_dir(&dir).await;
            return Err(e);
        }
        Ok(dir)
    }

    /// Deletes a scratch directory, but only if it really lives under the
    /// scratch root once symlinks are resolved.
    async fn remove_scratch_dir(&self, dir: &Path) {
        if !self.is_inside_scratch_root(dir).await {
            tracing::error!(path = %dir.display(), "Refusing to delete directory outside scratch root");
            return;
        }
        if let Err(e) = fs::remove_dir_all(dir).await {
            tracing::warn!(path = %dir.display(), error = %e, "Failed to delete scratch directory");
        }
    }

    async fn is_inside_scratch_root(&self, dir: &Path) -> bool {
        let (Ok(root), Ok(dir)) = (
            fs::canonicalize(&self.scratch_root).await,
            fs::canonicalize(dir).await,
        ) else {
            return false;
        };
        dir != root && dir.starts_with(&root)
    }
}

async fn emit(events: &Sender<PipelineEvent>, event: PipelineEvent) {
    if events.send(event).await.is_err() {
        tracing::warn!("{}", EVENT_TX_ERR);
    }
}
