use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::{fs, process::Command};
use uuid::Uuid;

use crate::{
    constants::{
        META_FILE_NAME, RUN_MOUNT_POINT, SANDBOX_MAX_PROCESSES, SANDBOX_PATH_ENV, SCRATCH_PREFIX,
        SCRIPT_FILE_NAME,
    },
    core::{
        domain::{Job, MountMode},
        metadata::Metadata,
        traits::sandbox::{RawOutput, Sandbox, SandboxError},
    },
};

/// Drives the `isolate` binary. Every box keeps its meta file in
/// `<box_data_dir>/<box_id>/meta`.
#[derive(Clone, Debug)]
pub struct IsolateSandbox {
    binary: PathBuf,
    box_data_dir: PathBuf,
    scratch_root: PathBuf,
}

impl IsolateSandbox {
    pub fn new<B, D, S>(binary: B, box_data_dir: D, scratch_root: S) -> Self
    where
        B: AsRef<Path>,
        D: AsRef<Path>,
        S: AsRef<Path>,
    {
        IsolateSandbox {
            binary: binary.as_ref().into(),
            box_data_dir: box_data_dir.as_ref().into(),
            scratch_root: scratch_root.as_ref().into(),
        }
    }

    /// Creates the shared box data directory, readable by the owner only.
    pub async fn prepare(&self) -> Result<(), SandboxError> {
        fs::create_dir_all(&self.box_data_dir)
            .await
            .map_err(SandboxError::io)?;
        fs::set_permissions(&self.box_data_dir, Permissions::from_mode(0o700))
            .await
            .map_err(SandboxError::io)
    }

    fn box_dir(&self, box_id: usize) -> PathBuf {
        self.box_data_dir.join(box_id.to_string())
    }

    fn meta_path(&self, box_id: usize) -> PathBuf {
        self.box_dir(box_id).join(META_FILE_NAME)
    }

    /// Arguments for one `isolate --run` invocation. Unbounded limits are
    /// left out instead of being passed as zero.
    pub fn run_args(&self, box_id: usize, run_dir: &Path, job: &Job) -> Vec<String> {
        let mut args = vec![
            "--cg".to_string(),
            "-b".to_string(),
            box_id.to_string(),
            format!("--dir={}={}", RUN_MOUNT_POINT, run_dir.display()),
        ];

        args.extend(job.mounts.iter().map(|mount| {
            let suffix = match mount.mode {
                MountMode::ReadOnly => "",
                MountMode::ReadWrite => ":rw",
            };
            format!(
                "--dir={}={}{}",
                mount.inside.display(),
                mount.outside.display(),
                suffix
            )
        }));

        args.extend(["-x".to_string(), "0".to_string()]);
        if let Some(time) = job.time_limit {
            args.extend(["-t".to_string(), time.to_string()]);
        }
        if let Some(memory) = job.memory_limit {
            args.extend(["-m".to_string(), memory.to_string()]);
        }

        args.extend([
            "-M".to_string(),
            self.meta_path(box_id).display().to_string(),
            "-E".to_string(),
            SANDBOX_PATH_ENV.to_string(),
            format!("-p{}", SANDBOX_MAX_PROCESSES),
            "--run".to_string(),
            "--".to_string(),
            "/bin/bash".to_string(),
            format!("{}/{}", RUN_MOUNT_POINT, SCRIPT_FILE_NAME),
        ]);

        args
    }

    async fn prepare_run_dir(&self, run_dir: &Path, job: &Job) -> Result<(), SandboxError> {
        fs::create_dir_all(run_dir).await.map_err(SandboxError::io)?;
        fs::set_permissions(run_dir, Permissions::from_mode(0o755))
            .await
            .map_err(SandboxError::io)?;
        fs::copy(&job.script, run_dir.join(SCRIPT_FILE_NAME))
            .await
            .map_err(SandboxError::io)?;
        Ok(())
    }

    async fn invoke(&self, box_id: usize, run_dir: &Path, job: &Job) -> Result<RawOutput, SandboxError> {
        // A meta file left by an earlier job must never be read as this one's.
        let meta_path = self.meta_path(box_id);
        if let Err(e) = fs::remove_file(&meta_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(SandboxError::Metadata { msg: e.to_string() });
            }
        }

        let out = Command::new(&self.binary)
            .args(self.run_args(box_id, run_dir, job))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SandboxError::Spawn { msg: e.to_string() })?
            .wait_with_output()
            .await
            .map_err(|e| SandboxError::Spawn { msg: e.to_string() })?;

        // isolate exits non-zero whenever the program failed; that is still a
        // usable run as long as the meta file was written.
        tracing::debug!(box_id, status = ?out.status.code(), "isolate exited");

        let raw_meta = fs::read_to_string(&meta_path).await.map_err(|e| {
            tracing::error!(
                box_id,
                stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                "isolate wrote no metadata"
            );
            SandboxError::Metadata { msg: e.to_string() }
        })?;

        Ok(RawOutput {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            metadata: Metadata::parse(&raw_meta),
        })
    }
}

#[async_trait::async_trait]
impl Sandbox for IsolateSandbox {
    async fn provision(&self, box_id: usize) -> Result<(), SandboxError> {
        let dir = self.box_dir(box_id);
        fs::create_dir_all(&dir).await.map_err(SandboxError::io)?;
        fs::set_permissions(&dir, Permissions::from_mode(0o700))
            .await
            .map_err(SandboxError::io)
    }

    #[tracing::instrument(skip(self))]
    async fn init(&self, box_id: usize) -> Result<(), SandboxError> {
        let out = Command::new(&self.binary)
            .args(["-b", &box_id.to_string(), "--cg", "--init"])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| SandboxError::Init {
                box_id,
                msg: e.to_string(),
            })?;

        if !out.status.success() {
            return Err(SandboxError::Init {
                box_id,
                msg: String::from_utf8_lossy(&out.stdout).trim().to_string(),
            });
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, job), fields(script = %job.script.display()))]
    async fn execute(&self, box_id: usize, job: &Job) -> Result<RawOutput, SandboxError> {
        let run_dir = self
            .scratch_root
            .join(format!("{}-run-{}", SCRATCH_PREFIX, Uuid::new_v4()));

        let outcome = async {
            self.prepare_run_dir(&run_dir, job).await?;
            self.invoke(box_id, &run_dir, job).await
        }
        .await;

        if let Err(e) = fs::remove_dir_all(&run_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %run_dir.display(), error = %e, "Failed to delete run directory");
            }
        }

        outcome
    }
}
