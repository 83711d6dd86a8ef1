use std::fmt;
use std::path::{Path, PathBuf};

use crate::constants::{
    BUILD_MEMORY_LIMIT_KB, BUILD_TIME_LIMIT_SECS, INPUT_MOUNT_POINT, SUBMISSION_MOUNT_POINT,
    SYSTEM_ERROR_MSG,
};

/// A validated request: one source, one language, many inputs.
#[derive(Clone, Debug)]
pub struct Submission {
    pub id: String,
    pub source: String,
    pub language: String,
    /// Seconds, `None` is unbounded.
    pub time_limit: Option<f64>,
    /// Kilobytes, `None` is unbounded.
    pub memory_limit: Option<u64>,
    pub inputs: Vec<String>,
}

/// Entry scripts of a single language.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LanguageScripts {
    pub build: PathBuf,
    pub run: PathBuf,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MountMode {
    #[default]
    ReadOnly,
    ReadWrite,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mount {
    pub inside: PathBuf,
    pub outside: PathBuf,
    pub mode: MountMode,
}

impl Mount {
    pub fn read_only<I: AsRef<Path>, O: AsRef<Path>>(inside: I, outside: O) -> Self {
        Self {
            inside: inside.as_ref().into(),
            outside: outside.as_ref().into(),
            mode: MountMode::ReadOnly,
        }
    }

    pub fn read_write<I: AsRef<Path>, O: AsRef<Path>>(inside: I, outside: O) -> Self {
        Self {
            mode: MountMode::ReadWrite,
            ..Self::read_only(inside, outside)
        }
    }
}

/// The unit of work dispatched to a box.
#[derive(Clone, Debug, PartialEq)]
pub struct Job {
    pub script: PathBuf,
    pub time_limit: Option<f64>,
    pub memory_limit: Option<u64>,
    pub mounts: Vec<Mount>,
}

impl Job {
    /// Build job: generous fixed limits, submission directory writable.
    pub fn build(scripts: &LanguageScripts, source_dir: &Path) -> Self {
        Self {
            script: scripts.build.clone(),
            time_limit: Some(BUILD_TIME_LIMIT_SECS),
            memory_limit: Some(BUILD_MEMORY_LIMIT_KB),
            mounts: vec![Mount::read_write(SUBMISSION_MOUNT_POINT, source_dir)],
        }
    }

    /// Run job for one input: submission limits, everything read-only.
    pub fn run(
        scripts: &LanguageScripts,
        submission: &Submission,
        source_dir: &Path,
        input_dir: &Path,
    ) -> Self {
        Self {
            script: scripts.run.clone(),
            time_limit: submission.time_limit,
            memory_limit: submission.memory_limit,
            mounts: vec![
                Mount::read_only(SUBMISSION_MOUNT_POINT, source_dir),
                Mount::read_only(INPUT_MOUNT_POINT, input_dir),
            ],
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Status {
    #[default]
    Ok,
    TimeLimitExceeded,
    RuntimeError,
    SystemError,
    /// Status code reported by isolate itself, passed through as is.
    Native(String),
}

impl Status {
    pub fn code(&self) -> &str {
        match self {
            Status::Ok => "OK",
            Status::TimeLimitExceeded => "TLE",
            Status::RuntimeError => "RE",
            Status::SystemError => "SYSERR",
            Status::Native(code) => code,
        }
    }

    pub fn from_code(code: &str) -> Self {
        match code {
            "OK" => Status::Ok,
            "TLE" => Status::TimeLimitExceeded,
            "RE" => Status::RuntimeError,
            "SYSERR" => Status::SystemError,
            other => Status::Native(other.to_string()),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of one executed job.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub status: Status,
    /// Seconds of CPU time reported by the sandbox.
    pub time: f64,
    /// Peak resident set size in kilobytes.
    pub memory: u64,
    pub exit_code: i32,
}

impl ExecutionResult {
    /// Stand-in result for an input whose run could not be carried out.
    pub fn system_error() -> Self {
        Self {
            stdout: String::new(),
            stderr: SYSTEM_ERROR_MSG.to_string(),
            status: Status::SystemError,
            time: 0.0,
            memory: 0,
            exit_code: 1,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}
