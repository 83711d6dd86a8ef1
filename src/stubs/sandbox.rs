use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use crate::{
    constants::{INPUT_FILE_NAME, INPUT_MOUNT_POINT},
    core::{
        domain::Job,
        metadata::Metadata,
        traits::sandbox::{RawOutput, Sandbox, SandboxError},
    },
};

const DEFAULT_META: &str = "time:0.010\nmax-rss:512\nexitcode:0\n";

/// What the stub does when it sees a given script.
#[derive(Clone, Debug)]
pub enum StubBehaviour {
    Output(RawOutput),
    /// Prints the contents of the file mounted at `/input`.
    EchoInput,
    /// Like `EchoInput`, but the sandbox breaks on this exact input.
    EchoInputFailingOn(String),
    ExecuteFails,
    /// Panics inside `execute`, before anything is recorded.
    Panics,
}

#[derive(Debug, Default)]
struct StubState {
    started: Vec<String>,
    executed: Vec<String>,
    jobs: Vec<Job>,
    running: usize,
    peak: usize,
    active_boxes: HashSet<usize>,
    overlap: bool,
    init_failures: usize,
    behaviours: HashMap<String, StubBehaviour>,
}

/// In-memory sandbox that sleeps instead of running anything and records
/// how it was used.
#[derive(Debug)]
pub struct SandboxStub {
    delay: Duration,
    state: Mutex<StubState>,
}

impl SandboxStub {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: Mutex::new(StubState::default()),
        }
    }

    pub fn set_behaviour(&self, script: &str, behaviour: StubBehaviour) {
        self.state()
            .behaviours
            .insert(script.to_string(), behaviour);
    }

    pub fn fail_next_inits(&self, count: usize) {
        self.state().init_failures = count;
    }

    /// Scripts in the order their execution began.
    pub fn started(&self) -> Vec<String> {
        self.state().started.clone()
    }

    /// Scripts in the order their execution finished.
    pub fn executed(&self) -> Vec<String> {
        self.state().executed.clone()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.state().jobs.clone()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.state().peak
    }

    pub fn box_overlap_seen(&self) -> bool {
        self.state().overlap
    }

    fn state(&self) -> std::sync::MutexGuard<'_, StubState> {
        self.state.lock().unwrap()
    }
}

pub fn stub_output(stdout: &str, meta: &str) -> RawOutput {
    RawOutput {
        stdout: stdout.to_string(),
        stderr: String::new(),
        metadata: Metadata::parse(meta),
    }
}

fn echo_input(job: &Job) -> Result<RawOutput, SandboxError> {
    let mount = job
        .mounts
        .iter()
        .find(|m| m.inside == Path::new(INPUT_MOUNT_POINT))
        .ok_or_else(|| SandboxError::Spawn {
            msg: "no input mounted".to_string(),
        })?;
    let input = std::fs::read_to_string(mount.outside.join(INPUT_FILE_NAME))
        .map_err(SandboxError::io)?;
    Ok(stub_output(&input, DEFAULT_META))
}

#[async_trait::async_trait]
impl Sandbox for SandboxStub {
    async fn provision(&self, _box_id: usize) -> Result<(), SandboxError> {
        Ok(())
    }

    async fn init(&self, box_id: usize) -> Result<(), SandboxError> {
        let mut state = self.state();
        if state.init_failures > 0 {
            state.init_failures -= 1;
            return Err(SandboxError::Init {
                box_id,
                msg: "stubbed init failure".to_string(),
            });
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn execute(&self, box_id: usize, job: &Job) -> Result<RawOutput, SandboxError> {
        let script = job.script.to_string_lossy().to_string();
        let panics = matches!(
            self.state().behaviours.get(&script),
            Some(StubBehaviour::Panics)
        );
        if panics {
            panic!("stubbed panic in {}", script);
        }

        let behaviour = {
            let mut state = self.state();
            state.started.push(script.clone());
            state.jobs.push(job.clone());
            state.running += 1;
            state.peak = state.peak.max(state.running);
            if !state.active_boxes.insert(box_id) {
                state.overlap = true;
            }
            state.behaviours.get(&script).cloned()
        };

        tokio::time::sleep(self.delay).await;

        let output = match behaviour {
            Some(StubBehaviour::Output(output)) => Ok(output),
            Some(StubBehaviour::EchoInput) => echo_input(job),
            Some(StubBehaviour::EchoInputFailingOn(bad)) => echo_input(job).and_then(|out| {
                if out.stdout == bad {
                    Err(SandboxError::Spawn {
                        msg: format!("stubbed failure on input {:?}", bad),
                    })
                } else {
                    Ok(out)
                }
            }),
            Some(StubBehaviour::ExecuteFails) => Err(SandboxError::Spawn {
                msg: "stubbed execute failure".to_string(),
            }),
            Some(StubBehaviour::Panics) => unreachable!(),
            None => Ok(stub_output(&script, DEFAULT_META)),
        };
        tracing::debug!("Stub execution result: {:?}", output);

        let mut state = self.state();
        state.running -= 1;
        state.active_boxes.remove(&box_id);
        state.executed.push(script);
        output
    }
}
