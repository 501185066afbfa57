use std::collections::VecDeque;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

use crate::config::Config;
use crate::engine::{CommandRunner, Invocation};
use crate::errors::EngineError;
use crate::ports::{Availability, HostProbe, ListenKey};

pub fn config_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("upctl-test-")
        .suffix(".yaml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

pub fn config(contents: &str) -> Config {
    Config::parse(Path::new("/tmp/.upctl.yaml"), contents).unwrap()
}

/// A canned answer for the next invocation of a program.
pub enum Reply {
    Output(String),
    Fail,
    Missing,
}

/// Records every invocation instead of running it. Replies are consumed in
/// order; once they run out every invocation succeeds with empty output.
/// Clones share their state, so a test keeps one while the project owns the
/// other.
#[derive(Clone, Default)]
pub struct FakeRunner {
    calls: Arc<Mutex<Vec<Invocation>>>,
    replies: Arc<Mutex<VecDeque<Reply>>>,
    /// Whether the path after `-f` existed at the time of each call.
    manifest_seen: Arc<Mutex<Vec<bool>>>,
    /// Any invocation carrying one of these arguments fails, the way the
    /// engine rejects an unknown service.
    rejected: Arc<Mutex<Vec<String>>>,
}

impl FakeRunner {
    pub fn with_replies(replies: Vec<Reply>) -> Self {
        FakeRunner {
            replies: Arc::new(Mutex::new(replies.into())),
            ..FakeRunner::default()
        }
    }

    pub fn rejecting(self, arg: &str) -> Self {
        self.rejected.lock().unwrap().push(arg.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.to_string()).collect()
    }

    pub fn manifest_seen(&self) -> Vec<bool> {
        self.manifest_seen.lock().unwrap().clone()
    }

    fn answer(&self, invocation: &Invocation) -> Result<String, EngineError> {
        if let Some(i) = invocation.args.iter().position(|a| a == "-f") {
            let exists = invocation
                .args
                .get(i + 1)
                .map(|p| Path::new(p).is_file())
                .unwrap_or(false);
            self.manifest_seen.lock().unwrap().push(exists);
        }
        self.calls.lock().unwrap().push(invocation.clone());

        let rejected = self.rejected.lock().unwrap();
        if invocation.args.iter().any(|a| rejected.contains(a)) {
            return Err(EngineError::Failed {
                program: invocation.program.clone(),
                status: "exit status: 1".to_string(),
            });
        }
        drop(rejected);

        match self.replies.lock().unwrap().pop_front() {
            None => Ok(String::new()),
            Some(Reply::Output(out)) => Ok(out),
            Some(Reply::Fail) => Err(EngineError::Failed {
                program: invocation.program.clone(),
                status: "exit status: 1".to_string(),
            }),
            Some(Reply::Missing) => Err(EngineError::Spawn {
                program: invocation.program.clone(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
        }
    }
}

impl CommandRunner for FakeRunner {
    async fn capture(&self, invocation: &Invocation) -> Result<String, EngineError> {
        self.answer(invocation)
    }

    async fn stream(&self, invocation: &Invocation) -> Result<(), EngineError> {
        self.answer(invocation).map(|_| ())
    }
}

/// Answers from a fixed list of occupied keys and remembers what was asked.
#[derive(Default)]
pub struct RecordingProbe {
    pub occupied: Vec<ListenKey>,
    pub probed: Mutex<Vec<ListenKey>>,
}

impl HostProbe for RecordingProbe {
    fn probe(&self, key: &ListenKey) -> Availability {
        self.probed.lock().unwrap().push(key.clone());
        if self.occupied.contains(key) {
            Availability::Occupied("in use by another application".to_string())
        } else {
            Availability::Available
        }
    }
}
