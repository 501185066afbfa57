use futures::future;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::errors::EngineError;
use crate::progress::Progress;

/// A program, its arguments and any extra environment it needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Invocation {
            program: program.into(),
            ..Invocation::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Environment values are never printed in logs.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Runs external programs.
pub trait CommandRunner {
    /// Runs to completion and returns stdout.
    async fn capture(&self, invocation: &Invocation) -> Result<String, EngineError>;

    /// Runs to completion while echoing stdout and stderr line by line.
    async fn stream(&self, invocation: &Invocation) -> Result<(), EngineError>;
}

pub struct ProcessRunner {
    progress: Arc<dyn Progress>,
}

impl ProcessRunner {
    pub fn new(progress: Arc<dyn Progress>) -> Self {
        ProcessRunner { progress }
    }

    fn command(invocation: &Invocation) -> Command {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }

    async fn pump<R>(&self, reader: R, to_stderr: bool) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            self.progress.clear();
            if to_stderr {
                eprintln!("{}", line);
            } else {
                println!("{}", line);
            }
        }
        Ok(())
    }
}

fn spawn_error(invocation: &Invocation, source: std::io::Error) -> EngineError {
    EngineError::Spawn {
        program: invocation.program.clone(),
        source,
    }
}

impl CommandRunner for ProcessRunner {
    async fn capture(&self, invocation: &Invocation) -> Result<String, EngineError> {
        debug!("Running: {}", invocation);

        let output = Self::command(invocation)
            .output()
            .await
            .map_err(|err| spawn_error(invocation, err))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim().is_empty() {
                warn!("{}: {}", invocation.program, stderr.trim());
            }
            return Err(EngineError::Failed {
                program: invocation.program.clone(),
                status: output.status.to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn stream(&self, invocation: &Invocation) -> Result<(), EngineError> {
        debug!("Running: {}", invocation);

        let mut child = Self::command(invocation)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| spawn_error(invocation, err))?;

        let io_error = |source: std::io::Error| EngineError::Io {
            program: invocation.program.clone(),
            source,
        };

        // Both pipes are drained concurrently; a child blocked on a full
        // stderr pipe would otherwise never close stdout.
        if let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) {
            let (out, err) =
                future::join(self.pump(stdout, false), self.pump(stderr, true)).await;
            out.map_err(io_error)?;
            err.map_err(io_error)?;
        }

        let status = child.wait().await.map_err(io_error)?;
        if !status.success() {
            return Err(EngineError::Failed {
                program: invocation.program.clone(),
                status: status.to_string(),
            });
        }

        Ok(())
    }
}

/// The container engine binary (`docker`, `podman`, ...).
pub struct Engine<'a, R> {
    runner: &'a R,
    program: &'a str,
}

impl<'a, R: CommandRunner> Engine<'a, R> {
    pub fn new(runner: &'a R, program: &'a str) -> Self {
        Engine { runner, program }
    }

    pub fn compose(&self, manifest: &'a Path) -> ComposeEngine<'a, R> {
        ComposeEngine {
            runner: self.runner,
            program: self.program,
            manifest,
        }
    }

    fn invocation(&self) -> Invocation {
        Invocation::new(self.program)
    }

    pub async fn volume_ls(&self) -> Result<(), EngineError> {
        let inv = self.invocation().args(["volume", "ls"]);
        self.runner.stream(&inv).await
    }

    pub async fn volume_rm(&self, names: &[String]) -> Result<(), EngineError> {
        let inv = self.invocation().args(["volume", "rm"]).args(names);
        self.runner.stream(&inv).await
    }

    pub async fn copy_into(
        &self,
        src: &Path,
        container: &str,
        dest: &str,
    ) -> Result<(), EngineError> {
        let inv = self
            .invocation()
            .arg("cp")
            .arg(src.to_string_lossy())
            .arg(format!("{}:{}", container, dest));
        self.runner.stream(&inv).await
    }

    pub async fn exec(
        &self,
        container: &str,
        env: &[(String, String)],
        cmd: &[&str],
    ) -> Result<(), EngineError> {
        let mut inv = self.invocation().arg("exec");
        for (key, value) in env {
            // Passed by name only; the value comes from our environment.
            inv = inv.arg("-e").arg(key.as_str()).env(key.as_str(), value.as_str());
        }
        let inv = inv.arg(container).args(cmd.iter().copied());
        self.runner.stream(&inv).await
    }
}

/// `<engine> compose -f <manifest> ...`
pub struct ComposeEngine<'a, R> {
    runner: &'a R,
    program: &'a str,
    manifest: &'a Path,
}

impl<'a, R: CommandRunner> ComposeEngine<'a, R> {
    fn invocation(&self, subcommand: &str) -> Invocation {
        Invocation::new(self.program)
            .arg("compose")
            .arg("-f")
            .arg(self.manifest.to_string_lossy())
            .arg(subcommand)
    }

    pub async fn up(&self, services: &[String]) -> Result<(), EngineError> {
        let inv = self.invocation("up").arg("-d").args(services);
        self.runner.stream(&inv).await
    }

    pub async fn down(&self) -> Result<(), EngineError> {
        self.runner.stream(&self.invocation("down")).await
    }

    pub async fn logs(&self, services: &[String]) -> Result<(), EngineError> {
        let inv = self.invocation("logs").arg("--follow").args(services);
        self.runner.stream(&inv).await
    }

    /// Line-delimited JSON, one record per instance.
    pub async fn ps_json(&self, services: &[String]) -> Result<String, EngineError> {
        let inv = self.invocation("ps").args(services).args(["--format", "json"]);
        self.runner.capture(&inv).await
    }

    /// The human-readable table; only used when JSON output is unavailable.
    pub async fn ps_table(&self, services: &[String]) -> Result<String, EngineError> {
        let inv = self.invocation("ps").args(services);
        self.runner.capture(&inv).await
    }

    pub async fn container_id(&self, service: &str) -> Result<Option<String>, EngineError> {
        let inv = self.invocation("ps").arg("-q").arg(service);
        let out = self.runner.capture(&inv).await?;
        Ok(out
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string))
    }
}
