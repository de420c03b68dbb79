//! Command runner: the only way the entrypoint executes external programs.
//!
//! A command is either shell text run through `/bin/bash -c` or an argument vector
//! executed directly. Paths are only ever passed as argv elements, never spliced
//! into shell text.
use crate::error::{BootstrapError, Result};
use crate::supervisor::ProcessRegistry;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;

/// Shell used for `CommandSpec::Shell`
pub const SHELL: &str = "/bin/bash";

/// A command to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSpec {
    /// Shell text, run as `/bin/bash -c <text>`
    Shell(String),
    /// Program followed by its arguments
    Argv(Vec<String>),
}

impl CommandSpec {
    pub fn shell(text: impl Into<String>) -> Self {
        CommandSpec::Shell(text.into())
    }

    pub fn argv<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::Argv(args.into_iter().map(Into::into).collect())
    }

    /// Prefix the command with `sudo -u <account>` when an account is given.
    pub fn run_as(self, sudo: &str, account: Option<&str>) -> Self {
        let Some(account) = account else {
            return self;
        };
        let mut args = vec![sudo.to_string(), "-u".to_string(), account.to_string()];
        match self {
            CommandSpec::Shell(text) => {
                args.extend([SHELL.to_string(), "-c".to_string(), text]);
            }
            CommandSpec::Argv(argv) => args.extend(argv),
        }
        CommandSpec::Argv(args)
    }

    /// Program and arguments as handed to the OS
    fn parts(&self) -> Result<(&str, Vec<&str>)> {
        match self {
            CommandSpec::Shell(text) => Ok((SHELL, vec!["-c", text.as_str()])),
            CommandSpec::Argv(argv) => {
                let (program, args) = argv
                    .split_first()
                    .ok_or_else(|| BootstrapError::Config("empty command".to_string()))?;
                Ok((program.as_str(), args.iter().map(String::as_str).collect()))
            }
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandSpec::Shell(text) => f.write_str(text),
            CommandSpec::Argv(argv) => {
                let rendered: Vec<String> = argv
                    .iter()
                    .map(|arg| {
                        if arg.split_whitespace().count() <= 1 {
                            arg.clone()
                        } else {
                            format!("\"{}\"", arg)
                        }
                    })
                    .collect();
                f.write_str(&rendered.join(" "))
            }
        }
    }
}

/// Per-invocation options
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Working directory of the child; the parent's never changes
    pub cwd: Option<PathBuf>,
    /// Return stdout instead of checking the exit code
    pub capture: bool,
    /// Replacement environment (the inherited one is cleared)
    pub env: Option<HashMap<String, String>>,
    /// Text piped to the child's stdin
    pub input: Option<String>,
}

impl RunOptions {
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn capture(mut self) -> Self {
        self.capture = true;
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }
}

/// Where a detached process writes its output
#[derive(Debug, Clone)]
pub enum DetachedOutput {
    /// stdout and stderr to the same file
    Combined(PathBuf),
    Split { stdout: PathBuf, stderr: PathBuf },
}

pub struct CommandRunner {
    verbose: bool,
    registry: ProcessRegistry,
}

impl CommandRunner {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            registry: ProcessRegistry::default(),
        }
    }

    /// Run to completion, failing on a non-zero exit code.
    pub async fn run(&self, command: &CommandSpec) -> Result<()> {
        self.run_with(command, RunOptions::default()).await.map(|_| ())
    }

    /// Run and return stdout. The exit code is not checked.
    pub async fn capture(&self, command: &CommandSpec) -> Result<String> {
        let output = self
            .run_with(command, RunOptions::default().capture())
            .await?;
        Ok(output.unwrap_or_default())
    }

    /// Run with explicit options. Returns `Some(stdout)` only when capture was requested.
    pub async fn run_with(
        &self,
        command: &CommandSpec,
        options: RunOptions,
    ) -> Result<Option<String>> {
        let text = command.to_string();
        let started_at = chrono::Local::now();
        tracing::info!(
            "[CommandRunner] run {} (started {})",
            text,
            started_at.format("%H:%M:%S%.3f")
        );
        let start = Instant::now();

        let (program, args) = command.parts()?;
        let mut process = tokio::process::Command::new(program);
        process.args(&args);

        if let Some(dir) = &options.cwd {
            if self.verbose {
                tracing::debug!("[CommandRunner] chdir {}", dir.display());
            }
            process.current_dir(dir);
        }
        if let Some(env) = &options.env {
            process.env_clear().envs(env);
        }
        process.stdin(if options.input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        if options.capture {
            process.stdout(Stdio::piped());
        }

        let mut child = process.spawn().map_err(|source| BootstrapError::Spawn {
            command: text.clone(),
            source,
        })?;

        // stdin is fed while the child runs so a full stdout pipe cannot stall the write
        let feed = feed_stdin(child.stdin.take(), options.input.as_deref());
        let (fed, status, output) = if options.capture {
            let (fed, output) = tokio::join!(feed, child.wait_with_output());
            let output = output?;
            let stdout = String::from_utf8_lossy(&output.stdout).to_string();
            (fed, output.status, Some(stdout))
        } else {
            let (fed, status) = tokio::join!(feed, child.wait());
            (fed, status?, None)
        };

        if let Err(e) = fed {
            tracing::warn!("[CommandRunner] writing input to '{}' failed: {}", text, e);
            if status.success() {
                return Err(BootstrapError::Io(e));
            }
        }

        if !status.success() {
            if options.capture {
                tracing::debug!(
                    "[CommandRunner] '{}' exited with {:?} (output captured, not checked)",
                    text,
                    status.code()
                );
            } else {
                tracing::warn!(
                    "[TIMING] '{}' failed after {}ms",
                    text,
                    start.elapsed().as_millis()
                );
                return Err(BootstrapError::CommandFailed {
                    command: text,
                    code: status.code(),
                });
            }
        }

        if self.verbose {
            tracing::info!(
                "[TIMING] '{}' completed in {}ms",
                text,
                start.elapsed().as_millis()
            );
        }
        Ok(output)
    }

    /// Launch a process without waiting for it and record it for the supervisor.
    ///
    /// Output files are truncated. Returns the child's pid.
    pub fn spawn_detached(
        &mut self,
        name: &str,
        command: &CommandSpec,
        cwd: Option<&Path>,
        output: &DetachedOutput,
    ) -> Result<u32> {
        let text = command.to_string();
        tracing::info!("[CommandRunner] spawn {} in background: {}", name, text);

        let (stdout, stderr) = match output {
            DetachedOutput::Combined(path) => {
                let file = File::create(path)?;
                let clone = file.try_clone()?;
                (file, clone)
            }
            DetachedOutput::Split { stdout, stderr } => {
                (File::create(stdout)?, File::create(stderr)?)
            }
        };

        let (program, args) = command.parts()?;
        // std rather than tokio: the child must stay unreaped until the supervisor waits on it
        let mut process = std::process::Command::new(program);
        process
            .args(&args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);
        if let Some(dir) = cwd {
            process.current_dir(dir);
        }

        let child = process.spawn().map_err(|source| BootstrapError::Spawn {
            command: text,
            source,
        })?;
        let pid = child.id();
        self.registry.register(name, pid);
        tracing::info!("[CommandRunner] {} started (pid {})", name, pid);
        Ok(pid)
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Hand the detached-process registry over to the supervisor.
    pub fn into_registry(self) -> ProcessRegistry {
        self.registry
    }
}

/// Write `input` to the child's stdin and close it.
///
/// A child that exits without reading everything closes the pipe; that is reported
/// through its exit status, not as a write error.
async fn feed_stdin(stdin: Option<ChildStdin>, input: Option<&str>) -> std::io::Result<()> {
    let (Some(mut stdin), Some(input)) = (stdin, input) else {
        return Ok(());
    };
    let written = match stdin.write_all(input.as_bytes()).await {
        Ok(()) => stdin.shutdown().await,
        Err(e) => Err(e),
    };
    match written {
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
            tracing::debug!("[CommandRunner] child closed stdin early");
            Ok(())
        }
        other => other,
    }
}
