//! Subprocess execution
//!
//! Every external command goes through a [`ProcessRunner`]. The system
//! runner owns each child through a [`ChildGuard`], so a child is always
//! reaped and, if the caller bails out early, terminated.

use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};

/// A command to run, with its working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, cwd: &Path) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.to_path_buf(),
        }
    }

    /// Build from an argv vector; `None` when it is empty
    pub fn from_argv(argv: &[String], cwd: &Path) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), cwd).args(args.iter().cloned()))
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

    /// Program name without directories, for matching and display
    pub fn program_name(&self) -> &str {
        Path::new(&self.program)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.program)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Exit status and combined stdout/stderr of a finished command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs commands to completion
pub trait ProcessRunner {
    fn run(&mut self, spec: &CommandSpec) -> E2eResult<CommandOutput>;
}

impl<R: ProcessRunner + ?Sized> ProcessRunner for &mut R {
    fn run(&mut self, spec: &CommandSpec) -> E2eResult<CommandOutput> {
        (**self).run(spec)
    }
}

/// Run a command and turn a non-zero exit into [`E2eError::CommandFailed`]
pub fn run_checked<R: ProcessRunner + ?Sized>(
    runner: &mut R,
    spec: &CommandSpec,
) -> E2eResult<CommandOutput> {
    info!("$ {}", spec);
    let output = runner.run(spec)?;
    if !output.success() {
        return Err(E2eError::CommandFailed {
            command: spec.to_string(),
            code: output.code,
            output: output.output,
        });
    }
    Ok(output)
}

/// Runs commands on the host
#[derive(Debug)]
pub struct SystemRunner {
    /// Grace period between SIGTERM and SIGKILL for abandoned children
    pub kill_grace: Duration,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self {
            kill_grace: Duration::from_millis(500),
        }
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&mut self, spec: &CommandSpec) -> E2eResult<CommandOutput> {
        let child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| E2eError::Spawn {
                command: spec.to_string(),
                source,
            })?;

        let mut guard = ChildGuard::new(child, self.kill_grace);
        let (stdout, stderr) = guard.take_pipes();

        let stderr_reader = std::thread::spawn(move || -> std::io::Result<Vec<u8>> {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                stderr.read_to_end(&mut buf)?;
            }
            Ok(buf)
        });

        // Build logs are not guaranteed to be UTF-8
        let mut output = String::new();
        if let Some(stdout) = stdout {
            let mut reader = BufReader::new(stdout);
            let mut line = Vec::new();
            while reader.read_until(b'\n', &mut line)? > 0 {
                let text = String::from_utf8_lossy(&line);
                debug!(target: "fxt_e2e::child", "{}", text.trim_end());
                output.push_str(&text);
                line.clear();
            }
        }

        let stderr_output = stderr_reader
            .join()
            .map_err(|_| std::io::Error::other("stderr reader thread panicked"))??;
        output.push_str(&String::from_utf8_lossy(&stderr_output));

        let status = guard.wait()?;
        Ok(CommandOutput {
            code: status.code(),
            output,
        })
    }
}

/// Owns a child process until it has been waited on
pub struct ChildGuard {
    child: Option<Child>,
    kill_grace: Duration,
}

impl ChildGuard {
    pub fn new(child: Child, kill_grace: Duration) -> Self {
        Self {
            child: Some(child),
            kill_grace,
        }
    }

    fn take_pipes(
        &mut self,
    ) -> (
        Option<std::process::ChildStdout>,
        Option<std::process::ChildStderr>,
    ) {
        match self.child.as_mut() {
            Some(child) => (child.stdout.take(), child.stderr.take()),
            None => (None, None),
        }
    }

    /// Wait for the child to exit and release it
    pub fn wait(&mut self) -> E2eResult<ExitStatus> {
        let mut child = self
            .child
            .take()
            .ok_or_else(|| std::io::Error::other("child already reaped"))?;
        Ok(child.wait()?)
    }

    fn terminate(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if matches!(child.try_wait(), Ok(Some(_))) {
            return;
        }

        warn!("Terminating abandoned child (pid: {})", child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                std::thread::sleep(self.kill_grace);
            }
        }

        let _ = child.kill();
        let _ = child.wait();
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        self.terminate();
    }
}
