//! Subprocess execution utilities.
//!
//! Long-running commands (fetches, builds) go through
//! [`ProcessBuilder::run`], which places the child in its own process group
//! so that cancellation and timeouts take down everything it spawned.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Cooperative cancellation flag.
///
/// A child token observes its parent: cancelling the parent cancels every
/// child, cancelling a child leaves the parent and siblings running.
#[derive(Debug, Clone)]
pub struct CancelToken {
    flags: Vec<Arc<AtomicBool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken {
            flags: vec![Arc::new(AtomicBool::new(false))],
        }
    }

    /// Derive a token that is cancelled when either it or `self` is.
    pub fn child(&self) -> Self {
        let mut flags = self.flags.clone();
        flags.push(Arc::new(AtomicBool::new(false)));
        CancelToken { flags }
    }

    /// Request cancellation of this token and its children.
    pub fn cancel(&self) {
        if let Some(own) = self.flags.last() {
            own.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.iter().any(|f| f.load(Ordering::SeqCst))
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a supervised process did not run to completion.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` was cancelled")]
    Cancelled { command: String },

    #[error("`{command}` timed out after {}s", timeout.as_secs())]
    TimedOut { command: String, timeout: Duration },

    #[error("failed to wait for `{command}`")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },
}

/// Builder for subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    env_clear: bool,
    cwd: Option<PathBuf>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: BTreeMap::new(),
            env_clear: false,
            cwd: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Replace the whole environment with `vars`.
    ///
    /// The child sees exactly these variables and nothing inherited.
    pub fn envs_exact<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.env_clear = true;
        self.env = vars
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
            .collect();
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Get the program path.
    pub fn get_program(&self) -> &Path {
        &self.program
    }

    /// Get the arguments.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Get an explicitly set environment variable.
    pub fn get_env(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        if self.env_clear {
            cmd.env_clear();
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd
    }

    /// Execute the command and wait for completion.
    pub fn exec(&self) -> Result<Output> {
        let mut cmd = self.build_command();
        cmd.stdin(Stdio::null());
        cmd.output()
            .with_context(|| format!("failed to execute `{}`", self.program.display()))
    }

    /// Execute and require success.
    pub fn exec_and_check(&self) -> Result<Output> {
        let output = self.exec()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "`{}` failed with exit code {:?}\n{}",
                self.display_command(),
                output.status.code(),
                stderr.trim_end()
            );
        }
        Ok(output)
    }

    /// Run under supervision: the child gets its own process group, and the
    /// group is killed when `cancel` fires or `timeout` elapses.
    pub fn run(
        &self,
        cancel: &CancelToken,
        timeout: Option<Duration>,
    ) -> Result<Output, ProcessError> {
        let mut cmd = self.build_command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: self.program.display().to_string(),
            source,
        })?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);
        let started = Instant::now();

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(source) => {
                    kill_group(&mut child);
                    return Err(ProcessError::Wait {
                        command: self.display_command(),
                        source,
                    });
                }
            }

            if cancel.is_cancelled() {
                kill_group(&mut child);
                let _ = child.wait();
                return Err(ProcessError::Cancelled {
                    command: self.display_command(),
                });
            }

            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    kill_group(&mut child);
                    let _ = child.wait();
                    return Err(ProcessError::TimedOut {
                        command: self.display_command(),
                        timeout: limit,
                    });
                }
            }

            thread::sleep(POLL_INTERVAL);
        };

        // Background children of the leader still hold the pipes open.
        kill_leftovers(child.id());
        let readers = [stdout.as_ref(), stderr.as_ref()];
        while !readers.iter().flatten().all(|h| h.is_finished()) {
            if cancel.is_cancelled() {
                return Err(ProcessError::Cancelled {
                    command: self.display_command(),
                });
            }
            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    return Err(ProcessError::TimedOut {
                        command: self.display_command(),
                        timeout: limit,
                    });
                }
            }
            thread::sleep(POLL_INTERVAL);
        }

        Ok(Output {
            status,
            stdout: stdout.map(collect).unwrap_or_default(),
            stderr: stderr.map(collect).unwrap_or_default(),
        })
    }

    /// Display the command for error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: JoinHandle<Vec<u8>>) -> Vec<u8> {
    handle.join().unwrap_or_default()
}

#[cfg(unix)]
fn kill_group(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(child.id() as i32);
    if let Err(err) = killpg(pgid, Signal::SIGKILL) {
        tracing::debug!("killpg({}) failed: {}; killing child only", pgid, err);
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_group(child: &mut Child) {
    let _ = child.kill();
}

/// Kill whatever is left in the group of an already reaped leader.
#[cfg(unix)]
fn kill_leftovers(leader: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(leader as i32), Signal::SIGKILL) {
        Ok(()) => tracing::debug!("killed leftover processes in group {}", leader),
        Err(Errno::ESRCH) => {}
        Err(err) => tracing::debug!("killpg({}) failed: {}", leader, err),
    }
}

#[cfg(not(unix))]
fn kill_leftovers(_leader: u32) {}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}
