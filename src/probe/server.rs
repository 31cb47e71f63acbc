//! Scoped handle on the serve process
//!
//! A [`ServerGuard`] owns the serve command for exactly one validation.
//! Dropping it kills the whole process group and waits for the leader to
//! exit, so the next validation never finds the previous server alive.

use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::error::ProbeError;
use crate::cancel::CancellationToken;
use crate::infra::{shell_invocation, CommandExecutor};

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const GRACE_PERIOD: Duration = Duration::from_secs(3);

/// Start a command line in its own process group
pub(crate) fn spawn_shell<CE: CommandExecutor>(
    executor: &CE,
    command_line: &str,
    project_root: &Path,
    capture: bool,
) -> Result<Child, ProbeError> {
    let (program, args) = shell_invocation(command_line);
    executor
        .start(
            |cmd| {
                cmd.args(&args).current_dir(project_root).stdin(Stdio::null());
                if capture {
                    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
                } else {
                    cmd.stdout(Stdio::null()).stderr(Stdio::null());
                }
                #[cfg(unix)]
                {
                    use std::os::unix::process::CommandExt;
                    cmd.process_group(0);
                }
                cmd
            },
            program,
        )
        .map_err(|e| ProbeError::Spawn {
            command: command_line.to_string(),
            source: e,
        })
}

/// Kill a child started by [`spawn_shell`] and everything it started
///
/// The whole process group is signalled even when the leader has already
/// exited, so background children of a finished command die with it.
pub(crate) fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        signal_group("-TERM", &group);
        let deadline = Instant::now() + GRACE_PERIOD;
        while Instant::now() < deadline {
            if let Ok(Some(_)) = child.try_wait() {
                break;
            }
            thread::sleep(Duration::from_millis(50));
        }
        signal_group("-KILL", &group);
    }

    #[cfg(windows)]
    {
        let _ = Command::new("taskkill")
            .args(["/T", "/F", "/PID", &child.id().to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }

    let _ = child.kill();
    if let Err(e) = child.wait() {
        log::warn!("Could not reap process {}: {}", child.id(), e);
    }
}

#[cfg(unix)]
fn signal_group(signal: &str, group: &str) {
    let _ = Command::new("kill")
        .args([signal, "--", group])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

/// Whether anything answers HTTP on `url`
pub fn url_answers(client: &reqwest::blocking::Client, url: &str) -> bool {
    client.get(url).send().is_ok()
}

/// Running serve process, torn down on drop
pub struct ServerGuard {
    child: Option<Child>,
    command: String,
}

impl ServerGuard {
    /// Start the serve command
    pub fn start<CE: CommandExecutor>(
        executor: &CE,
        command_line: &str,
        project_root: &Path,
    ) -> Result<Self, ProbeError> {
        let child = spawn_shell(executor, command_line, project_root, false)?;
        log::debug!("Started server '{}' (pid {})", command_line, child.id());
        Ok(Self {
            child: Some(child),
            command: command_line.to_string(),
        })
    }

    /// Wait until `url` answers, the process exits, or `timeout` passes
    pub fn wait_ready(
        &mut self,
        client: &reqwest::blocking::Client,
        url: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), ProbeError> {
        let deadline = Instant::now() + timeout;
        loop {
            if cancel.is_cancelled() {
                return Err(ProbeError::Cancelled {
                    command: self.command.clone(),
                });
            }
            if let Some(child) = self.child.as_mut() {
                if let Some(status) = child.try_wait()? {
                    return Err(ProbeError::ServerExited {
                        command: self.command.clone(),
                        status: status.to_string(),
                    });
                }
            }
            if url_answers(client, url) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ProbeError::Timeout {
                    command: self.command.clone(),
                    secs: timeout.as_secs(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Kill the server and wait for it to exit
    pub fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            terminate(&mut child);
            log::debug!("Stopped server '{}'", self.command);
        }
    }
}

impl Drop for ServerGuard {
    fn drop(&mut self) {
        self.stop();
    }
}
