//! Probe backed by the project's own build and serve commands

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use super::error::ProbeError;
use super::metrics::{Artifact, BundleMetrics};
use super::server::{spawn_shell, terminate, url_answers, ServerGuard};
use super::{BuildOutcome, Probe, RouteResult, ValidationOutcome};
use crate::cancel::CancellationToken;
use crate::config::{BuildSettings, ConfigFile, ServeSettings};
use crate::error::BundleSlimError;
use crate::infra::{
    leading_program, CommandExecutor, FileSystem, RealCommandExecutor, RealFileSystem,
};

const MAX_ERROR_LINES: usize = 20;
const PIPE_GRACE: Duration = Duration::from_secs(1);
const SHELL_BUILTINS: &[&str] = &["cd", "export", "set", "true", "exec", "env", "."];

/// Captured result of a finished command
#[derive(Debug)]
struct Finished {
    success: bool,
    status: String,
    stdout: String,
    stderr: String,
}

/// Runs `[build] command`, measures `dist-dir`, and checks `[serve]` routes
pub struct CommandProbe<CE: CommandExecutor = RealCommandExecutor, FS: FileSystem = RealFileSystem> {
    project_root: PathBuf,
    build: BuildSettings,
    serve: Option<ServeSettings>,
    validation_timeout: Duration,
    cancel: CancellationToken,
    executor: CE,
    fs: FS,
}

impl CommandProbe<RealCommandExecutor, RealFileSystem> {
    /// Create a probe for the real project
    pub fn new(project_root: &Path, config: &ConfigFile) -> Self {
        Self::with_executor(project_root, config, RealCommandExecutor, RealFileSystem)
    }
}

impl<CE: CommandExecutor, FS: FileSystem> CommandProbe<CE, FS> {
    /// Create a probe with custom command and filesystem implementations
    pub fn with_executor(project_root: &Path, config: &ConfigFile, executor: CE, fs: FS) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            build: config.build.clone(),
            serve: config.serve.clone(),
            validation_timeout: Duration::from_secs(config.validation_timeout_secs),
            cancel: CancellationToken::new(),
            executor,
            fs,
        }
    }

    /// Abort waits when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Check that every configured program is on PATH
    pub fn preflight(&self) -> Result<(), BundleSlimError> {
        let mut commands = vec![self.build.command.as_str()];
        if let Some(serve) = &self.serve {
            commands.push(serve.command.as_str());
            if let Some(check) = &serve.check_command {
                commands.push(check.as_str());
            }
        }

        for command in commands {
            let Some(program) = leading_program(command) else {
                continue;
            };
            if SHELL_BUILTINS.contains(&program) || program.contains('/') {
                continue;
            }
            if which::which(program).is_err() {
                return Err(BundleSlimError::ToolMissing {
                    tool: program.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Sizes of everything under the dist directory
    pub fn measure(&self) -> Result<BundleMetrics, ProbeError> {
        let dist = self.project_root.join(&self.build.dist_dir);
        if !self.fs.is_dir(&dist) {
            return Err(ProbeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("build produced no {} directory", self.build.dist_dir.display()),
            )));
        }
        let mut artifacts = Vec::new();
        self.collect_artifacts(&dist, &dist, &mut artifacts)?;
        Ok(BundleMetrics::from_artifacts(artifacts))
    }

    fn collect_artifacts(&self, root: &Path, dir: &Path, out: &mut Vec<Artifact>) -> Result<(), ProbeError> {
        for entry in self.fs.list_dir(dir)? {
            if self.fs.is_dir(&entry) {
                self.collect_artifacts(root, &entry, out)?;
            } else {
                let bytes = self.fs.file_size(&entry)?;
                let path = entry.strip_prefix(root).unwrap_or(&entry).to_path_buf();
                out.push(Artifact { path, bytes });
            }
        }
        Ok(())
    }

    fn run(&self, command_line: &str, timeout: Duration) -> Result<Finished, ProbeError> {
        let mut child = spawn_shell(&self.executor, command_line, &self.project_root, true)?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    terminate(&mut child);
                    return Err(e.into());
                }
            }
            if self.cancel.is_cancelled() {
                terminate(&mut child);
                return Err(ProbeError::Cancelled {
                    command: command_line.to_string(),
                });
            }
            if Instant::now() >= deadline {
                terminate(&mut child);
                return Err(ProbeError::Timeout {
                    command: command_line.to_string(),
                    secs: timeout.as_secs(),
                });
            }
            thread::sleep(Duration::from_millis(50));
        };

        // Anything the command left running in its group still holds the pipes.
        terminate(&mut child);

        Ok(Finished {
            success: status.success(),
            status: status.to_string(),
            stdout: collect(&stdout, deadline),
            stderr: collect(&stderr, deadline),
        })
    }

    fn check_route(
        &self,
        client: &reqwest::blocking::Client,
        serve: &ServeSettings,
        route: &str,
    ) -> RouteResult {
        let url = format!("{}{}", serve.url.trim_end_matches('/'), route);
        let response = match client.get(&url).send() {
            Ok(response) => response,
            Err(e) => {
                return RouteResult {
                    route: route.to_string(),
                    status: None,
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        };

        let status = response.status();
        let body = response.text().unwrap_or_default();
        let marker = serve
            .error_markers
            .iter()
            .find(|m| !m.is_empty() && body.contains(m.as_str()));

        RouteResult {
            route: route.to_string(),
            status: Some(status.as_u16()),
            success: status.is_success() && marker.is_none(),
            error: marker.map(|m| format!("response contains '{}'", m)),
        }
    }

    fn validate_with(&self, serve: &ServeSettings) -> Result<ValidationOutcome, ProbeError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.validation_timeout)
            .build()
            .map_err(|e| ProbeError::Http {
                url: serve.url.clone(),
                reason: e.to_string(),
            })?;

        if url_answers(&client, &serve.url) {
            return Err(ProbeError::ServerAlreadyRunning {
                url: serve.url.clone(),
            });
        }

        let mut guard = ServerGuard::start(&self.executor, &serve.command, &self.project_root)?;
        guard.wait_ready(
            &client,
            &serve.url,
            Duration::from_secs(serve.startup_timeout_secs),
            &self.cancel,
        )?;

        let deadline = Instant::now() + self.validation_timeout;
        let mut outcome = ValidationOutcome {
            success: true,
            ..Default::default()
        };
        for route in &serve.routes {
            let result = if Instant::now() >= deadline {
                RouteResult {
                    route: route.clone(),
                    status: None,
                    success: false,
                    error: Some("validation timed out".to_string()),
                }
            } else {
                self.check_route(&client, serve, route)
            };
            outcome.success &= result.success;
            outcome.routes.push(result);
        }

        if let Some(check) = &serve.check_command {
            match self.run(check, self.validation_timeout) {
                Ok(finished) if finished.success => {}
                Ok(finished) => {
                    outcome.success = false;
                    outcome
                        .runtime_errors
                        .push(format!("'{}' failed ({})", check, finished.status));
                    outcome
                        .runtime_errors
                        .extend(error_lines(&finished.stdout, &finished.stderr));
                }
                Err(e) => {
                    outcome.success = false;
                    outcome.runtime_errors.push(e.to_string());
                }
            }
        }

        guard.stop();
        Ok(outcome)
    }
}

impl<CE: CommandExecutor, FS: FileSystem> Probe for CommandProbe<CE, FS> {
    fn build(&mut self) -> BuildOutcome {
        let started = Instant::now();
        let command = self.build.command.clone();
        log::info!("Building: {}", command);

        let mut outcome = match self.run(&command, Duration::from_secs(self.build.timeout_secs)) {
            Ok(finished) if finished.success => match self.measure() {
                Ok(metrics) => BuildOutcome::passed(metrics),
                Err(e) => BuildOutcome::failed(vec![e.to_string()]),
            },
            Ok(finished) => {
                let mut errors = vec![format!("'{}' failed ({})", command, finished.status)];
                errors.extend(error_lines(&finished.stdout, &finished.stderr));
                BuildOutcome::failed(errors)
            }
            Err(e) => BuildOutcome::failed(vec![e.to_string()]),
        };

        outcome.duration_ms = started.elapsed().as_millis() as u64;
        if !outcome.success {
            log::warn!("Build failed: {}", outcome.errors.first().map(String::as_str).unwrap_or(""));
        }
        outcome
    }

    fn validate(&mut self) -> ValidationOutcome {
        let Some(serve) = self.serve.clone() else {
            return ValidationOutcome::build_only();
        };
        let started = Instant::now();
        let mut outcome = match self.validate_with(&serve) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("Validation failed: {}", e);
                ValidationOutcome::failed(vec![e.to_string()])
            }
        };
        outcome.duration_ms = started.elapsed().as_millis() as u64;
        outcome
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut text = String::new();
        if let Some(mut pipe) = pipe {
            let mut bytes = Vec::new();
            if pipe.read_to_end(&mut bytes).is_ok() {
                text = String::from_utf8_lossy(&bytes).into_owned();
            }
        }
        let _ = tx.send(text);
    });
    rx
}

/// Output of a drain thread, waiting no longer than the command's deadline
fn collect(output: &Receiver<String>, deadline: Instant) -> String {
    let wait = deadline.saturating_duration_since(Instant::now()).max(PIPE_GRACE);
    output.recv_timeout(wait).unwrap_or_default()
}

/// Lines that look like errors, or the tail of stderr when none do
fn error_lines(stdout: &str, stderr: &str) -> Vec<String> {
    let flagged: Vec<String> = stderr
        .lines()
        .chain(stdout.lines())
        .map(str::trim)
        .filter(|line| {
            let lower = line.to_ascii_lowercase();
            lower.contains("error") || lower.contains("could not resolve") || lower.contains("not found")
        })
        .take(MAX_ERROR_LINES)
        .map(str::to_string)
        .collect();
    if !flagged.is_empty() {
        return flagged;
    }
    let tail: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    tail[tail.len().saturating_sub(10)..]
        .iter()
        .map(|l| l.trim().to_string())
        .collect()
}
