// crates/iris-lots-core/src/runtime/supervisor.rs
// ============================================================================
// Module: Iris Lots Process Supervisor
// Description: Runs the external coding tool under a hard timeout.
// Purpose: Spawn, drain, wait, and kill the tool; map exit codes to faults.
// Dependencies: crate::events, crate::runtime::fault
// ============================================================================

//! ## Overview
//! Each invocation walks `Idle -> Spawned -> (Completed | TimedOut | Killed)`.
//! Both output pipes are drained on background threads as soon as the child
//! starts so it never blocks on a full pipe. Lines that do not start with `0`
//! are reported as `tool_output` events. On timeout the child is killed
//! without any prior signal. The child is always reaped, whatever the outcome.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ffi::OsString;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;
use std::path::PathBuf;
use std::process::Child;
use std::process::Command;
use std::process::ExitStatus;
use std::process::Stdio;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use serde::Serialize;

use crate::events::LotEvent;
use crate::events::LotEventSink;
use crate::runtime::fault::ToolFault;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default tool timeout (seconds).
pub const DEFAULT_TOOL_TIMEOUT_SECONDS: u64 = 600;
/// Interval between exit polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Tool output lines with this prefix are progress noise.
const QUIET_LINE_PREFIX: char = '0';

// ============================================================================
// SECTION: Command
// ============================================================================

/// How to launch the coding tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    /// Tool executable.
    pub executable: PathBuf,
    /// Optional wrapper program (for example `wine`) that runs the executable.
    pub wrapper: Option<PathBuf>,
    /// Hard timeout for one invocation.
    pub timeout: Duration,
}

impl ToolCommand {
    /// Creates a command with the default timeout and no wrapper.
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            wrapper: None,
            timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECONDS),
        }
    }

    /// Sets the wrapper program.
    #[must_use]
    pub fn with_wrapper(mut self, wrapper: impl Into<PathBuf>) -> Self {
        self.wrapper = Some(wrapper.into());
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns `[wrapper] executable [lname=<lot>]` as arguments.
    #[must_use]
    pub fn command_line(&self, lot_name: Option<&str>) -> Vec<OsString> {
        let mut line = Vec::with_capacity(3);
        if let Some(wrapper) = &self.wrapper {
            line.push(wrapper.clone().into_os_string());
        }
        line.push(self.executable.clone().into_os_string());
        if let Some(lot) = lot_name {
            line.push(OsString::from(format!("lname={lot}")));
        }
        line
    }

    /// Builds the process command with piped output.
    fn build(&self, lot_name: Option<&str>) -> Command {
        let mut line = self.command_line(lot_name).into_iter();
        // command_line always yields the executable.
        let program = line.next().unwrap_or_else(|| self.executable.clone().into_os_string());
        let mut command = Command::new(program);
        command.args(line);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command
    }
}

// ============================================================================
// SECTION: Invocation State
// ============================================================================

/// Supervisor state for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    /// Not started (or failed to start).
    Idle,
    /// Child is running.
    Spawned,
    /// Child exited with a code.
    Completed,
    /// Deadline passed; child was killed.
    TimedOut,
    /// Child ended without an exit code.
    Killed,
}

/// Outcome of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRun {
    /// Final supervisor state.
    pub state: SupervisorState,
    /// Exit code when the child completed.
    pub exit_code: Option<i32>,
    /// Wall time spent between spawn and reap.
    pub elapsed: Duration,
    /// Fault derived from the outcome.
    pub fault: Option<ToolFault>,
}

impl ToolRun {
    /// Converts the run into a result, failing on any fault.
    ///
    /// # Errors
    ///
    /// Returns the recorded [`ToolFault`].
    pub fn into_result(self) -> Result<Self, ToolFault> {
        match self.fault.clone() {
            Some(fault) => Err(fault),
            None => Ok(self),
        }
    }

    /// Builds a run that never left `Idle`.
    const fn idle(fault: ToolFault) -> Self {
        Self {
            state: SupervisorState::Idle,
            exit_code: None,
            elapsed: Duration::ZERO,
            fault: Some(fault),
        }
    }
}

/// Spawned child that is killed and reaped when dropped unless already reaped.
struct SpawnedTool {
    /// Child process handle.
    child: Child,
    /// Set once the exit status has been collected.
    reaped: bool,
}

impl SpawnedTool {
    /// Kills the child and collects its status.
    fn kill_and_reap(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.reaped = true;
    }
}

impl Drop for SpawnedTool {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }
        self.kill_and_reap();
    }
}

// ============================================================================
// SECTION: Supervisor
// ============================================================================

/// Runs the coding tool with timeout enforcement.
#[derive(Clone)]
pub struct ProcessSupervisor {
    /// Launch settings.
    command: ToolCommand,
    /// Exit poll interval.
    poll_interval: Duration,
    /// Event sink for tool output and outcomes.
    sink: Arc<dyn LotEventSink>,
}

impl ProcessSupervisor {
    /// Creates a supervisor for the given command.
    #[must_use]
    pub fn new(command: ToolCommand, sink: Arc<dyn LotEventSink>) -> Self {
        Self {
            command,
            poll_interval: DEFAULT_POLL_INTERVAL,
            sink,
        }
    }

    /// Overrides the exit poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Returns the launch settings.
    #[must_use]
    pub const fn command(&self) -> &ToolCommand {
        &self.command
    }

    /// Runs the tool and fails on any fault.
    ///
    /// # Errors
    ///
    /// Returns [`ToolFault`] for nonzero exits, timeouts, and spawn failures.
    pub fn run(&self, lot_name: Option<&str>) -> Result<ToolRun, ToolFault> {
        self.execute(lot_name).into_result()
    }

    /// Runs the tool and reports the full outcome.
    #[must_use]
    pub fn execute(&self, lot_name: Option<&str>) -> ToolRun {
        let run = self.supervise(lot_name);
        let detail = run.fault.as_ref().map(|fault| format!(": {fault}")).unwrap_or_default();
        self.sink.record(
            &LotEvent::new("tool_finished")
                .message(format!("{}{detail}", state_label(run.state))),
        );
        run
    }

    /// Spawns, drains, and waits on one invocation.
    fn supervise(&self, lot_name: Option<&str>) -> ToolRun {
        let mut child = match self.command.build(lot_name).spawn() {
            Ok(child) => child,
            Err(err) => return ToolRun::idle(ToolFault::Spawn(err.to_string())),
        };
        let started = Instant::now();
        self.sink.record(&LotEvent::new("tool_started").message(format!(
            "{}: {}",
            state_label(SupervisorState::Spawned),
            display_command_line(&self.command.command_line(lot_name))
        )));
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut tool = SpawnedTool {
            child,
            reaped: false,
        };
        if let Some(stdout) = stdout
            && let Err(err) = spawn_drain(stdout, "stdout", Arc::clone(&self.sink))
        {
            tool.kill_and_reap();
            return ToolRun::idle(ToolFault::Io(err.to_string()));
        }
        if let Some(stderr) = stderr
            && let Err(err) = spawn_drain(stderr, "stderr", Arc::clone(&self.sink))
        {
            tool.kill_and_reap();
            return ToolRun::idle(ToolFault::Io(err.to_string()));
        }

        let deadline = started + self.command.timeout;
        loop {
            match tool.child.try_wait() {
                Ok(Some(status)) => {
                    tool.reaped = true;
                    return completed_run(status, started.elapsed());
                }
                Ok(None) => {}
                Err(err) => {
                    tool.kill_and_reap();
                    return ToolRun {
                        state: SupervisorState::Killed,
                        exit_code: None,
                        elapsed: started.elapsed(),
                        fault: Some(ToolFault::Io(err.to_string())),
                    };
                }
            }
            let now = Instant::now();
            if now >= deadline {
                tool.kill_and_reap();
                return ToolRun {
                    state: SupervisorState::TimedOut,
                    exit_code: None,
                    elapsed: started.elapsed(),
                    fault: Some(ToolFault::Timeout {
                        seconds: self.command.timeout.as_secs(),
                    }),
                };
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the run for a child that exited on its own.
fn completed_run(status: ExitStatus, elapsed: Duration) -> ToolRun {
    match status.code() {
        Some(code) => ToolRun {
            state: SupervisorState::Completed,
            exit_code: Some(code),
            elapsed,
            fault: ToolFault::from_exit_code(code),
        },
        None => ToolRun {
            state: SupervisorState::Killed,
            exit_code: None,
            elapsed,
            fault: Some(ToolFault::Terminated),
        },
    }
}

/// Starts a detached thread that reports tool output lines.
fn spawn_drain<R>(
    reader: R,
    stream: &'static str,
    sink: Arc<dyn LotEventSink>,
) -> std::io::Result<thread::JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    thread::Builder::new().name(format!("iris-tool-{stream}")).spawn(move || {
        for line in BufReader::new(reader).lines() {
            let Ok(line) = line else {
                break;
            };
            if !line.starts_with(QUIET_LINE_PREFIX) {
                sink.record(&LotEvent::new("tool_output").stream(stream).message(line));
            }
        }
    })
}

/// Joins a command line for display.
fn display_command_line(line: &[OsString]) -> String {
    line.iter().map(|part| part.to_string_lossy().into_owned()).collect::<Vec<_>>().join(" ")
}

/// Returns the event label for a supervisor state.
const fn state_label(state: SupervisorState) -> &'static str {
    match state {
        SupervisorState::Idle => "idle",
        SupervisorState::Spawned => "spawned",
        SupervisorState::Completed => "completed",
        SupervisorState::TimedOut => "timed_out",
        SupervisorState::Killed => "killed",
    }
}
