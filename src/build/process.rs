//! Compiler subprocess execution.
//!
//! Every invocation gets its own pair of drain threads for stdout/stderr and a
//! polling watchdog. The watchdog only ever kills its own child and whatever
//! that child spawned, so a hung kernel never holds up its siblings.

use super::report::{TaskFailure, TaskOutcome};
use super::unit::SourceUnit;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long the drains may keep reading after the compiler has exited.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Program plus argv. Passed to the OS as a vector, never through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl CompilerCommand {
    /// `options..., <source>, -o, <target>`
    pub fn for_unit(program: &str, options: &[String], unit: &SourceUnit) -> Self {
        let mut args = options.to_vec();
        args.push(unit.source.to_string_lossy().to_string());
        args.push("-o".to_string());
        args.push(unit.target.to_string_lossy().to_string());
        Self {
            program: program.to_string(),
            args,
        }
    }

    /// Human readable rendering for dry runs. Not used for execution.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                parts.push(format!("\"{}\"", arg.replace('"', "\\\"")));
            } else {
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }
}

/// One stale unit and the command that rebuilds it.
#[derive(Debug, Clone)]
pub struct CompileTask {
    pub unit: SourceUnit,
    pub command: CompilerCommand,
}

impl CompileTask {
    pub fn new(unit: SourceUnit, program: &str, options: &[String]) -> Self {
        let command = CompilerCommand::for_unit(program, options, &unit);
        Self { unit, command }
    }
}

/// Executes a single task. The scheduler only talks to this seam.
pub trait TaskRunner: Send + Sync {
    fn run(&self, task: &CompileTask) -> TaskOutcome;
}

#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TASK_TIMEOUT)
    }
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl TaskRunner for ProcessRunner {
    fn run(&self, task: &CompileTask) -> TaskOutcome {
        let header = format!("Compiling {}", task.unit.target.display());
        let outcome = execute(&task.command, self.timeout);
        outcome.with_header(&header)
    }
}

enum Exit {
    Finished(ExitStatus),
    TimedOut,
}

/// Runs `command` to completion or until `timeout` elapses.
///
/// On unix the compiler gets its own process group, and the watchdog kills
/// the whole group so helpers it forked (cicc, ptxas) go down with it.
pub fn execute(command: &CompilerCommand, timeout: Duration) -> TaskOutcome {
    debug!("Spawning {}", command.display());

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    isolate_process_group(&mut cmd);

    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => return launch_failure(&command.program, &e),
    };

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let exit = wait_with_watchdog(&mut child, timeout);

    // Join the drains on every path, including after a kill. Anything still
    // holding the pipes after the grace period escaped the group kill.
    let drain_deadline = Instant::now() + DRAIN_GRACE;
    let out = collect(stdout, drain_deadline);
    let err = collect(stderr, drain_deadline);
    if out.is_none() || err.is_none() {
        signal_group(&child);
    }

    classify(command, timeout, exit, out, err)
}

fn classify(
    command: &CompilerCommand,
    timeout: Duration,
    exit: io::Result<Exit>,
    out: Option<String>,
    err: Option<String>,
) -> TaskOutcome {
    let (out, err) = match (out, err) {
        (Some(o), Some(e)) => (o, e),
        _ => {
            return TaskOutcome::failure(
                TaskFailure::ResourceRelease,
                "Stream capture could not be stopped.",
            );
        }
    };

    match exit {
        Ok(Exit::Finished(status)) if status.success() => {
            TaskOutcome::success(captured_log(&out, &err))
        }
        Ok(Exit::Finished(status)) => TaskOutcome::failure(
            TaskFailure::NonZeroExit {
                code: status.code(),
            },
            captured_log(&out, &err),
        ),
        Ok(Exit::TimedOut) => TaskOutcome::failure(
            TaskFailure::Timeout { limit: timeout },
            format!(
                "{} timed out after {}.",
                program_name(&command.program),
                format_duration(timeout)
            ),
        ),
        Err(e) => TaskOutcome::failure(
            TaskFailure::Execution {
                message: e.to_string(),
            },
            format!("{}\n{}", e, captured_log(&out, &err)),
        ),
    }
}

#[cfg(unix)]
fn isolate_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate_process_group(_cmd: &mut Command) {}

/// SIGKILL to every process in the child's group.
#[cfg(unix)]
fn signal_group(child: &Child) {
    // process_group(0) makes the group id equal to the child's pid
    let pgid = child.id() as libc::pid_t;
    // ESRCH just means the group is already gone
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn signal_group(_child: &Child) {}

fn kill_tree(child: &mut Child) {
    signal_group(child);
    // kill() fails only if the child already exited; reap either way
    let _ = child.kill();
}

fn launch_failure(program: &str, err: &io::Error) -> TaskOutcome {
    let name = program_name(program);
    let msg = if err.kind() == io::ErrorKind::NotFound {
        format!("{name} not found. Include it in the path and try again.")
    } else {
        format!("{name} could not be launched: {err}")
    };
    TaskOutcome::failure(TaskFailure::Launch, msg)
}

fn wait_with_watchdog(child: &mut Child, timeout: Duration) -> io::Result<Exit> {
    // `None` when the timeout is too large to represent
    let deadline = Instant::now().checked_add(timeout);
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Exit::Finished(status)),
            Ok(None) => {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    kill_tree(child);
                    child.wait()?;
                    return Ok(Exit::TimedOut);
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                kill_tree(child);
                let _ = child.wait();
                return Err(e);
            }
        }
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

/// `None` if the drain thread hit a read error, panicked, or is still
/// blocked on its pipe at `deadline`. A thread left behind is detached and
/// exits once the last writer closes the pipe.
fn collect(handle: Option<JoinHandle<io::Result<Vec<u8>>>>, deadline: Instant) -> Option<String> {
    let handle = match handle {
        None => return Some(String::new()),
        Some(h) => h,
    };
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return None;
        }
        thread::sleep(POLL_INTERVAL);
    }
    match handle.join() {
        Ok(Ok(bytes)) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        _ => None,
    }
}

fn captured_log(stdout: &str, stderr: &str) -> String {
    let mut log = String::new();
    for stream in [stdout, stderr] {
        let trimmed = stream.trim();
        if !trimmed.is_empty() {
            if !log.is_empty() {
                log.push('\n');
            }
            log.push_str(trimmed);
        }
    }
    log
}

fn program_name(program: &str) -> String {
    Path::new(program)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| program.to_string())
}

/// `5 minutes`, `1 minute`, `90 seconds`, `250ms`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if d.subsec_nanos() != 0 && secs == 0 {
        return format!("{}ms", d.as_millis());
    }
    if secs != 0 && secs % 60 == 0 && d.subsec_nanos() == 0 {
        let mins = secs / 60;
        return if mins == 1 {
            "1 minute".to_string()
        } else {
            format!("{mins} minutes")
        };
    }
    if secs == 1 {
        "1 second".to_string()
    } else {
        format!("{secs} seconds")
    }
}
