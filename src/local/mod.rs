//! Local process engine (C4): spawns children of the current process via
//! [`std::process::Command`], optionally behind a pseudo-terminal.
//!
//! Grounded on `examples/original_source/spur/local.py`'s `LocalShell`/
//! `LocalProcess` for the overall shape (spawn, classify spawn errors,
//! bridge pipes into the capture pipeline). Process-group placement uses the
//! stable `std::os::unix::process::CommandExt::process_group` rather than a
//! `pre_exec` closure calling `libc::setpgid`.

mod pty;

use std::io;
use std::io::Write;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Error;
use crate::io::{Channel, IoHandler};
use crate::process::Process;
use crate::registry;
use crate::result::{self, ExecutionResult, Output};
use crate::spec::CommandSpec;

/// A shell bound to the local operating system.
pub struct LocalShell {
    closed: Arc<AtomicBool>,
}

impl Default for LocalShell {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalShell {
    /// Open a new local shell. There is no connection step: the shell is
    /// ready to spawn immediately.
    pub fn new() -> Self {
        Self {
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// `true` once [`close`](LocalShell::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mark the shell closed. Idempotent; further spawns fail.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Launch `spec` and return a handle to the running (or already
    /// finished) child.
    pub fn spawn(&self, spec: CommandSpec) -> Result<LocalProcess, Error> {
        if self.is_closed() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "shell is closed",
            )));
        }

        let CommandSpec {
            argv,
            cwd,
            update_env,
            store_pid,
            use_pty,
            new_process_group,
            allow_error,
            encoding_utf8,
            stdout_sink,
            stderr_sink,
        } = spec;

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        if let Some(cwd) = &cwd {
            cmd.current_dir(cwd);
        }
        if !update_env.is_empty() {
            cmd.envs(&update_env);
        }
        if new_process_group {
            cmd.process_group(0);
        }

        let state = if use_pty {
            spawn_with_pty(
                cmd,
                &argv[0],
                &cwd,
                stdout_sink,
                stderr_sink,
                encoding_utf8,
                store_pid,
                new_process_group,
                allow_error,
            )?
        } else {
            spawn_with_pipes(
                cmd,
                &argv[0],
                &cwd,
                stdout_sink,
                stderr_sink,
                encoding_utf8,
                store_pid,
                new_process_group,
                allow_error,
            )?
        };

        let handle = Arc::new(Mutex::new(state));
        registry::register(handle.clone() as Arc<Mutex<dyn Process>>, None);
        Ok(LocalProcess(handle))
    }

    /// Spawn `spec`, then block until it finishes.
    pub fn run(&self, spec: CommandSpec) -> Result<ExecutionResult, Error> {
        let mut process = self.spawn(spec)?;
        process.wait_for_result()
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_with_pipes(
    mut cmd: Command,
    program: &str,
    cwd: &Option<std::path::PathBuf>,
    stdout_sink: Option<Box<dyn Write + Send>>,
    stderr_sink: Option<Box<dyn Write + Send>>,
    encoding_utf8: bool,
    store_pid: bool,
    new_process_group: bool,
    allow_error: bool,
) -> Result<LocalProcessState, Error> {
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| classify_spawn_error(e, program, cwd))?;
    let stdin = Box::new(child.stdin.take().expect("piped stdin"));
    let stdout = Channel::new(Box::new(child.stdout.take().expect("piped stdout")), stdout_sink, false);
    let stderr = Channel::new(Box::new(child.stderr.take().expect("piped stderr")), stderr_sink, false);

    Ok(LocalProcessState {
        child,
        io: IoHandler::new(stdout, stderr, encoding_utf8),
        stdin: Some(stdin),
        store_pid,
        new_process_group,
        allow_error,
        cached: None,
    })
}

#[allow(clippy::too_many_arguments)]
fn spawn_with_pty(
    mut cmd: Command,
    program: &str,
    cwd: &Option<std::path::PathBuf>,
    stdout_sink: Option<Box<dyn Write + Send>>,
    stderr_sink: Option<Box<dyn Write + Send>>,
    encoding_utf8: bool,
    store_pid: bool,
    new_process_group: bool,
    allow_error: bool,
) -> Result<LocalProcessState, Error> {
    let allocated = pty::allocate()?;
    cmd.stdin(allocated.child_stdin);
    cmd.stdout(allocated.child_stdout);
    cmd.stderr(allocated.child_stderr);

    let child = cmd.spawn().map_err(|e| classify_spawn_error(e, program, cwd))?;
    // The child holds its own duplicated copies of the slave fd as its
    // stdin/stdout/stderr; dropping ours now lets `master_reader` observe
    // EOF/EIO once the child's copies are closed.
    drop(allocated.slave_closer);

    let stdin = Box::new(allocated.master_writer);
    let stdout = Channel::new(Box::new(allocated.master_reader), stdout_sink, true);
    // use_pty merges stderr into stdout at the kernel level; stderr_output is
    // always empty, but a caller-provided stderr sink must still see nothing
    // written to it rather than erroring.
    let stderr = Channel::new(Box::new(io::empty()), stderr_sink, false);

    Ok(LocalProcessState {
        child,
        io: IoHandler::new(stdout, stderr, encoding_utf8),
        stdin: Some(stdin),
        store_pid,
        new_process_group,
        allow_error,
        cached: None,
    })
}

fn classify_spawn_error(err: io::Error, program: &str, cwd: &Option<std::path::PathBuf>) -> Error {
    if let Some(cwd) = cwd {
        if std::fs::read_dir(cwd).is_err() {
            return Error::CouldNotChangeDirectory {
                directory: cwd.clone(),
                detail: err.to_string(),
            };
        }
    }
    if err.kind() == io::ErrorKind::NotFound {
        return Error::NoSuchCommand {
            command: program.to_string(),
        };
    }
    Error::Io(err)
}

struct LocalProcessState {
    child: std::process::Child,
    io: IoHandler,
    stdin: Option<Box<dyn Write + Send>>,
    store_pid: bool,
    new_process_group: bool,
    allow_error: bool,
    cached: Option<(i32, Output, Output)>,
}

/// A spawned local child. Implements [`Process`]; most callers interact with
/// it only through that trait.
pub struct LocalProcess(Arc<Mutex<LocalProcessState>>);

impl LocalProcess {
    fn with_state<R>(&self, f: impl FnOnce(&mut LocalProcessState) -> R) -> R {
        let mut guard = self.0.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

impl Process for LocalProcessState {
    fn is_running(&mut self) -> Result<bool, Error> {
        Ok(self.child.try_wait()?.is_none())
    }

    fn stdin_write(&mut self, data: &[u8]) -> Result<(), Error> {
        if let Some(stdin) = &mut self.stdin {
            stdin.write_all(data)?;
        }
        Ok(())
    }

    fn close_stdin(&mut self) -> Result<(), Error> {
        self.stdin = None;
        Ok(())
    }

    fn send_signal(&mut self, signal_name: &str) -> Result<(), Error> {
        let signal = parse_signal(signal_name)?;
        let target = if self.new_process_group {
            -(self.child.id() as i32)
        } else {
            self.child.id() as i32
        };
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(target), signal)
            .map_err(|e| Error::Io(io::Error::from_raw_os_error(e as i32)))
    }

    fn wait_for_result(&mut self) -> Result<ExecutionResult, Error> {
        if self.cached.is_none() {
            let (output, stderr_output) = self.io.wait()?;
            let status = self.child.wait()?;
            let return_code = status.code().unwrap_or_else(|| 128 + status.signal().unwrap_or(0));
            self.cached = Some((return_code, output, stderr_output));
        }
        let (return_code, output, stderr_output) = self.cached.clone().unwrap();
        result::result(return_code, self.allow_error, output, stderr_output)
    }

    fn pid(&self) -> Option<u32> {
        self.store_pid.then(|| self.child.id())
    }
}

impl Process for LocalProcess {
    fn is_running(&mut self) -> Result<bool, Error> {
        self.with_state(Process::is_running)
    }
    fn stdin_write(&mut self, data: &[u8]) -> Result<(), Error> {
        self.with_state(|s| s.stdin_write(data))
    }
    fn send_signal(&mut self, signal_name: &str) -> Result<(), Error> {
        self.with_state(|s| s.send_signal(signal_name))
    }
    fn close_stdin(&mut self) -> Result<(), Error> {
        self.with_state(Process::close_stdin)
    }
    fn wait_for_result(&mut self) -> Result<ExecutionResult, Error> {
        self.with_state(Process::wait_for_result)
    }
    fn pid(&self) -> Option<u32> {
        self.with_state(|s| s.pid())
    }
}

fn parse_signal(name: &str) -> Result<nix::sys::signal::Signal, Error> {
    use nix::sys::signal::Signal;
    let canonical = if let Some(stripped) = name.strip_prefix("SIG") {
        stripped.to_string()
    } else {
        name.to_string()
    };
    format!("SIG{canonical}")
        .parse::<Signal>()
        .map_err(|_| Error::Io(io::Error::new(io::ErrorKind::InvalidInput, format!("unknown signal: {name}"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn run_echo_captures_stdout() {
        let shell = LocalShell::new();
        let result = shell.run(CommandSpec::new(["echo", "-n", "hello"])).unwrap();
        assert_eq!(result.return_code, 0);
        assert_eq!(result.output.as_bytes(), b"hello");
        assert_eq!(result.stderr_output.as_bytes(), b"");
    }

    #[test]
    fn trailing_newlines_are_preserved() {
        let shell = LocalShell::new();
        let result = shell.run(CommandSpec::new(["echo", "\n\n"])).unwrap();
        assert_eq!(result.output.as_bytes(), b"\n\n\n");
    }

    #[test]
    fn stderr_is_routed_separately() {
        let shell = LocalShell::new();
        let result = shell
            .run(CommandSpec::new(["sh", "-c", "echo hello 1>&2"]))
            .unwrap();
        assert_eq!(result.output.as_bytes(), b"");
        assert_eq!(result.stderr_output.as_bytes(), b"hello\n");
    }

    #[test]
    fn nonzero_exit_raises_run_process_error() {
        let shell = LocalShell::new();
        let err = shell.run(CommandSpec::new(["false"])).unwrap_err();
        match err {
            Error::Run(e) => assert_eq!(e.return_code, 1),
            other => panic!("expected Error::Run, got {other:?}"),
        }
    }

    #[test]
    fn nonexistent_program_on_path() {
        let shell = LocalShell::new();
        let err = shell.run(CommandSpec::new(["i-am-not-a-command"])).unwrap_err();
        assert_matches!(err, Error::NoSuchCommand { .. });
    }

    #[test]
    fn nonexistent_cwd_raises_before_command_lookup() {
        let shell = LocalShell::new();
        let err = shell
            .run(CommandSpec::new(["i-am-not-a-command"]).cwd("/some/silly/path"))
            .unwrap_err();
        match err {
            Error::CouldNotChangeDirectory { directory, .. } => {
                assert_eq!(directory, std::path::PathBuf::from("/some/silly/path"));
            }
            other => panic!("expected CouldNotChangeDirectory, got {other:?}"),
        }
    }

    #[test]
    fn env_overlay_is_visible_to_child() {
        let shell = LocalShell::new();
        let result = shell
            .run(CommandSpec::new(["sh", "-c", "echo $NAME"]).env("NAME", "Bob"))
            .unwrap();
        assert_eq!(result.output.as_bytes(), b"Bob\n");
    }

    #[test]
    fn pid_is_reported_only_when_requested() {
        let shell = LocalShell::new();
        let mut process = shell
            .spawn(CommandSpec::new(["sh", "-c", "echo $$"]).store_pid(true))
            .unwrap();
        let result = process.wait_for_result().unwrap();
        let reported: u32 = String::from_utf8_lossy(result.output.as_bytes())
            .trim()
            .parse()
            .unwrap();
        assert_eq!(process.pid(), Some(reported));
    }

    #[test]
    fn signal_delivery_stops_a_long_running_child() {
        let shell = LocalShell::new();
        let mut process = shell
            .spawn(CommandSpec::new(["cat"]).store_pid(true))
            .unwrap();
        assert!(process.is_running().unwrap());
        process.send_signal("TERM").unwrap();
        for _ in 0..100 {
            if !process.is_running().unwrap() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert!(!process.is_running().unwrap());
    }

    #[test]
    fn wait_for_result_is_idempotent() {
        let shell = LocalShell::new();
        let mut process = shell.spawn(CommandSpec::new(["echo", "hi"])).unwrap();
        let first = process.wait_for_result().unwrap();
        let second = process.wait_for_result().unwrap();
        assert_eq!(first, second);
    }
}
