//! Process-wide registry of live children, drained at process exit.
//!
//! Grounded on `examples/original_source/spur/local.py`'s
//! `_run_cleanup_commands`/`atexit` wiring (itself re-derived in
//! `spur/ssh.py`) and restated with the host-language primitives named in
//! spec.md §9: a lazily-initialized module-scope singleton guarded by a
//! re-entrant lock, and a libc `atexit` hook. `parking_lot` is already part
//! of the teacher's dependency stack (pulled in by its `sftp` feature), so
//! its `ReentrantMutex` covers the re-entrancy requirement (a cleanup command
//! may itself spawn a child that registers here) without adding a crate the
//! teacher didn't already carry.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;
use parking_lot::ReentrantMutex;

use crate::error::Error;
use crate::process::Process;
use crate::result::ExecutionResult;

/// Runs a second command through the shell that owns a registered process,
/// to tear the child down gracefully before falling back to `SIGKILL`.
pub(crate) type CleanupCommand = Box<dyn Fn() -> Result<ExecutionResult, Error> + Send + Sync>;

struct Entry {
    process: Arc<Mutex<dyn Process>>,
    cleanup: Option<CleanupCommand>,
    killed: Arc<AtomicBool>,
}

type Registry = ReentrantMutex<RefCell<Vec<Entry>>>;

static REGISTRY: OnceCell<Registry> = OnceCell::new();
static ATEXIT_INSTALLED: OnceCell<()> = OnceCell::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| ReentrantMutex::new(RefCell::new(Vec::new())))
}

/// How long the watchdog sleeps between `is_running` polls. Short enough that
/// a caller blocked on the same mutex (`send_signal`, `stdin_write`, ...)
/// never waits long for its turn.
const WATCHDOG_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(50);

/// Register a spawned process for forced cleanup at process exit, spawning a
/// watchdog thread that force-exits the host process if the child's
/// `wait_for_result` raises in the background. Returns the shared "killed by
/// us" flag the watchdog consults before treating a `wait_for_result` error
/// as fatal.
pub(crate) fn register(
    process: Arc<Mutex<dyn Process>>,
    cleanup: Option<CleanupCommand>,
) -> Arc<AtomicBool> {
    install_atexit();

    let killed = Arc::new(AtomicBool::new(false));
    {
        let guard = registry().lock();
        guard.borrow_mut().push(Entry {
            process: Arc::clone(&process),
            cleanup,
            killed: Arc::clone(&killed),
        });
    }

    let watchdog_process = Arc::clone(&process);
    let watchdog_killed = Arc::clone(&killed);
    std::thread::spawn(move || {
        // Poll rather than blocking inside `wait_for_result`: holding the
        // process-state mutex across a blocking wait would starve every
        // other `Process` method (`send_signal`, `stdin_write`, ...) that a
        // caller needs to run to make the child exit in the first place.
        loop {
            let running = {
                let mut p = watchdog_process.lock().unwrap_or_else(|e| e.into_inner());
                p.is_running()
            };
            match running {
                Ok(true) => std::thread::sleep(WATCHDOG_POLL_INTERVAL),
                Ok(false) | Err(_) => break,
            }
        }

        let result = {
            let mut p = watchdog_process.lock().unwrap_or_else(|e| e.into_inner());
            p.wait_for_result()
        };
        if result.is_err() && !watchdog_killed.load(Ordering::SeqCst) {
            eprintln!(
                "dualshell: background wait_for_result failed for an unsupervised child:\n{}",
                result.unwrap_err()
            );
            drain();
            std::process::exit(1);
        }
    });

    killed
}

fn install_atexit() {
    ATEXIT_INSTALLED.get_or_init(|| {
        // SAFETY: `atexit` requires a plain `extern "C" fn()`, registered
        // once; `run_atexit_hook` takes no captures and only touches the
        // registry's own static state.
        unsafe {
            libc::atexit(run_atexit_hook);
        }
    });
}

extern "C" fn run_atexit_hook() {
    drain();
}

/// Send a termination signal to every still-running registered child. If an
/// entry carries a cleanup command, try that first; a failed cleanup command
/// escalates to `SIGKILL` plus a diagnostic and a hard process exit, matching
/// the source's "don't let a half-torn-down child linger" posture.
pub(crate) fn drain() {
    let guard = registry().lock();
    let entries = std::mem::take(&mut *guard.borrow_mut());
    drop(guard);

    for entry in entries {
        let mut process = entry.process.lock().unwrap_or_else(|e| e.into_inner());
        let running = process.is_running().unwrap_or(false);
        if !running {
            continue;
        }

        if let Some(cleanup) = &entry.cleanup {
            if let Err(e) = cleanup() {
                entry.killed.store(true, Ordering::SeqCst);
                let _ = process.send_signal("KILL");
                eprintln!("dualshell: cleanup command failed while tearing down a child:\n{e}");
                drop(process);
                drain();
                std::process::exit(1);
            }
            entry.killed.store(true, Ordering::SeqCst);
        } else {
            entry.killed.store(true, Ordering::SeqCst);
            let _ = process.send_signal("KILL");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::Output;

    struct FakeProcess {
        running: bool,
        signals: Vec<String>,
    }

    impl Process for FakeProcess {
        fn is_running(&mut self) -> Result<bool, Error> {
            Ok(self.running)
        }
        fn stdin_write(&mut self, _data: &[u8]) -> Result<(), Error> {
            Ok(())
        }
        fn send_signal(&mut self, signal_name: &str) -> Result<(), Error> {
            self.signals.push(signal_name.to_string());
            self.running = false;
            Ok(())
        }
        fn wait_for_result(&mut self) -> Result<ExecutionResult, Error> {
            Ok(ExecutionResult {
                return_code: 0,
                output: Output::Bytes(vec![]),
                stderr_output: Output::Bytes(vec![]),
            })
        }
    }

    #[test]
    fn drain_kills_running_children_without_cleanup() {
        let process: Arc<Mutex<dyn Process>> = Arc::new(Mutex::new(FakeProcess {
            running: true,
            signals: Vec::new(),
        }));
        let killed = register(Arc::clone(&process), None);
        drain();
        assert!(killed.load(Ordering::SeqCst));
        let p = process.lock().unwrap();
        assert_eq!(p.signals, vec!["KILL".to_string()]);
    }

    #[test]
    fn drain_skips_already_finished_children() {
        let process: Arc<Mutex<dyn Process>> = Arc::new(Mutex::new(FakeProcess {
            running: false,
            signals: Vec::new(),
        }));
        register(Arc::clone(&process), None);
        drain();
        let p = process.lock().unwrap();
        assert!(p.signals.is_empty());
    }
}
