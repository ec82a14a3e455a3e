//! The contract a running child satisfies, regardless of whether it lives on
//! the local machine or at the far end of an SSH channel.
//!
//! Grounded on `examples/original_source/spur/local.py`'s `LocalProcess` and
//! `spur/ssh.py`'s `SshProcess`, which both implement the same surface
//! (`is_running`, `send_signal`, `wait_for_result`, `stdin_write`) against
//! different transports; restated here as a trait so [`Shell`](crate::shell::Shell)
//! can hold either behind one handle.

use crate::error::Error;
use crate::result::ExecutionResult;

/// A spawned, possibly still-running child process.
///
/// Non-goal: there is no streaming timeout on [`wait_for_result`] — callers
/// that need a deadline should race it externally (e.g. with a watchdog
/// thread that calls [`send_signal`]).
///
/// [`wait_for_result`]: Process::wait_for_result
/// [`send_signal`]: Process::send_signal
pub trait Process: Send {
    /// `true` if the child has not yet exited.
    fn is_running(&mut self) -> Result<bool, Error>;

    /// Write `data` to the child's stdin.
    fn stdin_write(&mut self, data: &[u8]) -> Result<(), Error>;

    /// Send a POSIX signal, by name (`"TERM"`, `"KILL"`, `"HUP"`, ...), to the
    /// child. If the command was spawned with `new_process_group(true)`, the
    /// signal reaches the whole process group instead of just the leader.
    fn send_signal(&mut self, signal_name: &str) -> Result<(), Error>;

    /// Close the child's stdin, signaling EOF. Needed by anything reading
    /// its own stdin to completion (`tee`, `cat`, ...) before it will exit.
    fn close_stdin(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Block until the child exits, then return its captured result. Safe to
    /// call more than once; subsequent calls return the same result.
    fn wait_for_result(&mut self) -> Result<ExecutionResult, Error>;

    /// The child's PID, if it was spawned with `store_pid(true)`.
    fn pid(&self) -> Option<u32> {
        None
    }
}
