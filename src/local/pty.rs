//! Pseudo-terminal allocation for local processes.
//!
//! Grounded on `examples/other_examples/23f0cda5_zellij-org-zellij__zellij-server-src-os_input_output.rs.rs`,
//! which opens a PTY pair with `nix::pty::openpty` and hands the slave side
//! to the child; mirrors the same approach here instead of the teacher's
//! (which has none — the teacher always talks to a local `ssh` subprocess
//! over plain pipes).

use std::fs::File;
use std::io;
use std::process::Stdio;

use nix::pty::openpty;

/// The two ends of a freshly allocated PTY, ready to be wired into a
/// [`std::process::Command`] and a capture pipeline.
pub(crate) struct Pty {
    pub(crate) child_stdin: Stdio,
    pub(crate) child_stdout: Stdio,
    pub(crate) child_stderr: Stdio,
    pub(crate) master_writer: File,
    pub(crate) master_reader: File,
    /// The parent's last reference to the slave end. Dropping this once the
    /// child has been spawned lets the kernel deliver EOF/EIO to
    /// `master_reader` once the child's own duplicated copies are closed.
    pub(crate) slave_closer: File,
}

pub(crate) fn allocate() -> io::Result<Pty> {
    let pair = openpty(None, None).map_err(nix_to_io)?;
    let master = File::from(pair.master);
    let slave = File::from(pair.slave);

    let master_writer = master.try_clone()?;
    let child_stdin = Stdio::from(slave.try_clone()?);
    let child_stdout = Stdio::from(slave.try_clone()?);
    let child_stderr = Stdio::from(slave.try_clone()?);

    Ok(Pty {
        child_stdin,
        child_stdout,
        child_stderr,
        master_writer,
        master_reader: master,
        slave_closer: slave,
    })
}

fn nix_to_io(e: nix::Error) -> io::Error {
    io::Error::from_raw_os_error(e as i32)
}
