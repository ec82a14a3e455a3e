//! One shell abstraction for running commands, locally or over SSH.
//!
//! `dualshell` gives you a single [`Shell`] handle that runs commands either
//! on the local machine or on a remote host reached over SSH, with the same
//! [`spawn`](Shell::spawn)/[`run`](Shell::run) surface either way. The
//! motivating case is a script, deploy tool, or test harness that needs to
//! treat "run this command" as one operation regardless of where it
//! happens — the kind of code that otherwise ends up with a `local` and a
//! `remote` branch of near-duplicate logic at every call site.
//!
//! # Running a command
//!
//! ```rust,no_run
//! use dualshell::{Shell, CommandSpec};
//!
//! let shell = Shell::local();
//! let result = shell.run(CommandSpec::new(["echo", "hello"]))?;
//! assert_eq!(result.output.as_bytes(), b"hello\n");
//! # Ok::<(), dualshell::Error>(())
//! ```
//!
//! The same code runs against a remote host by building an
//! [`ssh::SshShellBuilder`] instead:
//!
//! ```rust,no_run
//! # #[cfg(feature = "ssh")]
//! # fn main() -> Result<(), dualshell::Error> {
//! use dualshell::{Shell, CommandSpec};
//! use dualshell::ssh::SshShellBuilder;
//!
//! let shell = Shell::ssh(SshShellBuilder::new("example.com", "me").build());
//! let result = shell.run(CommandSpec::new(["whoami"]))?;
//! # Ok(()) }
//! # #[cfg(not(feature = "ssh"))]
//! # fn main() {}
//! ```
//!
//! # Process lifetime and cleanup
//!
//! Every spawned [`process::Process`] is tracked by a process-global
//! registry for the lifetime of the program: if the process that spawned it
//! exits (normally or via panic unwinding to `main`) while a child is still
//! running, the registry kills it rather than letting it leak as an orphan.
//! This mirrors the cleanup guarantee
//! `examples/original_source/spur/_child.py`'s process registry makes for
//! the library this crate's interface is modeled on.
//!
//! # Remote shell compatibility
//!
//! Running a command over SSH means handing a composite shell command to
//! whatever shell the remote user account is configured with. Most of what
//! [`CommandSpec`] offers (`cwd`, environment overlay, `store_pid`) is
//! implemented by wrapping the user's command in a small prelude that a
//! POSIX `sh`-compatible shell understands. If the remote shell is unusual
//! enough not to support this (a restricted shell, `csh`, etc.), select
//! [`ssh::ShellType::Minimal`] via [`ssh::SshShellBuilder::shell_type`],
//! which skips the prelude and rejects the options it depends on.
//!
//! # Feature flags
//!
//! - `ssh` (default): the SSH backend ([`ssh`] module), built on the `ssh2`
//!   crate (libssh2 bindings).
//! - `config` (default): [`config::SshConfig`], a TOML-deserializable
//!   convenience layer over [`ssh::SshShellBuilder`].

#![warn(
    missing_docs,
    missing_debug_implementations,
    rustdoc::broken_intra_doc_links,
    rust_2018_idioms,
    unreachable_pub
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(not(unix))]
compile_error!("This crate can only be used on unix");

mod error;
pub use error::Error;

mod result;
pub use result::{ExecutionResult, Output};

mod escape;

mod io;

mod spec;
pub use spec::CommandSpec;

pub mod process;
pub use process::Process;

mod registry;

mod local;
pub use local::{LocalProcess, LocalShell};

#[cfg(feature = "ssh")]
#[cfg_attr(docsrs, doc(cfg(feature = "ssh")))]
pub mod ssh;

mod shell;
pub use shell::{ScopedTemporaryDir, Shell, ShellProcess};

mod files;
pub use files::FileOperations;

#[cfg(feature = "config")]
#[cfg_attr(docsrs, doc(cfg(feature = "config")))]
mod config;
#[cfg(feature = "config")]
pub use config::SshConfig;
