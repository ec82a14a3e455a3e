//! Connection parameters for an [`SshShell`](crate::ssh::SshShell).
//!
//! Grounded on `examples/other_examples/b0475f9c_mark-i-m-spurs__src-ssh.rs.rs`'s
//! `SshShell::with_key` constructor for the parameter set, widened to match
//! spec.md §6's full SSH parameter list (host-key policy, optional
//! pre-connected socket, connect timeout), and on the teacher's
//! `src/builder.rs` for the builder shape (`SessionBuilder`).

use std::net::TcpStream;
use std::path::PathBuf;
use std::time::Duration;

use crate::ssh::wrapping::ShellType;
use crate::ssh::SshShell;

/// How to treat a remote host key that isn't already known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Refuse the connection (default).
    Raise,
    /// Log a warning but proceed.
    Warn,
    /// Accept any host key without checking it.
    AcceptBlind,
    /// Accept the host key and remember it for next time.
    AutoAdd,
}

impl Default for HostKeyPolicy {
    fn default() -> Self {
        HostKeyPolicy::Raise
    }
}

/// Builds an [`SshShell`]. Connection is established lazily, on the shell's
/// first spawn, not when this builder finishes.
pub struct SshShellBuilder {
    pub(crate) hostname: String,
    pub(crate) port: u16,
    pub(crate) username: String,
    pub(crate) password: Option<String>,
    pub(crate) private_key_file: Option<PathBuf>,
    pub(crate) look_for_keys: bool,
    pub(crate) load_system_host_keys: bool,
    pub(crate) connect_timeout: Duration,
    pub(crate) host_key_policy: HostKeyPolicy,
    pub(crate) shell_type: ShellType,
    pub(crate) socket: Option<TcpStream>,
}

impl SshShellBuilder {
    /// Start building a shell to `username@hostname`, port 22 by default.
    pub fn new(hostname: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port: 22,
            username: username.into(),
            password: None,
            private_key_file: None,
            look_for_keys: true,
            load_system_host_keys: true,
            connect_timeout: Duration::from_secs(60),
            host_key_policy: HostKeyPolicy::default(),
            shell_type: ShellType::default(),
            socket: None,
        }
    }

    /// Override the default port (22).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Authenticate with a password in addition to, or instead of, a key.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Authenticate with the private key at `path`.
    pub fn private_key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key_file = Some(path.into());
        self
    }

    /// Whether to try keys from the running `ssh-agent` (default `true`).
    pub fn look_for_keys(mut self, look_for_keys: bool) -> Self {
        self.look_for_keys = look_for_keys;
        self
    }

    /// Whether to load `~/.ssh/known_hosts` (default `true`).
    pub fn load_system_host_keys(mut self, load: bool) -> Self {
        self.load_system_host_keys = load;
        self
    }

    /// Override the default 60s TCP connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// How to treat an unknown host key.
    pub fn host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }

    /// The remote shell's command-wrapping flavor (default [`ShellType::Sh`]).
    pub fn shell_type(mut self, shell_type: ShellType) -> Self {
        self.shell_type = shell_type;
        self
    }

    /// Use an already-connected `TcpStream` instead of dialing `hostname:port`
    /// when the shell first connects.
    pub fn socket(mut self, socket: TcpStream) -> Self {
        self.socket = Some(socket);
        self
    }

    /// Build the shell. No network activity happens here; the first spawn
    /// establishes the connection.
    pub fn build(self) -> SshShell {
        SshShell::from_builder(self)
    }
}
