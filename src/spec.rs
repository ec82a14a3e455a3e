//! The argument bag shared by every backend's `spawn`/`run`: what to launch,
//! in which directory, with which environment overlay, and how its output
//! should be captured.
//!
//! Grounded on `examples/original_source/spur/__init__.py`'s `spawn`/`run`
//! keyword arguments, restated as a builder in the style of the teacher's
//! `openssh::SessionBuilder` (`src/builder.rs` in the original crate).

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

/// A command plus the options that control how it is launched and captured.
///
/// Built with the `with_*` methods, then handed to
/// [`Shell::spawn`](crate::shell::Shell::spawn) or
/// [`Shell::run`](crate::shell::Shell::run).
pub struct CommandSpec {
    pub(crate) argv: Vec<String>,
    pub(crate) cwd: Option<PathBuf>,
    pub(crate) update_env: HashMap<String, String>,
    pub(crate) store_pid: bool,
    pub(crate) use_pty: bool,
    pub(crate) new_process_group: bool,
    pub(crate) allow_error: bool,
    pub(crate) encoding_utf8: bool,
    pub(crate) stdout_sink: Option<Box<dyn Write + Send>>,
    pub(crate) stderr_sink: Option<Box<dyn Write + Send>>,
}

impl CommandSpec {
    /// Start a command spec for `argv[0] argv[1..]`. `argv` must not be
    /// empty.
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv: Vec<String> = argv.into_iter().map(Into::into).collect();
        assert!(!argv.is_empty(), "CommandSpec requires a non-empty argv");
        Self {
            argv,
            cwd: None,
            update_env: HashMap::new(),
            store_pid: false,
            use_pty: false,
            new_process_group: false,
            allow_error: false,
            encoding_utf8: false,
            stdout_sink: None,
            stderr_sink: None,
        }
    }

    /// Run the command in `cwd` instead of the shell's default directory.
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Overlay `key=value` onto the child's environment, on top of whatever
    /// the shell normally provides.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.update_env.insert(key.into(), value.into());
        self
    }

    /// Overlay every entry of `vars` onto the child's environment.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self.update_env.insert(k.into(), v.into());
        }
        self
    }

    /// Record the child's PID so it is reported by
    /// [`Process::pid`](crate::process::Process::pid).
    pub fn store_pid(mut self, store_pid: bool) -> Self {
        self.store_pid = store_pid;
        self
    }

    /// Allocate a pseudo-terminal for the child instead of plain pipes.
    pub fn use_pty(mut self, use_pty: bool) -> Self {
        self.use_pty = use_pty;
        self
    }

    /// Place the child in a new process group, so that
    /// [`Process::send_signal`](crate::process::Process::send_signal) can
    /// reach its whole subtree.
    pub fn new_process_group(mut self, new_process_group: bool) -> Self {
        self.new_process_group = new_process_group;
        self
    }

    /// Do not raise [`Error::Run`](crate::error::Error::Run) for a nonzero
    /// exit code; return the [`ExecutionResult`](crate::result::ExecutionResult)
    /// as-is instead.
    pub fn allow_error(mut self, allow_error: bool) -> Self {
        self.allow_error = allow_error;
        self
    }

    /// Decode captured stdout/stderr as UTF-8 text instead of returning raw
    /// bytes.
    pub fn encoding_utf8(mut self, encoding_utf8: bool) -> Self {
        self.encoding_utf8 = encoding_utf8;
        self
    }

    /// Tee captured stdout to `sink` as it arrives, in addition to buffering
    /// it for the final result.
    pub fn stdout_sink(mut self, sink: impl Write + Send + 'static) -> Self {
        self.stdout_sink = Some(Box::new(sink));
        self
    }

    /// Tee captured stderr to `sink` as it arrives, in addition to buffering
    /// it for the final result.
    pub fn stderr_sink(mut self, sink: impl Write + Send + 'static) -> Self {
        self.stderr_sink = Some(Box::new(sink));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let spec = CommandSpec::new(["echo", "hi"]);
        assert_eq!(spec.argv, vec!["echo".to_string(), "hi".to_string()]);
        assert!(spec.cwd.is_none());
        assert!(!spec.store_pid);
        assert!(!spec.use_pty);
        assert!(!spec.allow_error);
    }

    #[test]
    #[should_panic(expected = "non-empty argv")]
    fn empty_argv_panics() {
        let empty: Vec<String> = Vec::new();
        CommandSpec::new(empty);
    }

    #[test]
    fn env_overlay_accumulates() {
        let spec = CommandSpec::new(["x"]).env("A", "1").env("B", "2");
        assert_eq!(spec.update_env.get("A").map(String::as_str), Some("1"));
        assert_eq!(spec.update_env.get("B").map(String::as_str), Some("2"));
    }
}
