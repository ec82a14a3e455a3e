use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::result::Output;

/// Errors that can occur while spawning, running, or waiting on a process
/// through a [`Shell`](crate::Shell), or while performing file operations on
/// one.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The requested program could not be found.
    ///
    /// The message distinguishes between a program given as a path (which was
    /// looked up directly) and a bare name (which was searched for on
    /// `$PATH`).
    #[error("{}", no_such_command_message(.command))]
    NoSuchCommand {
        /// The command that could not be found, exactly as passed in argv[0].
        command: String,
    },

    /// The working directory requested for the child could not be entered.
    #[error("Could not change directory to: {}\n{detail}", directory.display())]
    CouldNotChangeDirectory {
        /// The directory that could not be entered.
        directory: PathBuf,
        /// Captured stderr/`cd` output explaining why.
        detail: String,
    },

    /// In-band framing emitted by the remote shell could not be parsed as an
    /// integer. Signals an unsupported remote shell.
    #[error(
        "Error while initializing command. The most likely cause is an unsupported shell. \
         Try using a minimal shell type when calling 'spawn' or 'run'.\n\
         (Failed to parse line '{line}' as integer)"
    )]
    CommandInitialization {
        /// The offending line as read from the wire.
        line: String,
    },

    /// The SSH transport or session could not be established.
    #[error("failed to connect to the remote host: {source}")]
    Connection {
        /// The underlying transport/session error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
        /// A captured backtrace-like description for diagnosis.
        traceback: String,
    },

    /// The selected [`ShellType`](crate::ssh::ShellType) cannot implement a
    /// requested option.
    #[error("'{name}' is not supported when using a minimal shell")]
    UnsupportedArgument {
        /// Name of the unsupported option, e.g. `"cwd"`.
        name: &'static str,
    },

    /// The child exited with a nonzero return code and `allow_error` was
    /// false.
    #[error(transparent)]
    Run(#[from] RunProcessError),

    /// An I/O error that does not fit one of the classified cases above
    /// (broken pipe, SFTP open failure, etc).
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Access the connection error's traceback text, if this is a
    /// [`Error::Connection`].
    pub fn original_traceback(&self) -> Option<&str> {
        match self {
            Error::Connection { traceback, .. } => Some(traceback),
            _ => None,
        }
    }
}

fn no_such_command_message(command: &str) -> String {
    if command.contains('/') {
        format!("No such command: {command}")
    } else {
        format!("Command not found: {command}. Check that {command} is installed and on $PATH")
    }
}

/// An [`ExecutionResult`](crate::result::ExecutionResult)-shaped failure,
/// raised when a command exits with a nonzero return code and the caller did
/// not set `allow_error`.
#[derive(Debug, Clone)]
pub struct RunProcessError {
    /// The child's exit code.
    pub return_code: i32,
    /// Captured stdout.
    pub output: Output,
    /// Captured stderr.
    pub stderr_output: Output,
}

impl RunProcessError {
    pub(crate) fn new(return_code: i32, output: Output, stderr_output: Output) -> Self {
        Self {
            return_code,
            output,
            stderr_output,
        }
    }
}

impl fmt::Display for RunProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "return code: {}\noutput: {}\nstderr output: {}",
            self.return_code,
            format_output(&self.output),
            format_output(&self.stderr_output),
        )
    }
}

impl std::error::Error for RunProcessError {}

fn format_output(output: &Output) -> String {
    match output {
        Output::Bytes(b) => format!("b{:?}", ByteStrRepr(b)),
        Output::Text(s) => format!("\n{s}"),
    }
}

/// Renders a byte slice the way Python's `repr(bytes)` would: printable ASCII
/// verbatim, everything else as `\xHH`/`\n`/`\t`/`\r` escapes. `RunProcessError`'s
/// message format is contractual (spec.md §4.1, §8), so this has to match
/// exactly rather than fall back to `{:?}` on `Vec<u8>`, which quotes bytes
/// differently.
struct ByteStrRepr<'a>(&'a [u8]);

impl fmt::Debug for ByteStrRepr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("'")?;
        for &b in self.0 {
            match b {
                b'\n' => f.write_str("\\n")?,
                b'\r' => f.write_str("\\r")?,
                b'\t' => f.write_str("\\t")?,
                b'\'' => f.write_str("\\'")?,
                b'\\' => f.write_str("\\\\")?,
                0x20..=0x7e => f.write_char(b as char)?,
                _ => write!(f, "\\x{b:02x}")?,
            }
        }
        f.write_str("'")
    }
}

use std::fmt::Write as _;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_such_command_with_path_separator() {
        let e = Error::NoSuchCommand {
            command: "bin/i-am-not-a-command".into(),
        };
        assert_eq!(e.to_string(), "No such command: bin/i-am-not-a-command");
    }

    #[test]
    fn no_such_command_on_path() {
        let e = Error::NoSuchCommand {
            command: "i-am-not-a-command".into(),
        };
        assert_eq!(
            e.to_string(),
            "Command not found: i-am-not-a-command. Check that i-am-not-a-command is installed and on $PATH"
        );
    }

    #[test]
    fn run_process_error_message_law() {
        let e = RunProcessError::new(
            1,
            Output::Bytes(b"starting\n".to_vec()),
            Output::Bytes(b"failed!\n".to_vec()),
        );
        assert_eq!(
            e.to_string(),
            "return code: 1\noutput: b'starting\\n'\nstderr output: b'failed!\\n'"
        );
    }

    #[test]
    fn run_process_error_message_with_text_output() {
        let e = RunProcessError::new(
            1,
            Output::Text("starting\n".to_string()),
            Output::Text("failed!\n".to_string()),
        );
        assert_eq!(
            e.to_string(),
            "return code: 1\noutput: \nstarting\n\nstderr output: \nfailed!\n"
        );
    }

    #[test]
    fn could_not_change_directory_message_first_line() {
        let e = Error::CouldNotChangeDirectory {
            directory: PathBuf::from("/some/silly/path"),
            detail: String::new(),
        };
        let msg = e.to_string();
        assert_eq!(
            msg.lines().next().unwrap(),
            "Could not change directory to: /some/silly/path"
        );
    }

    #[test]
    fn command_initialization_message() {
        let e = Error::CommandInitialization { line: "x".into() };
        assert!(e.to_string().contains("Failed to parse line 'x' as integer"));
    }

    #[test]
    fn unsupported_argument_message() {
        let e = Error::UnsupportedArgument { name: "cwd" };
        assert_eq!(
            e.to_string(),
            "'cwd' is not supported when using a minimal shell"
        );
    }
}
