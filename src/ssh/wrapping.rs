//! Builds the single composite command string an SSH session channel
//! executes, and parses the in-band framing it streams back on stdout
//! before the user program's own output begins.
//!
//! Grounded on `examples/original_source/spur/ssh.py`'s
//! `_ShellTypeSh`/`_ShellTypeMinimal` classes and `_generate_run_command` /
//! `_process_stdout`, restated as a value-typed `ShellType` per spec.md §9
//! ("a value, not a subclass").

use std::collections::HashMap;
use std::io::{self, Read};
use std::path::Path;

use crate::error::Error;
use crate::escape::quote_posix;

/// Which remote shell flavor frames the wrapped command.
///
/// `minimal` performs no wrapping at all and rejects any option that would
/// require it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellType {
    /// The default: full framing support (`sh`-compatible).
    Sh,
    /// No framing; only the bare `exec` of the program. Rejects
    /// `store_pid`, `cwd`, a non-empty environment overlay, and
    /// `new_process_group`.
    Minimal,
}

impl Default for ShellType {
    fn default() -> Self {
        ShellType::Sh
    }
}

impl ShellType {
    pub(crate) fn supports_which(self) -> bool {
        matches!(self, ShellType::Sh)
    }

    /// Build the composite command string to execute over the session
    /// channel.
    pub(crate) fn generate_run_command(
        self,
        argv: &[String],
        store_pid: bool,
        cwd: Option<&Path>,
        update_env: &HashMap<String, String>,
        new_process_group: bool,
    ) -> Result<String, Error> {
        if self == ShellType::Minimal {
            if store_pid {
                return Err(Error::UnsupportedArgument { name: "store_pid" });
            }
            if cwd.is_some() {
                return Err(Error::UnsupportedArgument { name: "cwd" });
            }
            if !update_env.is_empty() {
                return Err(Error::UnsupportedArgument { name: "update_env" });
            }
            if new_process_group {
                return Err(Error::UnsupportedArgument {
                    name: "new_process_group",
                });
            }
            return Ok(exec_clause(argv, false));
        }

        let mut parts = Vec::new();
        if store_pid {
            parts.push("echo $$".to_string());
        }
        if let Some(cwd) = cwd {
            let quoted = quote_posix(&cwd.display().to_string());
            parts.push(format!("cd {quoted} 2>&1 || {{ echo '\\n'spur-cd: $?; exit 1; }}"));
            parts.push("echo '\\n'spur-cd: 0".to_string());
        }
        for (key, value) in update_env {
            parts.push(format!("export {key}={}", quote_posix(value)));
        }
        if self.supports_which() {
            let program = quote_posix(&argv[0]);
            parts.push(format!(
                "{{ {{ command -v {program}; }} || {{ which {program}; }}; }} && echo 0; }} || {{ echo $?; exit 1; }}"
            ));
        }
        parts.push(exec_clause(argv, new_process_group));
        Ok(parts.join("; "))
    }
}

fn exec_clause(argv: &[String], new_process_group: bool) -> String {
    let quoted = argv.iter().map(|a| quote_posix(a)).collect::<Vec<_>>().join(" ");
    if new_process_group {
        format!("setsid exec {quoted}")
    } else {
        format!("exec {quoted}")
    }
}

/// Read one byte at a time until a `\n` or EOF, returning what was read
/// (terminator included). Framing must never read ahead of its own lines —
/// whatever comes after belongs to the user program's stdout, which a
/// buffered reader would swallow into its internal buffer and lose once
/// discarded.
fn read_line_unbuffered<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte)? {
            0 => break,
            _ => {
                buf.push(byte[0]);
                if byte[0] == b'\n' {
                    break;
                }
            }
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Read lines, skipping blank ones, until a non-blank line is found; parse
/// it as an integer. Used for both the PID line and the which-check's
/// return-code line, which share the same "unsupported shell" failure mode.
pub(crate) fn read_int_initialization_line<R: Read>(reader: &mut R) -> Result<i64, Error> {
    loop {
        let line = read_line_unbuffered(reader)?;
        if line.is_empty() {
            return Err(Error::CommandInitialization { line: String::new() });
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        return trimmed
            .parse::<i64>()
            .map_err(|_| Error::CommandInitialization {
                line: trimmed.to_string(),
            });
    }
}

fn read_cwd_result<R: Read>(reader: &mut R, cwd: &Path) -> Result<(), Error> {
    let mut captured = String::new();
    loop {
        let line = read_line_unbuffered(reader)?;
        if line.is_empty() || line.starts_with("spur-cd: ") {
            let code = line.strip_prefix("spur-cd: ").unwrap_or("").trim();
            if code == "0" {
                return Ok(());
            }
            return Err(Error::CouldNotChangeDirectory {
                directory: cwd.to_path_buf(),
                detail: captured,
            });
        }
        captured.push_str(&line);
    }
}

fn read_which_result<R: Read>(reader: &mut R, argv0: &str) -> Result<(), Error> {
    let code = read_int_initialization_line(reader)?;
    if code != 0 {
        return Err(Error::NoSuchCommand {
            command: argv0.to_string(),
        });
    }
    Ok(())
}

/// Consume the in-band framing for one wrapped command, in the order it was
/// emitted by [`ShellType::generate_run_command`]: PID, then cwd result,
/// then which-check result. Returns the child's PID if `store_pid` was set.
pub(crate) fn consume_framing<R: Read>(
    reader: &mut R,
    store_pid: bool,
    cwd: Option<&Path>,
    supports_which: bool,
    argv0: &str,
) -> Result<Option<u32>, Error> {
    let pid = if store_pid {
        Some(read_int_initialization_line(reader)? as u32)
    } else {
        None
    };
    if let Some(cwd) = cwd {
        read_cwd_result(reader, cwd)?;
    }
    if supports_which {
        read_which_result(reader, argv0)?;
    }
    Ok(pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Cursor;

    fn argv(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn sh_minimal_command_is_just_exec() {
        let cmd = ShellType::Sh
            .generate_run_command(&argv(&["echo", "hi"]), false, None, &HashMap::new(), false)
            .unwrap();
        assert_eq!(cmd, "exec 'echo' 'hi'");
    }

    #[test]
    fn sh_with_store_pid_and_cwd() {
        let cmd = ShellType::Sh
            .generate_run_command(
                &argv(&["pwd"]),
                true,
                Some(Path::new("/tmp")),
                &HashMap::new(),
                false,
            )
            .unwrap();
        assert_eq!(
            cmd,
            "echo $$; cd '/tmp' 2>&1 || { echo '\\n'spur-cd: $?; exit 1; }; echo '\\n'spur-cd: 0; \
             { { command -v 'pwd'; } || { which 'pwd'; }; } && echo 0; } || { echo $?; exit 1; }; exec 'pwd'"
        );
    }

    #[test]
    fn sh_with_new_process_group_uses_setsid() {
        let cmd = ShellType::Sh
            .generate_run_command(&argv(&["cat"]), false, None, &HashMap::new(), true)
            .unwrap();
        assert!(cmd.ends_with("setsid exec 'cat'"));
    }

    #[test]
    fn minimal_rejects_store_pid() {
        let err = ShellType::Minimal
            .generate_run_command(&argv(&["echo"]), true, None, &HashMap::new(), false)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "'store_pid' is not supported when using a minimal shell"
        );
    }

    #[test]
    fn minimal_accepts_empty_update_env() {
        let cmd = ShellType::Minimal
            .generate_run_command(&argv(&["echo", "hi"]), false, None, &HashMap::new(), false)
            .unwrap();
        assert_eq!(cmd, "exec 'echo' 'hi'");
    }

    #[test]
    fn minimal_rejects_new_process_group() {
        let err = ShellType::Minimal
            .generate_run_command(&argv(&["echo"]), false, None, &HashMap::new(), true)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "'new_process_group' is not supported when using a minimal shell"
        );
    }

    #[test]
    fn read_int_initialization_line_skips_blank_lines() {
        let mut reader = Cursor::new(b"\n \n\t\t\n42\n".to_vec());
        assert_eq!(read_int_initialization_line(&mut reader).unwrap(), 42);
    }

    #[test]
    fn read_int_initialization_line_plain() {
        let mut reader = Cursor::new(b"42\n".to_vec());
        assert_eq!(read_int_initialization_line(&mut reader).unwrap(), 42);
    }

    #[test]
    fn read_int_initialization_line_rejects_non_integer() {
        let mut reader = Cursor::new(b"x\n".to_vec());
        let err = read_int_initialization_line(&mut reader).unwrap_err();
        assert!(err.to_string().contains("Failed to parse line 'x' as integer"));
    }

    #[test]
    fn read_cwd_result_success() {
        let mut reader = Cursor::new(b"spur-cd: 0\nrest of output\n".to_vec());
        read_cwd_result(&mut reader, Path::new("/tmp")).unwrap();
        let mut remainder = String::new();
        reader.read_to_string(&mut remainder).unwrap();
        assert_eq!(remainder, "rest of output\n");
    }

    #[test]
    fn read_cwd_result_failure_captures_detail() {
        let mut reader = Cursor::new(b"no such file or directory\nspur-cd: 1\n".to_vec());
        let err = read_cwd_result(&mut reader, Path::new("/nope")).unwrap_err();
        match err {
            Error::CouldNotChangeDirectory { directory, detail } => {
                assert_eq!(directory, Path::new("/nope"));
                assert_eq!(detail, "no such file or directory\n");
            }
            other => panic!("expected CouldNotChangeDirectory, got {other:?}"),
        }
    }

    #[test]
    fn read_which_result_nonzero_raises_no_such_command() {
        let mut reader = Cursor::new(b"1\n".to_vec());
        let err = read_which_result(&mut reader, "i-am-not-a-command").unwrap_err();
        assert_matches!(err, Error::NoSuchCommand { .. });
    }
}
