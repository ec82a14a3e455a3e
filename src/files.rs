//! File operations layered purely on top of [`Shell::run`](crate::shell::Shell::run) —
//! no backend-specific code here, so they work identically on the local and
//! SSH shells.
//!
//! Grounded on `examples/original_source/spur/files.py`'s `FileOperations`
//! (`copy_file`, `resolve_filename`, `write_file`).

use std::path::Path;

use crate::error::Error;
use crate::shell::Shell;
use crate::spec::CommandSpec;

/// `cp`/`write`-style convenience operations bound to a [`Shell`].
pub struct FileOperations<'a> {
    shell: &'a Shell,
}

impl<'a> FileOperations<'a> {
    pub(crate) fn new(shell: &'a Shell) -> Self {
        Self { shell }
    }

    /// Copy `source` to `dest` on the shell's host. If `dest` names an
    /// existing directory, the source's basename is appended (matching `cp`).
    pub fn copy_file(&self, source: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<(), Error> {
        let source = source.as_ref();
        let dest = self.resolve_filename(dest.as_ref(), source)?;
        self.shell
            .run(CommandSpec::new([
                "cp".to_string(),
                source.display().to_string(),
                dest.display().to_string(),
            ]))
            .map(|_| ())
    }

    /// If `dest` is an existing directory, return `dest/source.file_name()`;
    /// otherwise return `dest` unchanged.
    fn resolve_filename(&self, dest: &Path, source: &Path) -> Result<std::path::PathBuf, Error> {
        let is_dir = self
            .shell
            .run(
                CommandSpec::new([
                    "test".to_string(),
                    "-d".to_string(),
                    dest.display().to_string(),
                ])
                .allow_error(true),
            )?
            .return_code
            == 0;
        if is_dir {
            let name = source
                .file_name()
                .ok_or_else(|| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, "source has no file name")))?;
            Ok(dest.join(name))
        } else {
            Ok(dest.to_path_buf())
        }
    }

    /// Write `contents` to `path` on the shell's host, via `tee`.
    pub fn write_file(&self, path: impl AsRef<Path>, contents: &[u8]) -> Result<(), Error> {
        use crate::process::Process;

        let path = path.as_ref();
        let mut process = self.shell.spawn(
            CommandSpec::new(["tee".to_string(), path.display().to_string()])
                .stdout_sink(std::io::sink()),
        )?;
        process.stdin_write(contents)?;
        process.close_stdin()?;
        process.wait_for_result()?;
        Ok(())
    }
}
