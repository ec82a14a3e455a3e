use crate::error::{Error, RunProcessError};

/// Captured process output: raw bytes, or decoded text if the caller
/// requested an `encoding` on the [`CommandSpec`](crate::spec::CommandSpec).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Raw captured bytes (no `encoding` was requested).
    Bytes(Vec<u8>),
    /// Captured bytes decoded as UTF-8 text.
    Text(String),
}

impl Output {
    /// Borrow the output as raw bytes, regardless of which variant it is.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Output::Bytes(b) => b,
            Output::Text(s) => s.as_bytes(),
        }
    }

    /// `true` if this is the decoded-text variant.
    pub fn is_text(&self) -> bool {
        matches!(self, Output::Text(_))
    }
}

/// The outcome of a finished process: exit code plus captured stdout/stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// The child's exit code.
    pub return_code: i32,
    /// Captured stdout.
    pub output: Output,
    /// Captured stderr.
    pub stderr_output: Output,
}

impl ExecutionResult {
    fn to_error(&self) -> RunProcessError {
        RunProcessError::new(
            self.return_code,
            self.output.clone(),
            self.stderr_output.clone(),
        )
    }
}

/// Build an [`ExecutionResult`] from a finished child's raw exit data,
/// raising [`Error::Run`] unless the exit code is zero or the caller opted
/// in to nonzero exits via `allow_error`.
pub(crate) fn result(
    return_code: i32,
    allow_error: bool,
    output: Output,
    stderr_output: Output,
) -> Result<ExecutionResult, Error> {
    let result = ExecutionResult {
        return_code,
        output,
        stderr_output,
    };
    if return_code == 0 || allow_error {
        Ok(result)
    } else {
        Err(Error::Run(result.to_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_exit_is_ok_even_without_allow_error() {
        let r = result(0, false, Output::Bytes(vec![]), Output::Bytes(vec![])).unwrap();
        assert_eq!(r.return_code, 0);
    }

    #[test]
    fn nonzero_exit_raises_unless_allowed() {
        let err = result(1, false, Output::Bytes(vec![]), Output::Bytes(vec![])).unwrap_err();
        assert!(matches!(err, Error::Run(_)));

        let ok = result(1, true, Output::Bytes(vec![]), Output::Bytes(vec![])).unwrap();
        assert_eq!(ok.return_code, 1);
    }
}
