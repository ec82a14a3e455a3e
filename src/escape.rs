//! POSIX single-quote escaping for the SSH command-wrapping protocol.
//!
//! Unlike [`shell-escape`](https://crates.io/crates/shell-escape), which skips
//! quoting for "safe" words, every argument that crosses into the wrapped
//! remote command is quoted unconditionally: the wrapper has to be able to
//! tell where one argument ends and the next begins even when a caller passes
//! something that happens to look shell-safe today but isn't tomorrow.

/// Wrap `s` in single quotes, escaping any embedded single quote as `'\''`.
pub(crate) fn quote_posix(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_word_still_gets_quoted() {
        assert_eq!(quote_posix("hello"), "'hello'");
    }

    #[test]
    fn empty_string() {
        assert_eq!(quote_posix(""), "''");
    }

    #[test]
    fn embedded_single_quote() {
        assert_eq!(quote_posix("it's"), "'it'\\''s'");
    }

    #[test]
    fn whitespace_and_dollar() {
        assert_eq!(quote_posix("$HOME dir"), "'$HOME dir'");
    }
}
