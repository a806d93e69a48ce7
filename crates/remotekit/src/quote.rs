//! POSIX shell quoting for remote command lines.

/// Escape a value for use inside single quotes.
///
/// `'` becomes `'\''`: close the quote, an escaped quote, reopen.
#[must_use]
pub fn escape_single_quoted(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// Quote a path. Always quoted, so the result is safe next to `&&` and `;`.
#[must_use]
pub fn quote_path(path: &str) -> String {
    format!("'{}'", escape_single_quoted(path))
}

/// Prefix `command` with a change of directory.
///
/// No part of the command runs when the directory is missing, even for
/// compound commands joined with `;`, `||`, `&` or newlines.
#[must_use]
pub fn in_dir(dir: &str, command: &str) -> String {
    format!("cd {} || exit 1\n{command}", quote_path(dir))
}
