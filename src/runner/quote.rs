//! Shell quoting for values interpolated into command strings.
//!
//! Branch names arrive from webhook payloads, so every value that ends up in
//! a command string passes through [`quote`] first.

use std::borrow::Cow;
use std::path::Path;

use shell_escape::unix::escape;

/// Quote a string for safe use as a single shell word.
pub fn quote(value: &str) -> String {
    escape(Cow::Borrowed(value)).into_owned()
}

/// Quote a path for safe use as a single shell word.
pub fn quote_path(path: &Path) -> String {
    quote(&path.to_string_lossy())
}

/// Build a command that writes `contents` to `path` verbatim.
pub fn write_file_command(path: &Path, contents: &str) -> String {
    format!("printf '%s' {} > {}", quote(contents), quote_path(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_word_is_unchanged() {
        assert_eq!(quote("feature-x"), "feature-x");
    }

    #[test]
    fn test_metacharacters_are_quoted() {
        let quoted = quote("x; rm -rf /");
        assert!(quoted.starts_with('\''));
        assert!(quoted.ends_with('\''));
    }

    #[test]
    fn test_single_quote_is_escaped() {
        let quoted = quote("it's");
        assert_ne!(quoted, "'it's'");
        assert!(quoted.contains("\\'"));
    }

    #[test]
    fn test_path_with_spaces() {
        assert_eq!(quote_path(Path::new("/tmp/a b")), "'/tmp/a b'");
    }

    #[tokio::test]
    async fn test_write_file_command_round_trips_through_sh() {
        use crate::runner::{CommandRunner, ShellRunner};
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("robots.txt");
        let contents = "User-agent: *\nDisallow: /\n$uri 'quoted' %s\n";
        let runner = ShellRunner::new(Duration::from_secs(5));
        runner
            .run(&write_file_command(&target, contents), dir.path())
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), contents);
    }
}
