//! Version token extraction from free-form CLI output.

use super::error::{Result, RuntimeError};

/// Return the first `<digits>.<non-whitespace>` token in `line`.
///
/// ```text
/// version: 5.3.30-alpha.7  /usr/sbin/portod   ->  5.3.30-alpha.7
/// ```
pub fn parse_version(line: &str) -> Result<String> {
    find_version(line)
        .map(str::to_string)
        .ok_or_else(|| RuntimeError::Parse {
            line: line.to_string(),
        })
}

fn find_version(line: &str) -> Option<&str> {
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if bytes.get(i) == Some(&b'.') {
            let rest = &line[i + 1..];
            let len = rest.find(char::is_whitespace).unwrap_or(rest.len());
            return Some(&line[start..i + 1 + len]);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_portod_output() {
        assert_eq!(
            parse_version("version: 5.3.30-alpha.7  /usr/sbin/portod").unwrap(),
            "5.3.30-alpha.7"
        );
        assert_eq!(
            parse_version("running: 5.3.30  /usr/sbin/portod").unwrap(),
            "5.3.30"
        );
    }

    #[test]
    fn test_only_first_token_is_returned() {
        assert_eq!(parse_version("5.3.30 6.0.0 7.1").unwrap(), "5.3.30");
    }

    #[test]
    fn test_multi_digit_major() {
        assert_eq!(parse_version("portod 15.2.1").unwrap(), "15.2.1");
    }

    #[test]
    fn test_digits_without_dot_are_skipped() {
        assert_eq!(parse_version("build 42 of v1.2-rc").unwrap(), "1.2-rc");
        assert_eq!(parse_version("release 7.").unwrap(), "7.");
    }

    #[test]
    fn test_no_version_is_parse_error() {
        let err = parse_version("portod: command not found").unwrap_err();
        match err {
            RuntimeError::Parse { line } => assert_eq!(line, "portod: command not found"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
