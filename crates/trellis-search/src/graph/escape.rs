//! Literal escaping for dialects without parameter binding.
//!
//! The Redis-family dialect interpolates every literal into the query
//! text. `escape` and `unescape` form an exact round trip; the property
//! test in this module fuzzes that invariant, since a hole here is an
//! injection vector.

/// Escapes a string for inclusion inside single quotes.
///
/// Backslash, single quote, newline, carriage return, and tab are the
/// characters the dialect's lexer treats specially.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + raw.len() / 8);
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

/// Inverse of [`escape`]. Returns `None` on a dangling or unknown escape,
/// which can only mean the input was not produced by [`escape`].
pub fn unescape(escaped: &str) -> Option<String> {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            _ => return None,
        }
    }
    Some(out)
}

/// Renders a single-quoted, escaped string literal.
pub fn quoted(raw: &str) -> String {
    format!("'{}'", escape(raw))
}

/// Renders a fixed-length f32 array literal, e.g. `[0.1,0.2]`.
pub fn float_array(values: &[f32]) -> String {
    let inner: Vec<String> = values.iter().map(|v| format!("{v}")).collect();
    format!("[{}]", inner.join(","))
}

/// Renders a list of quoted string literals.
pub fn quoted_list(values: &[String]) -> String {
    let inner: Vec<String> = values.iter().map(|v| quoted(v)).collect();
    format!("[{}]", inner.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_escape_specials() {
        assert_eq!(escape("a'b"), "a\\'b");
        assert_eq!(escape("a\\b"), "a\\\\b");
        assert_eq!(escape("line1\nline2"), "line1\\nline2");
        assert_eq!(escape("col1\tcol2"), "col1\\tcol2");
        assert_eq!(escape("cr\rlf"), "cr\\rlf");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn test_unescape_rejects_garbage() {
        assert_eq!(unescape("dangling\\"), None);
        assert_eq!(unescape("bad\\q"), None);
    }

    #[test]
    fn test_quoted_wraps_and_escapes() {
        assert_eq!(quoted("it's"), "'it\\'s'");
    }

    #[test]
    fn test_float_array_format() {
        assert_eq!(float_array(&[0.5, -1.0]), "[0.5,-1]");
        assert_eq!(float_array(&[]), "[]");
    }

    #[test]
    fn test_quoted_list_format() {
        assert_eq!(
            quoted_list(&["a".to_string(), "b'c".to_string()]),
            "['a','b\\'c']"
        );
    }

    #[test]
    fn test_escaped_literal_never_terminates_early() {
        // No unescaped quote may survive; otherwise the literal breaks out.
        let hostile = "'; MATCH (n) DETACH DELETE n //";
        let escaped = escape(hostile);
        let mut prev_backslash = false;
        for c in escaped.chars() {
            if c == '\'' {
                assert!(prev_backslash, "unescaped quote in {escaped:?}");
            }
            prev_backslash = c == '\\' && !prev_backslash;
        }
    }

    proptest! {
        #[test]
        fn prop_escape_roundtrip(raw in ".*") {
            let escaped = escape(&raw);
            prop_assert_eq!(unescape(&escaped), Some(raw));
        }

        #[test]
        fn prop_escaped_has_no_bare_quotes(raw in ".*") {
            let escaped = escape(&raw);
            let bytes = escaped.as_bytes();
            let mut i = 0;
            while i < bytes.len() {
                if bytes[i] == b'\\' {
                    i += 2;
                    continue;
                }
                prop_assert_ne!(bytes[i], b'\'');
                i += 1;
            }
        }
    }
}
