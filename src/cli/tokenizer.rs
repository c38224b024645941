//! Shell-style splitting of one input line.
//!
//! Follows the conventional argv rules: unquoted spaces and tabs separate
//! tokens, `"` toggles quoting, and backslashes are only special in front
//! of a quote. `2k` backslashes before a quote become `k` backslashes and
//! the quote toggles; `2k+1` become `k` backslashes and a literal quote.
//! Input ends at the first newline.

/// Splits `line` into tokens. Never fails; unbalanced quotes and trailing
/// backslashes are kept as literal text.
#[must_use]
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut started = false;
    let mut quoted = false;
    let mut backslashes = 0_usize;

    for c in line.chars() {
        match c {
            '\n' => break,
            '\\' => {
                backslashes += 1;
                started = true;
            }
            '"' => {
                push_backslashes(&mut current, backslashes / 2);
                if backslashes % 2 == 1 {
                    current.push('"');
                } else {
                    quoted = !quoted;
                }
                backslashes = 0;
                started = true;
            }
            ' ' | '\t' if !quoted => {
                push_backslashes(&mut current, backslashes);
                backslashes = 0;
                if started {
                    tokens.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            other => {
                push_backslashes(&mut current, backslashes);
                backslashes = 0;
                current.push(other);
                started = true;
            }
        }
    }

    push_backslashes(&mut current, backslashes);
    if started {
        tokens.push(current);
    }
    tokens
}

fn push_backslashes(out: &mut String, count: usize) {
    out.extend(std::iter::repeat_n('\\', count));
}

/// Quotes `token` so that [`tokenize`] reads it back unchanged.
///
/// Tokens without whitespace or quotes are returned as-is.
#[must_use]
pub fn escape(token: &str) -> String {
    if !token.is_empty() && !token.contains([' ', '\t', '"']) {
        return token.to_string();
    }

    let mut out = String::with_capacity(token.len() + 2);
    out.push('"');
    let mut backslashes = 0_usize;
    for c in token.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                push_backslashes(&mut out, backslashes * 2 + 1);
                out.push('"');
                backslashes = 0;
            }
            other => {
                push_backslashes(&mut out, backslashes);
                out.push(other);
                backslashes = 0;
            }
        }
    }
    push_backslashes(&mut out, backslashes * 2);
    out.push('"');
    out
}

/// Escapes and joins tokens into one line.
#[must_use]
pub fn join<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(|t| escape(t.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_blank_lines_have_no_tokens() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("  \t ").is_empty());
        assert!(tokenize("\nhelp").is_empty());
    }

    #[test]
    fn whitespace_separates() {
        assert_eq!(tokenize("a b"), ["a", "b"]);
        assert_eq!(tokenize("  list\t /Users  "), ["list", "/Users"]);
    }

    #[test]
    fn quotes_preserve_whitespace() {
        assert_eq!(tokenize("\"a b\" c"), ["a b", "c"]);
        assert_eq!(tokenize("x\"y z\"w"), ["xy zw"]);
    }

    #[test]
    fn odd_backslashes_escape_a_quote() {
        assert_eq!(tokenize("a\\\"b"), ["a\"b"]);
        assert_eq!(tokenize("a\\\\\\\"b"), ["a\\\"b"]);
    }

    #[test]
    fn even_backslashes_collapse_before_toggle() {
        assert_eq!(tokenize("a\\\\\"b c\""), ["a\\b c"]);
    }

    #[test]
    fn backslashes_without_quote_are_literal() {
        assert_eq!(tokenize("C:\\dir\\\\file x\\"), ["C:\\dir\\\\file", "x\\"]);
    }

    #[test]
    fn malformed_input_is_kept() {
        assert_eq!(tokenize("say \"hello world"), ["say", "hello world"]);
        assert_eq!(tokenize("end\\\\"), ["end\\\\"]);
    }

    #[test]
    fn empty_quoted_token_is_a_token() {
        assert_eq!(tokenize("set \"\" x"), ["set", "", "x"]);
    }

    #[test]
    fn input_stops_at_newline() {
        assert_eq!(tokenize("a b\nc d"), ["a", "b"]);
    }

    #[test]
    fn escape_leaves_plain_tokens_alone() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("back\\slash"), "back\\slash");
        assert_eq!(escape(""), "\"\"");
        assert_eq!(escape("a b"), "\"a b\"");
        assert_eq!(escape("tail\\ x"), "\"tail\\ x\"");
        assert_eq!(escape("end \\"), "\"end \\\\\"");
    }

    #[test]
    fn retokenizing_escaped_output_is_stable() {
        let lines = [
            "",
            "a b",
            "\"a b\" c",
            "a\\\"b",
            "a\\\\\"b c\"",
            "set \"\" \"x \\\"y\\\" z\"",
            "trailing \"open quote",
            "dangling\\ \\\\ \"\\\\\"",
            "tab\tseparated\t\"quoted\ttab\"",
            "unicode \"héllo wörld\" ✓",
        ];
        for line in lines {
            let tokens = tokenize(line);
            assert_eq!(tokenize(&join(&tokens)), tokens, "line {line:?}");
        }
    }
}
