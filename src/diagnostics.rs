//! Turns compiler and linker logs into line-addressed error markers.
//!
//! Logs are free-form text. Two error line styles are recognised:
//!
//! ```text
//! ERROR: 0:17: 'foo' : undeclared identifier      (glslang / naga)
//! 0(17) : error C0000: syntax error               (vendor drivers)
//! 0:17(5): error: `foo' undeclared                (Mesa)
//! ```
//!
//! Warnings and informational lines are ignored. The first delimited number
//! on an error line is its line number; the delimiter segment is normalised
//! to `:N:` in the stored message.

use std::collections::BTreeMap;

use crate::shader::Stage;

/// A compile error pinned to a 1-based line of one stage's source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMarker {
    pub stage: Stage,
    pub line: usize,
    pub message: String,
}

/// Parse a log into markers ordered by line.
///
/// When several errors land on the same line, the last one wins.
pub fn parse(log: &str, stage: Stage) -> Vec<ErrorMarker> {
    let mut markers = BTreeMap::new();
    for raw in log.lines() {
        if !is_error_line(raw) {
            continue;
        }
        let Some((line, message)) = extract_line(raw) else {
            continue;
        };
        markers.insert(
            line,
            ErrorMarker {
                stage,
                line,
                message,
            },
        );
    }
    markers.into_values().collect()
}

/// Render markers the way compilers print them, for terminal output.
pub fn format_markers(file: &str, markers: &[ErrorMarker]) -> String {
    markers
        .iter()
        .map(|m| format!("{file}:{}: {}", m.line, m.message))
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_error_line(line: &str) -> bool {
    has_error_prefix(line) || has_error_suffix(line)
}

/// `ERROR: <digits>:<digits?>:` anywhere in the line.
fn has_error_prefix(line: &str) -> bool {
    line.match_indices("ERROR:").any(|(start, tag)| {
        let bytes = line[start + tag.len()..].trim_start().as_bytes();
        let mut i = skip_digits(bytes, 0);
        if i == 0 || bytes.get(i) != Some(&b':') {
            return false;
        }
        i = skip_digits(bytes, i + 1);
        bytes.get(i) == Some(&b':')
    })
}

/// `: error`, with any whitespace around the colon, case-insensitive.
fn has_error_suffix(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.match_indices(':').any(|(colon, _)| {
        lower[colon + 1..].trim_start().starts_with("error")
    })
}

fn skip_digits(bytes: &[u8], mut i: usize) -> usize {
    while bytes.get(i).is_some_and(u8::is_ascii_digit) {
        i += 1;
    }
    i
}

/// Find the first `:N:`, `(N)`, `:N)`, `(N:` or `:N(col):` field.
fn extract_line(line: &str) -> Option<(usize, String)> {
    let bytes = line.as_bytes();
    for start in 0..bytes.len() {
        if bytes[start] != b':' && bytes[start] != b'(' {
            continue;
        }
        let digits_end = skip_digits(bytes, start + 1);
        if digits_end == start + 1 {
            continue;
        }
        let end = match bytes.get(digits_end) {
            Some(b':') | Some(b')') => digits_end + 1,
            Some(b'(') => {
                let column_end = skip_digits(bytes, digits_end + 1);
                if column_end == digits_end + 1 || bytes.get(column_end) != Some(&b')') {
                    continue;
                }
                if bytes.get(column_end + 1) == Some(&b':') {
                    column_end + 2
                } else {
                    column_end + 1
                }
            }
            _ => continue,
        };

        let number: usize = line[start + 1..digits_end].parse().ok()?;
        if number == 0 {
            return None;
        }
        let message = format!("{}:{number}:{}", &line[..start], &line[end..]);
        return Some((number, message.trim().to_string()));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn glslang_error_yields_one_marker() {
        let markers = parse("ERROR: 0:17: 'foo' : undeclared identifier", Stage::Fragment);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].line, 17);
        assert_eq!(markers[0].message, "ERROR: 0:17: 'foo' : undeclared identifier");
        assert_eq!(markers[0].stage, Stage::Fragment);
    }

    #[test]
    fn vendor_style_lines_are_normalised() {
        let markers = parse("0(12) : error C0000: syntax error, unexpected '}'", Stage::Vertex);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].line, 12);
        assert_eq!(markers[0].message, "0:12: : error C0000: syntax error, unexpected '}'");
    }

    #[test]
    fn mesa_column_suffix_is_dropped() {
        let markers = parse("0:8(14): error: `uv2' undeclared", Stage::Fragment);
        assert_eq!(markers[0].line, 8);
        assert_eq!(markers[0].message, "0:8: error: `uv2' undeclared");
    }

    #[test]
    fn warnings_and_unnumbered_errors_are_ignored() {
        let log = "WARNING: 0:3: 'x' : unused variable
ERROR: program failed to link
0(5) : warning C7050: 'c' might be used before being initialized";
        assert!(parse(log, Stage::Fragment).is_empty());
    }

    #[test]
    fn later_error_on_same_line_wins() {
        let log = "ERROR: 0:4: first
ERROR: 0:9: other
ERROR: 0:4: second";
        let markers = parse(log, Stage::Fragment);
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].line, 4);
        assert!(markers[0].message.ends_with("second"));
        assert_eq!(markers[1].line, 9);
    }

    #[test]
    fn line_zero_is_not_a_marker() {
        assert!(parse("ERROR: 0:0: whole program", Stage::Fragment).is_empty());
    }

    #[test]
    fn formats_like_a_compiler() {
        let markers = parse("ERROR: 0:2: boom", Stage::Fragment);
        assert_eq!(format_markers("a.frag", &markers), "a.frag:2: ERROR: 0:2: boom");
    }

    proptest! {
        #[test]
        fn arbitrary_logs_never_panic(log in ".{0,200}") {
            for marker in parse(&log, Stage::Fragment) {
                prop_assert!(marker.line > 0);
            }
        }

        #[test]
        fn numbered_errors_round_trip_their_line(line in 1usize..100_000) {
            let log = format!("ERROR: 0:{line}: something broke");
            let markers = parse(&log, Stage::Vertex);
            prop_assert_eq!(markers.len(), 1);
            prop_assert_eq!(markers[0].line, line);
        }
    }
}
