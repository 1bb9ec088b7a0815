//! Top-level statement splitting
//!
//! DDL files are parsed one statement at a time so that a single malformed
//! statement does not take the rest of the file down with it.

/// One top-level statement and the line it starts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Statement text without the trailing `;`
    pub text: &'a str,

    /// 1-indexed line of the statement's first significant character
    pub line: usize,
}

/// Split SQL text at top-level semicolons.
///
/// Semicolons inside string literals, quoted identifiers, dollar-quoted
/// bodies and comments do not terminate a statement. Leading whitespace and
/// comments are not part of a chunk; statements made only of comments are
/// dropped.
pub fn split_statements(sql: &str) -> Vec<Chunk<'_>> {
    let bytes = sql.as_bytes();
    let len = bytes.len();

    let mut chunks = Vec::new();
    let mut start: Option<usize> = None;
    let mut start_line = 1;
    let mut line = 1;
    let mut i = 0;

    while i < len {
        match bytes[i] {
            b'\n' => {
                line += 1;
                i += 1;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < len && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i < len && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    if bytes[i] == b'\n' {
                        line += 1;
                    }
                    i += 1;
                }
                i = (i + 2).min(len);
            }
            quote @ (b'\'' | b'"' | b'`') => {
                if start.is_none() {
                    start = Some(i);
                    start_line = line;
                }
                i += 1;
                while i < len {
                    if bytes[i] == quote {
                        // doubled quote is an escaped quote
                        if bytes.get(i + 1) == Some(&quote) {
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    if bytes[i] == b'\n' {
                        line += 1;
                    }
                    i += 1;
                }
            }
            b'$' => {
                if start.is_none() {
                    start = Some(i);
                    start_line = line;
                }
                match dollar_tag(sql, i) {
                    Some(tag) => {
                        let body_start = i + tag.len();
                        match sql[body_start..].find(tag) {
                            Some(offset) => {
                                line += sql[body_start..body_start + offset].matches('\n').count();
                                i = body_start + offset + tag.len();
                            }
                            None => {
                                line += sql[body_start..].matches('\n').count();
                                i = len;
                            }
                        }
                    }
                    None => i += 1,
                }
            }
            b';' => {
                if let Some(s) = start.take() {
                    chunks.push(Chunk {
                        text: sql[s..i].trim_end(),
                        line: start_line,
                    });
                }
                i += 1;
            }
            c if c.is_ascii_whitespace() => i += 1,
            _ => {
                if start.is_none() {
                    start = Some(i);
                    start_line = line;
                }
                i += 1;
            }
        }
    }

    if let Some(s) = start {
        let text = sql[s..].trim_end();
        if !text.is_empty() {
            chunks.push(Chunk {
                text,
                line: start_line,
            });
        }
    }

    chunks
}

/// The `$tag$` opening a dollar-quoted string at `pos`, if any
fn dollar_tag(sql: &str, pos: usize) -> Option<&str> {
    let bytes = sql.as_bytes();
    let mut end = pos + 1;

    // `$1` is a positional parameter, not a tag
    if bytes.get(end).is_some_and(|b| b.is_ascii_digit()) {
        return None;
    }

    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
        end += 1;
    }

    if bytes.get(end) == Some(&b'$') {
        Some(&sql[pos..=end])
    } else {
        None
    }
}
