use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Zero-based position of a recognized link in its document. Columns are
/// counted in characters within the line; `end_column` points one past the
/// closing `]]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceSpan {
    pub line: usize,
    pub start_column: usize,
    pub end_column: usize,
}

/// One recognized `[[...]]` occurrence. `raw_label` is the unescaped text
/// between the delimiters; `range` is the byte range of the whole span
/// (delimiters included) in the scanned document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkToken {
    pub raw_label: String,
    pub span: SourceSpan,
    pub range: Range<usize>,
}

/// Successful cursor-mode recognition: the unescaped label and the byte
/// offset just past the closing `]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedLink {
    pub raw_label: String,
    pub end: usize,
}

/// Try to recognize a link span starting exactly at `pos`.
///
/// Fires only when the two bytes at `pos` are `[[`. While scanning the label,
/// a backslash consumes the following character as an opaque pair, so an
/// escaped `\]` cannot terminate the span. The span closes at the first
/// unescaped `]]`; running out of text (or hitting a line break) first
/// declines without producing a token, leaving the `[[` as ordinary text.
pub fn scan_link_at(text: &str, pos: usize) -> Option<ScannedLink> {
    let rest = text.get(pos..)?;
    if !rest.starts_with("[[") {
        return None;
    }
    let body = &rest[2..];
    let mut chars = body.char_indices();
    while let Some((offset, ch)) = chars.next() {
        match ch {
            '\n' => return None,
            ']' if body[offset + 1..].starts_with(']') => {
                return Some(ScannedLink {
                    raw_label: unescape_label(&body[..offset]),
                    end: pos + 2 + offset + 2,
                });
            }
            '\\' => {
                chars.next();
            }
            _ => {}
        }
    }
    None
}

/// Collapse each `\X` escape to `X`. A trailing lone backslash is kept.
pub fn unescape_label(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some(escaped) => out.push(escaped),
                None => out.push('\\'),
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// Tokenizer flavor over a whole text: walk forward, trying
/// [`scan_link_at`] wherever `[[` appears, consuming recognized spans and
/// stepping one character otherwise, the same traversal the inline rule
/// performs over an inline run. Produces the same tokens as
/// [`extract_links`].
pub fn scan_links(content: &str) -> Vec<LinkToken> {
    let mut tokens = Vec::new();
    let mut line = 0usize;
    let mut line_start = 0usize;
    let mut pos = 0usize;

    while pos < content.len() {
        if content[pos..].starts_with("[[")
            && let Some(scanned) = scan_link_at(content, pos)
        {
            let start_column = content[line_start..pos].chars().count();
            let end_column = start_column + content[pos..scanned.end].chars().count();
            tokens.push(LinkToken {
                raw_label: scanned.raw_label,
                span: SourceSpan {
                    line,
                    start_column,
                    end_column,
                },
                range: pos..scanned.end,
            });
            pos = scanned.end;
            continue;
        }
        let Some(ch) = content[pos..].chars().next() else {
            break;
        };
        if ch == '\n' {
            line += 1;
            line_start = pos + 1;
        }
        pos += ch.len_utf8();
    }

    tokens
}

static LINK_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Whole-document matcher with the same escaping semantics as
/// [`scan_link_at`]: the escaped-pair branch consumes `\X` as a unit, so a
/// `]]` terminates only when the run of backslashes directly before it has
/// even length. Labels never span lines.
fn link_pattern() -> &'static Regex {
    LINK_PATTERN
        .get_or_init(|| Regex::new(r"\[\[((?:\\[^\n]|[^\\\n])*?)\]\]").expect("valid link pattern"))
}

/// Every recognized link in `content`, in document order. Recomputed fresh on
/// each call; nothing is cached.
pub fn extract_links(content: &str) -> Vec<LinkToken> {
    let mut tokens = Vec::new();
    let mut line = 0usize;
    let mut line_start = 0usize;
    let mut scanned_to = 0usize;

    for captures in link_pattern().captures_iter(content) {
        let (Some(whole), Some(inner)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        for (offset, byte) in content[scanned_to..whole.start()].bytes().enumerate() {
            if byte == b'\n' {
                line += 1;
                line_start = scanned_to + offset + 1;
            }
        }
        scanned_to = whole.start();

        let start_column = content[line_start..whole.start()].chars().count();
        let end_column = start_column + content[whole.start()..whole.end()].chars().count();
        tokens.push(LinkToken {
            raw_label: unescape_label(inner.as_str()),
            span: SourceSpan {
                line,
                start_column,
                end_column,
            },
            range: whole.start()..whole.end(),
        });
    }

    tokens
}

/// Completion gate from the host editor: link completion is offered only when
/// the line text before the cursor has an open `[[` with no `]]` after it.
/// Returns the partial label typed so far.
pub fn completion_prefix(line_prefix: &str) -> Option<&str> {
    let open = line_prefix.rfind("[[")?;
    if let Some(close) = line_prefix.rfind("]]")
        && close > open
    {
        return None;
    }
    Some(&line_prefix[open + 2..])
}
