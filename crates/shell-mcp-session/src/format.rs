//! Text helpers for session naming, log slicing, and compact listings.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Shell-ish tokens: bare words or single/double-quoted strings with
    // backslash escapes
    static ref TOKEN_RE: Regex =
        Regex::new(r#"(?:[^\s"']+|"(?:\\.|[^"])*"|'(?:\\.|[^'])*')+"#)
            .expect("token regex is valid");
}

/// Maximum characters a derived-name target keeps before middle truncation.
const NAME_TARGET_MAX: usize = 48;

/// A window into a log transcript, as produced by [`slice_log_lines`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSlice {
    /// The selected lines, joined with `\n`
    pub text: String,
    /// Line count of the whole transcript
    pub total_lines: usize,
    /// Zero-based index of the first returned line
    pub start: usize,
    /// Zero-based index one past the last returned line
    pub end: usize,
}

/// Split a string into chunks of at most `limit` characters, respecting
/// UTF-8 boundaries.
pub fn chunk_str(text: &str, limit: usize) -> Vec<&str> {
    if limit == 0 || text.is_empty() {
        return if text.is_empty() { Vec::new() } else { vec![text] };
    }
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let cut: usize = rest.chars().take(limit).map(char::len_utf8).sum();
        let (head, tail) = rest.split_at(cut);
        chunks.push(head);
        rest = tail;
    }
    chunks
}

/// Render a millisecond duration compactly: `450ms`, `12s`, `3m05s`.
pub fn format_duration(ms: u64) -> String {
    if ms < 1_000 {
        return format!("{ms}ms");
    }
    let seconds = ms / 1_000;
    if seconds < 60 {
        return format!("{seconds}s");
    }
    let minutes = seconds / 60;
    let rem = seconds % 60;
    format!("{minutes}m{rem:02}s")
}

/// Shorten a string to `max` characters by cutting out the middle.
pub fn truncate_middle(text: &str, max: usize) -> String {
    let len = text.chars().count();
    if len <= max {
        return text.to_string();
    }
    if max <= 3 {
        return text.chars().take(max).collect();
    }
    let head = (max - 3) / 2;
    let tail = max - 3 - head;
    let front: String = text.chars().take(head).collect();
    let back: String = text.chars().skip(len - tail).collect();
    format!("{front}...{back}")
}

/// Pad a string with trailing spaces up to `width` characters.
pub fn pad_end(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    let mut padded = text.to_string();
    padded.extend(std::iter::repeat(' ').take(width - len));
    padded
}

/// Select a line window out of a transcript.
///
/// Line endings are normalized to `\n` and a single trailing empty line is
/// dropped so `"a\nb\n"` counts as two lines. With an `offset` the window
/// starts at that zero-based line and spans `limit` lines (or the rest of
/// the transcript). A `limit` without an `offset` selects the last `limit`
/// lines.
pub fn slice_log_lines(text: &str, offset: Option<u64>, limit: Option<u64>) -> LogSlice {
    let normalized = text.replace("\r\n", "\n");
    let mut lines: Vec<&str> = normalized.split('\n').collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }
    let total_lines = lines.len();

    let (start, end) = match (offset, limit) {
        (Some(offset), limit) => {
            let start = (offset as usize).min(total_lines);
            let end = match limit {
                Some(limit) => (start + limit as usize).min(total_lines),
                None => total_lines,
            };
            (start, end)
        }
        (None, Some(limit)) => {
            let start = total_lines.saturating_sub(limit as usize);
            (start, total_lines)
        }
        (None, None) => (0, total_lines),
    };

    LogSlice {
        text: lines[start..end].join("\n"),
        total_lines,
        start,
        end,
    }
}

/// Derive a short human-readable name from a command string.
///
/// The name is the command verb plus its first non-flag argument (with a
/// long target middle-truncated); a command with only flags falls back to
/// its second token, and a bare verb stands alone. Returns `None` for an
/// empty command.
pub fn derive_session_name(command: &str) -> Option<String> {
    let tokens: Vec<&str> = TOKEN_RE
        .find_iter(command.trim())
        .map(|m| m.as_str())
        .collect();
    let first = tokens.first()?;
    let verb = strip_quotes(first);
    if verb.is_empty() {
        return None;
    }

    let target = tokens
        .iter()
        .skip(1)
        .find(|t| !t.starts_with('-'))
        .or_else(|| tokens.get(1));

    match target {
        Some(target) => {
            let target = truncate_middle(&strip_quotes(target), NAME_TARGET_MAX);
            Some(format!("{verb} {target}"))
        }
        None => Some(verb),
    }
}

/// Remove one layer of matching surrounding quotes.
fn strip_quotes(token: &str) -> String {
    let bytes = token.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if first == last && (first == b'"' || first == b'\'') {
            return token[1..token.len() - 1].to_string();
        }
    }
    token.to_string()
}
