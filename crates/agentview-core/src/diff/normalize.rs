//! Repairs diff text that arrives without file or hunk headers so the
//! side-by-side builder always sees a well formed unified diff.

use std::borrow::Cow;

pub const SYNTHETIC_FILE_HEADERS: &str = "--- a/original\n+++ b/modified\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffShape {
    /// File headers and at least one hunk header.
    Unified,
    /// Hunk headers without file headers.
    HunksOnly,
    /// File headers followed by a body with no hunk header.
    HeadersOnly,
    /// Bare `+`/`-`/` ` lines.
    BodyOnly,
    NotDiff,
}

impl DiffShape {
    pub fn is_diff(&self) -> bool {
        !matches!(self, DiffShape::NotDiff)
    }
}

fn is_file_header(line: &str) -> bool {
    line.starts_with("--- ") || line.starts_with("+++ ") || line.starts_with("diff ")
}

fn is_body_line(line: &str) -> bool {
    line.starts_with('+') || line.starts_with('-') || line.starts_with(' ')
}

pub fn classify(text: &str) -> DiffShape {
    let has_old = text.lines().any(|line| line.starts_with("--- "));
    let has_new = text.lines().any(|line| line.starts_with("+++ "));
    let has_hunk = text.lines().any(|line| line.starts_with("@@"));
    let has_body = text
        .lines()
        .any(|line| !is_file_header(line) && is_body_line(line));

    match (has_old && has_new, has_hunk) {
        (true, true) => DiffShape::Unified,
        (false, true) => DiffShape::HunksOnly,
        (true, false) if has_body => DiffShape::HeadersOnly,
        (false, false) if has_body => DiffShape::BodyOnly,
        _ => DiffShape::NotDiff,
    }
}

/// Old and new line counts of a bare body, each at least 1.
fn body_counts<'a>(lines: impl Iterator<Item = &'a str>) -> (usize, usize) {
    let (mut old, mut new) = (0usize, 0usize);
    for line in lines {
        match line.as_bytes().first() {
            Some(b'-') => old += 1,
            Some(b'+') => new += 1,
            Some(b'\\') => {}
            Some(b' ') | None => {
                old += 1;
                new += 1;
            }
            Some(_) => {}
        }
    }
    (old.max(1), new.max(1))
}

fn synthetic_hunk(old: usize, new: usize) -> String {
    format!("@@ -1,{old} +1,{new} @@\n")
}

/// Returns `text` unchanged when it is already a unified diff or is not a
/// diff at all; otherwise prefixes whatever headers are missing.
pub fn normalize(text: &str) -> Cow<'_, str> {
    match classify(text) {
        DiffShape::Unified | DiffShape::NotDiff => Cow::Borrowed(text),
        DiffShape::HunksOnly => Cow::Owned(format!("{SYNTHETIC_FILE_HEADERS}{text}")),
        DiffShape::BodyOnly => {
            let (old, new) = body_counts(text.lines());
            Cow::Owned(format!(
                "{SYNTHETIC_FILE_HEADERS}{}{text}",
                synthetic_hunk(old, new)
            ))
        }
        DiffShape::HeadersOnly => {
            let header_len = text
                .lines()
                .take_while(|line| is_file_header(line) || line.starts_with("index "))
                .count();
            let (old, new) = body_counts(text.lines().skip(header_len));
            let mut out = String::with_capacity(text.len() + 32);
            for line in text.lines().take(header_len) {
                out.push_str(line);
                out.push('\n');
            }
            out.push_str(&synthetic_hunk(old, new));
            for line in text.lines().skip(header_len) {
                out.push_str(line);
                out.push('\n');
            }
            if !text.ends_with('\n') {
                out.pop();
            }
            Cow::Owned(out)
        }
    }
}
