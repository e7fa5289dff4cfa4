use super::{DiffLine, DiffLineKind};
use crate::detect::detect_language;
use regex::Regex;
use std::sync::OnceLock;

fn hunk_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("valid regex")
    })
}

const METADATA_PREFIXES: &[&str] = &[
    "--- ",
    "+++ ",
    "diff ",
    "index ",
    "new file",
    "deleted file",
    "similarity",
    "rename ",
    "Binary ",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HunkHeader {
    old_start: usize,
    old_count: usize,
    new_start: usize,
    new_count: usize,
}

fn parse_hunk_header(line: &str) -> Option<HunkHeader> {
    let caps = hunk_header_re().captures(line)?;
    let number = |idx: usize, default: usize| {
        caps.get(idx)
            .and_then(|m| m.as_str().parse::<usize>().ok())
            .unwrap_or(default)
    };
    Some(HunkHeader {
        old_start: number(1, 1),
        old_count: number(2, 1),
        new_start: number(3, 1),
        new_count: number(4, 1),
    })
}

/// Path named by a `+++ ` header, without the `b/` prefix or a trailing
/// timestamp. `/dev/null` yields nothing.
fn target_path(header: &str) -> Option<&str> {
    let raw = header.strip_prefix("+++ ")?;
    let raw = raw.split('\t').next().unwrap_or(raw).trim();
    if raw.is_empty() || raw == "/dev/null" {
        return None;
    }
    Some(raw.strip_prefix("b/").unwrap_or(raw))
}

/// Two equally long columns of rows: the original on the left, the
/// modified text on the right.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideBySide {
    pub left: Vec<DiffLine>,
    pub right: Vec<DiffLine>,
    pub language: Option<String>,
}

impl SideBySide {
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = (&DiffLine, &DiffLine)> + '_ {
        self.left.iter().zip(self.right.iter())
    }

    pub fn hunk_count(&self) -> usize {
        self.left
            .iter()
            .filter(|line| line.kind == DiffLineKind::Hunk)
            .count()
    }
}

#[derive(Default)]
struct Builder {
    out: SideBySide,
    old_line: usize,
    new_line: usize,
    old_remaining: usize,
    new_remaining: usize,
    in_hunk: bool,
    deletes: Vec<DiffLine>,
    adds: Vec<DiffLine>,
}

impl Builder {
    fn new(language: Option<&str>) -> Self {
        Self {
            out: SideBySide {
                language: language.map(str::to_string),
                ..SideBySide::default()
            },
            old_line: 1,
            new_line: 1,
            ..Self::default()
        }
    }

    /// Emits queued deletes and adds side by side, padding the shorter
    /// column with empty rows.
    fn flush(&mut self) {
        let rows = self.deletes.len().max(self.adds.len());
        let mut deletes = std::mem::take(&mut self.deletes).into_iter();
        let mut adds = std::mem::take(&mut self.adds).into_iter();
        for _ in 0..rows {
            self.out.left.push(deletes.next().unwrap_or_else(DiffLine::empty));
            self.out.right.push(adds.next().unwrap_or_else(DiffLine::empty));
        }
    }

    fn hunk(&mut self, line: &str) {
        self.flush();
        if let Some(header) = parse_hunk_header(line) {
            self.old_line = header.old_start.max(1);
            self.new_line = header.new_start.max(1);
            self.old_remaining = header.old_count;
            self.new_remaining = header.new_count;
        }
        self.in_hunk = true;
        self.out.left.push(DiffLine::hunk(line));
        self.out.right.push(DiffLine::hunk(""));
    }

    fn delete(&mut self, content: &str) {
        self.deletes.push(DiffLine::delete(content, self.old_line));
        self.old_line += 1;
        self.old_remaining = self.old_remaining.saturating_sub(1);
    }

    fn add(&mut self, content: &str) {
        self.adds.push(DiffLine::add(content, self.new_line));
        self.new_line += 1;
        self.new_remaining = self.new_remaining.saturating_sub(1);
    }

    fn context(&mut self, content: &str) {
        self.flush();
        self.out.left.push(DiffLine::context(content, self.old_line));
        self.out.right.push(DiffLine::context(content, self.new_line));
        self.old_line += 1;
        self.new_line += 1;
        self.old_remaining = self.old_remaining.saturating_sub(1);
        self.new_remaining = self.new_remaining.saturating_sub(1);
    }

    fn expecting_body(&self) -> bool {
        self.in_hunk && (self.old_remaining > 0 || self.new_remaining > 0)
    }

    fn metadata(&mut self, line: &str) -> bool {
        if !METADATA_PREFIXES.iter().any(|prefix| line.starts_with(prefix)) {
            return false;
        }
        self.flush();
        self.in_hunk = false;
        if self.out.language.is_none() {
            self.out.language = target_path(line)
                .and_then(detect_language)
                .map(str::to_string);
        }
        true
    }

    fn line(&mut self, line: &str) {
        if line.starts_with("@@") {
            self.hunk(line);
            return;
        }
        // Inside a hunk with lines still owed, `---`/`+++` are content.
        if !self.expecting_body() && self.metadata(line) {
            return;
        }
        match line.as_bytes().first() {
            Some(b'-') => self.delete(&line[1..]),
            Some(b'+') => self.add(&line[1..]),
            Some(b' ') => self.context(&line[1..]),
            Some(b'\\') => {}
            _ => self.context(line),
        }
    }

    fn finish(mut self) -> SideBySide {
        self.flush();
        self.out
    }
}

/// Builds the side-by-side rows of a normalized unified diff. `language` is
/// kept when given, otherwise it is detected from the `+++` path.
pub fn build_side_by_side(text: &str, language: Option<&str>) -> SideBySide {
    let mut builder = Builder::new(language.filter(|lang| !lang.is_empty()));
    for line in text.lines() {
        builder.line(line);
    }
    builder.finish()
}
