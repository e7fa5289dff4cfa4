use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiffModeError {
    #[error("commit mode requires a SHA: commit:<sha>")]
    MissingCommit,
    #[error("range mode requires format a..b: range:<from>..<to>")]
    InvalidRange,
    #[error("invalid diffMode: {0:?} (valid: unstaged, staged, head, commit:<sha>, range:<from>..<to>)")]
    Invalid(String),
    #[error("unknown diff mode: {0}")]
    UnknownKind(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffModeKind {
    Unstaged,
    Staged,
    Head,
    Commit,
    Range,
}

impl DiffModeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffModeKind::Unstaged => "unstaged",
            DiffModeKind::Staged => "staged",
            DiffModeKind::Head => "head",
            DiffModeKind::Commit => "commit",
            DiffModeKind::Range => "range",
        }
    }
}

impl fmt::Display for DiffModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiffModeKind {
    type Err = DiffModeError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "unstaged" => Ok(DiffModeKind::Unstaged),
            "staged" => Ok(DiffModeKind::Staged),
            "head" => Ok(DiffModeKind::Head),
            "commit" => Ok(DiffModeKind::Commit),
            "range" => Ok(DiffModeKind::Range),
            other => Err(DiffModeError::UnknownKind(other.to_string())),
        }
    }
}

/// A validated way of asking git for a diff. `commit` and `range` always hold
/// a non-empty reference; the other kinds never hold one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffMode {
    kind: DiffModeKind,
    reference: String,
}

impl Default for DiffMode {
    fn default() -> Self {
        Self::unstaged()
    }
}

impl DiffMode {
    pub fn unstaged() -> Self {
        Self::bare(DiffModeKind::Unstaged)
    }

    pub fn staged() -> Self {
        Self::bare(DiffModeKind::Staged)
    }

    pub fn head() -> Self {
        Self::bare(DiffModeKind::Head)
    }

    pub fn commit(sha: &str) -> Result<Self, DiffModeError> {
        let sha = sha.trim();
        if sha.is_empty() {
            return Err(DiffModeError::MissingCommit);
        }
        Ok(Self {
            kind: DiffModeKind::Commit,
            reference: sha.to_string(),
        })
    }

    pub fn range(range: &str) -> Result<Self, DiffModeError> {
        let range = range.trim();
        if !range.contains("..") {
            return Err(DiffModeError::InvalidRange);
        }
        Ok(Self {
            kind: DiffModeKind::Range,
            reference: range.to_string(),
        })
    }

    /// Builds a mode from an already split kind name and reference, e.g. from
    /// a structured request. Unknown kind names are rejected here.
    pub fn from_parts(kind: &str, reference: &str) -> Result<Self, DiffModeError> {
        match kind.trim().parse::<DiffModeKind>()? {
            DiffModeKind::Unstaged => Ok(Self::unstaged()),
            DiffModeKind::Staged => Ok(Self::staged()),
            DiffModeKind::Head => Ok(Self::head()),
            DiffModeKind::Commit => Self::commit(reference),
            DiffModeKind::Range => Self::range(reference),
        }
    }

    /// Parses the compact mode grammar: `""`, `unstaged`, `staged`, `head`,
    /// `commit:<sha>`, `range:<a>..<b>` (or `...`). Surrounding whitespace is
    /// ignored, so a blank string means `unstaged`.
    pub fn resolve(input: &str) -> Result<Self, DiffModeError> {
        let input = input.trim();
        match input {
            "" | "unstaged" => return Ok(Self::unstaged()),
            "staged" => return Ok(Self::staged()),
            "head" => return Ok(Self::head()),
            _ => {}
        }
        if let Some(sha) = input.strip_prefix("commit:") {
            return Self::commit(sha);
        }
        if let Some(range) = input.strip_prefix("range:") {
            return Self::range(range);
        }
        Err(DiffModeError::Invalid(input.to_string()))
    }

    fn bare(kind: DiffModeKind) -> Self {
        Self {
            kind,
            reference: String::new(),
        }
    }

    pub fn kind(&self) -> DiffModeKind {
        self.kind
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Argument vector for `git`, run from the repository root with
    /// `rel_path` relative to it.
    pub fn build_args(&self, rel_path: &str) -> Vec<String> {
        let mut args = vec!["diff".to_string(), "--no-color".to_string()];
        match self.kind {
            DiffModeKind::Unstaged => {}
            DiffModeKind::Staged => args.push("--cached".to_string()),
            DiffModeKind::Head => args.push("HEAD".to_string()),
            DiffModeKind::Commit => {
                args.push(format!("{}^", self.reference));
                args.push(self.reference.clone());
            }
            DiffModeKind::Range => args.push(self.reference.clone()),
        }
        args.push("--".to_string());
        args.push(rel_path.to_string());
        args
    }

    pub fn left_label(&self) -> String {
        match self.kind {
            DiffModeKind::Unstaged => "Index (staged)".to_string(),
            DiffModeKind::Staged | DiffModeKind::Head => "HEAD".to_string(),
            DiffModeKind::Commit => format!("{}^", self.reference),
            DiffModeKind::Range => split_range(&self.reference).0.to_string(),
        }
    }

    pub fn right_label(&self) -> String {
        match self.kind {
            DiffModeKind::Unstaged | DiffModeKind::Head => "Working Directory".to_string(),
            DiffModeKind::Staged => "Index (staged)".to_string(),
            DiffModeKind::Commit => self.reference.clone(),
            DiffModeKind::Range => {
                let (from, to) = split_range(&self.reference);
                to.unwrap_or(from).to_string()
            }
        }
    }

    /// Default tab title for a diff of `path` in this mode.
    pub fn title_for(&self, path: &str) -> String {
        let filename = Path::new(path)
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string());
        match self.kind {
            DiffModeKind::Unstaged => format!("{filename} (unstaged)"),
            DiffModeKind::Staged => format!("{filename} (staged)"),
            DiffModeKind::Head => format!("{filename} (vs HEAD)"),
            DiffModeKind::Commit => {
                let short: String = self.reference.chars().take(8).collect();
                format!("{filename} ({short})")
            }
            DiffModeKind::Range => format!("{filename} ({})", self.reference),
        }
    }
}

impl fmt::Display for DiffMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DiffModeKind::Commit | DiffModeKind::Range => {
                write!(f, "{}:{}", self.kind, self.reference)
            }
            _ => f.write_str(self.kind.as_str()),
        }
    }
}

impl FromStr for DiffMode {
    type Err = DiffModeError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::resolve(input)
    }
}

/// Splits `a...b` or `a..b` (triple dot wins) into its two sides.
pub fn split_range(range: &str) -> (&str, Option<&str>) {
    if let Some((from, to)) = range.split_once("...") {
        return (from, Some(to));
    }
    if let Some((from, to)) = range.split_once("..") {
        return (from, Some(to));
    }
    (range, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(input: &str) -> (DiffModeKind, String) {
        let mode = DiffMode::resolve(input).expect("valid mode");
        (mode.kind(), mode.reference().to_string())
    }

    #[test]
    fn resolves_every_valid_form() {
        assert_eq!(resolved(""), (DiffModeKind::Unstaged, String::new()));
        assert_eq!(resolved("unstaged"), (DiffModeKind::Unstaged, String::new()));
        assert_eq!(resolved("staged"), (DiffModeKind::Staged, String::new()));
        assert_eq!(resolved("head"), (DiffModeKind::Head, String::new()));
        assert_eq!(
            resolved("commit:abc123"),
            (DiffModeKind::Commit, "abc123".to_string())
        );
        assert_eq!(
            resolved("range:main..feature"),
            (DiffModeKind::Range, "main..feature".to_string())
        );
        assert_eq!(
            resolved("range:v1...v2"),
            (DiffModeKind::Range, "v1...v2".to_string())
        );
    }

    #[test]
    fn trims_whole_input_and_reference() {
        assert_eq!(resolved("  staged \n"), (DiffModeKind::Staged, String::new()));
        assert_eq!(
            resolved("  commit:  deadbeef  "),
            (DiffModeKind::Commit, "deadbeef".to_string())
        );
        assert_eq!(
            resolved("range: a..b "),
            (DiffModeKind::Range, "a..b".to_string())
        );
        assert_eq!(resolved("   "), (DiffModeKind::Unstaged, String::new()));
    }

    #[test]
    fn rejects_commit_without_sha() {
        for input in ["commit:", "commit:   "] {
            let err = DiffMode::resolve(input).expect_err("must fail");
            assert_eq!(err, DiffModeError::MissingCommit);
            assert!(err.to_string().contains("requires a SHA"));
        }
    }

    #[test]
    fn rejects_range_without_dots() {
        let err = DiffMode::resolve("range:main").expect_err("must fail");
        assert!(err.to_string().contains("range mode requires format"));
        let err = DiffMode::resolve("range:").expect_err("must fail");
        assert_eq!(err, DiffModeError::InvalidRange);
    }

    #[test]
    fn rejects_anything_else() {
        for input in ["HEAD", "Staged", "commit", "cached", "range", "sha:abc"] {
            let err = DiffMode::resolve(input).expect_err("must fail");
            assert!(err.to_string().contains("invalid diffMode"), "{input}: {err}");
        }
    }

    #[test]
    fn build_args_per_kind() {
        let args = |mode: DiffMode| mode.build_args("file.go");
        assert_eq!(args(DiffMode::unstaged()), ["diff", "--no-color", "--", "file.go"]);
        assert_eq!(
            args(DiffMode::staged()),
            ["diff", "--no-color", "--cached", "--", "file.go"]
        );
        assert_eq!(
            args(DiffMode::head()),
            ["diff", "--no-color", "HEAD", "--", "file.go"]
        );
        assert_eq!(
            args(DiffMode::commit("abc123").expect("commit")),
            ["diff", "--no-color", "abc123^", "abc123", "--", "file.go"]
        );
        assert_eq!(
            args(DiffMode::range("main..dev").expect("range")),
            ["diff", "--no-color", "main..dev", "--", "file.go"]
        );
    }

    #[test]
    fn unknown_kind_only_enters_through_from_parts() {
        let err = DiffMode::from_parts("stash", "").expect_err("must fail");
        assert_eq!(err, DiffModeError::UnknownKind("stash".to_string()));
        assert_eq!(err.to_string(), "unknown diff mode: stash");
        assert_eq!(
            DiffMode::from_parts("commit", " abc "),
            DiffMode::commit("abc")
        );
        assert_eq!(
            DiffMode::from_parts("range", "x"),
            Err(DiffModeError::InvalidRange)
        );
    }

    #[test]
    fn labels_and_titles() {
        let commit = DiffMode::commit("0123456789abcdef").expect("commit");
        assert_eq!(commit.left_label(), "0123456789abcdef^");
        assert_eq!(commit.right_label(), "0123456789abcdef");
        assert_eq!(commit.title_for("src/lib.rs"), "lib.rs (01234567)");

        let range = DiffMode::range("main...topic").expect("range");
        assert_eq!(range.left_label(), "main");
        assert_eq!(range.right_label(), "topic");
        assert_eq!(range.title_for("a/b.txt"), "b.txt (main...topic)");

        assert_eq!(DiffMode::unstaged().left_label(), "Index (staged)");
        assert_eq!(DiffMode::unstaged().right_label(), "Working Directory");
        assert_eq!(DiffMode::staged().right_label(), "Index (staged)");
        assert_eq!(DiffMode::head().title_for("x.go"), "x.go (vs HEAD)");
        assert_eq!(DiffMode::staged().title_for("x.go"), "x.go (staged)");
    }

    #[test]
    fn display_round_trips_through_resolve() {
        for input in ["unstaged", "staged", "head", "commit:abc", "range:a..b"] {
            let mode: DiffMode = input.parse().expect("parse");
            assert_eq!(mode.to_string(), input);
        }
    }
}
