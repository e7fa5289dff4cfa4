//! Diff subsystem: mode resolution for git, two-file compare, text
//! normalization, side-by-side row building, folding of unchanged runs and
//! hunk navigation.

pub mod compare;
pub mod fold;
pub mod mode;
pub mod navigate;
pub mod normalize;
pub mod side_by_side;

pub use compare::unified_diff;
pub use fold::{plan_folds, Fold, FoldConfig, FoldState, RowClass, VisibleRow};
pub use mode::{DiffMode, DiffModeError, DiffModeKind};
pub use navigate::{hunk_groups, HunkGroup, HunkNavigator};
pub use normalize::{classify, normalize, DiffShape};
pub use side_by_side::{build_side_by_side, SideBySide};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffLineKind {
    Context,
    Add,
    Delete,
    Empty,
    Hunk,
}

/// One cell of a side-by-side row. `line_number` is `None` exactly for
/// `Empty` and `Hunk` cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: DiffLineKind,
    pub content: String,
    pub line_number: Option<usize>,
}

impl DiffLine {
    pub fn context(content: impl Into<String>, line_number: usize) -> Self {
        Self {
            kind: DiffLineKind::Context,
            content: content.into(),
            line_number: Some(line_number),
        }
    }

    pub fn add(content: impl Into<String>, line_number: usize) -> Self {
        Self {
            kind: DiffLineKind::Add,
            content: content.into(),
            line_number: Some(line_number),
        }
    }

    pub fn delete(content: impl Into<String>, line_number: usize) -> Self {
        Self {
            kind: DiffLineKind::Delete,
            content: content.into(),
            line_number: Some(line_number),
        }
    }

    pub fn empty() -> Self {
        Self {
            kind: DiffLineKind::Empty,
            content: String::new(),
            line_number: None,
        }
    }

    pub fn hunk(header: impl Into<String>) -> Self {
        Self {
            kind: DiffLineKind::Hunk,
            content: header.into(),
            line_number: None,
        }
    }

    pub fn is_change(&self) -> bool {
        matches!(self.kind, DiffLineKind::Add | DiffLineKind::Delete)
    }
}
