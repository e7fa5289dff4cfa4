use super::{DiffLine, DiffLineKind, SideBySide};

/// Folding is not worth a marker below this many hidden rows.
pub const MIN_HIDDEN_ROWS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowClass {
    Hunk,
    Changed,
    Unchanged,
}

impl RowClass {
    pub fn of(left: &DiffLine, right: &DiffLine) -> Self {
        if left.kind == DiffLineKind::Hunk || right.kind == DiffLineKind::Hunk {
            RowClass::Hunk
        } else if left.is_change() || right.is_change() {
            RowClass::Changed
        } else {
            RowClass::Unchanged
        }
    }
}

impl SideBySide {
    pub fn row_classes(&self) -> Vec<RowClass> {
        self.rows()
            .map(|(left, right)| RowClass::of(left, right))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoldConfig {
    /// Unchanged runs longer than this are folded.
    pub threshold: usize,
    /// Rows kept visible next to each changed or hunk neighbour.
    pub context: usize,
}

impl Default for FoldConfig {
    fn default() -> Self {
        Self {
            threshold: 8,
            context: 3,
        }
    }
}

/// Hidden rows `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fold {
    pub start: usize,
    pub end: usize,
    pub expanded: bool,
}

impl Fold {
    pub fn hidden_count(&self) -> usize {
        self.end - self.start
    }

    pub fn contains(&self, row: usize) -> bool {
        (self.start..self.end).contains(&row)
    }

    pub fn label(&self) -> String {
        format!("{} lines hidden", self.hidden_count())
    }
}

/// Plans folds over classified rows. Context rows are only kept on a side of
/// the run that actually has a neighbour.
pub fn plan_folds(classes: &[RowClass], config: FoldConfig) -> Vec<Fold> {
    let mut folds = Vec::new();
    let mut idx = 0;
    while idx < classes.len() {
        if classes[idx] != RowClass::Unchanged {
            idx += 1;
            continue;
        }
        let start = idx;
        while idx < classes.len() && classes[idx] == RowClass::Unchanged {
            idx += 1;
        }
        let end = idx;
        if end - start <= config.threshold {
            continue;
        }
        let keep_front = if start > 0 { config.context } else { 0 };
        let keep_back = if end < classes.len() { config.context } else { 0 };
        let hidden_start = start + keep_front;
        let hidden_end = end.saturating_sub(keep_back);
        if hidden_end < hidden_start + MIN_HIDDEN_ROWS {
            continue;
        }
        folds.push(Fold {
            start: hidden_start,
            end: hidden_end,
            expanded: false,
        });
    }
    folds
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibleRow {
    Row(usize),
    /// Expand/collapse marker for the fold at this index.
    Marker(usize),
}

/// Fold plan plus the open/closed flag of each fold. Rows are never dropped,
/// toggling only changes what `visible_rows` yields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoldState {
    folds: Vec<Fold>,
    rows: usize,
}

impl FoldState {
    pub fn new(classes: &[RowClass], config: FoldConfig) -> Self {
        Self {
            folds: plan_folds(classes, config),
            rows: classes.len(),
        }
    }

    pub fn for_view(view: &SideBySide, config: FoldConfig) -> Self {
        Self::new(&view.row_classes(), config)
    }

    pub fn folds(&self) -> &[Fold] {
        &self.folds
    }

    pub fn fold(&self, idx: usize) -> Option<&Fold> {
        self.folds.get(idx)
    }

    /// Flips fold `idx`, returning its new expanded flag.
    pub fn toggle(&mut self, idx: usize) -> Option<bool> {
        let fold = self.folds.get_mut(idx)?;
        fold.expanded = !fold.expanded;
        Some(fold.expanded)
    }

    pub fn set_expanded(&mut self, idx: usize, expanded: bool) -> bool {
        match self.folds.get_mut(idx) {
            Some(fold) => {
                fold.expanded = expanded;
                true
            }
            None => false,
        }
    }

    pub fn is_hidden(&self, row: usize) -> bool {
        self.folds
            .iter()
            .any(|fold| !fold.expanded && fold.contains(row))
    }

    pub fn hidden_rows(&self) -> usize {
        self.folds
            .iter()
            .filter(|fold| !fold.expanded)
            .map(Fold::hidden_count)
            .sum()
    }

    /// Rows in display order. Each fold's marker comes right before its range
    /// whether or not the range is shown.
    pub fn visible_rows(&self) -> Vec<VisibleRow> {
        let mut out = Vec::with_capacity(self.rows);
        let mut folds = self.folds.iter().enumerate().peekable();
        let mut row = 0;
        while row < self.rows {
            if let Some((idx, fold)) = folds.next_if(|(_, fold)| fold.start == row) {
                out.push(VisibleRow::Marker(idx));
                if !fold.expanded {
                    row = fold.end;
                    continue;
                }
            }
            out.push(VisibleRow::Row(row));
            row += 1;
        }
        out
    }
}
