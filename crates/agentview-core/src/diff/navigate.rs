use super::fold::RowClass;

/// Rows `start..end`, all changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HunkGroup {
    pub start: usize,
    pub end: usize,
}

impl HunkGroup {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

pub fn hunk_groups(classes: &[RowClass]) -> Vec<HunkGroup> {
    let mut groups = Vec::new();
    let mut open: Option<usize> = None;
    for (idx, class) in classes.iter().enumerate() {
        match (class, open) {
            (RowClass::Changed, None) => open = Some(idx),
            (RowClass::Changed, Some(_)) => {}
            (_, Some(start)) => {
                groups.push(HunkGroup { start, end: idx });
                open = None;
            }
            (_, None) => {}
        }
    }
    if let Some(start) = open {
        groups.push(HunkGroup {
            start,
            end: classes.len(),
        });
    }
    groups
}

/// Wraparound cursor over change groups. No group is selected until the
/// first move.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HunkNavigator {
    groups: Vec<HunkGroup>,
    current: Option<usize>,
}

impl HunkNavigator {
    pub fn new(groups: Vec<HunkGroup>) -> Self {
        Self {
            groups,
            current: None,
        }
    }

    pub fn from_classes(classes: &[RowClass]) -> Self {
        Self::new(hunk_groups(classes))
    }

    pub fn groups(&self) -> &[HunkGroup] {
        &self.groups
    }

    pub fn total(&self) -> usize {
        self.groups.len()
    }

    /// Number of changed rows across all groups.
    pub fn changed_rows(&self) -> usize {
        self.groups.iter().map(HunkGroup::len).sum()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<HunkGroup> {
        self.current.and_then(|idx| self.groups.get(idx).copied())
    }

    pub fn next(&mut self) -> Option<HunkGroup> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        self.current = Some(match self.current {
            Some(idx) => (idx + 1) % total,
            None => 0,
        });
        self.current()
    }

    pub fn previous(&mut self) -> Option<HunkGroup> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        self.current = Some(match self.current {
            Some(0) | None => total - 1,
            Some(idx) => idx - 1,
        });
        self.current()
    }

    /// Moves the cursor, clamped to the last group.
    pub fn set_current(&mut self, idx: usize) {
        if self.groups.is_empty() {
            self.current = None;
        } else {
            self.current = Some(idx.min(self.groups.len() - 1));
        }
    }

    /// Index of the group containing `row`, if any.
    pub fn group_at(&self, row: usize) -> Option<usize> {
        self.groups
            .iter()
            .position(|group| (group.start..group.end).contains(&row))
    }

    /// `current/total`, 1-based; `0/total` before the first move.
    pub fn position_label(&self) -> String {
        let position = self.current.map(|idx| idx + 1).unwrap_or(0);
        format!("{position}/{}", self.total())
    }
}
