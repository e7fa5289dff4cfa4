use agentview_core::ClosedTabSnapshot;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

pub const MAX_CLOSED_TABS: usize = 10;

/// Recently closed tabs, newest last. Oldest entries fall off the front once
/// the stack is full.
#[derive(Debug, Clone)]
pub struct ClosedTabHistory {
    entries: VecDeque<ClosedTabSnapshot>,
    capacity: usize,
}

impl Default for ClosedTabHistory {
    fn default() -> Self {
        Self::with_capacity(MAX_CLOSED_TABS)
    }
}

impl ClosedTabHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, snapshot: ClosedTabSnapshot) {
        self.entries.push_back(snapshot);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn pop(&mut self) -> Option<ClosedTabSnapshot> {
        self.entries.pop_back()
    }

    pub fn peek(&self) -> Option<&ClosedTabSnapshot> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClosedTabSnapshot> + '_ {
        self.entries.iter()
    }

    /// True when a snapshot of `id` was closed within `window` before `now`.
    pub fn recently_recorded(&self, id: &str, now: DateTime<Utc>, window: Duration) -> bool {
        self.entries
            .iter()
            .rev()
            .any(|entry| entry.id == id && now - entry.closed_at <= window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentview_core::TabType;

    fn snapshot(id: &str, closed_at: DateTime<Utc>) -> ClosedTabSnapshot {
        ClosedTabSnapshot {
            id: id.to_string(),
            title: format!("tab {id}"),
            tab_type: TabType::Markdown,
            content: String::new(),
            language: None,
            closed_at,
        }
    }

    #[test]
    fn eleventh_push_evicts_the_oldest() {
        let now = Utc::now();
        let mut history = ClosedTabHistory::new();
        for idx in 0..11 {
            history.push(snapshot(&idx.to_string(), now));
        }
        assert_eq!(history.len(), MAX_CLOSED_TABS);
        assert_eq!(history.iter().next().map(|s| s.id.as_str()), Some("1"));
        assert_eq!(history.pop().map(|s| s.id), Some("10".to_string()));
    }

    #[test]
    fn pop_on_empty_is_none() {
        let mut history = ClosedTabHistory::new();
        assert!(history.pop().is_none());
        assert!(history.is_empty());
    }

    #[test]
    fn recently_recorded_honours_window() {
        let now = Utc::now();
        let mut history = ClosedTabHistory::new();
        history.push(snapshot("a", now - Duration::seconds(5)));
        history.push(snapshot("b", now - Duration::milliseconds(300)));
        let window = Duration::seconds(1);
        assert!(history.recently_recorded("b", now, window));
        assert!(!history.recently_recorded("a", now, window));
        assert!(!history.recently_recorded("c", now, window));
    }
}
