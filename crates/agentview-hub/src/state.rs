use agentview_core::{generate_id, Tab};
use chrono::{DateTime, Utc};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Server-owned tab collection. Tabs keep insertion order; exactly one (or
/// none) is active.
#[derive(Debug, Default)]
pub struct TabStore {
    order: Vec<String>,
    tabs: HashMap<String, Tab>,
    active_id: Option<String>,
}

impl TabStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `tab`, or replaces the stored tab with the same id. Returns
    /// the stored copy and whether it was created. The first tab ever stored
    /// into an empty collection becomes active.
    pub fn upsert(&mut self, mut tab: Tab, now: DateTime<Utc>) -> (Tab, bool) {
        if tab.id.trim().is_empty() {
            tab.id = generate_id();
        }
        let id = tab.id.clone();
        let (mut stored, created) = match self.tabs.entry(id.clone()) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                existing.title = tab.title;
                existing.tab_type = tab.tab_type;
                existing.content = tab.content;
                existing.language = tab.language;
                existing.diff = tab.diff;
                existing.source_path = tab.source_path;
                existing.updated_at = Some(now);
                (existing.clone(), false)
            }
            Entry::Vacant(entry) => {
                tab.created_at = Some(now);
                tab.updated_at = Some(now);
                (entry.insert(tab).clone(), true)
            }
        };
        if created {
            self.order.push(id.clone());
            if self.order.len() == 1 {
                self.active_id = Some(id.clone());
            }
        }
        stored.active = self.active_id.as_deref() == Some(id.as_str());
        (stored, created)
    }

    /// Copy of the tab with `active` filled in.
    pub fn get(&self, id: &str) -> Option<Tab> {
        self.tabs.get(id).map(|tab| Tab {
            active: self.active_id.as_deref() == Some(id),
            ..tab.clone()
        })
    }

    pub fn list(&self) -> Vec<Tab> {
        self.order.iter().filter_map(|id| self.get(id)).collect()
    }

    pub fn delete(&mut self, id: &str) -> bool {
        if self.tabs.remove(id).is_none() {
            return false;
        }
        self.order.retain(|existing| existing != id);
        if self.active_id.as_deref() == Some(id) {
            self.active_id = self.order.first().cloned();
        }
        true
    }

    pub fn set_active(&mut self, id: &str) -> bool {
        if !self.tabs.contains_key(id) {
            return false;
        }
        self.active_id = Some(id.to_string());
        true
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.tabs.clear();
        self.active_id = None;
    }

    pub fn count(&self) -> usize {
        self.tabs.len()
    }

    /// Replaces only the content, used when a watched file changes on disk.
    pub fn update_content(&mut self, id: &str, content: String, now: DateTime<Utc>) -> Option<Tab> {
        let tab = self.tabs.get_mut(id)?;
        tab.content = content;
        tab.updated_at = Some(now);
        self.get(id)
    }
}
