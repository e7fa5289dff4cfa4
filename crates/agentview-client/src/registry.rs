//! Client-side mirror of the hub's tab collection.
//!
//! Every server event is applied idempotently, so a confirmation of something
//! the client already did locally (activate, close) changes nothing.

use crate::history::ClosedTabHistory;
use agentview_core::protocol::{ClientRequest, ServerEvent};
use agentview_core::Tab;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

/// A deletion echo within this window of a local close is not recorded twice.
pub const DOUBLE_RECORD_WINDOW_SECS: i64 = 1;

/// Outcome of applying one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    /// The active tab or its content changed.
    pub rerender: bool,
    /// Request the client should send in response.
    pub follow_up: Option<ClientRequest>,
}

impl Applied {
    fn rerender(rerender: bool) -> Self {
        Self {
            rerender,
            follow_up: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TabRegistry {
    tabs: Vec<Tab>,
    active_id: Option<String>,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Tab> {
        self.tabs.iter().find(|tab| tab.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.tabs.iter().position(|tab| tab.id == id)
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    /// The active tab, or `None` when nothing is active or the active id is
    /// not a known tab.
    pub fn active_tab(&self) -> Option<&Tab> {
        self.active_id.as_deref().and_then(|id| self.get(id))
    }

    pub fn apply(
        &mut self,
        event: &ServerEvent,
        history: &mut ClosedTabHistory,
        now: DateTime<Utc>,
    ) -> Applied {
        match event {
            ServerEvent::TabCreated { tab } => {
                self.upsert(tab.clone());
                self.set_active(Some(tab.id.clone()));
                Applied {
                    rerender: true,
                    follow_up: Some(ClientRequest::ActivateTab { id: tab.id.clone() }),
                }
            }
            ServerEvent::TabUpdated { tab } => {
                self.upsert(tab.clone());
                Applied::rerender(self.active_id.as_deref() == Some(tab.id.as_str()))
            }
            ServerEvent::TabDeleted { id } => self.remove(id, history, now),
            ServerEvent::TabActivated { id } => {
                let changed = self.active_id.as_deref() != Some(id.as_str());
                if self.get(id).is_none() {
                    debug!(event = "activate_unknown_tab", tab_id = %id);
                }
                self.set_active(Some(id.clone()));
                Applied::rerender(changed)
            }
            ServerEvent::TabsCleared => {
                let had_content = !self.tabs.is_empty() || self.active_id.is_some();
                self.tabs.clear();
                self.active_id = None;
                Applied::rerender(had_content)
            }
        }
    }

    /// Replaces the collection with a point-in-time listing. Duplicate ids
    /// keep their first occurrence. The active tab is the one the listing
    /// flags, else `hint` when it names a listed tab, else the first.
    pub fn load(&mut self, tabs: Vec<Tab>, hint: Option<&str>) {
        let mut loaded: Vec<Tab> = Vec::with_capacity(tabs.len());
        for tab in tabs {
            if loaded.iter().any(|existing| existing.id == tab.id) {
                continue;
            }
            loaded.push(tab);
        }
        let active = loaded
            .iter()
            .find(|tab| tab.active)
            .map(|tab| tab.id.clone())
            .or_else(|| {
                hint.filter(|id| loaded.iter().any(|tab| tab.id == *id))
                    .map(str::to_string)
            })
            .or_else(|| loaded.first().map(|tab| tab.id.clone()));
        self.tabs = loaded;
        self.set_active(active);
    }

    /// Optimistic local activation. Returns the request to send, or `None`
    /// for an id the registry does not hold.
    pub fn activate(&mut self, id: &str) -> Option<ClientRequest> {
        self.get(id)?;
        self.set_active(Some(id.to_string()));
        Some(ClientRequest::ActivateTab { id: id.to_string() })
    }

    /// Records the tab in `history` right away and returns the close request.
    /// The tab itself stays until the hub's `tab_deleted` arrives.
    pub fn close(
        &mut self,
        id: &str,
        history: &mut ClosedTabHistory,
        now: DateTime<Utc>,
    ) -> Option<ClientRequest> {
        let tab = self.get(id)?;
        history.push(tab.snapshot(now));
        Some(ClientRequest::CloseTab { id: id.to_string() })
    }

    /// Replaces a tab fetched on demand, if it is still present.
    pub fn refresh(&mut self, tab: Tab) -> bool {
        match self.position(&tab.id) {
            Some(idx) => {
                let active = self.active_id.as_deref() == Some(tab.id.as_str());
                self.tabs[idx] = Tab { active, ..tab };
                true
            }
            None => false,
        }
    }

    fn upsert(&mut self, tab: Tab) {
        let active = self.active_id.as_deref() == Some(tab.id.as_str());
        let tab = Tab { active, ..tab };
        match self.position(&tab.id) {
            Some(idx) => self.tabs[idx] = tab,
            None => self.tabs.push(tab),
        }
    }

    fn remove(&mut self, id: &str, history: &mut ClosedTabHistory, now: DateTime<Utc>) -> Applied {
        let Some(idx) = self.position(id) else {
            return Applied::default();
        };
        let window = Duration::seconds(DOUBLE_RECORD_WINDOW_SECS);
        if !history.recently_recorded(id, now, window) {
            history.push(self.tabs[idx].snapshot(now));
        }
        self.tabs.remove(idx);
        if self.active_id.as_deref() != Some(id) {
            return Applied::default();
        }
        let next = self.tabs.first().map(|tab| tab.id.clone());
        self.set_active(next);
        Applied::rerender(true)
    }

    fn set_active(&mut self, id: Option<String>) {
        for tab in &mut self.tabs {
            tab.active = id.as_deref() == Some(tab.id.as_str());
        }
        self.active_id = id;
    }
}
