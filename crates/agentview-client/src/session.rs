//! The one context object of a running client.
//!
//! Inputs are transport events, local intents and completed requests; the
//! output of each is a list of [`Command`]s for the driver to carry out. The
//! session itself does no I/O, which keeps every transition testable.

use crate::api::ApiError;
use crate::history::ClosedTabHistory;
use crate::registry::TabRegistry;
use crate::transport::TransportEvent;
use crate::view::{render_tab, RenderedTab};
use agentview_core::diff::FoldConfig;
use agentview_core::protocol::{ClientRequest, CreateTabRequest, CreateTabResponse, ServerEvent};
use agentview_core::{generate_id, ClosedTabSnapshot, Tab};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Send over the websocket.
    Send(ClientRequest),
    /// Fetch the full tab list and hand it to [`Session::load_completed`].
    LoadAll { ticket: u64 },
    /// Fetch one tab and hand it to [`Session::fetch_completed`].
    Fetch { id: String, ticket: u64 },
    /// Create a tab from a closed snapshot, then [`Session::create_completed`].
    Create {
        snapshot: ClosedTabSnapshot,
        request: CreateTabRequest,
    },
    /// The active view changed.
    Render,
}

#[derive(Debug)]
pub struct Session {
    registry: TabRegistry,
    history: ClosedTabHistory,
    fold: FoldConfig,
    connected: bool,
    fetch_ticket: u64,
    load_ticket: u64,
    /// Events applied while the latest listing is in flight, replayed on
    /// top of it when it lands.
    since_load: Option<Vec<ServerEvent>>,
    view: RenderedTab,
    view_stale: bool,
}

impl Session {
    pub fn new(fold: FoldConfig) -> Self {
        Self {
            registry: TabRegistry::new(),
            history: ClosedTabHistory::new(),
            fold,
            connected: false,
            fetch_ticket: 0,
            load_ticket: 0,
            since_load: None,
            view: RenderedTab::Empty,
            view_stale: false,
        }
    }

    pub fn registry(&self) -> &TabRegistry {
        &self.registry
    }

    pub fn history(&self) -> &ClosedTabHistory {
        &self.history
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn handle_transport(&mut self, event: TransportEvent, now: DateTime<Utc>) -> Vec<Command> {
        match event {
            TransportEvent::Connected => {
                self.connected = true;
                self.load_ticket += 1;
                self.since_load = Some(Vec::new());
                vec![Command::LoadAll {
                    ticket: self.load_ticket,
                }]
            }
            TransportEvent::Disconnected => {
                self.connected = false;
                Vec::new()
            }
            TransportEvent::Server(event) => {
                let before = self.registry.active_id().map(str::to_string);
                let applied = self.registry.apply(&event, &mut self.history, now);
                if let Some(pending) = self.since_load.as_mut() {
                    pending.push(event.clone());
                }
                let mut commands = Vec::new();
                if let Some(request) = applied.follow_up {
                    commands.push(Command::Send(request));
                }
                if applied.rerender {
                    self.view_stale = true;
                    commands.push(Command::Render);
                }
                let after = self.registry.active_id().map(str::to_string);
                if let Some(id) = after.filter(|id| before.as_ref() != Some(id)) {
                    // Events carry full tabs except activation of a tab we
                    // may only know from an older listing.
                    if matches!(event, ServerEvent::TabActivated { .. })
                        && self.registry.get(&id).is_some()
                    {
                        commands.push(self.fetch(id));
                    }
                }
                commands
            }
        }
    }

    /// Applies a listing only if it answers the latest load. Events that
    /// arrived after the load was issued are replayed on top of it, so a
    /// listing taken before them cannot undo them.
    pub fn load_completed(
        &mut self,
        ticket: u64,
        result: Result<Vec<Tab>, ApiError>,
    ) -> Vec<Command> {
        if ticket != self.load_ticket {
            debug!(event = "stale_load_dropped", ticket, latest = self.load_ticket);
            return Vec::new();
        }
        let replay = self.since_load.take().unwrap_or_default();
        match result {
            Ok(tabs) => {
                let hint = self.registry.active_id().map(str::to_string);
                info!(event = "tabs_loaded", count = tabs.len(), replayed = replay.len());
                self.registry.load(tabs, hint.as_deref());
                // History already saw these events when they first arrived.
                let mut scratch = ClosedTabHistory::new();
                for event in &replay {
                    self.registry.apply(event, &mut scratch, Utc::now());
                }
                self.view_stale = true;
                vec![Command::Render]
            }
            Err(err) => {
                warn!(event = "load_failed", error = %err);
                Vec::new()
            }
        }
    }

    /// Applies a fetched tab only if it answers the latest fetch and its tab
    /// is still the active one.
    pub fn fetch_completed(
        &mut self,
        id: &str,
        ticket: u64,
        result: Result<Tab, ApiError>,
    ) -> Vec<Command> {
        if ticket != self.fetch_ticket || self.registry.active_id() != Some(id) {
            debug!(event = "stale_fetch_dropped", tab_id = %id, ticket, latest = self.fetch_ticket);
            return Vec::new();
        }
        match result {
            Ok(tab) if tab.id == id => {
                if self.registry.refresh(tab) {
                    self.view_stale = true;
                    vec![Command::Render]
                } else {
                    Vec::new()
                }
            }
            Ok(tab) => {
                warn!(event = "fetch_id_mismatch", tab_id = %id, got = %tab.id);
                Vec::new()
            }
            Err(err) => {
                warn!(event = "fetch_failed", tab_id = %id, error = %err);
                Vec::new()
            }
        }
    }

    pub fn activate(&mut self, id: &str) -> Vec<Command> {
        let Some(request) = self.registry.activate(id) else {
            warn!(event = "activate_unknown_tab", tab_id = %id);
            return Vec::new();
        };
        self.view_stale = true;
        vec![
            Command::Send(request),
            Command::Render,
            self.fetch(id.to_string()),
        ]
    }

    /// Closes `id`, or the active tab when `id` is `None`.
    pub fn close(&mut self, id: Option<&str>, now: DateTime<Utc>) -> Vec<Command> {
        let Some(id) = id.or(self.registry.active_id()).map(str::to_string) else {
            return Vec::new();
        };
        match self.registry.close(&id, &mut self.history, now) {
            Some(request) => vec![Command::Send(request)],
            None => {
                warn!(event = "close_unknown_tab", tab_id = %id);
                Vec::new()
            }
        }
    }

    /// Pops the newest closed tab and asks for it to be recreated under a
    /// fresh id.
    pub fn reopen(&mut self) -> Vec<Command> {
        let Some(snapshot) = self.history.pop() else {
            debug!(event = "reopen_empty");
            return Vec::new();
        };
        let request = CreateTabRequest::from_snapshot(&snapshot, generate_id());
        vec![Command::Create { snapshot, request }]
    }

    /// A failed recreation puts the snapshot back so the reopen can be
    /// retried.
    pub fn create_completed(
        &mut self,
        snapshot: ClosedTabSnapshot,
        result: Result<CreateTabResponse, ApiError>,
    ) -> Vec<Command> {
        match result {
            Ok(response) => {
                info!(event = "tab_reopened", tab_id = %response.id, previous_id = %snapshot.id);
            }
            Err(err) => {
                warn!(event = "reopen_failed", tab_id = %snapshot.id, error = %err);
                self.history.push(snapshot);
            }
        }
        Vec::new()
    }

    /// Activates the tab `offset` positions away from the active one,
    /// wrapping at both ends.
    pub fn cycle(&mut self, offset: isize) -> Vec<Command> {
        let len = self.registry.len();
        if len == 0 {
            return Vec::new();
        }
        let current = self
            .registry
            .active_id()
            .and_then(|id| self.registry.position(id))
            .unwrap_or(0) as isize;
        let next = (current + offset).rem_euclid(len as isize) as usize;
        let id = self.registry.tabs()[next].id.clone();
        self.activate(&id)
    }

    /// Current view of the active tab, rebuilt only after something changed.
    pub fn view(&mut self) -> &RenderedTab {
        self.refresh_view();
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut RenderedTab {
        self.refresh_view();
        &mut self.view
    }

    fn refresh_view(&mut self) {
        if self.view_stale || self.view.tab_id() != self.registry.active_id() {
            self.view = render_tab(self.registry.active_tab(), self.fold);
            self.view_stale = false;
        }
    }

    fn fetch(&mut self, id: String) -> Command {
        self.fetch_ticket += 1;
        Command::Fetch {
            id,
            ticket: self.fetch_ticket,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentview_core::TabType;

    fn tab(id: &str, content: &str) -> Tab {
        Tab::new(id, id.to_uppercase(), TabType::Markdown, content)
    }

    fn loaded(ids: &[&str]) -> Session {
        let mut session = Session::new(FoldConfig::default());
        session.load_completed(0, Ok(ids.iter().map(|id| tab(id, "")).collect()));
        session
    }

    fn fetch_ticket(commands: &[Command]) -> u64 {
        commands
            .iter()
            .find_map(|command| match command {
                Command::Fetch { ticket, .. } => Some(*ticket),
                _ => None,
            })
            .expect("fetch command")
    }

    #[test]
    fn connect_triggers_full_load() {
        let mut session = Session::new(FoldConfig::default());
        assert_eq!(
            session.handle_transport(TransportEvent::Connected, Utc::now()),
            vec![Command::LoadAll { ticket: 1 }]
        );
        assert_eq!(
            session.handle_transport(TransportEvent::Connected, Utc::now()),
            vec![Command::LoadAll { ticket: 2 }]
        );
        assert!(session.is_connected());
        session.handle_transport(TransportEvent::Disconnected, Utc::now());
        assert!(!session.is_connected());
    }

    #[test]
    fn created_tab_is_activated_and_rendered() {
        let mut session = Session::new(FoldConfig::default());
        let commands = session.handle_transport(
            TransportEvent::Server(ServerEvent::TabCreated { tab: tab("a", "# A") }),
            Utc::now(),
        );
        assert_eq!(
            commands,
            vec![
                Command::Send(ClientRequest::ActivateTab { id: "a".to_string() }),
                Command::Render
            ]
        );
        assert_eq!(session.view().tab_id(), Some("a"));
    }

    #[test]
    fn late_fetch_for_previous_tab_is_ignored() {
        let mut session = loaded(&["a", "b"]);
        let first = fetch_ticket(&session.activate("a"));
        let second = fetch_ticket(&session.activate("b"));
        assert!(second > first);

        let stale = session.fetch_completed("a", first, Ok(tab("a", "late")));
        assert!(stale.is_empty());
        assert_eq!(session.registry().get("a").map(|t| t.content.as_str()), Some(""));

        let fresh = session.fetch_completed("b", second, Ok(tab("b", "fresh")));
        assert_eq!(fresh, vec![Command::Render]);
        match session.view() {
            RenderedTab::Text { body, .. } => assert_eq!(body, "fresh"),
            other => panic!("unexpected view {other:?}"),
        }
    }

    #[test]
    fn fetch_is_dropped_when_active_tab_moved_on_without_new_fetch() {
        let mut session = loaded(&["a", "b"]);
        let ticket = fetch_ticket(&session.activate("b"));
        session.handle_transport(
            TransportEvent::Server(ServerEvent::TabDeleted { id: "b".to_string() }),
            Utc::now(),
        );
        assert!(session
            .fetch_completed("b", ticket, Ok(tab("b", "x")))
            .is_empty());
    }

    #[test]
    fn failed_reopen_restores_snapshot() {
        let mut session = loaded(&["a"]);
        session.close(None, Utc::now());
        assert_eq!(session.history().len(), 1);

        let commands = session.reopen();
        let Some(Command::Create { snapshot, request }) = commands.into_iter().next() else {
            panic!("expected create command");
        };
        assert_ne!(request.id.as_deref(), Some("a"));
        assert_eq!(request.title, "A");
        assert!(session.history().is_empty());

        session.create_completed(
            snapshot,
            Err(ApiError::Status {
                status: 500,
                message: "boom".to_string(),
            }),
        );
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.history().peek().map(|s| s.id.as_str()), Some("a"));
    }

    #[test]
    fn reopen_with_empty_history_does_nothing() {
        let mut session = loaded(&[]);
        assert!(session.reopen().is_empty());
    }

    #[test]
    fn cycle_wraps_in_both_directions() {
        let mut session = loaded(&["a", "b", "c"]);
        session.cycle(-1);
        assert_eq!(session.registry().active_id(), Some("c"));
        session.cycle(1);
        assert_eq!(session.registry().active_id(), Some("a"));
    }

    #[test]
    fn remote_activation_fetches_known_tab() {
        let mut session = loaded(&["a", "b"]);
        let commands = session.handle_transport(
            TransportEvent::Server(ServerEvent::TabActivated { id: "b".to_string() }),
            Utc::now(),
        );
        assert!(commands.contains(&Command::Render));
        assert!(matches!(commands.last(), Some(Command::Fetch { id, .. }) if id == "b"));
    }

    fn load_ticket(commands: &[Command]) -> u64 {
        commands
            .iter()
            .find_map(|command| match command {
                Command::LoadAll { ticket } => Some(*ticket),
                _ => None,
            })
            .expect("load command")
    }

    fn server(session: &mut Session, event: ServerEvent) {
        session.handle_transport(TransportEvent::Server(event), Utc::now());
    }

    #[test]
    fn events_after_reconnect_survive_an_older_listing() {
        let mut session = loaded(&["a", "b"]);
        let ticket = load_ticket(&session.handle_transport(TransportEvent::Connected, Utc::now()));
        server(&mut session, ServerEvent::TabDeleted { id: "a".to_string() });
        server(&mut session, ServerEvent::TabCreated { tab: tab("c", "new") });
        let history_before = session.history().len();

        // The listing was taken before the delete and the create.
        let commands = session.load_completed(ticket, Ok(vec![tab("a", ""), tab("b", "")]));
        assert_eq!(commands, vec![Command::Render]);
        let ids: Vec<&str> = session.registry().tabs().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["b", "c"]);
        assert_eq!(session.history().len(), history_before);
    }

    #[test]
    fn listing_from_a_superseded_connection_is_dropped() {
        let mut session = loaded(&["a"]);
        let first = load_ticket(&session.handle_transport(TransportEvent::Connected, Utc::now()));
        let second = load_ticket(&session.handle_transport(TransportEvent::Connected, Utc::now()));

        assert!(session.load_completed(first, Ok(vec![tab("old", "")])).is_empty());
        assert!(session.registry().get("old").is_none());

        session.load_completed(second, Ok(vec![tab("a", ""), tab("z", "")]));
        assert_eq!(session.registry().len(), 2);
        // Events after the load landed are applied live, not buffered.
        server(&mut session, ServerEvent::TabDeleted { id: "z".to_string() });
        assert_eq!(session.registry().len(), 1);
    }
}
