use agentview_client::{
    ApiError, Command, Completion, Driver, RenderedTab, Session, TabApi, TransportEvent,
};
use agentview_core::diff::FoldConfig;
use agentview_core::protocol::{ClientRequest, CreateTabRequest, CreateTabResponse, ServerEvent};
use agentview_core::{Tab, TabType};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// In-memory hub: serves a fixed tab list and records creations.
#[derive(Default)]
struct FakeHub {
    tabs: Mutex<Vec<Tab>>,
    created: Mutex<Vec<CreateTabRequest>>,
    fail_create: bool,
}

impl TabApi for FakeHub {
    async fn list_tabs(&self) -> Result<Vec<Tab>, ApiError> {
        Ok(self.tabs.lock().expect("tabs").clone())
    }

    async fn get_tab(&self, id: &str) -> Result<Tab, ApiError> {
        self.tabs
            .lock()
            .expect("tabs")
            .iter()
            .find(|tab| tab.id == id)
            .cloned()
            .ok_or_else(|| ApiError::Status {
                status: 404,
                message: "tab not found".to_string(),
            })
    }

    async fn create_tab(&self, request: CreateTabRequest) -> Result<CreateTabResponse, ApiError> {
        if self.fail_create {
            return Err(ApiError::Transport("connection refused".to_string()));
        }
        let response = CreateTabResponse {
            id: request.id.clone().unwrap_or_default(),
            title: request.title.clone(),
            tab_type: request.parsed_type().ok().flatten().unwrap_or_default(),
            created: true,
        };
        self.created.lock().expect("created").push(request);
        Ok(response)
    }
}

const DIFF: &str = "--- a/src/lib.rs\n+++ b/src/lib.rs\n@@ -1,3 +1,3 @@\n-fn old() {}\n+fn new() {}\n keep\n";

struct Harness {
    session: Session,
    driver: Driver<FakeHub>,
    hub: Arc<FakeHub>,
    outbound: mpsc::Receiver<ClientRequest>,
    completions: mpsc::Receiver<Completion>,
}

impl Harness {
    fn new(hub: FakeHub) -> Self {
        let hub = Arc::new(hub);
        let (out_tx, outbound) = mpsc::channel(16);
        let (done_tx, completions) = mpsc::channel(16);
        Self {
            session: Session::new(FoldConfig::default()),
            driver: Driver::new(hub.clone(), out_tx, done_tx),
            hub,
            outbound,
            completions,
        }
    }

    async fn complete_one(&mut self) {
        let completion = tokio::time::timeout(Duration::from_secs(2), self.completions.recv())
            .await
            .expect("completion in time")
            .expect("completion channel open");
        let commands = completion.apply(&mut self.session);
        self.driver.run(commands);
    }

    fn event(&mut self, event: ServerEvent) -> Vec<Command> {
        let commands = self
            .session
            .handle_transport(TransportEvent::Server(event), Utc::now());
        self.driver.run(commands.clone());
        commands
    }
}

#[tokio::test]
async fn reconnect_loads_snapshot_and_renders_diff() {
    let hub = FakeHub::default();
    *hub.tabs.lock().expect("tabs") = vec![
        Tab::new("notes", "Notes", TabType::Markdown, "# hi"),
        Tab {
            active: true,
            ..Tab::new("d1", "lib.rs (unstaged)", TabType::Diff, DIFF)
        },
    ];
    let mut harness = Harness::new(hub);

    let commands = harness
        .session
        .handle_transport(TransportEvent::Connected, Utc::now());
    assert_eq!(commands, vec![Command::LoadAll { ticket: 1 }]);
    harness.driver.run(commands);
    harness.complete_one().await;

    assert_eq!(harness.session.registry().len(), 2);
    assert_eq!(harness.session.registry().active_id(), Some("d1"));
    let RenderedTab::Diff(view) = harness.session.view() else {
        panic!("active diff should render side by side");
    };
    assert_eq!(view.rows.language.as_deref(), Some("rust"));
    assert_eq!(view.nav.total(), 1);
    assert_eq!(view.rows.left.len(), view.rows.right.len());
}

#[tokio::test]
async fn close_echo_and_reopen_round_trip() {
    let mut harness = Harness::new(FakeHub::default());
    harness.event(ServerEvent::TabCreated {
        tab: Tab::new("a", "Alpha", TabType::Code, "x = 1").with_language("python"),
    });
    assert_eq!(
        harness.outbound.recv().await,
        Some(ClientRequest::ActivateTab { id: "a".to_string() })
    );

    let commands = harness.session.close(None, Utc::now());
    harness.driver.run(commands);
    assert_eq!(
        harness.outbound.recv().await,
        Some(ClientRequest::CloseTab { id: "a".to_string() })
    );
    harness.event(ServerEvent::TabDeleted { id: "a".to_string() });
    assert!(harness.session.registry().is_empty());
    assert_eq!(harness.session.history().len(), 1);
    assert_eq!(*harness.session.view(), RenderedTab::Empty);

    let commands = harness.session.reopen();
    harness.driver.run(commands);
    harness.complete_one().await;
    assert!(harness.session.history().is_empty());

    let created = harness.hub.created.lock().expect("created").clone();
    assert_eq!(created.len(), 1);
    assert_ne!(created[0].id.as_deref(), Some("a"));
    assert_eq!(created[0].title, "Alpha");
    assert_eq!(created[0].tab_type.as_deref(), Some("code"));
    assert_eq!(created[0].language.as_deref(), Some("python"));
}

#[tokio::test]
async fn failed_reopen_keeps_snapshot_for_retry() {
    let mut harness = Harness::new(FakeHub {
        fail_create: true,
        ..FakeHub::default()
    });
    harness.event(ServerEvent::TabCreated {
        tab: Tab::new("a", "Alpha", TabType::Markdown, ""),
    });
    harness.event(ServerEvent::TabDeleted { id: "a".to_string() });
    assert_eq!(harness.session.history().len(), 1);

    let commands = harness.session.reopen();
    harness.driver.run(commands);
    harness.complete_one().await;
    assert_eq!(harness.session.history().len(), 1);
}

#[tokio::test]
async fn unknown_activation_clears_view_documented_edge_case() {
    let mut harness = Harness::new(FakeHub::default());
    harness.event(ServerEvent::TabCreated {
        tab: Tab::new("a", "Alpha", TabType::Markdown, "# a"),
    });
    assert_eq!(harness.session.view().tab_id(), Some("a"));

    let commands = harness.event(ServerEvent::TabActivated {
        id: "ghost".to_string(),
    });
    assert!(commands.contains(&Command::Render));
    assert_eq!(*harness.session.view(), RenderedTab::Empty);
}

#[tokio::test]
async fn malformed_frames_never_reach_the_registry() {
    let mut harness = Harness::new(FakeHub::default());
    for raw in ["", "{", r#"{"type":"tab_created"}"#, r#"{"type":"bogus","id":"x"}"#] {
        if let Some(event) = agentview_client::transport::decode_server_event(raw) {
            harness.event(event);
        }
    }
    assert!(harness.session.registry().is_empty());
}
