//! Carries out session [`Command`]s: websocket sends go to the transport,
//! HTTP requests run as tasks whose results come back as [`Completion`]s.

use crate::api::{ApiError, TabApi};
use crate::session::{Command, Session};
use agentview_core::protocol::{ClientRequest, CreateTabResponse};
use agentview_core::{ClosedTabSnapshot, Tab};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug)]
pub enum Completion {
    Loaded {
        ticket: u64,
        result: Result<Vec<Tab>, ApiError>,
    },
    Fetched {
        id: String,
        ticket: u64,
        result: Result<Tab, ApiError>,
    },
    Created {
        snapshot: ClosedTabSnapshot,
        result: Result<CreateTabResponse, ApiError>,
    },
}

impl Completion {
    pub fn apply(self, session: &mut Session) -> Vec<Command> {
        match self {
            Completion::Loaded { ticket, result } => session.load_completed(ticket, result),
            Completion::Fetched { id, ticket, result } => {
                session.fetch_completed(&id, ticket, result)
            }
            Completion::Created { snapshot, result } => session.create_completed(snapshot, result),
        }
    }
}

pub struct Driver<A: TabApi> {
    api: Arc<A>,
    outbound: mpsc::Sender<ClientRequest>,
    completions: mpsc::Sender<Completion>,
}

impl<A: TabApi> Driver<A> {
    pub fn new(
        api: Arc<A>,
        outbound: mpsc::Sender<ClientRequest>,
        completions: mpsc::Sender<Completion>,
    ) -> Self {
        Self {
            api,
            outbound,
            completions,
        }
    }

    /// Starts every command and reports whether a render was requested.
    pub fn run(&self, commands: Vec<Command>) -> bool {
        let mut render = false;
        for command in commands {
            match command {
                Command::Send(request) => self.send(request),
                Command::Render => render = true,
                Command::LoadAll { ticket } => {
                    let api = self.api.clone();
                    self.spawn(async move {
                        let result = api.list_tabs().await;
                        Completion::Loaded { ticket, result }
                    });
                }
                Command::Fetch { id, ticket } => {
                    let api = self.api.clone();
                    self.spawn(async move {
                        let result = api.get_tab(&id).await;
                        Completion::Fetched { id, ticket, result }
                    });
                }
                Command::Create { snapshot, request } => {
                    let api = self.api.clone();
                    self.spawn(async move {
                        let result = api.create_tab(request).await;
                        Completion::Created { snapshot, result }
                    });
                }
            }
        }
        render
    }

    /// A request that cannot be queued is dropped; local state already
    /// reflects it and the next load reconciles.
    fn send(&self, request: ClientRequest) {
        if let Err(err) = self.outbound.try_send(request) {
            warn!(event = "request_dropped", error = %err);
        }
    }

    fn spawn<F>(&self, work: F)
    where
        F: std::future::Future<Output = Completion> + Send + 'static,
    {
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let completion = work.await;
            if completions.send(completion).await.is_err() {
                warn!(event = "completion_dropped");
            }
        });
    }
}
