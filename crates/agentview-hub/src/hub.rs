use crate::state::TabStore;
use crate::watch::FileWatcher;
use agentview_core::protocol::{
    decode_frame, encode_frame, ClientRequest, ServerEvent, DEFAULT_MAX_FRAME_BYTES,
};
use agentview_core::Tab;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outbound frames queued per client before it counts as too slow.
pub const CLIENT_QUEUE: usize = 256;

#[derive(Clone, Debug)]
pub struct HubConfig {
    pub debug: bool,
    pub ping_interval: Duration,
    pub write_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            debug: false,
            ping_interval: Duration::from_secs(30),
            write_timeout: Duration::from_secs(10),
        }
    }
}

struct Client {
    conn_id: String,
    sender: mpsc::Sender<Message>,
    dropped: Notify,
}

impl Client {
    fn new(conn_id: String, sender: mpsc::Sender<Message>) -> Self {
        Self {
            conn_id,
            sender,
            dropped: Notify::new(),
        }
    }
}

pub struct HubState {
    config: HubConfig,
    store: RwLock<TabStore>,
    clients: RwLock<HashMap<String, Arc<Client>>>,
    conn_counter: AtomicU64,
    started: Instant,
    watcher: Option<FileWatcher>,
}

impl HubState {
    pub fn new(config: HubConfig, watcher: Option<FileWatcher>) -> Self {
        Self {
            config,
            store: RwLock::new(TabStore::new()),
            clients: RwLock::new(HashMap::new()),
            conn_counter: AtomicU64::new(0),
            started: Instant::now(),
            watcher,
        }
    }

    pub fn store(&self) -> &RwLock<TabStore> {
        &self.store
    }

    pub fn watcher(&self) -> Option<&FileWatcher> {
        self.watcher.as_ref()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Creates or replaces a tab and tells every client. `source` is the file
    /// the content came from, which is then watched for changes.
    pub async fn upsert_tab(&self, tab: Tab, source: Option<&Path>) -> (Tab, bool) {
        let mut store = self.store.write().await;
        let (tab, created) = store.upsert(tab, Utc::now());
        let event = if created {
            ServerEvent::TabCreated { tab: tab.clone() }
        } else {
            ServerEvent::TabUpdated { tab: tab.clone() }
        };
        self.broadcast(&event).await;
        drop(store);

        if let Some(watcher) = &self.watcher {
            match source {
                Some(path) => watcher.add(path, &tab.id),
                None => watcher.remove_tab(&tab.id),
            }
        }
        info!(event = "tab_stored", tab_id = %tab.id, created = created, kind = %tab.tab_type);
        (tab, created)
    }

    pub async fn delete_tab(&self, id: &str) -> bool {
        let mut store = self.store.write().await;
        if !store.delete(id) {
            return false;
        }
        self.broadcast(&ServerEvent::TabDeleted { id: id.to_string() })
            .await;
        drop(store);
        if let Some(watcher) = &self.watcher {
            watcher.remove_tab(id);
        }
        info!(event = "tab_deleted", tab_id = id);
        true
    }

    pub async fn activate_tab(&self, id: &str) -> bool {
        let mut store = self.store.write().await;
        if !store.set_active(id) {
            return false;
        }
        self.broadcast(&ServerEvent::TabActivated { id: id.to_string() })
            .await;
        debug!(event = "tab_activated", tab_id = id);
        true
    }

    pub async fn clear_tabs(&self) {
        let mut store = self.store.write().await;
        store.clear();
        self.broadcast(&ServerEvent::TabsCleared).await;
        drop(store);
        if let Some(watcher) = &self.watcher {
            watcher.clear();
        }
        info!(event = "tabs_cleared");
    }

    /// Sends `event` to every connected client. The store lock is held by
    /// callers, so clients see events in the order the store changed.
    pub async fn broadcast(&self, event: &ServerEvent) {
        let frame = match encode_frame(event, DEFAULT_MAX_FRAME_BYTES) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(event = "broadcast_encode", kind = event.kind(), error = %err);
                return;
            }
        };
        let clients: Vec<_> = self.clients.read().await.values().cloned().collect();
        for client in &clients {
            if let Err(err) = client.sender.try_send(Message::Text(frame.clone())) {
                warn!(event = "send_error", conn_id = %client.conn_id, error = %err);
                self.remove_client(client, "send_error").await;
            }
        }
        debug!(
            event = "broadcast",
            kind = event.kind(),
            tab_id = event.tab_id().unwrap_or_default(),
            clients = clients.len()
        );
    }

    fn next_conn_id(&self) -> String {
        let id = self.conn_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("conn-{id}")
    }

    async fn register_client(&self, client: Arc<Client>, remote: SocketAddr) {
        self.clients
            .write()
            .await
            .insert(client.conn_id.clone(), client.clone());
        info!(event = "client_connected", conn_id = %client.conn_id, remote = %remote);
    }

    async fn remove_client(&self, client: &Client, reason: &str) {
        if self.clients.write().await.remove(&client.conn_id).is_none() {
            return;
        }
        client.dropped.notify_one();
        info!(event = "client_disconnected", conn_id = %client.conn_id, reason = reason);
    }

    fn start_ping(self: Arc<Self>, client: Arc<Client>) -> Option<JoinHandle<()>> {
        if self.config.ping_interval.is_zero() {
            return None;
        }
        let interval = self.config.ping_interval;
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if client.sender.send(Message::Ping(Vec::new())).await.is_err() {
                    warn!(event = "ping_failed", conn_id = %client.conn_id);
                    self.remove_client(&client, "ping_failed").await;
                    return;
                }
            }
        }))
    }

    async fn handle_request(&self, conn_id: &str, request: ClientRequest) {
        if request.tab_id().trim().is_empty() {
            warn!(event = "message_invalid", conn_id = conn_id, error = "empty tab id");
            return;
        }
        match request {
            ClientRequest::ActivateTab { id } => {
                if !self.activate_tab(&id).await {
                    debug!(event = "activate_miss", conn_id = conn_id, tab_id = %id);
                }
            }
            ClientRequest::CloseTab { id } => {
                if !self.delete_tab(&id).await {
                    debug!(event = "close_miss", conn_id = conn_id, tab_id = %id);
                }
            }
        }
    }

    pub async fn handle_socket(self: Arc<Self>, socket: WebSocket, remote: SocketAddr) {
        let (mut ws_sender, mut ws_receiver) = socket.split();
        let (tx, mut rx) = mpsc::channel::<Message>(CLIENT_QUEUE);
        let write_timeout = self.config.write_timeout;
        let write_task = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let send = ws_sender.send(msg);
                match tokio::time::timeout(write_timeout, send).await {
                    Ok(Ok(())) => {}
                    _ => return,
                }
            }
            let _ = ws_sender
                .send(Message::Close(Some(CloseFrame {
                    code: 1000,
                    reason: "bye".into(),
                })))
                .await;
        });

        let client = Arc::new(Client::new(self.next_conn_id(), tx));
        self.register_client(client.clone(), remote).await;
        let ping = self.clone().start_ping(client.clone());

        let reason = loop {
            let msg = tokio::select! {
                _ = client.dropped.notified() => break "dropped",
                _ = client.sender.closed() => break "write_failed",
                next = ws_receiver.next() => match next {
                    Some(Ok(msg)) => msg,
                    Some(Err(err)) => {
                        warn!(event = "read_error", conn_id = %client.conn_id, error = %err);
                        break "read_error";
                    }
                    None => break "disconnect",
                },
            };
            if let Message::Close(_) = msg {
                info!(event = "client_close", conn_id = %client.conn_id);
                break "client_close";
            }
            let Some(text) = message_text(msg) else {
                continue;
            };
            if self.config.debug {
                debug!(event = "message_received", conn_id = %client.conn_id, raw = %text);
            }
            match decode_frame::<ClientRequest>(&text, DEFAULT_MAX_FRAME_BYTES) {
                Ok(request) => self.handle_request(&client.conn_id, request).await,
                Err(err) => {
                    warn!(event = "message_invalid", conn_id = %client.conn_id, error = %err);
                }
            }
        };

        if let Some(ping) = ping {
            ping.abort();
        }
        self.remove_client(&client, reason).await;
        drop(client);
        let _ = write_task.await;
    }
}

fn message_text(msg: Message) -> Option<String> {
    match msg {
        Message::Text(text) => Some(text),
        Message::Binary(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Message::Close(_) | Message::Ping(_) | Message::Pong(_) => None,
    }
}
