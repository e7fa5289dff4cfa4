use agentview_core::protocol::{
    decode_frame, encode_frame, ClientRequest, ServerEvent, DEFAULT_MAX_FRAME_BYTES,
};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

const OUTBOUND_QUEUE: usize = 64;

/// Doubling delay between reconnect attempts, capped, with no attempt limit.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    initial: Duration,
    max: Duration,
    current: Duration,
    attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

impl ReconnectPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
            attempts: 0,
        }
    }

    /// Delay before the next attempt; every call counts as one failed attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = next_backoff(self.current, self.max);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    let next = current + current;
    if next > max {
        max
    } else {
        next
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Server(ServerEvent),
}

/// Decodes one inbound text frame. Malformed frames are logged and dropped.
pub fn decode_server_event(text: &str) -> Option<ServerEvent> {
    match decode_frame::<ServerEvent>(text, DEFAULT_MAX_FRAME_BYTES) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(event = "message_invalid", error = %err);
            None
        }
    }
}

/// Owns the single live connection task. `connect` aborts whatever task was
/// running before, so only the newest socket ever delivers events.
#[derive(Debug, Default)]
pub struct SessionTransport {
    task: Option<JoinHandle<()>>,
    outbound: Option<mpsc::Sender<ClientRequest>>,
}

impl SessionTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(
        &mut self,
        url: Url,
        events: mpsc::Sender<TransportEvent>,
        policy: ReconnectPolicy,
    ) -> mpsc::Sender<ClientRequest> {
        self.shutdown();
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        self.task = Some(tokio::spawn(transport_loop(url, events, rx, policy)));
        self.outbound = Some(tx.clone());
        tx
    }

    pub fn sender(&self) -> Option<mpsc::Sender<ClientRequest>> {
        self.outbound.clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn shutdown(&mut self) {
        self.outbound = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SessionTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn transport_loop(
    url: Url,
    events: mpsc::Sender<TransportEvent>,
    mut outbound: mpsc::Receiver<ClientRequest>,
    mut policy: ReconnectPolicy,
) {
    loop {
        let (mut ws, _) = match connect_async(url.clone()).await {
            Ok(value) => value,
            Err(err) => {
                let delay = policy.next_delay();
                warn!(
                    event = "connect_failed",
                    url = %url,
                    attempt = policy.attempts(),
                    retry_in_ms = delay.as_millis() as u64,
                    error = %err
                );
                tokio::time::sleep(delay).await;
                continue;
            }
        };
        policy.reset();
        info!(event = "connected", url = %url);
        if events.send(TransportEvent::Connected).await.is_err() {
            let _ = ws.close(None).await;
            return;
        }

        loop {
            tokio::select! {
                msg = ws.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let Some(event) = decode_server_event(&text) else {
                                continue;
                            };
                            debug!(event = "server_event", kind = event.kind());
                            if events.send(TransportEvent::Server(event)).await.is_err() {
                                let _ = ws.close(None).await;
                                return;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            warn!(event = "socket_error", error = %err);
                            break;
                        }
                    }
                }
                request = outbound.recv() => {
                    let Some(request) = request else {
                        let _ = ws.close(None).await;
                        return;
                    };
                    let frame = match encode_frame(&request, DEFAULT_MAX_FRAME_BYTES) {
                        Ok(frame) => frame,
                        Err(err) => {
                            warn!(event = "request_encode_failed", error = %err);
                            continue;
                        }
                    };
                    if ws.send(Message::Text(frame)).await.is_err() {
                        warn!(event = "request_send_failed", tab_id = request.tab_id());
                        break;
                    }
                }
            }
        }

        let _ = ws.close(None).await;
        info!(event = "disconnected", url = %url);
        if events.send(TransportEvent::Disconnected).await.is_err() {
            return;
        }
        tokio::time::sleep(policy.next_delay()).await;
    }
}
