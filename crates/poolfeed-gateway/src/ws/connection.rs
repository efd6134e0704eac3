use axum::{
    extract::{ws::Message, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use poolfeed_core::types::SessionId;
use poolfeed_hub::{BroadcastHub, SubscriberSession};
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::ws::{message, send};

/// Largest inbound frame accepted. Control messages are tiny.
pub const MAX_INBOUND_BYTES: usize = 64 * 1024;

/// Deregisters its session when dropped, including when the connection
/// future is cancelled mid-loop.
struct Registration {
    hub: BroadcastHub,
    id: SessionId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.hub.deregister(&self.id);
    }
}

/// Axum handler: upgrades HTTP to WebSocket at GET /ws/logs.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.max_message_size(MAX_INBOUND_BYTES)
        .on_upgrade(|socket| async move {
            let (tx, rx) = socket.split();
            run_connection(tx, rx, state).await;
        })
}

/// Per-connection event loop, alive for the whole WS session.
///
/// Generic over the two socket halves so it can be driven without a real
/// WebSocket.
pub async fn run_connection<S, R>(mut tx: S, mut rx: R, state: Arc<AppState>)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let conn_id = SessionId::new();
    info!(conn_id = %conn_id, "new WS connection");

    if !state.log_source_present().await {
        // accepted, but there is nothing to follow
        warn!(conn_id = %conn_id, "log directory missing, connection will receive nothing");
        while let Some(Ok(msg)) = rx.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
        info!(conn_id = %conn_id, "WS connection closed");
        return;
    }

    let hub = state.hub();
    let hub_config = &state.config.hub;
    let (session, mut deliveries) =
        SubscriberSession::new(hub_config.initial_filter(), hub_config.session_queue);
    if let Err(e) = hub.register(&session) {
        warn!(conn_id = %conn_id, error = %e, "subscriber registration failed");
        return;
    }
    let registration = Registration {
        hub,
        id: session.id().clone(),
    };

    loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let text = text.as_str();
                        if text.len() > MAX_INBOUND_BYTES {
                            warn!(conn_id = %conn_id, size = text.len(), "payload too large");
                            break;
                        }
                        message::handle(conn_id.as_str(), text, &session, &hub_config.known_categories);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if tx.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(conn_id = %conn_id, error = %e, "WS read failed");
                        break;
                    }
                    _ => {}
                }
            }

            delivery = deliveries.recv() => {
                let Some(delivery) = delivery else { break };
                if let Err(e) = send::envelope(&mut tx, &delivery).await {
                    debug!(conn_id = %conn_id, error = %e, "WS send failed");
                    break;
                }
            }

            _ = session.evicted() => {
                warn!(conn_id = %conn_id, "subscriber fell behind, closing connection");
                let _ = tx.send(Message::Close(None)).await;
                break;
            }
        }
    }

    drop(registration);
    info!(conn_id = %conn_id, "WS connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::test_state;
    use serde_json::{json, Value};
    use std::io::Write;
    use std::path::Path;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;
    use tokio_stream::wrappers::ReceiverStream;
    use tokio_util::sync::PollSender;

    const WAIT: Duration = Duration::from_secs(5);

    struct Client {
        inbound: mpsc::Sender<Result<Message, axum::Error>>,
        outbound: mpsc::Receiver<Message>,
        task: JoinHandle<()>,
    }

    impl Client {
        fn connect(state: Arc<AppState>) -> Self {
            let (in_tx, in_rx) = mpsc::channel(16);
            let (out_tx, out_rx) = mpsc::channel(16);
            let task = tokio::spawn(run_connection(
                PollSender::new(out_tx),
                ReceiverStream::new(in_rx),
                state,
            ));
            Self {
                inbound: in_tx,
                outbound: out_rx,
                task,
            }
        }

        async fn send_text(&self, text: &str) {
            self.inbound
                .send(Ok(Message::Text(text.to_string().into())))
                .await
                .unwrap();
        }

        async fn next_json(&mut self) -> Value {
            let msg = tokio::time::timeout(WAIT, self.outbound.recv())
                .await
                .expect("timed out waiting for frame")
                .expect("connection closed");
            match msg {
                Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
                other => panic!("expected text frame, got {other:?}"),
            }
        }

        async fn close(self) {
            self.inbound.send(Ok(Message::Close(None))).await.unwrap();
            tokio::time::timeout(WAIT, self.task).await.unwrap().unwrap();
        }
    }

    fn append(path: &Path, text: &str) {
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        f.write_all(text.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn first_frame_is_replay_then_live_main_lines() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let mut client = Client::connect(state.clone());

        assert_eq!(client.next_json().await, json!({ "data": [] }));

        append(
            &dir.path().join("main.log.json"),
            "{\"category\":\"main\",\"msg\":\"block found\"}\n",
        );
        append(
            &dir.path().join("partial.log.json"),
            "{\"category\":\"partials\",\"msg\":\"partial ok\"}\n",
        );
        let frame = client.next_json().await;
        assert_eq!(
            frame,
            json!({ "data": [{ "category": "main", "msg": "block found" }] })
        );

        client.close().await;
        assert!(!state.hub().is_running());
    }

    #[tokio::test]
    async fn control_message_switches_categories() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let mut client = Client::connect(state);
        client.next_json().await;

        client.send_text(r#"{"partials": true}"#).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        append(&dir.path().join("main.log.json"), "main line\n");
        append(&dir.path().join("partial.log.json"), "partial line\n");
        let frame = client.next_json().await;
        assert_eq!(frame, json!({ "data": ["partial line"] }));

        client.close().await;
    }

    #[tokio::test]
    async fn late_client_replays_buffered_records() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let mut first = Client::connect(state.clone());
        first.next_json().await;

        append(&dir.path().join("main.log.json"), "one\ntwo\n");
        assert_eq!(first.next_json().await, json!({ "data": ["one", "two"] }));

        let mut second = Client::connect(state.clone());
        assert_eq!(second.next_json().await, json!({ "data": ["one", "two"] }));

        second.close().await;
        first.close().await;
    }

    #[tokio::test]
    async fn missing_log_dir_accepts_without_registering() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir.path().join("absent"));
        let mut client = Client::connect(state.clone());

        client.send_text(r#"{"main": true}"#).await;
        let nothing = tokio::time::timeout(Duration::from_millis(200), client.outbound.recv()).await;
        assert!(nothing.is_err(), "no frame expected");
        assert_eq!(state.hub().subscriber_count(), 0);
        assert!(!state.hub().is_running());

        client.close().await;
    }

    #[tokio::test]
    async fn oversized_frame_closes_connection() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let mut client = Client::connect(state.clone());
        client.next_json().await;

        client.send_text(&"x".repeat(MAX_INBOUND_BYTES + 1)).await;
        tokio::time::timeout(WAIT, client.task).await.unwrap().unwrap();
        assert_eq!(state.hub().subscriber_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_connection_deregisters() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let mut client = Client::connect(state.clone());
        client.next_json().await;
        assert_eq!(state.hub().subscriber_count(), 1);

        client.task.abort();
        assert!(client.task.await.unwrap_err().is_cancelled());
        assert_eq!(state.hub().subscriber_count(), 0);
        assert!(!state.hub().is_running());
    }

    #[tokio::test]
    async fn ping_is_answered() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let mut client = Client::connect(state);
        client.next_json().await;

        client
            .inbound
            .send(Ok(Message::Ping(vec![1, 2, 3].into())))
            .await
            .unwrap();
        let msg = tokio::time::timeout(WAIT, client.outbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(msg, Message::Pong(data) if data[..] == [1u8, 2, 3]));

        client.close().await;
    }
}
