//! Optional monitor: an HTTP index page plus a WebSocket stat/log feed.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::stats::StatsPayload;

/// Messages buffered per client before slow consumers start lagging.
const FEED_BUFFER: usize = 64;

const INDEX_HTML: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>trawler</title></head>
<body>
<pre id="stat"></pre>
<pre id="log"></pre>
<script>
const ws = new WebSocket(`ws://${location.host}/ws`);
ws.onmessage = (event) => {
  for (const line of event.data.split("\n")) {
    if (!line) continue;
    const payload = JSON.parse(line);
    if (payload.kind === "stat") {
      document.getElementById("stat").textContent =
        JSON.stringify(payload.body, null, 2);
    } else {
      const log = document.getElementById("log");
      log.textContent = (payload.body + "\n" + log.textContent).slice(0, 20000);
    }
  }
};
</script>
</body>
</html>
"#;

/// Envelope for every message pushed over the monitor socket.
#[derive(Debug, Serialize)]
struct Payload<T> {
    kind: &'static str,
    body: T,
}

/// Fan-out handle for stat and log payloads to connected monitor clients.
#[derive(Clone)]
pub(crate) struct MonitorHandle {
    tx: broadcast::Sender<String>,
}

impl MonitorHandle {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_BUFFER);
        Self { tx }
    }

    /// Log to the process logger and mirror the line to monitor clients.
    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{message}");
        self.send(&Payload {
            kind: "log",
            body: message,
        });
    }

    pub fn stat(&self, payload: &StatsPayload) {
        self.send(&Payload {
            kind: "stat",
            body: payload,
        });
    }

    fn send<T: Serialize>(&self, payload: &Payload<T>) {
        match serde_json::to_string(payload) {
            // A send error only means no client is connected right now.
            Ok(json) => {
                let _ = self.tx.send(json);
            }
            Err(err) => warn!("failed to serialize monitor payload: {err}"),
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

/// Serve the monitor on `port` until `done` fires. A bind failure
/// disables the monitor and is otherwise ignored.
pub(crate) async fn serve(port: u16, handle: MonitorHandle, done: CancellationToken) {
    let app = Router::new()
        .route("/", get(index))
        .route("/ws", get(upgrade))
        .with_state(handle);

    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(err) => {
            warn!("monitor disabled, could not bind port {port}: {err}");
            return;
        }
    };

    info!("monitor listening on :{port}");
    let server = axum::serve(listener, app).with_graceful_shutdown(done.cancelled_owned());
    if let Err(err) = server.await {
        warn!("monitor server stopped: {err}");
    }
}

async fn index() -> impl IntoResponse {
    Html(INDEX_HTML)
}

async fn upgrade(ws: WebSocketUpgrade, State(handle): State<MonitorHandle>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| client_loop(socket, handle.subscribe()))
}

/// Forward the broadcast feed to one client until either side closes.
async fn client_loop(mut socket: WebSocket, mut feed: broadcast::Receiver<String>) {
    loop {
        tokio::select! {
            update = feed.recv() => match update {
                Ok(json) => {
                    if socket.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                // A lag only means this client missed some updates.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(err)) => {
                    debug!("monitor client error: {err}");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}
