//! WebSocket front of the simulated relay.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use exfoliator_common::{InboundMessage, OutboundMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::{accept_async, tungstenite, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::relay::{Reaction, RelayState};

#[derive(Debug, Clone)]
pub struct SimConfig {
    /// How long a started program runs before it reports its outcome.
    pub program_duration: Duration,
    /// How long a stopped program takes to reach its next line and report.
    pub stop_latency: Duration,
    pub respond_to_toggles: bool,
    pub controller_connected: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            program_duration: Duration::from_millis(2000),
            stop_latency: Duration::from_millis(100),
            respond_to_toggles: true,
            controller_connected: true,
        }
    }
}

struct Shared {
    state: Mutex<RelayState>,
    received: Mutex<Vec<OutboundMessage>>,
    /// Text frames for every client.
    outgoing: broadcast::Sender<String>,
    /// Bumped to close every client connection. Kept apart from `outgoing`
    /// so a lagging client cannot miss it.
    kicks: watch::Sender<u64>,
    program_duration: Duration,
    stop_latency: Duration,
}

impl Shared {
    fn new(config: &SimConfig) -> Arc<Self> {
        let state = RelayState::new(config.respond_to_toggles, config.controller_connected);
        let (outgoing, _) = broadcast::channel(256);
        let (kicks, _) = watch::channel(0);
        Arc::new(Self {
            state: Mutex::new(state),
            received: Mutex::new(Vec::new()),
            outgoing,
            kicks,
            program_duration: config.program_duration,
            stop_latency: config.stop_latency,
        })
    }

    fn broadcast(&self, msg: &InboundMessage) {
        match msg.encode() {
            Ok(text) => {
                let _ = self.outgoing.send(text);
            }
            Err(e) => error!("failed to encode broadcast: {}", e),
        }
    }

    /// Reports the outcome of `run` after `delay`, unless it already ended.
    fn finish_later(self: &Arc<Self>, run: u64, delay: Duration) {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            sleep(delay).await;
            let outcome = shared.state.lock().await.finish_program(run);
            if let Some(msg) = outcome {
                shared.broadcast(&msg);
            }
        });
    }

    /// Handles one intent; returns the frames for the sender only.
    async fn handle(self: &Arc<Self>, intent: OutboundMessage) -> Vec<String> {
        debug!(event = intent.event_name(), "intent received");
        let reactions = self.state.lock().await.handle(&intent);
        self.received.lock().await.push(intent);

        let mut replies = Vec::new();
        for reaction in reactions {
            match reaction {
                Reaction::Reply(msg) => match msg.encode() {
                    Ok(text) => replies.push(text),
                    Err(e) => error!("failed to encode reply: {}", e),
                },
                Reaction::Broadcast(msg) => self.broadcast(&msg),
                Reaction::ProgramStarted { run } => self.finish_later(run, self.program_duration),
                Reaction::StopRequested { run } => self.finish_later(run, self.stop_latency),
            }
        }
        replies
    }
}

/// A simulator running in the background, for tests and demos.
pub struct SimHandle {
    addr: SocketAddr,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl SimHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Every intent received so far, across all clients.
    pub async fn received(&self) -> Vec<OutboundMessage> {
        self.shared.received.lock().await.clone()
    }

    pub async fn save_program(&self, name: &str, content: &str) {
        self.shared.state.lock().await.save_program(name, content);
    }

    pub async fn set_respond_to_toggles(&self, respond: bool) {
        self.shared.state.lock().await.respond_to_toggles = respond;
    }

    pub async fn state(&self) -> RelayState {
        self.shared.state.lock().await.clone()
    }

    /// Pushes an event to every client, as if the controller had reported it.
    pub fn broadcast(&self, msg: &InboundMessage) {
        self.shared.broadcast(msg);
    }

    /// Pushes a raw text frame to every client, well-formed or not.
    pub fn send_raw(&self, frame: &str) {
        let _ = self.shared.outgoing.send(frame.to_string());
    }

    /// Closes every open client connection. The listener keeps accepting.
    pub fn kick_clients(&self) {
        self.shared.kicks.send_modify(|n| *n += 1);
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

/// Binds an ephemeral local port and serves in the background.
pub async fn spawn(config: SimConfig) -> io::Result<SimHandle> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let shared = Shared::new(&config);
    let task = tokio::spawn(accept_loop(listener, Arc::clone(&shared)));
    info!(%addr, "simulator listening");
    Ok(SimHandle { addr, shared, task })
}

/// Serves clients on `listener` until the task is dropped.
pub async fn serve(listener: TcpListener, config: SimConfig) -> io::Result<()> {
    let shared = Shared::new(&config);
    info!(addr = %listener.local_addr()?, "simulator listening");
    accept_loop(listener, shared).await;
    Ok(())
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("failed to accept connection: {}", e);
                continue;
            }
        };
        let shared = Arc::clone(&shared);
        tokio::spawn(async move {
            info!(%peer, "client connected");
            if let Err(e) = handle_client(stream, shared).await {
                warn!(%peer, "client error: {}", e);
            }
            info!(%peer, "client disconnected");
        });
    }
}

async fn handle_client(stream: TcpStream, shared: Arc<Shared>) -> Result<(), tungstenite::Error> {
    let ws = accept_async(stream).await?;
    let (mut sink, mut source) = ws.split();
    let mut outgoing = shared.outgoing.subscribe();
    let mut kicks = shared.kicks.subscribe();

    let snapshots = shared.state.lock().await.initial_snapshots();
    for msg in snapshots {
        match msg.encode() {
            Ok(text) => sink.send(Message::Text(text)).await?,
            Err(e) => error!("failed to encode snapshot: {}", e),
        }
    }

    loop {
        tokio::select! {
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => match OutboundMessage::decode(&text) {
                    Ok(intent) => {
                        for reply in shared.handle(intent).await {
                            sink.send(Message::Text(reply)).await?;
                        }
                    }
                    Err(e) => warn!(frame = %text, "invalid intent: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
            },
            _ = kicks.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            out = outgoing.recv() => match out {
                Ok(text) => sink.send(Message::Text(text)).await?,
                Err(broadcast::error::RecvError::Lagged(n)) => warn!("client lagged by {} frames", n),
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}
