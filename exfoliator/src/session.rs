//! Channel lifecycle: connect, read, write, detect loss, reconnect.
//!
//! The session task never touches client state. It publishes the link state
//! on a `watch` channel and hands everything else to the runtime as
//! [`SessionEvent`]s, in arrival order.

use std::time::Duration;

use exfoliator_common::{InboundMessage, OutboundMessage};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// What the session reports to the runtime.
#[derive(Debug)]
pub enum SessionEvent {
    /// The channel is up. Frames pushed into `writer` go out in order until
    /// the matching `Disconnected`.
    Connected { writer: mpsc::UnboundedSender<Message> },
    Disconnected,
    Message(InboundMessage),
}

/// Requests sent on every (re)connect so the mirror and catalog refill.
pub fn bootstrap_intents() -> [OutboundMessage; 2] {
    [
        OutboundMessage::GetArduinoStatus {},
        OutboundMessage::GetMacros {},
    ]
}

pub struct Session {
    url: String,
    reconnect_delay: Duration,
    state: watch::Sender<ConnectionState>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Session {
    pub fn new(
        url: String,
        reconnect_delay: Duration,
        state: watch::Sender<ConnectionState>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            url,
            reconnect_delay,
            state,
            events,
        }
    }

    /// Connects and reconnects forever with a fixed delay. Returns only when
    /// the runtime has gone away.
    pub async fn run(self) {
        loop {
            self.state.send_replace(ConnectionState::Connecting);
            debug!(url = %self.url, "connecting");

            match connect_async(self.url.as_str()).await {
                Ok((stream, _)) => {
                    info!(url = %self.url, "channel connected");
                    self.drive(stream).await;
                    self.state.send_replace(ConnectionState::Disconnected);
                    if self.events.send(SessionEvent::Disconnected).is_err() {
                        return;
                    }
                    warn!(url = %self.url, "channel lost");
                }
                Err(e) => {
                    self.state.send_replace(ConnectionState::Disconnected);
                    warn!(url = %self.url, "connect failed: {}", e);
                }
            }

            if self.events.is_closed() {
                return;
            }
            debug!("reconnecting in {:?}", self.reconnect_delay);
            sleep(self.reconnect_delay).await;
        }
    }

    /// Pumps one connection until it closes or fails.
    async fn drive(&self, stream: WebSocketStream<MaybeTlsStream<TcpStream>>) {
        let (mut sink, mut frames) = stream.split();
        let (writer, mut outbound) = mpsc::unbounded_channel::<Message>();

        for intent in bootstrap_intents() {
            match intent.encode() {
                Ok(text) => {
                    let _ = writer.send(Message::Text(text));
                }
                Err(e) => warn!("bootstrap request dropped: {}", e),
            }
        }

        // The runtime must hold the writer before anyone observes Connected.
        if self.events.send(SessionEvent::Connected { writer }).is_err() {
            return;
        }
        self.state.send_replace(ConnectionState::Connected);

        loop {
            tokio::select! {
                msg = outbound.recv() => {
                    let Some(msg) = msg else { break };
                    if let Err(e) = sink.send(msg).await {
                        warn!("send failed: {}", e);
                        break;
                    }
                }
                frame = frames.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.dispatch(&text),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("receive failed: {}", e);
                        break;
                    }
                },
            }
        }
    }

    fn dispatch(&self, text: &str) {
        match InboundMessage::decode(text) {
            Ok(InboundMessage::Unrecognized { event }) => {
                debug!(event = %event, "ignoring unrecognized event");
            }
            Ok(msg) => {
                let _ = self.events.send(SessionEvent::Message(msg));
            }
            Err(e) => warn!(frame = %text, "dropping malformed frame: {}", e),
        }
    }
}
