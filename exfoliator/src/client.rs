//! The client runtime and its handle.
//!
//! [`Client::spawn`] starts two tasks: the [`Session`] task that owns the
//! socket, and the runtime task that owns every piece of client state. The
//! runtime selects over session events, handle commands and timer firings,
//! so each state transition runs to completion before the next begins.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use exfoliator_common::{Axis, InboundMessage, MacroVariables, OutboundMessage};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{sleep, Instant};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::session::Session;
use crate::{
    CalibrationTable, ClientConfig, ClientError, ClientEvent, ConfirmationTracker,
    ConnectionState, DeviceStateMirror, Effects, LoadedProgram, MacroQueue, MacroQueueEntry,
    ProgramCatalog, QueueState, SessionEvent, SubjectKey, TimerId, TimerKind,
};

type Reply<T> = oneshot::Sender<Result<T, ClientError>>;

enum Command {
    Send(OutboundMessage, Reply<()>),
    Toggle(SubjectKey, bool, Reply<()>),
    Enqueue(Vec<MacroQueueEntry>, Reply<()>),
    Start(Reply<()>),
    Pause(Reply<()>),
    Resume(Reply<()>),
    Cancel(Reply<()>),
    EmergencyStop(Reply<()>),
    ResetConfirmations(Reply<()>),
    Snapshot(Reply<ClientSnapshot>),
    Shutdown(Reply<()>),
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct QueueSnapshot {
    pub state: QueueState,
    pub in_flight: Option<MacroQueueEntry>,
    pub pending: Vec<MacroQueueEntry>,
    /// Work parked by a pause.
    pub cached: Vec<MacroQueueEntry>,
    pub completed: usize,
}

/// Point-in-time copy of everything the runtime owns.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ClientSnapshot {
    pub connection: ConnectionState,
    pub mirror: DeviceStateMirror,
    pub queue: QueueSnapshot,
    pub programs: Vec<String>,
    pub loaded_program: Option<LoadedProgram>,
    pub pending_confirmations: Vec<SubjectKey>,
}

pub struct Client;

impl Client {
    /// Validates `config` and starts the session and runtime tasks. Must be
    /// called from within a tokio runtime.
    pub fn spawn(config: ClientConfig) -> Result<ClientHandle, ClientError> {
        config.validate()?;

        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_capacity);

        let session = Session::new(
            config.url.clone(),
            config.reconnect_delay(),
            state_tx,
            session_tx,
        );
        let session_task = tokio::spawn(session.run());

        let runtime = Runtime {
            mirror: DeviceStateMirror::new(),
            catalog: ProgramCatalog::new(),
            tracker: ConfirmationTracker::new(config.confirm_timeout()),
            queue: MacroQueue::new(config.settle_delay(), config.calibration.stage_x),
            io: RuntimeIo {
                writer: None,
                events: events.clone(),
                timer_tx,
                timers: HashMap::new(),
                next_timer: 0,
            },
            state: state_rx.clone(),
        };
        tokio::spawn(runtime.run(session_task, session_rx, command_rx, timer_rx));

        Ok(ClientHandle {
            commands: command_tx,
            events,
            state: state_rx,
            calibration: Arc::new(config.calibration),
        })
    }
}

/// Cheap, cloneable access to a running client.
///
/// Input errors are rejected here, before anything reaches the runtime.
#[derive(Clone)]
pub struct ClientHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<ClientEvent>,
    state: watch::Receiver<ConnectionState>,
    calibration: Arc<CalibrationTable>,
}

impl ClientHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Waits until the channel is connected, or `timeout` elapses.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut state = self.state.clone();
        tokio::time::timeout(
            timeout,
            state.wait_for(|s| *s == ConnectionState::Connected),
        )
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false)
    }

    pub fn calibration(&self) -> &CalibrationTable {
        &self.calibration
    }

    /// Sends a raw intent. Fails with `ChannelUnavailable` while disconnected.
    pub async fn send(&self, intent: OutboundMessage) -> Result<(), ClientError> {
        self.request(|reply| Command::Send(intent, reply)).await
    }

    /// Optimistically toggles a control. The outcome arrives later as a
    /// `ChangeConfirmed` or `ChangeRolledBack` event.
    pub async fn toggle(&self, key: SubjectKey, desired: bool) -> Result<(), ClientError> {
        if let SubjectKey::Pneumatic(name) | SubjectKey::Vacuum(name) = &key {
            require_text("component name", name)?;
        }
        self.request(|reply| Command::Toggle(key, desired, reply)).await
    }

    pub async fn enable(&self, axis: Axis) -> Result<(), ClientError> {
        self.toggle(SubjectKey::Axis(axis), true).await
    }

    pub async fn disable(&self, axis: Axis) -> Result<(), ClientError> {
        self.toggle(SubjectKey::Axis(axis), false).await
    }

    /// Homes one axis, or all of them.
    pub async fn home(&self, axis: Option<Axis>) -> Result<(), ClientError> {
        self.send(OutboundMessage::HomeAxis { axis }).await
    }

    pub async fn move_to(&self, axis: Axis, position: f64) -> Result<(), ClientError> {
        require_finite("position", position)?;
        self.send(OutboundMessage::MovePosition { axis, position }).await
    }

    pub async fn set_temperature(&self, temperature: f64) -> Result<(), ClientError> {
        require_finite("temperature", temperature)?;
        self.send(OutboundMessage::SetTemperature { temperature }).await
    }

    pub async fn tape(&self, speed: i64, torque: i64, time: f64) -> Result<(), ClientError> {
        require_finite("time", time)?;
        if time < 0.0 {
            return Err(ClientError::InvalidInput("time cannot be negative".into()));
        }
        self.send(OutboundMessage::TapeMotor {
            speed,
            torque,
            time,
        })
        .await
    }

    /// Sends the emergency stop and cancels any active queue.
    pub async fn emergency_stop(&self) -> Result<(), ClientError> {
        self.request(Command::EmergencyStop).await
    }

    /// Forwards free-form controller text.
    pub async fn send_text(&self, command: &str) -> Result<(), ClientError> {
        let command = require_text("command", command)?;
        self.send(OutboundMessage::SendCommand {
            command: command.to_string(),
        })
        .await
    }

    /// Asks the relay for the saved-program list.
    pub async fn refresh_programs(&self) -> Result<(), ClientError> {
        self.send(OutboundMessage::GetMacros {}).await
    }

    pub async fn load_program(&self, name: &str) -> Result<(), ClientError> {
        let name = require_text("program name", name)?;
        self.send(OutboundMessage::LoadMacro { name: name.into() }).await
    }

    pub async fn save_program(
        &self,
        name: &str,
        content: &str,
        variables: MacroVariables,
    ) -> Result<(), ClientError> {
        let name = require_text("program name", name)?;
        require_text("program content", content)?;
        self.send(OutboundMessage::SaveMacro {
            name: name.into(),
            content: content.into(),
            variables,
        })
        .await
    }

    pub async fn delete_program(&self, name: &str) -> Result<(), ClientError> {
        let name = require_text("program name", name)?;
        self.send(OutboundMessage::DeleteMacro { name: name.into() }).await
    }

    /// Runs a program once, outside the queue.
    pub async fn run_program(&self, name: &str, variables: MacroVariables) -> Result<(), ClientError> {
        let name = require_text("program name", name)?;
        self.send(OutboundMessage::RunMacro {
            name: name.into(),
            variables,
        })
        .await
    }

    pub async fn stop_program(&self) -> Result<(), ClientError> {
        self.send(OutboundMessage::StopMacro {}).await
    }

    /// Replaces the queued batch with one `program` run per target.
    ///
    /// Every target is resolved through the calibration table first; one
    /// unknown target rejects the whole batch.
    pub async fn enqueue<S: AsRef<str>>(&self, program: &str, targets: &[S]) -> Result<(), ClientError> {
        let program = require_text("program name", program)?;
        if targets.is_empty() {
            warn!("enqueue rejected: no targets selected");
            return Err(ClientError::InvalidInput("no targets selected".into()));
        }
        let entries = targets
            .iter()
            .map(|t| MacroQueueEntry::resolve(&self.calibration, program, t.as_ref()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                warn!("enqueue rejected: {}", e);
                e
            })?;
        self.request(|reply| Command::Enqueue(entries, reply)).await
    }

    pub async fn start(&self) -> Result<(), ClientError> {
        self.request(Command::Start).await
    }

    pub async fn pause(&self) -> Result<(), ClientError> {
        self.request(Command::Pause).await
    }

    pub async fn resume(&self) -> Result<(), ClientError> {
        self.request(Command::Resume).await
    }

    pub async fn cancel(&self) -> Result<(), ClientError> {
        self.request(Command::Cancel).await
    }

    /// Drops all open confirmation windows without deciding them.
    pub async fn reset_confirmations(&self) -> Result<(), ClientError> {
        self.request(Command::ResetConfirmations).await
    }

    pub async fn snapshot(&self) -> Result<ClientSnapshot, ClientError> {
        self.request(Command::Snapshot).await
    }

    /// Stops the runtime and the session. Other handles fail with
    /// `Shutdown` afterwards.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        self.request(Command::Shutdown).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| ClientError::Shutdown)?;
        rx.await.map_err(|_| ClientError::Shutdown)?
    }
}

fn require_text<'a>(what: &str, value: &'a str) -> Result<&'a str, ClientError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        warn!("rejected: empty {}", what);
        return Err(ClientError::InvalidInput(format!("{} cannot be empty", what)));
    }
    Ok(trimmed)
}

fn require_finite(what: &str, value: f64) -> Result<(), ClientError> {
    if value.is_finite() {
        Ok(())
    } else {
        warn!("rejected: {} is not a finite number", what);
        Err(ClientError::InvalidInput(format!("{} must be a finite number", what)))
    }
}

/// Side effects over the live channel, timer tasks and the event broadcast.
struct RuntimeIo {
    writer: Option<mpsc::UnboundedSender<Message>>,
    events: broadcast::Sender<ClientEvent>,
    timer_tx: mpsc::UnboundedSender<(TimerId, TimerKind)>,
    timers: HashMap<TimerId, AbortHandle>,
    next_timer: u64,
}

impl Effects for RuntimeIo {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn send(&mut self, intent: OutboundMessage) -> Result<(), ClientError> {
        let writer = self.writer.as_ref().ok_or(ClientError::ChannelUnavailable)?;
        let text = intent.encode()?;
        debug!(event = intent.event_name(), "sending");
        writer
            .send(Message::Text(text))
            .map_err(|_| ClientError::ChannelUnavailable)
    }

    fn schedule(&mut self, kind: TimerKind, after: Duration) -> TimerId {
        self.next_timer += 1;
        let id = TimerId(self.next_timer);
        let tx = self.timer_tx.clone();
        let task = tokio::spawn(async move {
            sleep(after).await;
            let _ = tx.send((id, kind));
        });
        self.timers.insert(id, task.abort_handle());
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(handle) = self.timers.remove(&id) {
            handle.abort();
        }
    }

    fn emit(&mut self, event: ClientEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

struct Runtime {
    mirror: DeviceStateMirror,
    catalog: ProgramCatalog,
    tracker: ConfirmationTracker,
    queue: MacroQueue,
    io: RuntimeIo,
    state: watch::Receiver<ConnectionState>,
}

impl Runtime {
    async fn run(
        mut self,
        session: JoinHandle<()>,
        mut session_rx: mpsc::UnboundedReceiver<SessionEvent>,
        mut command_rx: mpsc::UnboundedReceiver<Command>,
        mut timer_rx: mpsc::UnboundedReceiver<(TimerId, TimerKind)>,
    ) {
        info!("client runtime started");
        loop {
            tokio::select! {
                biased;
                Some(event) = session_rx.recv() => self.on_session(event),
                Some((id, kind)) = timer_rx.recv() => self.on_timer(id, kind),
                command = command_rx.recv() => match command {
                    Some(Command::Shutdown(reply)) => {
                        let _ = reply.send(Ok(()));
                        break;
                    }
                    Some(command) => self.on_command(command),
                    None => break,
                },
            }
        }

        session.abort();
        for (_, timer) in self.io.timers.drain() {
            timer.abort();
        }
        info!("client runtime stopped");
    }

    fn on_session(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connected { writer } => {
                self.io.writer = Some(writer);
                self.io.emit(ClientEvent::Connection(ConnectionState::Connected));
            }
            SessionEvent::Disconnected => {
                self.io.writer = None;
                self.mirror.mark_stale();
                self.io.emit(ClientEvent::Connection(ConnectionState::Disconnected));
            }
            SessionEvent::Message(msg) => self.on_message(msg),
        }
    }

    /// Mirror first, then catalog, then queue, then subscribers.
    fn on_message(&mut self, msg: InboundMessage) {
        if let Some(update) = self.mirror.apply(&msg) {
            self.io.emit(ClientEvent::Mirror(update));
        }
        if self.catalog.apply(&msg) {
            self.io.emit(ClientEvent::Catalog(self.catalog.names().to_vec()));
        }
        if msg.ends_program() {
            self.queue.on_program_finished(&msg, &mut self.io);
        }
        match &msg {
            InboundMessage::MacroError { error } => warn!("program error: {}", error),
            InboundMessage::MachineResponse { response } => debug!("device: {}", response),
            _ => {}
        }
        self.io.emit(ClientEvent::Inbound(msg));
    }

    fn on_timer(&mut self, id: TimerId, kind: TimerKind) {
        if self.io.timers.remove(&id).is_none() {
            debug!(?id, "ignoring cancelled timer");
            return;
        }
        match kind {
            TimerKind::Confirmation(key) => {
                self.tracker.on_deadline(&key, id, &self.mirror, &mut self.io)
            }
            TimerKind::Settle => self.queue.on_settle(id, &mut self.io),
            TimerKind::StopAck => self.queue.on_stop_timeout(id, &mut self.io),
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Send(intent, reply) => {
                let result = self.io.send(intent);
                if let Err(e) = &result {
                    warn!("intent dropped: {}", e);
                }
                let _ = reply.send(result);
            }
            Command::Toggle(key, desired, reply) => {
                self.tracker.request_change(key, desired, &mut self.io);
                let _ = reply.send(Ok(()));
            }
            Command::Enqueue(entries, reply) => {
                let _ = reply.send(self.queue.enqueue_all(entries).map_err(Into::into));
            }
            Command::Start(reply) => {
                let _ = reply.send(self.queue.start(&mut self.io).map_err(Into::into));
            }
            Command::Pause(reply) => {
                let _ = reply.send(self.queue.pause(&mut self.io).map_err(Into::into));
            }
            Command::Resume(reply) => {
                let _ = reply.send(self.queue.resume(&mut self.io).map_err(Into::into));
            }
            Command::Cancel(reply) => {
                let _ = reply.send(self.queue.cancel(&mut self.io).map_err(Into::into));
            }
            Command::EmergencyStop(reply) => {
                let result = self.io.send(OutboundMessage::EmergencyStop {});
                match &result {
                    Ok(()) => warn!("emergency stop sent"),
                    Err(e) => warn!("emergency stop not sent: {}", e),
                }
                if self.queue.is_active() {
                    let _ = self.queue.cancel(&mut self.io);
                }
                let _ = reply.send(result);
            }
            Command::ResetConfirmations(reply) => {
                self.tracker.reset(&mut self.io);
                let _ = reply.send(Ok(()));
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(Ok(self.snapshot()));
            }
            // Handled in the select loop.
            Command::Shutdown(reply) => {
                let _ = reply.send(Ok(()));
            }
        }
    }

    fn snapshot(&self) -> ClientSnapshot {
        ClientSnapshot {
            connection: *self.state.borrow(),
            mirror: self.mirror.clone(),
            queue: QueueSnapshot {
                state: self.queue.state(),
                in_flight: self.queue.in_flight().cloned(),
                pending: self.queue.pending().cloned().collect(),
                cached: self.queue.cached().cloned().collect(),
                completed: self.queue.completed(),
            },
            programs: self.catalog.names().to_vec(),
            loaded_program: self.catalog.loaded().cloned(),
            pending_confirmations: self.tracker.pending_keys(),
        }
    }
}
