use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use jsonfifo_frame::JsonFrameCodec;
use jsonfifo_transport::{provision, ChannelPaths, Role};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::codec::Encoder;
use tracing::{debug, error, info, trace, warn};

use crate::config::EndpointConfig;
use crate::control::ControlMessage;
use crate::duplex::{ChannelEvent, DuplexChannel, StreamEvent};
use crate::error::{EndpointError, Result};
use crate::event::{ErrorEvent, ErrorKind, IpcEvent};
use crate::state::{ConnectionState, ConnectionStateMachine, Transition};

/// Upper bound on how long `close` waits for queued frames and `end` to
/// reach the pipe.
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

enum Command {
    Send(Bytes),
    Close(oneshot::Sender<()>),
}

/// One side (host or client) of a JSON message channel over two FIFOs.
///
/// All I/O happens on a background task; methods here never wait on the
/// peer. Incoming data and presence changes are read with
/// [`next_event`](Self::next_event).
pub struct IpcEndpoint {
    paths: ChannelPaths,
    codec: JsonFrameCodec,
    commands: mpsc::UnboundedSender<Command>,
    events: mpsc::UnboundedReceiver<IpcEvent>,
    state: watch::Receiver<ConnectionState>,
    driver: Option<JoinHandle<()>>,
}

impl IpcEndpoint {
    /// Start an endpoint and begin bringing the channel up in the background.
    ///
    /// Only an unusable channel name is reported here; provisioning and
    /// stream failures arrive later as [`IpcEvent::Error`].
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn new(config: EndpointConfig) -> Result<Self> {
        let paths = config.paths()?;
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (channel, stream) = DuplexChannel::new(paths.clone(), config.stream_options());

        info!(
            role = %paths.role(),
            channel = paths.name(),
            dir = ?paths.directory(),
            "starting endpoint"
        );

        let driver = Driver {
            reopen_delay: config.reopen_delay,
            channel,
            stream,
            commands: commands_rx,
            events: events_tx,
            machine: ConnectionStateMachine::new(),
            state: state_tx,
            backlog: VecDeque::new(),
            out_failing: false,
            start_frame: ControlMessage::Start.frame()?,
            end_frame: ControlMessage::End.frame()?,
        };

        Ok(Self {
            paths,
            codec: JsonFrameCodec::with_config(&config.frame_config()),
            commands: commands_tx,
            events: events_rx,
            state: state_rx,
            driver: Some(tokio::spawn(driver.run())),
        })
    }

    /// Queue one JSON message for the peer.
    ///
    /// Returns once the frame is enqueued; there is no delivery
    /// acknowledgement. Messages sent before the peer is reachable are held
    /// and written after the `start` handshake.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> Result<()> {
        let value = serde_json::to_value(message)?;
        let mut frame = BytesMut::new();
        self.codec.clone().encode(&value, &mut frame)?;
        self.commands
            .send(Command::Send(frame.freeze()))
            .map_err(|_| EndpointError::Closed)
    }

    /// Wait for the next event. Returns `None` once the endpoint has stopped
    /// and every queued event has been read.
    pub async fn next_event(&mut self) -> Option<IpcEvent> {
        self.events.recv().await
    }

    /// Next already-queued event, without waiting.
    pub fn try_next_event(&mut self) -> Option<IpcEvent> {
        self.events.try_recv().ok()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn paths(&self) -> &ChannelPaths {
        &self.paths
    }

    pub fn role(&self) -> Role {
        self.paths.role()
    }

    /// Send `end` to the peer, close both streams and stop the endpoint.
    ///
    /// Events emitted during shutdown stay readable through
    /// [`next_event`](Self::next_event). Returns [`EndpointError::Closed`] if
    /// the endpoint had already stopped on its own (e.g. provisioning
    /// failed); calling `close` twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        let Some(driver) = self.driver.take() else {
            return Ok(());
        };

        let (done_tx, done_rx) = oneshot::channel();
        let delivered =
            self.commands.send(Command::Close(done_tx)).is_ok() && done_rx.await.is_ok();
        if let Err(err) = driver.await {
            error!(error = %err, "endpoint task failed");
        }

        if delivered {
            Ok(())
        } else {
            Err(EndpointError::Closed)
        }
    }
}

impl fmt::Debug for IpcEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpcEndpoint")
            .field("role", &self.paths.role())
            .field("channel", &self.paths.name())
            .field("state", &self.state())
            .finish()
    }
}

/// The driver stopped for good (provisioning failed).
struct Halt;

/// Owns every piece of mutable endpoint state; runs as a single task.
struct Driver {
    reopen_delay: Duration,
    channel: DuplexChannel,
    stream: mpsc::UnboundedReceiver<ChannelEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<IpcEvent>,
    machine: ConnectionStateMachine,
    state: watch::Sender<ConnectionState>,
    backlog: VecDeque<Bytes>,
    out_failing: bool,
    start_frame: Bytes,
    end_frame: Bytes,
}

impl Driver {
    async fn run(mut self) {
        if self.bring_up().is_err() {
            return;
        }

        let mut retry = tokio::time::interval(self.reopen_delay);
        retry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let flow = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Send(frame)) => {
                        self.backlog.push_back(frame);
                        self.flush();
                        Ok(())
                    }
                    Some(Command::Close(done)) => {
                        self.shutdown().await;
                        let _ = done.send(());
                        return;
                    }
                    None => {
                        debug!("endpoint handle dropped");
                        self.shutdown().await;
                        return;
                    }
                },
                Some(event) = self.stream.recv() => self.handle_stream(event),
                _ = retry.tick(), if !self.channel.is_out_open() => self.try_open_out(),
            };

            if flow.is_err() {
                return;
            }
        }
    }

    /// Provision the FIFOs and start the reader. The writer is opened by the
    /// retry tick once the peer is listening.
    fn bring_up(&mut self) -> std::result::Result<(), Halt> {
        if let Err(err) = provision(self.channel.paths()) {
            error!(error = %err, "fifo provisioning failed");
            self.emit_error(ErrorKind::Provision, err);
            return Err(Halt);
        }
        self.channel.open_in();
        Ok(())
    }

    fn try_open_out(&mut self) -> std::result::Result<(), Halt> {
        match self.channel.open_out() {
            Ok(()) => {
                self.out_failing = false;
                self.send_control(ControlMessage::Start);
                self.flush();
                Ok(())
            }
            Err(err) if err.is_peer_absent() => {
                trace!("peer not reading yet");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "fifo writer open failed; restarting channel");
                if !self.out_failing {
                    self.out_failing = true;
                    self.emit_error(ErrorKind::StreamWrite, err);
                }
                self.restart()
            }
        }
    }

    /// Queue a control frame ahead of the backlog. A stopped writer is
    /// handled when its failure report arrives.
    fn send_control(&mut self, message: ControlMessage) {
        let frame = match message {
            ControlMessage::Start => self.start_frame.clone(),
            ControlMessage::End => self.end_frame.clone(),
        };
        match self.channel.write(frame) {
            Ok(()) => trace!(control = message.as_str(), "queued control frame"),
            Err(err) => debug!(error = %err, control = message.as_str(), "control frame not queued"),
        }
    }

    /// Hand the backlog to the writer task. Frames stay queued here while
    /// the writer is closed or stopped.
    fn flush(&mut self) {
        while self.channel.is_out_open() {
            let Some(frame) = self.backlog.front() else {
                break;
            };
            if let Err(err) = self.channel.write(frame.clone()) {
                debug!(error = %err, held = self.backlog.len(), "writer stopped; holding backlog");
                break;
            }
            self.backlog.pop_front();
        }
    }

    fn handle_stream(&mut self, event: ChannelEvent) -> std::result::Result<(), Halt> {
        let current = event.generation == self.channel.generation();

        match event.event {
            StreamEvent::Message(value) => match ControlMessage::parse(&value) {
                Some(ControlMessage::End) => {
                    debug!("peer sent end");
                    let transition = self.machine.on_end();
                    self.publish(transition);
                }
                Some(ControlMessage::Start) => {
                    debug!("peer sent start");
                    let transition = self.machine.on_frame();
                    let fresh = transition.is_some();
                    self.publish(transition);
                    if !self.channel.is_out_open() {
                        return self.try_open_out();
                    }
                    // Peer (re)opened while our writer stayed up; it has not
                    // heard from us on its new streams yet.
                    if fresh {
                        self.send_control(ControlMessage::Start);
                    }
                }
                None => {
                    let transition = self.machine.on_frame();
                    self.publish(transition);
                    self.emit(IpcEvent::Data(value));
                }
            },
            StreamEvent::Malformed(message) => self.emit_error(ErrorKind::Decode, message),
            StreamEvent::ReadFailed(message) if current => {
                self.emit_error(ErrorKind::StreamRead, message);
            }
            StreamEvent::Corrupted(message) if current => {
                warn!("inbound stream corrupt; restarting channel");
                self.emit_error(ErrorKind::Decode, message);
                let transition = self.machine.on_write_failure();
                self.publish(transition);
                return self.restart();
            }
            StreamEvent::ReadFailed(_) | StreamEvent::Corrupted(_) => {
                trace!(generation = event.generation, "ignoring stale reader report");
            }
            StreamEvent::WriteFailed { error, unsent }
                if event.generation == self.channel.out_generation() =>
            {
                self.requeue(unsent);
                return self.on_write_error(error);
            }
            StreamEvent::WriteFailed { unsent, .. } => {
                trace!(
                    generation = event.generation,
                    unsent = unsent.len(),
                    "ignoring stale writer report"
                );
            }
        }
        Ok(())
    }

    /// Put frames the writer never wrote back in front of the backlog, so
    /// they go out first on the next writer. Control frames are dropped; the
    /// next writer sends its own `start`.
    fn requeue(&mut self, unsent: Vec<Bytes>) {
        for frame in unsent.into_iter().rev() {
            if frame != self.start_frame && frame != self.end_frame {
                self.backlog.push_front(frame);
            }
        }
    }

    fn on_write_error(&mut self, err: impl fmt::Display) -> std::result::Result<(), Halt> {
        warn!(error = %err, "fifo write failed; restarting channel");
        let transition = self.machine.on_write_failure();
        self.publish(transition);
        self.emit_error(ErrorKind::StreamWrite, err);
        self.restart()
    }

    /// Tear both streams down and run bring-up again.
    fn restart(&mut self) -> std::result::Result<(), Halt> {
        info!("restarting duplex channel");
        self.channel.close();
        let transition = self.machine.reset();
        self.publish(transition);
        self.bring_up()
    }

    async fn shutdown(&mut self) {
        if self.channel.is_out_open() {
            self.send_control(ControlMessage::End);
            if !self.channel.finish_out(CLOSE_DRAIN_TIMEOUT).await {
                warn!("peer is not reading; dropped frames still being written");
            }
        }
        if !self.backlog.is_empty() {
            warn!(dropped = self.backlog.len(), "closing with undelivered messages");
            self.backlog.clear();
        }
        self.channel.close();
        let transition = self.machine.reset();
        self.publish(transition);
        info!("endpoint closed");
    }

    fn publish(&mut self, transition: Option<Transition>) {
        let Some(transition) = transition else {
            return;
        };
        self.state.send_replace(self.machine.state());
        match transition {
            Transition::Connected => {
                info!("peer connected");
                self.emit(IpcEvent::Connected);
            }
            Transition::Disconnected => {
                info!("peer disconnected");
                self.emit(IpcEvent::Disconnected);
            }
        }
    }

    fn emit_error(&self, kind: ErrorKind, message: impl fmt::Display) {
        self.emit(IpcEvent::Error(ErrorEvent::new(kind, message.to_string())));
    }

    fn emit(&self, event: IpcEvent) {
        if self.events.send(event).is_err() {
            trace!("event receiver dropped");
        }
    }
}
