//! Long-lived broker connection delivering solved tours.
//!
//! One worker thread owns the socket for the whole process. It connects,
//! subscribes to the solution topic, forwards parsed solutions as
//! [`ChannelEvent`]s and, when the connection drops, waits a fixed delay and
//! starts over. The subscription is re-sent on every new connection; the
//! event sink is installed once at [`NotificationChannel::connect`] and
//! never re-registered.
//!
//! Publishers never touch the socket. They hand a request to the worker and
//! wait for its acknowledgement.

use std::net::TcpStream;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use parking_lot::Mutex;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::config::BrokerConfig;
use crate::error::{VizError, VizResult};
use crate::geometry::Solution;
use crate::stomp::{self, Command, Frame, HeartbeatMonitor, Incoming};
use crate::wire;

const SUBSCRIPTION_ID: &str = "sub-0";

/// How long a socket read may block before the worker gets to run its
/// housekeeping (outgoing heart-beats, queued publishes).
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Something the channel wants the session to know.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Connected and subscribed.
    Connected,
    Solution(Solution),
    /// An established connection was lost; a reconnect is scheduled.
    Disconnected { reason: String },
    /// Connecting keeps failing. Emitted once per failure streak.
    Unreachable { attempts: u32, last_error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// Between attempts.
    Waiting,
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub connections: u64,
    pub failed_attempts: u64,
    pub subscriptions: u64,
    pub solutions: u64,
}

#[derive(Debug)]
struct Shared {
    state: ConnectionState,
    stats: ChannelStats,
    stopping: bool,
}

/// One bidirectional text stream to the broker.
pub trait Transport: Send {
    fn send_text(&mut self, text: &str) -> VizResult<()>;

    /// Wait briefly for the next message. `Ok(None)` means nothing arrived
    /// in time; an error means the connection is gone.
    fn recv_text(&mut self) -> VizResult<Option<String>>;

    fn close(&mut self);
}

/// Opens transports; called again for every reconnect.
pub trait Connector: Send + 'static {
    fn connect(&mut self) -> VizResult<Box<dyn Transport>>;

    /// Value of the STOMP `host` header.
    fn host(&self) -> String;
}

enum Request {
    Publish {
        json: String,
        ack: Sender<VizResult<()>>,
    },
    Shutdown,
}

/// Handle for publishing solution requests through the broker.
#[derive(Clone)]
pub struct Publisher {
    requests: Sender<Request>,
    shared: Arc<Mutex<Shared>>,
    timeout: Duration,
}

impl Publisher {
    /// Publish `json` to the solve destination and wait until it is written
    /// to the socket.
    pub fn publish(&self, json: String) -> VizResult<()> {
        if self.shared.lock().state != ConnectionState::Connected {
            return Err(VizError::Connection(
                "not connected to the broker, try again shortly".into(),
            ));
        }

        let (ack, acked) = bounded(1);
        self.requests
            .send(Request::Publish { json, ack })
            .map_err(|_| VizError::Connection("broker channel is shut down".into()))?;

        match acked.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(VizError::Connection(format!(
                "publish not confirmed within {} ms",
                self.timeout.as_millis()
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                Err(VizError::Connection("broker channel is shut down".into()))
            }
        }
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

struct Settings {
    topic: String,
    destination: String,
    reconnect_delay: Duration,
    heart_beat: (u64, u64),
    connect_timeout: Duration,
    alert_after: u32,
}

/// The process-wide broker connection.
pub struct NotificationChannel {
    requests: Sender<Request>,
    shared: Arc<Mutex<Shared>>,
    publish_timeout: Duration,
    worker: Option<JoinHandle<()>>,
}

impl NotificationChannel {
    /// Start the connection worker. Solutions and connection changes are
    /// delivered on the returned receiver.
    pub fn connect<C: Connector>(
        config: &BrokerConfig,
        connector: C,
    ) -> VizResult<(Self, Receiver<ChannelEvent>)> {
        let (requests_tx, requests_rx) = unbounded();
        let (events_tx, events_rx) = unbounded();
        let shared = Arc::new(Mutex::new(Shared {
            state: ConnectionState::Connecting,
            stats: ChannelStats::default(),
            stopping: false,
        }));

        let worker = Worker {
            connector,
            settings: Settings {
                topic: config.topic.clone(),
                destination: config.destination.clone(),
                reconnect_delay: config.reconnect_delay(),
                heart_beat: (config.heartbeat_outgoing_ms, config.heartbeat_incoming_ms),
                connect_timeout: config.connect_timeout(),
                alert_after: config.alert_after_failures.max(1),
            },
            requests: requests_rx,
            events: events_tx,
            shared: Arc::clone(&shared),
        };

        let handle = std::thread::Builder::new()
            .name("broker".to_string())
            .spawn(move || worker.run())?;

        let channel = Self {
            requests: requests_tx,
            shared,
            publish_timeout: config.publish_timeout(),
            worker: Some(handle),
        };
        Ok((channel, events_rx))
    }

    pub fn publisher(&self) -> Publisher {
        Publisher {
            requests: self.requests.clone(),
            shared: Arc::clone(&self.shared),
            timeout: self.publish_timeout,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    pub fn stats(&self) -> ChannelStats {
        self.shared.lock().stats
    }

    /// Block until the first subscription is in place. Returns `false` on
    /// timeout.
    pub fn wait_connected(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.state() != ConnectionState::Connected {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        true
    }

    /// Disconnect and stop the worker. Safe to call more than once.
    pub fn teardown(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        self.shared.lock().stopping = true;
        let _ = self.requests.send(Request::Shutdown);
        if handle.join().is_err() {
            tracing::error!("broker worker panicked");
        }
    }
}

impl Drop for NotificationChannel {
    fn drop(&mut self) {
        self.teardown();
    }
}

enum Exit {
    Shutdown,
    /// Never got to a subscribed connection.
    Failed(String),
    /// A subscribed connection dropped.
    Lost(String),
}

struct Worker<C: Connector> {
    connector: C,
    settings: Settings,
    requests: Receiver<Request>,
    events: Sender<ChannelEvent>,
    shared: Arc<Mutex<Shared>>,
}

impl<C: Connector> Worker<C> {
    fn run(mut self) {
        let mut failures: u32 = 0;

        loop {
            if self.shared.lock().stopping {
                break;
            }
            self.set_state(ConnectionState::Connecting);
            let exit = match self.connector.connect() {
                Ok(transport) => self.serve(transport),
                Err(e) => Exit::Failed(e.to_string()),
            };

            match exit {
                Exit::Shutdown => break,
                Exit::Lost(reason) => {
                    failures = 0;
                    tracing::warn!(%reason, "broker connection lost, reconnecting");
                    self.emit(ChannelEvent::Disconnected { reason });
                }
                Exit::Failed(reason) => {
                    failures += 1;
                    self.shared.lock().stats.failed_attempts += 1;
                    tracing::warn!(
                        attempt = failures,
                        delay_ms = self.settings.reconnect_delay.as_millis() as u64,
                        error = %reason,
                        "broker connection attempt failed"
                    );
                    if failures == self.settings.alert_after {
                        self.emit(ChannelEvent::Unreachable {
                            attempts: failures,
                            last_error: reason,
                        });
                    }
                }
            }

            self.set_state(ConnectionState::Waiting);
            if !self.pause(self.settings.reconnect_delay) {
                break;
            }
        }

        self.set_state(ConnectionState::Closed);
        tracing::debug!("broker worker stopped");
    }

    /// Sleep between attempts while refusing publishes. Returns `false` if
    /// shutdown was requested.
    fn pause(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.requests.recv_timeout(remaining) {
                Ok(Request::Publish { ack, .. }) => {
                    let _ = ack.send(Err(VizError::Connection(
                        "not connected to the broker".into(),
                    )));
                }
                Ok(Request::Shutdown) | Err(RecvTimeoutError::Disconnected) => return false,
                Err(RecvTimeoutError::Timeout) => return true,
            }
        }
    }

    fn serve(&self, mut transport: Box<dyn Transport>) -> Exit {
        let exit = self.session(transport.as_mut());
        transport.close();
        if !matches!(exit, Exit::Shutdown) {
            self.set_state(ConnectionState::Waiting);
        }
        exit
    }

    fn session(&self, transport: &mut dyn Transport) -> Exit {
        let connect = Frame::connect(&self.connector.host(), self.settings.heart_beat);
        if let Err(e) = transport.send_text(&connect.encode()) {
            return Exit::Failed(e.to_string());
        }

        let server_beat = match self.await_connected(transport) {
            Ok(beat) => beat,
            Err(exit) => return exit,
        };
        let beats = stomp::negotiate(self.settings.heart_beat, server_beat);

        let subscribe = Frame::subscribe(SUBSCRIPTION_ID, &self.settings.topic);
        if let Err(e) = transport.send_text(&subscribe.encode()) {
            return Exit::Failed(e.to_string());
        }

        {
            let mut shared = self.shared.lock();
            shared.state = ConnectionState::Connected;
            shared.stats.connections += 1;
            shared.stats.subscriptions += 1;
        }
        tracing::info!(
            topic = %self.settings.topic,
            send_every_ms = beats.send_every.map(|d| d.as_millis() as u64),
            expect_every_ms = beats.expect_every.map(|d| d.as_millis() as u64),
            "subscribed to broker"
        );
        self.emit(ChannelEvent::Connected);

        let mut monitor = HeartbeatMonitor::new(beats, Instant::now());
        loop {
            if let Some(exit) = self.drain_requests(transport, &mut monitor) {
                return exit;
            }

            let now = Instant::now();
            if monitor.send_due(now) {
                if let Err(e) = transport.send_text(stomp::HEARTBEAT) {
                    return Exit::Lost(e.to_string());
                }
                monitor.record_sent(now);
            }

            match transport.recv_text() {
                Ok(Some(text)) => {
                    monitor.record_received(Instant::now());
                    if let Some(exit) = self.handle_message(&text) {
                        return exit;
                    }
                }
                Ok(None) => {}
                Err(e) => return Exit::Lost(e.to_string()),
            }

            if monitor.is_lost(Instant::now()) {
                return Exit::Lost("broker heart-beat missed".to_string());
            }
        }
    }

    /// Wait for CONNECTED and return the broker's heart-beat offer.
    fn await_connected(&self, transport: &mut dyn Transport) -> Result<(u64, u64), Exit> {
        let deadline = Instant::now() + self.settings.connect_timeout;
        while Instant::now() < deadline {
            if self.shared.lock().stopping {
                return Err(Exit::Shutdown);
            }
            let text = match transport.recv_text() {
                Ok(Some(text)) => text,
                Ok(None) => continue,
                Err(e) => return Err(Exit::Failed(e.to_string())),
            };
            let items = stomp::decode(&text).map_err(|e| Exit::Failed(e.to_string()))?;
            for item in items {
                let Incoming::Frame(frame) = item else {
                    continue;
                };
                match frame.command {
                    Command::Connected => {
                        return Ok(frame
                            .get("heart-beat")
                            .and_then(stomp::parse_heart_beat)
                            .unwrap_or((0, 0)));
                    }
                    Command::Error => return Err(Exit::Failed(broker_error(&frame))),
                    other => {
                        tracing::debug!(command = %other, "ignoring frame before CONNECTED");
                    }
                }
            }
        }
        Err(Exit::Failed(format!(
            "no CONNECTED frame within {} ms",
            self.settings.connect_timeout.as_millis()
        )))
    }

    fn drain_requests(
        &self,
        transport: &mut dyn Transport,
        monitor: &mut HeartbeatMonitor,
    ) -> Option<Exit> {
        while let Ok(request) = self.requests.try_recv() {
            match request {
                Request::Publish { json, ack } => {
                    let frame = Frame::send(&self.settings.destination, json);
                    match transport.send_text(&frame.encode()) {
                        Ok(()) => {
                            monitor.record_sent(Instant::now());
                            let _ = ack.send(Ok(()));
                        }
                        Err(e) => {
                            let reason = e.to_string();
                            let _ = ack.send(Err(e));
                            return Some(Exit::Lost(reason));
                        }
                    }
                }
                Request::Shutdown => {
                    let _ = transport.send_text(&Frame::disconnect().encode());
                    return Some(Exit::Shutdown);
                }
            }
        }
        None
    }

    fn handle_message(&self, text: &str) -> Option<Exit> {
        let items = match stomp::decode(text) {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable broker message");
                return None;
            }
        };

        for item in items {
            let Incoming::Frame(frame) = item else {
                continue;
            };
            match frame.command {
                Command::Message => self.handle_notification(&frame),
                Command::Error => return Some(Exit::Lost(broker_error(&frame))),
                Command::Receipt => {}
                other => tracing::debug!(command = %other, "unexpected frame from broker"),
            }
        }
        None
    }

    fn handle_notification(&self, frame: &Frame) {
        let ours = frame.get("subscription") == Some(SUBSCRIPTION_ID)
            || frame.get("destination") == Some(self.settings.topic.as_str());
        if !ours {
            tracing::debug!(destination = ?frame.get("destination"), "message for another subscription");
            return;
        }

        match wire::decode_notification(&frame.body) {
            Ok(solution) => {
                self.shared.lock().stats.solutions += 1;
                self.emit(ChannelEvent::Solution(solution));
            }
            Err(e) => tracing::warn!(error = %e, "dropping malformed solution notification"),
        }
    }

    fn emit(&self, event: ChannelEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("no one is listening for broker events");
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.shared.lock().state = state;
    }
}

fn broker_error(frame: &Frame) -> String {
    let message = frame.get("message").unwrap_or("broker reported an error");
    if frame.body.is_empty() {
        message.to_string()
    } else {
        format!("{}: {}", message, frame.body.trim())
    }
}

/// Connects to the broker over a plain WebSocket.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Connector for WsConnector {
    fn connect(&mut self) -> VizResult<Box<dyn Transport>> {
        let (socket, _response) = tungstenite::connect(self.url.as_str())
            .map_err(|e| VizError::Connection(format!("{}: {}", self.url, e)))?;

        // reads must time out so heartbeats and publishes keep flowing
        match socket.get_ref() {
            MaybeTlsStream::Plain(stream) => stream.set_read_timeout(Some(POLL_INTERVAL))?,
            _ => {
                return Err(VizError::Connection(format!(
                    "{}: only plain ws:// brokers are supported",
                    self.url
                )));
            }
        }
        Ok(Box::new(WsTransport { socket }))
    }

    fn host(&self) -> String {
        host_of(&self.url)
    }
}

fn host_of(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
        .to_string()
}

struct WsTransport {
    socket: WebSocket<MaybeTlsStream<TcpStream>>,
}

fn lost(err: tungstenite::Error) -> VizError {
    VizError::Connection(err.to_string())
}

impl Transport for WsTransport {
    fn send_text(&mut self, text: &str) -> VizResult<()> {
        self.socket
            .send(Message::Text(text.to_string()))
            .map_err(lost)
    }

    fn recv_text(&mut self) -> VizResult<Option<String>> {
        match self.socket.read() {
            Ok(Message::Text(text)) => Ok(Some(text)),
            Ok(Message::Binary(bytes)) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| VizError::Connection("broker sent non UTF-8 data".into())),
            Ok(Message::Close(_)) => Err(VizError::Connection(
                "broker closed the connection".into(),
            )),
            // control frames still prove the link is alive
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => Ok(Some(String::new())),
            Err(tungstenite::Error::Io(e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(lost(e)),
        }
    }

    fn close(&mut self) {
        let _ = self.socket.close(None);
        let _ = self.socket.flush();
    }
}
