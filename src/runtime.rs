//! The event loop: the only place the controller is driven from.
//!
//! Events come from three sources: user commands (pushed through
//! [`Runtime::sender`]), results of network work running on worker threads,
//! and the notification channel. They are applied one at a time, in arrival
//! order, on the thread calling [`Runtime::run`] or [`Runtime::run_until`].

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvError, Sender, select, unbounded};

use crate::channel::ChannelEvent;
use crate::controller::{Controller, Effect, Event};
use crate::error::VizResult;
use crate::export;
use crate::gateway::SolverGateway;
use crate::palette::Palette;
use crate::render::Frame;
use crate::session::{GraphTicket, SolveTicket};
use crate::svg;
use crate::wire::SolutionRequest;

/// Receives every frame the controller presents.
pub trait FrameSink: Send {
    fn present(&mut self, frame: &Frame) -> VizResult<()>;
}

/// Rewrites one file on every presented frame.
pub struct FileSink {
    path: PathBuf,
    palette: Palette,
    png_scale: f32,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>, palette: Palette, png_scale: f32) -> VizResult<Self> {
        let path = path.into();
        export::Format::from_path(&path)?;
        Ok(Self {
            path,
            palette,
            png_scale,
        })
    }
}

impl FrameSink for FileSink {
    fn present(&mut self, frame: &Frame) -> VizResult<()> {
        let svg = svg::encode(frame, &self.palette);
        export::write(&svg, &self.path, self.png_scale)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

enum Next {
    Event(Event),
    NotificationsClosed,
    Idle,
}

pub struct Runtime {
    controller: Controller,
    gateway: Arc<dyn SolverGateway>,
    events_tx: Sender<Event>,
    events_rx: Receiver<Event>,
    notifications: Option<Receiver<ChannelEvent>>,
    sink: Option<Box<dyn FrameSink>>,
    palette: Palette,
    png_scale: f32,
    alerts: Vec<String>,
}

impl Runtime {
    pub fn new(controller: Controller, gateway: Arc<dyn SolverGateway>) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            controller,
            gateway,
            events_tx,
            events_rx,
            notifications: None,
            sink: None,
            palette: Palette::default(),
            png_scale: 1.0,
            alerts: Vec::new(),
        }
    }

    pub fn with_notifications(mut self, notifications: Receiver<ChannelEvent>) -> Self {
        self.notifications = Some(notifications);
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn FrameSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Palette and scale used by `render` exports.
    pub fn with_palette(mut self, palette: Palette, png_scale: f32) -> Self {
        self.palette = palette;
        self.png_scale = png_scale;
        self
    }

    /// Handle for feeding events from other threads.
    pub fn sender(&self) -> Sender<Event> {
        self.events_tx.clone()
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Every alert raised so far, oldest first.
    pub fn alerts(&self) -> &[String] {
        &self.alerts
    }

    /// Apply one event and execute its effects.
    pub fn dispatch(&mut self, event: Event) -> Flow {
        let mut flow = Flow::Continue;
        for effect in self.controller.handle(event) {
            if self.execute(effect) == Flow::Quit {
                flow = Flow::Quit;
            }
        }
        flow
    }

    /// Process events until a `quit` command arrives.
    pub fn run(&mut self) {
        loop {
            let flow = match self.next(None) {
                Next::Event(event) => self.dispatch(event),
                Next::NotificationsClosed => {
                    self.notifications = None;
                    Flow::Continue
                }
                Next::Idle => Flow::Continue,
            };
            if flow == Flow::Quit {
                tracing::debug!("event loop finished");
                return;
            }
        }
    }

    /// Process events until `done` holds for the controller.
    ///
    /// Returns `false` if `timeout` elapses or a `quit` arrives first.
    pub fn run_until(&mut self, done: impl Fn(&Controller) -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if done(&self.controller) {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.next(Some(remaining)) {
                Next::Event(event) => {
                    if self.dispatch(event) == Flow::Quit {
                        return done(&self.controller);
                    }
                }
                Next::NotificationsClosed => self.notifications = None,
                Next::Idle => {}
            }
        }
    }

    fn next(&self, wait: Option<Duration>) -> Next {
        let never = crossbeam_channel::never::<ChannelEvent>();
        let notifications = self.notifications.as_ref().unwrap_or(&never);

        match wait {
            Some(wait) => select! {
                recv(self.events_rx) -> msg => from_queue(msg),
                recv(notifications) -> msg => from_channel(msg),
                default(wait) => Next::Idle,
            },
            None => select! {
                recv(self.events_rx) -> msg => from_queue(msg),
                recv(notifications) -> msg => from_channel(msg),
            },
        }
    }

    fn execute(&mut self, effect: Effect) -> Flow {
        match effect {
            Effect::FetchGraph(ticket) => self.fetch_graph(ticket),
            Effect::RequestSolution { ticket, request } => self.request_solution(ticket, request),
            Effect::Present(frame) => {
                if let Some(sink) = self.sink.as_mut() {
                    if let Err(err) = sink.present(&frame) {
                        self.alert(err.to_string());
                    }
                }
            }
            Effect::Export { path, frame } => {
                let svg = svg::encode(&frame, &self.palette);
                match export::write(&svg, &path, self.png_scale) {
                    Ok(format) => eprintln!("{} saved to: {}", format, path.display()),
                    Err(err) => self.alert(err.to_string()),
                }
            }
            Effect::Alert(message) => self.alert(message),
            Effect::Print(text) => println!("{}", text),
            Effect::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    fn fetch_graph(&mut self, ticket: GraphTicket) {
        let gateway = Arc::clone(&self.gateway);
        let events = self.events_tx.clone();
        self.spawn("graph-request", move || {
            let result = gateway.request_graph(ticket.count, ticket.bounds);
            let _ = events.send(Event::GraphLoaded { ticket, result });
        });
    }

    fn request_solution(&mut self, ticket: SolveTicket, request: SolutionRequest) {
        let gateway = Arc::clone(&self.gateway);
        let events = self.events_tx.clone();
        self.spawn("solve-request", move || {
            let result = gateway.request_solution(&request);
            let _ = events.send(Event::SolveDispatched { ticket, result });
        });
    }

    /// Network calls block, so each runs on its own short-lived thread and
    /// reports back through the event queue.
    fn spawn(&mut self, name: &str, work: impl FnOnce() + Send + 'static) {
        if let Err(err) = thread::Builder::new().name(name.to_string()).spawn(work) {
            self.alert(format!("Failed to start {} worker: {}", name, err));
        }
    }

    fn alert(&mut self, message: String) {
        tracing::debug!(%message, "alert");
        eprintln!("{}", message);
        self.alerts.push(message);
    }
}

fn from_queue(msg: Result<Event, RecvError>) -> Next {
    // the runtime holds a sender, so the queue never disconnects
    msg.map_or(Next::Idle, Next::Event)
}

fn from_channel(msg: Result<ChannelEvent, RecvError>) -> Next {
    msg.map_or(Next::NotificationsClosed, |event| Next::Event(Event::Channel(event)))
}
