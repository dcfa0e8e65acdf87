//! Turns user actions and network results into session transitions and
//! side effects.
//!
//! The controller performs no I/O. Every input is an [`Event`]; every
//! consequence is an [`Effect`] the runtime executes. Whenever the graph,
//! the solution or the canvas changes, a fresh [`Frame`] is presented.

use std::fmt::Write as _;
use std::path::PathBuf;

use crate::catalog::{Algorithm, ParamValues};
use crate::channel::ChannelEvent;
use crate::command::{Command, HELP};
use crate::error::{VizError, VizResult};
use crate::gateway::Dispatch;
use crate::geometry::{CanvasSize, Graph, Solution};
use crate::render::{CITY_RADIUS, Frame, plan};
use crate::session::{
    Delivery, GraphOutcome, GraphTicket, Receipt, Session, SolveTicket, StaleReason,
};
use crate::wire::SolutionRequest;

#[derive(Debug)]
pub enum Event {
    Command(Command),
    GraphLoaded {
        ticket: GraphTicket,
        result: VizResult<Graph>,
    },
    SolveDispatched {
        ticket: SolveTicket,
        result: VizResult<Dispatch>,
    },
    Channel(ChannelEvent),
    /// The drawing surface changed size.
    Resized(CanvasSize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    FetchGraph(GraphTicket),
    RequestSolution {
        ticket: SolveTicket,
        request: SolutionRequest,
    },
    /// Repaint the live surface.
    Present(Frame),
    Export {
        path: PathBuf,
        frame: Frame,
    },
    /// Blocking message for the user.
    Alert(String),
    /// Informational output requested by the user.
    Print(String),
    Quit,
}

pub struct Controller {
    session: Session,
    algorithm: Option<Algorithm>,
    params: ParamValues,
    canvas: CanvasSize,
    max_cities: usize,
    radius: f64,
    /// Session revision and canvas of the last presented frame.
    presented: Option<(u64, CanvasSize)>,
}

impl Controller {
    pub fn new(canvas: CanvasSize, max_cities: usize) -> Self {
        Self {
            session: Session::new(),
            algorithm: Some(Algorithm::DEFAULT),
            params: ParamValues::new(),
            canvas,
            max_cities,
            radius: CITY_RADIUS,
            presented: None,
        }
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    pub fn params(&self) -> &ParamValues {
        &self.params
    }

    pub fn canvas(&self) -> CanvasSize {
        self.canvas
    }

    /// Frame for the current session state.
    pub fn frame(&self) -> Frame {
        plan(
            self.session.graph(),
            self.session.solution(),
            self.canvas,
            self.radius,
        )
    }

    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        let mut effects = Vec::new();
        match event {
            Event::Command(command) => self.on_command(command, &mut effects),
            Event::GraphLoaded { ticket, result } => self.on_graph(ticket, result, &mut effects),
            Event::SolveDispatched { ticket, result } => {
                self.on_dispatch(ticket, result, &mut effects)
            }
            Event::Channel(event) => self.on_channel(event, &mut effects),
            Event::Resized(size) => self.resize(size, &mut effects),
        }

        let current = (self.session.revision(), self.canvas);
        if self.presented != Some(current) {
            self.presented = Some(current);
            effects.push(Effect::Present(self.frame()));
        }
        effects
    }

    fn on_command(&mut self, command: Command, effects: &mut Vec<Effect>) {
        let result = match command {
            Command::Generate(raw) => self.generate(&raw).map(|ticket| {
                effects.push(Effect::FetchGraph(ticket));
            }),
            Command::SelectAlgorithm(raw) => self.select_algorithm(&raw),
            Command::SetParam { key, value } => self.set_param(&key, &value),
            Command::Solve => self.solve().map(|(ticket, request)| {
                effects.push(Effect::RequestSolution { ticket, request });
            }),
            Command::Clear => {
                self.session.clear();
                Ok(())
            }
            Command::Resize(size) => {
                self.resize(size, effects);
                Ok(())
            }
            Command::Render(path) => {
                effects.push(Effect::Export {
                    path,
                    frame: self.frame(),
                });
                Ok(())
            }
            Command::Status => {
                effects.push(Effect::Print(self.status()));
                Ok(())
            }
            Command::Algorithms => {
                effects.push(Effect::Print(catalog_listing()));
                Ok(())
            }
            Command::Help => {
                effects.push(Effect::Print(HELP.to_string()));
                Ok(())
            }
            Command::Quit => {
                effects.push(Effect::Quit);
                Ok(())
            }
        };

        if let Err(err) = result {
            effects.push(Effect::Alert(err.to_string()));
        }
    }

    fn generate(&mut self, raw: &str) -> VizResult<GraphTicket> {
        let count = parse_city_count(raw, self.max_cities)?;
        let ticket = self.session.begin_generate(count, self.canvas)?;
        tracing::info!(count, width = self.canvas.width, height = self.canvas.height, "generating");
        Ok(ticket)
    }

    fn select_algorithm(&mut self, raw: &str) -> VizResult<()> {
        if raw.trim().is_empty() {
            self.algorithm = None;
            return Ok(());
        }
        let algorithm: Algorithm = raw.parse()?;
        self.algorithm = Some(algorithm);
        Ok(())
    }

    fn set_param(&mut self, key: &str, value: &str) -> VizResult<()> {
        let algorithm = self
            .algorithm
            .ok_or_else(|| VizError::validation("You need to select an algorithm!"))?;
        self.params.set_text(algorithm, key, value)
    }

    /// Validate everything the request needs, then enter `Solving`.
    fn solve(&mut self) -> VizResult<(SolveTicket, SolutionRequest)> {
        let cities = match self.session.graph() {
            Some(graph) if !graph.is_empty() => graph.cities.clone(),
            _ => {
                return Err(VizError::validation(
                    "You need to generate cities before solving!",
                ));
            }
        };
        let algorithm = self
            .algorithm
            .ok_or_else(|| VizError::validation("You need to select an algorithm!"))?;
        let parameters = self.params.resolve(algorithm)?;

        let ticket = self.session.begin_solve()?;
        tracing::info!(%algorithm, cities = cities.len(), "solving");
        Ok((
            ticket,
            SolutionRequest {
                cities,
                algo_type: algorithm,
                parameters,
            },
        ))
    }

    fn resize(&mut self, size: CanvasSize, effects: &mut Vec<Effect>) {
        if size.is_degenerate() {
            effects.push(Effect::Alert(format!(
                "Canvas size {}x{} is not drawable",
                size.width, size.height
            )));
            return;
        }
        if size != self.canvas {
            tracing::debug!(width = size.width, height = size.height, "canvas resized");
            self.canvas = size;
        }
    }

    fn on_graph(&mut self, ticket: GraphTicket, result: VizResult<Graph>, effects: &mut Vec<Effect>) {
        match self.session.finish_generate(ticket, result) {
            Ok(GraphOutcome::Applied) | Ok(GraphOutcome::Superseded) => {}
            Err(err) => {
                tracing::warn!(error = %err, "graph generation failed");
                effects.push(Effect::Alert(err.to_string()));
            }
        }
    }

    fn on_dispatch(
        &mut self,
        ticket: SolveTicket,
        result: VizResult<Dispatch>,
        effects: &mut Vec<Effect>,
    ) {
        let err = match result {
            Ok(Dispatch::Delivered(solution)) => {
                match self.receive(solution, Delivery::Direct(ticket)) {
                    // the response answers the current request but not its graph
                    Receipt::Stale(StaleReason::Mismatch(mismatch)) => VizError::malformed(
                        format!("solution does not fit the current graph: {}", mismatch),
                    ),
                    _ => return,
                }
            }
            Ok(Dispatch::Published) => {
                tracing::debug!("solution request published, waiting for notification");
                return;
            }
            Err(err) => err,
        };

        if !self.session.abort_solve(ticket) {
            tracing::debug!(error = %err, "ignoring failure of a superseded solve");
            return;
        }
        tracing::warn!(error = %err, "solution request failed");
        let message = if err.is_user_facing() {
            err.to_string()
        } else {
            format!("Solution request was not sent: {}", err)
        };
        effects.push(Effect::Alert(message));
    }

    fn on_channel(&mut self, event: ChannelEvent, effects: &mut Vec<Effect>) {
        match event {
            ChannelEvent::Solution(solution) => {
                self.receive(solution, Delivery::Notification);
            }
            ChannelEvent::Connected => tracing::info!("notification channel up"),
            ChannelEvent::Disconnected { reason } => {
                tracing::warn!(%reason, "notification channel lost, reconnecting")
            }
            ChannelEvent::Unreachable {
                attempts,
                last_error,
            } => effects.push(Effect::Alert(format!(
                "Cannot reach the solution broker after {} attempts: {}",
                attempts, last_error
            ))),
        }
    }

    fn receive(&mut self, solution: Solution, delivery: Delivery) -> Receipt {
        let receipt = self.session.receive_solution(solution, delivery);
        if let Receipt::Stale(reason) = receipt {
            tracing::debug!(?reason, "discarding stale solution");
        }
        receipt
    }

    fn status(&self) -> String {
        let mut out = format!("state: {}", self.session.phase());
        if let Some(graph) = self.session.graph() {
            let _ = write!(out, ", cities: {}", graph.len());
        }
        if self.session.is_generating() {
            out.push_str(", generating");
        }
        if let Some(solution) = self.session.solution() {
            let _ = write!(out, ", cost: {}", solution.cost);
        }
        let algorithm = self.algorithm.map_or("none", |a| a.label());
        let _ = write!(
            out,
            ", algorithm: {}, canvas: {}x{}",
            algorithm, self.canvas.width, self.canvas.height
        );
        out
    }
}

/// Validate the city count typed by the user.
///
/// Any numeric text with an integral value is accepted, so `5.0` is 5.
pub fn parse_city_count(raw: &str, max_cities: usize) -> VizResult<usize> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(VizError::validation("You need to enter a number of points!"));
    }
    let invalid = || VizError::validation("Invalid number of points, must be an integer > 0");

    let value: f64 = raw.parse().map_err(|_| invalid())?;
    if !value.is_finite() || value.fract() != 0.0 || value <= 0.0 {
        return Err(invalid());
    }
    if value > max_cities as f64 {
        return Err(VizError::validation(format!(
            "Too many points: {} (maximum is {})",
            value, max_cities
        )));
    }
    Ok(value as usize)
}

/// One line per algorithm: id, label and parameter keys with their names.
pub fn catalog_listing() -> String {
    Algorithm::ALL
        .iter()
        .map(|algo| {
            let params: Vec<String> = algo
                .params()
                .iter()
                .map(|p| format!("{} ({})", p.key, p.name))
                .collect();
            format!("{:<4} {:<20} {}", algo.id(), algo.label(), params.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
