//! Outbound operations against the solver service.

use std::time::Duration;

use ureq::Agent;

use crate::channel::Publisher;
use crate::config::ServerConfig;
use crate::error::{VizError, VizResult};
use crate::geometry::{CanvasSize, Graph, Solution};
use crate::wire::{self, GraphRequest, SolutionRequest};

/// What happened to a solution request.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// The solver answered synchronously.
    Delivered(Solution),
    /// The request went to the broker; the solution arrives as a notification.
    Published,
}

/// The two calls the client makes against the solver service.
///
/// Implementations are shared with worker threads, hence `Send + Sync`.
pub trait SolverGateway: Send + Sync {
    /// Ask the service for `count` random cities inside `bounds`.
    fn request_graph(&self, count: usize, bounds: CanvasSize) -> VizResult<Graph>;

    fn request_solution(&self, request: &SolutionRequest) -> VizResult<Dispatch>;
}

/// Where solution requests go.
#[derive(Clone)]
pub enum Route {
    /// POST to the solution endpoint and wait for the tour.
    Direct { url: String },
    /// Publish on the broker and return immediately.
    Broker(Publisher),
}

/// HTTP gateway backed by a blocking `ureq` agent.
pub struct HttpGateway {
    agent: Agent,
    graph_url: String,
    route: Route,
}

impl HttpGateway {
    pub fn new(server: &ServerConfig, route: Route) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_millis(server.timeout_ms)))
            .build()
            .into();

        Self {
            agent,
            graph_url: server.graph_url(),
            route,
        }
    }

    fn post_json(&self, url: &str, body: &str) -> VizResult<String> {
        tracing::debug!(url, bytes = body.len(), "POST");
        let mut response = self
            .agent
            .post(url)
            .header("Content-Type", "application/json")
            .send(body)
            .map_err(|e| network_error(url, e))?;

        response
            .body_mut()
            .read_to_string()
            .map_err(|e| network_error(url, e))
    }
}

fn network_error(url: &str, err: ureq::Error) -> VizError {
    match err {
        ureq::Error::StatusCode(code) => {
            VizError::Network(format!("{} answered with HTTP {}", url, code))
        }
        other => VizError::Network(format!("{}: {}", url, other)),
    }
}

impl SolverGateway for HttpGateway {
    fn request_graph(&self, count: usize, bounds: CanvasSize) -> VizResult<Graph> {
        let body = wire::encode(&GraphRequest::new(count, bounds))?;
        let text = self.post_json(&self.graph_url, &body)?;
        let graph = wire::decode_graph(&text)?;
        check_graph(graph, count, bounds)
    }

    fn request_solution(&self, request: &SolutionRequest) -> VizResult<Dispatch> {
        let body = wire::encode(request)?;
        match &self.route {
            Route::Direct { url } => {
                let text = self.post_json(url, &body)?;
                Ok(Dispatch::Delivered(wire::decode_solution(&text)?))
            }
            Route::Broker(publisher) => {
                publisher.publish(body)?;
                Ok(Dispatch::Published)
            }
        }
    }
}

/// A generated graph must have exactly the requested size and fit the
/// canvas it was generated for.
pub fn check_graph(graph: Graph, count: usize, bounds: CanvasSize) -> VizResult<Graph> {
    if graph.len() != count {
        return Err(VizError::malformed(format!(
            "asked for {} cities, got {}",
            count,
            graph.len()
        )));
    }
    if let Some(index) = graph.first_out_of_bounds(bounds) {
        let city = graph.cities[index];
        return Err(VizError::malformed(format!(
            "city #{} at ({}, {}) lies outside the {}x{} canvas",
            index, city.x, city.y, bounds.width, bounds.height
        )));
    }
    Ok(graph)
}
