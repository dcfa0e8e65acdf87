//! The single authoritative session: which graph is shown, whether a solve is
//! in flight, and which solution (if any) is displayed.
//!
//! Every mutation goes through a transition method. Transitions are
//! synchronous and total: they either move to the next state or leave the
//! state untouched and report why.
//!
//! Results of network work are matched against the session with tickets.
//! Each `generate` and `clear` starts a new epoch; a ticket from an older
//! epoch can never be applied, so a late response loses the race by
//! construction rather than by timing.

use std::fmt;

use crate::error::{VizError, VizResult};
use crate::geometry::{
    CanvasSize, Graph, Solution, TourMismatch, match_full_tour, match_tour, path_length,
};

/// Lifecycle phase, without the data each phase carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Empty,
    GraphReady,
    Solving,
    Solved,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Empty => "empty",
            Phase::GraphReady => "graph ready",
            Phase::Solving => "solving",
            Phase::Solved => "solved",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
enum State {
    Empty,
    GraphReady { graph: Graph },
    Solving { graph: Graph, ticket: SolveTicket },
    Solved { graph: Graph, solution: Solution },
}

/// Issued when a graph generation starts; redeemed when its result arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphTicket {
    epoch: u64,
    pub count: usize,
    pub bounds: CanvasSize,
}

/// Issued when a solve starts; redeemed by a direct response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolveTicket {
    epoch: u64,
    attempt: u64,
}

/// How a solution reached the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Response to a synchronous request issued under this ticket.
    Direct(SolveTicket),
    /// Broker notification; carries no ticket and is matched by content.
    Notification,
}

/// Outcome of handing a solution to the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Receipt {
    Accepted,
    Stale(StaleReason),
}

/// Why a well-formed solution was discarded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StaleReason {
    /// The session was not waiting for a solution.
    NotSolving(Phase),
    /// The request it answers was superseded by a newer one.
    Superseded,
    /// The tour does not fit the current graph.
    Mismatch(TourMismatch),
}

/// What a finished graph generation did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphOutcome {
    Applied,
    /// A later `generate` or `clear` made this result irrelevant.
    Superseded,
}

#[derive(Debug, Clone)]
pub struct Session {
    state: State,
    epoch: u64,
    attempts: u64,
    pending_graph: Option<GraphTicket>,
    revision: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: State::Empty,
            epoch: 0,
            attempts: 0,
            pending_graph: None,
            revision: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            State::Empty => Phase::Empty,
            State::GraphReady { .. } => Phase::GraphReady,
            State::Solving { .. } => Phase::Solving,
            State::Solved { .. } => Phase::Solved,
        }
    }

    pub fn graph(&self) -> Option<&Graph> {
        match &self.state {
            State::Empty => None,
            State::GraphReady { graph }
            | State::Solving { graph, .. }
            | State::Solved { graph, .. } => Some(graph),
        }
    }

    pub fn solution(&self) -> Option<&Solution> {
        match &self.state {
            State::Solved { solution, .. } => Some(solution),
            _ => None,
        }
    }

    /// Whether a graph generation is in flight.
    pub fn is_generating(&self) -> bool {
        self.pending_graph.is_some()
    }

    /// Bumped on every change to the graph or solution. Renderers compare
    /// revisions to decide whether a redraw is needed.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn set_state(&mut self, state: State) {
        self.state = state;
        self.revision += 1;
    }

    /// Start generating `count` cities inside `bounds`.
    ///
    /// Allowed from every state. The current graph and solution are dropped
    /// immediately, so a failed generation leaves the session empty.
    pub fn begin_generate(&mut self, count: usize, bounds: CanvasSize) -> VizResult<GraphTicket> {
        if count == 0 {
            return Err(VizError::validation(
                "Invalid number of points, must be an integer > 0",
            ));
        }
        if bounds.is_degenerate() {
            return Err(VizError::validation(format!(
                "Canvas is {}x{}, cities need a non-empty area",
                bounds.width, bounds.height
            )));
        }

        self.epoch += 1;
        let ticket = GraphTicket {
            epoch: self.epoch,
            count,
            bounds,
        };
        self.pending_graph = Some(ticket);
        self.set_state(State::Empty);
        Ok(ticket)
    }

    /// Apply the result of the generation started with `ticket`.
    ///
    /// A failure clears the pending generation, leaves the session empty and
    /// is handed back to the caller for reporting.
    pub fn finish_generate(
        &mut self,
        ticket: GraphTicket,
        result: VizResult<Graph>,
    ) -> VizResult<GraphOutcome> {
        if self.pending_graph != Some(ticket) {
            tracing::debug!(epoch = ticket.epoch, current = self.epoch, "dropping superseded graph");
            return Ok(GraphOutcome::Superseded);
        }
        self.pending_graph = None;

        let graph = result?;
        tracing::info!(cities = graph.len(), "graph ready");
        self.set_state(State::GraphReady { graph });
        Ok(GraphOutcome::Applied)
    }

    /// Enter `Solving`. Allowed from `GraphReady` and `Solved`; a displayed
    /// solution is discarded.
    pub fn begin_solve(&mut self) -> VizResult<SolveTicket> {
        let graph = match &self.state {
            State::Empty => {
                return Err(VizError::validation(
                    "You need to generate cities before solving!",
                ));
            }
            State::Solving { .. } => {
                return Err(VizError::validation(
                    "A solution is already being computed",
                ));
            }
            State::GraphReady { graph } | State::Solved { graph, .. } => graph,
        };
        if graph.is_empty() {
            return Err(VizError::validation(
                "You need to generate cities before solving!",
            ));
        }

        let graph = graph.clone();
        self.attempts += 1;
        let ticket = SolveTicket {
            epoch: self.epoch,
            attempt: self.attempts,
        };
        self.set_state(State::Solving { graph, ticket });
        Ok(ticket)
    }

    /// The request issued under `ticket` failed before producing a solution.
    /// Returns to `GraphReady` if that request is still the current one.
    pub fn abort_solve(&mut self, ticket: SolveTicket) -> bool {
        let State::Solving { graph, ticket: current } = &self.state else {
            return false;
        };
        if *current != ticket {
            return false;
        }
        let graph = graph.clone();
        self.set_state(State::GraphReady { graph });
        true
    }

    /// Offer a solution to the session.
    ///
    /// Accepted only while `Solving` and only if every tour stop uses up a
    /// city of the current graph. A direct delivery must also answer the
    /// current request and visit every city, since it was computed for
    /// exactly this graph. Anything else leaves the state as is.
    pub fn receive_solution(&mut self, solution: Solution, delivery: Delivery) -> Receipt {
        let State::Solving { graph, ticket } = &self.state else {
            return Receipt::Stale(StaleReason::NotSolving(self.phase()));
        };
        let matched = match delivery {
            Delivery::Direct(answered) if answered != *ticket => {
                return Receipt::Stale(StaleReason::Superseded);
            }
            Delivery::Direct(_) => match_full_tour(graph, &solution.tour),
            Delivery::Notification => match_tour(graph, &solution.tour),
        };
        if let Err(mismatch) = matched {
            return Receipt::Stale(StaleReason::Mismatch(mismatch));
        }

        let graph = graph.clone();
        tracing::info!(
            stops = solution.tour.len(),
            cost = solution.cost,
            length = path_length(&solution.tour),
            "solution accepted"
        );
        self.set_state(State::Solved { graph, solution });
        Receipt::Accepted
    }

    /// Drop the graph and any solution. Pending generations and solves are
    /// superseded.
    pub fn clear(&mut self) {
        let had_work = self.pending_graph.take().is_some();
        if matches!(self.state, State::Empty) && !had_work {
            return;
        }
        self.epoch += 1;
        self.set_state(State::Empty);
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::geometry::City;
    use proptest::prelude::*;

    fn graph_of(points: &[(u16, u16)]) -> Graph {
        Graph::new(
            points
                .iter()
                .map(|&(x, y)| City::new(f64::from(x), f64::from(y)))
                .collect(),
        )
    }

    proptest! {
        /// Property: a solution whose tour leaves the current graph never solves the session.
        #[test]
        fn prop_foreign_tour_never_accepted(
            points in prop::collection::hash_set((0u16..800, 0u16..600), 2..30),
            stray in (800u16..1600, 600u16..1200),
        ) {
            let points: Vec<(u16, u16)> = points.into_iter().collect();
            let mut session = Session::new();
            let ticket = session.begin_generate(points.len(), CanvasSize::new(800, 600)).unwrap();
            session.finish_generate(ticket, Ok(graph_of(&points))).unwrap();
            session.begin_solve().unwrap();

            let mut tour = graph_of(&points).cities;
            tour[0] = City::new(f64::from(stray.0), f64::from(stray.1));
            let receipt = session.receive_solution(Solution { tour, cost: 1.0 }, Delivery::Notification);

            prop_assert!(matches!(receipt, Receipt::Stale(_)));
            prop_assert_eq!(session.phase(), Phase::Solving);
        }

        /// Property: outside `Solving`, no delivery changes the session.
        #[test]
        fn prop_solution_outside_solving_is_ignored(
            points in prop::collection::hash_set((0u16..800, 0u16..600), 1..30),
            solve_first in any::<bool>(),
        ) {
            let points: Vec<(u16, u16)> = points.into_iter().collect();
            let mut session = Session::new();
            let ticket = session.begin_generate(points.len(), CanvasSize::new(800, 600)).unwrap();
            session.finish_generate(ticket, Ok(graph_of(&points))).unwrap();
            if solve_first {
                let solve = session.begin_solve().unwrap();
                session.abort_solve(solve);
            }

            let before = session.revision();
            let tour = graph_of(&points).cities;
            let receipt = session.receive_solution(Solution { tour, cost: 1.0 }, Delivery::Notification);

            prop_assert_eq!(receipt, Receipt::Stale(StaleReason::NotSolving(Phase::GraphReady)));
            prop_assert_eq!(session.revision(), before);
        }
    }
}
