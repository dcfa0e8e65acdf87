use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_channel::unbounded;

use tourviz::channel::ChannelEvent;
use tourviz::command::Command;
use tourviz::controller::{Controller, Effect, Event};
use tourviz::error::VizResult;
use tourviz::gateway::{Dispatch, SolverGateway, check_graph};
use tourviz::geometry::{CanvasSize, City, Graph, Solution, is_permutation};
use tourviz::render::{Frame, Marker};
use tourviz::runtime::Runtime;
use tourviz::session::{Phase, SolveTicket};
use tourviz::wire::SolutionRequest;

/// Deterministic stand-in for the solver service.
#[derive(Default)]
struct ScriptedGateway {
    graph_calls: AtomicUsize,
    solve_calls: AtomicUsize,
    /// Publish instead of answering directly.
    broker: bool,
    /// Return one city fewer than asked for.
    short: bool,
}

impl ScriptedGateway {
    fn cities(count: usize, bounds: CanvasSize) -> Vec<City> {
        (0..count)
            .map(|i| {
                City::new(
                    ((17 + i * 37) % bounds.width as usize) as f64,
                    ((29 + i * 53) % bounds.height as usize) as f64,
                )
            })
            .collect()
    }
}

impl SolverGateway for ScriptedGateway {
    fn request_graph(&self, count: usize, bounds: CanvasSize) -> VizResult<Graph> {
        self.graph_calls.fetch_add(1, Ordering::SeqCst);
        let served = if self.short { count - 1 } else { count };
        check_graph(Graph::new(Self::cities(served, bounds)), count, bounds)
    }

    fn request_solution(&self, request: &SolutionRequest) -> VizResult<Dispatch> {
        self.solve_calls.fetch_add(1, Ordering::SeqCst);
        if self.broker {
            return Ok(Dispatch::Published);
        }
        let mut tour = request.cities.clone();
        tour.rotate_left(1);
        Ok(Dispatch::Delivered(Solution { tour, cost: 123.4 }))
    }
}

fn canvas() -> CanvasSize {
    CanvasSize::new(800, 600)
}

fn alerts(effects: &[Effect]) -> Vec<String> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Alert(msg) => Some(msg.clone()),
            _ => None,
        })
        .collect()
}

fn last_frame(effects: &[Effect]) -> Option<&Frame> {
    effects.iter().rev().find_map(|e| match e {
        Effect::Present(frame) => Some(frame),
        _ => None,
    })
}

/// Drives a controller by hand so tests can interleave results freely.
struct Driver {
    controller: Controller,
    gateway: ScriptedGateway,
}

impl Driver {
    fn new(gateway: ScriptedGateway) -> Self {
        Self {
            controller: Controller::new(canvas(), 1_000),
            gateway,
        }
    }

    fn command(&mut self, command: Command) -> Vec<Effect> {
        self.controller.handle(Event::Command(command))
    }

    /// Generate and apply the graph immediately.
    fn generate(&mut self, count: &str) -> Vec<Effect> {
        let effects = self.command(Command::Generate(count.into()));
        let mut all = effects.clone();
        for effect in effects {
            if let Effect::FetchGraph(ticket) = effect {
                let result = self.gateway.request_graph(ticket.count, ticket.bounds);
                all.extend(self.controller.handle(Event::GraphLoaded { ticket, result }));
            }
        }
        all
    }

    /// Start a solve and return the pending request without answering it.
    fn start_solve(&mut self) -> Option<(SolveTicket, SolutionRequest)> {
        self.command(Command::SetParam {
            key: "numIter".into(),
            value: "1000".into(),
        });
        self.command(Command::Solve).into_iter().find_map(|e| match e {
            Effect::RequestSolution { ticket, request } => Some((ticket, request)),
            _ => None,
        })
    }

    fn answer(&mut self, ticket: SolveTicket, request: &SolutionRequest) -> Vec<Effect> {
        let result = self.gateway.request_solution(request);
        self.controller.handle(Event::SolveDispatched { ticket, result })
    }

    fn notify(&mut self, solution: Solution) -> Vec<Effect> {
        self.controller
            .handle(Event::Channel(ChannelEvent::Solution(solution)))
    }

    fn phase(&self) -> Phase {
        self.controller.session().phase()
    }

    fn graph(&self) -> Graph {
        self.controller.session().graph().cloned().unwrap()
    }
}

#[test]
fn five_city_scenario_end_to_end() {
    let mut d = Driver::new(ScriptedGateway::default());

    d.generate("5");
    assert_eq!(d.phase(), Phase::GraphReady);
    let graph = d.graph();
    assert_eq!(graph.len(), 5);
    assert!(graph.cities.iter().all(|c| c.is_within(canvas())));

    d.command(Command::SelectAlgorithm("local-search".into()));
    let (ticket, request) = d.start_solve().expect("solve request");
    assert_eq!(d.phase(), Phase::Solving);

    let effects = d.answer(ticket, &request);
    assert_eq!(d.phase(), Phase::Solved);
    let solution = d.controller.session().solution().unwrap();
    assert!(is_permutation(&graph, &solution.tour));

    let frame = last_frame(&effects).expect("solved frame");
    let count = |m: Marker| frame.discs().filter(|(_, marker)| *marker == m).count();
    assert_eq!(frame.discs().count(), 5);
    assert_eq!(count(Marker::Start), 1);
    assert_eq!(count(Marker::End), 1);
    assert_eq!(count(Marker::Neutral), 3);
    assert_eq!(frame.segments().count(), 4);
    assert_eq!(frame.cost, Some(123.4));
}

#[test]
fn solve_on_empty_session_is_a_validation_error() {
    let mut d = Driver::new(ScriptedGateway::default());
    let effects = d.command(Command::Solve);
    assert_eq!(alerts(&effects), ["You need to generate cities before solving!"]);
    assert_eq!(d.phase(), Phase::Empty);
    assert_eq!(d.gateway.solve_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn bad_counts_never_reach_the_network() {
    let mut d = Driver::new(ScriptedGateway::default());
    for bad in ["0", "2.5", "five", "-1"] {
        let effects = d.generate(bad);
        assert_eq!(
            alerts(&effects),
            ["Invalid number of points, must be an integer > 0"],
            "{bad}"
        );
    }
    let effects = d.generate("");
    assert_eq!(alerts(&effects), ["You need to enter a number of points!"]);
    assert_eq!(d.gateway.graph_calls.load(Ordering::SeqCst), 0);
    assert_eq!(d.phase(), Phase::Empty);
}

#[test]
fn regenerate_while_solving_discards_late_results() {
    let mut d = Driver::new(ScriptedGateway::default());
    d.generate("6");
    let old_graph = d.graph();
    let (ticket, request) = d.start_solve().unwrap();

    d.generate("4");
    assert_eq!(d.phase(), Phase::GraphReady);

    // the superseded direct answer arrives late
    let effects = d.answer(ticket, &request);
    assert!(alerts(&effects).is_empty());
    assert_eq!(d.phase(), Phase::GraphReady);

    // and so does a broker notification for the old graph
    d.notify(Solution {
        tour: old_graph.cities.clone(),
        cost: 99.0,
    });
    assert_eq!(d.phase(), Phase::GraphReady);
    assert_eq!(d.graph().len(), 4);
}

#[test]
fn notification_for_another_graph_is_ignored_while_solving() {
    let mut d = Driver::new(ScriptedGateway {
        broker: true,
        ..ScriptedGateway::default()
    });
    d.generate("3");
    let (ticket, request) = d.start_solve().unwrap();
    d.answer(ticket, &request);
    assert_eq!(d.phase(), Phase::Solving);

    d.notify(Solution {
        tour: vec![City::new(1.5, 1.5), City::new(2.5, 2.5), City::new(3.5, 3.5)],
        cost: 10.0,
    });
    assert_eq!(d.phase(), Phase::Solving);

    let mut tour = d.graph().cities;
    tour.reverse();
    d.notify(Solution { tour, cost: 10.0 });
    assert_eq!(d.phase(), Phase::Solved);
}

#[test]
fn only_the_first_notification_is_accepted() {
    let mut d = Driver::new(ScriptedGateway {
        broker: true,
        ..ScriptedGateway::default()
    });
    d.generate("4");
    d.start_solve().unwrap();
    let cities = d.graph().cities;

    d.notify(Solution {
        tour: cities.clone(),
        cost: 1.0,
    });
    let mut reversed = cities;
    reversed.reverse();
    let effects = d.notify(Solution {
        tour: reversed,
        cost: 2.0,
    });

    assert!(last_frame(&effects).is_none());
    assert_eq!(d.controller.session().solution().map(|s| s.cost), Some(1.0));
}

#[test]
fn notification_while_not_solving_is_stale() {
    let mut d = Driver::new(ScriptedGateway::default());
    d.generate("3");
    let tour = d.graph().cities;
    let effects = d.notify(Solution { tour, cost: 5.0 });
    assert!(alerts(&effects).is_empty());
    assert_eq!(d.phase(), Phase::GraphReady);
}

#[test]
fn clear_after_solving_empties_the_canvas() {
    let mut d = Driver::new(ScriptedGateway::default());
    d.generate("5");
    let (ticket, request) = d.start_solve().unwrap();
    d.answer(ticket, &request);
    assert_eq!(d.phase(), Phase::Solved);

    let effects = d.command(Command::Clear);
    assert_eq!(d.phase(), Phase::Empty);
    let frame = last_frame(&effects).unwrap();
    assert_eq!(frame.discs().count(), 0);
    assert_eq!(frame.cost, None);
}

#[test]
fn short_graph_is_a_malformed_response() {
    let mut d = Driver::new(ScriptedGateway {
        short: true,
        ..ScriptedGateway::default()
    });
    let effects = d.generate("5");
    assert_eq!(
        alerts(&effects),
        ["Malformed response: asked for 5 cities, got 4"]
    );
    assert_eq!(d.phase(), Phase::Empty);
}

#[test]
fn cities_on_the_same_pixel_are_solved() {
    let mut d = Driver::new(ScriptedGateway {
        broker: true,
        ..ScriptedGateway::default()
    });
    let effects = d.command(Command::Generate("3".into()));
    let Some(Effect::FetchGraph(ticket)) = effects.first().cloned() else {
        panic!("expected FetchGraph, got {effects:?}");
    };
    let stacked = vec![City::new(1.0, 1.0), City::new(5.0, 5.0), City::new(1.0, 1.0)];
    d.controller.handle(Event::GraphLoaded {
        ticket,
        result: Ok(Graph::new(stacked.clone())),
    });
    assert_eq!(d.phase(), Phase::GraphReady);

    d.start_solve().unwrap();
    let mut tour = stacked;
    tour.rotate_left(1);
    d.notify(Solution { tour, cost: 8.0 });
    assert_eq!(d.phase(), Phase::Solved);

    let effects = d.command(Command::Solve);
    assert!(alerts(&effects).is_empty());
    assert_eq!(d.phase(), Phase::Solving);
}

#[test]
fn mismatched_direct_answer_frees_the_session() {
    let mut d = Driver::new(ScriptedGateway::default());
    d.generate("3");
    let (ticket, _) = d.start_solve().unwrap();

    let effects = d.controller.handle(Event::SolveDispatched {
        ticket,
        result: Ok(Dispatch::Delivered(Solution {
            tour: vec![City::new(2.5, 2.5)],
            cost: 1.0,
        })),
    });
    assert_eq!(alerts(&effects).len(), 1);
    assert!(alerts(&effects)[0].starts_with("Malformed response:"));
    assert_eq!(d.phase(), Phase::GraphReady);

    let (ticket, request) = d.start_solve().unwrap();
    d.answer(ticket, &request);
    assert_eq!(d.phase(), Phase::Solved);
}

#[test]
fn runtime_delivers_broker_notifications() {
    let gateway = Arc::new(ScriptedGateway {
        broker: true,
        ..ScriptedGateway::default()
    });
    let (notify_tx, notify_rx) = unbounded();
    let controller = Controller::new(canvas(), 1_000);
    let mut rt = Runtime::new(controller, gateway.clone()).with_notifications(notify_rx);

    rt.dispatch(Event::Command(Command::Generate("5".into())));
    assert!(rt.run_until(
        |c| c.session().phase() == Phase::GraphReady,
        Duration::from_secs(5)
    ));

    rt.dispatch(Event::Command(Command::SetParam {
        key: "numIter".into(),
        value: "50".into(),
    }));
    rt.dispatch(Event::Command(Command::Solve));
    assert!(rt.run_until(
        |_| gateway.solve_calls.load(Ordering::SeqCst) == 1,
        Duration::from_secs(5)
    ));
    assert_eq!(rt.controller().session().phase(), Phase::Solving);

    let mut tour = rt.controller().session().graph().unwrap().cities.clone();
    tour.swap(0, 4);
    notify_tx
        .send(ChannelEvent::Solution(Solution { tour, cost: 77.0 }))
        .unwrap();
    assert!(rt.run_until(
        |c| c.session().phase() == Phase::Solved,
        Duration::from_secs(5)
    ));
    assert_eq!(rt.controller().frame().cost, Some(77.0));
    assert!(rt.alerts().is_empty());
}
