//! Payload shapes exchanged with the solver service and the broker.

use serde::{Deserialize, Serialize};

use crate::catalog::{Algorithm, Parameter};
use crate::error::{VizError, VizResult};
use crate::geometry::{CanvasSize, City, Graph, Solution, match_tour};

/// Body of a graph generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRequest {
    pub num_cities: usize,
    /// `[width, height]` of the canvas the cities must fit in.
    pub boundaries: [u32; 2],
}

impl GraphRequest {
    pub fn new(count: usize, bounds: CanvasSize) -> Self {
        Self {
            num_cities: count,
            boundaries: [bounds.width, bounds.height],
        }
    }
}

/// Graph response. A `distances` matrix may ride along and is ignored.
#[derive(Debug, Clone, Deserialize)]
struct GraphBody {
    cities: Vec<City>,
}

/// Everything the solver needs for one solve, sent once per solve action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolutionRequest {
    pub cities: Vec<City>,
    pub algo_type: Algorithm,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
}

/// Solution payload; the tour is named `solution` or `tour` depending on
/// the delivery path.
#[derive(Debug, Clone, Deserialize)]
struct SolutionBody {
    #[serde(alias = "tour")]
    solution: Vec<City>,
    cost: f64,
}

impl From<SolutionBody> for Solution {
    fn from(body: SolutionBody) -> Self {
        Solution {
            tour: body.solution,
            cost: body.cost,
        }
    }
}

/// Broker message wrapper. `content` is either the solution object or a
/// string holding its JSON.
#[derive(Debug, Clone, Deserialize)]
struct Envelope {
    content: serde_json::Value,
}

pub fn encode<T: Serialize>(payload: &T) -> VizResult<String> {
    serde_json::to_string(payload)
        .map_err(|e| VizError::Render(format!("Failed to encode request: {}", e)))
}

pub fn decode_graph(text: &str) -> VizResult<Graph> {
    let body: GraphBody = serde_json::from_str(text)
        .map_err(|e| VizError::malformed(format!("graph response: {}", e)))?;
    Ok(Graph::new(body.cities))
}

pub fn decode_solution(text: &str) -> VizResult<Solution> {
    let body: SolutionBody = serde_json::from_str(text)
        .map_err(|e| VizError::malformed(format!("solution response: {}", e)))?;
    check_cost(body.into())
}

/// Unwrap a broker notification into a solution.
pub fn decode_notification(text: &str) -> VizResult<Solution> {
    let envelope: Envelope = serde_json::from_str(text)
        .map_err(|e| VizError::malformed(format!("notification envelope: {}", e)))?;

    let body: SolutionBody = match envelope.content {
        serde_json::Value::String(inner) => serde_json::from_str(&inner),
        other => serde_json::from_value(other),
    }
    .map_err(|e| VizError::malformed(format!("notification content: {}", e)))?;

    check_cost(body.into())
}

/// Saved canvas state: a graph and optionally the tour drawn over it.
#[derive(Debug, Clone, Deserialize)]
struct SnapshotBody {
    cities: Vec<City>,
    #[serde(default)]
    solution: Option<SolutionBody>,
}

/// Decode an offline snapshot. The tour, when present, must visit only
/// cities of the snapshot and each no more often than it occurs.
pub fn decode_snapshot(text: &str) -> VizResult<(Graph, Option<Solution>)> {
    let body: SnapshotBody = serde_json::from_str(text)
        .map_err(|e| VizError::malformed(format!("snapshot: {}", e)))?;
    let graph = Graph::new(body.cities);

    let solution = match body.solution {
        Some(solution) => {
            let solution = check_cost(solution.into())?;
            match_tour(&graph, &solution.tour)
                .map_err(|mismatch| VizError::malformed(format!("snapshot {}", mismatch)))?;
            Some(solution)
        }
        None => None,
    };
    Ok((graph, solution))
}

fn check_cost(solution: Solution) -> VizResult<Solution> {
    if !solution.cost.is_finite() {
        return Err(VizError::malformed(format!(
            "solution cost {} is not a finite number",
            solution.cost
        )));
    }
    Ok(solution)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_request_uses_camel_case() {
        let body = encode(&GraphRequest::new(5, CanvasSize::new(800, 600))).unwrap();
        assert_eq!(body, r#"{"numCities":5,"boundaries":[800,600]}"#);
    }

    #[test]
    fn solution_request_shape() {
        let request = SolutionRequest {
            cities: vec![City::new(1.0, 2.0)],
            algo_type: Algorithm::SimulatedAnnealing,
            parameters: vec![Parameter {
                name: "to".into(),
                value: 100.0,
            }],
        };
        let body = encode(&request).unwrap();
        assert_eq!(
            body,
            r#"{"cities":[{"x":1.0,"y":2.0}],"algoType":"sa","parameters":[{"name":"to","value":100.0}]}"#
        );
    }

    #[test]
    fn graph_ignores_distances() {
        let graph =
            decode_graph(r#"{"cities":[{"x":1,"y":2},{"x":3.5,"y":4}],"distances":[[0,1],[1,0]]}"#)
                .unwrap();
        assert_eq!(graph.cities, vec![City::new(1.0, 2.0), City::new(3.5, 4.0)]);
    }

    #[test]
    fn graph_without_cities_is_malformed() {
        let err = decode_graph(r#"{"points":[]}"#).unwrap_err();
        assert!(matches!(err, VizError::MalformedResponse(_)));
    }

    #[test]
    fn solution_accepts_both_tour_field_names() {
        let a = decode_solution(r#"{"solution":[{"x":1,"y":1}],"cost":0}"#).unwrap();
        let b = decode_solution(r#"{"tour":[{"x":1,"y":1}],"cost":0}"#).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn notification_content_may_be_object_or_string() {
        let object = decode_notification(
            r#"{"content":{"solution":[{"x":1,"y":2},{"x":3,"y":4}],"cost":123.4}}"#,
        )
        .unwrap();
        let string = decode_notification(
            r#"{"content":"{\"tour\":[{\"x\":1,\"y\":2},{\"x\":3,\"y\":4}],\"cost\":123.4}"}"#,
        )
        .unwrap();
        assert_eq!(object, string);
        assert_eq!(object.cost, 123.4);
    }

    #[test]
    fn snapshot_with_and_without_solution() {
        let (graph, solution) =
            decode_snapshot(r#"{"cities":[{"x":1,"y":2},{"x":3,"y":4}]}"#).unwrap();
        assert_eq!(graph.len(), 2);
        assert!(solution.is_none());

        let (_, solution) = decode_snapshot(
            r#"{"cities":[{"x":1,"y":2},{"x":3,"y":4}],"solution":{"tour":[{"x":3,"y":4},{"x":1,"y":2}],"cost":2.8}}"#,
        )
        .unwrap();
        assert_eq!(solution.map(|s| s.tour.len()), Some(2));
    }

    #[test]
    fn snapshot_tour_must_fit_cities() {
        let err = decode_snapshot(
            r#"{"cities":[{"x":1,"y":2}],"solution":{"solution":[{"x":9,"y":9}],"cost":1}}"#,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Malformed response: snapshot tour stop #0 at (9, 9) is not a city"
        );
    }

    #[test]
    fn snapshot_may_repeat_coordinates() {
        let (graph, solution) = decode_snapshot(
            r#"{"cities":[{"x":1,"y":1},{"x":5,"y":5},{"x":1,"y":1}],"solution":{"tour":[{"x":1,"y":1},{"x":1,"y":1},{"x":5,"y":5}],"cost":8}}"#,
        )
        .unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(solution.map(|s| s.tour.len()), Some(3));
    }

    #[test]
    fn notification_without_envelope_is_malformed() {
        let err = decode_notification(r#"{"solution":[],"cost":1}"#).unwrap_err();
        assert!(matches!(err, VizError::MalformedResponse(_)));
    }
}
