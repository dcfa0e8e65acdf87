//! Cities, graphs and the canvas they live on.
//!
//! Coordinates are canvas pixels. Two cities are the same city when their
//! coordinates are exactly equal; solver responses echo the coordinates they
//! were given, so no tolerance is applied.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A point to visit, in canvas pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub x: f64,
    pub y: f64,
}

/// Hashable identity of a city. `-0.0` and `0.0` map to the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CityKey(u64, u64);

impl City {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn key(&self) -> CityKey {
        CityKey(normalized_bits(self.x), normalized_bits(self.y))
    }

    pub fn distance_to(&self, other: &City) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_within(&self, size: CanvasSize) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.x >= 0.0
            && self.y >= 0.0
            && self.x < f64::from(size.width)
            && self.y < f64::from(size.height)
    }
}

fn normalized_bits(value: f64) -> u64 {
    if value == 0.0 { 0.0f64.to_bits() } else { value.to_bits() }
}

/// Canvas dimensions in whole pixels, as measured from the layout container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A canvas with no area cannot host cities.
    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// The full set of cities of the current problem instance.
///
/// Graphs are replaced wholesale and never edited in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub cities: Vec<City>,
}

impl Graph {
    pub fn new(cities: Vec<City>) -> Self {
        Self { cities }
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }

    /// How often each city occurs. Servers may place two cities on the
    /// same pixel, so a graph is a multiset of keys.
    pub fn key_counts(&self) -> HashMap<CityKey, usize> {
        let mut counts = HashMap::with_capacity(self.cities.len());
        for city in &self.cities {
            *counts.entry(city.key()).or_insert(0) += 1;
        }
        counts
    }

    /// Index of the first city outside `size`, if any.
    pub fn first_out_of_bounds(&self, size: CanvasSize) -> Option<usize> {
        self.cities.iter().position(|city| !city.is_within(size))
    }
}

/// An ordered visit over (a subset of) the graph's cities and the cost the
/// solver reported for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub tour: Vec<City>,
    pub cost: f64,
}

/// Why a tour cannot belong to a graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TourMismatch {
    /// The tour visits a city the graph does not contain.
    ForeignCity { index: usize, city: City },
    /// The tour visits a city more often than the graph contains it.
    DuplicateCity { index: usize, city: City },
    /// The tour leaves cities out where a complete tour was required.
    Incomplete { visited: usize, cities: usize },
}

impl fmt::Display for TourMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TourMismatch::ForeignCity { index, city } => write!(
                f,
                "tour stop #{} at ({}, {}) is not a city",
                index, city.x, city.y
            ),
            TourMismatch::DuplicateCity { index, city } => write!(
                f,
                "tour stop #{} at ({}, {}) is visited too often",
                index, city.x, city.y
            ),
            TourMismatch::Incomplete { visited, cities } => {
                write!(f, "tour visits {} of {} cities", visited, cities)
            }
        }
    }
}

/// Check that every stop of `tour` uses up one occurrence of a city of
/// `graph`.
///
/// A tour may cover a subset of the graph; [`match_full_tour`] is the
/// stricter check for a complete solution.
pub fn match_tour(graph: &Graph, tour: &[City]) -> Result<(), TourMismatch> {
    let mut remaining = graph.key_counts();
    for (index, city) in tour.iter().enumerate() {
        match remaining.get_mut(&city.key()) {
            None => return Err(TourMismatch::ForeignCity { index, city: *city }),
            Some(0) => return Err(TourMismatch::DuplicateCity { index, city: *city }),
            Some(left) => *left -= 1,
        }
    }
    Ok(())
}

/// Like [`match_tour`], and every city of `graph` must be visited.
pub fn match_full_tour(graph: &Graph, tour: &[City]) -> Result<(), TourMismatch> {
    match_tour(graph, tour)?;
    if tour.len() != graph.len() {
        return Err(TourMismatch::Incomplete {
            visited: tour.len(),
            cities: graph.len(),
        });
    }
    Ok(())
}

/// True when `tour` visits every city of `graph` exactly once.
pub fn is_permutation(graph: &Graph, tour: &[City]) -> bool {
    match_full_tour(graph, tour).is_ok()
}

/// Length of the open path through `tour`; no closing edge is added.
pub fn path_length(tour: &[City]) -> f64 {
    tour.windows(2).map(|pair| pair[0].distance_to(&pair[1])).sum()
}
