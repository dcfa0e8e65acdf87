//! Pure projection of (graph, solution) onto an ordered list of draw
//! operations.
//!
//! The frame always starts from a cleared surface and contains one disc per
//! graph city, in graph order, followed by one segment per consecutive pair
//! of tour cities, in tour order. The path is open: no segment joins the last
//! city back to the first.

use crate::geometry::{CanvasSize, City, Graph, Solution};

/// Default disc radius in pixels.
pub const CITY_RADIUS: f64 = 5.0;

/// Role of a city disc, mapped to a fill color by the palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Neutral,
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    /// Wipe the whole surface.
    Clear { width: u32, height: u32 },
    /// Filled and outlined disc centered on a city.
    Disc {
        center: City,
        radius: f64,
        marker: Marker,
    },
    Segment { from: City, to: City },
}

/// Everything needed to paint one canvas state.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub size: CanvasSize,
    pub ops: Vec<DrawOp>,
    /// Cost of the displayed solution.
    pub cost: Option<f64>,
}

impl Frame {
    pub fn discs(&self) -> impl Iterator<Item = (&City, Marker)> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Disc { center, marker, .. } => Some((center, *marker)),
            _ => None,
        })
    }

    pub fn segments(&self) -> impl Iterator<Item = (&City, &City)> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Segment { from, to } => Some((from, to)),
            _ => None,
        })
    }
}

/// Build the frame for the current state.
///
/// Cities are drawn where they are even if a resize has left them outside
/// `size`.
pub fn plan(graph: Option<&Graph>, solution: Option<&Solution>, size: CanvasSize, radius: f64) -> Frame {
    let cities = graph.map_or(&[][..], |g| g.cities.as_slice());
    let tour = solution.map_or(&[][..], |s| s.tour.as_slice());

    let mut ops = Vec::with_capacity(1 + cities.len() + tour.len().saturating_sub(1));
    ops.push(DrawOp::Clear {
        width: size.width,
        height: size.height,
    });

    let start = tour.first().map(City::key);
    let end = tour.last().map(City::key);
    for city in cities {
        let key = Some(city.key());
        // a one-city tour is both start and end; start wins
        let marker = if key == start {
            Marker::Start
        } else if key == end {
            Marker::End
        } else {
            Marker::Neutral
        };
        ops.push(DrawOp::Disc {
            center: *city,
            radius,
            marker,
        });
    }

    ops.extend(tour.windows(2).map(|pair| DrawOp::Segment {
        from: pair[0],
        to: pair[1],
    }));

    Frame {
        size,
        ops,
        cost: solution.map(|s| s.cost),
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_solved() -> impl Strategy<Value = (Graph, Solution)> {
        prop::collection::hash_set((0u16..800, 0u16..600), 2..60)
            .prop_map(|points| {
                let cities: Vec<City> = points
                    .into_iter()
                    .map(|(x, y)| City::new(f64::from(x), f64::from(y)))
                    .collect();
                cities
            })
            .prop_flat_map(|cities| {
                let len = cities.len();
                (Just(cities), Just((0..len).collect::<Vec<usize>>()).prop_shuffle())
            })
            .prop_map(|(cities, order)| {
                let tour = order.iter().map(|&i| cities[i]).collect();
                (Graph::new(cities), Solution { tour, cost: 1.0 })
            })
    }

    proptest! {
        /// Property: planning the same state twice yields identical frames.
        #[test]
        fn prop_render_idempotent((graph, solution) in arb_solved(), with_solution in any::<bool>()) {
            let solution = with_solution.then_some(&solution);
            let size = CanvasSize::new(800, 600);
            let first = plan(Some(&graph), solution, size, CITY_RADIUS);
            let second = plan(Some(&graph), solution, size, CITY_RADIUS);
            prop_assert_eq!(first, second);
        }

        /// Property: a full tour gives one start, one end, n-2 neutral discs and n-1 segments.
        #[test]
        fn prop_solved_frame_counts((graph, solution) in arb_solved()) {
            let n = graph.len();
            let frame = plan(Some(&graph), Some(&solution), CanvasSize::new(800, 600), CITY_RADIUS);
            let count = |wanted: Marker| frame.discs().filter(|(_, m)| *m == wanted).count();

            prop_assert_eq!(count(Marker::Start), 1);
            prop_assert_eq!(count(Marker::End), 1);
            prop_assert_eq!(count(Marker::Neutral), n - 2);
            prop_assert_eq!(frame.segments().count(), n - 1);
        }
    }
}
