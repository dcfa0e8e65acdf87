//! Client for a heuristic travelling-salesman visualizer.
//!
//! Cities are generated by a remote solver service, tours are requested from
//! it either synchronously or through a STOMP broker, and the current state
//! is rendered to SVG, PNG or PDF.

pub mod catalog;
pub mod channel;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod export;
pub mod gateway;
pub mod geometry;
pub mod palette;
pub mod render;
pub mod runtime;
pub mod session;
pub mod stomp;
pub mod svg;
pub mod wire;

pub use error::{VizError, VizResult};
