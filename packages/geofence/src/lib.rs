#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geofence boundary loading and point evaluation.
//!
//! A boundary is a single `GeoJSON` polygon kept in an object store. It is
//! fetched fresh for every evaluation so edits to the stored definition
//! take effect on the next event.
//!
//! Distances are planar: longitude and latitude are treated as x and y and
//! converted to meters with a flat [`METERS_PER_DEGREE`] factor. This is
//! accurate near the equator and drifts with latitude.

pub mod boundary;
pub mod evaluate;

pub use boundary::{Boundary, BoundaryLoader, LoadError};
pub use evaluate::{Evaluation, EvaluationError, EvaluationResult, evaluate, try_evaluate};

/// Meters per degree at the equator.
pub const METERS_PER_DEGREE: f64 = 111_000.0;

/// Points farther than this from the boundary get a saturated decision.
pub const NEAR_BOUNDARY_M: f64 = 50.0;

/// Decision value for a point well inside the boundary.
pub const DEEP_INSIDE_DECISION: f64 = -999.0;

/// Decision value for a point well outside the boundary, or one that
/// could not be evaluated.
pub const DEEP_OUTSIDE_DECISION: f64 = 999.0;
