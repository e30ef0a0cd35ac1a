//! # crossmatch
//!
//! A spatial match-and-bin engine for cross-matching rows between large
//! tabular datasets by positional proximity — in N-dimensional Cartesian
//! space or on the celestial sphere, with fixed or per-row error radii.
//!
//! Positions are hashed into discrete, opaque cell labels so candidate
//! pairs can be found without an all-pairs comparison, and compact multimap
//! "binners" hold cell-to-row mappings densely enough to scale to tens of
//! millions of rows.
//!
//! ## Core pieces
//!
//! - **[`Tuple`]** — the minimal per-row scalar payload an engine consumes;
//!   the caller extracts it from its own row representation.
//! - **[`MatchEngine`]** — the geometry capability: candidate cells for a
//!   position and error scale, an exact pair score, uniform tuning knobs,
//!   and bounding-box extension for partition pruning.
//! - **Binners** — [`ObjectBinner`] for arbitrary payloads and the
//!   [`LongBinner`] family for raw row indices, all geometry-agnostic.
//! - **Engines** — [`CartesianMatchEngine`] / [`ErrorCartesianMatchEngine`]
//!   over a cubical grid, and [`SkyMatchEngine`] / [`ErrorSkyMatchEngine`]
//!   over a pluggable sky [`Pixellator`].
//!
//! A join driver indexes one table by inserting each row under every cell
//! from [`MatchEngine::bins`], then for each row of the other table looks up
//! candidates through the same cells and keeps pairs that pass
//! [`MatchEngine::match_score`]. Bin lookup may over-report (false positives
//! are filtered by the score) but never under-reports pairs within
//! tolerance.
//!
//! ## Example
//!
//! ```
//! use crossmatch::{
//!     long_binner_for_row_count, CartesianConfig, CartesianMatchEngine, MatchEngine, Tuple,
//! };
//!
//! let engine = CartesianMatchEngine::new(CartesianConfig::new(2, 1.0)).unwrap();
//! let table_a = [
//!     Tuple::from_f64s(&[0.0, 0.0]),
//!     Tuple::from_f64s(&[50.0, 50.0]),
//! ];
//!
//! // Indexing pass over table A.
//! let mut binner = long_binner_for_row_count(table_a.len() as u64);
//! for (row, tuple) in table_a.iter().enumerate() {
//!     for cell in engine.bins(tuple) {
//!         binner.add_item(cell, row as u64);
//!     }
//! }
//!
//! // Matching pass for one row of table B.
//! let probe = Tuple::from_f64s(&[0.5, 0.5]);
//! let mut matched = Vec::new();
//! for cell in engine.bins(&probe) {
//!     for row in binner.longs(&cell).unwrap_or_default() {
//!         if let Some(score) = engine.match_score(&probe, &table_a[row as usize]) {
//!             matched.push((row, score));
//!         }
//!     }
//! }
//! matched.sort_unstable_by(|a, b| a.0.cmp(&b.0));
//! matched.dedup_by_key(|pair| pair.0);
//! assert_eq!(matched.len(), 1);
//! assert_eq!(matched[0].0, 0);
//! ```
//!
//! ## Concurrency
//!
//! No internal threading. Engine query methods take `&self` and are pure
//! functions of their arguments and an immutable configuration snapshot, so
//! they are freely callable in parallel; reconfiguration takes `&mut self`.
//! Binner population is a sequential pass; after it the binner can be read
//! from many threads.

pub mod binner;
pub mod cartesian;
pub mod engine;
pub mod sky;
pub mod tuple;

pub use binner::{
    long_binner_for_row_count, CompactLongBinner, LongBinner, LongsBinner, ObjectBinner,
};
pub use cartesian::{
    CartesianConfig, CartesianMatchEngine, ErrorCartesianConfig, ErrorCartesianMatchEngine,
};
pub use engine::{Cell, ConfigError, MatchBounds, MatchEngine, TuningParam, DEFAULT_BIN_FACTOR};
pub use sky::{
    haversine_separation, ErrorSkyConfig, ErrorSkyMatchEngine, Pixellator, SkyConfig,
    SkyMatchEngine, ZonePixellator, ARCSEC_PER_RADIAN,
};
pub use tuple::{Tuple, Value, ValueInfo};
