//! The matching-engine capability shared by all concrete geometries.
//!
//! A [`MatchEngine`] knows, for one geometry, how to turn a row tuple into
//! the set of spatial-index cells its uncertainty footprint touches, and how
//! to score a candidate pair. The engine is the only place geometry lives;
//! the binners in [`crate::binner`] treat [`Cell`]s as opaque keys.
//!
//! Hot-path calls ([`MatchEngine::bins`], [`MatchEngine::radius_bins`],
//! [`MatchEngine::match_score`]) are total: dirty per-row input (NaN
//! coordinates, negative radii) degrades to an empty bin set or a `None`
//! score, never an error. Only configuration-time mistakes surface as
//! [`ConfigError`].
//!
//! Engines hold an immutable derived snapshot of their tuning state, so the
//! `&self` query methods are pure functions of their arguments and safe to
//! call from many threads; reconfiguration takes `&mut self` and rebuilds
//! the snapshot, so the borrow checker enforces the
//! configure-then-match-phase discipline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tuple::{Tuple, Value, ValueInfo};

/// Default multiplier from a guide scale distance to the grid cell size.
///
/// Larger values mean larger, fewer cells per query; 8 keeps per-dimension
/// spans at one or two cells for errors at the guide scale.
pub const DEFAULT_BIN_FACTOR: f64 = 8.0;

/// Opaque, hashable identifier for one cell of a spatial index.
///
/// Two cells are equal iff all components are equal; cells are stable for
/// the lifetime of one binning pass and carry no other meaning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cell {
    /// Integer vector cell of a Cartesian grid, one component per dimension.
    Grid(Vec<i64>),
    /// Packed pixel id from a sky pixellation scheme.
    Pixel(u64),
}

/// One named, described tuning knob exposed uniformly by every engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningParam {
    /// Name, description, and units of the knob.
    pub info: ValueInfo,
    /// Current value.
    pub value: f64,
}

impl TuningParam {
    pub fn new(info: ValueInfo, value: f64) -> Self {
        Self { info, value }
    }
}

/// A possibly partially-resolved bounding box over tuple fields.
///
/// `None` components mean "unresolved": the engine could not compute a safe
/// bound for that field, and the caller must not prune on it. Returning an
/// entirely unresolved box is always a safe answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchBounds {
    /// Per-field lower bounds.
    pub min: Vec<Option<Value>>,
    /// Per-field upper bounds.
    pub max: Vec<Option<Value>>,
}

impl MatchBounds {
    /// Bounds with every component resolved from explicit values.
    pub fn new(min: Vec<Option<Value>>, max: Vec<Option<Value>>) -> Self {
        Self { min, max }
    }

    /// Fully unresolved bounds over `len` fields.
    pub fn unresolved(len: usize) -> Self {
        Self {
            min: vec![None; len],
            max: vec![None; len],
        }
    }
}

/// Errors raised by configuration-time operations.
///
/// These are rare, human-driven events (as opposed to per-row data), so they
/// fail fast rather than degrade.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A scale, error, or bin-factor value was not strictly positive, or a
    /// structural parameter (dimension count) was invalid.
    #[error("invalid engine config: {0}")]
    Invalid(String),
    /// `set_tuning_parameter` was called with a name the engine does not own.
    #[error("unknown tuning parameter: {0}")]
    UnknownParameter(String),
}

/// Require a strictly positive, finite configuration value.
pub(crate) fn require_positive(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{name} must be positive, got {value}"
        )))
    }
}

/// Capability implemented by every concrete match engine.
///
/// `bins` and `radius_bins` answer "which cells must be checked for this
/// row"; `match_score` is the exact acceptance check applied to candidate
/// pairs found through cell intersection. Bin lookup may produce false
/// positives (filtered by the score) but must never produce false
/// negatives for pairs within tolerance.
pub trait MatchEngine {
    /// Short human-readable engine name for logs and UIs.
    fn name(&self) -> &'static str;

    /// Descriptors for the tuple fields this engine expects, in order.
    fn tuple_infos(&self) -> Vec<ValueInfo>;

    /// Cells that must be checked when indexing `tuple` at the engine's
    /// configured error scale. Empty if any coordinate is unusable.
    fn bins(&self, tuple: &Tuple) -> Vec<Cell>;

    /// Cells that must be checked for `tuple` given an explicit per-row
    /// `radius`. Empty if the radius is negative or any coordinate is
    /// unusable.
    fn radius_bins(&self, tuple: &Tuple, radius: f64) -> Vec<Cell>;

    /// Score a candidate pair: `Some(distance)` (non-negative, in the
    /// engine's score units) when the pair is within tolerance, `None`
    /// otherwise. Commutative in its arguments.
    fn match_score(&self, tuple_a: &Tuple, tuple_b: &Tuple) -> Option<f64>;

    /// The engine's tuning knobs, exposed uniformly so a driver can
    /// auto-tune without engine-specific code.
    fn tuning_parameters(&self) -> Vec<TuningParam>;

    /// Set one tuning knob by name, rebuilding derived state. Fails fast on
    /// unknown names and non-positive values.
    fn set_tuning_parameter(&mut self, name: &str, value: f64) -> Result<(), ConfigError>;

    /// Widen a per-table bounding box so it is guaranteed to contain every
    /// point that could match something inside the input box. Unresolved
    /// components mean "no pruning possible for this field".
    fn match_bounds(&self, bounds: &MatchBounds) -> MatchBounds;
}

/// Direction in which [`extend_value`] rounds integral bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rounding {
    /// Lower bound: round down.
    Floor,
    /// Upper bound: round up.
    Ceil,
}

/// Shift a bound component by `delta`, preserving its numeric
/// representation. Integral values round outward per `rounding` so the safe
/// region is never narrowed; components that cannot be represented (NaN
/// shift, out-of-range integer) come back unresolved.
pub(crate) fn extend_value(value: &Value, delta: f64, rounding: Rounding) -> Option<Value> {
    if delta.is_nan() {
        return None;
    }
    match *value {
        Value::Float(f) => {
            let shifted = f + delta;
            if shifted.is_nan() {
                None
            } else {
                Some(Value::Float(shifted))
            }
        }
        Value::Int(i) => {
            let shifted = i as f64 + delta;
            let rounded = match rounding {
                Rounding::Floor => shifted.floor(),
                Rounding::Ceil => shifted.ceil(),
            };
            if rounded.is_nan() || rounded < i64::MIN as f64 || rounded > i64::MAX as f64 {
                None
            } else {
                Some(Value::Int(rounded as i64))
            }
        }
        Value::Null => None,
    }
}
