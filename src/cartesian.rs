//! N-dimensional Euclidean match engines over a cubical spatial-hash grid.
//!
//! Continuous coordinates are hashed to integer [`Cell::Grid`] labels by
//! `floor(value * inverse_bin_size)` per dimension, with the cell size
//! derived as `scale * bin_factor`. Candidate lookup returns every cell
//! touched by the axis-aligned box around a point at its error radius; the
//! exact acceptance check is the Euclidean distance in
//! [`CartesianMatchEngine::match_score`].
//!
//! Two engines share the grid: [`CartesianMatchEngine`] with a fixed
//! isotropic error, and [`ErrorCartesianMatchEngine`] where each row carries
//! its own radius in a trailing tuple field and a pair matches within the
//! sum of the two radii.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::engine::{
    extend_value, require_positive, Cell, ConfigError, MatchBounds, MatchEngine, Rounding,
    TuningParam, DEFAULT_BIN_FACTOR,
};
use crate::tuple::{Tuple, ValueInfo};

/// Squared-distance accumulation with early exit.
///
/// Adds up per-dimension squared differences and bails out with `None` as
/// soon as the running sum exceeds the squared threshold, so dimension order
/// affects speed but never correctness; callers wanting speed should put the
/// most discriminating dimension first. NaN coordinates fail the comparison
/// and reject the pair. Returns the true (non-squared) distance on success.
pub(crate) fn euclidean_score(ndim: usize, a: &Tuple, b: &Tuple, max_error: f64) -> Option<f64> {
    if !(max_error >= 0.0) {
        return None;
    }
    let max2 = max_error * max_error;
    let mut sum = 0.0;
    for d in 0..ndim {
        let diff = a.real(d) - b.real(d);
        sum += diff * diff;
        if !(sum <= max2) {
            return None;
        }
    }
    Some(sum.sqrt())
}

/// Immutable derived grid state: one inverse cell size per dimension.
#[derive(Debug, Clone)]
struct Grid {
    inverse_bin_size: Vec<f64>,
}

impl Grid {
    fn new(ndim: usize, scale: f64, bin_factor: f64) -> Self {
        Self {
            inverse_bin_size: vec![1.0 / (scale * bin_factor); ndim],
        }
    }

    /// All cells touched by the box `[coord - radius, coord + radius]` in
    /// each dimension: the Cartesian product of the per-dimension label
    /// ranges. Empty for unusable coordinates or a negative/NaN radius.
    fn cells(&self, tuple: &Tuple, radius: f64) -> Vec<Cell> {
        if !(radius >= 0.0) || !radius.is_finite() {
            return Vec::new();
        }
        let ndim = self.inverse_bin_size.len();
        let mut lo = Vec::with_capacity(ndim);
        let mut hi = Vec::with_capacity(ndim);
        for (d, &ibs) in self.inverse_bin_size.iter().enumerate() {
            let coord = tuple.real(d);
            let lo_f = ((coord - radius) * ibs).floor();
            let hi_f = ((coord + radius) * ibs).floor();
            if !lo_f.is_finite() || !hi_f.is_finite() {
                return Vec::new();
            }
            lo.push(lo_f as i64);
            hi.push(hi_f as i64);
        }

        // Odometer walk over the per-dimension ranges.
        let mut cells = Vec::new();
        let mut label = lo.clone();
        loop {
            cells.push(Cell::Grid(label.clone()));
            let mut d = 0;
            loop {
                if d == ndim {
                    return cells;
                }
                label[d] += 1;
                if label[d] <= hi[d] {
                    break;
                }
                label[d] = lo[d];
                d += 1;
            }
        }
    }
}

fn coord_infos(ndim: usize) -> Vec<ValueInfo> {
    (1..=ndim)
        .map(|d| ValueInfo::new(format!("Coord {d}"), format!("Coordinate on axis {d}")))
        .collect()
}

/// Configuration for [`CartesianMatchEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartesianConfig {
    /// Number of Cartesian dimensions.
    pub ndim: usize,
    /// Isotropic match threshold; doubles as the grid guide scale.
    pub error: f64,
    /// Multiplier from the guide scale to the grid cell size.
    pub bin_factor: f64,
}

impl CartesianConfig {
    /// Config with the default bin factor.
    pub fn new(ndim: usize, error: f64) -> Self {
        Self {
            ndim,
            error,
            bin_factor: DEFAULT_BIN_FACTOR,
        }
    }

    /// Override the bin factor.
    pub fn with_bin_factor(mut self, bin_factor: f64) -> Self {
        self.bin_factor = bin_factor;
        self
    }

    /// Fail fast on structurally invalid configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ndim == 0 {
            return Err(ConfigError::Invalid("ndim must be at least 1".into()));
        }
        require_positive("error", self.error)?;
        require_positive("bin factor", self.bin_factor)
    }
}

/// Fixed-error N-dimensional Euclidean match engine.
///
/// Two points match when their Euclidean distance is at most the configured
/// error; the score is that distance.
#[derive(Debug, Clone)]
pub struct CartesianMatchEngine {
    config: CartesianConfig,
    grid: Grid,
}

impl CartesianMatchEngine {
    /// Build an engine from a validated configuration.
    pub fn new(config: CartesianConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let grid = Grid::new(config.ndim, config.error, config.bin_factor);
        Ok(Self { config, grid })
    }

    /// The current configuration snapshot.
    pub fn config(&self) -> &CartesianConfig {
        &self.config
    }

    fn reconfigure(&mut self, config: CartesianConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.grid = Grid::new(config.ndim, config.error, config.bin_factor);
        self.config = config;
        Ok(())
    }
}

impl MatchEngine for CartesianMatchEngine {
    fn name(&self) -> &'static str {
        "Cartesian"
    }

    fn tuple_infos(&self) -> Vec<ValueInfo> {
        coord_infos(self.config.ndim)
    }

    fn bins(&self, tuple: &Tuple) -> Vec<Cell> {
        self.grid.cells(tuple, self.config.error)
    }

    fn radius_bins(&self, tuple: &Tuple, radius: f64) -> Vec<Cell> {
        self.grid.cells(tuple, radius)
    }

    fn match_score(&self, tuple_a: &Tuple, tuple_b: &Tuple) -> Option<f64> {
        euclidean_score(self.config.ndim, tuple_a, tuple_b, self.config.error)
    }

    fn tuning_parameters(&self) -> Vec<TuningParam> {
        vec![
            TuningParam::new(
                ValueInfo::new("Error", "Maximum Euclidean distance for a match"),
                self.config.error,
            ),
            TuningParam::new(
                ValueInfo::new("Bin Factor", "Grid cell size as a multiple of the error"),
                self.config.bin_factor,
            ),
        ]
    }

    fn set_tuning_parameter(&mut self, name: &str, value: f64) -> Result<(), ConfigError> {
        let mut config = self.config.clone();
        match name {
            "Error" => config.error = value,
            "Bin Factor" => config.bin_factor = value,
            other => return Err(ConfigError::UnknownParameter(other.into())),
        }
        self.reconfigure(config)?;
        debug!("cartesian engine: {name} set to {value}");
        Ok(())
    }

    fn match_bounds(&self, bounds: &MatchBounds) -> MatchBounds {
        widen_coords(bounds, self.config.ndim, self.config.error)
    }
}

/// Widen the first `ndim` components of `bounds` outward by `delta`,
/// passing any further components through unchanged.
fn widen_coords(bounds: &MatchBounds, ndim: usize, delta: f64) -> MatchBounds {
    let mut out = bounds.clone();
    for d in 0..ndim {
        if let Some(slot) = out.min.get_mut(d) {
            *slot = slot
                .as_ref()
                .and_then(|v| extend_value(v, -delta, Rounding::Floor));
        }
        if let Some(slot) = out.max.get_mut(d) {
            *slot = slot
                .as_ref()
                .and_then(|v| extend_value(v, delta, Rounding::Ceil));
        }
    }
    out
}

/// Configuration for [`ErrorCartesianMatchEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorCartesianConfig {
    /// Number of Cartesian dimensions (the error field comes after them).
    pub ndim: usize,
    /// Guide error distance governing grid granularity only.
    pub scale: f64,
    /// Multiplier from the guide scale to the grid cell size.
    pub bin_factor: f64,
}

impl ErrorCartesianConfig {
    /// Config with the default bin factor.
    pub fn new(ndim: usize, scale: f64) -> Self {
        Self {
            ndim,
            scale,
            bin_factor: DEFAULT_BIN_FACTOR,
        }
    }

    /// Override the bin factor.
    pub fn with_bin_factor(mut self, bin_factor: f64) -> Self {
        self.bin_factor = bin_factor;
        self
    }

    /// Fail fast on structurally invalid configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ndim == 0 {
            return Err(ConfigError::Invalid("ndim must be at least 1".into()));
        }
        require_positive("scale", self.scale)?;
        require_positive("bin factor", self.bin_factor)
    }
}

/// Per-row-error Euclidean match engine.
///
/// Tuples are `[x1 .. xn, error]`; a pair matches when the distance is at
/// most the sum of the two rows' error radii. The engine-level scale and
/// bin factor govern indexing granularity only, never acceptance.
#[derive(Debug, Clone)]
pub struct ErrorCartesianMatchEngine {
    config: ErrorCartesianConfig,
    grid: Grid,
}

impl ErrorCartesianMatchEngine {
    /// Build an engine from a validated configuration.
    pub fn new(config: ErrorCartesianConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let grid = Grid::new(config.ndim, config.scale, config.bin_factor);
        Ok(Self { config, grid })
    }

    /// The current configuration snapshot.
    pub fn config(&self) -> &ErrorCartesianConfig {
        &self.config
    }

    fn reconfigure(&mut self, config: ErrorCartesianConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.grid = Grid::new(config.ndim, config.scale, config.bin_factor);
        self.config = config;
        Ok(())
    }
}

impl MatchEngine for ErrorCartesianMatchEngine {
    fn name(&self) -> &'static str {
        "Cartesian with Errors"
    }

    fn tuple_infos(&self) -> Vec<ValueInfo> {
        let mut infos = coord_infos(self.config.ndim);
        infos.push(ValueInfo::new("Error", "Per-row match radius"));
        infos
    }

    fn bins(&self, tuple: &Tuple) -> Vec<Cell> {
        // The row's own radius is its uncertainty footprint.
        self.grid.cells(tuple, tuple.real(self.config.ndim))
    }

    fn radius_bins(&self, tuple: &Tuple, radius: f64) -> Vec<Cell> {
        self.grid.cells(tuple, radius)
    }

    fn match_score(&self, tuple_a: &Tuple, tuple_b: &Tuple) -> Option<f64> {
        let ndim = self.config.ndim;
        let max_error = tuple_a.real(ndim) + tuple_b.real(ndim);
        euclidean_score(ndim, tuple_a, tuple_b, max_error)
    }

    fn tuning_parameters(&self) -> Vec<TuningParam> {
        vec![
            TuningParam::new(
                ValueInfo::new("Scale", "Guide error distance for grid granularity"),
                self.config.scale,
            ),
            TuningParam::new(
                ValueInfo::new("Bin Factor", "Grid cell size as a multiple of the scale"),
                self.config.bin_factor,
            ),
        ]
    }

    fn set_tuning_parameter(&mut self, name: &str, value: f64) -> Result<(), ConfigError> {
        let mut config = self.config.clone();
        match name {
            "Scale" => config.scale = value,
            "Bin Factor" => config.bin_factor = value,
            other => return Err(ConfigError::UnknownParameter(other.into())),
        }
        self.reconfigure(config)?;
        debug!("error-cartesian engine: {name} set to {value}");
        Ok(())
    }

    fn match_bounds(&self, bounds: &MatchBounds) -> MatchBounds {
        // The acceptance threshold is the sum of two per-row radii. Only
        // this table's maximum radius is visible here, so assume the other
        // table's rows are no worse and widen by twice that maximum; if the
        // error column bound is itself unresolved, no pruning is possible.
        let max_error = bounds
            .max
            .get(self.config.ndim)
            .and_then(|v| v.as_ref())
            .map(|v| v.as_f64());
        match max_error {
            Some(err) if err.is_finite() && err >= 0.0 => {
                widen_coords(bounds, self.config.ndim, 2.0 * err)
            }
            _ => {
                let mut out = bounds.clone();
                for d in 0..self.config.ndim.min(out.min.len()) {
                    out.min[d] = None;
                }
                for d in 0..self.config.ndim.min(out.max.len()) {
                    out.max[d] = None;
                }
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::Value;

    fn engine_2d(error: f64) -> CartesianMatchEngine {
        CartesianMatchEngine::new(CartesianConfig::new(2, error)).expect("valid config")
    }

    #[test]
    fn two_d_scenario() {
        // Bin size 8.0; points well inside one neighbourhood.
        let engine = engine_2d(1.0);
        let a = Tuple::from_f64s(&[0.0, 0.0]);
        let b = Tuple::from_f64s(&[0.5, 0.5]);

        let score = engine.match_score(&a, &b).expect("within error");
        assert!((score - 0.5_f64.hypot(0.5)).abs() < 1e-12);

        let bins_a = engine.bins(&a);
        let bins_b = engine.bins(&b);
        assert!(bins_a.iter().any(|cell| bins_b.contains(cell)));
    }

    #[test]
    fn score_is_commutative() {
        let engine = engine_2d(2.0);
        let a = Tuple::from_f64s(&[1.0, -3.0]);
        let b = Tuple::from_f64s(&[0.25, -2.0]);
        assert_eq!(engine.match_score(&a, &b), engine.match_score(&b, &a));
    }

    #[test]
    fn beyond_error_is_no_match() {
        let engine = engine_2d(1.0);
        let a = Tuple::from_f64s(&[0.0, 0.0]);
        let b = Tuple::from_f64s(&[2.0, 0.0]);
        assert_eq!(engine.match_score(&a, &b), None);
    }

    #[test]
    fn nan_coordinate_degrades_not_fails() {
        let engine = engine_2d(1.0);
        let bad = Tuple::from_f64s(&[f64::NAN, 0.0]);
        let good = Tuple::from_f64s(&[0.0, 0.0]);
        assert!(engine.bins(&bad).is_empty());
        assert!(engine.radius_bins(&bad, 1.0).is_empty());
        assert_eq!(engine.match_score(&bad, &good), None);
        assert_eq!(engine.match_score(&good, &bad), None);
    }

    #[test]
    fn negative_radius_yields_no_bins() {
        let engine = engine_2d(1.0);
        let t = Tuple::from_f64s(&[0.0, 0.0]);
        assert!(engine.radius_bins(&t, -0.5).is_empty());
        assert!(engine.radius_bins(&t, f64::NAN).is_empty());
    }

    #[test]
    fn early_exit_matches_reference_distance() {
        let mut rng = fastrand::Rng::with_seed(0x5eed);
        let engine = engine_2d(1.0);
        for _ in 0..500 {
            let a = Tuple::from_f64s(&[rng.f64() * 4.0, rng.f64() * 4.0]);
            let b = Tuple::from_f64s(&[rng.f64() * 4.0, rng.f64() * 4.0]);
            let reference = {
                let dx = a.real(0) - b.real(0);
                let dy = a.real(1) - b.real(1);
                (dx * dx + dy * dy).sqrt()
            };
            match engine.match_score(&a, &b) {
                Some(score) => {
                    assert!(reference <= 1.0 + 1e-12);
                    assert!((score - reference).abs() < 1e-12);
                }
                None => assert!(reference > 1.0),
            }
        }
    }

    #[test]
    fn matching_pairs_share_a_bin() {
        let mut rng = fastrand::Rng::with_seed(42);
        let engine = engine_2d(1.0);
        for _ in 0..500 {
            let a = Tuple::from_f64s(&[rng.f64() * 20.0 - 10.0, rng.f64() * 20.0 - 10.0]);
            let b = Tuple::from_f64s(&[
                a.real(0) + rng.f64() * 2.0 - 1.0,
                a.real(1) + rng.f64() * 2.0 - 1.0,
            ]);
            if engine.match_score(&a, &b).is_some() {
                let bins_a = engine.bins(&a);
                let bins_b = engine.bins(&b);
                assert!(
                    bins_a.iter().any(|cell| bins_b.contains(cell)),
                    "matched pair with disjoint bins: {a:?} {b:?}"
                );
            }
        }
    }

    #[test]
    fn config_fails_fast() {
        assert!(CartesianMatchEngine::new(CartesianConfig::new(0, 1.0)).is_err());
        assert!(CartesianMatchEngine::new(CartesianConfig::new(2, 0.0)).is_err());
        assert!(
            CartesianMatchEngine::new(CartesianConfig::new(2, 1.0).with_bin_factor(-1.0)).is_err()
        );

        let mut engine = engine_2d(1.0);
        assert!(engine.set_tuning_parameter("Error", -1.0).is_err());
        assert!(engine.set_tuning_parameter("No Such Knob", 1.0).is_err());
        // A failed reconfigure leaves the engine on its previous snapshot.
        assert_eq!(engine.config().error, 1.0);
    }

    #[test]
    fn retuning_rebuilds_the_grid() {
        let mut engine = engine_2d(1.0);
        let t = Tuple::from_f64s(&[100.0, 100.0]);
        let before = engine.bins(&t);
        engine.set_tuning_parameter("Bin Factor", 16.0).unwrap();
        let after = engine.bins(&t);
        assert_ne!(before, after);
    }

    #[test]
    fn bounds_widen_and_round_outward() {
        let engine = CartesianMatchEngine::new(CartesianConfig::new(2, 1.5)).unwrap();
        let bounds = MatchBounds::new(
            vec![Some(Value::Float(0.0)), Some(Value::Int(5))],
            vec![Some(Value::Float(10.0)), Some(Value::Int(8))],
        );
        let widened = engine.match_bounds(&bounds);
        assert_eq!(widened.min[0], Some(Value::Float(-1.5)));
        assert_eq!(widened.max[0], Some(Value::Float(11.5)));
        assert_eq!(widened.min[1], Some(Value::Int(3)));
        assert_eq!(widened.max[1], Some(Value::Int(10)));
    }

    #[test]
    fn unresolved_bound_components_stay_unresolved() {
        let engine = engine_2d(1.0);
        let bounds = MatchBounds::new(
            vec![None, Some(Value::Null)],
            vec![Some(Value::Float(1.0)), None],
        );
        let widened = engine.match_bounds(&bounds);
        assert_eq!(widened.min, vec![None, None]);
        assert_eq!(widened.max, vec![Some(Value::Float(2.0)), None]);
    }

    #[test]
    fn per_row_error_threshold_is_summed() {
        let engine =
            ErrorCartesianMatchEngine::new(ErrorCartesianConfig::new(2, 1.0)).expect("valid");
        let a = Tuple::from_f64s(&[0.0, 0.0, 0.5]);
        let near = Tuple::from_f64s(&[1.2, 0.0, 1.0]);
        let far = Tuple::from_f64s(&[3.0, 0.0, 1.0]);

        let score = engine.match_score(&a, &near).expect("1.2 <= 0.5 + 1.0");
        assert!((score - 1.2).abs() < 1e-12);
        assert_eq!(engine.match_score(&a, &far), None);
        assert_eq!(engine.match_score(&near, &a), engine.match_score(&a, &near));
    }

    #[test]
    fn per_row_error_governs_own_bins() {
        let engine =
            ErrorCartesianMatchEngine::new(ErrorCartesianConfig::new(2, 1.0)).expect("valid");
        let wide = Tuple::from_f64s(&[0.0, 0.0, 20.0]);
        let tight = Tuple::from_f64s(&[0.0, 0.0, 0.1]);
        assert!(engine.bins(&wide).len() > engine.bins(&tight).len());

        let negative = Tuple::from_f64s(&[0.0, 0.0, -1.0]);
        assert!(engine.bins(&negative).is_empty());
    }

    #[test]
    fn error_engine_bounds_need_error_column() {
        let engine =
            ErrorCartesianMatchEngine::new(ErrorCartesianConfig::new(1, 1.0)).expect("valid");
        let resolvable = MatchBounds::new(
            vec![Some(Value::Float(0.0)), Some(Value::Float(0.0))],
            vec![Some(Value::Float(10.0)), Some(Value::Float(0.25))],
        );
        let widened = engine.match_bounds(&resolvable);
        assert_eq!(widened.min[0], Some(Value::Float(-0.5)));
        assert_eq!(widened.max[0], Some(Value::Float(10.5)));
        // Error column itself passes through untouched.
        assert_eq!(widened.max[1], Some(Value::Float(0.25)));

        let unresolvable = MatchBounds::new(
            vec![Some(Value::Float(0.0)), None],
            vec![Some(Value::Float(10.0)), None],
        );
        let widened = engine.match_bounds(&unresolvable);
        assert_eq!(widened.min[0], None);
        assert_eq!(widened.max[0], None);
    }
}
