//! Match engines for positions on the celestial sphere.
//!
//! Cell geometry is delegated to a pluggable [`Pixellator`], which partitions
//! the sphere into opaque [`Cell::Pixel`] labels; the engines supply the
//! angular-distance math. The built-in [`ZonePixellator`] uses declination
//! bands subdivided into right-ascension segments, with polar bands
//! degrading to full rings.
//!
//! Separations use the haversine formula throughout: the spherical law of
//! cosines loses precision catastrophically at the small separations that
//! dominate crossmatching, and is kept here only as a reference
//! implementation. Scores are reported in arcseconds.
//!
//! All angles are radians unless a function says otherwise.

use std::f64::consts::PI;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::engine::{
    require_positive, Cell, ConfigError, MatchBounds, MatchEngine, TuningParam, DEFAULT_BIN_FACTOR,
};
use crate::tuple::{Tuple, Value, ValueInfo};

const TWO_PI: f64 = 2.0 * PI;
const HALF_PI: f64 = PI / 2.0;

/// Arcseconds per radian, for score reporting.
pub const ARCSEC_PER_RADIAN: f64 = 3600.0 * 180.0 / PI;

/// Angular separation between two sky positions, in radians.
///
/// Haversine formulation: numerically stable down to separations far below
/// an arcsecond, which is the performance- and precision-critical regime for
/// crossmatching.
pub fn haversine_separation(ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> f64 {
    let sin_half_ddec = ((dec2 - dec1) * 0.5).sin();
    let sin_half_dra = ((ra2 - ra1) * 0.5).sin();
    let h = sin_half_ddec * sin_half_ddec
        + dec1.cos() * dec2.cos() * sin_half_dra * sin_half_dra;
    2.0 * h.sqrt().min(1.0).asin()
}

/// Angular separation by the spherical law of cosines, in radians.
///
/// Reference implementation only: at small separations the cosine of the
/// angle saturates toward 1 and `acos` destroys all significant digits, so
/// production scoring uses [`haversine_separation`] instead.
#[allow(dead_code)]
fn cosine_separation(ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> f64 {
    (dec1.sin() * dec2.sin() + dec1.cos() * dec2.cos() * (ra1 - ra2).cos())
        .clamp(-1.0, 1.0)
        .acos()
}

/// Pluggable strategy partitioning the sphere into indexable cells.
///
/// `pixels` must return every cell that could hold a point within `radius`
/// of `(ra, dec)`; over-coverage is tolerated (filtered by the exact score),
/// under-coverage is not.
pub trait Pixellator {
    /// The guide scale (radians) the pixellation is currently sized for.
    fn scale(&self) -> f64;

    /// Resize the pixellation for a new guide scale. Fails fast on
    /// non-positive values.
    fn set_scale(&mut self, scale: f64) -> Result<(), ConfigError>;

    /// Cells covering the disc of `radius` around `(ra, dec)`. Empty for
    /// unusable coordinates or a negative/NaN radius.
    fn pixels(&self, ra: f64, dec: f64, radius: f64) -> Vec<Cell>;
}

/// Declination-band pixellation of the sphere.
///
/// The sphere is cut into `nband` equal-height declination bands of roughly
/// `scale * bin_factor` radians; each band is split into equal right-
/// ascension segments sized so a segment's arc length at the band midpoint
/// matches the band height. Pixel ids pack `(band, segment)` into a `u64`.
#[derive(Debug, Clone)]
pub struct ZonePixellator {
    scale: f64,
    bin_factor: f64,
    band_height: f64,
    nband: u64,
}

impl ZonePixellator {
    /// Pixellator sized for `scale` with the default bin factor.
    pub fn new(scale: f64) -> Result<Self, ConfigError> {
        Self::with_bin_factor(scale, DEFAULT_BIN_FACTOR)
    }

    /// Pixellator with an explicit bin factor.
    pub fn with_bin_factor(scale: f64, bin_factor: f64) -> Result<Self, ConfigError> {
        require_positive("scale", scale)?;
        require_positive("bin factor", bin_factor)?;
        let mut pix = Self {
            scale,
            bin_factor,
            band_height: 0.0,
            nband: 0,
        };
        pix.rebuild();
        Ok(pix)
    }

    fn rebuild(&mut self) {
        let cell = self.scale * self.bin_factor;
        let nband = ((PI / cell).ceil() as u64).clamp(1, u64::from(u32::MAX));
        self.nband = nband;
        self.band_height = PI / nband as f64;
    }

    fn band_index(&self, dec: f64) -> u64 {
        let band = ((dec + HALF_PI) / self.band_height).floor();
        (band.max(0.0) as u64).min(self.nband - 1)
    }

    /// Segments in band `band`; polar bands shrink toward a single ring.
    fn segment_count(&self, band: u64) -> u64 {
        let dec_mid = -HALF_PI + (band as f64 + 0.5) * self.band_height;
        let nseg = (TWO_PI * dec_mid.cos() / self.band_height).floor();
        (nseg.max(1.0) as u64).min(u64::from(u32::MAX))
    }

    fn encode(band: u64, segment: u64) -> Cell {
        Cell::Pixel((band << 32) | segment)
    }
}

impl Pixellator for ZonePixellator {
    fn scale(&self) -> f64 {
        self.scale
    }

    fn set_scale(&mut self, scale: f64) -> Result<(), ConfigError> {
        require_positive("scale", scale)?;
        self.scale = scale;
        self.rebuild();
        Ok(())
    }

    fn pixels(&self, ra: f64, dec: f64, radius: f64) -> Vec<Cell> {
        if !ra.is_finite() || !dec.is_finite() || !(radius >= 0.0) || !radius.is_finite() {
            return Vec::new();
        }
        let dec_lo = (dec - radius).max(-HALF_PI);
        let dec_hi = (dec + radius).min(HALF_PI);
        if dec_lo > dec_hi {
            return Vec::new();
        }

        let mut cells = Vec::new();
        for band in self.band_index(dec_lo)..=self.band_index(dec_hi) {
            let nseg = self.segment_count(band);
            let band_lo = -HALF_PI + band as f64 * self.band_height;
            let band_hi = band_lo + self.band_height;
            // Worst-case cos over the part of the disc inside this band.
            let extreme = band_lo.max(dec_lo).abs().max(band_hi.min(dec_hi).abs());
            let min_cos = extreme.min(HALF_PI).cos();

            // Haversine identity: for any disc point p in this band,
            // sin(dra/2) <= sin(radius/2) / sqrt(cos(dec) * cos(dec_p)).
            // The linear radius/cos approximation under-covers near the
            // poles, so the exact spherical form is required here.
            let seg_width = TWO_PI / nseg as f64;
            let denom = dec.cos() * min_cos;
            let half_width = if denom <= 0.0 || radius >= PI {
                PI
            } else {
                let x = (radius * 0.5).sin() / denom.sqrt();
                if x >= 1.0 {
                    PI
                } else {
                    2.0 * x.asin()
                }
            };
            if half_width >= PI {
                for segment in 0..nseg {
                    cells.push(Self::encode(band, segment));
                }
                continue;
            }

            let k_lo = ((ra - half_width) / seg_width).floor() as i64;
            let k_hi = ((ra + half_width) / seg_width).floor() as i64;
            if (k_hi - k_lo + 1) as u64 >= nseg {
                for segment in 0..nseg {
                    cells.push(Self::encode(band, segment));
                }
            } else {
                for k in k_lo..=k_hi {
                    cells.push(Self::encode(band, k.rem_euclid(nseg as i64) as u64));
                }
            }
        }
        cells
    }
}

fn sky_tuple_infos() -> Vec<ValueInfo> {
    vec![
        ValueInfo::new("RA", "Right ascension").with_units("radians"),
        ValueInfo::new("Dec", "Declination").with_units("radians"),
    ]
}

/// Haversine score with the cheap declination reject in front.
///
/// `|dec1 - dec2| > max_error` rules a pair out without trigonometry; NaN
/// anywhere falls through the comparisons to `None`. Returns the separation
/// in arcseconds on success.
fn sky_score(ra1: f64, dec1: f64, ra2: f64, dec2: f64, max_error: f64) -> Option<f64> {
    if !(max_error >= 0.0) {
        return None;
    }
    if !((dec1 - dec2).abs() <= max_error) {
        return None;
    }
    let separation = haversine_separation(ra1, dec1, ra2, dec2);
    if separation <= max_error {
        Some(separation * ARCSEC_PER_RADIAN)
    } else {
        None
    }
}

/// Sky bound extension: declination widens linearly (clamped to the poles);
/// right ascension widens by `err / cos(dec)` at the wider of the two
/// extended declination limits. If either widened RA bound leaves
/// `[0, 2*pi)` the whole RA bound is abandoned rather than attempting
/// wraparound arithmetic — "near the pole" and "crosses RA=0" both read as
/// unboundable, which downstream pruning treats as always safe.
fn sky_bounds(bounds: &MatchBounds, err: f64) -> MatchBounds {
    let mut out = bounds.clone();
    if out.min.len() < 2 || out.max.len() < 2 || !(err >= 0.0) || !err.is_finite() {
        for slot in out.min.iter_mut().take(2).chain(out.max.iter_mut().take(2)) {
            *slot = None;
        }
        return out;
    }

    let dec_lo = out.min[1].as_ref().map(Value::as_f64).unwrap_or(f64::NAN);
    let dec_hi = out.max[1].as_ref().map(Value::as_f64).unwrap_or(f64::NAN);
    let new_dec_lo = (dec_lo - err).max(-HALF_PI);
    let new_dec_hi = (dec_hi + err).min(HALF_PI);
    out.min[1] = if new_dec_lo.is_nan() {
        None
    } else {
        Some(Value::Float(new_dec_lo))
    };
    out.max[1] = if new_dec_hi.is_nan() {
        None
    } else {
        Some(Value::Float(new_dec_hi))
    };

    let ra_lo = out.min[0].as_ref().map(Value::as_f64).unwrap_or(f64::NAN);
    let ra_hi = out.max[0].as_ref().map(Value::as_f64).unwrap_or(f64::NAN);
    let min_cos = new_dec_lo.cos().min(new_dec_hi.cos());
    let resolved = if min_cos > 0.0 {
        let dra = err / min_cos;
        let new_ra_lo = ra_lo - dra;
        let new_ra_hi = ra_hi + dra;
        if (0.0..TWO_PI).contains(&new_ra_lo) && (0.0..TWO_PI).contains(&new_ra_hi) {
            Some((new_ra_lo, new_ra_hi))
        } else {
            None
        }
    } else {
        None
    };
    match resolved {
        Some((lo, hi)) => {
            out.min[0] = Some(Value::Float(lo));
            out.max[0] = Some(Value::Float(hi));
        }
        None => {
            out.min[0] = None;
            out.max[0] = None;
        }
    }
    out
}

/// Configuration for [`SkyMatchEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkyConfig {
    /// Maximum separation (radians) for a match; also the pixellation guide
    /// scale.
    pub error: f64,
}

impl SkyConfig {
    pub fn new(error: f64) -> Self {
        Self { error }
    }

    /// Fail fast on structurally invalid configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("error", self.error)
    }
}

/// Fixed-error sky match engine over tuples `[ra, dec]` in radians.
///
/// Scores are separations in arcseconds.
pub struct SkyMatchEngine {
    config: SkyConfig,
    pixellator: Box<dyn Pixellator>,
}

impl SkyMatchEngine {
    /// Engine with the built-in [`ZonePixellator`].
    pub fn new(config: SkyConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let pixellator = Box::new(ZonePixellator::new(config.error)?);
        Ok(Self { config, pixellator })
    }

    /// Engine over a caller-supplied pixellation scheme; the engine's error
    /// scale is forwarded to it.
    pub fn with_pixellator(
        config: SkyConfig,
        mut pixellator: Box<dyn Pixellator>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        pixellator.set_scale(config.error)?;
        Ok(Self { config, pixellator })
    }

    /// The current configuration snapshot.
    pub fn config(&self) -> &SkyConfig {
        &self.config
    }
}

impl MatchEngine for SkyMatchEngine {
    fn name(&self) -> &'static str {
        "Sky"
    }

    fn tuple_infos(&self) -> Vec<ValueInfo> {
        sky_tuple_infos()
    }

    fn bins(&self, tuple: &Tuple) -> Vec<Cell> {
        self.pixellator
            .pixels(tuple.real(0), tuple.real(1), self.config.error)
    }

    fn radius_bins(&self, tuple: &Tuple, radius: f64) -> Vec<Cell> {
        self.pixellator.pixels(tuple.real(0), tuple.real(1), radius)
    }

    fn match_score(&self, tuple_a: &Tuple, tuple_b: &Tuple) -> Option<f64> {
        sky_score(
            tuple_a.real(0),
            tuple_a.real(1),
            tuple_b.real(0),
            tuple_b.real(1),
            self.config.error,
        )
    }

    fn tuning_parameters(&self) -> Vec<TuningParam> {
        vec![TuningParam::new(
            ValueInfo::new("Error", "Maximum separation for a match").with_units("radians"),
            self.config.error,
        )]
    }

    fn set_tuning_parameter(&mut self, name: &str, value: f64) -> Result<(), ConfigError> {
        match name {
            "Error" => {
                let config = SkyConfig::new(value);
                config.validate()?;
                self.pixellator.set_scale(value)?;
                self.config = config;
                debug!("sky engine: Error set to {value}");
                Ok(())
            }
            other => Err(ConfigError::UnknownParameter(other.into())),
        }
    }

    fn match_bounds(&self, bounds: &MatchBounds) -> MatchBounds {
        sky_bounds(bounds, self.config.error)
    }
}

/// Configuration for [`ErrorSkyMatchEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSkyConfig {
    /// Guide error (radians) governing pixellation granularity only.
    pub scale: f64,
}

impl ErrorSkyConfig {
    pub fn new(scale: f64) -> Self {
        Self { scale }
    }

    /// Fail fast on structurally invalid configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("scale", self.scale)
    }
}

/// Per-row-error sky match engine over tuples `[ra, dec, err]` in radians.
///
/// A pair matches when the separation is at most the sum of the two rows'
/// error radii; the engine scale governs pixellation only.
pub struct ErrorSkyMatchEngine {
    config: ErrorSkyConfig,
    pixellator: Box<dyn Pixellator>,
}

impl ErrorSkyMatchEngine {
    /// Engine with the built-in [`ZonePixellator`].
    pub fn new(config: ErrorSkyConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let pixellator = Box::new(ZonePixellator::new(config.scale)?);
        Ok(Self { config, pixellator })
    }

    /// The current configuration snapshot.
    pub fn config(&self) -> &ErrorSkyConfig {
        &self.config
    }
}

impl MatchEngine for ErrorSkyMatchEngine {
    fn name(&self) -> &'static str {
        "Sky with Errors"
    }

    fn tuple_infos(&self) -> Vec<ValueInfo> {
        let mut infos = sky_tuple_infos();
        infos.push(ValueInfo::new("Error", "Per-row match radius").with_units("radians"));
        infos
    }

    fn bins(&self, tuple: &Tuple) -> Vec<Cell> {
        self.pixellator
            .pixels(tuple.real(0), tuple.real(1), tuple.real(2))
    }

    fn radius_bins(&self, tuple: &Tuple, radius: f64) -> Vec<Cell> {
        self.pixellator.pixels(tuple.real(0), tuple.real(1), radius)
    }

    fn match_score(&self, tuple_a: &Tuple, tuple_b: &Tuple) -> Option<f64> {
        let max_error = tuple_a.real(2) + tuple_b.real(2);
        sky_score(
            tuple_a.real(0),
            tuple_a.real(1),
            tuple_b.real(0),
            tuple_b.real(1),
            max_error,
        )
    }

    fn tuning_parameters(&self) -> Vec<TuningParam> {
        vec![TuningParam::new(
            ValueInfo::new("Scale", "Guide error for pixellation granularity")
                .with_units("radians"),
            self.config.scale,
        )]
    }

    fn set_tuning_parameter(&mut self, name: &str, value: f64) -> Result<(), ConfigError> {
        match name {
            "Scale" => {
                let config = ErrorSkyConfig::new(value);
                config.validate()?;
                self.pixellator.set_scale(value)?;
                self.config = config;
                debug!("error-sky engine: Scale set to {value}");
                Ok(())
            }
            other => Err(ConfigError::UnknownParameter(other.into())),
        }
    }

    fn match_bounds(&self, bounds: &MatchBounds) -> MatchBounds {
        // Threshold is the sum of two per-row radii; only this table's
        // maximum radius is visible, so assume the other table is no worse.
        let max_error = bounds
            .max
            .get(2)
            .and_then(|v| v.as_ref())
            .map(|v| v.as_f64())
            .unwrap_or(f64::NAN);
        sky_bounds(bounds, 2.0 * max_error)
    }
}
