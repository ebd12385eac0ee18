//! # Calibration Module
//!
//! Maps raw axis readings to the normalized values streamed to the vehicle.
//!
//! ## Range
//!
//! Each axis-bound action carries a `[min, max]` window over the raw reading
//! (-1.0 to 1.0). Readings outside the window are clamped, so a trigger that
//! only uses half of its travel still reaches full output.
//!
//! ## Normalization Modes
//!
//! - `full`: window maps to -1.0..1.0 (steering, camera pan)
//! - `positive`: window maps to 0.0..1.0 (throttle, brake)
//!
//! `inverted` flips the result: `1 - p` in positive mode, negation in full mode.
//!
//! ## Usage
//!
//! ```
//! use relay_pilot::controller::calibration::{AxisConfig, NormalizeMode};
//!
//! // Throttle on the upper half of a stick, pushed up = negative raw values
//! let cfg = AxisConfig::new(-1.0, 0.0, true, NormalizeMode::Positive);
//!
//! assert_eq!(cfg.normalize(0.0), 0.0);
//! assert_eq!(cfg.normalize(-1.0), 1.0);
//! ```

use serde::{Deserialize, Serialize};

/// Output range of a normalized axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizeMode {
    /// -1.0 to 1.0
    #[default]
    Full,
    /// 0.0 to 1.0
    Positive,
}

impl std::str::FromStr for NormalizeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(NormalizeMode::Full),
            "positive" => Ok(NormalizeMode::Positive),
            other => Err(format!("unknown normalize mode '{}' (expected full or positive)", other)),
        }
    }
}

/// Per-mapping axis transform.
///
/// `min == max` is accepted but makes every reading normalize to 0.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisConfig {
    pub min: f32,
    pub max: f32,
    #[serde(default)]
    pub inverted: bool,
    #[serde(default)]
    pub normalize: NormalizeMode,
}

impl Default for AxisConfig {
    /// Full stick travel, full output range, not inverted.
    fn default() -> Self {
        Self {
            min: -1.0,
            max: 1.0,
            inverted: false,
            normalize: NormalizeMode::Full,
        }
    }
}

impl AxisConfig {
    /// Creates an axis config.
    ///
    /// # Examples
    ///
    /// ```
    /// use relay_pilot::controller::calibration::{AxisConfig, NormalizeMode};
    ///
    /// let cfg = AxisConfig::new(0.0, 1.0, false, NormalizeMode::Positive);
    /// assert_eq!(cfg.normalize(0.5), 0.5);
    /// ```
    #[must_use]
    pub fn new(min: f32, max: f32, inverted: bool, normalize: NormalizeMode) -> Self {
        Self {
            min,
            max,
            inverted,
            normalize,
        }
    }

    /// Whether the window is degenerate (`min == max`).
    #[must_use]
    pub fn is_zero_range(&self) -> bool {
        self.max == self.min
    }

    /// Normalizes a raw reading with this config. See [`normalize`].
    #[must_use]
    pub fn normalize(&self, raw: f32) -> f32 {
        normalize(raw, self)
    }
}

/// Normalizes a raw axis reading.
///
/// # Arguments
///
/// * `raw` - Raw axis value, nominally -1.0 to 1.0
/// * `cfg` - Window, inversion and output mode
///
/// # Returns
///
/// 0.0..1.0 in positive mode, -1.0..1.0 in full mode, 0.0 for a zero-width window.
///
/// # Examples
///
/// ```
/// use relay_pilot::controller::calibration::{normalize, AxisConfig};
///
/// let cfg = AxisConfig::default();
/// assert_eq!(normalize(-1.0, &cfg), -1.0);
/// assert_eq!(normalize(0.0, &cfg), 0.0);
/// assert_eq!(normalize(1.0, &cfg), 1.0);
/// assert_eq!(normalize(7.0, &cfg), 1.0); // clamped
/// ```
#[must_use]
pub fn normalize(raw: f32, cfg: &AxisConfig) -> f32 {
    if cfg.is_zero_range() {
        return 0.0;
    }

    let low = cfg.min.min(cfg.max);
    let high = cfg.min.max(cfg.max);
    let clamped = raw.clamp(low, high);

    // Position within the window, 0 at `min` and 1 at `max`
    let position = (clamped - cfg.min) / (cfg.max - cfg.min);

    match cfg.normalize {
        NormalizeMode::Positive => {
            if cfg.inverted {
                1.0 - position
            } else {
                position
            }
        }
        NormalizeMode::Full => {
            let value = -1.0 + 2.0 * position;
            if cfg.inverted {
                -value
            } else {
                value
            }
        }
    }
}
