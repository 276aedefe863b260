//! Aggregation laws — how developer and dependency contributions blend.
//!
//! A closed set of tagged variants dispatched by the engine. Each law is an
//! element-wise combination of two same-shape sparse matrices: `a` is the
//! developer contribution, `b` the dependency contribution.

use keystone_core::config::EngineConfig;
use keystone_core::errors::{ConfigError, DataError};
use keystone_core::sparse::CsrMatrix;

/// Element-wise blending law for the propagation fixed point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggregationLaw {
    /// Default. Each nonzero goes through `x ↦ 1-(1-x)^α` (entries exactly
    /// 1 stay 1, avoiding `0^α` blow-ups), then the two transformed
    /// matrices combine through the probabilistic OR `a + b - a·b`.
    /// With unit exponents this collapses to [`LegacyCobbDouglas`](Self::LegacyCobbDouglas).
    CobbDouglas { alpha_dev: f64, alpha_dep: f64 },
    /// `(|a-b| + a + b) / 2` — the larger of the two contributions,
    /// best-of-two-paths semantics. The explicit formula is load-bearing:
    /// it is what the production runs computed, so it is kept verbatim
    /// rather than rewritten as a `max` call.
    Leontief,
    /// `(a + b) / 2`.
    Linear,
    /// `a + b - a·b` with no transform. Kept for numerical compatibility
    /// with historical runs.
    LegacyCobbDouglas,
}

impl AggregationLaw {
    /// Resolve the law named in a config, validating exponents up front.
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        match config.effective_law() {
            "cobb-douglas" => {
                let alpha_dev = config.effective_alpha_dev();
                let alpha_dep = config.effective_alpha_dep();
                validate_exponent("alpha_dev", alpha_dev)?;
                validate_exponent("alpha_dep", alpha_dep)?;
                Ok(Self::CobbDouglas {
                    alpha_dev,
                    alpha_dep,
                })
            }
            "leontief" => Ok(Self::Leontief),
            "linear" => Ok(Self::Linear),
            "legacy-cobb-douglas" => Ok(Self::LegacyCobbDouglas),
            other => Err(ConfigError::UnknownLaw(other.to_string())),
        }
    }

    /// Law name as it appears in config files and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CobbDouglas { .. } => "cobb-douglas",
            Self::Leontief => "leontief",
            Self::Linear => "linear",
            Self::LegacyCobbDouglas => "legacy-cobb-douglas",
        }
    }

    /// Blend the two contribution matrices element-wise.
    pub fn combine(&self, a: &CsrMatrix, b: &CsrMatrix) -> Result<CsrMatrix, DataError> {
        match *self {
            Self::CobbDouglas {
                alpha_dev,
                alpha_dep,
            } => {
                let a = complement_pow(a, alpha_dev);
                let b = complement_pow(b, alpha_dep);
                a.zip_union(&b, |x, y| x + y - x * y)
            }
            Self::Leontief => a.zip_union(b, |x, y| ((x - y).abs() + x + y) / 2.0),
            Self::Linear => a.zip_union(b, |x, y| (x + y) / 2.0),
            Self::LegacyCobbDouglas => a.zip_union(b, |x, y| x + y - x * y),
        }
    }
}

/// `x ↦ 1-(1-x)^α` on stored entries, with exact ones preserved.
///
/// A unit exponent is the identity, and skipping the round trip keeps
/// `CobbDouglas { 1, 1 }` bit-for-bit equal to the legacy law.
fn complement_pow(m: &CsrMatrix, alpha: f64) -> CsrMatrix {
    if alpha == 1.0 {
        return m.clone();
    }
    m.map_nonzeros(|x| {
        if x == 1.0 {
            1.0
        } else {
            1.0 - (1.0 - x).powf(alpha)
        }
    })
}

fn validate_exponent(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::InvalidExponent { name, value });
    }
    Ok(())
}
