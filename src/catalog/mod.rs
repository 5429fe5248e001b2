//! Knob and metric catalogs
//!
//! A tuning session owns a knob catalog that defines the canonical column
//! order, the declared value ranges, and the per-type default conversions
//! used everywhere else in the pipeline. The catalog, not observed data,
//! is the authoritative source for optimization bounds.


use serde::{Deserialize, Serialize};
use tracing::warn;

/// Variable type of a tunable knob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KnobType {
    Bool,
    Enum,
    Integer,
    Real,
    String,
    Timestamp,
}

impl KnobType {
    /// Whether this type participates in numeric range sampling
    pub fn is_numeric(&self) -> bool {
        matches!(self, KnobType::Integer | KnobType::Real)
    }
}

/// One tunable configuration parameter with its declared domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Knob {
    /// Canonical knob name (e.g. `shared_buffers`)
    pub name: String,
    /// Variable type
    pub vartype: KnobType,
    /// Default value, stored in its textual form
    pub default: String,
    /// Declared minimum (numeric knobs)
    pub minval: f64,
    /// Declared maximum (numeric knobs)
    pub maxval: f64,
    /// Allowed values for enum knobs, in declaration order
    pub enumvals: Vec<String>,
}

impl Knob {
    /// Numeric form of the default value, converted per type.
    ///
    /// Enum defaults become the index into `enumvals`; booleans parse against
    /// a fixed truthy token set; everything else parses as a float. A failed
    /// conversion substitutes 0 and logs; it never raises.
    pub fn default_as_f64(&self) -> f64 {
        let parsed = match self.vartype {
            KnobType::Enum => self
                .enumvals
                .iter()
                .position(|v| v == &self.default)
                .map(|i| i as f64),
            KnobType::Bool => Some(f64::from(parse_bool_token(&self.default))),
            _ => self.default.parse::<f64>().ok(),
        };
        match parsed {
            Some(v) => v,
            None => {
                warn!(knob = %self.name, default = %self.default, "failed to parse knob default, using 0");
                0.0
            }
        }
    }
}

/// Parse a boolean knob token. The truthy set mirrors the DBMS-side
/// conventions ("on", "true", "yes", "0").
pub fn parse_bool_token(token: &str) -> bool {
    matches!(token.to_lowercase().as_str(), "on" | "true" | "yes" | "0")
}

/// Improvement polarity of a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricPolarity {
    /// Larger observed values are better (e.g. throughput)
    MoreIsBetter,
    /// Smaller observed values are better (e.g. latency)
    LessIsBetter,
}

/// One catalog metric for a DBMS
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub polarity: MetricPolarity,
}

/// A concrete knob setting inside a configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KnobValue {
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
}

impl KnobValue {
    /// Numeric view of the value (booleans become 0/1, strings `None`)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            KnobValue::Bool(b) => Some(f64::from(*b)),
            KnobValue::Int(v) => Some(*v as f64),
            KnobValue::Real(v) => Some(*v),
            KnobValue::Str(_) => None,
        }
    }
}
