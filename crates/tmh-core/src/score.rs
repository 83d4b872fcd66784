//! Extended-real log-probability scores.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, TmhError};

/// Log-probability over the extended reals `{finite} ∪ {-inf}`.
///
/// `NegInfinity` marks an impossible execution. NaN and `+inf` are not
/// representable; [`LogScore::from_f64`] rejects them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum LogScore {
    /// A finite log-probability.
    Finite(f64),
    /// Log of probability zero.
    NegInfinity,
}

impl LogScore {
    /// Log-probability of a certain event.
    pub const ZERO: LogScore = LogScore::Finite(0.0);

    /// Converts a raw `f64`, mapping `-inf` to [`LogScore::NegInfinity`].
    pub fn from_f64(raw: f64) -> Result<Self, TmhError> {
        if raw.is_nan() {
            return Err(TmhError::Invariant(ErrorInfo::new(
                "nan-score",
                "log score is NaN",
            )));
        }
        if raw == f64::NEG_INFINITY {
            return Ok(LogScore::NegInfinity);
        }
        if raw == f64::INFINITY {
            return Err(TmhError::Invariant(
                ErrorInfo::new("positive-infinite-score", "log score is +inf")
                    .with_hint("densities must be bounded"),
            ));
        }
        Ok(LogScore::Finite(raw))
    }

    /// Log of a probability in `[0, 1]`.
    pub fn ln(probability: f64) -> Result<Self, TmhError> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(TmhError::Invariant(
                ErrorInfo::new("probability-out-of-range", "probability outside [0, 1]")
                    .with_context("probability", probability.to_string()),
            ));
        }
        Self::from_f64(probability.ln())
    }

    /// Returns the score as a plain `f64` (`-inf` for impossible).
    pub fn to_f64(self) -> f64 {
        match self {
            LogScore::Finite(value) => value,
            LogScore::NegInfinity => f64::NEG_INFINITY,
        }
    }

    /// Whether the score denotes a zero-probability execution.
    pub fn is_impossible(self) -> bool {
        matches!(self, LogScore::NegInfinity)
    }
}

impl Default for LogScore {
    fn default() -> Self {
        LogScore::ZERO
    }
}

impl Add for LogScore {
    type Output = LogScore;

    fn add(self, rhs: LogScore) -> LogScore {
        match (self, rhs) {
            (LogScore::Finite(a), LogScore::Finite(b)) => {
                let sum = a + b;
                if sum == f64::NEG_INFINITY {
                    LogScore::NegInfinity
                } else {
                    LogScore::Finite(sum)
                }
            }
            _ => LogScore::NegInfinity,
        }
    }
}

impl AddAssign for LogScore {
    fn add_assign(&mut self, rhs: LogScore) {
        *self = *self + rhs;
    }
}

impl Sum for LogScore {
    fn sum<I: Iterator<Item = LogScore>>(iter: I) -> Self {
        iter.fold(LogScore::ZERO, Add::add)
    }
}

impl fmt::Display for LogScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogScore::Finite(value) => write!(f, "{value}"),
            LogScore::NegInfinity => write!(f, "-inf"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_infinity_absorbs() {
        let total = LogScore::Finite(-1.5) + LogScore::NegInfinity + LogScore::Finite(3.0);
        assert!(total.is_impossible());
    }

    #[test]
    fn nan_is_rejected() {
        let err = LogScore::from_f64(f64::NAN).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn ln_of_zero_is_impossible() {
        assert_eq!(LogScore::ln(0.0).unwrap(), LogScore::NegInfinity);
        assert_eq!(LogScore::ln(1.0).unwrap(), LogScore::ZERO);
    }
}
