//! Bisection search over a monotone scalar function.
//!
//! The evaluation function carries its own context (typically a closure over a
//! freshly built model), so concurrent searches never share state.

use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// Where the solution lies relative to the search interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    /// A point inside `[lo, hi]` hits the target.
    Interior,
    /// The target is only reached below `lo`; the result is `lo`.
    BelowRange,
    /// The target is only reached above `hi`; the result is `hi`.
    AboveRange,
}

impl Indicator {
    /// Signed code: `-1` below, `0` interior, `+1` above.
    pub fn code(self) -> i32 {
        match self {
            Self::Interior => 0,
            Self::BelowRange => -1,
            Self::AboveRange => 1,
        }
    }

    pub fn is_interior(self) -> bool {
        self == Self::Interior
    }
}

/// Outcome of a bisection search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    pub x: f64,
    /// Function value at `x`.
    pub value: f64,
    pub indicator: Indicator,
    /// Number of interior evaluations performed.
    pub iterations: usize,
}

/// Convergence controls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Relative tolerance on the function value (absolute when the target is 0).
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            max_iterations: default_max_iterations(),
        }
    }
}

fn default_tolerance() -> f64 {
    1e-6
}

fn default_max_iterations() -> usize {
    100
}

/// Interval width below which the bracket is considered collapsed.
const MIN_RELATIVE_WIDTH: f64 = 1e-12;

fn within_tolerance(value: f64, target: f64, tolerance: f64) -> bool {
    if target == 0.0 {
        value.abs() <= tolerance
    } else {
        (value - target).abs() <= tolerance * target.abs()
    }
}

/// Find `x` in `[lo, hi]` with `eval(x) ≈ target` using default options.
pub fn binary_search<F, E>(lo: f64, hi: f64, target: f64, eval: F) -> Result<SearchResult, E>
where
    F: FnMut(f64) -> Result<f64, E>,
    E: From<QueueError>,
{
    binary_search_with(&SearchOptions::default(), lo, hi, target, eval)
}

/// Find `x` in `[lo, hi]` with `eval(x) ≈ target`.
///
/// `eval` must be monotone on the interval; its direction is taken from the
/// values at the two bounds. Evaluation errors abort the search immediately.
pub fn binary_search_with<F, E>(
    options: &SearchOptions,
    lo: f64,
    hi: f64,
    target: f64,
    mut eval: F,
) -> Result<SearchResult, E>
where
    F: FnMut(f64) -> Result<f64, E>,
    E: From<QueueError>,
{
    if !(lo.is_finite() && hi.is_finite()) || lo >= hi {
        return Err(QueueError::search(format!("invalid range [{}, {}]", lo, hi)).into());
    }
    if !target.is_finite() {
        return Err(QueueError::search(format!("target {} is not finite", target)).into());
    }

    let mut checked = |x: f64| -> Result<f64, E> {
        let y = eval(x)?;
        if y.is_finite() {
            Ok(y)
        } else {
            Err(QueueError::numerical(format!("evaluation at {} returned {}", x, y)).into())
        }
    };

    let y_lo = checked(lo)?;
    if within_tolerance(y_lo, target, options.tolerance) {
        return Ok(SearchResult {
            x: lo,
            value: y_lo,
            indicator: Indicator::Interior,
            iterations: 0,
        });
    }
    let y_hi = checked(hi)?;
    if within_tolerance(y_hi, target, options.tolerance) {
        return Ok(SearchResult {
            x: hi,
            value: y_hi,
            indicator: Indicator::Interior,
            iterations: 0,
        });
    }

    let increasing = y_lo <= y_hi;
    if (increasing && target < y_lo) || (!increasing && target > y_lo) {
        return Ok(SearchResult {
            x: lo,
            value: y_lo,
            indicator: Indicator::BelowRange,
            iterations: 0,
        });
    }
    if (increasing && target > y_hi) || (!increasing && target < y_hi) {
        return Ok(SearchResult {
            x: hi,
            value: y_hi,
            indicator: Indicator::AboveRange,
            iterations: 0,
        });
    }

    let (mut a, mut b) = (lo, hi);
    let min_width = MIN_RELATIVE_WIDTH * hi.abs().max(lo.abs()).max(f64::MIN_POSITIVE);
    let mut x = 0.5 * (a + b);
    let mut y = f64::NAN;
    let mut iterations = 0;
    while iterations < options.max_iterations {
        x = 0.5 * (a + b);
        y = checked(x)?;
        iterations += 1;
        tracing::trace!(iterations, x, y, target, "bisection step");
        if within_tolerance(y, target, options.tolerance) {
            break;
        }
        if (increasing && target < y) || (!increasing && target > y) {
            b = x;
        } else {
            a = x;
        }
        if b - a <= min_width {
            break;
        }
    }

    Ok(SearchResult {
        x,
        value: y,
        indicator: Indicator::Interior,
        iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(x: f64) -> Result<f64, QueueError> {
        Ok(x)
    }

    #[test]
    fn test_identity_interior() {
        let result = binary_search(0.0, 10.0, 3.7, identity).unwrap();
        assert_eq!(result.indicator, Indicator::Interior);
        assert!((result.x - 3.7).abs() < 1e-5);
    }

    #[test]
    fn test_hits_bound_exactly() {
        let result = binary_search(1.0, 2.0, 2.0, identity).unwrap();
        assert_eq!(result.indicator, Indicator::Interior);
        assert_eq!(result.x, 2.0);
        assert_eq!(result.iterations, 0);
    }

    #[test]
    fn test_below_and_above_range() {
        let below = binary_search(1.0, 2.0, 0.5, identity).unwrap();
        assert_eq!(below.indicator, Indicator::BelowRange);
        assert_eq!(below.x, 1.0);
        assert_eq!(below.indicator.code(), -1);

        let above = binary_search(1.0, 2.0, 5.0, identity).unwrap();
        assert_eq!(above.indicator, Indicator::AboveRange);
        assert_eq!(above.x, 2.0);
        assert_eq!(above.indicator.code(), 1);
    }

    #[test]
    fn test_decreasing_function() {
        let eval = |x: f64| -> Result<f64, QueueError> { Ok(1.0 / x) };
        let result = binary_search(0.1, 10.0, 0.25, eval).unwrap();
        assert!(result.indicator.is_interior());
        assert!((result.x - 4.0).abs() < 1e-4);

        // 1/x exceeds 20 only for x < 0.05, i.e. below the interval.
        let below = binary_search(0.1, 10.0, 20.0, eval).unwrap();
        assert_eq!(below.indicator, Indicator::BelowRange);
        assert_eq!(below.x, 0.1);
    }

    #[test]
    fn test_zero_target_uses_absolute_tolerance() {
        let eval = |x: f64| -> Result<f64, QueueError> { Ok(x - 1.0) };
        let result = binary_search(0.0, 4.0, 0.0, eval).unwrap();
        assert!(result.indicator.is_interior());
        assert!((result.x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_degenerate_interval() {
        assert!(matches!(
            binary_search(2.0, 2.0, 1.0, identity),
            Err(QueueError::Search(_))
        ));
        assert!(binary_search(3.0, 1.0, 2.0, identity).is_err());
        assert!(binary_search(f64::NAN, 1.0, 0.5, identity).is_err());
    }

    #[test]
    fn test_eval_error_aborts() {
        let mut calls = 0;
        let result = binary_search(0.0, 1.0, 0.5, |x| {
            calls += 1;
            if x > 0.9 {
                Err(QueueError::numerical("boom"))
            } else {
                Ok(x)
            }
        });
        assert!(matches!(result, Err(QueueError::NumericalInvalidity(_))));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_non_finite_value_is_error() {
        let result = binary_search(0.0, 1.0, 0.5, |_| Ok::<f64, QueueError>(f64::NAN));
        assert!(result.is_err());
    }

    #[test]
    fn test_iteration_bound() {
        let options = SearchOptions {
            tolerance: 0.0,
            max_iterations: 7,
        };
        let result = binary_search_with(&options, 0.0, 1.0, 0.3, identity).unwrap();
        assert_eq!(result.iterations, 7);
        assert!((result.x - 0.3).abs() < 1.0 / 128.0 + 1e-12);
    }
}
