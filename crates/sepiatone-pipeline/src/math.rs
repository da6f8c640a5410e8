//! Minimal completion-style and result-returning functions.
//!
//! These share the vocabulary of the image pipeline (a callback that
//! receives the outcome, a `Result` with a closed error enum) without
//! any I/O or threading.

/// Errors from [`divide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    /// The divisor was zero.
    #[error("division by zero")]
    DivisionByZero,
}

/// Square `number` and hand the result to `completion`.
///
/// The callback runs synchronously, exactly once, before this returns.
/// Overflow wraps.
pub fn square(number: i64, completion: impl FnOnce(i64)) {
    completion(number.wrapping_mul(number));
}

/// Divide `dividend` by `divisor`.
///
/// # Errors
///
/// Returns [`MathError::DivisionByZero`] if `divisor` is zero
/// (positive or negative).
pub fn divide(dividend: f64, divisor: f64) -> Result<f64, MathError> {
    if divisor == 0.0 {
        return Err(MathError::DivisionByZero);
    }
    Ok(dividend / divisor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_invokes_completion_once() {
        let mut calls = Vec::new();
        square(5, |v| calls.push(v));
        assert_eq!(calls, vec![25]);
    }

    #[test]
    fn square_of_negative() {
        let mut out = 0;
        square(-12, |v| out = v);
        assert_eq!(out, 144);
    }

    #[test]
    fn divide_by_zero_fails() {
        assert_eq!(divide(5.0, 0.0), Err(MathError::DivisionByZero));
        assert_eq!(divide(5.0, -0.0), Err(MathError::DivisionByZero));
    }

    #[test]
    fn divide_returns_quotient() {
        assert_eq!(divide(5.0, 2.0), Ok(2.5));
        assert_eq!(divide(0.0, 3.0), Ok(0.0));
    }
}
