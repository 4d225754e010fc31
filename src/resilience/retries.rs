//! Bounded retry of transient failures.
//!
//! # Responsibilities
//! - Run an operation up to a fixed number of attempts
//! - Retry only errors the caller classifies as transient
//! - Propagate permanent errors on first sight
//!
//! # Design Decisions
//! - No delay between attempts: the transient case (an evicted blob) is
//!   resolved by re-reading fresh state, not by waiting
//! - Exhaustion is its own outcome carrying the last transient error

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetryError<E> {
    #[error("{0}")]
    Permanent(E),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

/// Call `op` with attempt numbers `1..=max_attempts` until it succeeds,
/// fails permanently, or the bound is reached.
///
/// A bound of zero is treated as one attempt.
pub fn retry_transient<T, E, F, C>(max_attempts: u32, mut op: F, is_transient: C) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Result<T, E>,
    C: Fn(&E) -> bool,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) if !is_transient(&err) => return Err(RetryError::Permanent(err)),
            Err(err) if attempt >= max_attempts => {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                })
            }
            Err(_) => {
                tracing::debug!(attempt, max_attempts, "Transient failure, retrying");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    enum Failure {
        Transient,
        Fatal,
    }

    fn transient(e: &Failure) -> bool {
        *e == Failure::Transient
    }

    #[test]
    fn test_succeeds_after_transient_failures() {
        let mut calls = 0;
        let result = retry_transient(
            10,
            |attempt| {
                calls += 1;
                if attempt < 3 { Err(Failure::Transient) } else { Ok(attempt) }
            },
            transient,
        );
        assert_eq!(result, Ok(3));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_exhausts_exactly_at_bound() {
        let mut calls = 0;
        let result: Result<(), _> = retry_transient(
            10,
            |_| {
                calls += 1;
                Err(Failure::Transient)
            },
            transient,
        );
        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                attempts: 10,
                last: Failure::Transient
            })
        );
        assert_eq!(calls, 10);
    }

    #[test]
    fn test_permanent_error_is_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = retry_transient(
            10,
            |_| {
                calls += 1;
                Err(Failure::Fatal)
            },
            transient,
        );
        assert_eq!(result, Err(RetryError::Permanent(Failure::Fatal)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_zero_bound_still_attempts_once() {
        let mut calls = 0;
        let _: Result<(), _> = retry_transient(0, |_| { calls += 1; Err(Failure::Transient) }, transient);
        assert_eq!(calls, 1);
    }
}
