//! The computed function: one-based Fibonacci over `1..=90`.
//!
//! `fib(90)` is the largest value below `i64::MAX`; the bound is shared by
//! both HTTP surfaces.

use thiserror::Error;

pub const MIN_N: i64 = 1;
pub const MAX_N: i64 = 90;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FibonacciError {
    #[error("{0} must be >= 1 and <= 90")]
    OutOfRange(i64),
}

/// `fib(1) = 1`, `fib(2) = 1`, `fib(n) = fib(n-1) + fib(n-2)`.
pub fn fibonacci(n: i64) -> Result<u64, FibonacciError> {
    if !(MIN_N..=MAX_N).contains(&n) {
        return Err(FibonacciError::OutOfRange(n));
    }
    let (mut previous, mut current) = (0u64, 1u64);
    for _ in 1..n {
        let next = previous + current;
        previous = current;
        current = next;
    }
    Ok(current)
}
