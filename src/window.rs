//! Outcome history and exact ratio thresholds.
//!
//! Breaker thresholds are expressed as exact fractions ("3 failures in 10")
//! and evaluated with integer arithmetic, so there is no floating point drift
//! at the decision boundary.

use std::collections::VecDeque;
use std::fmt;

/// An exact fraction `num / den` with `1 <= den` and `num <= den`.
///
/// Used for both the failure limit ("open at 3-in-10 failures") and the
/// success limit ("close at 5-in-5 successes"). The denominator doubles as
/// the evaluation window size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ratio {
    num: u32,
    den: u32,
}

impl Ratio {
    /// `1/1`: trip on any failure, close on any success.
    pub const ONE: Ratio = Ratio { num: 1, den: 1 };

    /// Creates a ratio.
    ///
    /// # Panics
    ///
    /// Panics if `den` is zero or `num > den`.
    pub fn new(num: u32, den: u32) -> Self {
        assert!(den > 0, "ratio denominator must be positive");
        assert!(num <= den, "ratio numerator must not exceed denominator");
        Self { num, den }
    }

    pub fn numerator(self) -> u32 {
        self.num
    }

    pub fn denominator(self) -> u32 {
        self.den
    }

    /// Whether `count / total >= self`, compared by cross-multiplication.
    pub fn is_met_by(self, count: usize, total: usize) -> bool {
        count as u64 * self.den as u64 >= self.num as u64 * total as u64
    }

    /// The conservative closing complement: same denominator, with the
    /// required count raised to `den - num + 1`.
    pub(crate) fn complement(self) -> Ratio {
        Ratio {
            num: self.den - self.num + 1,
            den: self.den,
        }
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// A bounded ring buffer of call outcomes (`true` = success).
///
/// Once full, pushing discards the oldest outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeWindow {
    capacity: usize,
    outcomes: VecDeque<bool>,
}

impl OutcomeWindow {
    /// Creates an empty window holding at most `capacity` outcomes.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "window capacity must be positive");
        Self {
            capacity,
            outcomes: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Records an outcome, discarding the oldest when full.
    pub fn push(&mut self, success: bool) {
        if self.outcomes.len() == self.capacity {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(success);
    }

    pub fn clear(&mut self) {
        self.outcomes.clear();
    }

    /// Number of failures among all recorded outcomes.
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|s| !**s).count()
    }

    /// Number of successes among all recorded outcomes.
    pub fn successes(&self) -> usize {
        self.outcomes.iter().filter(|s| **s).count()
    }

    /// Number of failures among the `n` most recent outcomes.
    pub fn failures_in_last(&self, n: usize) -> usize {
        self.outcomes.iter().rev().take(n).filter(|s| !**s).count()
    }

    /// Number of successes among the `n` most recent outcomes.
    pub fn successes_in_last(&self, n: usize) -> usize {
        self.outcomes.iter().rev().take(n).filter(|s| **s).count()
    }

    /// Wire encoding: one `'1'`/`'0'` per outcome, oldest first.
    pub fn encode(&self) -> String {
        self.outcomes
            .iter()
            .map(|s| if *s { '1' } else { '0' })
            .collect()
    }

    /// Rebuilds a window from its wire encoding, keeping only the most
    /// recent `capacity` outcomes. Characters other than `'1'` count as
    /// failures.
    pub fn decode(encoded: &str, capacity: usize) -> Self {
        let mut window = Self::new(capacity);
        for c in encoded.chars() {
            window.push(c == '1');
        }
        window
    }
}
