use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A point on the simulation clock.
///
/// `discrete` counts whole updates; `fraction` is kept in `[0, 1)` for
/// subsystems that report progress inside an update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub discrete: i32,
    pub fraction: f32,
}

impl Update {
    /// Marks data produced outside the regular update cycle.
    pub const CONCURRENT: Update = Update {
        discrete: -1,
        fraction: 0.0,
    };

    pub const ZERO: Update = Update {
        discrete: 0,
        fraction: 0.0,
    };

    #[must_use]
    pub fn new(discrete: i32) -> Self {
        Self {
            discrete,
            fraction: 0.0,
        }
    }

    #[must_use]
    pub fn with_fraction(discrete: i32, fraction: f32) -> Self {
        let mut update = Self { discrete, fraction };
        update.normalize();
        update
    }

    #[must_use]
    pub fn from_f64(value: f64) -> Self {
        let discrete = value.floor() as i32;
        Self::with_fraction(discrete, (value - f64::from(discrete)) as f32)
    }

    /// The following whole update; the fraction is cleared.
    #[must_use]
    pub fn next(self) -> Self {
        Self::new(self.discrete.saturating_add(1))
    }

    #[must_use]
    pub fn is_concurrent(self) -> bool {
        self == Self::CONCURRENT
    }

    #[must_use]
    pub fn as_f64(self) -> f64 {
        f64::from(self.discrete) + f64::from(self.fraction)
    }

    fn normalize(&mut self) {
        if !self.fraction.is_finite() {
            self.fraction = 0.0;
            return;
        }
        let whole = self.fraction.floor();
        self.discrete = self.discrete.saturating_add(whole as i32);
        self.fraction -= whole;
        if self.fraction >= 1.0 {
            self.fraction = 0.0;
            self.discrete = self.discrete.saturating_add(1);
        }
    }
}

impl Default for Update {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<i32> for Update {
    fn from(value: i32) -> Self {
        Self::new(value)
    }
}

impl From<Update> for i32 {
    fn from(value: Update) -> Self {
        value.discrete
    }
}

impl From<Update> for f64 {
    fn from(value: Update) -> Self {
        value.as_f64()
    }
}

impl PartialOrd for Update {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.discrete.cmp(&other.discrete) {
            Ordering::Equal => self.fraction.partial_cmp(&other.fraction),
            ord => Some(ord),
        }
    }
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fraction == 0.0 {
            write!(f, "{}", self.discrete)
        } else {
            write!(f, "{:.3}", self.as_f64())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_normalized() {
        let u = Update::with_fraction(3, 1.25);
        assert_eq!(u.discrete, 4);
        assert!((u.fraction - 0.25).abs() < 1e-6);

        let neg = Update::with_fraction(3, -0.5);
        assert_eq!(neg.discrete, 2);
        assert!((neg.fraction - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_next_clears_fraction() {
        let u = Update::with_fraction(7, 0.5).next();
        assert_eq!(u, Update::new(8));
    }

    #[test]
    fn test_ordering() {
        assert!(Update::new(2) > Update::new(1));
        assert!(Update::with_fraction(2, 0.5) > Update::new(2));
        assert!(Update::CONCURRENT < Update::ZERO);
    }

    #[test]
    fn test_conversions() {
        assert_eq!(i32::from(Update::from(12)), 12);
        assert!((f64::from(Update::from_f64(4.75)) - 4.75).abs() < 1e-6);
        assert_eq!(Update::new(5).to_string(), "5");
    }
}
