//! Maps bounded parameters to an unconstrained space and back.
//!
//! Random-walk proposals are made on the unconstrained scale, so a chain can never step
//! outside the support. The sampled density picks up the log-Jacobian of the inverse map.

/// Support of a scalar parameter. Either bound may be infinite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
}

impl Bounds {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn unbounded() -> Self {
        Self::new(f64::NEG_INFINITY, f64::INFINITY)
    }

    pub fn unit() -> Self {
        Self::new(0.0, 1.0)
    }

    /// Whether `value` lies strictly inside the bounds. Finite bounds themselves map to
    /// infinite unconstrained values, so they are not admissible chain states.
    pub fn contains(&self, value: f64) -> bool {
        value > self.lower && value < self.upper
    }

    fn kind(&self) -> Kind {
        match (self.lower.is_finite(), self.upper.is_finite()) {
            (true, true) => Kind::Interval,
            (true, false) => Kind::Lower,
            (false, true) => Kind::Upper,
            (false, false) => Kind::Free,
        }
    }

    /// Constrained value to unconstrained value.
    pub fn unconstrain(&self, value: f64) -> f64 {
        match self.kind() {
            Kind::Free => value,
            Kind::Lower => (value - self.lower).ln(),
            Kind::Upper => (self.upper - value).ln(),
            Kind::Interval => ((value - self.lower) / (self.upper - value)).ln(),
        }
    }

    /// Unconstrained value to constrained value.
    pub fn constrain(&self, x: f64) -> f64 {
        match self.kind() {
            Kind::Free => x,
            Kind::Lower => self.lower + x.exp(),
            Kind::Upper => self.upper - x.exp(),
            Kind::Interval => {
                let value = self.lower + (self.upper - self.lower) * logistic(x);
                // Rounding can land exactly on a bound for large |x|.
                value.clamp(self.lower, self.upper)
            }
        }
    }

    /// log |d constrain(x) / dx|
    pub fn log_jacobian(&self, x: f64) -> f64 {
        match self.kind() {
            Kind::Free => 0.0,
            Kind::Lower | Kind::Upper => x,
            Kind::Interval => {
                // log(s (1 - s)) = -|x| - 2 log(1 + exp(-|x|)), stable for large |x|.
                (self.upper - self.lower).ln() - x.abs() - 2.0 * (-x.abs()).exp().ln_1p()
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Free,
    Lower,
    Upper,
    Interval,
}

fn logistic(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Applies [`Bounds::constrain`] coordinate-wise.
pub fn constrain_all(bounds: &[Bounds], x: &[f64]) -> Vec<f64> {
    bounds.iter().zip(x).map(|(b, &x)| b.constrain(x)).collect()
}

/// Applies [`Bounds::unconstrain`] coordinate-wise.
pub fn unconstrain_all(bounds: &[Bounds], values: &[f64]) -> Vec<f64> {
    bounds
        .iter()
        .zip(values)
        .map(|(b, &v)| b.unconstrain(v))
        .collect()
}

/// Sum of the per-coordinate log-Jacobians.
pub fn log_jacobian_all(bounds: &[Bounds], x: &[f64]) -> f64 {
    bounds.iter().zip(x).map(|(b, &x)| b.log_jacobian(x)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn interval_roundtrip() {
        let b = Bounds::new(0.1, 3.0);
        for &v in &[0.11, 0.5, 1.7, 2.99] {
            assert_abs_diff_eq!(b.constrain(b.unconstrain(v)), v, epsilon = 1e-10);
        }
    }

    #[test]
    fn half_bounded_roundtrip() {
        let lower = Bounds::new(2.0, f64::INFINITY);
        let upper = Bounds::new(f64::NEG_INFINITY, -1.0);
        assert_abs_diff_eq!(lower.constrain(lower.unconstrain(5.0)), 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(upper.constrain(upper.unconstrain(-4.0)), -4.0, epsilon = 1e-12);
    }

    #[test]
    fn constrained_values_stay_in_support() {
        let b = Bounds::unit();
        for &x in &[-800.0, -30.0, 0.0, 30.0, 800.0] {
            let v = b.constrain(x);
            assert!((0.0..=1.0).contains(&v), "{v} escaped [0, 1]");
        }
    }

    #[test]
    fn interval_log_jacobian_matches_finite_difference() {
        let b = Bounds::new(-1.0, 4.0);
        let h = 1e-6;
        for &x in &[-3.0, -0.2, 0.0, 1.5, 6.0] {
            let numeric = (b.constrain(x + h) - b.constrain(x - h)) / (2.0 * h);
            assert_abs_diff_eq!(b.log_jacobian(x), numeric.ln(), epsilon = 1e-6);
        }
    }

    #[test]
    fn contains_excludes_bounds() {
        let b = Bounds::unit();
        assert!(b.contains(0.5));
        assert!(!b.contains(0.0));
        assert!(!b.contains(1.0));
        assert!(Bounds::unbounded().contains(1e300));
    }
}
