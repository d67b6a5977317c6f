/*!
Target and proposal distributions for random-walk Metropolis–Hastings, along with the
log-densities of the Beta prior and Bernoulli likelihood used by the compiled models.

The traits are generic over the floating-point precision (e.g., `f32` or `f64`) using
the [`num_traits::Float`] trait; the samplers in this crate instantiate them with `f64`.

# Examples

```rust
use kinetic_mcmc::distributions::{IsotropicGaussian, Proposal};

let mut proposal: IsotropicGaussian<f64> = IsotropicGaussian::new(1.0).set_seed(7);
let current = vec![0.0, 0.0];
let candidate = proposal.sample(&current);
assert_eq!(candidate.len(), 2);
```
*/

use num_traits::Float;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::PI;

/// A trait for generating proposals in Metropolis–Hastings.
pub trait Proposal<T: Float> {
    /// Samples a new point from q(x' | x).
    fn sample(&mut self, current: &[T]) -> Vec<T>;

    /// Evaluates log q(to | from).
    fn log_prob(&self, from: &[T], to: &[T]) -> T;

    /// Returns a new instance of this proposal distribution seeded with `seed`.
    fn set_seed(self, seed: u64) -> Self;

    /// Current proposal scale.
    fn scale(&self) -> T;

    /// Replaces the proposal scale. Used by burn-in adaptation.
    fn set_scale(&mut self, scale: T);
}

/// A trait for target distributions from which we want to sample.
pub trait Target<T: Float> {
    /// Returns the log of the unnormalized density for state `theta`.
    ///
    /// States outside the support evaluate to negative infinity.
    fn unnorm_log_prob(&self, theta: &[T]) -> T;
}

/**
An isotropic Gaussian distribution used as a proposal distribution.

This distribution adds independent Gaussian noise (with mean 0 and standard deviation `std`)
to each coordinate of the current state.
*/
#[derive(Debug, Clone)]
pub struct IsotropicGaussian<T: Float> {
    pub std: T,
    rng: SmallRng,
}

impl<T: Float> IsotropicGaussian<T> {
    /// Creates a new isotropic Gaussian proposal distribution with the specified standard deviation.
    pub fn new(std: T) -> Self {
        Self {
            std,
            rng: SmallRng::from_entropy(),
        }
    }
}

impl<T: Float> Proposal<T> for IsotropicGaussian<T>
where
    rand_distr::StandardNormal: rand_distr::Distribution<T>,
{
    fn sample(&mut self, current: &[T]) -> Vec<T> {
        let normal = match Normal::new(T::zero(), self.std) {
            Ok(normal) => normal,
            // Only reachable with a non-finite scale; stay put.
            Err(_) => return current.to_vec(),
        };
        normal
            .sample_iter(&mut self.rng)
            .zip(current)
            .map(|(eps, &x)| x + eps)
            .collect()
    }

    fn log_prob(&self, from: &[T], to: &[T]) -> T {
        let two = T::from(2.0).unwrap_or_else(T::one);
        let var = self.std * self.std;
        let d = T::from(from.len()).unwrap_or_else(T::zero);
        let half = T::from(0.5).unwrap_or_else(T::one);
        let two_pi = T::from(2.0 * PI).unwrap_or_else(T::one);
        let sq = from
            .iter()
            .zip(to.iter())
            .fold(T::zero(), |acc, (&f, &t)| acc + (t - f) * (t - f));
        -sq / (two * var) - d * half * (two_pi * var).ln()
    }

    fn set_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    fn scale(&self) -> T {
        self.std
    }

    fn set_scale(&mut self, scale: T) {
        self.std = scale;
    }
}

/// Unnormalized log-density of `Beta(alpha, beta)` at `x`.
///
/// Returns negative infinity outside the open unit interval.
pub fn beta_unnorm_ln_pdf<T: Float>(x: T, alpha: T, beta: T) -> T {
    if !(x > T::zero() && x < T::one()) {
        return T::neg_infinity();
    }
    (alpha - T::one()) * x.ln() + (beta - T::one()) * (T::one() - x).ln()
}

/// Log-likelihood of `successes` out of `trials` independent Bernoulli(p) outcomes.
pub fn bernoulli_ln_likelihood<T: Float>(successes: usize, trials: usize, p: T) -> T {
    if !(p >= T::zero() && p <= T::one()) {
        return T::neg_infinity();
    }
    let k = T::from(successes).unwrap_or_else(T::zero);
    let m = T::from(trials - successes).unwrap_or_else(T::zero);
    let mut lp = T::zero();
    // 0 * ln(0) is taken as 0 so the boundary outcomes stay finite.
    if successes > 0 {
        lp = lp + k * p.ln();
    }
    if trials > successes {
        lp = lp + m * (T::one() - p).ln();
    }
    lp
}
