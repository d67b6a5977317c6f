//! Posterior summary statistics and MCMC convergence diagnostics: potential scale reduction
//! (R-hat), effective sample size and quantiles.

use ndarray::prelude::*;
use ndarray_stats::QuantileExt;
use num_traits::ToPrimitive;
use rustfft::{num_complex::Complex, FftPlanner};

use crate::error::{Error, Result};

/// Running potential scale reduction factor over several chains, updated one draw at a
/// time. See the [Stan Reference Manual][1].
///
/// [1]: https://mc-stan.org/docs/reference-manual/analysis.html#potential-scale-reduction
#[derive(Debug, Clone, PartialEq)]
pub struct RhatMulti {
    n: usize,
    mean: Array2<f64>,    // n_chains x n_params
    mean_sq: Array2<f64>, // n_chains x n_params
    n_chains: usize,
    n_params: usize,
}

impl RhatMulti {
    pub fn new(n_chains: usize, n_params: usize) -> Self {
        Self {
            n: 0,
            mean: Array2::<f64>::zeros((n_chains, n_params)),
            mean_sq: Array2::<f64>::zeros((n_chains, n_params)),
            n_chains,
            n_params,
        }
    }

    /// Adds one draw per chain; `x` is laid out chain-major (`n_chains x n_params`).
    pub fn step<T>(&mut self, x: &[T]) -> Result<()>
    where
        T: ToPrimitive + Clone,
    {
        self.n += 1;

        let n = self.n as f64;
        let x_arr = ArrayView2::<T>::from_shape((self.n_chains, self.n_params), x)
            .map_err(|e| Error::Sampling(format!("R-hat update: {e}")))?
            .mapv(|x| x.to_f64().unwrap_or(f64::NAN));

        self.mean = (&self.mean * (n - 1.0) + &x_arr) / n;
        if self.n == 1 {
            self.mean_sq = x_arr.pow2();
        } else {
            self.mean_sq = (&self.mean_sq * (n - 1.0) + x_arr.pow2()) / n;
        };
        Ok(())
    }

    /// R-hat per parameter. NaN until at least two draws and two chains were seen.
    pub fn all(&self) -> Array1<f64> {
        let mean_chain = match self.mean.mean_axis(Axis(0)) {
            Some(m) => m,
            None => return Array1::from_elem(self.n_params, f64::NAN),
        };
        let n_chains = self.n_chains as f64;
        let n = self.n as f64;
        let fac = n / (n_chains - 1.0);
        let between = (&self.mean - &mean_chain.insert_axis(Axis(0)))
            .pow2()
            .sum_axis(Axis(0))
            * fac;
        let sm2 = (&self.mean_sq - &self.mean.pow2()) * n / (n - 1.0);
        let within = sm2
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::from_elem(self.n_params, f64::NAN));
        let var = &within * ((n - 1.0) / n) + between * (1.0 / n);
        (var / within).sqrt()
    }

    pub fn max(&self) -> f64 {
        let all = self.all();
        all.max().map(|m| *m).unwrap_or(f64::NAN)
    }
}

/// Split R-hat of one parameter from draws shaped `[n_chains, n_draws]`.
///
/// Each chain is split in half, so a single chain still yields a diagnostic.
pub fn split_rhat(draws: ArrayView2<f64>) -> f64 {
    let (n_chains, n_draws) = draws.dim();
    let half = n_draws / 2;
    if n_chains == 0 || half < 2 {
        return f64::NAN;
    }
    let mut psr = RhatMulti::new(2 * n_chains, 1);
    let mut row = vec![0.0; 2 * n_chains];
    for i in 0..half {
        for (c, chain) in draws.outer_iter().enumerate() {
            row[2 * c] = chain[i];
            row[2 * c + 1] = chain[n_draws - half + i];
        }
        if psr.step(&row).is_err() {
            return f64::NAN;
        }
    }
    psr.all()[0]
}

/// Autocovariance at every lag, normalized by `n` (biased estimator), computed by FFT.
pub fn autocovariance(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    if n == 0 {
        return Vec::new();
    }
    let mean = x.iter().sum::<f64>() / n as f64;
    let len = (2 * n).next_power_of_two();

    let mut buf: Vec<Complex<f64>> = x
        .iter()
        .map(|&v| Complex::new(v - mean, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(len)
        .collect();

    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(len).process(&mut buf);
    for c in buf.iter_mut() {
        *c = Complex::new(c.norm_sqr(), 0.0);
    }
    planner.plan_fft_inverse(len).process(&mut buf);

    // rustfft does not normalize the inverse transform.
    let scale = 1.0 / (len as f64 * n as f64);
    buf.iter().take(n).map(|c| c.re * scale).collect()
}

/// Effective sample size of one parameter from draws shaped `[n_chains, n_draws]`.
///
/// Combines within-chain autocorrelations as Stan does and truncates the sum with Geyer's
/// initial monotone positive sequence.
pub fn ess(draws: ArrayView2<f64>) -> f64 {
    let (m, n) = draws.dim();
    if m == 0 || n < 4 {
        return f64::NAN;
    }
    let nf = n as f64;

    let acov: Vec<Vec<f64>> = draws
        .outer_iter()
        .map(|chain| autocovariance(&chain.to_vec()))
        .collect();
    let chain_means: Vec<f64> = draws.outer_iter().map(|c| c.sum() / nf).collect();
    let chain_vars: Vec<f64> = acov.iter().map(|a| a[0] * nf / (nf - 1.0)).collect();

    let within = chain_vars.iter().sum::<f64>() / m as f64;
    let mut var_plus = within * (nf - 1.0) / nf;
    if m > 1 {
        let grand = chain_means.iter().sum::<f64>() / m as f64;
        let between = chain_means.iter().map(|x| (x - grand).powi(2)).sum::<f64>() / (m - 1) as f64;
        var_plus += between;
    }
    if !(var_plus > 0.0) {
        return f64::NAN;
    }

    let rho = |t: usize| -> f64 {
        let mean_acov = acov.iter().map(|a| a[t]).sum::<f64>() / m as f64;
        1.0 - (within - mean_acov) / var_plus
    };

    let mut tau = -1.0;
    let mut prev_pair = f64::INFINITY;
    let mut t = 0;
    while t + 1 < n {
        let pair = rho(t) + rho(t + 1);
        if pair <= 0.0 {
            break;
        }
        let pair = pair.min(prev_pair);
        tau += 2.0 * pair;
        prev_pair = pair;
        t += 2;
    }

    let total = (m * n) as f64;
    // Antithetic chains can produce tau below 1/log10(N); cap as Stan does.
    let tau = tau.max(1.0 / total.log10());
    total / tau
}

/// Linearly interpolated quantile of already sorted values (type 7).
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        len => {
            let h = (len - 1) as f64 * q.clamp(0.0, 1.0);
            let lo = h.floor() as usize;
            let hi = (lo + 1).min(len - 1);
            sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
        }
    }
}

/// Sample mean and standard deviation (n - 1 denominator).
pub fn mean_sd(x: &[f64]) -> (f64, f64) {
    let n = x.len() as f64;
    if x.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let mean = x.iter().sum::<f64>() / n;
    if x.len() < 2 {
        return (mean, f64::NAN);
    }
    let var = x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}
