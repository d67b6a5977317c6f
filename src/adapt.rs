//! Dual-averaging adaptation of the random-walk proposal scale during burn-in.
//!
//! Larger proposal scales lower the acceptance probability, so the same scheme that tunes
//! HMC step sizes drives the Metropolis scale towards a target acceptance rate.

/// Settings for scale adaptation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DualAverageOptions {
    pub k: f64,
    pub t0: f64,
    pub gamma: f64,
}

impl Default for DualAverageOptions {
    fn default() -> DualAverageOptions {
        DualAverageOptions {
            k: 0.75,
            t0: 10.,
            gamma: 0.05,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DualAverage {
    log_scale: f64,
    log_scale_adapted: f64,
    hbar: f64,
    mu: f64,
    count: u64,
    settings: DualAverageOptions,
}

impl DualAverage {
    pub fn new(settings: DualAverageOptions, initial_scale: f64) -> DualAverage {
        DualAverage {
            log_scale: initial_scale.ln(),
            log_scale_adapted: initial_scale.ln(),
            hbar: 0.,
            mu: (10. * initial_scale).ln(),
            count: 1,
            settings,
        }
    }

    /// Feeds the acceptance probability of the latest proposal.
    pub fn advance(&mut self, accept_stat: f64, target: f64) {
        let w = 1. / (self.count as f64 + self.settings.t0);
        self.hbar = (1. - w) * self.hbar + w * (target - accept_stat);
        self.log_scale = self.mu - self.hbar * (self.count as f64).sqrt() / self.settings.gamma;
        let mk = (self.count as f64).powf(-self.settings.k);
        self.log_scale_adapted = mk * self.log_scale + (1. - mk) * self.log_scale_adapted;
        self.count += 1;
    }

    /// Scale to use for the next burn-in proposal.
    pub fn current_scale(&self) -> f64 {
        self.log_scale.exp()
    }

    /// Averaged scale; frozen in once burn-in ends.
    pub fn adapted_scale(&self) -> f64 {
        self.log_scale_adapted.exp()
    }
}

/// Acceptance rate for which the random-walk proposal is tuned, by dimension.
///
/// 0.44 is optimal for one-dimensional Gaussian targets and 0.234 the high-dimensional limit.
pub fn default_target_accept(dim: usize) -> f64 {
    match dim {
        0 | 1 => 0.44,
        2 => 0.35,
        3 | 4 => 0.28,
        _ => 0.234,
    }
}
