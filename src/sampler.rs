//! Run configuration and the top-level sampling entry points.
//!
//! [`sample`] draws from a compiled Bernoulli model; [`sample_target`] does the same for any
//! [`Target`] defined on the unconstrained scale of a set of [`Bounds`].

use std::io::Write;

use ndarray::{Array2, Array3};
use rand::prelude::*;

use crate::core::ChainRunner;
use crate::distributions::{IsotropicGaussian, Target};
use crate::error::{Error, Result};
use crate::fit::Fit;
use crate::io::SummarySink;
use crate::metropolis_hastings::MetropolisHastings;
use crate::model::{BernoulliData, CompiledModel};
use crate::transform::{self, Bounds};

/// Attempts per chain at finding a random starting point with finite log-density.
const MAX_INIT_ATTEMPTS: usize = 100;

/// Offset between the run seed and the seed used to draw random starting points.
const INIT_SEED_OFFSET: u64 = 0x2545_F491_4F6C_DD1D;

/// How chains are started.
#[derive(Debug, Clone, PartialEq)]
pub enum Init {
    /// Uniform on `[-radius, radius]` in every unconstrained coordinate.
    Random { radius: f64 },
    /// The same constrained values for every chain.
    Fixed(Vec<f64>),
}

impl Default for Init {
    fn default() -> Self {
        Init::Random { radius: 2.0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplerSettings {
    pub n_chains: usize,
    /// Burn-in iterations per chain; discarded.
    pub n_burnin: usize,
    /// Retained iterations per chain.
    pub n_draws: usize,
    /// Initial standard deviation of the random-walk proposal (unconstrained scale).
    pub par_scale: f64,
    /// Tune the proposal scale during burn-in.
    pub adapt_scale: bool,
    /// Acceptance rate aimed for by adaptation. `None` picks one from the dimension.
    pub target_accept: Option<f64>,
    pub init: Init,
    /// `None` draws a seed from the thread RNG.
    pub seed: Option<u64>,
    /// Show one progress bar per chain.
    pub progress: bool,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            n_chains: 4,
            n_burnin: 1000,
            n_draws: 1000,
            par_scale: 1.0,
            adapt_scale: true,
            target_accept: None,
            init: Init::default(),
            seed: None,
            progress: false,
        }
    }
}

impl SamplerSettings {
    pub fn with_chains(mut self, n_chains: usize) -> Self {
        self.n_chains = n_chains;
        self
    }

    pub fn with_burnin(mut self, n_burnin: usize) -> Self {
        self.n_burnin = n_burnin;
        self
    }

    pub fn with_draws(mut self, n_draws: usize) -> Self {
        self.n_draws = n_draws;
        self
    }

    pub fn with_par_scale(mut self, par_scale: f64) -> Self {
        self.par_scale = par_scale;
        self
    }

    pub fn with_adapt_scale(mut self, adapt_scale: bool) -> Self {
        self.adapt_scale = adapt_scale;
        self
    }

    pub fn with_target_accept(mut self, target_accept: f64) -> Self {
        self.target_accept = Some(target_accept);
        self
    }

    pub fn with_init(mut self, init: Init) -> Self {
        self.init = init;
        self
    }

    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_chains == 0 {
            return Err(Error::Sampling("at least one chain is required".to_string()));
        }
        if self.n_draws == 0 {
            return Err(Error::Sampling("at least one draw is required".to_string()));
        }
        if !(self.par_scale > 0.0 && self.par_scale.is_finite()) {
            return Err(Error::Sampling(format!(
                "proposal scale must be positive, got {}",
                self.par_scale
            )));
        }
        if let Some(t) = self.target_accept {
            if !(t > 0.0 && t < 1.0) {
                return Err(Error::Sampling(format!(
                    "target acceptance rate must be in (0, 1), got {t}"
                )));
            }
        }
        if let Init::Random { radius } = self.init {
            if !(radius >= 0.0 && radius.is_finite()) {
                return Err(Error::Sampling(format!(
                    "initialization radius must be non-negative, got {radius}"
                )));
            }
        }
        Ok(())
    }
}

/// Samples the posterior of `sm` given `data`.
pub fn sample(sm: &CompiledModel, data: &BernoulliData, settings: &SamplerSettings) -> Result<Fit> {
    let target = sm.bind(data)?;
    let names = sm.param_names().into_iter().map(String::from).collect();
    sample_target(target, &sm.bounds(), names, sm.name(), settings)
}

/// Like [`sample`], then writes the fit summary to `sink`.
///
/// The sink is owned by this call and closed when it returns, on success or failure.
pub fn sample_with_sink<W: Write>(
    sm: &CompiledModel,
    data: &BernoulliData,
    settings: &SamplerSettings,
    mut sink: SummarySink<W>,
) -> Result<Fit> {
    let fit = sample(sm, data, settings)?;
    sink.write_summary(&fit.summary())?;
    Ok(fit)
}

/// Runs random-walk Metropolis on `target`, which is evaluated on the unconstrained scale of
/// `bounds`. Draws in the returned [`Fit`] are on the constrained scale.
pub fn sample_target<D>(
    target: D,
    bounds: &[Bounds],
    param_names: Vec<String>,
    model_name: &str,
    settings: &SamplerSettings,
) -> Result<Fit>
where
    D: Target<f64> + Clone + Send,
{
    settings.validate()?;
    if param_names.len() != bounds.len() {
        return Err(Error::Sampling(format!(
            "{} parameter names for {} bounds",
            param_names.len(),
            bounds.len()
        )));
    }
    let seed = settings.seed.unwrap_or_else(|| thread_rng().gen());
    let initial_states = initial_states(&target, bounds, settings, seed)?;

    let mut mh = MetropolisHastings::with_initial_states(
        target,
        IsotropicGaussian::new(settings.par_scale),
        initial_states,
    )?
    .set_seed(seed);
    if settings.adapt_scale {
        mh = mh.adapt_scale(settings.target_accept);
    }

    let outputs = if settings.progress {
        mh.run_progress(settings.n_draws, settings.n_burnin)?
    } else {
        mh.run(settings.n_draws, settings.n_burnin)?
    };

    let dim = bounds.len();
    let mut draws = Array3::<f64>::zeros((settings.n_chains, settings.n_draws, dim));
    let mut log_probs = Array2::<f64>::zeros((settings.n_chains, settings.n_draws));
    for (c, out) in outputs.iter().enumerate() {
        for (i, row) in out.draws.outer_iter().enumerate() {
            let x = row.to_vec();
            for (p, v) in transform::constrain_all(bounds, &x).into_iter().enumerate() {
                draws[[c, i, p]] = v;
            }
        }
        log_probs.row_mut(c).assign(&out.log_probs);
    }

    Ok(Fit {
        model_name: model_name.to_string(),
        param_names,
        draws,
        log_probs,
        accept_rates: outputs.iter().map(|o| o.accept_rate).collect(),
        scales: mh.chains.iter().map(|c| c.scale()).collect(),
        n_burnin: settings.n_burnin,
        seed,
    })
}

/// Unconstrained starting point of every chain.
fn initial_states<D: Target<f64>>(
    target: &D,
    bounds: &[Bounds],
    settings: &SamplerSettings,
    seed: u64,
) -> Result<Vec<Vec<f64>>> {
    match &settings.init {
        Init::Fixed(values) => {
            if values.len() != bounds.len() {
                return Err(Error::Sampling(format!(
                    "initial values have length {}, model has {} parameters",
                    values.len(),
                    bounds.len()
                )));
            }
            if let Some((i, v)) = values
                .iter()
                .zip(bounds)
                .enumerate()
                .find(|(_, (v, b))| !b.contains(**v))
                .map(|(i, (v, _))| (i, v))
            {
                return Err(Error::Sampling(format!(
                    "initial value {v} of parameter {i} is outside its support"
                )));
            }
            Ok(vec![
                transform::unconstrain_all(bounds, values);
                settings.n_chains
            ])
        }
        Init::Random { radius } => {
            let mut rng = SmallRng::seed_from_u64(seed.wrapping_add(INIT_SEED_OFFSET));
            (0..settings.n_chains)
                .map(|chain| {
                    for _ in 0..MAX_INIT_ATTEMPTS {
                        let x: Vec<f64> = (0..bounds.len())
                            .map(|_| rng.gen_range(-radius..=*radius))
                            .collect();
                        if target.unnorm_log_prob(&x).is_finite() {
                            return Ok(x);
                        }
                    }
                    Err(Error::Sampling(format!(
                        "no finite log density found for chain {chain} after \
                         {MAX_INIT_ATTEMPTS} random initializations"
                    )))
                })
                .collect()
        }
    }
}
