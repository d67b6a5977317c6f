/*!
# Metropolis–Hastings Sampler

This module implements a random-walk Metropolis–Hastings sampler that can work with any
target distribution `D` and proposal distribution `Q` that implement the corresponding
traits [`Target`] and [`Proposal`]. The sampler runs multiple independent Markov chains in
parallel. A global seed is used to ensure reproducibility, and each chain gets a unique seed
by adding its index to the global seed.

During burn-in each chain can tune its proposal scale with dual averaging towards a target
acceptance rate; the averaged scale is frozen before draws are retained.

## Example Usage

```rust
use kinetic_mcmc::core::ChainRunner;
use kinetic_mcmc::distributions::{IsotropicGaussian, Target};
use kinetic_mcmc::metropolis_hastings::MetropolisHastings;

#[derive(Clone)]
struct StdNormal;

impl Target<f64> for StdNormal {
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
        -0.5 * theta.iter().map(|x| x * x).sum::<f64>()
    }
}

let mut mh = MetropolisHastings::new(StdNormal, IsotropicGaussian::new(1.0), &[0.0], 2)
    .unwrap()
    .set_seed(42);
let outputs = mh.run(500, 100).unwrap();
assert_eq!(outputs.len(), 2);
assert_eq!(outputs[0].draws.nrows(), 500);
```
*/

use rand::prelude::*;

use crate::adapt::{default_target_accept, DualAverage, DualAverageOptions};
use crate::core::{HasChains, MarkovChain};
use crate::distributions::{Proposal, Target};
use crate::error::{Error, Result};

const MIN_SCALE: f64 = 1e-10;
const MAX_SCALE: f64 = 1e10;

/// Offset between a chain's acceptance RNG seed and its proposal RNG seed.
const PROPOSAL_SEED_OFFSET: u64 = 0x9E37_79B9_7F4A_7C15;

/**
The Metropolis–Hastings sampler generates samples from a target distribution by
using a proposal distribution to propose candidate moves and then accepting or rejecting
these moves using the Metropolis–Hastings acceptance criterion.

# Type Parameters
- `D`: The target distribution type. Must implement [`Target`].
- `Q`: The proposal distribution type. Must implement [`Proposal`].
*/
#[derive(Debug, Clone)]
pub struct MetropolisHastings<D: Clone, Q: Clone> {
    /// The target distribution we want to sample from.
    pub target: D,
    /// The proposal distribution used to generate candidate states.
    pub proposal: Q,
    /// The vector of independent Markov chains.
    pub chains: Vec<MHMarkovChain<D, Q>>,
    /// The global random seed.
    pub seed: u64,
}

/// A single Markov chain for the Metropolis–Hastings algorithm.
///
/// Each chain stores its own copy of the target and proposal distributions,
/// maintains its current state, and uses a chain-specific random number generator.
#[derive(Debug, Clone)]
pub struct MHMarkovChain<D, Q> {
    /// The target distribution to sample from.
    pub target: D,
    /// The proposal distribution used to generate candidate states.
    pub proposal: Q,
    /// The current state of the chain.
    pub current_state: Vec<f64>,
    /// Log-density of `current_state`.
    pub current_lp: f64,
    /// The chain-specific random seed.
    pub seed: u64,
    /// The random number generator for this chain.
    pub rng: SmallRng,
    adaptation: Option<Adaptation>,
    n_accepted: u64,
    n_steps: u64,
    last_accept_prob: f64,
}

#[derive(Debug, Clone)]
struct Adaptation {
    dual_average: DualAverage,
    target_accept: f64,
}

impl<D, Q> MetropolisHastings<D, Q>
where
    D: Target<f64> + Clone + Send,
    Q: Proposal<f64> + Clone + Send,
{
    /**
    Constructs a new Metropolis-Hastings sampler with a given target and proposal,
    initializing each chain at `initial_state` and creating `n_chains` parallel chains.

    Fails if the target has no finite log-density at `initial_state`.
    */
    pub fn new(target: D, proposal: Q, initial_state: &[f64], n_chains: usize) -> Result<Self> {
        let initial_states = vec![initial_state.to_vec(); n_chains];
        Self::with_initial_states(target, proposal, initial_states)
    }

    /// Constructs a sampler with one chain per entry of `initial_states`.
    pub fn with_initial_states(
        target: D,
        proposal: Q,
        initial_states: Vec<Vec<f64>>,
    ) -> Result<Self> {
        let chains = initial_states
            .iter()
            .map(|state| MHMarkovChain::new(target.clone(), proposal.clone(), state))
            .collect::<Result<Vec<_>>>()?;
        let seed = thread_rng().gen::<u64>();

        Ok(Self {
            target,
            proposal,
            chains,
            seed,
        }
        .set_seed(seed))
    }

    /**
    Sets a new global seed and updates the seed for each chain accordingly.

    Each chain receives a unique seed calculated as `seed + i`, where `i` is the chain index.
    The chain's proposal is reseeded from the same value so whole runs are reproducible.
    */
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        for (i, chain) in self.chains.iter_mut().enumerate() {
            let chain_seed = seed.wrapping_add(i as u64);
            chain.seed = chain_seed;
            chain.rng = SmallRng::seed_from_u64(chain_seed);
            chain.proposal = chain
                .proposal
                .clone()
                .set_seed(chain_seed.wrapping_add(PROPOSAL_SEED_OFFSET));
        }
        self
    }

    /// Enables proposal-scale adaptation during burn-in for every chain.
    ///
    /// `target_accept` defaults to a dimension-dependent optimum.
    pub fn adapt_scale(mut self, target_accept: Option<f64>) -> Self {
        for chain in self.chains.iter_mut() {
            let dim = chain.current_state.len();
            chain.adaptation = Some(Adaptation {
                dual_average: DualAverage::new(
                    DualAverageOptions::default(),
                    chain.proposal.scale(),
                ),
                target_accept: target_accept.unwrap_or_else(|| default_target_accept(dim)),
            });
        }
        self
    }
}

impl<D, Q> HasChains for MetropolisHastings<D, Q>
where
    D: Target<f64> + Clone + Send,
    Q: Proposal<f64> + Clone + Send,
{
    type Chain = MHMarkovChain<D, Q>;

    fn chains_mut(&mut self) -> &mut Vec<Self::Chain> {
        &mut self.chains
    }
}

impl<D, Q> MHMarkovChain<D, Q>
where
    D: Target<f64> + Clone,
    Q: Proposal<f64> + Clone,
{
    /// Creates a new Metropolis–Hastings chain.
    pub fn new(target: D, proposal: Q, initial_state: &[f64]) -> Result<Self> {
        let current_lp = target.unnorm_log_prob(initial_state);
        if !current_lp.is_finite() {
            return Err(Error::Sampling(format!(
                "log density at initial state {initial_state:?} is {current_lp}"
            )));
        }
        let seed = thread_rng().gen::<u64>();
        Ok(Self {
            target,
            proposal,
            current_state: initial_state.to_vec(),
            current_lp,
            seed,
            rng: SmallRng::seed_from_u64(seed),
            adaptation: None,
            n_accepted: 0,
            n_steps: 0,
            last_accept_prob: 0.0,
        })
    }

    /// Current proposal scale.
    pub fn scale(&self) -> f64 {
        self.proposal.scale()
    }
}

impl<D, Q> MarkovChain for MHMarkovChain<D, Q>
where
    D: Target<f64> + Clone,
    Q: Proposal<f64> + Clone,
{
    /**
    Performs one Metropolis–Hastings update step.

    The acceptance ratio in log-space is

    \[
    \log \alpha = \left[\log p(\text{proposed}) + \log q(\text{current} \mid \text{proposed})\right]
                  - \left[\log p(\text{current}) + \log q(\text{proposed} \mid \text{current})\right]
    \]

    and the proposal is accepted if \(\log(\text{Uniform}(0,1)) < \log \alpha\). Proposals
    with a NaN log-density are rejected; a log-density of positive infinity is reported
    as a divergence.
    */
    fn step(&mut self) -> Result<&[f64]> {
        let proposed = self.proposal.sample(&self.current_state);
        let proposed_lp = self.target.unnorm_log_prob(&proposed);
        if proposed_lp == f64::INFINITY {
            return Err(Error::Sampling(format!(
                "log density diverged at {proposed:?}"
            )));
        }
        let log_q_forward = self.proposal.log_prob(&self.current_state, &proposed);
        let log_q_backward = self.proposal.log_prob(&proposed, &self.current_state);
        let log_accept_ratio = (proposed_lp + log_q_backward) - (self.current_lp + log_q_forward);

        self.last_accept_prob = if log_accept_ratio.is_nan() {
            0.0
        } else {
            log_accept_ratio.min(0.0).exp()
        };
        self.n_steps += 1;

        let u: f64 = self.rng.gen();
        if log_accept_ratio > u.ln() {
            self.current_state = proposed;
            self.current_lp = proposed_lp;
            self.n_accepted += 1;
        }
        Ok(&self.current_state)
    }

    fn current_state(&self) -> &[f64] {
        &self.current_state
    }

    fn current_log_prob(&self) -> f64 {
        self.current_lp
    }

    fn tune(&mut self) {
        if let Some(adaptation) = self.adaptation.as_mut() {
            adaptation
                .dual_average
                .advance(self.last_accept_prob, adaptation.target_accept);
            let scale = adaptation.dual_average.current_scale();
            self.proposal.set_scale(scale.clamp(MIN_SCALE, MAX_SCALE));
        }
    }

    fn end_burnin(&mut self) {
        if let Some(adaptation) = self.adaptation.take() {
            let scale = adaptation.dual_average.adapted_scale();
            self.proposal.set_scale(scale.clamp(MIN_SCALE, MAX_SCALE));
        }
        self.n_accepted = 0;
        self.n_steps = 0;
    }

    fn acceptance_rate(&self) -> f64 {
        if self.n_steps == 0 {
            0.0
        } else {
            self.n_accepted as f64 / self.n_steps as f64
        }
    }
}
