//! Chain-running machinery shared by the samplers: a [`MarkovChain`] steps its own state,
//! and anything that owns several chains gets parallel burn-in/collection through
//! [`ChainRunner`].

use std::collections::VecDeque;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use ndarray::{Array1, Array2};
use rayon::prelude::*;

use crate::error::Result;

pub trait MarkovChain {
    /// Does one iteration of the chain, returning the new current state.
    fn step(&mut self) -> Result<&[f64]>;

    /// Get the current state without stepping.
    fn current_state(&self) -> &[f64];

    /// Unnormalized log-density of the current state.
    fn current_log_prob(&self) -> f64;

    /// Called after every burn-in step; chains that tune themselves do it here.
    fn tune(&mut self) {}

    /// Called once between burn-in and collection.
    fn end_burnin(&mut self) {}

    /// Fraction of accepted proposals since the end of burn-in.
    fn acceptance_rate(&self) -> f64;
}

/// Retained output of one chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutput {
    /// `[n_collect, dim]` states as produced by the chain.
    pub draws: Array2<f64>,
    /// Log-density of each retained state.
    pub log_probs: Array1<f64>,
    pub accept_rate: f64,
}

fn burn_in<M: MarkovChain>(chain: &mut M, n_discard: usize) -> Result<()> {
    for _ in 0..n_discard {
        chain.step()?;
        chain.tune();
    }
    chain.end_burnin();
    Ok(())
}

/// Runs `n_discard` burn-in steps, then collects `n_collect` states.
pub fn run_chain<M: MarkovChain>(
    chain: &mut M,
    n_collect: usize,
    n_discard: usize,
) -> Result<ChainOutput> {
    burn_in(chain, n_discard)?;

    let dim = chain.current_state().len();
    let mut draws = Array2::<f64>::zeros((n_collect, dim));
    let mut log_probs = Array1::<f64>::zeros(n_collect);
    for i in 0..n_collect {
        let state = chain.step()?;
        draws.row_mut(i).assign(&ndarray::ArrayView1::from(state));
        log_probs[i] = chain.current_log_prob();
    }

    Ok(ChainOutput {
        draws,
        log_probs,
        accept_rate: chain.acceptance_rate(),
    })
}

/// Same as [`run_chain`], reporting progress and a sliding-window acceptance rate on `pb`.
pub fn run_chain_with_progress<M: MarkovChain>(
    chain: &mut M,
    n_collect: usize,
    n_discard: usize,
    pb: &ProgressBar,
) -> Result<ChainOutput> {
    pb.set_length((n_discard + n_collect) as u64);
    pb.set_message("burn-in");
    for _ in 0..n_discard {
        chain.step()?;
        chain.tune();
        pb.inc(1);
    }
    chain.end_burnin();

    let window_size = 100;
    let mut accept_window: VecDeque<bool> = VecDeque::with_capacity(window_size);

    let dim = chain.current_state().len();
    let mut draws = Array2::<f64>::zeros((n_collect, dim));
    let mut log_probs = Array1::<f64>::zeros(n_collect);
    let mut last_state = chain.current_state().to_vec();
    for i in 0..n_collect {
        let state = chain.step()?;
        let accepted = state != last_state.as_slice();
        last_state.copy_from_slice(state);
        draws.row_mut(i).assign(&ndarray::ArrayView1::from(state));
        log_probs[i] = chain.current_log_prob();

        accept_window.push_back(accepted);
        if accept_window.len() > window_size {
            accept_window.pop_front();
        }
        let p_accept =
            accept_window.iter().filter(|&&a| a).count() as f64 / accept_window.len() as f64;
        pb.set_message(format!("p(accept)≈{p_accept:.2}"));
        pb.inc(1);
    }

    Ok(ChainOutput {
        draws,
        log_probs,
        accept_rate: chain.acceptance_rate(),
    })
}

/// A trait for "anything that owns multiple MarkovChains".
pub trait HasChains {
    type Chain: MarkovChain + Send;

    /// Returns a mutable reference to the vector of chains.
    fn chains_mut(&mut self) -> &mut Vec<Self::Chain>;
}

pub trait ChainRunner: HasChains {
    /// Runs the chains in parallel, discarding burn-in.
    fn run(&mut self, n_collect: usize, n_discard: usize) -> Result<Vec<ChainOutput>> {
        self.chains_mut()
            .par_iter_mut()
            .map(|chain| run_chain(chain, n_collect, n_discard))
            .collect()
    }

    /// Runs the chains in parallel with one progress bar per chain.
    fn run_progress(&mut self, n_collect: usize, n_discard: usize) -> Result<Vec<ChainOutput>> {
        let multi = MultiProgress::new();
        let pb_style = ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");

        self.chains_mut()
            .par_iter_mut()
            .enumerate()
            .map(|(i, chain)| {
                let pb = multi.add(ProgressBar::new((n_collect + n_discard) as u64));
                pb.set_prefix(format!("Chain {i}"));
                pb.set_style(pb_style.clone());

                let out = run_chain_with_progress(chain, n_collect, n_discard, &pb);
                pb.finish_with_message("Done!");
                out
            })
            .collect()
    }
}

impl<T: HasChains> ChainRunner for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    /// Deterministic chain that counts up and records how it was driven.
    struct Counter {
        state: Vec<f64>,
        tuned: usize,
        ended_burnin: bool,
        fail_at: Option<f64>,
    }

    impl Counter {
        fn new() -> Self {
            Self {
                state: vec![0.0],
                tuned: 0,
                ended_burnin: false,
                fail_at: None,
            }
        }
    }

    impl MarkovChain for Counter {
        fn step(&mut self) -> Result<&[f64]> {
            self.state[0] += 1.0;
            if Some(self.state[0]) == self.fail_at {
                return Err(Error::Sampling("diverged".to_string()));
            }
            Ok(&self.state)
        }

        fn current_state(&self) -> &[f64] {
            &self.state
        }

        fn current_log_prob(&self) -> f64 {
            -self.state[0]
        }

        fn tune(&mut self) {
            self.tuned += 1;
        }

        fn end_burnin(&mut self) {
            self.ended_burnin = true;
        }

        fn acceptance_rate(&self) -> f64 {
            1.0
        }
    }

    struct Counters(Vec<Counter>);

    impl HasChains for Counters {
        type Chain = Counter;

        fn chains_mut(&mut self) -> &mut Vec<Counter> {
            &mut self.0
        }
    }

    #[test]
    fn run_chain_discards_burnin() {
        let mut chain = Counter::new();
        let out = run_chain(&mut chain, 5, 3).unwrap();
        assert_eq!(chain.tuned, 3);
        assert!(chain.ended_burnin);
        assert_eq!(out.draws.column(0).to_vec(), vec![4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(out.log_probs.to_vec(), vec![-4.0, -5.0, -6.0, -7.0, -8.0]);
    }

    #[test]
    fn progress_run_matches_plain_run() {
        let mut a = Counter::new();
        let mut b = Counter::new();
        let plain = run_chain(&mut a, 10, 2).unwrap();
        let pb = ProgressBar::hidden();
        let progress = run_chain_with_progress(&mut b, 10, 2, &pb).unwrap();
        assert_eq!(plain, progress);
    }

    #[test]
    fn runner_returns_one_output_per_chain() {
        let mut chains = Counters((0..4).map(|_| Counter::new()).collect());
        let outputs = chains.run(7, 1).unwrap();
        assert_eq!(outputs.len(), 4);
        assert!(outputs.iter().all(|o| o.draws.nrows() == 7));
    }

    #[test]
    fn runner_propagates_chain_errors() {
        let mut failing = Counter::new();
        failing.fail_at = Some(3.0);
        let mut chains = Counters(vec![Counter::new(), failing]);
        assert!(matches!(chains.run(5, 0), Err(Error::Sampling(_))));
    }
}
