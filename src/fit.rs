//! Result of a sampling run: posterior draws by parameter name and a Stan-style summary.

use std::fmt;

use ndarray::{Array2, Array3, ArrayView2, Axis};

use crate::error::{Error, Result};
use crate::stats;

/// Quantiles reported in the summary table.
pub const SUMMARY_QUANTILES: [f64; 5] = [0.025, 0.25, 0.5, 0.75, 0.975];

const QUANTILE_LABELS: [&str; 5] = ["2.5%", "25%", "50%", "75%", "97.5%"];

/// Name of the log-density row in summaries and exports.
pub const LP_NAME: &str = "lp__";

/// Posterior draws of a sampling run.
#[derive(Debug, Clone, PartialEq)]
pub struct Fit {
    pub(crate) model_name: String,
    pub(crate) param_names: Vec<String>,
    /// `[n_chains, n_draws, n_params]`, constrained scale.
    pub(crate) draws: Array3<f64>,
    /// `[n_chains, n_draws]`
    pub(crate) log_probs: Array2<f64>,
    pub(crate) accept_rates: Vec<f64>,
    pub(crate) scales: Vec<f64>,
    pub(crate) n_burnin: usize,
    pub(crate) seed: u64,
}

impl Fit {
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    pub fn n_chains(&self) -> usize {
        self.draws.dim().0
    }

    /// Retained draws per chain.
    pub fn n_draws(&self) -> usize {
        self.draws.dim().1
    }

    pub fn n_burnin(&self) -> usize {
        self.n_burnin
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// `[n_chains, n_draws, n_params]` array of all retained draws.
    pub fn draws(&self) -> &Array3<f64> {
        &self.draws
    }

    /// `[n_chains, n_draws]` log-density (`lp__`) of every retained draw.
    pub fn log_probs(&self) -> &Array2<f64> {
        &self.log_probs
    }

    /// Acceptance rate of each chain after burn-in.
    pub fn accept_rates(&self) -> &[f64] {
        &self.accept_rates
    }

    /// Proposal scale each chain settled on.
    pub fn proposal_scales(&self) -> &[f64] {
        &self.scales
    }

    fn param_index(&self, name: &str) -> Result<usize> {
        self.param_names
            .iter()
            .position(|p| p == name)
            .ok_or_else(|| Error::UnknownParameter(name.to_string()))
    }

    fn param_view(&self, name: &str) -> Result<ArrayView2<'_, f64>> {
        if name == LP_NAME {
            return Ok(self.log_probs.view());
        }
        let idx = self.param_index(name)?;
        Ok(self.draws.index_axis(Axis(2), idx))
    }

    /// Retained draws of `name`, chains concatenated in chain order.
    ///
    /// `lp__` is accepted as a name for the log-density.
    pub fn extract(&self, name: &str) -> Result<Vec<f64>> {
        Ok(self.param_view(name)?.iter().copied().collect())
    }

    /// Retained draws of `name`, one vector per chain.
    pub fn extract_chains(&self, name: &str) -> Result<Vec<Vec<f64>>> {
        Ok(self
            .param_view(name)?
            .outer_iter()
            .map(|chain| chain.to_vec())
            .collect())
    }

    pub fn summary(&self) -> FitSummary {
        let rows = self
            .param_names
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(LP_NAME))
            .filter_map(|name| self.param_view(name).ok().map(|v| summarize(name, v)))
            .collect();
        FitSummary {
            model_name: self.model_name.clone(),
            n_chains: self.n_chains(),
            n_burnin: self.n_burnin,
            n_draws: self.n_draws(),
            accept_rates: self.accept_rates.clone(),
            rows,
        }
    }
}

fn summarize(name: &str, draws: ArrayView2<f64>) -> SummaryRow {
    let flat: Vec<f64> = draws.iter().copied().collect();
    let (mean, sd) = stats::mean_sd(&flat);
    let mut sorted = flat;
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    let quantiles = SUMMARY_QUANTILES.map(|q| stats::quantile_sorted(&sorted, q));
    let n_eff = stats::ess(draws);
    SummaryRow {
        name: name.to_string(),
        mean,
        se_mean: sd / n_eff.sqrt(),
        sd,
        quantiles,
        n_eff,
        rhat: stats::split_rhat(draws),
    }
}

/// Summary statistics of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub name: String,
    pub mean: f64,
    /// Monte Carlo standard error of the mean.
    pub se_mean: f64,
    pub sd: f64,
    /// Values at [`SUMMARY_QUANTILES`].
    pub quantiles: [f64; 5],
    pub n_eff: f64,
    pub rhat: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitSummary {
    pub model_name: String,
    pub n_chains: usize,
    pub n_burnin: usize,
    pub n_draws: usize,
    pub accept_rates: Vec<f64>,
    pub rows: Vec<SummaryRow>,
}

impl FitSummary {
    pub fn row(&self, name: &str) -> Option<&SummaryRow> {
        self.rows.iter().find(|r| r.name == name)
    }
}

impl fmt::Display for FitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Inference for model: {}.", self.model_name)?;
        writeln!(
            f,
            "{} chains, each with iter={}; burn-in={}; total post-burn-in draws={}.",
            self.n_chains,
            self.n_burnin + self.n_draws,
            self.n_burnin,
            self.n_chains * self.n_draws
        )?;
        writeln!(f)?;
        write!(f, "{:>8} {:>8} {:>8} {:>8}", "", "mean", "se_mean", "sd")?;
        for label in QUANTILE_LABELS {
            write!(f, " {:>8}", label)?;
        }
        writeln!(f, " {:>8} {:>6}", "n_eff", "Rhat")?;
        for row in &self.rows {
            write!(
                f,
                "{:>8} {:>8.2} {:>8.2} {:>8.2}",
                row.name, row.mean, row.se_mean, row.sd
            )?;
            for q in row.quantiles {
                write!(f, " {:>8.2}", q)?;
            }
            writeln!(f, " {:>8.0} {:>6.2}", row.n_eff, row.rhat)?;
        }
        writeln!(f)?;
        let rates: Vec<String> = self.accept_rates.iter().map(|r| format!("{r:.3}")).collect();
        writeln!(f, "Acceptance rate per chain: {}.", rates.join(", "))?;
        write!(
            f,
            "Samples were drawn using random-walk Metropolis-Hastings. For each parameter, n_eff \
             is a crude measure of effective sample size, and Rhat is the potential scale \
             reduction factor on split chains (at convergence, Rhat=1)."
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    fn toy_fit() -> Fit {
        // 2 chains, 6 draws, params a and b; a = draw index, b = chain index.
        let draws = Array::from_shape_fn((2, 6, 2), |(c, i, p)| {
            if p == 0 {
                i as f64
            } else {
                c as f64 + 0.5 * (i % 2) as f64
            }
        });
        Fit {
            model_name: "toy".to_string(),
            param_names: vec!["a".to_string(), "b".to_string()],
            draws,
            log_probs: Array2::from_elem((2, 6), -1.0),
            accept_rates: vec![0.4, 0.5],
            scales: vec![1.0, 1.0],
            n_burnin: 3,
            seed: 0,
        }
    }

    #[test]
    fn extract_concatenates_chains_in_order() {
        let fit = toy_fit();
        assert_eq!(
            fit.extract("a").unwrap(),
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0]
        );
        let chains = fit.extract_chains("b").unwrap();
        assert_eq!(chains[1], vec![1.0, 1.5, 1.0, 1.5, 1.0, 1.5]);
    }

    #[test]
    fn extract_unknown_name_fails() {
        let fit = toy_fit();
        match fit.extract("theta") {
            Err(Error::UnknownParameter(name)) => assert_eq!(name, "theta"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn extract_lp() {
        let fit = toy_fit();
        assert_eq!(fit.extract(LP_NAME).unwrap(), vec![-1.0; 12]);
    }

    #[test]
    fn summary_has_row_per_parameter_and_lp() {
        let summary = toy_fit().summary();
        let names: Vec<&str> = summary.rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", LP_NAME]);
        let a = summary.row("a").unwrap();
        assert_eq!(a.mean, 2.5);
        assert_eq!(a.quantiles[2], 2.5);
    }

    #[test]
    fn summary_renders_header_and_rows() {
        let text = toy_fit().summary().to_string();
        assert!(text.starts_with("Inference for model: toy."));
        assert!(text.contains("2 chains, each with iter=9; burn-in=3; total post-burn-in draws=12."));
        assert!(text.contains("97.5%"));
        assert!(text.contains("Acceptance rate per chain: 0.400, 0.500."));
        assert_eq!(text.lines().filter(|l| l.trim_start().starts_with("lp__")).count(), 1);
    }
}
