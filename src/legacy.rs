//! Compatibility entry point with the call shape of the two-tissue RWMH fit.
//!
//! Its kinetic arguments are accepted for call compatibility only. The entry point samples
//! the compiled Bernoulli model on the reference dataset and appends the fit summary to
//! [`DEBUG_SUMMARY_FILE`]. Use [`crate::sample`] or [`crate::tac::fit_tac`] for
//! explicitly configured runs.

use std::path::Path;

use crate::error::Result;
use crate::io::SummarySink;
use crate::model::{BernoulliData, CompiledModel};
use crate::sampler::{sample, SamplerSettings};

/// Summary file written by [`rwmh_tac_2tpc`], relative to the working directory.
pub const DEBUG_SUMMARY_FILE: &str = "debugstan.txt";

const EXTRACTED_PARAM: &str = "theta";

/// Kinetic-model arguments of [`rwmh_tac_2tpc`]. None of them affect the result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TacArguments {
    pub tissue_c: Vec<f64>,
    pub plasma_c: Vec<f64>,
    pub plasma_t: Vec<f64>,
    pub weight: Vec<f64>,
    pub initial_k: Vec<f64>,
    pub lb: Vec<f64>,
    pub ub: Vec<f64>,
    pub par_scale: f64,
    pub step_size: f64,
    pub n_burnin: usize,
    pub n_draws: usize,
}

/// Samples `sm` on [`BernoulliData::reference`] with default settings, appends the summary
/// to [`DEBUG_SUMMARY_FILE`] and returns the draws of `theta`.
///
/// Fails with [`crate::Error::UnknownParameter`] if `sm` has no parameter named `theta`.
pub fn rwmh_tac_2tpc(sm: &CompiledModel, args: &TacArguments) -> Result<Vec<f64>> {
    rwmh_tac_2tpc_with(sm, args, &SamplerSettings::default(), DEBUG_SUMMARY_FILE)
}

/// [`rwmh_tac_2tpc`] with explicit sampler settings and summary path.
///
/// The summary file is only opened once sampling has succeeded.
pub fn rwmh_tac_2tpc_with<P: AsRef<Path>>(
    sm: &CompiledModel,
    _args: &TacArguments,
    settings: &SamplerSettings,
    summary_path: P,
) -> Result<Vec<f64>> {
    let fit = sample(sm, &BernoulliData::reference(), settings)?;
    SummarySink::append(summary_path)?.write_summary(&fit.summary())?;
    fit.extract(EXTRACTED_PARAM)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::{compile, compile_default, ModelSpec};
    use std::fs;
    use tempfile::tempdir;

    fn settings() -> SamplerSettings {
        SamplerSettings::default()
            .with_chains(2)
            .with_burnin(200)
            .with_draws(250)
            .set_seed(99)
    }

    #[test]
    fn returns_theta_draws_and_appends_summary() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DEBUG_SUMMARY_FILE);
        let sm = compile_default().unwrap();

        let theta =
            rwmh_tac_2tpc_with(&sm, &TacArguments::default(), &settings(), &path).unwrap();
        assert_eq!(theta.len(), 500);
        assert!(theta.iter().all(|&t| (0.0..=1.0).contains(&t)));

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("Inference for model:").count(), 1);
    }

    #[test]
    fn kinetic_arguments_are_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DEBUG_SUMMARY_FILE);
        let sm = compile_default().unwrap();
        let args = TacArguments {
            tissue_c: vec![1.0, 2.0, 3.0],
            plasma_c: vec![4.0, 5.0],
            plasma_t: vec![0.0, 1.0],
            weight: vec![1.0],
            initial_k: vec![0.1, 0.1, 0.01, 0.01],
            lb: vec![0.0; 4],
            ub: vec![1.0; 4],
            par_scale: 123.0,
            step_size: 0.5,
            n_burnin: 7,
            n_draws: 3,
        };
        let a = rwmh_tac_2tpc_with(&sm, &TacArguments::default(), &settings(), &path).unwrap();
        let b = rwmh_tac_2tpc_with(&sm, &args, &settings(), &path).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn model_without_theta_fails() {
        let dir = tempdir().unwrap();
        let mut spec = ModelSpec::bernoulli_jeffreys();
        spec.params[0].name = "p".to_string();
        spec.priors[0].param = "p".to_string();
        spec.likelihood.probability = "p".to_string();
        let sm = compile(&spec).unwrap();

        let result = rwmh_tac_2tpc_with(
            &sm,
            &TacArguments::default(),
            &settings(),
            dir.path().join(DEBUG_SUMMARY_FILE),
        );
        assert!(matches!(result, Err(Error::UnknownParameter(name)) if name == "theta"));
    }

    #[test]
    fn failed_run_leaves_no_summary_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DEBUG_SUMMARY_FILE);
        let sm = compile_default().unwrap();

        let result = rwmh_tac_2tpc_with(
            &sm,
            &TacArguments::default(),
            &settings().with_chains(0),
            &path,
        );
        assert!(matches!(result, Err(Error::Sampling(_))));
        assert!(!path.exists());
    }
}
