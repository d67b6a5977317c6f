//! End-to-end tests of the legacy `rwmh_tac_2tpc` entry point.

use kinetic_mcmc::legacy::{rwmh_tac_2tpc_with, DEBUG_SUMMARY_FILE};
use kinetic_mcmc::{compile, compile_default, Error, ModelSpec, SamplerSettings, TacArguments};

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn settings() -> SamplerSettings {
        SamplerSettings::default().set_seed(2024)
    }

    fn placeholder_args() -> TacArguments {
        TacArguments {
            tissue_c: vec![0.0; 24],
            plasma_c: vec![1.0; 24],
            plasma_t: (0..24).map(|i| i as f64).collect(),
            weight: vec![1.0; 24],
            initial_k: vec![0.1, 0.1, 0.05, 0.01],
            lb: vec![0.0; 4],
            ub: vec![1.0; 4],
            par_scale: 0.1,
            step_size: 0.01,
            n_burnin: 500,
            n_draws: 500,
        }
    }

    #[test]
    fn test_compile_then_rwmh() {
        let sm = compile_default().unwrap();
        assert_eq!(sm.param_names(), vec!["theta"]);

        let dir = tempdir().unwrap();
        let path = dir.path().join(DEBUG_SUMMARY_FILE);
        let theta = rwmh_tac_2tpc_with(&sm, &placeholder_args(), &settings(), &path).unwrap();

        assert_eq!(theta.len(), 4 * 1000);
        assert!(theta.iter().all(|&t| (0.0..=1.0).contains(&t)));

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("Inference for model:").count(), 1);
        assert!(text.contains("theta"));
    }

    #[test]
    fn test_repeated_calls_append() {
        let sm = compile_default().unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join(DEBUG_SUMMARY_FILE);
        let fast = SamplerSettings::default()
            .with_burnin(100)
            .with_draws(100)
            .set_seed(1);

        for expected in 1..=3 {
            rwmh_tac_2tpc_with(&sm, &placeholder_args(), &fast, &path).unwrap();
            let text = fs::read_to_string(&path).unwrap();
            assert_eq!(text.matches("Inference for model:").count(), expected);
        }
    }

    #[test]
    fn test_output_does_not_depend_on_arguments() {
        let sm = compile_default().unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join(DEBUG_SUMMARY_FILE);

        let a = rwmh_tac_2tpc_with(&sm, &placeholder_args(), &settings(), &path).unwrap();
        let b = rwmh_tac_2tpc_with(&sm, &TacArguments::default(), &settings(), &path).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_renamed_parameter_fails() {
        let mut spec = ModelSpec::bernoulli_jeffreys();
        spec.params[0].name = "phi".to_string();
        spec.priors[0].param = "phi".to_string();
        spec.likelihood.probability = "phi".to_string();
        let sm = compile(&spec).unwrap();

        let dir = tempdir().unwrap();
        let result = rwmh_tac_2tpc_with(
            &sm,
            &placeholder_args(),
            &settings(),
            dir.path().join(DEBUG_SUMMARY_FILE),
        );
        match result {
            Err(Error::UnknownParameter(name)) => assert_eq!(name, "theta"),
            other => panic!("expected UnknownParameter, got {other:?}"),
        }
    }
}
