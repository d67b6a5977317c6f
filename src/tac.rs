/*!
# Compartment Models for Time-Activity Curves

Simulation of PET tissue time-activity curves (TACs) from an input curve, and Bayesian
fitting of the rate constants with the random-walk Metropolis engine.

The simulators integrate the compartment ODEs with the trapezoidal rule at the sample times
of the input curve. Simulated values with magnitude below `1e-12` are set to zero.

## Example Usage

```rust
use kinetic_mcmc::tac::{fit_tac, simulate_one_tissue, TacData, TacModel};
use kinetic_mcmc::SamplerSettings;

let times: Vec<f64> = (0..20).map(|i| i as f64 * 0.5).collect();
let plasma: Vec<f64> = times.iter().map(|t| t * (-t).exp()).collect();
let tissue = simulate_one_tissue(&times, &plasma, 0.4, 0.3).unwrap();

let data = TacData::new(times, plasma, tissue);
let settings = SamplerSettings::default().with_chains(2).with_draws(200).set_seed(3);
let model = TacModel::OneTissue;
let fit = fit_tac(model, &data, &model.default_bounds(), &settings).unwrap();
assert_eq!(fit.param_names(), ["K1", "k2"]);
```
*/

use std::sync::Arc;

use crate::distributions::Target;
use crate::error::{Error, Result};
use crate::fit::Fit;
use crate::sampler::{sample_target, SamplerSettings};
use crate::transform::{self, Bounds};

const ZERO_CUTOFF: f64 = 1e-12;

/// Window starts at or below this value leave the fit window disabled.
const MIN_WINDOW_START: f64 = 0.1;

fn clip_small(v: f64) -> f64 {
    if v.abs() >= ZERO_CUTOFF {
        v
    } else {
        0.0
    }
}

fn check_curves(t: &[f64], input: &[f64]) -> Result<()> {
    if t.len() < 2 {
        return Err(Error::Simulation(format!(
            "at least 2 samples are required, got {}",
            t.len()
        )));
    }
    if t.len() != input.len() {
        return Err(Error::Simulation(format!(
            "{} sample times but {} input values",
            t.len(),
            input.len()
        )));
    }
    Ok(())
}

/**
Simulates the tissue TAC of the two-tissue compartment model

\[
\frac{dC_1}{dt} = K_1 C_a - (k_2 + k_3) C_1 + k_4 C_2, \qquad
\frac{dC_2}{dt} = k_3 C_1 - k_4 C_2
\]

at the times `t` of the plasma curve `ca`, returning `C_1 + C_2`.

Fails if there are fewer than two samples, the curves differ in length, `k1` is negative
or the times decrease.
*/
pub fn simulate_two_tissue(
    t: &[f64],
    ca: &[f64],
    k1: f64,
    k2: f64,
    k3: f64,
    k4: f64,
) -> Result<Vec<f64>> {
    check_curves(t, ca)?;
    if k1 < 0.0 {
        return Err(Error::Simulation(format!("K1 must be non-negative, got {k1}")));
    }

    let mut ct = Vec::with_capacity(t.len());
    let mut t_last = t[0].min(0.0);
    let (mut cai, mut ca_last) = (0.0, 0.0);
    let (mut ct1, mut ct1i, mut ct2, mut ct2i) = (0.0, 0.0, 0.0, 0.0);
    for (i, (&ti, &cai_now)) in t.iter().zip(ca).enumerate() {
        let dt2 = 0.5 * (ti - t_last);
        if dt2 < 0.0 {
            return Err(Error::Simulation(format!(
                "sample times decrease at index {i}"
            )));
        }
        if dt2 > 0.0 {
            cai += (cai_now + ca_last) * dt2;
            let r = 1.0 + k4 * dt2;
            let u = ct1i + dt2 * ct1;
            let v = ct2i + dt2 * ct2;
            let ct1_next =
                (k1 * cai - (k2 + k3 / r) * u + (k4 / r) * v) / (1.0 + dt2 * (k2 + k3 / r));
            let ct1i_next = ct1i + dt2 * (ct1 + ct1_next);
            let ct2_next = (k3 * ct1i_next - k4 * v) / r;
            ct2i += dt2 * (ct2 + ct2_next);
            ct1 = ct1_next;
            ct1i = ct1i_next;
            ct2 = ct2_next;
        }
        ct.push(clip_small(ct1 + ct2));
        t_last = ti;
        ca_last = cai_now;
    }
    Ok(ct)
}

/// One-tissue compartment model, `dC/dt = K1 Ca - k2 C`.
pub fn simulate_one_tissue(t: &[f64], ca: &[f64], k1: f64, k2: f64) -> Result<Vec<f64>> {
    simulate_two_tissue(t, ca, k1, k2, 0.0, 0.0)
}

/// Simplified reference tissue model: tissue TAC from the reference region TAC `cr`,
/// with `r1 = K1/K1'` and binding potential `bp`.
pub fn simulate_srtm(t: &[f64], cr: &[f64], r1: f64, k2: f64, bp: f64) -> Result<Vec<f64>> {
    check_curves(t, cr)?;
    let k2a = k2 / (1.0 + bp);

    let mut ct = Vec::with_capacity(t.len());
    let mut t_last = t[0].min(0.0);
    let (mut cri, mut cr_last) = (0.0, 0.0);
    let (mut ct_last, mut cti) = (0.0, 0.0);
    for (i, (&ti, &cr_now)) in t.iter().zip(cr).enumerate() {
        let dt2 = 0.5 * (ti - t_last);
        if dt2 < 0.0 {
            return Err(Error::Simulation(format!(
                "sample times decrease at index {i}"
            )));
        }
        let mut value = ct_last;
        if dt2 > 0.0 {
            cri += (cr_now + cr_last) * dt2;
            value = (r1 * cr_now + k2 * cri - k2a * (cti + dt2 * ct_last)) / (1.0 + dt2 * k2a);
            cti += dt2 * (ct_last + value);
        }
        let value = if value.is_nan() { 0.0 } else { clip_small(value) };
        ct.push(value);
        t_last = ti;
        cr_last = cr_now;
        ct_last = value;
    }
    Ok(ct)
}

/// Full reference tissue model: a free and a specifically bound compartment driven by the
/// reference region TAC `cr`, with `r1 = K1/K1'`.
pub fn simulate_rtcm(
    t: &[f64],
    cr: &[f64],
    r1: f64,
    k2: f64,
    k3: f64,
    k4: f64,
) -> Result<Vec<f64>> {
    check_curves(t, cr)?;

    let mut ct = Vec::with_capacity(t.len());
    let mut t_last = t[0].min(0.0);
    let (mut cri, mut cr_last) = (0.0, 0.0);
    let (mut cf, mut cfi) = (0.0, 0.0);
    let (mut cb, mut cbi) = (0.0, 0.0);
    for (i, (&ti, &cr_now)) in t.iter().zip(cr).enumerate() {
        let dt2 = 0.5 * (ti - t_last);
        if dt2 < 0.0 {
            return Err(Error::Simulation(format!(
                "sample times decrease at index {i}"
            )));
        }
        if dt2 > 0.0 {
            cri += (cr_now + cr_last) * dt2;
            let f = cfi + dt2 * cf;
            let b = cbi + dt2 * cb;
            let w = k2 + k3 + k2 * k4 * dt2;
            let cf_next = ((1.0 + k4 * dt2) * (r1 * cr_now + k2 * cri) + k4 * b - w * f)
                / (1.0 + dt2 * (w + k4));
            let cfi_next = cfi + dt2 * (cf + cf_next);
            let cb_next = (k3 * cfi_next - k4 * b) / (1.0 + k4 * dt2);
            cbi += dt2 * (cb + cb_next);
            cf = cf_next;
            cfi = cfi_next;
            cb = cb_next;
        }
        ct.push(clip_small(cf + cb));
        t_last = ti;
        cr_last = cr_now;
    }
    Ok(ct)
}

/// Kinetic model fitted by [`fit_tac`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TacModel {
    /// Parameters `K1, k2`; input is the plasma curve.
    OneTissue,
    /// Parameters `K1, k2, k3, k4`; input is the plasma curve.
    TwoTissue,
    /// Parameters `R1, k2, BP`; input is a reference region curve.
    Srtm,
    /// Parameters `R1, k2, k3, k4`; input is a reference region curve.
    Rtcm,
}

impl TacModel {
    pub fn name(&self) -> &'static str {
        match self {
            TacModel::OneTissue => "tac_1tcm",
            TacModel::TwoTissue => "tac_2tcm",
            TacModel::Srtm => "tac_srtm",
            TacModel::Rtcm => "tac_rtcm",
        }
    }

    pub fn param_names(&self) -> &'static [&'static str] {
        match self {
            TacModel::OneTissue => &["K1", "k2"],
            TacModel::TwoTissue => &["K1", "k2", "k3", "k4"],
            TacModel::Srtm => &["R1", "k2", "BP"],
            TacModel::Rtcm => &["R1", "k2", "k3", "k4"],
        }
    }

    pub fn n_params(&self) -> usize {
        self.param_names().len()
    }

    /// Physiologically plausible bounds, in 1/min.
    pub fn default_bounds(&self) -> Vec<Bounds> {
        match self {
            TacModel::OneTissue => vec![Bounds::new(0.0, 2.0), Bounds::new(0.0, 1.0)],
            TacModel::TwoTissue => vec![
                Bounds::new(0.0, 2.0),
                Bounds::new(0.0, 1.0),
                Bounds::new(0.0, 1.0),
                Bounds::new(0.0, 1.0),
            ],
            TacModel::Srtm => vec![
                Bounds::new(0.0, 5.0),
                Bounds::new(0.0, 1.0),
                Bounds::new(0.0, 10.0),
            ],
            TacModel::Rtcm => vec![
                Bounds::new(0.0, 5.0),
                Bounds::new(0.0, 1.0),
                Bounds::new(0.0, 1.0),
                Bounds::new(0.0, 1.0),
            ],
        }
    }

    /// Tissue curve for constrained parameter values `k`.
    pub fn simulate(&self, t: &[f64], input: &[f64], k: &[f64]) -> Result<Vec<f64>> {
        if k.len() != self.n_params() {
            return Err(Error::Simulation(format!(
                "{} parameters given, model needs {}",
                k.len(),
                self.n_params()
            )));
        }
        match self {
            TacModel::OneTissue => simulate_one_tissue(t, input, k[0], k[1]),
            TacModel::TwoTissue => simulate_two_tissue(t, input, k[0], k[1], k[2], k[3]),
            TacModel::Srtm => simulate_srtm(t, input, k[0], k[1], k[2]),
            TacModel::Rtcm => simulate_rtcm(t, input, k[0], k[1], k[2], k[3]),
        }
    }
}

/// Quadratic penalty pulling the rate constants towards `values`.
#[derive(Debug, Clone, PartialEq)]
pub struct TacPrior {
    pub values: Vec<f64>,
    pub lambda: f64,
}

/// Measured curves to fit.
#[derive(Debug, Clone, PartialEq)]
pub struct TacData {
    pub times: Vec<f64>,
    /// Input curve: plasma, or the reference region for [`TacModel::Srtm`] and
    /// [`TacModel::Rtcm`].
    pub plasma: Vec<f64>,
    pub tissue: Vec<f64>,
    pub weights: Vec<f64>,
    /// `(tstart, tstop)`; frames strictly inside are fitted when `tstart > 0.1`.
    pub window: Option<(f64, f64)>,
    pub prior: Option<TacPrior>,
}

impl TacData {
    /// Unit weights, no window and no prior.
    pub fn new(times: Vec<f64>, plasma: Vec<f64>, tissue: Vec<f64>) -> Self {
        let weights = vec![1.0; times.len()];
        Self {
            times,
            plasma,
            tissue,
            weights,
            window: None,
            prior: None,
        }
    }

    pub fn with_weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_window(mut self, tstart: f64, tstop: f64) -> Self {
        self.window = Some((tstart, tstop));
        self
    }

    pub fn with_prior(mut self, values: Vec<f64>, lambda: f64) -> Self {
        self.prior = Some(TacPrior { values, lambda });
        self
    }

    pub fn validate(&self) -> Result<()> {
        let n = self.times.len();
        if n < 2 {
            return Err(Error::InvalidData(format!(
                "at least 2 frames are required, got {n}"
            )));
        }
        for (name, len) in [
            ("plasma", self.plasma.len()),
            ("tissue", self.tissue.len()),
            ("weights", self.weights.len()),
        ] {
            if len != n {
                return Err(Error::InvalidData(format!(
                    "{n} frame times but {len} {name} values"
                )));
            }
        }
        if let Some(w) = self.weights.iter().find(|w| !(**w >= 0.0 && w.is_finite())) {
            return Err(Error::InvalidData(format!("invalid frame weight {w}")));
        }
        Ok(())
    }

    /// Range of frames entering the fit.
    pub fn frames(&self) -> std::ops::Range<usize> {
        let n = self.times.len();
        match self.window {
            Some((tstart, tstop)) if tstart > MIN_WINDOW_START => {
                let start = self.times.iter().position(|&t| t > tstart).unwrap_or(0);
                let stop = self
                    .times
                    .iter()
                    .rposition(|&t| t < tstop)
                    .map_or(n, |i| i + 1);
                start..stop.max(start)
            }
            _ => 0..n,
        }
    }
}

/// Log density of a kinetic model on the unconstrained scale of its bounds.
#[derive(Debug, Clone)]
pub struct TacTarget {
    model: TacModel,
    data: Arc<TacData>,
    bounds: Vec<Bounds>,
    frames: std::ops::Range<usize>,
}

impl TacTarget {
    pub fn new(model: TacModel, data: &TacData, bounds: &[Bounds]) -> Result<Self> {
        data.validate()?;
        if bounds.len() != model.n_params() {
            return Err(Error::InvalidData(format!(
                "{} bounds given, {} has {} parameters",
                bounds.len(),
                model.name(),
                model.n_params()
            )));
        }
        if let Some(b) = bounds.iter().find(|b| !(b.lower < b.upper)) {
            return Err(Error::InvalidData(format!(
                "lower bound {} is not below upper bound {}",
                b.lower, b.upper
            )));
        }
        if let Some(prior) = &data.prior {
            if prior.values.len() != model.n_params() {
                return Err(Error::InvalidData(format!(
                    "prior has {} values, model has {} parameters",
                    prior.values.len(),
                    model.n_params()
                )));
            }
        }
        Ok(Self {
            model,
            data: Arc::new(data.clone()),
            bounds: bounds.to_vec(),
            frames: data.frames(),
        })
    }

    /// Log density at constrained rate constants `k`.
    pub fn log_density(&self, k: &[f64]) -> f64 {
        let data = &self.data;
        let sim = match self.model.simulate(&data.times, &data.plasma, k) {
            Ok(sim) => sim,
            Err(_) => return f64::NEG_INFINITY,
        };
        let mut lp: f64 = -self
            .frames
            .clone()
            .map(|i| data.weights[i] * (sim[i] - data.tissue[i]).powi(2))
            .sum::<f64>();
        if let Some(prior) = &data.prior {
            lp -= prior.lambda
                * k.iter()
                    .zip(&prior.values)
                    .map(|(k, p)| (k - p).powi(2))
                    .sum::<f64>();
        }
        lp
    }
}

impl Target<f64> for TacTarget {
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
        let k = transform::constrain_all(&self.bounds, theta);
        self.log_density(&k) + transform::log_jacobian_all(&self.bounds, theta)
    }
}

/// Samples the posterior of the rate constants of `model` given `data`, with each parameter
/// confined to its entry of `bounds`.
pub fn fit_tac(
    model: TacModel,
    data: &TacData,
    bounds: &[Bounds],
    settings: &SamplerSettings,
) -> Result<Fit> {
    let target = TacTarget::new(model, data, bounds)?;
    let names = model.param_names().iter().map(|s| s.to_string()).collect();
    sample_target(target, bounds, names, model.name(), settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn grid(n: usize, dt: f64) -> Vec<f64> {
        (0..n).map(|i| i as f64 * dt).collect()
    }

    fn bolus(t: &[f64]) -> Vec<f64> {
        t.iter().map(|t| 5.0 * t * (-t).exp()).collect()
    }

    #[test]
    fn one_tissue_is_two_tissue_without_binding() {
        let t = grid(40, 0.25);
        let ca = bolus(&t);
        let one = simulate_one_tissue(&t, &ca, 0.3, 0.15).unwrap();
        let two = simulate_two_tissue(&t, &ca, 0.3, 0.15, 0.0, 0.0).unwrap();
        assert_eq!(one, two);
    }

    #[test]
    fn constant_input_matches_analytic_response() {
        let (k1, k2) = (0.6, 0.3);
        let t = grid(1001, 0.01);
        let ca = vec![1.0; t.len()];
        let ct = simulate_one_tissue(&t, &ca, k1, k2).unwrap();
        // The first sample has zero width, so the input is effectively switched on at t = 0.
        for (&ti, &ci) in t.iter().zip(&ct).skip(1) {
            let exact = k1 / k2 * (1.0 - (-k2 * ti).exp());
            assert_abs_diff_eq!(ci, exact, epsilon = 5e-3);
        }
    }

    #[test]
    fn binding_increases_uptake() {
        let t = grid(40, 0.5);
        let ca = bolus(&t);
        let free = simulate_two_tissue(&t, &ca, 0.3, 0.2, 0.0, 0.0).unwrap();
        let bound = simulate_two_tissue(&t, &ca, 0.3, 0.2, 0.1, 0.01).unwrap();
        assert!(bound.last().unwrap() > free.last().unwrap());
    }

    #[test]
    fn simulation_rejects_bad_input() {
        let t = grid(5, 1.0);
        let ca = vec![1.0; 5];
        assert!(matches!(
            simulate_two_tissue(&t[..1], &ca[..1], 0.1, 0.1, 0.0, 0.0),
            Err(Error::Simulation(_))
        ));
        assert!(matches!(
            simulate_two_tissue(&t, &ca[..4], 0.1, 0.1, 0.0, 0.0),
            Err(Error::Simulation(_))
        ));
        assert!(matches!(
            simulate_two_tissue(&t, &ca, -0.1, 0.1, 0.0, 0.0),
            Err(Error::Simulation(_))
        ));
        let backwards = vec![0.0, 1.0, 3.0, 2.0, 4.0];
        assert!(matches!(
            simulate_two_tissue(&backwards, &ca, 0.1, 0.1, 0.0, 0.0),
            Err(Error::Simulation(_))
        ));
    }

    #[test]
    fn srtm_reproduces_reference_without_binding() {
        let t = grid(30, 0.5);
        let cr = bolus(&t);
        let ct = simulate_srtm(&t, &cr, 1.0, 0.2, 0.0).unwrap();
        for (a, b) in ct.iter().zip(&cr).skip(1) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn rtcm_without_bound_compartment_is_srtm() {
        let t = grid(40, 0.25);
        let cr = bolus(&t);
        let full = simulate_rtcm(&t, &cr, 0.8, 0.3, 0.0, 0.0).unwrap();
        let simplified = simulate_srtm(&t, &cr, 0.8, 0.3, 0.0).unwrap();
        for (a, b) in full.iter().zip(&simplified) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-10);
        }
    }

    #[test]
    fn rtcm_binding_retains_tracer() {
        let t = grid(40, 0.5);
        let cr = bolus(&t);
        let free = simulate_rtcm(&t, &cr, 1.0, 0.3, 0.0, 0.0).unwrap();
        let bound = simulate_rtcm(&t, &cr, 1.0, 0.3, 0.1, 0.02).unwrap();
        assert!(bound[39] > free[39]);
        assert_eq!(
            TacModel::Rtcm.simulate(&t, &cr, &[1.0, 0.3, 0.1, 0.02]).unwrap(),
            bound
        );
        assert!(simulate_rtcm(&[0.0, 2.0, 1.0], &[0.0; 3], 1.0, 0.3, 0.1, 0.02).is_err());
    }

    #[test]
    fn window_selects_interior_frames() {
        let t = grid(10, 1.0);
        let data = TacData::new(t.clone(), vec![0.0; 10], vec![0.0; 10]);
        assert_eq!(data.frames(), 0..10);
        assert_eq!(data.clone().with_window(2.5, 6.5).frames(), 3..7);
        // Starts at or below 0.1 disable the window.
        assert_eq!(data.with_window(0.05, 6.5).frames(), 0..10);
    }

    #[test]
    fn target_peaks_at_true_parameters() {
        let t = grid(30, 0.5);
        let ca = bolus(&t);
        let truth = [0.5, 0.2];
        let tissue = simulate_one_tissue(&t, &ca, truth[0], truth[1]).unwrap();
        let data = TacData::new(t, ca, tissue);
        let target =
            TacTarget::new(TacModel::OneTissue, &data, &TacModel::OneTissue.default_bounds())
                .unwrap();
        assert_eq!(target.log_density(&truth), 0.0);
        assert!(target.log_density(&[0.6, 0.2]) < 0.0);
    }

    #[test]
    fn prior_penalizes_distance() {
        let t = grid(10, 1.0);
        let ca = bolus(&t);
        let tissue = simulate_one_tissue(&t, &ca, 0.5, 0.2).unwrap();
        let data = TacData::new(t, ca, tissue).with_prior(vec![0.4, 0.2], 2.0);
        let target =
            TacTarget::new(TacModel::OneTissue, &data, &TacModel::OneTissue.default_bounds())
                .unwrap();
        assert_abs_diff_eq!(target.log_density(&[0.5, 0.2]), -0.02, epsilon = 1e-12);
    }

    #[test]
    fn target_rejects_mismatched_bounds() {
        let data = TacData::new(grid(5, 1.0), vec![1.0; 5], vec![1.0; 5]);
        let result = TacTarget::new(TacModel::TwoTissue, &data, &[Bounds::unit()]);
        assert!(matches!(result, Err(Error::InvalidData(_))));
    }

    #[test]
    fn fit_recovers_one_tissue_rates() {
        let t = grid(30, 0.5);
        let ca = bolus(&t);
        let tissue = simulate_one_tissue(&t, &ca, 0.5, 0.2).unwrap();
        let data = TacData::new(t, ca, tissue).with_weights(vec![100.0; 30]);
        let settings = SamplerSettings::default()
            .with_chains(2)
            .with_burnin(2000)
            .with_draws(2000)
            .set_seed(17);
        let model = TacModel::OneTissue;
        let fit = fit_tac(model, &data, &model.default_bounds(), &settings).unwrap();
        let summary = fit.summary();
        assert_abs_diff_eq!(summary.row("K1").unwrap().quantiles[2], 0.5, epsilon = 0.1);
        assert_abs_diff_eq!(summary.row("k2").unwrap().quantiles[2], 0.2, epsilon = 0.1);
    }
}
