/*!
# Model specification and compilation

A [`ModelSpec`] is a typed description of a small Bayesian model: the data it expects,
its bounded scalar parameters, a prior per parameter and a Bernoulli likelihood.
[`compile`] checks the description for internal consistency and produces a
[`CompiledModel`], an opaque handle that is bound to a dataset only at sampling time.

```rust
use kinetic_mcmc::model::{compile_default, BernoulliData};

let sm = compile_default().unwrap();
assert_eq!(sm.param_names(), vec!["theta"]);

let bound = sm.bind(&BernoulliData::reference()).unwrap();
assert_eq!(bound.dim(), 1);
```
*/

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::distributions::{bernoulli_ln_likelihood, beta_unnorm_ln_pdf, Target};
use crate::error::{Error, Result};
use crate::transform::{self, Bounds};

/// Declaration of an entry of the `data` block.
#[derive(Debug, Clone, PartialEq)]
pub enum DataDecl {
    /// Non-negative integer scalar, e.g. the number of trials.
    Count { name: String },
    /// Integer array whose length is given by a declared count.
    IntArray {
        name: String,
        len: String,
        lower: i64,
        upper: i64,
    },
}

impl DataDecl {
    pub fn name(&self) -> &str {
        match self {
            DataDecl::Count { name } | DataDecl::IntArray { name, .. } => name,
        }
    }
}

/// A scalar parameter and its support.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: String,
    pub bounds: Bounds,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriorKind {
    Beta { alpha: f64, beta: f64 },
    /// Flat over the parameter's support.
    Uniform,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prior {
    pub param: String,
    pub kind: PriorKind,
}

/// `outcome[n] ~ bernoulli(probability)` for every observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Likelihood {
    pub outcome: String,
    pub probability: String,
}

/// Typed description of a Bernoulli model with scalar parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub name: String,
    pub data: Vec<DataDecl>,
    pub params: Vec<ParamDecl>,
    pub priors: Vec<Prior>,
    pub likelihood: Likelihood,
}

impl ModelSpec {
    /// Bernoulli trials with a Jeffreys `Beta(0.5, 0.5)` prior on `theta`.
    pub fn bernoulli_jeffreys() -> Self {
        Self {
            name: "bernoulli_jeffreys".to_string(),
            data: vec![
                DataDecl::Count {
                    name: "N".to_string(),
                },
                DataDecl::IntArray {
                    name: "y".to_string(),
                    len: "N".to_string(),
                    lower: 0,
                    upper: 1,
                },
            ],
            params: vec![ParamDecl {
                name: "theta".to_string(),
                bounds: Bounds::unit(),
            }],
            priors: vec![Prior {
                param: "theta".to_string(),
                kind: PriorKind::Beta {
                    alpha: 0.5,
                    beta: 0.5,
                },
            }],
            likelihood: Likelihood {
                outcome: "y".to_string(),
                probability: "theta".to_string(),
            },
        }
    }
}

fn fmt_bound(b: f64) -> String {
    if b.fract() == 0.0 {
        format!("{b:.0}")
    } else {
        format!("{b}")
    }
}

impl fmt::Display for ModelSpec {
    /// Renders the model as Stan-like code.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "data {{")?;
        for decl in &self.data {
            match decl {
                DataDecl::Count { name } => writeln!(f, "  int<lower=0> {name};")?,
                DataDecl::IntArray {
                    name,
                    len,
                    lower,
                    upper,
                } => writeln!(f, "  int<lower={lower},upper={upper}> {name}[{len}];")?,
            }
        }
        writeln!(f, "}}")?;
        writeln!(f, "parameters {{")?;
        for p in &self.params {
            let mut constraint = Vec::new();
            if p.bounds.lower.is_finite() {
                constraint.push(format!("lower={}", fmt_bound(p.bounds.lower)));
            }
            if p.bounds.upper.is_finite() {
                constraint.push(format!("upper={}", fmt_bound(p.bounds.upper)));
            }
            if constraint.is_empty() {
                writeln!(f, "  real {};", p.name)?;
            } else {
                writeln!(f, "  real<{}> {};", constraint.join(","), p.name)?;
            }
        }
        writeln!(f, "}}")?;
        writeln!(f, "model {{")?;
        for prior in &self.priors {
            match prior.kind {
                PriorKind::Beta { alpha, beta } => {
                    writeln!(f, "  {} ~ beta({alpha}, {beta});", prior.param)?
                }
                PriorKind::Uniform => writeln!(f, "  // {} ~ uniform over support", prior.param)?,
            }
        }
        writeln!(
            f,
            "  {} ~ bernoulli({});",
            self.likelihood.outcome, self.likelihood.probability
        )?;
        write!(f, "}}")
    }
}

#[derive(Debug)]
struct Compiled {
    spec: ModelSpec,
    params: Vec<ParamDecl>,
    /// Prior per parameter, in parameter order.
    priors: Vec<PriorKind>,
    /// Index of the likelihood's probability parameter.
    probability: usize,
}

/// Opaque, reusable handle produced by [`compile`].
///
/// Cloning is cheap; clones share the compiled representation.
#[derive(Debug, Clone)]
pub struct CompiledModel {
    inner: Arc<Compiled>,
}

/// Compiles `spec` into a sampler-ready handle.
///
/// Fails with [`Error::Compilation`] when the specification is inconsistent.
pub fn compile(spec: &ModelSpec) -> Result<CompiledModel> {
    let fail = |msg: String| Err(Error::Compilation(msg));

    if spec.params.is_empty() {
        return fail("model declares no parameters".to_string());
    }

    let mut data_names = HashSet::new();
    for decl in &spec.data {
        if !data_names.insert(decl.name()) {
            return fail(format!("data `{}` declared twice", decl.name()));
        }
    }
    for decl in &spec.data {
        if let DataDecl::IntArray {
            name,
            len,
            lower,
            upper,
        } = decl
        {
            let len_is_count = spec
                .data
                .iter()
                .any(|d| matches!(d, DataDecl::Count { name } if name == len));
            if !len_is_count {
                return fail(format!("length `{len}` of `{name}` is not a declared count"));
            }
            if lower > upper {
                return fail(format!("`{name}` has lower bound above upper bound"));
            }
        }
    }

    let mut param_names = HashSet::new();
    for p in &spec.params {
        if p.name.is_empty() {
            return fail("parameter with empty name".to_string());
        }
        if data_names.contains(p.name.as_str()) {
            return fail(format!("`{}` is declared as both data and parameter", p.name));
        }
        if !param_names.insert(p.name.as_str()) {
            return fail(format!("parameter `{}` declared twice", p.name));
        }
        if p.bounds.lower.is_nan() || p.bounds.upper.is_nan() || p.bounds.lower >= p.bounds.upper
        {
            return fail(format!(
                "parameter `{}` has empty support [{}, {}]",
                p.name, p.bounds.lower, p.bounds.upper
            ));
        }
    }

    let mut priors = Vec::with_capacity(spec.params.len());
    for p in &spec.params {
        let mut matching = spec.priors.iter().filter(|pr| pr.param == p.name);
        let prior = match (matching.next(), matching.next()) {
            (Some(prior), None) => prior,
            (None, _) => return fail(format!("parameter `{}` has no prior", p.name)),
            (Some(_), Some(_)) => return fail(format!("parameter `{}` has two priors", p.name)),
        };
        match prior.kind {
            PriorKind::Beta { alpha, beta } => {
                if !(alpha.is_finite() && alpha > 0.0 && beta.is_finite() && beta > 0.0) {
                    return fail(format!(
                        "beta({alpha}, {beta}) prior on `{}` needs positive finite shapes",
                        p.name
                    ));
                }
                if p.bounds.lower < 0.0 || p.bounds.upper > 1.0 {
                    return fail(format!(
                        "beta prior on `{}` requires bounds within [0, 1]",
                        p.name
                    ));
                }
            }
            PriorKind::Uniform => {
                if !(p.bounds.lower.is_finite() && p.bounds.upper.is_finite()) {
                    return fail(format!(
                        "uniform prior on `{}` requires finite bounds",
                        p.name
                    ));
                }
            }
        }
        priors.push(prior.kind);
    }
    if let Some(orphan) = spec
        .priors
        .iter()
        .find(|pr| !param_names.contains(pr.param.as_str()))
    {
        return fail(format!("prior on undeclared parameter `{}`", orphan.param));
    }

    let lik = &spec.likelihood;
    let probability = match spec.params.iter().position(|p| p.name == lik.probability) {
        Some(i) => i,
        None => {
            return fail(format!(
                "likelihood probability `{}` is not a parameter",
                lik.probability
            ))
        }
    };
    let p_bounds = spec.params[probability].bounds;
    if p_bounds.lower < 0.0 || p_bounds.upper > 1.0 {
        return fail(format!(
            "bernoulli probability `{}` must be constrained to [0, 1]",
            lik.probability
        ));
    }
    match spec.data.iter().find(|d| d.name() == lik.outcome) {
        Some(DataDecl::IntArray { lower, upper, .. }) => {
            if *lower < 0 || *upper > 1 {
                return fail(format!(
                    "bernoulli outcome `{}` must be bounded to [0, 1]",
                    lik.outcome
                ));
            }
        }
        _ => {
            return fail(format!(
                "likelihood outcome `{}` is not a declared data array",
                lik.outcome
            ))
        }
    }

    Ok(CompiledModel {
        inner: Arc::new(Compiled {
            spec: spec.clone(),
            params: spec.params.clone(),
            priors,
            probability,
        }),
    })
}

/// Compiles [`ModelSpec::bernoulli_jeffreys`].
pub fn compile_default() -> Result<CompiledModel> {
    compile(&ModelSpec::bernoulli_jeffreys())
}

impl CompiledModel {
    pub fn name(&self) -> &str {
        &self.inner.spec.name
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.inner.spec
    }

    pub fn parameters(&self) -> &[ParamDecl] {
        &self.inner.params
    }

    pub fn param_names(&self) -> Vec<&str> {
        self.inner.params.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn bounds(&self) -> Vec<Bounds> {
        self.inner.params.iter().map(|p| p.bounds).collect()
    }

    /// Binds a dataset, checking it against the declared data shape.
    pub fn bind(&self, data: &BernoulliData) -> Result<BoundModel> {
        data.validate()?;
        Ok(BoundModel {
            model: self.clone(),
            successes: data.successes(),
            trials: data.n,
        })
    }
}

/// Observations for the Bernoulli likelihood: `n` trials with outcomes `y`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BernoulliData {
    pub n: usize,
    pub y: Vec<u8>,
}

impl BernoulliData {
    pub fn new(y: Vec<u8>) -> Self {
        Self { n: y.len(), y }
    }

    /// The fixed 10-observation dataset `[0, 1, 0, 1, 0, 1, 0, 1, 1, 1]`.
    pub fn reference() -> Self {
        Self::new(vec![0, 1, 0, 1, 0, 1, 0, 1, 1, 1])
    }

    pub fn validate(&self) -> Result<()> {
        if self.y.len() != self.n {
            return Err(Error::InvalidData(format!(
                "N = {} but y has {} elements",
                self.n,
                self.y.len()
            )));
        }
        if let Some((i, v)) = self.y.iter().enumerate().find(|&(_, &v)| v > 1) {
            return Err(Error::InvalidData(format!("y[{i}] = {v} is not 0 or 1")));
        }
        Ok(())
    }

    pub fn successes(&self) -> usize {
        self.y.iter().filter(|&&v| v == 1).count()
    }
}

/// A compiled model with data attached.
///
/// As a [`Target`] it evaluates the log posterior on the unconstrained scale, including
/// the log-Jacobian of the bounds transform.
#[derive(Debug, Clone)]
pub struct BoundModel {
    model: CompiledModel,
    successes: usize,
    trials: usize,
}

impl BoundModel {
    pub fn dim(&self) -> usize {
        self.model.inner.params.len()
    }

    pub fn model(&self) -> &CompiledModel {
        &self.model
    }

    /// Log posterior (up to a constant) at constrained parameter values.
    ///
    /// `values` must hold one entry per parameter; any other length has zero density.
    pub fn log_density(&self, values: &[f64]) -> f64 {
        let inner = &self.model.inner;
        if values.len() != inner.params.len() {
            return f64::NEG_INFINITY;
        }
        let mut lp = 0.0;
        for ((p, prior), &v) in inner.params.iter().zip(&inner.priors).zip(values) {
            if !(v >= p.bounds.lower && v <= p.bounds.upper) {
                return f64::NEG_INFINITY;
            }
            if let PriorKind::Beta { alpha, beta } = *prior {
                lp += beta_unnorm_ln_pdf(v, alpha, beta);
            }
        }
        lp + bernoulli_ln_likelihood(self.successes, self.trials, values[inner.probability])
    }
}

impl Target<f64> for BoundModel {
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
        let bounds = self.model.bounds();
        let values = transform::constrain_all(&bounds, theta);
        self.log_density(&values) + transform::log_jacobian_all(&bounds, theta)
    }
}
