//! Random-walk Metropolis-Hastings sampling of a compiled Bernoulli model and of PET
//! compartment models.
//!
//! ```rust
//! use kinetic_mcmc::{compile_default, sample, BernoulliData, SamplerSettings};
//!
//! let sm = compile_default().unwrap();
//! let settings = SamplerSettings::default().set_seed(42);
//! let fit = sample(&sm, &BernoulliData::reference(), &settings).unwrap();
//! let theta = fit.extract("theta").unwrap();
//! assert_eq!(theta.len(), 4 * 1000);
//! println!("{}", fit.summary());
//! ```

pub mod adapt;
pub mod core;
pub mod distributions;
pub mod error;
pub mod fit;
pub mod io;
pub mod legacy;
pub mod metropolis_hastings;
pub mod model;
pub mod sampler;
pub mod stats;
pub mod tac;
pub mod transform;

pub use error::{Error, Result};
pub use fit::{Fit, FitSummary, SummaryRow};
pub use io::SummarySink;
pub use legacy::{rwmh_tac_2tpc, TacArguments};
pub use model::{compile, compile_default, BernoulliData, CompiledModel, ModelSpec};
pub use sampler::{sample, sample_with_sink, Init, SamplerSettings};
