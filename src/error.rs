//! Error type shared by model compilation, sampling and posterior extraction.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The model specification is malformed.
    #[error("model compilation failed: {0}")]
    Compilation(String),

    /// The dataset does not match the shape the model declares.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A chain could not be initialized or diverged.
    #[error("sampling failed: {0}")]
    Sampling(String),

    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),

    /// The compartment model simulation rejected its inputs.
    #[error("TAC simulation failed: {0}")]
    Simulation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[cfg(feature = "csv")]
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
