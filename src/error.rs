use thiserror::Error;

/// error types of the kinetics core
///
/// Construction problems (bad network topology, bad run parameters) are kept
/// distinct from numerical intractability so a caller can tell "bad input"
/// apart from "the solver could not meet its tolerance on this input".
#[derive(Debug, Error)]
pub enum KineticsError {
    /// structurally invalid reaction network, caught at construction
    #[error("invalid reaction network: {0}")]
    InvalidNetwork(String),
    /// invalid simulation parameters (duration, temperature, sample count)
    #[error("invalid simulation parameters: {0}")]
    InvalidParameters(String),
    /// the implicit integrator could not satisfy its error tolerance
    #[error("integration failed: {0}")]
    Integration(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
