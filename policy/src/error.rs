use esm_interface::LedgerError;
use thiserror::Error;

/// Failures surfacing from policy operations.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Caller misuse. Fatal, never retried.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The chain could not be reached or answered unusably.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// An elector get-method answered with a stack the policy cannot decode.
    #[error("elector returned unusable data: {0}")]
    Elector(String),

    /// The funding strategy could not complete its submission path.
    #[error("funding: {0}")]
    Funding(String),

    /// The election-record store failed.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
