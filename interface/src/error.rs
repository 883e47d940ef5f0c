use thiserror::Error;

/// Errors surfaced by a [`crate::LedgerService`] provider.
///
/// `Transport`, `Rpc` and `Console` are transient by nature and eligible for
/// bounded retry at the policy layer. `Unsupported` means the chosen provider
/// simply lacks the capability and must never be retried.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Networking or low-level protocol failure while talking to the node.
    #[error("ledger transport error: {0}")]
    Transport(String),

    /// The node answered, but with an application-level error.
    #[error("ledger rpc error: {0}")]
    Rpc(String),

    /// The administrative console executable failed or produced
    /// unparseable output.
    #[error("console error: {0}")]
    Console(String),

    /// The node answered successfully but the payload is not what the
    /// caller required (missing fields, wrong shape).
    #[error("malformed ledger response: {0}")]
    MalformedResponse(String),

    /// An account address failed the `<workchain>:<64 hex>` grammar.
    #[error("malformed account address: {0}")]
    MalformedAddress(String),

    /// The provider does not implement this capability. Fatal; callers must
    /// surface it instead of retrying.
    #[error("unsupported by this ledger provider: {0}")]
    Unsupported(&'static str),
}
