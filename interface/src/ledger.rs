use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::record::ElectionRecord;

/// A single instruction of a BOC builder specification.
///
/// The staking policy describes election messages as an ordered list of these
/// operations; the ledger provider turns the list into the chain's native
/// binary serialization. The encoding itself is opaque to the policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BocOp {
    /// A fixed-width big-endian integer. `value` is either a JSON number or
    /// a `0x`-prefixed hex string for widths beyond 64 bits.
    Integer {
        /// Width in bits.
        size: u32,
        /// The value to write.
        value: serde_json::Value,
    },
    /// A hex-encoded bit string appended verbatim.
    BitString {
        /// Hex-encoded payload.
        value: String,
    },
    /// A nested cell with its own builder.
    Cell {
        /// Builder of the nested cell.
        builder: Vec<BocOp>,
    },
}

impl BocOp {
    /// Integer op from a plain unsigned value.
    pub fn int(size: u32, value: u64) -> Self {
        BocOp::Integer {
            size,
            value: value.into(),
        }
    }

    /// Integer op from a `0x`-prefixed hex literal (for 256-bit values).
    pub fn int_hex(size: u32, value: impl Into<String>) -> Self {
        BocOp::Integer {
            size,
            value: serde_json::Value::String(value.into()),
        }
    }

    /// Bit-string op from hex-encoded data.
    pub fn bits(value: impl Into<String>) -> Self {
        BocOp::BitString {
            value: value.into(),
        }
    }
}

/// Input of a wallet `submitTransaction` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionInput {
    /// Destination account.
    pub dest: String,
    /// Attached value in nanotokens.
    pub value: u64,
    /// Whether the message bounces back on delivery failure.
    pub bounce: bool,
    /// Sweep the whole wallet balance instead of `value`.
    pub all_balance: bool,
    /// Base64-encoded BOC payload.
    pub payload: String,
}

/// Outcome of a single submission attempt. Retry policy lives with the
/// caller, not the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitStatus {
    /// Whether the node accepted the message.
    pub success: bool,
}

/// A freshly generated validator key. The console provider cannot export raw
/// secret material, so `secret` may be absent; presence of the key hash is
/// what the policy tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedKey {
    /// Hex-encoded 32-byte key hash.
    pub key: String,
    /// Opaque secret material, when the provider has custody of it.
    pub secret: Option<String>,
}

/// Capability set the staking policy requires from the chain, regardless of
/// how it is reached. Two interchangeable providers exist: the direct
/// ledger-node API (`esm-everos`) and the local administrative console
/// (`esm-console`); the policy is provider-agnostic.
///
/// Implementations must serialize [`run_get`](Self::run_get) calls through a
/// single-concurrency FIFO queue so callers never overwhelm the node.
#[async_trait]
pub trait LedgerService: Send + Sync {
    /// Read a ledger-wide configuration parameter by numeric id. Always a
    /// fresh read; caching (and its bypass list) is the policy's concern.
    async fn get_config_param(&self, id: u32) -> Result<serde_json::Value, LedgerError>;

    /// Base64-encoded BOC of the account's state.
    async fn get_account_state(&self, addr: &str) -> Result<String, LedgerError>;

    /// Account balance in nanotokens.
    async fn get_account_balance(&self, addr: &str) -> Result<u64, LedgerError>;

    /// Submit one wallet transaction. Single attempt by contract.
    async fn submit_transaction(
        &self,
        input: &TransactionInput,
    ) -> Result<SubmitStatus, LedgerError>;

    /// Execute a read-only get-method against an account state and return the
    /// decoded output stack.
    async fn run_get(
        &self,
        account_boc: &str,
        function: &str,
        inputs: &[String],
    ) -> Result<serde_json::Value, LedgerError>;

    /// Serialize a builder specification into a base64-encoded BOC.
    async fn encode_boc(&self, builder: &[BocOp]) -> Result<String, LedgerError>;

    /// Encode the internal-call body of the delegation pool's `ticktock`
    /// function.
    async fn encode_pool_ticktock(&self) -> Result<String, LedgerError>;

    /// Scan the pool's recent outbound events for a `StakeSigningRequested`
    /// naming `election_id`; returns the proxy address it announces.
    async fn find_stake_signing_request(
        &self,
        pool_addr: &str,
        election_id: u32,
    ) -> Result<Option<String>, LedgerError>;

    /// Generate a fresh validator key on the node.
    async fn generate_key_pair(&self) -> Result<GeneratedKey, LedgerError>;

    /// Export the public key backing a previously generated key hash.
    async fn export_public_key(&self, key: &str) -> Result<String, LedgerError>;

    /// Sign `data_hex` with the key identified by `key`; returns the
    /// hex-encoded signature.
    async fn sign(&self, key: &str, data_hex: &str) -> Result<String, LedgerError>;

    /// Register a validator key and its ADNL key with the node as valid for
    /// `[election_id, election_id + validation_period)`.
    async fn install_validator_keys(
        &self,
        election_id: u32,
        validation_period: u32,
        key: &str,
        adnl_key: &str,
    ) -> Result<(), LedgerError>;

    /// Re-register the keys persisted in `record` after a node restart.
    /// Providers without local key custody must fail with
    /// [`LedgerError::Unsupported`] rather than silently no-op.
    async fn restore_validator_keys(&self, record: &ElectionRecord) -> Result<(), LedgerError>;

    /// Difference between node time and network time, in seconds.
    async fn get_time_diff(&self) -> Result<i64, LedgerError>;

    /// Count block signatures produced by any of `node_ids` within the last
    /// `interval_secs` seconds.
    async fn count_block_signatures(
        &self,
        node_ids: &[String],
        interval_secs: u64,
    ) -> Result<u64, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boc_op_serializes_like_a_builder_spec() {
        let ops = vec![
            BocOp::int(32, 0x4765_7424),
            BocOp::bits("ff"),
            BocOp::Cell {
                builder: vec![BocOp::int_hex(256, "0xdead")],
            },
        ];
        let json = serde_json::to_value(&ops).unwrap();
        assert_eq!(json[0]["type"], "Integer");
        assert_eq!(json[0]["size"], 32);
        assert_eq!(json[1]["type"], "BitString");
        assert_eq!(json[2]["builder"][0]["value"], "0xdead");
    }
}
