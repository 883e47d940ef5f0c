//! Cached view of ledger-wide configuration parameters.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use esm_interface::{LedgerError, LedgerService};
use serde_json::Value;

use crate::decode::loose_u64;

/// Parameters that change every election cycle and must always be read fresh.
const FRESH_ONLY: [u32; 2] = [34, 36];

const DEFAULT_ELECTOR_ACCOUNT: &str =
    "3333333333333333333333333333333333333333333333333333333333333333";
const DEFAULT_VALIDATORS_ELECTED_FOR: u32 = 65536;
const DEFAULT_ELECTIONS_START_BEFORE: u32 = 32768;
const DEFAULT_MIN_STAKE: u64 = 0x9184e72a000;

/// Per-id cache over [`LedgerService::get_config_param`] with a fixed bypass
/// set for the validator-set parameters.
pub struct ChainParams {
    ledger: Arc<dyn LedgerService>,
    cache: Mutex<HashMap<u32, Value>>,
}

impl ChainParams {
    pub fn new(ledger: Arc<dyn LedgerService>) -> Self {
        Self {
            ledger,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Parameter by id; cached for the life of the process unless the id is
    /// in the bypass set.
    pub async fn get(&self, id: u32) -> Result<Value, LedgerError> {
        let cacheable = !FRESH_ONLY.contains(&id);
        if cacheable {
            let cache = self.cache.lock().expect("params cache poisoned");
            if let Some(value) = cache.get(&id) {
                return Ok(value.clone());
            }
        }

        let value = self.ledger.get_config_param(id).await?;
        if cacheable {
            self.cache
                .lock()
                .expect("params cache poisoned")
                .insert(id, value.clone());
        }
        Ok(value)
    }

    /// How long an elected validator set serves, in seconds (p15).
    pub async fn validators_elected_for(&self) -> Result<u32, LedgerError> {
        let p15 = self.get(15).await?;
        Ok(p15
            .get("validators_elected_for")
            .and_then(loose_u64)
            .map(|v| v as u32)
            .unwrap_or(DEFAULT_VALIDATORS_ELECTED_FOR))
    }

    /// How long before a set's term elections open, in seconds (p15).
    pub async fn elections_start_before(&self) -> Result<u32, LedgerError> {
        let p15 = self.get(15).await?;
        Ok(p15
            .get("elections_start_before")
            .and_then(loose_u64)
            .map(|v| v as u32)
            .unwrap_or(DEFAULT_ELECTIONS_START_BEFORE))
    }

    /// Full address of the elector contract (p1), masterchain workchain.
    pub async fn elector_address(&self) -> Result<String, LedgerError> {
        let p1 = self.get(1).await?;
        let account = p1.as_str().unwrap_or(DEFAULT_ELECTOR_ACCOUNT);
        Ok(format!("-1:{account}"))
    }

    /// Minimum accepted stake in nanotokens (p17).
    pub async fn min_stake(&self) -> Result<u64, LedgerError> {
        let p17 = self.get(17).await?;
        Ok(p17
            .get("min_stake")
            .and_then(loose_u64)
            .unwrap_or(DEFAULT_MIN_STAKE))
    }

    /// The currently serving validator set (p34). Never cached.
    pub async fn current_validators(&self) -> Result<Value, LedgerError> {
        self.get(34).await
    }

    /// The next, already elected validator set (p36); null between the set
    /// taking office and the next elections. Never cached.
    pub async fn next_validators(&self) -> Result<Value, LedgerError> {
        self.get(36).await
    }
}

#[cfg(test)]
mod tests {
    use esm_mock_ledger::MockLedger;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn stable_parameters_are_fetched_once() {
        let ledger = MockLedger::new();
        ledger.set_config_param(15, json!({ "validators_elected_for": 65536 }));
        let params = ChainParams::new(Arc::new(ledger.clone()));

        params.get(15).await.unwrap();
        params.get(15).await.unwrap();
        assert_eq!(ledger.config_fetches(15), 1);
    }

    #[tokio::test]
    async fn validator_sets_bypass_the_cache() {
        let ledger = MockLedger::new();
        ledger.set_config_param(34, json!({ "list": [] }));
        let params = ChainParams::new(Arc::new(ledger.clone()));

        params.current_validators().await.unwrap();
        params.current_validators().await.unwrap();
        params.next_validators().await.unwrap();
        params.next_validators().await.unwrap();
        assert_eq!(ledger.config_fetches(34), 2);
        assert_eq!(ledger.config_fetches(36), 2);
    }

    #[tokio::test]
    async fn defaults_cover_missing_parameters() {
        let params = ChainParams::new(Arc::new(MockLedger::new()));

        assert_eq!(params.validators_elected_for().await.unwrap(), 65536);
        assert_eq!(params.elections_start_before().await.unwrap(), 32768);
        assert_eq!(params.min_stake().await.unwrap(), 0x9184e72a000);
        assert_eq!(
            params.elector_address().await.unwrap(),
            "-1:3333333333333333333333333333333333333333333333333333333333333333"
        );
    }
}
