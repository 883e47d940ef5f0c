//! Funding strategies: how a stake is sized and through which path it is
//! submitted.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::PolicyError;
use crate::{StakingManager, NANO_PER_TOKEN};

/// Nanotokens kept unspent to cover fees and future elections.
const OPTIMAL_MARGIN: u64 = 10_000_000_000;
/// Nanotokens that must remain on top of the stake for the submission itself.
const CRITICAL_MARGIN: u64 = 1_000_000_000;
/// Sizing and proxy-discovery attempts.
const ATTEMPTS: u32 = 3;
const ATTEMPT_PAUSE: Duration = Duration::from_secs(60);

/// Path-specific behavior the state machine delegates to.
#[async_trait]
pub trait FundingStrategy: Send + Sync {
    /// Housekeeping performed when no election is running.
    async fn out_of_elections(&self, mgr: &StakingManager) -> Result<(), PolicyError>;

    /// Size the stake and drive it through the submission primitive.
    async fn decide_and_submit(
        &self,
        mgr: &StakingManager,
        election_id: u32,
        max_factor: f64,
        retry_attempts: u32,
    ) -> Result<(), PolicyError>;
}

/// Stakes straight from the owned wallet to the elector. Contributions are
/// additive: a repeated submission for the same election tops the stake up.
pub struct WalletFunding;

impl WalletFunding {
    /// Whether the key from the election preceding `election_id` still sits
    /// in the serving validator set. If it does, its stake is locked and the
    /// whole free balance can be staked; otherwise half is held back for the
    /// currently locked-up cycle.
    async fn previous_key_still_validating(
        &self,
        mgr: &StakingManager,
        election_id: u32,
    ) -> Result<bool, PolicyError> {
        let records = mgr.datastore.elections()?;
        let previous_key = records
            .iter()
            .filter(|r| r.id < election_id)
            .next_back()
            .and_then(|r| r.public_key.clone());
        let Some(previous_key) = previous_key else {
            return Ok(false);
        };

        let p34 = mgr.params.current_validators().await?;
        Ok(validator_set_contains(&p34, &previous_key))
    }

    async fn size_from_balance(
        &self,
        mgr: &StakingManager,
        election_id: u32,
        retry_attempts: u32,
    ) -> Result<u64, PolicyError> {
        let recovered = mgr.recover_stake(retry_attempts).await?;
        if recovered > 0 {
            debug!(recovered, "waiting for the recovered stake to land");
            tokio::time::sleep(ATTEMPT_PAUSE).await;
        }

        let min_stake = mgr.params.min_stake().await?;
        let default_floor = mgr.funding.default_stake.saturating_mul(NANO_PER_TOKEN);
        let still_validating = self.previous_key_still_validating(mgr, election_id).await?;

        for attempt in 1..=ATTEMPTS {
            let balance = mgr.ledger.get_account_balance(&mgr.wallet.addr).await?;
            let from_balance = if still_validating {
                balance.saturating_sub(OPTIMAL_MARGIN)
            } else {
                (balance / 2).saturating_sub(OPTIMAL_MARGIN)
            };
            let size = from_balance.max(min_stake).max(default_floor);

            if balance >= size + CRITICAL_MARGIN {
                return Ok(size / NANO_PER_TOKEN);
            }
            warn!(
                attempt,
                balance, size, "balance cannot cover the stake and the critical margin"
            );
            if attempt < ATTEMPTS {
                tokio::time::sleep(ATTEMPT_PAUSE).await;
            }
        }

        Err(PolicyError::Funding(format!(
            "insufficient balance in {} for a viable stake",
            mgr.wallet.addr
        )))
    }
}

#[async_trait]
impl FundingStrategy for WalletFunding {
    async fn out_of_elections(&self, _mgr: &StakingManager) -> Result<(), PolicyError> {
        Ok(())
    }

    async fn decide_and_submit(
        &self,
        mgr: &StakingManager,
        election_id: u32,
        max_factor: f64,
        retry_attempts: u32,
    ) -> Result<(), PolicyError> {
        info!(election_id, "participating via wallet");

        let stake = match mgr.datastore.next_stake_size(None)? {
            Some(tokens) => {
                debug!(tokens, "using the operator's stake size override");
                tokens
            }
            None => self.size_from_balance(mgr, election_id, retry_attempts).await?,
        };

        let elector_addr = mgr.params.elector_address().await?;
        mgr.send_stake_impl(
            election_id,
            &mgr.wallet.addr,
            &elector_addr,
            stake,
            true,
            max_factor,
            retry_attempts,
        )
        .await
    }
}

/// Stakes through a delegation pool and the per-election proxy it announces.
/// The submitted amount is always the nominal unit; the pool aggregates the
/// real member stakes itself.
pub struct DePoolFunding;

impl DePoolFunding {
    fn pool_addr(&self, mgr: &StakingManager) -> Result<String, PolicyError> {
        mgr.funding.addr.clone().ok_or_else(|| {
            PolicyError::Validation("funding.addr is required for pool funding".into())
        })
    }
}

#[async_trait]
impl FundingStrategy for DePoolFunding {
    /// One ticktock per inter-election gap, and none once the next validator
    /// set is already published (p36 non-null means rotation is underway).
    async fn out_of_elections(&self, mgr: &StakingManager) -> Result<(), PolicyError> {
        let Some(mut record) = mgr.datastore.elections()?.pop() else {
            return Ok(());
        };
        if record.post_elections_ticktock_is_sent {
            return Ok(());
        }
        let p36 = mgr.params.next_validators().await?;
        if !p36.is_null() {
            return Ok(());
        }

        mgr.send_ticktock().await?;
        info!(election_id = record.id, "post-elections ticktock sent");

        record.post_elections_ticktock_is_sent = true;
        mgr.datastore.set_election(record, false)?;
        Ok(())
    }

    async fn decide_and_submit(
        &self,
        mgr: &StakingManager,
        election_id: u32,
        max_factor: f64,
        retry_attempts: u32,
    ) -> Result<(), PolicyError> {
        info!(election_id, "participating via the delegation pool");

        let pool = self.pool_addr(mgr)?;
        let wait = Duration::from_secs(mgr.funding.event_anticipation_timeout);

        let mut proxy = None;
        for attempt in 1..=ATTEMPTS {
            mgr.send_ticktock().await?;
            tokio::time::sleep(wait).await;

            proxy = mgr.ledger.find_stake_signing_request(&pool, election_id).await?;
            if proxy.is_some() {
                break;
            }
            warn!(attempt, "the pool has not announced a signing proxy yet");
        }
        let proxy = proxy.ok_or_else(|| {
            PolicyError::Funding("unable to detect the pool's proxy address".into())
        })?;
        debug!(%proxy, "pool proxy discovered");

        mgr.send_stake_impl(election_id, &proxy, &pool, 1, false, max_factor, retry_attempts)
            .await
    }
}

fn validator_set_contains(validator_set: &Value, public_key: &str) -> bool {
    validator_set
        .get("list")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter().any(|entry| {
                entry
                    .get("public_key")
                    .and_then(Value::as_str)
                    .is_some_and(|k| k.eq_ignore_ascii_case(public_key))
            })
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn validator_set_lookup_is_case_insensitive() {
        let p34 = json!({ "list": [ { "public_key": "ABCD" } ] });
        assert!(validator_set_contains(&p34, "abcd"));
        assert!(!validator_set_contains(&p34, "ffff"));
        assert!(!validator_set_contains(&json!(null), "abcd"));
    }
}
