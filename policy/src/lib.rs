//! Election state machine of the staking manager.
//!
//! The [`StakingManager`] decides whether to act on the current cycle,
//! provisions validator keys, builds and signs the election payload, submits
//! it with bounded retries and tracks the outcome durably. Stake sizing and
//! routing are delegated to the configured [`FundingStrategy`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use esm_datastore::Datastore;
use esm_interface::{
    AccountAddress, ElectionSummary, FundingSettings, FundingType, LedgerService, Notification,
    Notifier, TransactionInput, WalletSettings,
};
use serde_json::Value;
use tracing::{debug, info, warn};

mod config;
mod decode;
mod elector;
mod error;
mod funding;
mod notify;
mod params;
mod payload;
mod retry;

pub use config::{from_toml_path, ManagerConfig};
pub use elector::{Elector, Participant, ParticipantList};
pub use error::PolicyError;
pub use funding::{DePoolFunding, FundingStrategy, WalletFunding};
pub use notify::{notifier_for, LogNotifier, WebhookNotifier};
pub use params::ChainParams;

/// Default stake factor submitted with the election request.
pub const DEFAULT_MAX_FACTOR: f64 = 3.0;
/// Default bound on submission attempts.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;

/// One token in the ledger's smallest unit.
pub(crate) const NANO_PER_TOKEN: u64 = 1_000_000_000;
/// Value attached to a pool ticktock call.
const TICKTOCK_VALUE: u64 = 500_000_000;
/// Value attached to a stake-recovery query.
const RECOVER_VALUE: u64 = 1_000_000_000;

/// The validator's latest stake and relative weight in the serving set.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StakeAndWeight {
    /// Estimated stake in nanotokens.
    pub stake: u64,
    /// Fraction of the set's total weight, `0.0..=1.0`.
    pub weight: f64,
}

/// The election state machine and its operator surface.
pub struct StakingManager {
    pub(crate) ledger: Arc<dyn LedgerService>,
    pub(crate) datastore: Arc<Datastore>,
    pub(crate) params: Arc<ChainParams>,
    pub(crate) wallet: WalletSettings,
    pub(crate) funding: FundingSettings,
    elector: Elector,
    notifier: Arc<dyn Notifier>,
    strategy: Box<dyn FundingStrategy>,
    confirmation_timeout: u64,
    sending_in_progress: AtomicBool,
}

impl StakingManager {
    /// Wire the state machine up from settings persisted in the store. The
    /// funding strategy is fixed for the life of the process.
    pub fn new(
        ledger: Arc<dyn LedgerService>,
        datastore: Arc<Datastore>,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        let settings = datastore.settings()?;
        let strategy: Box<dyn FundingStrategy> = match settings.funding.kind {
            FundingType::Wallet => Box::new(WalletFunding),
            FundingType::Depool => {
                if settings.funding.addr.is_none() {
                    anyhow::bail!("funding.addr is required for pool funding");
                }
                Box::new(DePoolFunding)
            }
        };
        let params = Arc::new(ChainParams::new(ledger.clone()));
        let elector = Elector::new(ledger.clone(), params.clone());

        Ok(Self {
            ledger,
            datastore,
            params,
            wallet: settings.wallet,
            funding: settings.funding,
            elector,
            notifier,
            strategy,
            confirmation_timeout: settings.participation_confirmation_timeout,
            sending_in_progress: AtomicBool::new(false),
        })
    }

    /// One pass of the election state machine. Typically invoked by a
    /// scheduler; overlapping invocations are dropped, not queued.
    pub async fn send_stake(&self, max_factor: f64, retry_attempts: u32) -> Result<(), PolicyError> {
        if self.sending_in_progress.load(Ordering::SeqCst) {
            debug!("stake sending is already in progress");
            return Ok(());
        }

        let active_id = self.elector.active_election_id().await?;

        // With no open election, confirmation checks run against the most
        // recent cycle instead.
        let check_id = if active_id != 0 {
            Some(active_id)
        } else {
            self.elector.past_election_ids().await?.last().copied()
        };

        if let Some(election_id) = check_id {
            let mut record = self.datastore.election(election_id)?;
            if let Some(public_key) = record.public_key.clone() {
                if record.participation_confirmed {
                    debug!(election_id, "participation already confirmed");
                    return Ok(());
                }

                let on_chain_stake = self.elector.participates_in(&public_key).await?;
                if on_chain_stake > 0 {
                    record.participation_confirmed = true;
                    self.datastore.set_election(record, false)?;

                    let next_election_id = self.next_election_id(election_id).await?;
                    info!(election_id, on_chain_stake, "participation confirmed");
                    self.notifier
                        .notify(&Notification::ParticipationConfirmed {
                            election_id,
                            next_election_id,
                        })
                        .await;

                    if active_id != 0 {
                        return Ok(());
                    }
                    // Fall through to out-of-election housekeeping.
                } else if let Some(sent_at) = record.last_stake_sending_time {
                    let elapsed = now().saturating_sub(sent_at);
                    if elapsed < self.confirmation_timeout {
                        debug!(election_id, elapsed, "waiting for on-chain confirmation");
                        return Ok(());
                    }
                    warn!(election_id, elapsed, "participation unconfirmed, resubmitting");
                    self.notifier
                        .notify(&Notification::ParticipationNotConfirmed { election_id })
                        .await;
                }
            }
        }

        if active_id == 0 {
            debug!("no election is running");
            return self.strategy.out_of_elections(self).await;
        }

        if self.datastore.skip_next_elections(None)? {
            info!(election_id = active_id, "skipped by operator request");
            return Ok(());
        }

        if self.sending_in_progress.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _guard = SendingGuard(&self.sending_in_progress);

        let outcome = self
            .strategy
            .decide_and_submit(self, active_id, max_factor, retry_attempts)
            .await;
        if let Err(e) = &outcome {
            self.notifier
                .notify(&Notification::StakeSendingFailed {
                    election_id: active_id,
                    error: e.to_string(),
                })
                .await;
        }
        outcome
    }

    /// The shared submission primitive used by both funding strategies:
    /// provision keys once, sign the election request once, then build and
    /// submit the signed message.
    pub(crate) async fn send_stake_impl(
        &self,
        election_id: u32,
        src: &str,
        dst: &str,
        stake: u64,
        inc_stake: bool,
        max_factor: f64,
        retry_attempts: u32,
    ) -> Result<(), PolicyError> {
        let src_addr: AccountAddress = src
            .parse()
            .map_err(|e| PolicyError::Validation(format!("source address: {e}")))?;
        dst.parse::<AccountAddress>()
            .map_err(|e| PolicyError::Validation(format!("destination address: {e}")))?;
        if stake == 0 {
            return Err(PolicyError::Validation("stake must be positive".into()));
        }
        if !(1.0..=100.0).contains(&max_factor) {
            return Err(PolicyError::Validation(format!(
                "max factor {max_factor} is outside [1, 100]"
            )));
        }
        if retry_attempts == 0 {
            return Err(PolicyError::Validation("retry attempts must be positive".into()));
        }

        let mut record = self.datastore.election(election_id)?;

        if !record.has_keys() {
            let validator = self.ledger.generate_key_pair().await?;
            let adnl = self.ledger.generate_key_pair().await?;
            let validation_period = self.params.validators_elected_for().await?;
            self.ledger
                .install_validator_keys(election_id, validation_period, &validator.key, &adnl.key)
                .await?;

            record.key = Some(validator.key);
            record.adnl_key = Some(adnl.key);
            record.secrets = Some(serde_json::json!([validator.secret, adnl.secret]));
            // Persisted before anything else can fail; a crash here must not
            // orphan node-side keys, retries reuse them.
            record = self.datastore.set_election(record, false)?;
            info!(election_id, "validator keys provisioned");
        }
        let key = record
            .key
            .clone()
            .ok_or_else(|| PolicyError::Validation("record has no validator key".into()))?;
        let adnl_key = record
            .adnl_key
            .clone()
            .ok_or_else(|| PolicyError::Validation("record has no adnl key".into()))?;

        if record.public_key.is_none() {
            let request = payload::validator_elect_req(&src_addr, election_id, max_factor, &adnl_key)?;
            let public_key = self.ledger.export_public_key(&key).await?;
            let signature = self.ledger.sign(&key, &request).await?;

            record.public_key = Some(public_key);
            record.signature = Some(signature);
            record = self.datastore.set_election(record, false)?;
            debug!(election_id, "election request signed");
        }
        let public_key = record
            .public_key
            .clone()
            .ok_or_else(|| PolicyError::Validation("record has no public key".into()))?;
        let signature = record
            .signature
            .clone()
            .ok_or_else(|| PolicyError::Validation("record has no signature".into()))?;

        let ops =
            payload::validator_elect_signed(election_id, max_factor, &adnl_key, &public_key, &signature, now());
        let message = self.ledger.encode_boc(&ops).await?;
        let input = TransactionInput {
            dest: dst.to_string(),
            value: stake.saturating_mul(NANO_PER_TOKEN),
            bounce: true,
            all_balance: false,
            payload: message,
        };

        let outcome = retry::submit_with_backoff(self.ledger.as_ref(), &input, retry_attempts).await;
        match &outcome {
            Ok(()) => {
                record.last_stake_sending_time = Some(now());
                record.stake = Some(stake);
                info!(election_id, stake, "stake submitted");
            }
            Err(e) => {
                // A failure must not disturb whatever stake is already on
                // record. Under increment an absent incoming stake keeps the
                // stored total; under overwrite the loaded value writes back
                // unchanged.
                if inc_stake {
                    record.stake = None;
                }
                warn!(election_id, error = %e, "stake submission failed");
            }
        }
        // The key and signature work above survives even a failed submission.
        self.datastore.set_election(record, inc_stake)?;

        outcome
    }

    /// Ask the elector to return whatever stake it holds for the wallet.
    /// Returns the amount requested back, in nanotokens.
    pub async fn recover_stake(&self, retry_attempts: u32) -> Result<u64, PolicyError> {
        let wallet: AccountAddress = self
            .wallet
            .addr
            .parse()
            .map_err(|e| PolicyError::Validation(format!("wallet address: {e}")))?;
        let amount = self.elector.compute_returned_stake(wallet.account_id()).await?;
        if amount == 0 {
            debug!("nothing to recover");
            return Ok(0);
        }

        let message = self.ledger.encode_boc(&payload::recover_query(now())).await?;
        let input = TransactionInput {
            dest: self.params.elector_address().await?,
            value: RECOVER_VALUE,
            bounce: true,
            all_balance: false,
            payload: message,
        };
        retry::submit_with_backoff(self.ledger.as_ref(), &input, retry_attempts).await?;
        info!(amount, "stake recovery requested");

        Ok(amount)
    }

    /// Re-register validator keys with the node after a restart. Every
    /// election still held by the elector must have complete key material.
    pub async fn restore_keys(&self) -> Result<(), PolicyError> {
        let mut ids = self.elector.past_election_ids().await?;
        let active_id = self.elector.active_election_id().await?;
        if active_id != 0 {
            ids.push(active_id);
        }

        for id in ids {
            let record = self.datastore.election(id)?;
            if !record.restorable() {
                return Err(PolicyError::Validation(format!(
                    "election {id}: key, adnlKey and secrets must all be present"
                )));
            }
            self.ledger.restore_validator_keys(&record).await?;
            info!(election_id = id, "validator keys restored");
        }
        Ok(())
    }

    /// One pool housekeeping call; diagnostic hook for pool deployments.
    pub async fn send_ticktock(&self) -> Result<(), PolicyError> {
        let pool = self.funding.addr.clone().ok_or_else(|| {
            PolicyError::Validation("ticktock requires pool funding".into())
        })?;
        let body = self.ledger.encode_pool_ticktock().await?;
        let input = TransactionInput {
            dest: pool,
            value: TICKTOCK_VALUE,
            bounce: true,
            all_balance: false,
            payload: body,
        };
        retry::submit_with_backoff(self.ledger.as_ref(), &input, DEFAULT_RETRY_ATTEMPTS).await
    }

    /// Sit out (or rejoin) the next election cycle.
    pub fn skip_next_elections(&self, skip: bool) -> Result<bool, PolicyError> {
        Ok(self.datastore.skip_next_elections(Some(skip))?)
    }

    /// Override the size of the next wallet stake, in whole tokens.
    pub fn set_next_stake_size(&self, tokens: u64) -> Result<Option<u64>, PolicyError> {
        let stored = self.datastore.next_stake_size(Some(tokens))?;
        info!(tokens, "next stake size set");
        Ok(stored)
    }

    /// The participation audit trail, without secrets or signatures.
    pub fn elections_history(&self) -> Result<Vec<ElectionSummary>, PolicyError> {
        Ok(self
            .datastore
            .elections()?
            .iter()
            .map(ElectionSummary::from)
            .collect())
    }

    /// Standings of the open election.
    pub async fn get_participant_list_extended(&self) -> Result<ParticipantList, PolicyError> {
        self.elector.participant_list_extended().await
    }

    /// Wallet balance in nanotokens.
    pub async fn get_wallet_balance(&self) -> Result<u64, PolicyError> {
        Ok(self.ledger.get_account_balance(&self.wallet.addr).await?)
    }

    /// Node time drift diagnostic; console deployments only.
    pub async fn get_time_diff(&self) -> Result<i64, PolicyError> {
        Ok(self.ledger.get_time_diff().await?)
    }

    /// Blocks signed by the keys of the last two cycles within the interval.
    pub async fn count_blocks_signatures(&self, interval_secs: u64) -> Result<u64, PolicyError> {
        let keys: Vec<String> = self
            .last_two_records()?
            .into_iter()
            .filter_map(|r| r.key.map(|k| k.to_ascii_lowercase()))
            .collect();
        Ok(self.ledger.count_block_signatures(&keys, interval_secs).await?)
    }

    /// Estimate the validator's stake and weight in the serving set from p34
    /// and the elector's completed-elections list.
    pub async fn get_latest_stake_and_weight(&self) -> Result<StakeAndWeight, PolicyError> {
        let keys: Vec<Option<String>> = self
            .last_two_records()?
            .into_iter()
            .map(|r| r.public_key.map(|k| k.to_ascii_lowercase()))
            .collect();

        let p34 = self.params.current_validators().await?;
        let total_weight = decode::weight(&p34, "total_weight_dec", "total_weight");
        let Some(total_weight) = total_weight.filter(|w| *w > 0) else {
            return Ok(StakeAndWeight { stake: 0, weight: 0.0 });
        };
        let list = p34.get("list").and_then(Value::as_array);

        let weights: Vec<Option<f64>> = keys
            .iter()
            .map(|key| -> Option<f64> {
                let key = key.as_deref()?;
                let entry = list?.iter().find(|e| {
                    e.get("public_key")
                        .and_then(Value::as_str)
                        .is_some_and(|k| k.eq_ignore_ascii_case(key))
                })?;
                let weight = decode::weight(entry, "weight_dec", "weight")?;
                Some(weight as f64 / total_weight as f64)
            })
            .collect();

        let Some(weight_id) = weights.iter().position(Option::is_some) else {
            return Ok(StakeAndWeight { stake: 0, weight: 0.0 });
        };
        let weight = weights[weight_id].unwrap_or(0.0);

        let stakes = self.elector.past_election_stakes().await?;
        if stakes.is_empty() {
            return Ok(StakeAndWeight { stake: 0, weight });
        }
        let total_stake = stakes[weight_id % stakes.len()];

        Ok(StakeAndWeight {
            stake: (total_stake as f64 * weight) as u64,
            weight,
        })
    }

    fn last_two_records(&self) -> Result<Vec<esm_interface::ElectionRecord>, PolicyError> {
        let mut records = self.datastore.elections()?;
        let skip = records.len().saturating_sub(2);
        Ok(records.split_off(skip))
    }

    async fn next_election_id(&self, election_id: u32) -> Result<u32, PolicyError> {
        let elected_for = self.params.validators_elected_for().await?;
        let start_before = self.params.elections_start_before().await?;
        Ok(election_id
            .saturating_add(elected_for)
            .saturating_sub(start_before))
    }
}

struct SendingGuard<'a>(&'a AtomicBool);

impl Drop for SendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}

#[cfg(test)]
mod tests {
    use esm_mock_ledger::{MockLedger, RecordingNotifier};
    use serde_json::json;

    use super::*;

    fn manager(ledger: &MockLedger) -> (tempfile::TempDir, StakingManager) {
        let dir = tempfile::tempdir().unwrap();
        let datastore = Arc::new(Datastore::new(dir.path().join("db.json")));
        let mgr = StakingManager::new(
            Arc::new(ledger.clone()),
            datastore,
            Arc::new(RecordingNotifier::new()),
        )
        .unwrap();
        (dir, mgr)
    }

    #[tokio::test]
    async fn overlapping_invocations_are_dropped() {
        let ledger = MockLedger::new();
        ledger.set_get_method("active_election_id", json!(["1700000000"]));
        let (_dir, mgr) = manager(&ledger);

        mgr.sending_in_progress.store(true, Ordering::SeqCst);
        mgr.send_stake(DEFAULT_MAX_FACTOR, 1).await.unwrap();
        assert!(ledger.submissions().is_empty());

        // The guard owner finishing re-enables the machine.
        mgr.sending_in_progress.store(false, Ordering::SeqCst);
        mgr.send_stake_impl(
            1700000000,
            &format!("0:{}", "aa".repeat(32)),
            &format!("-1:{}", "33".repeat(32)),
            100,
            true,
            3.0,
            1,
        )
        .await
        .unwrap();
        assert_eq!(ledger.submissions().len(), 1);
        assert!(!mgr.sending_in_progress.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_pool_resubmission_keeps_the_nominal_stake() {
        let ledger = MockLedger::new();
        let (_dir, mgr) = manager(&ledger);

        // A pool election that already went through one accepted unit stake.
        let record = esm_interface::ElectionRecord {
            id: 1700000000,
            key: Some("11".repeat(32)),
            adnl_key: Some("22".repeat(32)),
            secrets: Some(json!([null, null])),
            public_key: Some("ab".repeat(32)),
            signature: Some("cd".repeat(64)),
            stake: Some(1),
            last_stake_sending_time: Some(1),
            ..Default::default()
        };
        mgr.datastore.set_election(record, false).unwrap();

        ledger.reject_next_submissions(2);
        let err = mgr
            .send_stake_impl(
                1700000000,
                &format!("0:{}", "bb".repeat(32)),
                &format!("0:{}", "cc".repeat(32)),
                1,
                false,
                3.0,
                2,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PolicyError::Funding(_)), "{err}");

        let stored = mgr.datastore.election(1700000000).unwrap();
        assert_eq!(stored.stake, Some(1));
    }

    #[tokio::test]
    async fn validation_rejects_malformed_input() {
        let ledger = MockLedger::new();
        let (_dir, mgr) = manager(&ledger);
        let src = format!("0:{}", "aa".repeat(32));
        let dst = format!("-1:{}", "33".repeat(32));

        for (src, dst, stake, factor, attempts) in [
            ("junk".to_string(), dst.clone(), 1u64, 3.0f64, 1u32),
            (src.clone(), "0:short".to_string(), 1, 3.0, 1),
            (src.clone(), dst.clone(), 0, 3.0, 1),
            (src.clone(), dst.clone(), 1, 0.5, 1),
            (src.clone(), dst.clone(), 1, 101.0, 1),
            (src.clone(), dst.clone(), 1, 3.0, 0),
        ] {
            let err = mgr
                .send_stake_impl(1, &src, &dst, stake, true, factor, attempts)
                .await
                .unwrap_err();
            assert!(matches!(err, PolicyError::Validation(_)), "{err}");
        }
        assert!(ledger.submissions().is_empty());
    }
}
