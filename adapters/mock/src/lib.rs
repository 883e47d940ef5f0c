//! Scriptable in-memory [`LedgerService`] for tests.
//!
//! Every capability reads from state the test sets up in advance, and every
//! mutation is recorded so assertions can inspect exactly what the policy
//! asked the chain to do. No networking, no subprocesses.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use esm_interface::{
    BocOp, ElectionRecord, GeneratedKey, LedgerError, LedgerService, Notification, Notifier,
    SubmitStatus, TransactionInput,
};

#[derive(Default)]
struct Inner {
    config_params: HashMap<u32, Value>,
    config_fetches: HashMap<u32, u32>,
    account_states: HashMap<String, String>,
    balances: HashMap<String, u64>,
    get_methods: HashMap<String, Value>,
    submissions: Vec<TransactionInput>,
    rejected_submissions_left: u32,
    failing_submissions_left: u32,
    encoded_builders: Vec<Vec<BocOp>>,
    proxy_announcements: VecDeque<Option<String>>,
    announced_proxy: Option<String>,
    key_counter: u64,
    signature_counter: u64,
    public_keys: HashMap<String, String>,
    installed_keys: Vec<(u32, u32, String, String)>,
    restored_records: Vec<u32>,
    time_diff: i64,
    signature_count: u64,
}

/// In-memory ledger with scriptable chain state.
#[derive(Clone, Default)]
pub struct MockLedger {
    inner: Arc<Mutex<Inner>>,
}

impl MockLedger {
    /// A ledger with empty state; get-methods answer `null` until scripted.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("mock state poisoned")
    }

    /// Script the value of a configuration parameter.
    pub fn set_config_param(&self, id: u32, value: Value) {
        self.lock().config_params.insert(id, value);
    }

    /// How many times a parameter has been fetched from the chain.
    pub fn config_fetches(&self, id: u32) -> u32 {
        self.lock().config_fetches.get(&id).copied().unwrap_or(0)
    }

    /// Script an account's state BOC.
    pub fn set_account_state(&self, addr: impl Into<String>, boc: impl Into<String>) {
        self.lock().account_states.insert(addr.into(), boc.into());
    }

    /// Script an account's balance in nanotokens.
    pub fn set_balance(&self, addr: impl Into<String>, nano: u64) {
        self.lock().balances.insert(addr.into(), nano);
    }

    /// Script the output stack of an elector get-method.
    pub fn set_get_method(&self, function: impl Into<String>, output: Value) {
        self.lock().get_methods.insert(function.into(), output);
    }

    /// The next `n` submissions are acknowledged with `success: false`.
    pub fn reject_next_submissions(&self, n: u32) {
        self.lock().rejected_submissions_left = n;
    }

    /// The next `n` submissions fail with a transport error.
    pub fn fail_next_submissions(&self, n: u32) {
        self.lock().failing_submissions_left = n;
    }

    /// Every transaction the policy submitted, in order.
    pub fn submissions(&self) -> Vec<TransactionInput> {
        self.lock().submissions.clone()
    }

    /// Every builder specification the policy asked to encode, in order.
    pub fn encoded_builders(&self) -> Vec<Vec<BocOp>> {
        self.lock().encoded_builders.clone()
    }

    /// Script the per-call outcomes of the pool event scan; after the queue
    /// drains, the last announcement repeats.
    pub fn announce_proxy(&self, announcements: Vec<Option<String>>) {
        let mut inner = self.lock();
        inner.announced_proxy = announcements.last().cloned().flatten();
        inner.proxy_announcements = announcements.into();
    }

    /// Keys installed to the node via `install_validator_keys`.
    pub fn installed_keys(&self) -> Vec<(u32, u32, String, String)> {
        self.lock().installed_keys.clone()
    }

    /// Election ids whose keys were restored.
    pub fn restored_records(&self) -> Vec<u32> {
        self.lock().restored_records.clone()
    }

    /// Script the node's time drift.
    pub fn set_time_diff(&self, diff: i64) {
        self.lock().time_diff = diff;
    }

    /// Script the block signature count.
    pub fn set_signature_count(&self, count: u64) {
        self.lock().signature_count = count;
    }
}

#[async_trait]
impl LedgerService for MockLedger {
    async fn get_config_param(&self, id: u32) -> Result<Value, LedgerError> {
        let mut inner = self.lock();
        *inner.config_fetches.entry(id).or_insert(0) += 1;
        Ok(inner.config_params.get(&id).cloned().unwrap_or(Value::Null))
    }

    async fn get_account_state(&self, addr: &str) -> Result<String, LedgerError> {
        let inner = self.lock();
        Ok(inner
            .account_states
            .get(addr)
            .cloned()
            .unwrap_or_else(|| format!("boc:{addr}")))
    }

    async fn get_account_balance(&self, addr: &str) -> Result<u64, LedgerError> {
        self.lock()
            .balances
            .get(addr)
            .copied()
            .ok_or_else(|| LedgerError::Rpc(format!("no account {addr}")))
    }

    async fn submit_transaction(
        &self,
        input: &TransactionInput,
    ) -> Result<SubmitStatus, LedgerError> {
        let mut inner = self.lock();
        if inner.failing_submissions_left > 0 {
            inner.failing_submissions_left -= 1;
            return Err(LedgerError::Transport("injected submission failure".into()));
        }
        inner.submissions.push(input.clone());
        if inner.rejected_submissions_left > 0 {
            inner.rejected_submissions_left -= 1;
            return Ok(SubmitStatus { success: false });
        }
        Ok(SubmitStatus { success: true })
    }

    async fn run_get(
        &self,
        _account_boc: &str,
        function: &str,
        _inputs: &[String],
    ) -> Result<Value, LedgerError> {
        Ok(self
            .lock()
            .get_methods
            .get(function)
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn encode_boc(&self, builder: &[BocOp]) -> Result<String, LedgerError> {
        let mut inner = self.lock();
        inner.encoded_builders.push(builder.to_vec());
        Ok(format!("te6cc-mock-{}", inner.encoded_builders.len()))
    }

    async fn encode_pool_ticktock(&self) -> Result<String, LedgerError> {
        Ok("te6cc-ticktock".into())
    }

    async fn find_stake_signing_request(
        &self,
        _pool_addr: &str,
        _election_id: u32,
    ) -> Result<Option<String>, LedgerError> {
        let mut inner = self.lock();
        match inner.proxy_announcements.pop_front() {
            Some(announcement) => Ok(announcement),
            None => Ok(inner.announced_proxy.clone()),
        }
    }

    async fn generate_key_pair(&self) -> Result<GeneratedKey, LedgerError> {
        let mut inner = self.lock();
        inner.key_counter += 1;
        let key = format!("{:064x}", inner.key_counter);
        let public = format!("{:064x}", inner.key_counter + 0x1000);
        inner.public_keys.insert(key.clone(), public);
        Ok(GeneratedKey {
            key,
            secret: Some(format!("{:064x}", inner.key_counter + 0x2000)),
        })
    }

    async fn export_public_key(&self, key: &str) -> Result<String, LedgerError> {
        self.lock()
            .public_keys
            .get(key)
            .cloned()
            .ok_or_else(|| LedgerError::Console(format!("unknown key {key}")))
    }

    async fn sign(&self, _key: &str, _data_hex: &str) -> Result<String, LedgerError> {
        let mut inner = self.lock();
        inner.signature_counter += 1;
        Ok(format!("{:0128x}", inner.signature_counter))
    }

    async fn install_validator_keys(
        &self,
        election_id: u32,
        validation_period: u32,
        key: &str,
        adnl_key: &str,
    ) -> Result<(), LedgerError> {
        self.lock()
            .installed_keys
            .push((election_id, validation_period, key.into(), adnl_key.into()));
        Ok(())
    }

    async fn restore_validator_keys(&self, record: &ElectionRecord) -> Result<(), LedgerError> {
        self.lock().restored_records.push(record.id);
        Ok(())
    }

    async fn get_time_diff(&self) -> Result<i64, LedgerError> {
        Ok(self.lock().time_diff)
    }

    async fn count_block_signatures(
        &self,
        _node_ids: &[String],
        _interval_secs: u64,
    ) -> Result<u64, LedgerError> {
        Ok(self.lock().signature_count)
    }
}

/// [`Notifier`] that records every event for later assertion.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    /// A notifier with no events yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything notified so far, in order.
    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().expect("notifier state poisoned").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &Notification) {
        self.events
            .lock()
            .expect("notifier state poisoned")
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submissions_are_recorded_in_order() {
        let ledger = MockLedger::new();
        let input = TransactionInput {
            dest: "0:aa".into(),
            value: 7,
            bounce: true,
            all_balance: false,
            payload: "x".into(),
        };

        ledger.reject_next_submissions(1);
        assert!(!ledger.submit_transaction(&input).await.unwrap().success);
        assert!(ledger.submit_transaction(&input).await.unwrap().success);
        assert_eq!(ledger.submissions().len(), 2);
    }

    #[tokio::test]
    async fn injected_failures_do_not_reach_the_log() {
        let ledger = MockLedger::new();
        let input = TransactionInput {
            dest: "0:aa".into(),
            value: 7,
            bounce: true,
            all_balance: false,
            payload: "x".into(),
        };

        ledger.fail_next_submissions(1);
        assert!(ledger.submit_transaction(&input).await.is_err());
        assert!(ledger.submissions().is_empty());
    }

    #[tokio::test]
    async fn generated_keys_export_their_public_half() {
        let ledger = MockLedger::new();
        let generated = ledger.generate_key_pair().await.unwrap();
        let public = ledger.export_public_key(&generated.key).await.unwrap();
        assert_eq!(public.len(), 64);
        assert_ne!(public, generated.key);
    }

    #[tokio::test]
    async fn proxy_announcements_drain_then_repeat() {
        let ledger = MockLedger::new();
        ledger.announce_proxy(vec![None, Some("0:pp".into())]);
        assert_eq!(ledger.find_stake_signing_request("0:dd", 1).await.unwrap(), None);
        let proxy = ledger.find_stake_signing_request("0:dd", 1).await.unwrap();
        assert_eq!(proxy.as_deref(), Some("0:pp"));
        let proxy = ledger.find_stake_signing_request("0:dd", 1).await.unwrap();
        assert_eq!(proxy.as_deref(), Some("0:pp"));
    }
}
