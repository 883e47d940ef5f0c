//! Read-side helpers over the elector contract's get-methods.
//!
//! Get-method stacks encode lists as nested `[head, tail]` pairs. All list
//! decoding here is iterative; elector state can hold hundreds of entries and
//! recursion depth must not depend on chain state.

use std::sync::Arc;

use esm_interface::LedgerService;
use serde_json::Value;

use crate::decode::loose_u64;
use crate::error::PolicyError;
use crate::params::ChainParams;

/// One entry of `participant_list_extended`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Participant {
    /// Participant public key.
    pub id: String,
    /// Stake in nanotokens.
    pub stake: u64,
    /// Stake factor, fixed-point 16.16.
    pub max_factor: u64,
    /// Source wallet id.
    pub addr: String,
    /// ADNL address.
    pub adnl_addr: String,
}

/// Decoded output of `participant_list_extended`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ParticipantList {
    pub elect_at: u64,
    pub elect_close: u64,
    pub min_stake: u64,
    pub total_stake: u64,
    pub participants: Vec<Participant>,
    pub failed: u64,
    pub finished: u64,
}

pub struct Elector {
    ledger: Arc<dyn LedgerService>,
    params: Arc<ChainParams>,
}

impl Elector {
    pub fn new(ledger: Arc<dyn LedgerService>, params: Arc<ChainParams>) -> Self {
        Self { ledger, params }
    }

    async fn state_boc(&self) -> Result<String, PolicyError> {
        let addr = self.params.elector_address().await?;
        Ok(self.ledger.get_account_state(&addr).await?)
    }

    async fn run_get(&self, function: &str, inputs: &[String]) -> Result<Value, PolicyError> {
        let boc = self.state_boc().await?;
        Ok(self.ledger.run_get(&boc, function, inputs).await?)
    }

    /// Id of the open election, or zero when none is running.
    pub async fn active_election_id(&self) -> Result<u32, PolicyError> {
        let output = self.run_get("active_election_id", &[]).await?;
        output
            .get(0)
            .and_then(loose_u64)
            .map(|id| id as u32)
            .ok_or_else(|| PolicyError::Elector("failed to get active election id".into()))
    }

    /// Ids of elections whose stakes the elector still holds, oldest first.
    pub async fn past_election_ids(&self) -> Result<Vec<u32>, PolicyError> {
        let output = self.run_get("past_election_ids", &[]).await?;
        let ids = match output.get(0) {
            Some(Value::Array(ids)) => ids,
            _ => return Ok(Vec::new()),
        };
        let mut parsed: Vec<u32> = ids.iter().filter_map(loose_u64).map(|id| id as u32).collect();
        parsed.sort_unstable();
        Ok(parsed)
    }

    /// Stake the elector currently holds for `public_key` in the open
    /// election; zero when the key does not participate.
    pub async fn participates_in(&self, public_key: &str) -> Result<u64, PolicyError> {
        let output = self
            .run_get("participates_in", &[format!("0x{public_key}")])
            .await?;
        output.get(0).and_then(loose_u64).ok_or_else(|| {
            PolicyError::Elector("failed to check participation of the key".into())
        })
    }

    /// Nanotokens the elector is ready to return to the wallet.
    pub async fn compute_returned_stake(&self, account_id: &str) -> Result<u64, PolicyError> {
        let output = self
            .run_get("compute_returned_stake", &[format!("0x{account_id}")])
            .await?;
        output
            .get(0)
            .and_then(loose_u64)
            .ok_or_else(|| PolicyError::Elector("failed to compute returned stake".into()))
    }

    /// Full standings of the open election.
    pub async fn participant_list_extended(&self) -> Result<ParticipantList, PolicyError> {
        let output = self.run_get("participant_list_extended", &[]).await?;
        let stack = output
            .as_array()
            .filter(|s| s.len() >= 7)
            .ok_or_else(|| PolicyError::Elector("short participant_list_extended stack".into()))?;

        let scalar = |idx: usize, name: &str| {
            stack.get(idx).and_then(loose_u64).ok_or_else(|| {
                PolicyError::Elector(format!("missing {name} in participant_list_extended"))
            })
        };

        let mut participants = Vec::new();
        for item in cons_items(&stack[4])? {
            let pair = item.as_array().filter(|p| p.len() == 2).ok_or_else(|| {
                PolicyError::Elector("malformed participant entry".into())
            })?;
            let id = pair[0].as_str().unwrap_or_default().to_string();
            let fields = pair[1]
                .as_array()
                .filter(|f| f.len() >= 4)
                .ok_or_else(|| PolicyError::Elector("short participant fields".into()))?;
            participants.push(Participant {
                id,
                stake: loose_u64(&fields[0]).unwrap_or(0),
                max_factor: loose_u64(&fields[1]).unwrap_or(0),
                addr: fields[2].as_str().unwrap_or_default().to_string(),
                adnl_addr: fields[3].as_str().unwrap_or_default().to_string(),
            });
        }

        Ok(ParticipantList {
            elect_at: scalar(0, "elect_at")?,
            elect_close: scalar(1, "elect_close")?,
            min_stake: scalar(2, "min_stake")?,
            total_stake: scalar(3, "total_stake")?,
            participants,
            failed: scalar(5, "failed")?,
            finished: scalar(6, "finished")?,
        })
    }

    /// Total stakes of the completed elections the elector remembers, in
    /// list order.
    pub async fn past_election_stakes(&self) -> Result<Vec<u64>, PolicyError> {
        let output = self.run_get("past_elections", &[]).await?;
        let list = match output.get(0) {
            Some(list) => list,
            None => return Ok(Vec::new()),
        };

        let mut stakes = Vec::new();
        for item in cons_items(list)? {
            let total = item
                .as_array()
                .and_then(|entry| entry.get(5))
                .and_then(loose_u64)
                .ok_or_else(|| PolicyError::Elector("malformed past_elections entry".into()))?;
            stakes.push(total);
        }
        Ok(stakes)
    }
}

/// Flatten a `[head, tail]` cons list into its heads, iteratively.
fn cons_items(list: &Value) -> Result<Vec<&Value>, PolicyError> {
    let mut items = Vec::new();
    let mut node = list;
    while !node.is_null() {
        let pair = node
            .as_array()
            .filter(|p| p.len() == 2)
            .ok_or_else(|| PolicyError::Elector("malformed list node".into()))?;
        items.push(&pair[0]);
        node = &pair[1];
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use esm_mock_ledger::MockLedger;
    use serde_json::json;

    use super::*;

    fn elector(ledger: &MockLedger) -> Elector {
        let ledger: Arc<dyn LedgerService> = Arc::new(ledger.clone());
        let params = Arc::new(ChainParams::new(ledger.clone()));
        Elector::new(ledger, params)
    }

    #[tokio::test]
    async fn active_election_id_reads_the_stack_head() {
        let ledger = MockLedger::new();
        ledger.set_get_method("active_election_id", json!(["1700000000"]));
        assert_eq!(elector(&ledger).active_election_id().await.unwrap(), 1700000000);
    }

    #[tokio::test]
    async fn missing_stack_is_an_elector_error() {
        let ledger = MockLedger::new();
        let err = elector(&ledger).active_election_id().await.unwrap_err();
        assert!(matches!(err, PolicyError::Elector(_)), "{err}");
    }

    #[tokio::test]
    async fn participant_list_decodes_nested_cons_pairs() {
        let ledger = MockLedger::new();
        // Three-entry list, innermost entry last.
        let list = json!([
            ["0xaa", ["100", "196608", "0x01", "0x0a"]],
            [
                ["0xbb", ["200", "196608", "0x02", "0x0b"]],
                [["0xcc", ["300", "131072", "0x03", "0x0c"]], null]
            ]
        ]);
        ledger.set_get_method(
            "participant_list_extended",
            json!(["1700000000", "1700010000", "1000", "600", list, "0", "0"]),
        );

        let decoded = elector(&ledger).participant_list_extended().await.unwrap();
        assert_eq!(decoded.elect_at, 1700000000);
        assert_eq!(decoded.total_stake, 600);
        assert_eq!(decoded.participants.len(), 3);
        assert_eq!(decoded.participants[0].id, "0xaa");
        assert_eq!(decoded.participants[2].stake, 300);
        assert_eq!(decoded.participants[2].max_factor, 131072);
    }

    #[tokio::test]
    async fn deep_cons_lists_decode_fully() {
        let ledger = MockLedger::new();
        // Depth stays inside serde_json's recursion limit (128), the bound
        // any deserialized provider response obeys; the nested Value itself
        // drops recursively.
        let mut list = json!(null);
        for i in 0..96u64 {
            list = json!([[format!("0x{i:x}"), [i.to_string(), "65536", "0x0", "0x0"]], list]);
        }
        ledger.set_get_method(
            "participant_list_extended",
            json!(["0", "0", "0", "0", list, "0", "0"]),
        );

        let decoded = elector(&ledger).participant_list_extended().await.unwrap();
        assert_eq!(decoded.participants.len(), 96);
        // Built innermost-first, so the outermost head is the last index.
        assert_eq!(decoded.participants[0].id, "0x5f");
    }

    #[tokio::test]
    async fn past_election_stakes_take_the_sixth_field() {
        let ledger = MockLedger::new();
        let list = json!([
            ["1699900000", "0", "0", "0", "0", "5000", "0"],
            [["1699800000", "0", "0", "0", "0", "4000", "0"], null]
        ]);
        ledger.set_get_method("past_elections", json!([list]));

        let stakes = elector(&ledger).past_election_stakes().await.unwrap();
        assert_eq!(stakes, vec![5000, 4000]);
    }

    #[tokio::test]
    async fn past_election_ids_sort_ascending() {
        let ledger = MockLedger::new();
        ledger.set_get_method("past_election_ids", json!([["1700000000", "1699900000"]]));
        let ids = elector(&ledger).past_election_ids().await.unwrap();
        assert_eq!(ids, vec![1699900000, 1700000000]);
    }
}
