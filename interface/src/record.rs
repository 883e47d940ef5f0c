use serde::{Deserialize, Serialize};

fn is_false(v: &bool) -> bool {
    !*v
}

/// Durable per-election state, keyed by the election's on-chain start
/// timestamp. One record per cycle; records are never deleted; they are the
/// audit trail of the validator's participation.
///
/// Field pairs have atomic lifecycles: `key`/`adnl_key`/`secrets` are set
/// together by key provisioning, `public_key`/`signature` together by request
/// signing. Field names keep the camelCase layout of the on-disk document so
/// the store stays human-inspectable and compatible with earlier deployments.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionRecord {
    /// Election id: the election's on-chain start timestamp.
    pub id: u32,
    /// Hex-encoded 32-byte validator key hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Hex-encoded 32-byte ADNL key hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adnl_key: Option<String>,
    /// Opaque key-material placeholders tied to `key`/`adnl_key`. Entries may
    /// be nulls when the provider keeps custody of secrets; presence of the
    /// field marks provisioning as done.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<serde_json::Value>,
    /// Public key exported from `key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Signature over the election request; produced once per record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Cumulative stake contributed toward this election, in whole tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stake: Option<u64>,
    /// Epoch seconds of the most recent successful submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_stake_sending_time: Option<u64>,
    /// True only after the ledger itself reported the key participating with
    /// positive stake.
    #[serde(default, skip_serializing_if = "is_false")]
    pub participation_confirmed: bool,
    /// Pool funding only: the post-election housekeeping call for the cycle
    /// following this election has been made.
    #[serde(default, skip_serializing_if = "is_false")]
    pub post_elections_ticktock_is_sent: bool,
}

impl ElectionRecord {
    /// An empty record for `id`, as handed out on a store miss.
    pub fn new(id: u32) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Whether key provisioning has run for this record.
    pub fn has_keys(&self) -> bool {
        self.key.is_some() && self.adnl_key.is_some()
    }

    /// Whether all material needed for key restoration survived a restart.
    pub fn restorable(&self) -> bool {
        self.has_keys() && self.secrets.is_some()
    }
}

/// The externally visible slice of an [`ElectionRecord`]: everything except
/// secrets and signatures.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionSummary {
    /// Election id.
    pub id: u32,
    /// Validator key hash.
    pub key: Option<String>,
    /// Exported public key.
    pub public_key: Option<String>,
    /// ADNL key hash.
    pub adnl_key: Option<String>,
    /// Cumulative stake in whole tokens.
    pub stake: Option<u64>,
    /// Epoch seconds of the last successful submission.
    pub last_stake_sending_time: Option<u64>,
    /// On-chain confirmation flag.
    pub participation_confirmed: bool,
}

impl From<&ElectionRecord> for ElectionSummary {
    fn from(r: &ElectionRecord) -> Self {
        Self {
            id: r.id,
            key: r.key.clone(),
            public_key: r.public_key.clone(),
            adnl_key: r.adnl_key.clone(),
            stake: r.stake,
            last_stake_sending_time: r.last_stake_sending_time,
            participation_confirmed: r.participation_confirmed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_record_serializes_to_bare_id() {
        let json = serde_json::to_value(ElectionRecord::new(1700000000)).unwrap();
        assert_eq!(json, serde_json::json!({ "id": 1700000000u32 }));
    }

    #[test]
    fn camel_case_layout_round_trips() {
        let doc = serde_json::json!({
            "id": 1,
            "adnlKey": "ab",
            "key": "cd",
            "secrets": [null, null],
            "lastStakeSendingTime": 123,
            "participationConfirmed": true
        });
        let rec: ElectionRecord = serde_json::from_value(doc.clone()).unwrap();
        assert!(rec.restorable());
        assert_eq!(rec.last_stake_sending_time, Some(123));
        assert_eq!(serde_json::to_value(&rec).unwrap(), doc);
    }

    #[test]
    fn summary_never_exposes_secrets() {
        let rec = ElectionRecord {
            id: 5,
            secrets: Some(serde_json::json!(["top", "secret"])),
            signature: Some("sig".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(ElectionSummary::from(&rec)).unwrap();
        assert!(json.get("secrets").is_none());
        assert!(json.get("signature").is_none());
    }
}
