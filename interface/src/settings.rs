use serde::{Deserialize, Serialize};

/// Operator-controlled configuration. A singleton inside the datastore,
/// created with defaults on first boot and mutated only by explicit operator
/// calls; updates are recursive defaults-merges (incoming values win,
/// existing values fill gaps). Field names keep the camelCase on-disk layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// The validator's wallet.
    #[serde(default)]
    pub wallet: WalletSettings,
    /// How stakes are sized and routed.
    #[serde(default)]
    pub funding: FundingSettings,
    /// Which ledger-access provider the process runs with.
    #[serde(default)]
    pub ledger_mode: LedgerMode,
    /// Seconds to wait for on-chain participation before resubmitting.
    #[serde(default = "default_participation_confirmation_timeout")]
    pub participation_confirmation_timeout: u64,
    /// Notification endpoint; absent means notifications are only logged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookSettings>,
    /// Sit out the next election cycle.
    #[serde(default)]
    pub skip_next_elections: bool,
    /// Operator override for the next stake size, in whole tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_stake_size: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            wallet: WalletSettings::default(),
            funding: FundingSettings::default(),
            ledger_mode: LedgerMode::default(),
            participation_confirmation_timeout: default_participation_confirmation_timeout(),
            webhook: None,
            skip_next_elections: false,
            next_stake_size: None,
        }
    }
}

fn default_participation_confirmation_timeout() -> u64 {
    3600
}

/// Wallet address and signing keys.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSettings {
    /// Full account address, `<workchain>:<64 hex>`.
    pub addr: String,
    /// The wallet's signing key pair.
    #[serde(default)]
    pub keys: WalletKeys,
}

/// An ed25519 key pair in hex.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WalletKeys {
    /// Hex-encoded public key.
    pub public: String,
    /// Hex-encoded secret key.
    pub secret: String,
}

/// Funding configuration: which strategy sizes and routes the stake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingSettings {
    /// Active strategy.
    #[serde(rename = "type")]
    pub kind: FundingType,
    /// Delegation pool address; required when `kind` is `Depool`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
    /// Baseline stake size in whole tokens, used as a lower bound when the
    /// wallet strategy sizes from the live balance.
    #[serde(default)]
    pub default_stake: u64,
    /// Seconds to wait for the pool to announce its per-election proxy.
    #[serde(default = "default_event_anticipation_timeout")]
    pub event_anticipation_timeout: u64,
}

impl Default for FundingSettings {
    fn default() -> Self {
        Self {
            kind: FundingType::Wallet,
            addr: None,
            default_stake: 0,
            event_anticipation_timeout: default_event_anticipation_timeout(),
        }
    }
}

fn default_event_anticipation_timeout() -> u64 {
    60
}

/// The two funding paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FundingType {
    /// Stake straight from the owned wallet to the elector.
    Wallet,
    /// Stake through a delegation pool and its per-election proxy.
    Depool,
}

/// Which concrete [`crate::LedgerService`] the process is wired with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerMode {
    /// Direct ledger-node API.
    #[default]
    Everos,
    /// Local administrative console.
    Console,
}

/// Webhook endpoint for notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSettings {
    /// URL the JSON event body is POSTed to.
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let s = Settings::default();
        assert_eq!(s.participation_confirmation_timeout, 3600);
        assert_eq!(s.funding.kind, FundingType::Wallet);
        assert_eq!(s.ledger_mode, LedgerMode::Everos);
        assert!(!s.skip_next_elections);
        assert!(s.next_stake_size.is_none());
    }

    #[test]
    fn deserializes_partial_documents() {
        let s: Settings = serde_json::from_value(serde_json::json!({
            "wallet": { "addr": "0:ab" },
            "funding": { "type": "depool", "addr": "0:cd" }
        }))
        .unwrap();
        assert_eq!(s.funding.kind, FundingType::Depool);
        assert_eq!(s.funding.event_anticipation_timeout, 60);
        assert_eq!(s.participation_confirmation_timeout, 3600);
    }
}
