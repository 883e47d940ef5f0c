#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

mod address;
mod error;
mod ledger;
mod notify;
mod record;
mod settings;

pub use address::AccountAddress;
pub use error::LedgerError;
pub use ledger::{BocOp, GeneratedKey, LedgerService, SubmitStatus, TransactionInput};
pub use notify::{Notification, Notifier};
pub use record::{ElectionRecord, ElectionSummary};
pub use settings::{
    FundingSettings, FundingType, LedgerMode, Settings, WalletKeys, WalletSettings,
    WebhookSettings,
};
