use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// A raw Everscale account address: `<workchain>:<64 hex digits>`.
///
/// The hex part is the 256-bit account id inside the workchain. Parsing is
/// strict; anything that does not match the grammar is rejected up front so
/// that malformed addresses never reach the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountAddress {
    workchain: i32,
    account_id: String,
}

impl AccountAddress {
    /// Workchain the account lives in (`-1` for the masterchain).
    pub fn workchain(&self) -> i32 {
        self.workchain
    }

    /// The 64-hex-digit account id, without the workchain prefix.
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// The account id as raw bytes (always 32 of them).
    pub fn account_id_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        // Length and hex validity are guaranteed by the constructor.
        hex::decode_to_slice(&self.account_id, &mut out).expect("account id is 64 hex digits");
        out
    }
}

impl FromStr for AccountAddress {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || LedgerError::MalformedAddress(s.to_string());
        let (workchain, account_id) = s.split_once(':').ok_or_else(malformed)?;
        let workchain: i32 = workchain.parse().map_err(|_| malformed())?;

        if account_id.len() != 64 || !account_id.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(malformed());
        }

        Ok(Self {
            workchain,
            account_id: account_id.to_ascii_lowercase(),
        })
    }
}

impl TryFrom<String> for AccountAddress {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccountAddress> for String {
    fn from(addr: AccountAddress) -> Self {
        addr.to_string()
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.workchain, self.account_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ELECTOR: &str = "-1:3333333333333333333333333333333333333333333333333333333333333333";

    #[test]
    fn parses_masterchain_address() {
        let addr: AccountAddress = ELECTOR.parse().unwrap();
        assert_eq!(addr.workchain(), -1);
        assert_eq!(addr.account_id().len(), 64);
        assert_eq!(addr.to_string(), ELECTOR);
    }

    #[test]
    fn rejects_bad_grammar() {
        for bad in [
            "",
            "3333",
            "0:abc",
            "0:zzzz333333333333333333333333333333333333333333333333333333333333",
            "x:3333333333333333333333333333333333333333333333333333333333333333",
        ] {
            assert!(bad.parse::<AccountAddress>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn account_id_round_trips_to_bytes() {
        let addr: AccountAddress = ELECTOR.parse().unwrap();
        assert_eq!(addr.account_id_bytes(), [0x33u8; 32]);
    }
}
