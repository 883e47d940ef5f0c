//! Election message construction.
//!
//! The request that gets signed is a fixed-layout byte sequence; the final
//! message and the recover query are builder specifications handed to the
//! ledger's native serializer.

use esm_interface::{AccountAddress, BocOp};

use crate::error::PolicyError;

const ELECT_REQUEST_TAG: u32 = 0x654C_5074;
const ELECT_SIGNED_TAG: u32 = 0x4E73_744B;
const RECOVER_QUERY_TAG: u32 = 0x4765_7424;

fn factor_fixed_point(max_factor: f64) -> u32 {
    (max_factor * 65536.0).round() as u32
}

/// The to-be-signed election request: tag, election id and stake factor as
/// big-endian words, then the raw wallet id and ADNL key. Hex-encoded.
pub fn validator_elect_req(
    wallet: &AccountAddress,
    election_id: u32,
    max_factor: f64,
    adnl_key: &str,
) -> Result<String, PolicyError> {
    let adnl = hex::decode(adnl_key)
        .map_err(|e| PolicyError::Validation(format!("adnl key is not hex: {e}")))?;
    if adnl.len() != 32 {
        return Err(PolicyError::Validation(format!(
            "adnl key must be 32 bytes, got {}",
            adnl.len()
        )));
    }

    let mut bytes = Vec::with_capacity(76);
    bytes.extend_from_slice(&ELECT_REQUEST_TAG.to_be_bytes());
    bytes.extend_from_slice(&election_id.to_be_bytes());
    bytes.extend_from_slice(&factor_fixed_point(max_factor).to_be_bytes());
    bytes.extend_from_slice(&wallet.account_id_bytes());
    bytes.extend_from_slice(&adnl);

    Ok(hex::encode(bytes))
}

/// Builder specification of the signed election message submitted to the
/// elector.
pub fn validator_elect_signed(
    election_id: u32,
    max_factor: f64,
    adnl_key: &str,
    public_key: &str,
    signature: &str,
    now: u64,
) -> Vec<BocOp> {
    vec![
        BocOp::int(32, u64::from(ELECT_SIGNED_TAG)),
        BocOp::int(64, now),
        BocOp::bits(public_key),
        BocOp::int(32, u64::from(election_id)),
        BocOp::int(32, u64::from(factor_fixed_point(max_factor))),
        BocOp::int_hex(256, format!("0x{adnl_key}")),
        BocOp::Cell {
            builder: vec![BocOp::bits(signature)],
        },
    ]
}

/// Builder specification of the stake-recovery query sent to the elector.
pub fn recover_query(now: u64) -> Vec<BocOp> {
    vec![
        BocOp::int(32, u64::from(RECOVER_QUERY_TAG)),
        BocOp::int(64, now),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elect_request_bytes_are_reproducible() {
        let wallet: AccountAddress = format!("-1:{}", "11".repeat(32)).parse().unwrap();
        let adnl = "22".repeat(32);

        let request = validator_elect_req(&wallet, 1700000000, 3.0, &adnl).unwrap();
        let expected = format!("654c50746553f10000030000{}{}", "11".repeat(32), adnl);
        assert_eq!(request, expected);
        assert_eq!(request.len(), 76 * 2);
    }

    #[test]
    fn fractional_factors_round_to_fixed_point() {
        let wallet: AccountAddress = format!("0:{}", "00".repeat(32)).parse().unwrap();
        let request = validator_elect_req(&wallet, 1, 2.5, &"00".repeat(32)).unwrap();
        // 2.5 * 65536 = 163840 = 0x28000
        assert_eq!(&request[16..24], "00028000");
    }

    #[test]
    fn short_adnl_keys_are_rejected() {
        let wallet: AccountAddress = format!("0:{}", "00".repeat(32)).parse().unwrap();
        let err = validator_elect_req(&wallet, 1, 3.0, "2222").unwrap_err();
        assert!(matches!(err, PolicyError::Validation(_)), "{err}");
    }

    #[test]
    fn signed_message_nests_the_signature_cell() {
        let ops = validator_elect_signed(1700000000, 3.0, &"ab".repeat(32), "cd", "ef", 1700000100);
        assert_eq!(ops.len(), 7);
        assert_eq!(ops[0], BocOp::int(32, 0x4E73744B));
        assert_eq!(ops[1], BocOp::int(64, 1700000100));
        assert_eq!(ops[4], BocOp::int(32, 196608));
        assert!(matches!(&ops[6], BocOp::Cell { builder } if builder == &vec![BocOp::bits("ef")]));
    }

    #[test]
    fn recover_query_is_tag_and_time() {
        let ops = recover_query(1700000100);
        assert_eq!(
            ops,
            vec![BocOp::int(32, 0x47657424), BocOp::int(64, 1700000100)]
        );
    }
}
