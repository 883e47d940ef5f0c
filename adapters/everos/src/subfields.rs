//! GraphQL sub-field selections for the ledger configuration parameters the
//! staking policy reads. Scalar parameters select nothing extra; structured
//! ones spell out their shape. Unknown ids fall back to a bare selection.

const VALIDATOR_SET: &str = "{
    utime_since
    utime_until
    total
    total_weight
    total_weight_dec
    list {
        public_key
        adnl_addr
        weight
        weight_dec
    }
}";

pub fn for_param(id: u32) -> &'static str {
    match id {
        // Service contract addresses (elector is p1).
        0..=4 => "",
        // Election parameters.
        15 => "{
            validators_elected_for
            elections_start_before
            elections_end_before
            stake_held_for
        }",
        // Validator count limits.
        16 => "{
            max_validators
            max_main_validators
            min_validators
        }",
        // Validator stake parameters.
        17 => "{
            min_stake
            max_stake
            min_total_stake
            max_stake_factor
        }",
        // Previous/current/next validator sets, permanent and temporary.
        32..=37 => VALIDATOR_SET,
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn election_params_expose_the_two_policy_fields() {
        let p15 = for_param(15);
        assert!(p15.contains("validators_elected_for"));
        assert!(p15.contains("elections_start_before"));
    }

    #[test]
    fn validator_sets_share_one_shape() {
        assert_eq!(for_param(34), for_param(36));
        assert_eq!(for_param(1), "");
        assert_eq!(for_param(999), "");
    }
}
