use std::time::Duration;

use esm_interface::{LedgerService, TransactionInput};
use tracing::{debug, warn};

use crate::error::PolicyError;

/// Retry a single-attempt submission with exponential backoff (1 s, 2 s,
/// 4 s, ...). A rejected message and a transport failure are both retryable;
/// the last failure is returned once attempts run out.
pub(crate) async fn submit_with_backoff(
    ledger: &dyn LedgerService,
    input: &TransactionInput,
    attempts: u32,
) -> Result<(), PolicyError> {
    let mut last = PolicyError::Validation("retry attempts must be positive".into());

    for attempt in 0..attempts {
        if attempt > 0 {
            // The exponent is capped so an operator-supplied attempt budget
            // beyond 64 cannot overflow the shift; waits plateau at ~18 h.
            tokio::time::sleep(Duration::from_secs(1u64 << (attempt - 1).min(16))).await;
        }
        match ledger.submit_transaction(input).await {
            Ok(status) if status.success => {
                debug!(attempt = attempt + 1, dest = %input.dest, "transaction accepted");
                return Ok(());
            }
            Ok(_) => {
                warn!(attempt = attempt + 1, dest = %input.dest, "transaction rejected");
                last = PolicyError::Funding("the node did not accept the message".into());
            }
            Err(e) => {
                warn!(attempt = attempt + 1, dest = %input.dest, error = %e, "submission failed");
                last = e.into();
            }
        }
    }

    Err(last)
}

#[cfg(test)]
mod tests {
    use esm_mock_ledger::MockLedger;

    use super::*;

    fn input() -> TransactionInput {
        TransactionInput {
            dest: "0:aa".into(),
            value: 1,
            bounce: true,
            all_balance: false,
            payload: "x".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rejections_are_retried_until_accepted() {
        let ledger = MockLedger::new();
        ledger.reject_next_submissions(2);

        submit_with_backoff(&ledger, &input(), 5).await.unwrap();
        assert_eq!(ledger.submissions().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_attempt_budgets_never_overflow_the_backoff() {
        let ledger = MockLedger::new();
        ledger.reject_next_submissions(70);

        let err = submit_with_backoff(&ledger, &input(), 70).await.unwrap_err();
        assert!(matches!(err, PolicyError::Funding(_)), "{err}");
        assert_eq!(ledger.submissions().len(), 70);
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_are_bounded() {
        let ledger = MockLedger::new();
        ledger.fail_next_submissions(10);

        let err = submit_with_backoff(&ledger, &input(), 3).await.unwrap_err();
        assert!(matches!(err, PolicyError::Ledger(_)), "{err}");
        assert!(ledger.submissions().is_empty());
    }
}
