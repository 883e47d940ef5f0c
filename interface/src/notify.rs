use async_trait::async_trait;
use serde::Serialize;

/// State transitions the policy reports to the operator's endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notification {
    /// The ledger reported the validator key participating with positive
    /// stake; `next_election_id` is when the next cycle is expected to open.
    ParticipationConfirmed {
        /// The confirmed election.
        election_id: u32,
        /// Expected start of the next election cycle.
        next_election_id: u32,
    },
    /// A submission exists but participation could not be observed on-chain
    /// within the configured timeout; the policy is about to resubmit.
    ParticipationNotConfirmed {
        /// The election awaiting confirmation.
        election_id: u32,
    },
    /// A submission attempt failed terminally for this invocation.
    StakeSendingFailed {
        /// The election the submission targeted.
        election_id: u32,
        /// Human-readable failure description.
        error: String,
    },
}

/// Delivery sink for [`Notification`]s. Implementations must swallow their
/// own transport failures; a broken webhook never blocks the state machine.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one event.
    async fn notify(&self, event: &Notification);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_screaming_tags() {
        let json = serde_json::to_value(Notification::ParticipationConfirmed {
            election_id: 1700000000,
            next_election_id: 1700060000,
        })
        .unwrap();
        assert_eq!(json["event"], "PARTICIPATION_CONFIRMED");
        assert_eq!(json["election_id"], 1700000000);

        let json = serde_json::to_value(Notification::StakeSendingFailed {
            election_id: 1,
            error: "boom".into(),
        })
        .unwrap();
        assert_eq!(json["event"], "STAKE_SENDING_FAILED");
        assert_eq!(json["error"], "boom");
    }
}
