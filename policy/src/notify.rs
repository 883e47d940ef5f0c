//! Notification sinks. Delivery failures are logged and swallowed; a broken
//! endpoint must never stall the state machine.

use std::sync::Arc;

use async_trait::async_trait;
use esm_interface::{Notification, Notifier, WebhookSettings};
use tracing::{info, warn};

/// Fallback sink used when no webhook is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &Notification) {
        info!(?event, "notification");
    }
}

/// POSTs the JSON event body to the configured endpoint.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &Notification) {
        let sent = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .and_then(|response| response.error_for_status());
        if let Err(e) = sent {
            warn!(url = %self.url, error = %e, "webhook delivery failed");
        }
    }
}

/// Pick the sink matching the operator's settings.
pub fn notifier_for(webhook: Option<&WebhookSettings>) -> Arc<dyn Notifier> {
    match webhook {
        Some(settings) => Arc::new(WebhookNotifier::new(&settings.url)),
        None => Arc::new(LogNotifier),
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn events_reach_the_endpoint_as_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({
                "event": "PARTICIPATION_NOT_CONFIRMED",
                "election_id": 1700000000u32
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(format!("{}/hook", server.uri()));
        notifier
            .notify(&Notification::ParticipationNotConfirmed {
                election_id: 1700000000,
            })
            .await;
    }

    #[tokio::test]
    async fn delivery_failures_are_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(server.uri());
        notifier
            .notify(&Notification::StakeSendingFailed {
                election_id: 1,
                error: "boom".into(),
            })
            .await;
    }
}
