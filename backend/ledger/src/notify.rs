//! Notification sink.
//!
//! The ledger never blocks on delivery success: every event is logged, and
//! when a webhook endpoint is configured the payload is POSTed from a
//! spawned task. Delivery failures are logged and swallowed; no ledger
//! mutation is ever rolled back by the sink.

use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

/// Event kinds understood by the messaging subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyKind {
    /// A new funding request opened for investment (global broadcast).
    NewOpportunity,
    /// An investor funded the farmer's request.
    InvestmentReceived,
    /// The farmer posted a progress update on a project.
    ProjectUpdate,
    /// An investment was harvested and a payout credited.
    PayoutSent,
    /// Every investment against the project reached a terminal state.
    ProjectCompleted,
}

/// Who receives a notification.
#[derive(Debug, Clone)]
pub enum Recipients {
    /// An explicit list of user ids.
    Ids(Vec<String>),
    /// Broadcast to everyone the messaging subsystem knows.
    Global,
}

impl Recipients {
    pub fn one(id: impl Into<String>) -> Self {
        Self::Ids(vec![id.into()])
    }

    fn into_field(self) -> Option<Vec<String>> {
        match self {
            Self::Ids(ids) => Some(ids),
            Self::Global => None,
        }
    }
}

/// Entity a notification is about.
#[derive(Debug, Clone, Serialize)]
pub struct RelatedEntity {
    pub kind: &'static str,
    pub id: String,
}

impl RelatedEntity {
    pub fn funding_request(id: impl Into<String>) -> Self {
        Self {
            kind: "funding_request",
            id: id.into(),
        }
    }

    pub fn investment_record(id: impl Into<String>) -> Self {
        Self {
            kind: "investment_record",
            id: id.into(),
        }
    }
}

/// Payload delivered to the messaging subsystem.
#[derive(Debug, Clone, Serialize)]
struct Notification {
    /// `None` means global broadcast.
    recipients: Option<Vec<String>>,
    kind: NotifyKind,
    message: String,
    related: Option<RelatedEntity>,
}

/// Fire-and-forget handle to the messaging subsystem.
#[derive(Clone)]
pub struct Notifier {
    client: Client,
    webhook_url: Option<String>,
}

impl Notifier {
    pub fn new(client: Client, webhook_url: Option<String>) -> Self {
        Self {
            client,
            webhook_url,
        }
    }

    /// Sink with no webhook endpoint; events are only logged.
    pub fn disabled() -> Self {
        Self {
            client: Client::new(),
            webhook_url: None,
        }
    }

    /// Emit one notification. Returns immediately; delivery happens in the
    /// background and failures never surface to the caller.
    pub fn notify(
        &self,
        recipients: Recipients,
        kind: NotifyKind,
        message: impl Into<String>,
        related: Option<RelatedEntity>,
    ) {
        let notification = Notification {
            recipients: recipients.into_field(),
            kind,
            message: message.into(),
            related,
        };

        info!(
            kind = ?notification.kind,
            recipients = notification
                .recipients
                .as_ref()
                .map_or_else(|| "global".to_string(), |ids| ids.join(",")),
            "{}",
            notification.message
        );

        let Some(url) = self.webhook_url.clone() else {
            return;
        };
        let client = self.client.clone();
        tokio::spawn(async move {
            let result = client
                .post(&url)
                .json(&notification)
                .send()
                .await
                .and_then(|r| r.error_for_status());
            if let Err(e) = result {
                warn!("notification delivery failed: {e}");
            }
        });
    }
}
