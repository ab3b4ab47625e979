use serde::Serialize;

/// Raw record of a gateway webhook delivery.
///
/// Written before any processing so replays and anomalies can be
/// reconstructed; gateways retry undelivered-ack webhooks, so the same
/// payload may appear more than once.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookLog {
    pub id: String,
    pub gateway: String,
    pub event_type: Option<String>,
    pub external_ref: Option<String>,
    pub payload: String,
    /// Processing outcome, updated after the handler finishes.
    pub outcome: Option<String>,
    pub created_at: i64,
}
