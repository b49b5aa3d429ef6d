use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::db::CertificateStatus;

/// What happened, without the batch/project envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum IssuancePayload {
    BatchStarted {
        total_certificates: u32,
    },
    BatchCompleted,
    BatchFailed {
        error: String,
    },
    CertificateStarted {
        certificate_id: String,
    },
    CertificateCompleted {
        certificate_id: String,
        status: CertificateStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    CertificateRepublished {
        certificate_id: String,
    },
}

/// Progress event for a batch issuance run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceEvent {
    /// Project the batch belongs to.
    pub project_id: String,
    /// Batch being drained.
    pub batch_id: String,
    /// Timestamp of this event.
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: IssuancePayload,
}

impl IssuanceEvent {
    pub fn new(project_id: &str, batch_id: &str, payload: IssuancePayload) -> Self {
        Self {
            project_id: project_id.to_string(),
            batch_id: batch_id.to_string(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Broadcasts issuance events for streaming.
#[derive(Clone)]
pub struct ProgressBroadcaster {
    sender: Arc<broadcast::Sender<IssuanceEvent>>,
}

impl ProgressBroadcaster {
    /// Creates a broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers.
    pub fn send(&self, event: IssuanceEvent) {
        // Ignore errors - no active receivers is fine
        let _ = self.sender.send(event);
    }

    /// Creates a new subscriber for issuance events.
    pub fn subscribe(&self) -> broadcast::Receiver<IssuanceEvent> {
        self.sender.subscribe()
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}
