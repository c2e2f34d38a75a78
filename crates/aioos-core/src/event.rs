use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::sync::Arc;
use tokio::sync::broadcast;

/// Governance events published as agents move through their lifecycle
/// and tasks pass through the execution gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    // ── Agent lifecycle ────────────────────────────────────────
    AgentExpired {
        agent_id: Uuid,
        expired_at: DateTime<Utc>,
    },

    // ── Task lifecycle ─────────────────────────────────────────
    TaskAuthorized {
        task_id: Uuid,
        agent_id: Uuid,
        overall_score: f64,
    },
    TaskEscalated {
        agent_id: Uuid,
        escalation_level: String,
        reason: Option<String>,
    },
    TaskFinished {
        task_id: Uuid,
        agent_id: Uuid,
        success: bool,
    },

    // ── System ─────────────────────────────────────────────────
    SweepCompleted {
        expired: usize,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for lifecycle notifications.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<Event>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, event: Event) {
        // Ignore send errors (no subscribers).
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
