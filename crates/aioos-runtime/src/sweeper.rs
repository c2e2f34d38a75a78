//! Background job that persists expiry.
//!
//! Reads already report an agent past `expires_at` as expired; the sweeper
//! makes that durable and audits it, once per agent.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use aioos_config::SweepConfig;
use aioos_core::{AgentId, Event, EventBus, Result};
use aioos_registry::RegistryStore;

pub struct ExpirySweeper {
    store: Arc<RegistryStore>,
    events: EventBus,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(store: Arc<RegistryStore>, events: EventBus, interval: Duration) -> Self {
        Self {
            store,
            events,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn from_config(store: Arc<RegistryStore>, events: EventBus, config: &SweepConfig) -> Self {
        Self::new(store, events, Duration::from_secs(config.interval_secs))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Expire everything due at `now` and announce each agent on the bus.
    pub fn sweep_once(&self, now: DateTime<Utc>) -> Result<Vec<AgentId>> {
        let expired = self.store.agents.sweep_expired(now)?;
        for agent_id in &expired {
            self.events.publish(Event::AgentExpired {
                agent_id: *agent_id,
                expired_at: now,
            });
        }
        self.events.publish(Event::SweepCompleted {
            expired: expired.len(),
            timestamp: now,
        });
        Ok(expired)
    }

    /// Sweep on every tick until `cancel` fires. The first sweep runs immediately.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = self.interval.as_millis() as u64, "expiry sweeper started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.sweep_once(Utc::now()) {
                        Ok(expired) => debug!(count = expired.len(), "sweep finished"),
                        Err(e) => error!(error = %e, "expiry sweep failed"),
                    }
                }
            }
        }

        info!("expiry sweeper stopped");
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
