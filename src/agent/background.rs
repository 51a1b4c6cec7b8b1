//! Background mining loop
//!
//! Mines on a fixed interval, or early once enough new events have been
//! recorded. Stops when the shutdown channel flips to `true`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info, warn};

use super::Agent;

/// Configuration for background processing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    pub enabled: bool,
    /// Seconds between mining cycles
    pub mine_interval_secs: u64,
    /// Mine early after this many new events
    pub mine_every_events: u64,
    /// Top-ranked candidates proposed per cycle
    pub max_proposals_per_cycle: usize,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mine_interval_secs: 300,
            mine_every_events: 100,
            max_proposals_per_cycle: 3,
        }
    }
}

impl BackgroundConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.mine_interval_secs.max(1))
    }
}

pub(super) async fn run_continuous(agent: Arc<Agent>, mut shutdown: watch::Receiver<bool>) {
    let config = agent.config().background.clone();
    if !config.enabled {
        info!("Background mining disabled");
        return;
    }

    info!(
        "Starting background mining (every {}s or {} events)",
        config.mine_interval_secs, config.mine_every_events
    );
    let mut ticker = interval(config.interval());
    let mut last_mined_at = agent.observer().total_recorded();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = agent.observer().recorded() => {
                let recorded = agent.observer().total_recorded();
                if recorded.saturating_sub(last_mined_at) < config.mine_every_events.max(1) {
                    continue;
                }
                debug!("{} new events, mining early", recorded - last_mined_at);
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Background mining shutting down");
                    break;
                }
                continue;
            }
        }

        last_mined_at = agent.observer().total_recorded();
        if let Err(e) = agent.run_cycle().await {
            warn!("Mining cycle error: {}", e);
        }
    }
}
