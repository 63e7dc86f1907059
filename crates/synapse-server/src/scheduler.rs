//! Periodic SLA monitor.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use synapse_config::SlaConfig;
use synapse_core::identity::Actor;
use synapse_db::service::SynapseService;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Run `check_sla` every `sla.check_interval_secs` until `stop` flips to
/// `true` or its sender is dropped. The first pass runs immediately.
pub fn spawn_sla_monitor(
    service: Arc<SynapseService>,
    config: SlaConfig,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let policy = config.policy();
    let period = Duration::from_secs(config.check_interval_secs.max(1));
    tokio::spawn(async move {
        tracing::info!(interval_secs = period.as_secs(), "SLA monitor started");
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let actor = Actor::system();
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    // check_sla logs its own counts
                    if let Err(e) = service.check_sla(&actor, &policy, Utc::now()).await {
                        tracing::error!(error = %e, "SLA check failed");
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("SLA monitor stopped");
    })
}
