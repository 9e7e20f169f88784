use crate::config::Config;
use crate::jobs::JobRegistry;
use tracing::info;

/// Start the background task that periodically expires old jobs. Every job
/// older than the configured expiry is deleted through the registry,
/// regardless of its status -- record and temp files both.
pub fn start_sweep_task(registry: JobRegistry, config: Config) -> tokio::task::JoinHandle<()> {
    let expiry = config.job_expiry;
    let sweep_interval = config.cleanup_interval;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            "[cleanup] 🧹 Starting periodic expiry sweep (interval: {:.1} min, max age: {:.1} min)",
            sweep_interval.as_secs_f64() / 60.0,
            expiry.as_secs_f64() / 60.0
        );

        loop {
            interval.tick().await;
            registry.sweep(expiry).await;
        }
    })
}
