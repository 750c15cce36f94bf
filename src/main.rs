use lightship::{Configuration, Lightship};
use serde_json::json;
use std::time::Duration;
use tracing::info;

/// Interval between simulated units of work
const WORK_INTERVAL: Duration = Duration::from_secs(5);

/// How long each simulated unit of work keeps its beacon
const WORK_DURATION: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Configuration::from_env()?;
    info!(
        port = config.port,
        timeout = ?config.timeout,
        detect_kubernetes = config.detect_kubernetes,
        "Configuration loaded"
    );

    let lightship = Lightship::start(config).await?;

    lightship.register_shutdown_handler(|| async {
        info!("flushing buffered work before exit");
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(())
    });

    // Simulated workload: every unit of work holds a beacon until done
    let worker = lightship.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(WORK_INTERVAL);
        let mut job: u64 = 0;
        loop {
            ticker.tick().await;
            if worker.is_server_shutting_down() {
                break;
            }
            job += 1;
            let beacon = worker.create_beacon(json!({ "job": job }));
            tokio::spawn(async move {
                tokio::time::sleep(WORK_DURATION).await;
                beacon.release().await;
            });
        }
    });

    lightship.signal_ready();
    info!(address = %lightship.local_addr(), "Service ready");

    // Returns once the shutdown sequence has closed the probe server
    lightship.wait_closed().await;

    info!("Service shut down gracefully");
    Ok(())
}
