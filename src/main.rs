use anyhow::Result;
use dockwatch::*;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

const USAGE: &str = "usage: dockwatch <container-id> [--snapshot]";

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(s) => s,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let mut args = std::env::args().skip(1);
    let container_id = args.next().ok_or_else(|| anyhow::anyhow!(USAGE))?;
    let snapshot = match args.next().as_deref() {
        None => false,
        Some("--snapshot") => true,
        Some(other) => anyhow::bail!("unexpected argument {:?}; {}", other, USAGE),
    };

    let app_config = config::AppConfig::load()?;
    let docker_repo = Arc::new(docker_repo::DockerRepo::connect_with_config(&app_config.docker)?);
    let registry = registry::SessionRegistry::new(docker_repo, &app_config);
    let dashboard = dashboard::Dashboard::new(&app_config);

    let (command_tx, command_rx) = mpsc::channel(consumer::COMMAND_CHANNEL_CAPACITY);
    let consumer_handle = consumer::spawn(registry, dashboard, command_rx, app_config);

    tracing::info!(container_id = %container_id, "{} {} watching container", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    command_tx
        .send(consumer::Command::Focus(container_id.clone()))
        .await?;
    if snapshot {
        command_tx
            .send(consumer::Command::LoadLogSnapshot(container_id))
            .await?;
    }

    shutdown_signal().await;
    tracing::info!("Received shutdown signal");
    let _ = command_tx.send(consumer::Command::Shutdown).await;
    let dashboard = consumer_handle.await?;

    let counters = dashboard.counters();
    tracing::info!(
        metrics_received = counters.metrics_received,
        log_lines_received = counters.log_lines_received,
        streams_ended = counters.streams_ended,
        starts_failed = counters.starts_failed,
        "Shut down cleanly"
    );
    Ok(())
}
