use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::core::config::Settings;

/// Installs the Prometheus recorder. The worker carries no HTTP surface of
/// its own, so the exporter serves the scrape endpoint on a dedicated
/// listener. Must run inside the tokio runtime.
pub fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let addr: SocketAddr = settings.telemetry().prometheus_listen_addr.parse()?;
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(%addr, "Prometheus exporter listening");
    Ok(())
}
