use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsConfig;

/// Serve Prometheus metrics over HTTP when enabled.
pub fn install(config: &MetricsConfig) -> anyhow::Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let address: SocketAddr = config.listen_address.parse()?;
    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics exporter: {}", e))?;

    tracing::info!("Metrics exporter listening on {}", address);
    Ok(())
}
