use fair_price::error::AppError;
use fair_price::telemetry::TelemetryError;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::Path;
use tracing::info;

/// Installs the global Prometheus recorder; counters emitted afterwards are captured.
pub(crate) fn install_recorder() -> Result<PrometheusHandle, TelemetryError> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|err| TelemetryError::Metrics(err.to_string()))
}

pub(crate) fn write_snapshot(handle: &PrometheusHandle, path: &Path) -> Result<(), AppError> {
    let rendered = handle.render();
    std::fs::write(path, &rendered)?;
    info!(path = %path.display(), bytes = rendered.len(), "metrics written");
    Ok(())
}
