//! Prometheus export for merge pass metrics.
//!
//! The worker runs to completion instead of serving, so metrics are written
//! out once as a text exposition file for a node exporter to pick up.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::fs;
use std::path::Path;

/// Install the Prometheus recorder for the engine's metrics.
/// Returns a handle that can be used to render them.
pub fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

/// Write the current metrics in Prometheus text format.
pub fn write_snapshot(handle: &PrometheusHandle, path: &Path) -> Result<()> {
    fs::write(path, handle.render())
        .with_context(|| format!("Failed to write metrics to {}", path.display()))
}
