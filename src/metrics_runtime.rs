use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use metrics_process::Collector;
use once_cell::sync::OnceCell;

static PROM_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();
static PROC_COLLECTOR: OnceCell<Collector> = OnceCell::new();

/// Installs the global Prometheus recorder the library's counters report to.
pub fn init_metrics() -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {}", e))?;
    let _ = PROM_HANDLE.set(handle);

    let collector = Collector::default();
    collector.describe();
    let _ = PROC_COLLECTOR.set(collector);
    Ok(())
}

/// Renders every recorded metric in the Prometheus text format.
pub fn scrape_prometheus_text() -> Option<String> {
    let handle = PROM_HANDLE.get()?;
    if let Some(collector) = PROC_COLLECTOR.get() {
        collector.collect();
    }
    Some(handle.render())
}
