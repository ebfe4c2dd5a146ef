// src/metrics.rs
//! Prometheus exposition. The recorder is global to the process, so install
//! happens exactly once, from the entrypoint; everything else in the crate
//! just emits through the `metrics` facade.

use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global recorder and seed static config gauges (name,
    /// value pairs from the resolved environment). Errors if a recorder is
    /// already installed.
    pub fn install(config_gauges: &[(&'static str, f64)]) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        for (name, value) in config_gauges {
            metrics::gauge!(*name).set(*value);
        }
        Ok(Self { handle })
    }

    /// Router exposing `/metrics` in the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || std::future::ready(handle.render())),
        )
    }
}
