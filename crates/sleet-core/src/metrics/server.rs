//! Process-wide Prometheus recorder and the scrape endpoint.
//!
//! The recorder can only be installed once per process. `init_global`
//! installs it and serves `/metrics` plus a `/health` probe;
//! `init_test` installs it without binding a port.

use std::net::SocketAddr;
use std::sync::OnceLock;

use axum::{Extension, Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{
    AlreadyInitializedSnafu, MetricsError, NotInitializedSnafu, PrometheusInitSnafu,
};

pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9090";

/// Bucket bounds in seconds, shared by apply-duration and lag histograms.
const SECONDS_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0,
];

static CONTROLLER: OnceLock<MetricsController> = OnceLock::new();

/// Read access to the installed recorder.
pub struct MetricsController {
    handle: PrometheusHandle,
}

impl MetricsController {
    pub fn get() -> Result<&'static Self, MetricsError> {
        CONTROLLER.get().context(NotInitializedSnafu)
    }

    /// Current snapshot in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

fn install_recorder() -> Result<&'static MetricsController, MetricsError> {
    let handle = PrometheusBuilder::new()
        .set_buckets(SECONDS_BUCKETS)
        .context(PrometheusInitSnafu)?
        .install_recorder()
        .context(PrometheusInitSnafu)?;

    CONTROLLER
        .set(MetricsController { handle })
        .map_err(|_| AlreadyInitializedSnafu.build())?;
    MetricsController::get()
}

/// Install the recorder and serve it on `addr` from a background task.
///
/// Needs a running tokio runtime. Bind failures are logged by the task and
/// do not stop the loader.
pub fn init_global(addr: SocketAddr) -> Result<(), MetricsError> {
    let controller = install_recorder()?;
    tokio::spawn(serve(addr, router(controller.handle.clone())));
    info!(%addr, "Serving metrics");
    Ok(())
}

/// Install the recorder for unit tests. Concurrent callers all return once
/// some recorder is in place.
pub fn init_test() {
    if install_recorder().is_ok() {
        return;
    }
    while CONTROLLER.get().is_none() {
        std::hint::spin_loop();
    }
}

fn router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .route("/health", get(|| async { "ok\n" }))
        .layer(Extension(handle))
}

async fn serve(addr: SocketAddr, app: Router) {
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "Could not bind metrics endpoint");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "Metrics endpoint stopped");
    }
}

async fn render_metrics(Extension(handle): Extension<PrometheusHandle>) -> String {
    handle.render()
}
