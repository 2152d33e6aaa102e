//! Prometheus exporter.
//!
//! Metric names recorded by the crate:
//!
//! | Name | Kind | Labels |
//! |------|------|--------|
//! | `recommendations_total` | counter | `algorithm`, `tier` |
//! | `recommendation_duration_ms` | histogram | `algorithm` |
//! | `cache_hits_total` / `cache_misses_total` | counter | `algorithm` |
//! | `cache_errors_total` | counter | `backend`, `operation` |
//! | `graph_mutations_total` | counter | `op` |
//! | `snapshot_bytes` | gauge | |

use crate::config::MetricsConfig;
use crate::{Error, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{Ipv4Addr, SocketAddr};

/// Handle to the installed exporter.
#[derive(Debug, Clone, Copy)]
pub struct MetricsHandle {
    listen_addr: SocketAddr,
}

impl MetricsHandle {
    /// Address the `/metrics` listener is bound to.
    #[must_use]
    pub const fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }
}

/// Installs the Prometheus recorder and HTTP listener.
///
/// Returns `Ok(None)` when metrics are disabled. Outside a Tokio runtime the
/// exporter creates its own background thread.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the listener
/// cannot bind.
pub fn install_prometheus(config: &MetricsConfig) -> Result<Option<MetricsHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let listen_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
    PrometheusBuilder::new()
        .with_http_listener(listen_addr)
        .install()
        .map_err(|e| Error::operation("metrics_recorder_install", e))?;

    tracing::info!(%listen_addr, "Prometheus metrics listener started");
    Ok(Some(MetricsHandle { listen_addr }))
}
