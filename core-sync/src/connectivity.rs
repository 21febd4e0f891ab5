//! Reachability precondition for remote operations.

use crate::error::{Result, SyncError};
use bridge_traits::{ProbeTarget, Reachability, ReachabilityProbe};
use core_async::time::{timeout, Duration};
use core_runtime::config::ConnectivityConfig;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Fails fast when the diagnostic host cannot be reached.
///
/// The gate is a precondition, never a retry target: a failed check ends the
/// calling operation with [`SyncError::HostUnavailable`].
#[derive(Clone)]
pub struct ConnectivityGate {
    probe: Arc<dyn ReachabilityProbe>,
    config: ConnectivityConfig,
}

impl ConnectivityGate {
    pub fn new(probe: Arc<dyn ReachabilityProbe>, config: ConnectivityConfig) -> Self {
        Self { probe, config }
    }

    pub fn config(&self) -> &ConnectivityConfig {
        &self.config
    }

    /// Probes the configured host.
    pub async fn check_reachable(&self) -> Result<()> {
        let target = ProbeTarget::new(self.config.probe_host.clone(), self.config.probe_port);
        self.check(&target, self.config.timeout).await
    }

    /// Probes `target`, bounding the whole probe by `limit` whether or not
    /// the probe honours it.
    #[instrument(skip(self), fields(host = %target.host, port = target.port))]
    pub async fn check(&self, target: &ProbeTarget, limit: Duration) -> Result<()> {
        let unavailable = |reason: String| {
            warn!(reason = %reason, "Connectivity check failed");
            SyncError::HostUnavailable {
                host: target.host.clone(),
                reason,
            }
        };

        match timeout(limit, self.probe.probe(target, limit)).await {
            Ok(Ok(Reachability::Reachable)) => {
                debug!("Host reachable");
                Ok(())
            }
            Ok(Ok(Reachability::Unreachable)) => Err(unavailable("host unreachable".to_string())),
            Ok(Err(e)) => Err(unavailable(e.to_string())),
            Err(_) => Err(unavailable(format!(
                "probe timed out after {}ms",
                limit.as_millis()
            ))),
        }
    }
}

impl std::fmt::Debug for ConnectivityGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityGate")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
