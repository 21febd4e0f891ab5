//! Reachability Abstraction
//!
//! Lets the core ask the host whether a diagnostic endpoint can be reached
//! before it issues any remote call.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use crate::error::Result;

/// Endpoint probed to decide whether the network is usable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProbeTarget {
    pub host: String,
    pub port: u16,
}

impl ProbeTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Outcome of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    /// The endpoint answered within the timeout
    Reachable,
    /// The endpoint refused, did not answer, or answered too late
    Unreachable,
}

/// Reachability probe trait
///
/// Implementations decide what "reachable" means for their platform:
///
/// - **Desktop**: TCP connect or HTTP `HEAD` against the target
/// - **Mobile**: OS reachability APIs gated by a real request
///
/// Implementations should honour `timeout` themselves; callers additionally
/// bound the whole call by the same value.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::network::{ProbeTarget, ReachabilityProbe};
/// use std::time::Duration;
///
/// async fn online(probe: &dyn ReachabilityProbe) -> bool {
///     let target = ProbeTarget::new("graph.microsoft.com", 443);
///     probe.is_reachable(&target, Duration::from_millis(1000)).await
/// }
/// ```
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Probe `target`, giving up after `timeout`.
    ///
    /// Returns `Err` when the probe itself could not run (for example DNS
    /// resolution failed); callers treat that the same as unreachable.
    async fn probe(&self, target: &ProbeTarget, timeout: Duration) -> Result<Reachability>;

    /// Convenience wrapper collapsing errors into `false`.
    async fn is_reachable(&self, target: &ProbeTarget, timeout: Duration) -> bool {
        matches!(
            self.probe(target, timeout).await,
            Ok(Reachability::Reachable)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;

    struct FixedProbe(Option<Reachability>);

    #[async_trait]
    impl ReachabilityProbe for FixedProbe {
        async fn probe(&self, target: &ProbeTarget, _timeout: Duration) -> Result<Reachability> {
            self.0.ok_or_else(|| BridgeError::Resolution {
                host: target.host.clone(),
                reason: "no such host".to_string(),
            })
        }
    }

    #[test]
    fn test_probe_target_display() {
        let target = ProbeTarget::new("example.com", 443);
        assert_eq!(target.to_string(), "example.com:443");
    }

    #[tokio::test]
    async fn test_is_reachable_collapses_errors() {
        let target = ProbeTarget::new("example.com", 443);
        let timeout = Duration::from_millis(1000);

        assert!(FixedProbe(Some(Reachability::Reachable))
            .is_reachable(&target, timeout)
            .await);
        assert!(!FixedProbe(Some(Reachability::Unreachable))
            .is_reachable(&target, timeout)
            .await);
        assert!(!FixedProbe(None).is_reachable(&target, timeout).await);
    }
}
