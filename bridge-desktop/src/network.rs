//! Reachability Probe Implementations

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    network::{ProbeTarget, Reachability, ReachabilityProbe},
};
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::{timeout, Instant};
use tracing::debug;

/// Probe that resolves the target and opens a TCP connection to it.
///
/// Resolution failures are reported as errors; refused, unroutable or slow
/// connections as [`Reachability::Unreachable`]. Every resolved address is
/// tried until one connects or the time budget runs out.
#[derive(Debug, Clone, Default)]
pub struct TcpReachabilityProbe;

impl TcpReachabilityProbe {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ReachabilityProbe for TcpReachabilityProbe {
    async fn probe(&self, target: &ProbeTarget, budget: Duration) -> Result<Reachability> {
        let deadline = Instant::now() + budget;

        let addrs: Vec<_> = match timeout(budget, lookup_host((target.host.as_str(), target.port)))
            .await
        {
            Ok(Ok(addrs)) => addrs.collect(),
            Ok(Err(e)) => {
                return Err(BridgeError::Resolution {
                    host: target.host.clone(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                debug!(target = %target, "Resolution timed out");
                return Ok(Reachability::Unreachable);
            }
        };

        for addr in addrs {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            match timeout(remaining, TcpStream::connect(addr)).await {
                Ok(Ok(_)) => {
                    debug!(target = %target, addr = %addr, "Target reachable");
                    return Ok(Reachability::Reachable);
                }
                Ok(Err(e)) => debug!(addr = %addr, error = %e, "Connect failed"),
                Err(_) => debug!(addr = %addr, "Connect timed out"),
            }
        }

        Ok(Reachability::Unreachable)
    }
}

/// Probe that issues an HTTPS `HEAD` request to the target.
///
/// Any HTTP response, whatever its status, counts as reachable. Useful where
/// outbound traffic must go through an HTTP proxy that a raw TCP connect
/// would bypass.
#[derive(Debug, Clone)]
pub struct HttpReachabilityProbe {
    client: reqwest::Client,
}

impl HttpReachabilityProbe {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("cloudsync-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReachabilityProbe for HttpReachabilityProbe {
    async fn probe(&self, target: &ProbeTarget, budget: Duration) -> Result<Reachability> {
        let url = format!("https://{}:{}/", target.host, target.port);

        match self.client.head(&url).timeout(budget).send().await {
            Ok(response) => {
                debug!(target = %target, status = response.status().as_u16(), "Target answered");
                Ok(Reachability::Reachable)
            }
            Err(e) if e.is_builder() => Err(BridgeError::OperationFailed(format!(
                "Invalid probe URL {}: {}",
                url, e
            ))),
            Err(e) => {
                debug!(target = %target, error = %e, "Probe request failed");
                Ok(Reachability::Unreachable)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_probe_reaches_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpReachabilityProbe::new();
        let result = probe
            .probe(&ProbeTarget::new("127.0.0.1", port), Duration::from_millis(1000))
            .await
            .unwrap();

        assert_eq!(result, Reachability::Reachable);
    }

    #[tokio::test]
    async fn test_tcp_probe_closed_port_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = TcpReachabilityProbe::new();
        let result = probe
            .probe(&ProbeTarget::new("127.0.0.1", port), Duration::from_millis(1000))
            .await
            .unwrap();

        assert_eq!(result, Reachability::Unreachable);
    }

    #[tokio::test]
    async fn test_tcp_probe_unresolvable_host_errors() {
        let probe = TcpReachabilityProbe::new();
        let result = probe
            .probe(
                &ProbeTarget::new("host.invalid", 443),
                Duration::from_millis(1000),
            )
            .await;

        // Either the resolver fails outright or it times out within the budget.
        assert!(!matches!(result, Ok(Reachability::Reachable)));
    }

    #[tokio::test]
    async fn test_http_probe_builds() {
        assert!(HttpReachabilityProbe::new().is_ok());
    }
}
