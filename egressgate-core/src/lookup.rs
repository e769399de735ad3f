//! Host name resolution.

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::error::{GateError, Result};

/// Resolves a host name to socket addresses.
#[async_trait]
pub trait HostLookup: Send + Sync {
    /// Returns every address for `host`, in resolver order. Never empty on
    /// success.
    async fn lookup(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>>;
}

/// Resolver backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHostLookup;

#[async_trait]
impl HostLookup for SystemHostLookup {
    async fn lookup(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>> {
        let addresses: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|err| GateError::UpstreamConnectionFailed(format!("could not resolve {host}: {err}")))?
            .collect();

        if addresses.is_empty() {
            return Err(GateError::UpstreamConnectionFailed(format!(
                "no addresses found for {host}"
            )));
        }
        Ok(addresses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ip_literal_resolves_to_itself() {
        let addresses = SystemHostLookup.lookup("127.0.0.1", 8080).await.unwrap();
        assert_eq!(addresses, vec!["127.0.0.1:8080".parse::<SocketAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_upstream_failure() {
        let err = SystemHostLookup
            .lookup("does-not-exist.invalid", 443)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), hyper::StatusCode::BAD_GATEWAY);
    }
}
