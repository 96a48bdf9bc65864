use std::fmt::Debug;
use std::io;
use std::net::{IpAddr, Ipv4Addr};

use futures::future::BoxFuture;

use crate::error::{Error, Result};

/// Name lookup primitive: a host name to every address it is known by.
pub trait Resolve: Debug + Send + Sync + 'static {
    fn lookup<'a>(&'a self, host: &'a str) -> BoxFuture<'a, io::Result<Vec<IpAddr>>>;
}

/// Resolves names with the system resolver.
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemResolver;

impl Resolve for SystemResolver {
    fn lookup<'a>(&'a self, host: &'a str) -> BoxFuture<'a, io::Result<Vec<IpAddr>>> {
        Box::pin(async move {
            Ok(tokio::net::lookup_host((host, 0))
                .await?
                .map(|addr| addr.ip())
                .collect())
        })
    }
}

/// Resolves `address` to the first IPv4 address it is known by.
///
/// Literal IPv4 addresses are returned without a lookup. IPv4-mapped IPv6
/// results count as IPv4; any other IPv6 result is skipped.
///
/// # Errors
/// Returns [`Error::Resolution`] if the lookup fails or yields no IPv4 address.
pub async fn resolve(resolver: &dyn Resolve, address: &str) -> Result<Ipv4Addr> {
    if let Ok(ip) = address.parse::<Ipv4Addr>() {
        return Ok(ip);
    }
    let candidates = resolver
        .lookup(address)
        .await
        .map_err(|err| Error::Resolution(format!("lookup {} failed: {}", address, err)))?;
    candidates
        .into_iter()
        .find_map(|ip| match ip {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(ip) => ip.to_ipv4_mapped(),
        })
        .ok_or_else(|| Error::Resolution(format!("no ipv4 address found for {}", address)))
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    use super::*;
    use crate::testing::StaticResolver;

    #[tokio::test]
    async fn test_literal_skips_lookup() {
        let resolver = StaticResolver::new();
        let ip = resolve(&resolver, "192.0.2.10").await.unwrap();
        assert_eq!(ip, Ipv4Addr::new(192, 0, 2, 10));
    }

    #[tokio::test]
    async fn test_first_ipv4_wins() {
        let resolver = StaticResolver::new().with_host(
            "projector",
            &[
                IpAddr::V6(Ipv6Addr::LOCALHOST),
                IpAddr::V4(Ipv4Addr::new(10, 5, 0, 1)),
                IpAddr::V4(Ipv4Addr::new(10, 5, 0, 2)),
            ],
        );
        let ip = resolve(&resolver, "projector").await.unwrap();
        assert_eq!(ip, Ipv4Addr::new(10, 5, 0, 1));
    }

    #[tokio::test]
    async fn test_mapped_ipv6_counts_as_ipv4() {
        let mapped = Ipv4Addr::new(10, 5, 0, 3).to_ipv6_mapped();
        let resolver = StaticResolver::new().with_host("display", &[IpAddr::V6(mapped)]);
        let ip = resolve(&resolver, "display").await.unwrap();
        assert_eq!(ip, Ipv4Addr::new(10, 5, 0, 3));
    }

    #[tokio::test]
    async fn test_ipv6_only_host() {
        let resolver =
            StaticResolver::new().with_host("v6-only", &[IpAddr::V6(Ipv6Addr::LOCALHOST)]);
        let err = resolve(&resolver, "v6-only").await.unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
        assert!(err.to_string().contains("no ipv4 address found"));
    }

    #[tokio::test]
    async fn test_unknown_host() {
        let resolver = StaticResolver::new();
        let err = resolve(&resolver, "missing.invalid").await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("failed to resolve ip address: lookup missing.invalid failed"));
    }
}
