use std::{net::Ipv4Addr, time::Duration};

use timedmap::TimedMap;

use crate::error::Result;
use crate::resolver::{resolve, Resolve};

/// Resolved addresses, remembered across batches of one prober.
#[derive(Debug)]
pub(super) struct ResolutionCache {
    timeout: Duration,
    addresses: TimedMap<String, Ipv4Addr>,
}

impl ResolutionCache {
    pub(super) fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            addresses: TimedMap::new(),
        }
    }

    pub(super) async fn resolve(&self, resolver: &dyn Resolve, address: &str) -> Result<Ipv4Addr> {
        if let Some(ip) = self.addresses.get(&address.to_owned()) {
            return Ok(ip);
        }
        let ip = resolve(resolver, address).await?;
        if !self.timeout.is_zero() {
            self.addresses.insert(address.to_owned(), ip, self.timeout);
        }
        Ok(ip)
    }
}
