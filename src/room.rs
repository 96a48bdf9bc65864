use std::sync::Arc;

use futures::future::BoxFuture;
use log::info;
use tokio_util::sync::CancellationToken;

use crate::caching::ResolutionCache;
use crate::error::{Error, OpaqueError, Result};
use crate::probe::{ProbeConfig, ResultSet};
use crate::prober::{Prober, ProberConfig};

#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct Device {
    pub address: String,
}

/// Source of the devices that belong to a room.
pub trait DeviceDirectory: Send + Sync {
    fn devices_by_room<'a>(
        &'a self,
        room_id: &'a str,
    ) -> BoxFuture<'a, std::result::Result<Vec<Device>, OpaqueError>>;
}

type Opener = Box<dyn Fn() -> Result<Prober> + Send + Sync>;

/// Probes every device of a room, opening a fresh [`Prober`] for each call.
///
/// Resolved addresses are remembered across calls for the configured cache
/// timeout, even though each call gets its own prober.
pub struct RoomProber<D> {
    directory: D,
    open: Opener,
    cache: Arc<ResolutionCache>,
}

impl<D: DeviceDirectory> RoomProber<D> {
    pub fn new(directory: D, config: ProberConfig) -> Self {
        let cache_timeout = config.cache_timeout;
        let mut room = Self::with_opener(directory, move || Prober::open(config.clone()));
        room.cache = Arc::new(ResolutionCache::new(cache_timeout));
        room
    }

    /// Uses `open` instead of [`Prober::open`] to get a prober for each call.
    ///
    /// Resolved addresses are kept for the default cache timeout.
    pub fn with_opener<F>(directory: D, open: F) -> Self
    where
        F: Fn() -> Result<Prober> + Send + Sync + 'static,
    {
        Self {
            directory,
            open: Box::new(open),
            cache: Arc::new(ResolutionCache::new(ProberConfig::default().cache_timeout)),
        }
    }

    /// Probes the addresses of every device in `room_id`.
    ///
    /// Devices without an address or with `0.0.0.0` are skipped.
    ///
    /// # Errors
    /// Fails if the directory can't list the room or the prober can't be
    /// opened. Problems with individual hosts are reported in their results.
    pub async fn probe_room(
        &self,
        ctx: &CancellationToken,
        room_id: &str,
        config: &ProbeConfig,
    ) -> Result<ResultSet> {
        let devices = self
            .directory
            .devices_by_room(room_id)
            .await
            .map_err(|source| Error::Directory {
                room: room_id.to_owned(),
                source,
            })?;
        let hosts = probe_targets(&devices);
        info!("probing {} devices in {}", hosts.len(), room_id);

        let mut prober = (self.open)()?.with_resolution_cache(Arc::clone(&self.cache));
        let results = prober.probe(ctx, config, &hosts).await;
        prober.close().await;
        Ok(results)
    }
}

fn probe_targets(devices: &[Device]) -> Vec<&str> {
    devices
        .iter()
        .map(|device| device.address.as_str())
        .filter(|address| !address.is_empty() && !address.eq_ignore_ascii_case("0.0.0.0"))
        .collect()
}
