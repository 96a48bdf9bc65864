use std::{
    collections::{HashMap, HashSet},
    net::Ipv4Addr,
    sync::{Arc, OnceLock},
    time::Duration,
};

use log::{debug, info, warn};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::caching::ResolutionCache;
use crate::error::{Error, Result};
use crate::listener::Listener;
use crate::probe::{ProbeConfig, ProbeResult, ResultSet};
use crate::registry::Registry;
use crate::resolver::{Resolve, SystemResolver};
use crate::session::{HostSession, SessionLink};
use crate::transport::{IcmpSocket, SocketKind, Transport};

#[derive(Debug, Clone)]
pub struct ProberConfig {
    pub socket_kind: SocketKind,
    pub response_timeout: Duration,
    pub cache_timeout: Duration,
    pub reply_queue_capacity: usize,
}

impl Default for ProberConfig {
    fn default() -> Self {
        ProberConfigBuilder::new().build()
    }
}

#[derive(Debug, Clone)]
pub struct ProberConfigBuilder {
    socket_kind: SocketKind,
    response_timeout: Duration,
    cache_timeout: Duration,
    reply_queue_capacity: usize,
}

impl Default for ProberConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProberConfigBuilder {
    pub fn new() -> Self {
        Self {
            socket_kind: SocketKind::default(),
            response_timeout: Duration::from_secs(1),
            cache_timeout: Duration::from_secs(60),
            reply_queue_capacity: 5,
        }
    }

    pub fn with_socket_kind(mut self, kind: SocketKind) -> Self {
        self.socket_kind = kind;
        self
    }

    /// How long each probe waits for its reply before it counts as lost.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// How long resolved addresses are reused. Zero disables caching.
    pub fn with_cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }

    /// Replies buffered per host; anything beyond is dropped.
    pub fn with_reply_queue_capacity(mut self, capacity: usize) -> Self {
        self.reply_queue_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> ProberConfig {
        ProberConfig {
            socket_kind: self.socket_kind,
            response_timeout: self.response_timeout,
            cache_timeout: self.cache_timeout,
            reply_queue_capacity: self.reply_queue_capacity,
        }
    }
}

/// Probes many hosts at once over a single ICMP endpoint.
///
/// One background listener receives every reply and hands it to the host
/// session that owns the source address, so any number of hosts can be probed
/// concurrently without their replies being confused.
///
/// # Example
/// ```no_run
/// use echo_prober::{ProbeConfig, Prober, ProberConfig};
/// use tokio_util::sync::CancellationToken;
///
/// tokio_test::block_on(async {
///     let mut prober = Prober::open(ProberConfig::default()).expect("Failed to open prober");
///     let results = prober
///         .probe(&CancellationToken::new(), &ProbeConfig::default(), &["127.0.0.1"])
///         .await;
///     println!("{:?}", results["127.0.0.1"]);
///     prober.close().await;
/// })
/// ```
#[derive(Debug)]
pub struct Prober {
    response_timeout: Duration,
    identifier: u16,
    next_sequence: u16,
    transport: Arc<dyn Transport>,
    resolver: Arc<dyn Resolve>,
    cache: Arc<ResolutionCache>,
    registry: Arc<Registry>,
    task_spawner: BackgroundTaskSpawner,
}

impl Prober {
    /// Opens an ICMP socket of the configured kind and starts listening for replies.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns [`Error::TransportOpen`] if the OS refuses the socket.
    pub fn open(config: ProberConfig) -> Result<Self> {
        let socket = IcmpSocket::open(config.socket_kind).map_err(Error::TransportOpen)?;
        Ok(Self::with_transport(
            config,
            Arc::new(socket),
            Arc::new(SystemResolver),
        ))
    }

    /// Builds a prober on top of any transport and resolver.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_transport(
        config: ProberConfig,
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn Resolve>,
    ) -> Self {
        let identifier = std::process::id() as u16;
        let registry = Arc::new(Registry::new(config.reply_queue_capacity));
        let reply_filter = (!transport.assigns_identifier()).then_some(identifier);

        let mut task_spawner = BackgroundTaskSpawner::new();
        task_spawner.spawn(Listener::new(
            Arc::clone(&transport),
            Arc::clone(&registry),
            reply_filter,
        ));

        Self {
            response_timeout: config.response_timeout,
            identifier,
            next_sequence: 0,
            transport,
            resolver,
            cache: Arc::new(ResolutionCache::new(config.cache_timeout)),
            registry,
            task_spawner,
        }
    }

    /// Resolves through `cache` instead of this prober's own cache.
    pub(crate) fn with_resolution_cache(mut self, cache: Arc<ResolutionCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Probes every address concurrently and returns one result per distinct address.
    ///
    /// Each address is resolved in its own task and each resolved IP is
    /// probed by exactly one host session; addresses that resolve to the same
    /// IP share its result. A failure of one host only shows up in that
    /// host's result. Canceling `ctx` stops all hosts, which then report what
    /// they counted so far. Every task has finished by the time this returns.
    ///
    /// If the reply listener has stopped, no probes are sent and every
    /// address reports the listener's error.
    pub async fn probe<S: AsRef<str>>(
        &mut self,
        ctx: &CancellationToken,
        config: &ProbeConfig,
        addresses: &[S],
    ) -> ResultSet {
        let mut seen = HashSet::new();
        let addresses: Vec<String> = addresses
            .iter()
            .map(|address| address.as_ref().to_owned())
            .filter(|address| seen.insert(address.clone()))
            .collect();

        if let Some(reason) = self.task_spawner.failure() {
            let error = Error::ListenerStopped(reason.to_owned()).to_string();
            warn!("not probing {} hosts: {}", addresses.len(), error);
            return addresses
                .into_iter()
                .map(|address| (address, ProbeResult::failed(None, error.clone())))
                .collect();
        }
        info!("probing {} hosts", addresses.len());

        let first_sequence = self.next_sequence;
        self.next_sequence = first_sequence.wrapping_add(config.count as u16);
        let batch = Arc::new(Batch {
            ctx: ctx.clone(),
            config: *config,
            first_sequence,
            resolver: Arc::clone(&self.resolver),
            cache: Arc::clone(&self.cache),
            registry: Arc::clone(&self.registry),
            link: SessionLink {
                transport: Arc::clone(&self.transport),
                identifier: self.identifier,
                response_timeout: self.response_timeout,
            },
        });

        let mut resolutions = JoinSet::new();
        for address in &addresses {
            let batch = Arc::clone(&batch);
            let address = address.clone();
            resolutions.spawn(async move {
                let resolved = batch.resolve(&address).await;
                (address, resolved)
            });
        }

        let mut results = ResultSet::with_capacity(addresses.len());
        let mut sessions = JoinSet::new();
        let mut owners: HashMap<Ipv4Addr, Vec<String>> = HashMap::new();
        let mut per_ip: HashMap<Ipv4Addr, ProbeResult> = HashMap::new();
        loop {
            tokio::select! {
                Some(joined) = resolutions.join_next() => match joined {
                    Ok((address, Resolution::Resolved(ip))) => {
                        let addresses_of_ip = owners.entry(ip).or_default();
                        if addresses_of_ip.is_empty() {
                            let batch = Arc::clone(&batch);
                            let address = address.clone();
                            sessions.spawn(async move {
                                let result = batch.probe_ip(address, ip).await;
                                (ip, result)
                            });
                        } else {
                            debug!("{} shares the session of {}", address, ip);
                        }
                        addresses_of_ip.push(address);
                    }
                    Ok((address, Resolution::Failed(err))) => {
                        debug!("{}", err);
                        results.insert(address, ProbeResult::failed(None, err.to_string()));
                    }
                    Ok((address, Resolution::Canceled)) => {
                        results.insert(address, ProbeResult::default());
                    }
                    Err(err) => warn!("resolution task ended abnormally: {}", err),
                },
                Some(joined) = sessions.join_next() => match joined {
                    Ok((ip, result)) => {
                        per_ip.insert(ip, result);
                    }
                    Err(err) => warn!("host task ended abnormally: {}", err),
                },
                else => break,
            }
        }
        debug_assert_eq!(self.registry.len(), 0);

        for (ip, addresses_of_ip) in owners {
            if let Some(result) = per_ip.get(&ip) {
                for address in addresses_of_ip {
                    results.insert(address, result.clone());
                }
            }
        }
        for address in addresses {
            results
                .entry(address)
                .or_insert_with(|| ProbeResult::failed(None, "probe task ended abnormally"));
        }

        let reachable = results.values().filter(|result| result.is_reachable()).count();
        info!("{} of {} hosts reachable", reachable, results.len());
        results
    }

    /// Stops the reply listener and releases the transport.
    pub async fn close(mut self) {
        self.task_spawner.shutdown().await;
    }
}

enum Resolution {
    Resolved(Ipv4Addr),
    Failed(Error),
    Canceled,
}

/// Everything the tasks of one batch share.
struct Batch {
    ctx: CancellationToken,
    config: ProbeConfig,
    first_sequence: u16,
    resolver: Arc<dyn Resolve>,
    cache: Arc<ResolutionCache>,
    registry: Arc<Registry>,
    link: SessionLink,
}

impl Batch {
    async fn resolve(&self, address: &str) -> Resolution {
        tokio::select! {
            biased;
            _ = self.ctx.cancelled() => Resolution::Canceled,
            resolved = self.cache.resolve(self.resolver.as_ref(), address) => match resolved {
                Ok(ip) => Resolution::Resolved(ip),
                Err(err) => Resolution::Failed(err),
            },
        }
    }

    async fn probe_ip(&self, address: String, ip: Ipv4Addr) -> ProbeResult {
        let (registration, replies) = match self.registry.register(ip, &address) {
            Ok(registered) => registered,
            Err(holder) => {
                return ProbeResult::failed(
                    Some(ip),
                    format!("ip address {} is already being probed for {}", ip, holder),
                )
            }
        };
        HostSession::new(address, ip, replies, registration, self.first_sequence)
            .run(&self.ctx, &self.config, &self.link)
            .await
    }
}

#[derive(Debug)]
struct BackgroundTaskSpawner {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
    failure: Arc<OnceLock<String>>,
}

impl BackgroundTaskSpawner {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            handle: None,
            failure: Arc::new(OnceLock::new()),
        }
    }

    fn spawn(&mut self, mut listener: Listener) {
        let token = self.token.clone();
        let failure = Arc::clone(&self.failure);
        let handle = tokio::task::spawn(async move {
            tokio::select! {
                result = listener.listen() => {
                    if let Err(err) = result {
                        warn!("reply listener stopped: {}", err);
                        let _ = failure.set(err.to_string());
                    }
                },
                _ = token.cancelled() => {
                }
            }
        });
        self.handle = Some(handle);
    }

    /// Why the listener stopped, if it stopped on its own.
    fn failure(&self) -> Option<&str> {
        self.failure.get().map(String::as_str)
    }

    async fn shutdown(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for BackgroundTaskSpawner {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.token.cancel();
        }
    }
}
