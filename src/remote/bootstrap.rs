//! Discovery of a remote cluster from a handful of seed endpoints.
//!
//! A call to [`PeerBootstrap::fetch`] runs rounds of status probes against
//! every seed that has not answered yet, until all answered or the time
//! budget is used up. Answers are aggregated together with the gossip they
//! carry, and the overlapping remote nodes are ranked into a
//! [`RemoteCluster`].

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::RemoteCluster;
use super::aggregator::{ProbeResponse, RemoteClusterAggregator};
use super::clock::{Clock, SystemClock};
use super::fetcher::{FetchError, StatusFetcher};
use crate::cluster::LocalCluster;
use crate::shutdown::Shutdown;
use crate::topology::NodeAddr;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Upper bound for a single status request.
    pub per_call_timeout: Duration,
    /// A round in which nobody answered is stretched to at least this long.
    pub min_round_interval: Duration,
    /// How long a bootstrapped [`RemoteCluster`] stays valid.
    pub snapshot_ttl: Duration,
    /// Time budget of one bootstrap when run by the tracker.
    pub max_wait: Duration,
    /// Pause after a bootstrap that produced nothing.
    pub retry_cooldown: Duration,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        BootstrapConfig {
            per_call_timeout: Duration::from_secs(5),
            min_round_interval: Duration::from_secs(1),
            snapshot_ttl: Duration::from_secs(60),
            max_wait: Duration::from_secs(20),
            retry_cooldown: Duration::from_secs(10),
        }
    }
}

pub struct PeerBootstrap<F> {
    config: BootstrapConfig,
    cluster: Arc<LocalCluster>,
    local_address: NodeAddr,
    seeds: Vec<NodeAddr>,
    fetcher: F,
    clock: Arc<dyn Clock>,
    shutdown: Shutdown,
}

impl<F> PeerBootstrap<F>
where
    F: StatusFetcher,
{
    /// `local_address` must be registered in `cluster` by the time a
    /// bootstrap ranks its results; its ranges are looked up afresh on every
    /// call to [`fetch`](Self::fetch).
    pub fn new(
        config: BootstrapConfig,
        cluster: Arc<LocalCluster>,
        local_address: NodeAddr,
        seeds: Vec<NodeAddr>,
        fetcher: F,
    ) -> PeerBootstrap<F> {
        PeerBootstrap {
            config,
            cluster,
            local_address,
            seeds,
            fetcher,
            clock: Arc::new(SystemClock),
            shutdown: Shutdown::never(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    pub fn seeds(&self) -> &[NodeAddr] {
        &self.seeds
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Run one bootstrap with a time budget of `max_wait`.
    ///
    /// Returns `None` when no seed answered in time, when no remote node
    /// overlaps the local node, when the local node is not registered, or
    /// when shutdown was requested. None of these are errors; the caller
    /// retries later.
    pub async fn fetch(&self, max_wait: Duration) -> Option<RemoteCluster> {
        let started = self.clock.now_millis();
        let deadline = started.saturating_add(millis(max_wait));
        let mut pending = self.seeds.clone();
        let mut aggregator = RemoteClusterAggregator::new(self.cluster.keyspace());
        let mut round = 0u32;

        while !pending.is_empty() {
            if self.shutdown.is_triggered() {
                info!(round, "shutdown requested, abandoning remote cluster bootstrap");
                return None;
            }
            let round_start = self.clock.now_millis();
            if round_start >= deadline {
                break;
            }
            round += 1;
            let call_timeout =
                Duration::from_millis(deadline - round_start).min(self.config.per_call_timeout);

            let probes = join_all(
                pending
                    .iter()
                    .map(|endpoint| self.probe(endpoint, call_timeout)),
            );
            let results = tokio::select! {
                results = probes => results,
                _ = self.shutdown.triggered() => {
                    info!(round, "shutdown requested while probing, discarding partial round");
                    return None;
                }
            };

            let mut answered = 0usize;
            let mut failures = Vec::new();
            let mut still_pending = Vec::new();
            for (endpoint, result) in pending.into_iter().zip(results) {
                match result.and_then(|response| aggregator.apply_response(&endpoint, response)) {
                    Ok(()) => {
                        debug!(round, %endpoint, "remote endpoint answered");
                        answered += 1;
                    }
                    Err(e) => {
                        failures.push(format!("{endpoint}: {e}"));
                        still_pending.push(endpoint);
                    }
                }
            }
            pending = still_pending;

            if !failures.is_empty() {
                warn!(
                    round,
                    answered,
                    pending = pending.len(),
                    errors = %failures.join("; "),
                    "remote status requests failed"
                );
            }

            if answered == 0 && !pending.is_empty() {
                let now = self.clock.now_millis();
                let elapsed = now.saturating_sub(round_start);
                let min_round = millis(self.config.min_round_interval);
                if elapsed < min_round {
                    let pause = (min_round - elapsed).min(deadline.saturating_sub(now));
                    if pause > 0 {
                        tokio::select! {
                            _ = self.clock.sleep(Duration::from_millis(pause)) => {}
                            _ = self.shutdown.triggered() => {
                                info!(
                                    round,
                                    "shutdown requested, abandoning remote cluster bootstrap"
                                );
                                return None;
                            }
                        }
                    }
                }
            }
        }

        if aggregator.is_empty() {
            warn!(
                seeds = self.seeds.len(),
                rounds = round,
                ?max_wait,
                "no remote endpoint answered within the time budget"
            );
            return None;
        }

        let Some(local) = self.cluster.get(&self.local_address) else {
            warn!(
                local = %self.local_address,
                "local node is not registered, cannot rank remote peers"
            );
            return None;
        };

        let known = aggregator.len();
        let valid_until = self
            .clock
            .now_millis()
            .saturating_add(millis(self.config.snapshot_ttl));
        match aggregator.into_remote_cluster(&local, valid_until) {
            Some(remote) => {
                if let Some(preferred) = remote.preferred() {
                    info!(
                        rounds = round,
                        known,
                        overlapping = remote.remote_nodes().len(),
                        preferred = %preferred.address(),
                        "remote cluster bootstrapped"
                    );
                }
                Some(remote)
            }
            None => {
                info!(
                    known,
                    local = %local.total_range(),
                    "no remote node overlaps the local range"
                );
                None
            }
        }
    }

    /// The call is bounded by the bootstrap's clock, not by wall time.
    async fn probe(
        &self,
        endpoint: &NodeAddr,
        timeout: Duration,
    ) -> Result<ProbeResponse, FetchError> {
        let request_sent = self.clock.now_millis();
        let status = tokio::select! {
            biased;
            result = self.fetcher.fetch_status(endpoint, timeout) => result?,
            _ = self.clock.sleep(timeout) => return Err(FetchError::Timeout(timeout)),
        };
        Ok(ProbeResponse {
            status,
            request_sent,
            response_received: self.clock.now_millis(),
        })
    }
}

/// Parse and resolve configured seed endpoints.
///
/// Seeds that are not `host:port` or cannot be resolved are logged and
/// dropped; they are not retried for the lifetime of the process.
// TODO: decide with operations whether unresolvable seeds should be
// re-resolved periodically instead of being dropped for good.
pub async fn resolve_seeds<S: AsRef<str>>(seeds: &[S]) -> Vec<NodeAddr> {
    let mut resolved = Vec::with_capacity(seeds.len());
    for seed in seeds {
        let seed = seed.as_ref();
        let address: NodeAddr = match seed.parse() {
            Ok(address) => address,
            Err(e) => {
                warn!(seed, error = %e, "dropping invalid seed endpoint");
                continue;
            }
        };
        match tokio::net::lookup_host(address.to_string()).await {
            Ok(mut addrs) => match addrs.next() {
                Some(_) => resolved.push(address),
                None => warn!(seed, "seed endpoint resolved to no address, dropping it"),
            },
            Err(e) => warn!(seed, error = %e, "cannot resolve seed endpoint, dropping it"),
        }
    }
    resolved
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
