use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::RemoteCluster;
use super::bootstrap::PeerBootstrap;
use super::fetcher::StatusFetcher;

/// Keeps a current [`RemoteCluster`] snapshot for one remote cluster.
///
/// The snapshot is replaced as a whole; readers get an `Arc` to either the
/// old or the new one.
pub struct RemoteClusterTracker<F> {
    bootstrap: PeerBootstrap<F>,
    current: RwLock<Option<Arc<RemoteCluster>>>,
}

impl<F> RemoteClusterTracker<F>
where
    F: StatusFetcher,
{
    pub fn new(bootstrap: PeerBootstrap<F>) -> RemoteClusterTracker<F> {
        RemoteClusterTracker {
            bootstrap,
            current: RwLock::new(None),
        }
    }

    /// Last published snapshot, possibly expired.
    pub fn current(&self) -> Option<Arc<RemoteCluster>> {
        self.current.read().clone()
    }

    /// Last published snapshot if it is still valid.
    pub fn current_valid(&self) -> Option<Arc<RemoteCluster>> {
        let now = self.bootstrap.clock().now_millis();
        self.current().filter(|cluster| cluster.is_still_valid(now))
    }

    /// Run one bootstrap and publish its result. A bootstrap that produced
    /// nothing leaves the previous snapshot in place.
    pub async fn refresh(&self) -> Option<Arc<RemoteCluster>> {
        let cluster = self
            .bootstrap
            .fetch(self.bootstrap.config().max_wait)
            .await
            .map(Arc::new)?;
        *self.current.write() = Some(cluster.clone());
        debug!(valid_until = cluster.valid_until(), "published remote cluster snapshot");
        Some(cluster)
    }

    /// Keep the snapshot fresh until shutdown.
    pub async fn run(&self) {
        let config = self.bootstrap.config().clone();
        let clock = self.bootstrap.clock().clone();
        let shutdown = self.bootstrap.shutdown().clone();
        info!(seeds = self.bootstrap.seeds().len(), "remote cluster tracker started");

        while !shutdown.is_triggered() {
            let wait = match self.current_valid() {
                Some(cluster) => until_expiry(&cluster, clock.now_millis()),
                None => match self.refresh().await {
                    Some(cluster) => {
                        until_expiry(&cluster, clock.now_millis()).max(config.min_round_interval)
                    }
                    None => config.retry_cooldown,
                },
            };

            tokio::select! {
                _ = clock.sleep(wait) => {}
                _ = shutdown.triggered() => break,
            }
        }

        info!("remote cluster tracker stopped");
    }
}

fn until_expiry(cluster: &RemoteCluster, now: u64) -> Duration {
    Duration::from_millis(cluster.valid_until().saturating_sub(now))
}
