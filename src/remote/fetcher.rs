use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::ClusterStatus;
use crate::topology::NodeAddr;

/// Why a status probe did not produce usable data. All variants are
/// retried within the bootstrap's time budget.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Access to the cluster status endpoint of a remote node.
///
/// Implementations must give up after `timeout`, either by returning
/// [`FetchError::Timeout`] or any other error; a response arriving within
/// `timeout` must be returned normally.
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    async fn fetch_status(
        &self,
        endpoint: &NodeAddr,
        timeout: Duration,
    ) -> Result<ClusterStatus, FetchError>;
}

#[async_trait]
impl<F> StatusFetcher for Arc<F>
where
    F: StatusFetcher + ?Sized,
{
    async fn fetch_status(
        &self,
        endpoint: &NodeAddr,
        timeout: Duration,
    ) -> Result<ClusterStatus, FetchError> {
        (**self).fetch_status(endpoint, timeout).await
    }
}
