//! FanoutAggregator: issue one logical request to every provider at once.
//!
//! Each provider call is isolated: a failure contributes nothing and never
//! cancels its siblings.  Results are concatenated in provider-table order,
//! whatever order the calls complete in.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::join_all;
use music_proto::providers::{self, ProviderId};
use tracing::{debug, warn};

use crate::busy::BusyIndicator;
use crate::error::ClientError;

#[derive(Clone)]
pub struct FanoutAggregator {
    providers: Vec<ProviderId>,
    busy: Arc<BusyIndicator>,
}

impl FanoutAggregator {
    pub fn new(providers: Vec<ProviderId>, busy: Arc<BusyIndicator>) -> Self {
        Self { providers, busy }
    }

    /// Aggregator over the static provider table.
    pub fn with_all_providers(busy: Arc<BusyIndicator>) -> Self {
        Self::new(providers::provider_ids(), busy)
    }

    pub fn providers(&self) -> &[ProviderId] {
        &self.providers
    }

    /// Run `fetch_one` against every provider concurrently and merge.
    ///
    /// The busy indicator is shown once for the whole fan-out; `fetch_one`
    /// is expected to issue silent calls.  If every provider fails the
    /// result is simply empty.
    pub async fn fanout<T, F, Fut>(&self, fetch_one: F) -> Vec<T>
    where
        F: Fn(ProviderId) -> Fut,
        Fut: Future<Output = Result<Vec<T>, ClientError>>,
    {
        let _busy = self.busy.acquire();

        let calls = self.providers.iter().cloned().map(|provider| {
            let call = fetch_one(provider.clone());
            async move {
                match call.await {
                    Ok(items) => {
                        debug!("fan-out: {} returned {} items", provider, items.len());
                        items
                    }
                    Err(e) => {
                        warn!("fan-out: {} failed: {}", provider, e);
                        Vec::new()
                    }
                }
            }
        });

        join_all(calls).await.into_iter().flatten().collect()
    }
}
