use crate::errors::{CacheError, Result, RpcError};
use crate::fetch::{ChainRegistryClient, RpcResult};
use crate::models::{Address, BatchReport, ChainId, Holo, Outcome, RegistryKind};
use crate::sanitize::FieldUpdate;
use crate::signal::ShutdownSignal;
use crate::store::CacheStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Pulls holos from the chain registry and merges them into the cache.
///
/// This is the only writer the scheduler and the event ingestor share: both
/// funnel their updates through [`CacheStore::upsert`] via this type.
pub struct ReconciliationWorker {
    client: Arc<dyn ChainRegistryClient>,
    store: Arc<CacheStore>,
    fetch_timeout: Duration,
}

impl ReconciliationWorker {
    pub fn new(
        client: Arc<dyn ChainRegistryClient>,
        store: Arc<CacheStore>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            client,
            store,
            fetch_timeout,
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub(crate) fn client(&self) -> &dyn ChainRegistryClient {
        self.client.as_ref()
    }

    /// Runs one remote call under the fetch timeout.
    ///
    /// `Ok(None)` is the skip-this-round outcome (timeout or transient RPC
    /// failure); only malformed responses surface as errors.
    pub(crate) async fn remote<T, F>(&self, what: &str, call: F) -> Result<Option<T>>
    where
        F: Future<Output = RpcResult<T>>,
    {
        match tokio::time::timeout(self.fetch_timeout, call).await {
            Ok(Ok(value)) => Ok(Some(value)),
            Ok(Err(err)) if err.is_transient() => {
                log::warn!("{}: {}", what, err);
                Ok(None)
            }
            Ok(Err(err)) => Err(CacheError::Rpc(err)),
            Err(_) => {
                log::warn!("{}: {} after {:?}", what, RpcError::Timeout, self.fetch_timeout);
                Ok(None)
            }
        }
    }

    /// Refreshes the cached holo for one address on one chain.
    pub async fn reconcile_one(&self, address: &Address, chain: &ChainId) -> Result<Outcome> {
        let what = format!("get_holo({address}) for {chain}");
        let Some(mut sections) = self.remote(&what, self.client.get_holo(address)).await? else {
            return Ok(Outcome::FetchIncomplete);
        };

        let section = match sections.remove(chain.as_str()) {
            Some(section) if !section.is_empty() => section,
            _ => {
                log::info!("RPC call to {} returned no data for user {}", chain, address);
                return Ok(Outcome::FetchIncomplete);
            }
        };

        let update = FieldUpdate::full(Holo::from_section(&section));
        self.store.upsert(chain, address, &update)?;
        Ok(Outcome::Updated)
    }

    /// Reconciles every address `registry` currently reports on `chain`.
    ///
    /// Per-address failures are counted and logged, never fatal. The stop
    /// signal is honoured between addresses. Only a failure to list the
    /// registry itself is returned as an error.
    pub async fn reconcile_registry(
        &self,
        chain: &ChainId,
        registry: RegistryKind,
        shutdown: &ShutdownSignal,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::new(chain.clone(), registry);
        let what = format!("list {registry} registry on {chain}");
        let Some(addresses) = self
            .remote(&what, self.client.list_registered_addresses(chain, registry))
            .await?
        else {
            return Err(CacheError::Rpc(RpcError::Unavailable(what)));
        };
        report.listed = addresses.len();

        for raw in addresses {
            if shutdown.is_stopped() {
                report.interrupted = true;
                log::info!("Stopping {} reconciliation on {} early: shutdown requested", registry, chain);
                break;
            }

            let result = match Address::parse(&raw) {
                Ok(address) => self.reconcile_one(&address, chain).await,
                Err(err) => Err(err),
            };
            match result {
                Ok(outcome) => report.record(outcome),
                Err(err) => {
                    log::error!(
                        "Failed to reconcile address '{}' (chain={}, registry={}): {}",
                        raw,
                        chain,
                        registry,
                        err
                    );
                    report.record_failure(&err);
                }
            }
        }

        log::info!(
            "Reconciled {} registry on {}: {} listed, {} updated, {} incomplete, {} failed",
            registry,
            chain,
            report.listed,
            report.updated,
            report.fetch_incomplete,
            report.failed
        );
        Ok(report)
    }
}
