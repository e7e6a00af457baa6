pub mod config;
pub mod errors;
pub mod events;
pub mod fetch;
pub mod models;
pub mod query;
pub mod sanitize;
pub mod scheduler;
pub mod signal;
pub mod store;
pub mod sync;

use crate::config::CacheConfig;
use crate::errors::Result;
use crate::events::EventIngestor;
use crate::fetch::ChainRegistryClient;
use crate::query::HoloQuery;
use crate::scheduler::PollingScheduler;
use crate::store::CacheStore;
use crate::sync::ReconciliationWorker;
use std::sync::Arc;

/// The main entry point for the `holostore` library.
///
/// `HoloCache` is the context object built once at startup and handed to
/// every consumer. It owns:
/// - the SQLite-backed `CacheStore` (one table per chain plus `users`),
/// - the `ReconciliationWorker`, the single write path into the store,
/// - the `PollingScheduler` for full-registry convergence,
/// - the `EventIngestor` for low-latency updates between cycles,
/// - the read-only `HoloQuery` surface.
///
/// # Example
///
/// ```rust,no_run
/// use holostore::{HoloCache, config::{CacheConfig, ChainEndpoint}};
/// # use holostore::fetch::ChainRegistryClient;
/// # use std::sync::Arc;
/// # async fn demo(client: Arc<dyn ChainRegistryClient>) -> holostore::errors::Result<()> {
/// let config = CacheConfig::new("/var/lib/holocache/cache.sqlite")
///     .with_chain(ChainEndpoint::parse_pair("gnosis=https://rpc.gnosischain.com")?);
/// let cache = HoloCache::new(config, client)?;
/// let _matches = cache.query.find_records_matching_text("phys")?;
/// # Ok(())
/// # }
/// ```
pub struct HoloCache {
    pub config: CacheConfig,
    pub store: Arc<CacheStore>,
    pub worker: Arc<ReconciliationWorker>,
    pub scheduler: Arc<PollingScheduler>,
    pub ingestor: Arc<EventIngestor>,
    pub query: Arc<HoloQuery>,
}

impl HoloCache {
    /// Validates the configuration, opens the database and creates any
    /// missing chain tables.
    pub fn new(config: CacheConfig, client: Arc<dyn ChainRegistryClient>) -> Result<Self> {
        config.validate()?;
        let chains = config.chain_ids()?;

        let store = Arc::new(CacheStore::new(&config)?);
        store.initialize_schema()?;

        let worker = Arc::new(ReconciliationWorker::new(
            client,
            Arc::clone(&store),
            config.fetch_timeout(),
        ));
        let scheduler = Arc::new(PollingScheduler::new(
            Arc::clone(&worker),
            &chains,
            config.reconcile_interval(),
            config.max_failed_cycles,
        ));
        let ingestor = Arc::new(EventIngestor::new(Arc::clone(&worker), chains));
        let query = Arc::new(HoloQuery::new(Arc::clone(&worker)));

        log::info!(
            "Holo cache opened at {} for {} chain(s)",
            config.db_path.display(),
            store.chains().len()
        );
        Ok(Self {
            config,
            store,
            worker,
            scheduler,
            ingestor,
            query,
        })
    }
}
