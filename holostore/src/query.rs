use crate::errors::{CacheError, Result};
use crate::models::{Address, CacheRecord, ChainId, CredentialService, UserHolo};
use crate::store::CacheStore;
use crate::sync::ReconciliationWorker;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Read side of the cache, shaped for the HTTP layer. String inputs are
/// validated here, before any storage or chain work.
pub struct HoloQuery {
    worker: Arc<ReconciliationWorker>,
}

impl HoloQuery {
    pub fn new(worker: Arc<ReconciliationWorker>) -> Self {
        Self { worker }
    }

    pub fn get_record(&self, chain: &str, address: &str) -> Result<Option<CacheRecord>> {
        let chain = ChainId::parse(chain)?;
        let address = Address::parse(address)?;
        self.worker.store().get(&chain, &address)
    }

    pub fn all_addresses_with_any_record(&self) -> Result<BTreeSet<Address>> {
        self.worker.store().all_known_addresses()
    }

    /// Case-insensitive substring search over every non-null field on every
    /// chain. Each matching address appears once, with all of its cached chains.
    pub fn find_records_matching_text(&self, needle: &str) -> Result<Vec<UserHolo>> {
        search_store(self.worker.store(), needle)
    }

    /// Resolves the address linked to `credentials`, cache first, then each
    /// configured chain in order.
    pub async fn address_for_credentials(
        &self,
        service: &str,
        credentials: &str,
    ) -> Result<Option<Address>> {
        let service: CredentialService = service.parse()?;
        if credentials.is_empty() || credentials.chars().any(char::is_whitespace) {
            return Err(CacheError::InvalidInput("invalid credentials".to_string()));
        }

        if let Some(address) = self.worker.store().address_for_credential(service, credentials)? {
            log::debug!("Resolved {} credentials from cache", service);
            return Ok(Some(address));
        }

        for chain in self.worker.store().chains() {
            let what = format!("address_for_credentials({service}) on {chain}");
            let found = self
                .worker
                .remote(
                    &what,
                    self.worker
                        .client()
                        .address_for_credentials(chain, service, credentials),
                )
                .await?
                .flatten();
            if let Some(raw) = found {
                return Address::parse(&raw).map(Some);
            }
        }
        Ok(None)
    }
}

/// Text search straight over a store, shared by [`HoloQuery`] and the
/// inspection CLI.
pub fn search_store(store: &CacheStore, needle: &str) -> Result<Vec<UserHolo>> {
    let needle = needle.to_lowercase();

    let mut users: BTreeMap<Address, UserHolo> = BTreeMap::new();
    for chain in store.chains() {
        for record in store.get_all(chain)? {
            users
                .entry(record.address.clone())
                .or_insert_with(|| UserHolo {
                    address: record.address.clone(),
                    chains: BTreeMap::new(),
                })
                .chains
                .insert(record.chain, record.holo);
        }
    }

    let matches: Vec<UserHolo> = users
        .into_values()
        .filter(|user| user.chains.values().any(|holo| holo.matches_text(&needle)))
        .collect();
    log::debug!("Search for '{}' matched {} holo(s)", needle, matches.len());
    Ok(matches)
}
