use crate::errors::Result;
use crate::fetch::EventStream;
use crate::models::{Address, BatchReport, ChainEvent, ChainId, CredentialService, HoloField, Outcome, RegistryKind};
use crate::sanitize::FieldUpdate;
use crate::signal::ShutdownSignal;
use crate::sync::ReconciliationWorker;
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Profile(Outcome),
    /// A removal for an address with no cached record on that chain.
    NothingToClear,
    Cleared,
    Credentials(BatchReport),
}

/// Applies live registry events between polling cycles.
pub struct EventIngestor {
    worker: Arc<ReconciliationWorker>,
    chains: Vec<ChainId>,
}

impl EventIngestor {
    pub fn new(worker: Arc<ReconciliationWorker>, chains: Vec<ChainId>) -> Self {
        Self { worker, chains }
    }

    pub async fn handle(&self, chain: &ChainId, event: ChainEvent) -> Result<EventOutcome> {
        match event {
            ChainEvent::ProfileSet { address } => {
                let address = Address::parse(&address)?;
                let outcome = self.apply_profile_set(chain, &address).await?;
                log::info!("User {} set their name/bio on {}: {:?}", address, chain, outcome);
                Ok(EventOutcome::Profile(outcome))
            }
            ChainEvent::ProfileRemoved { address } => {
                let address = Address::parse(&address)?;
                let existed = self
                    .worker
                    .store()
                    .clear(chain, &address, &HoloField::PROFILE)?;
                log::info!("User {} removed their name/bio on {}", address, chain);
                Ok(if existed {
                    EventOutcome::Cleared
                } else {
                    EventOutcome::NothingToClear
                })
            }
            ChainEvent::CredentialVerified { service, verified } => {
                log::info!(
                    "{} verification attempt on {} {}",
                    service,
                    chain,
                    if verified { "succeeded" } else { "failed" }
                );
                let report = self.apply_new_credentials(chain, service).await?;
                Ok(EventOutcome::Credentials(report))
            }
        }
    }

    async fn apply_profile_set(&self, chain: &ChainId, address: &Address) -> Result<Outcome> {
        let what = format!("get_profile({address}) on {chain}");
        let Some(profile) = self
            .worker
            .remote(&what, self.worker.client().get_profile(chain, address))
            .await?
        else {
            return Ok(Outcome::FetchIncomplete);
        };
        self.worker
            .store()
            .upsert(chain, address, &FieldUpdate::profile(&profile))?;
        Ok(Outcome::Updated)
    }

    /// Re-lists the credential registry and fills in `service` for every
    /// address the cache has never seen. Membership is diffed against the
    /// store on each call; nothing is remembered in memory.
    async fn apply_new_credentials(
        &self,
        chain: &ChainId,
        service: CredentialService,
    ) -> Result<BatchReport> {
        let registry = RegistryKind::Credential(service);
        let mut report = BatchReport::new(chain.clone(), registry);
        let what = format!("list {registry} registry on {chain}");
        let Some(listed) = self
            .worker
            .remote(&what, self.worker.client().list_registered_addresses(chain, registry))
            .await?
        else {
            return Ok(report);
        };
        report.listed = listed.len();

        let known = self.worker.store().all_known_addresses()?;
        let fresh: Vec<Address> = listed
            .iter()
            .filter_map(|raw| match Address::parse(raw) {
                Ok(address) => Some(address),
                Err(err) => {
                    log::warn!("Ignoring registry entry on {}: {}", chain, err);
                    None
                }
            })
            .filter(|address| !known.contains(address))
            .collect();

        for address in fresh {
            let result = self.apply_credential(chain, &address, service).await;
            match result {
                Ok(outcome) => report.record(outcome),
                Err(err) => {
                    log::error!(
                        "Failed to store {} credentials for {} on {}: {}",
                        service,
                        address,
                        chain,
                        err
                    );
                    report.record_failure(&err);
                }
            }
        }
        Ok(report)
    }

    async fn apply_credential(
        &self,
        chain: &ChainId,
        address: &Address,
        service: CredentialService,
    ) -> Result<Outcome> {
        let what = format!("get_credential({address}, {service}) on {chain}");
        let Some(credential) = self
            .worker
            .remote(&what, self.worker.client().get_credential(chain, address, service))
            .await?
        else {
            return Ok(Outcome::FetchIncomplete);
        };
        self.worker.store().upsert(
            chain,
            address,
            &FieldUpdate::credential(service, credential.as_deref()),
        )?;
        log::info!("New {} credentials for {} on {}", service, address, chain);
        Ok(Outcome::Updated)
    }

    /// Opens one subscription per (chain, registry) and spawns a task for each.
    /// A subscription that cannot be opened is logged and skipped.
    pub async fn start(self: Arc<Self>, shutdown: ShutdownSignal) -> JoinSet<()> {
        let mut tasks = JoinSet::new();
        for chain in &self.chains {
            for registry in RegistryKind::all() {
                match self.worker.client().subscribe(chain, registry).await {
                    Ok(stream) => {
                        let ingestor = Arc::clone(&self);
                        let chain = chain.clone();
                        let signal = shutdown.clone();
                        tasks.spawn(async move {
                            ingestor.listen(chain, registry, stream, signal).await;
                        });
                    }
                    Err(err) => {
                        log::error!("Could not subscribe to {} events on {}: {}", registry, chain, err);
                    }
                }
            }
        }
        tasks
    }

    async fn listen(
        &self,
        chain: ChainId,
        registry: RegistryKind,
        mut stream: EventStream,
        mut shutdown: ShutdownSignal,
    ) {
        log::info!("Listening to {} events on {}", registry, chain);
        loop {
            let event = tokio::select! {
                _ = shutdown.stopped() => break,
                event = stream.recv() => event,
            };
            let Some(event) = event else {
                log::warn!("{} event stream on {} closed", registry, chain);
                break;
            };
            // Handled outside the select so an in-flight update always completes.
            if let Err(err) = self.handle(&chain, event.clone()).await {
                log::error!("Failed to apply {:?} on {}: {}", event, chain, err);
            }
        }
    }
}
