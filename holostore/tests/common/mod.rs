use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use holostore::{
    HoloCache,
    config::{CacheConfig, ChainEndpoint},
    errors::RpcError,
    fetch::{ChainRegistryClient, EventStream, RpcResult},
    models::{Address, ChainEvent, ChainId, CredentialService, HoloSections, Profile, RegistryKind},
};
use tempfile::TempDir;
use tokio::sync::{Notify, mpsc};

pub const ADDR_A: &str = "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
pub const ADDR_B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
pub const ADDR_C: &str = "0xcccccccccccccccccccccccccccccccccccccccc";

/// Scripted chain registry. Addresses are matched case-insensitively.
#[derive(Default)]
pub struct StubRegistry {
    registries: Mutex<HashMap<(String, RegistryKind), Vec<String>>>,
    holos: Mutex<HashMap<String, HoloSections>>,
    profiles: Mutex<HashMap<String, Profile>>,
    credentials: Mutex<HashMap<(String, CredentialService), String>>,
    failing: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    malformed: Mutex<HashSet<String>>,
    senders: Mutex<HashMap<(String, RegistryKind), mpsc::Sender<ChainEvent>>>,
    list_gate: Mutex<Option<Arc<Notify>>>,
    pub holo_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
}

#[allow(dead_code)]
impl StubRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, chain: &str, registry: RegistryKind, addresses: &[&str]) {
        self.registries.lock().unwrap().insert(
            (chain.to_string(), registry),
            addresses.iter().map(|a| a.to_string()).collect(),
        );
    }

    /// Sets the holo `get_holo` reports for `address` on `chain`.
    pub fn set_holo(&self, address: &str, chain: &str, fields: &[(&str, Option<&str>)]) {
        let section = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect();
        self.holos
            .lock()
            .unwrap()
            .entry(address.to_lowercase())
            .or_default()
            .insert(chain.to_string(), section);
    }

    pub fn set_profile(&self, address: &str, name: Option<&str>, bio: Option<&str>) {
        self.profiles.lock().unwrap().insert(
            address.to_lowercase(),
            Profile {
                name: name.map(str::to_string),
                bio: bio.map(str::to_string),
            },
        );
    }

    pub fn set_credential(&self, address: &str, service: CredentialService, value: &str) {
        self.credentials
            .lock()
            .unwrap()
            .insert((address.to_lowercase(), service), value.to_string());
    }

    pub fn fail_address(&self, address: &str) {
        self.failing.lock().unwrap().insert(address.to_lowercase());
    }

    pub fn hang_address(&self, address: &str) {
        self.hanging.lock().unwrap().insert(address.to_lowercase());
    }

    pub fn malform_address(&self, address: &str) {
        self.malformed.lock().unwrap().insert(address.to_lowercase());
    }

    /// Makes every `list_registered_addresses` call wait for a notification.
    pub fn gate_listing(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.list_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub async fn emit(&self, chain: &str, registry: RegistryKind, event: ChainEvent) {
        let sender = self
            .senders
            .lock()
            .unwrap()
            .get(&(chain.to_string(), registry))
            .cloned()
            .expect("no subscription for registry");
        sender.send(event).await.expect("subscription dropped");
    }

    pub fn subscription_count(&self) -> usize {
        self.senders.lock().unwrap().len()
    }

    async fn check(&self, address: &Address) -> RpcResult<()> {
        let key = address.as_str().to_string();
        let hangs = self.hanging.lock().unwrap().contains(&key);
        if hangs {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        if self.failing.lock().unwrap().contains(&key) {
            return Err(RpcError::Unavailable(format!("node refused {key}")));
        }
        if self.malformed.lock().unwrap().contains(&key) {
            return Err(RpcError::Malformed(format!("garbage for {key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainRegistryClient for StubRegistry {
    async fn list_registered_addresses(
        &self,
        chain: &ChainId,
        registry: RegistryKind,
    ) -> RpcResult<Vec<String>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.list_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(self
            .registries
            .lock()
            .unwrap()
            .get(&(chain.as_str().to_string(), registry))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_holo(&self, address: &Address) -> RpcResult<HoloSections> {
        self.holo_calls.fetch_add(1, Ordering::SeqCst);
        self.check(address).await?;
        Ok(self
            .holos
            .lock()
            .unwrap()
            .get(address.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn get_profile(&self, _chain: &ChainId, address: &Address) -> RpcResult<Profile> {
        self.check(address).await?;
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .get(address.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn get_credential(
        &self,
        _chain: &ChainId,
        address: &Address,
        service: CredentialService,
    ) -> RpcResult<Option<String>> {
        self.check(address).await?;
        Ok(self
            .credentials
            .lock()
            .unwrap()
            .get(&(address.as_str().to_string(), service))
            .cloned())
    }

    async fn address_for_credentials(
        &self,
        _chain: &ChainId,
        service: CredentialService,
        credentials: &str,
    ) -> RpcResult<Option<String>> {
        Ok(self
            .credentials
            .lock()
            .unwrap()
            .iter()
            .find(|((_, s), v)| *s == service && v.as_str() == credentials)
            .map(|((address, _), _)| address.clone()))
    }

    async fn subscribe(&self, chain: &ChainId, registry: RegistryKind) -> RpcResult<EventStream> {
        let (tx, rx) = mpsc::channel(16);
        self.senders
            .lock()
            .unwrap()
            .insert((chain.as_str().to_string(), registry), tx);
        Ok(rx)
    }
}

#[allow(dead_code)]
pub struct TestContext {
    pub temp_dir: TempDir,
    pub registry: Arc<StubRegistry>,
    pub cache: HoloCache,
}

#[allow(dead_code)]
impl TestContext {
    pub fn chain(&self, name: &str) -> ChainId {
        ChainId::parse(name).unwrap()
    }
}

#[allow(dead_code)]
pub fn address(raw: &str) -> Address {
    Address::parse(raw).unwrap()
}

/// A cache over `gnosis` and `mumbai` with a short fetch timeout.
#[allow(dead_code)]
pub fn init_test_context() -> anyhow::Result<TestContext> {
    init_with(|config| config)
}

#[allow(dead_code)]
pub fn init_with(
    tweak: impl FnOnce(CacheConfig) -> CacheConfig,
) -> anyhow::Result<TestContext> {
    let temp_dir = tempfile::tempdir()?;
    let mut config = CacheConfig::new(temp_dir.path().join("cache.sqlite"))
        .with_chain(ChainEndpoint::parse_pair("gnosis=http://gnosis.invalid")?)
        .with_chain(ChainEndpoint::parse_pair("mumbai=http://mumbai.invalid")?);
    config.fetch_timeout_secs = 1;
    config.reconcile_interval_secs = 1;
    let config = tweak(config);

    let registry = StubRegistry::new();
    let client: Arc<dyn ChainRegistryClient> = registry.clone();
    let cache = HoloCache::new(config, client)?;
    Ok(TestContext {
        temp_dir,
        registry,
        cache,
    })
}
