use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use holostore::config::ChainEndpoint;
use holostore::fetch::{ChainRegistryClient, EventStream, RpcResult};
use holostore::models::{Address, ChainId, CredentialService, HoloSections, Profile, RegistryKind};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::{GatewayError, Result};
use crate::rpc::{self, RpcRequest, RpcResponse};
use crate::subscription;

#[derive(Clone, Debug)]
pub struct GatewayOptions {
    /// Per-request transport timeout.
    pub request_timeout: Duration,
    /// Delay between event polls on a healthy subscription.
    pub poll_interval: Duration,
    /// Ceiling for the reconnect backoff of a failing subscription.
    pub max_backoff: Duration,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Talks to one JSON-RPC registry gateway per chain.
#[derive(Clone, Debug)]
pub struct RegistryGatewayClient {
    http_client: reqwest::Client,
    endpoints: Arc<BTreeMap<ChainId, String>>,
    options: GatewayOptions,
    next_id: Arc<AtomicU64>,
}

impl RegistryGatewayClient {
    pub fn new(endpoints: Vec<ChainEndpoint>, options: GatewayOptions) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()?;
        Ok(Self {
            http_client,
            endpoints: Arc::new(
                endpoints
                    .into_iter()
                    .map(|endpoint| (endpoint.chain, endpoint.rpc_url))
                    .collect(),
            ),
            options,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn options(&self) -> &GatewayOptions {
        &self.options
    }

    pub fn chains(&self) -> impl Iterator<Item = &ChainId> {
        self.endpoints.keys()
    }

    /// Performs one JSON-RPC call against `chain`'s gateway.
    pub async fn call<T: DeserializeOwned>(
        &self,
        chain: &ChainId,
        method: &str,
        params: Value,
    ) -> Result<T> {
        let url = self
            .endpoints
            .get(chain)
            .ok_or_else(|| GatewayError::UnknownChain(chain.to_string()))?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let response = self
            .http_client
            .post(url)
            .json(&RpcRequest::new(id, method, params))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::ApiError {
                code: i64::from(response.status().as_u16()),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let envelope: RpcResponse = response.json().await?;
        envelope.into_result()
    }
}

#[async_trait]
impl ChainRegistryClient for RegistryGatewayClient {
    async fn list_registered_addresses(
        &self,
        chain: &ChainId,
        registry: RegistryKind,
    ) -> RpcResult<Vec<String>> {
        Ok(self
            .call(chain, rpc::METHOD_REGISTERED_ADDRESSES, json!([registry]))
            .await?)
    }

    /// Asks every configured chain. A chain that fails contributes no
    /// section; only when all of them fail is the last error returned.
    async fn get_holo(&self, address: &Address) -> RpcResult<HoloSections> {
        let mut sections = HoloSections::new();
        let mut last_error = None;
        for chain in self.endpoints.keys() {
            match self
                .call::<HashMap<String, Option<String>>>(
                    chain,
                    rpc::METHOD_GET_HOLO,
                    json!([address]),
                )
                .await
            {
                Ok(section) => {
                    sections.insert(chain.to_string(), section);
                }
                Err(err) => {
                    log::warn!("get_holo({}) on {} failed: {}", address, chain, err);
                    last_error = Some(err);
                }
            }
        }
        match last_error {
            Some(err) if sections.is_empty() => Err(err.into()),
            _ => Ok(sections),
        }
    }

    async fn get_profile(&self, chain: &ChainId, address: &Address) -> RpcResult<Profile> {
        Ok(self
            .call(chain, rpc::METHOD_GET_PROFILE, json!([address]))
            .await?)
    }

    async fn get_credential(
        &self,
        chain: &ChainId,
        address: &Address,
        service: CredentialService,
    ) -> RpcResult<Option<String>> {
        Ok(self
            .call(chain, rpc::METHOD_GET_CREDENTIAL, json!([address, service]))
            .await?)
    }

    async fn address_for_credentials(
        &self,
        chain: &ChainId,
        service: CredentialService,
        credentials: &str,
    ) -> RpcResult<Option<String>> {
        Ok(self
            .call(
                chain,
                rpc::METHOD_ADDRESS_FOR_CREDENTIALS,
                json!([service, credentials]),
            )
            .await?)
    }

    async fn subscribe(&self, chain: &ChainId, registry: RegistryKind) -> RpcResult<EventStream> {
        if !self.endpoints.contains_key(chain) {
            return Err(GatewayError::UnknownChain(chain.to_string()).into());
        }
        Ok(subscription::spawn_poller(
            self.clone(),
            chain.clone(),
            registry,
        ))
    }
}
