use crate::errors::RpcError;
use crate::models::{Address, ChainEvent, ChainId, CredentialService, HoloSections, Profile, RegistryKind};
use async_trait::async_trait;
use tokio::sync::mpsc;

pub type RpcResult<T> = std::result::Result<T, RpcError>;

/// Live events for one (chain, registry) subscription. The stream ends when
/// the client gives up on the subscription.
pub type EventStream = mpsc::Receiver<ChainEvent>;

/// The on-chain registry, as seen by the cache.
///
/// Implementations own transport concerns (endpoints, retries, subscription
/// reconnects). An empty or missing per-chain section in [`get_holo`] means
/// "no fresh data", not an empty profile.
///
/// [`get_holo`]: ChainRegistryClient::get_holo
#[async_trait]
pub trait ChainRegistryClient: Send + Sync {
    /// Raw addresses currently enrolled in `registry` on `chain`, unnormalised.
    async fn list_registered_addresses(
        &self,
        chain: &ChainId,
        registry: RegistryKind,
    ) -> RpcResult<Vec<String>>;

    /// The holo for `address` on every chain the client can reach, keyed by chain name.
    async fn get_holo(&self, address: &Address) -> RpcResult<HoloSections>;

    async fn get_profile(&self, chain: &ChainId, address: &Address) -> RpcResult<Profile>;

    async fn get_credential(
        &self,
        chain: &ChainId,
        address: &Address,
        service: CredentialService,
    ) -> RpcResult<Option<String>>;

    async fn address_for_credentials(
        &self,
        chain: &ChainId,
        service: CredentialService,
        credentials: &str,
    ) -> RpcResult<Option<String>>;

    async fn subscribe(&self, chain: &ChainId, registry: RegistryKind) -> RpcResult<EventStream>;
}
