//! JSON-RPC client for the on-chain holo registries.
//!
//! Each configured chain has its own gateway endpoint; [`RegistryGatewayClient`]
//! implements `holostore`'s `ChainRegistryClient` on top of them.

pub mod client;
pub mod error;
pub mod rpc;
pub mod subscription;

pub use crate::client::{GatewayOptions, RegistryGatewayClient};
pub use crate::error::{GatewayError, Result};
