//! The pool of chain connections, built once at startup

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use tracing::{info, warn};

use super::{rpc::RpcChainClient, ChainClient};
use crate::{
    config::Config,
    error::{UpdaterError, UpdaterResult},
    retry::RetryPolicy,
    types::ChainId,
};

/// The time budget for the startup chain id check of one provider
const CHAIN_ID_CHECK_TIMEOUT: Duration = Duration::from_secs(10);
/// The number of attempts of the startup chain id check of one provider
const CHAIN_ID_CHECK_ATTEMPTS: usize = 3;

/// A named connection to one RPC provider
#[derive(Clone)]
pub struct ProviderHandle {
    /// The configured name of the provider
    pub name: String,
    /// The client for the provider
    pub client: Arc<dyn ChainClient>,
}

impl ProviderHandle {
    /// Constructor
    pub fn new(name: impl Into<String>, client: Arc<dyn ChainClient>) -> Self {
        Self { name: name.into(), client }
    }
}

/// The chain connections of every configured network
#[derive(Clone, Default)]
pub struct ProviderPool {
    /// The providers of each network, in configured order
    providers: BTreeMap<ChainId, Vec<ProviderHandle>>,
}

impl ProviderPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect to every provider in the configuration
    ///
    /// A provider reporting a different chain id than it is configured under
    /// is a startup error. A provider that cannot be reached is kept, it may
    /// recover by the time it is first used.
    pub async fn connect(config: &Config) -> UpdaterResult<Self> {
        let mut pool = Self::new();
        for (chain_id, chain) in &config.chains {
            for (name, provider) in &chain.providers {
                let client = RpcChainClient::new(&provider.url, chain.data_feed_server, *chain_id)?;
                check_chain_id(&client, *chain_id, name).await?;
                pool.insert(*chain_id, ProviderHandle::new(name.clone(), Arc::new(client)));
            }
        }

        Ok(pool)
    }

    /// Register a provider for a network
    pub fn insert(&mut self, chain_id: ChainId, handle: ProviderHandle) {
        self.providers.entry(chain_id).or_default().push(handle);
    }

    /// The providers of a network
    pub fn providers(&self, chain_id: ChainId) -> &[ProviderHandle] {
        self.providers.get(&chain_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Iterate over every provider of every network
    pub fn iter(&self) -> impl Iterator<Item = (ChainId, &ProviderHandle)> {
        self.providers.iter().flat_map(|(chain_id, handles)| handles.iter().map(|h| (*chain_id, h)))
    }
}

/// Check that a provider serves the network it is configured for
async fn check_chain_id(
    client: &dyn ChainClient,
    chain_id: ChainId,
    name: &str,
) -> UpdaterResult<()> {
    let policy = RetryPolicy::with_total_timeout(CHAIN_ID_CHECK_TIMEOUT)
        .max_attempts(CHAIN_ID_CHECK_ATTEMPTS);
    match policy.run("chain id check", || client.chain_id()).await {
        Ok(reported) if reported == chain_id => {
            info!(chain_id, provider = name, "connected to provider");
            Ok(())
        },
        Ok(reported) => Err(UpdaterError::config(format!(
            "provider {name} of chain {chain_id} reports chain id {reported}"
        ))),
        Err(e) => {
            warn!(chain_id, provider = name, "cannot reach provider: {e}");
            Ok(())
        },
    }
}
