//! The process-wide state shared by the updater's tasks
//!
//! Holds the configuration, the cache of signed observations, the provider
//! pool, the gas price sample windows and the cooperative stop flag. The
//! observation cache and the gas windows are the only state written while the
//! updater runs; both are sharded maps so unrelated keys never contend.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use alloy_primitives::B256;
use dashmap::DashMap;
use serde::Serialize;

use crate::{
    chain::ProviderPool,
    config::Config,
    gas_oracle::GasPriceWindow,
    types::{ChainId, SignedObservation},
};

/// Identifies the gas price window of one provider of one network
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GasOracleKey {
    /// The chain id of the network
    pub chain_id: ChainId,
    /// The name of the provider
    pub provider: String,
}

impl GasOracleKey {
    /// Constructor
    pub fn new(chain_id: ChainId, provider: impl Into<String>) -> Self {
        Self { chain_id, provider: provider.into() }
    }
}

/// The recommended gas price of one provider of one network
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GasPriceSnapshot {
    /// The chain id of the network
    pub chain_id: ChainId,
    /// The name of the provider
    pub provider: String,
    /// The most recent sampled block, if any
    pub latest_block: Option<u64>,
    /// The recommended gas price in wei, if any samples exist
    pub gas_price: Option<u128>,
}

/// The inner state backing storage
struct StateInner {
    /// The updater configuration
    config: Config,
    /// The chain connections
    providers: ProviderPool,
    /// The latest signed observation of each beacon
    observations: DashMap<B256, SignedObservation>,
    /// The gas price sample window of each provider
    gas_windows: DashMap<GasOracleKey, GasPriceWindow>,
    /// Set when the updater's loops should wind down
    stopped: AtomicBool,
}

/// A value-type handle to the shared state. Clones are cheap and share state.
#[derive(Clone)]
pub struct State(Arc<StateInner>);

impl State {
    /// Create the shared state
    pub fn new(config: Config, providers: ProviderPool) -> Self {
        Self(Arc::new(StateInner {
            config,
            providers,
            observations: DashMap::new(),
            gas_windows: DashMap::new(),
            stopped: AtomicBool::new(false),
        }))
    }

    /// The updater configuration
    pub fn config(&self) -> &Config {
        &self.0.config
    }

    /// The chain connections
    pub fn providers(&self) -> &ProviderPool {
        &self.0.providers
    }

    // ----------------
    // | Observations |
    // ----------------

    /// Store the latest signed observation of a beacon, replacing any
    /// previous one
    pub fn set_observation(&self, beacon_id: B256, observation: SignedObservation) {
        self.0.observations.insert(beacon_id, observation);
    }

    /// The latest signed observation of a beacon
    pub fn observation(&self, beacon_id: &B256) -> Option<SignedObservation> {
        self.0.observations.get(beacon_id).map(|o| o.value().clone())
    }

    // --------------
    // | Gas Prices |
    // --------------

    /// Mutate the gas price window of a provider, creating it if missing
    pub fn update_gas_window<T>(
        &self,
        key: &GasOracleKey,
        f: impl FnOnce(&mut GasPriceWindow) -> T,
    ) -> T {
        let mut window = self.0.gas_windows.entry(key.clone()).or_default();
        f(window.value_mut())
    }

    /// The most recent block sampled by a provider's gas oracle
    pub fn latest_sampled_block(&self, key: &GasOracleKey) -> Option<u64> {
        self.0.gas_windows.get(key).and_then(|w| w.latest_block())
    }

    /// The recommended gas price of a provider, if it has samples
    pub fn recommended_gas_price(&self, key: &GasOracleKey) -> Option<u128> {
        self.0.gas_windows.get(key).and_then(|w| w.percentile_price())
    }

    /// The recommended gas price of every provider, sorted by network and
    /// provider name
    pub fn gas_price_snapshot(&self) -> Vec<GasPriceSnapshot> {
        let mut snapshot: Vec<_> = self
            .0
            .gas_windows
            .iter()
            .map(|entry| GasPriceSnapshot {
                chain_id: entry.key().chain_id,
                provider: entry.key().provider.clone(),
                latest_block: entry.value().latest_block(),
                gas_price: entry.value().percentile_price(),
            })
            .collect();
        snapshot.sort_by(|a, b| (a.chain_id, &a.provider).cmp(&(b.chain_id, &b.provider)));

        snapshot
    }

    // --------
    // | Stop |
    // --------

    /// Signal every loop to exit at the top of its next iteration
    pub fn stop(&self) {
        self.0.stopped.store(true, Ordering::Relaxed);
    }

    /// Whether the loops should exit
    pub fn is_stopped(&self) -> bool {
        self.0.stopped.load(Ordering::Relaxed)
    }
}
