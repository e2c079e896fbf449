//! Configuration for the data feed updater
//!
//! The configuration is a JSON document describing the networks to operate
//! on, the beacons and beacon sets known to the updater, and per network,
//! per sponsor update triggers. Schema validation proper is expected to have
//! happened before the file reaches the updater; [`Config::validate`] only
//! checks the invariants the engine relies on.

use std::{
    collections::{BTreeMap, HashSet},
    path::Path,
    str::FromStr,
    time::Duration,
};

use alloy::signers::local::PrivateKeySigner;
use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

use crate::{
    abi::{beacon_id, beacon_set_id},
    condition::UpdateThresholds,
    error::{UpdaterError, UpdaterResult},
    types::{Beacon, ChainId},
};

/// The default base fee multiplier for fee-market transactions
const DEFAULT_BASE_FEE_MULTIPLIER: u64 = 2;
/// The default priority fee for fee-market transactions, 3.12 gwei
const DEFAULT_PRIORITY_FEE_WEI: u128 = 3_120_000_000;
/// The default number of non-empty blocks sampled by the gas oracle
const DEFAULT_SAMPLE_BLOCK_COUNT: usize = 20;
/// The default gas price percentile recommended by the gas oracle
const DEFAULT_GAS_PRICE_PERCENTILE: u64 = 60;
/// The default interval between gas oracle updates, in seconds
const DEFAULT_GAS_ORACLE_UPDATE_INTERVAL: u64 = 20;
/// The default total timeout of a gas oracle chain call, in seconds
const DEFAULT_GAS_ORACLE_MAX_TIMEOUT: u64 = 5;

/// The top level updater configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// The networks to operate on, keyed by chain id
    pub chains: BTreeMap<ChainId, ChainConfig>,
    /// The known beacons, keyed by beacon id
    pub beacons: BTreeMap<B256, BeaconConfig>,
    /// The known beacon sets, keyed by beacon set id
    #[serde(default)]
    pub beacon_sets: BTreeMap<B256, Vec<B256>>,
    /// The update triggers, keyed by chain id and sponsor address
    pub triggers: BTreeMap<ChainId, BTreeMap<Address, SponsorTriggers>>,
    /// The hex private keys of the sponsor wallets, keyed by sponsor address
    pub sponsor_wallet_keys: BTreeMap<Address, String>,
}

/// The configuration of a single network
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainConfig {
    /// The data feed server contract the updates are sent to
    pub data_feed_server: Address,
    /// The RPC providers for the network, keyed by a provider name
    pub providers: BTreeMap<String, ProviderConfig>,
    /// Transaction and gas pricing options
    pub options: ChainOptions,
}

/// A single RPC provider
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// The JSON-RPC URL
    pub url: String,
}

/// The transaction type used on a network
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    /// Legacy transactions with a single gas price
    Legacy,
    /// Fee-market transactions with a max fee and a priority fee
    #[default]
    Eip1559,
}

/// Transaction and gas pricing options of a network
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainOptions {
    /// The transaction type
    #[serde(default)]
    pub tx_type: TxType,
    /// The multiplier applied to the base fee of fee-market transactions
    #[serde(default = "default_base_fee_multiplier")]
    pub base_fee_multiplier: u64,
    /// The priority fee of fee-market transactions, in wei
    #[serde(default)]
    pub priority_fee_wei: Option<u128>,
    /// The multiplier applied to the chain's recommended gas price, as an
    /// integer percentage (e.g. 110 for 1.1x)
    #[serde(default)]
    pub gas_price_multiplier_percent: Option<u64>,
    /// The gas price used when every other source is unavailable, in wei
    pub fallback_gas_price_wei: u128,
    /// Gas oracle sampling parameters
    #[serde(default)]
    pub gas_oracle: GasOracleConfig,
}

impl ChainOptions {
    /// The priority fee of fee-market transactions
    pub fn priority_fee(&self) -> u128 {
        self.priority_fee_wei.unwrap_or(DEFAULT_PRIORITY_FEE_WEI)
    }
}

/// Gas oracle sampling parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GasOracleConfig {
    /// The number of non-empty blocks kept in the sample window
    #[serde(default = "default_sample_block_count")]
    pub sample_block_count: usize,
    /// The percentile of sampled prices to recommend, in `1..=100`
    #[serde(default = "default_gas_price_percentile")]
    pub percentile: u64,
    /// The interval between oracle updates, in seconds
    #[serde(default = "default_gas_oracle_update_interval")]
    pub update_interval: u64,
    /// The total timeout of a single oracle chain call, in seconds
    #[serde(default = "default_gas_oracle_max_timeout")]
    pub max_timeout: u64,
}

impl Default for GasOracleConfig {
    fn default() -> Self {
        Self {
            sample_block_count: DEFAULT_SAMPLE_BLOCK_COUNT,
            percentile: DEFAULT_GAS_PRICE_PERCENTILE,
            update_interval: DEFAULT_GAS_ORACLE_UPDATE_INTERVAL,
            max_timeout: DEFAULT_GAS_ORACLE_MAX_TIMEOUT,
        }
    }
}

impl GasOracleConfig {
    /// The interval between oracle updates
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval)
    }

    /// The total timeout of a single oracle chain call
    pub fn max_timeout(&self) -> Duration {
        Duration::from_secs(self.max_timeout)
    }
}

/// A beacon definition
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BeaconConfig {
    /// The airnode signing observations for the beacon
    pub airnode: Address,
    /// The template id of the observations
    pub template_id: B256,
}

/// The update triggers of one sponsor on one network
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SponsorTriggers {
    /// The beacons to keep updated
    #[serde(default)]
    pub beacons: Vec<BeaconTrigger>,
    /// The beacon sets to keep updated
    #[serde(default)]
    pub beacon_sets: Vec<BeaconSetTrigger>,
    /// The interval between update cycles, in seconds
    pub update_interval: u64,
}

impl SponsorTriggers {
    /// The interval between update cycles
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval)
    }
}

/// The update rule of a beacon
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BeaconTrigger {
    /// The beacon id
    pub beacon_id: B256,
    /// The minimum relative change to publish, in percent
    pub deviation_threshold: f64,
    /// The maximum on-chain staleness, in seconds
    pub heartbeat_interval: u64,
}

impl BeaconTrigger {
    /// The thresholds of the trigger
    pub fn thresholds(&self) -> UpdateThresholds {
        UpdateThresholds {
            deviation_threshold: self.deviation_threshold,
            heartbeat_interval: self.heartbeat_interval,
        }
    }
}

/// The update rule of a beacon set
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BeaconSetTrigger {
    /// The beacon set id
    pub beacon_set_id: B256,
    /// The minimum relative change to publish, in percent
    pub deviation_threshold: f64,
    /// The maximum on-chain staleness, in seconds
    pub heartbeat_interval: u64,
}

impl BeaconSetTrigger {
    /// The thresholds of the trigger
    pub fn thresholds(&self) -> UpdateThresholds {
        UpdateThresholds {
            deviation_threshold: self.deviation_threshold,
            heartbeat_interval: self.heartbeat_interval,
        }
    }
}

// -----------
// | Loading |
// -----------

impl Config {
    /// Load and validate a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> UpdaterResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            UpdaterError::config(format!("cannot read {}: {e}", path.as_ref().display()))
        })?;
        Self::from_json(&raw)
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(raw: &str) -> UpdaterResult<Self> {
        let config: Config = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the engine relies on
    pub fn validate(&self) -> UpdaterResult<()> {
        for (id, beacon) in &self.beacons {
            let derived = beacon_id(beacon.airnode, beacon.template_id);
            if derived != *id {
                return Err(UpdaterError::config(format!(
                    "beacon id {id} does not match its airnode and template id ({derived})"
                )));
            }
        }

        for (id, beacon_ids) in &self.beacon_sets {
            if let Some(missing) = beacon_ids.iter().find(|b| !self.beacons.contains_key(*b)) {
                return Err(UpdaterError::config(format!(
                    "beacon set {id} references unknown beacon {missing}"
                )));
            }
            let derived = beacon_set_id(beacon_ids);
            if derived != *id {
                return Err(UpdaterError::config(format!(
                    "beacon set id {id} does not match its beacon ids ({derived})"
                )));
            }
        }

        for (chain_id, chain) in &self.chains {
            let percentile = chain.options.gas_oracle.percentile;
            if percentile == 0 || percentile > 100 {
                return Err(UpdaterError::config(format!(
                    "chain {chain_id}: gas oracle percentile {percentile} not in 1..=100"
                )));
            }
            if chain.options.gas_oracle.sample_block_count == 0 {
                return Err(UpdaterError::config(format!(
                    "chain {chain_id}: gas oracle sample block count must be positive"
                )));
            }
        }

        let mut trigger_count = 0;
        for (chain_id, sponsors) in &self.triggers {
            if !self.chains.contains_key(chain_id) {
                return Err(UpdaterError::config(format!(
                    "triggers reference unconfigured chain {chain_id}"
                )));
            }
            for (sponsor, triggers) in sponsors {
                self.validate_sponsor_triggers(*chain_id, sponsor, triggers)?;
                trigger_count += triggers.beacons.len() + triggers.beacon_sets.len();
            }
        }

        if trigger_count == 0 {
            return Err(UpdaterError::config("no data feed update triggers configured"));
        }

        Ok(())
    }

    /// Validate the triggers of one sponsor on one network
    fn validate_sponsor_triggers(
        &self,
        chain_id: ChainId,
        sponsor: &Address,
        triggers: &SponsorTriggers,
    ) -> UpdaterResult<()> {
        let ctx = format!("chain {chain_id}, sponsor {sponsor}");
        if triggers.update_interval == 0 {
            return Err(UpdaterError::config(format!("{ctx}: update interval must be positive")));
        }
        if !self.sponsor_wallet_keys.contains_key(sponsor) {
            return Err(UpdaterError::config(format!("{ctx}: no sponsor wallet key")));
        }

        let mut seen = HashSet::new();
        for trigger in &triggers.beacons {
            if !self.beacons.contains_key(&trigger.beacon_id) {
                return Err(UpdaterError::config(format!(
                    "{ctx}: unknown beacon {}",
                    trigger.beacon_id
                )));
            }
            validate_thresholds(&ctx, &trigger.thresholds())?;
            if !seen.insert(trigger.beacon_id) {
                return Err(UpdaterError::config(format!(
                    "{ctx}: duplicate trigger for {}",
                    trigger.beacon_id
                )));
            }
        }

        for trigger in &triggers.beacon_sets {
            if !self.beacon_sets.contains_key(&trigger.beacon_set_id) {
                return Err(UpdaterError::config(format!(
                    "{ctx}: unknown beacon set {}",
                    trigger.beacon_set_id
                )));
            }
            validate_thresholds(&ctx, &trigger.thresholds())?;
            if !seen.insert(trigger.beacon_set_id) {
                return Err(UpdaterError::config(format!(
                    "{ctx}: duplicate trigger for {}",
                    trigger.beacon_set_id
                )));
            }
        }

        Ok(())
    }

    // -----------
    // | Getters |
    // -----------

    /// Get a beacon by id
    pub fn beacon(&self, id: &B256) -> Option<Beacon> {
        self.beacons.get(id).map(|b| Beacon {
            id: *id,
            airnode: b.airnode,
            template_id: b.template_id,
        })
    }

    /// Get the beacons of a beacon set, in their configured order
    pub fn beacon_set_members(&self, id: &B256) -> Option<Vec<Beacon>> {
        let ids = self.beacon_sets.get(id)?;
        ids.iter().map(|beacon_id| self.beacon(beacon_id)).collect()
    }

    /// Parse the signer of a sponsor wallet
    pub fn sponsor_signer(&self, sponsor: &Address) -> UpdaterResult<PrivateKeySigner> {
        let key = self
            .sponsor_wallet_keys
            .get(sponsor)
            .ok_or_else(|| UpdaterError::config(format!("no wallet key for sponsor {sponsor}")))?;

        PrivateKeySigner::from_str(key)
            .map_err(|e| UpdaterError::config(format!("invalid wallet key for {sponsor}: {e}")))
    }
}

/// Validate the thresholds of a trigger
fn validate_thresholds(ctx: &str, thresholds: &UpdateThresholds) -> UpdaterResult<()> {
    if !thresholds.deviation_threshold.is_finite() || thresholds.deviation_threshold < 0.0 {
        return Err(UpdaterError::config(format!(
            "{ctx}: deviation threshold must be a non-negative number"
        )));
    }
    if thresholds.heartbeat_interval == 0 {
        return Err(UpdaterError::config(format!("{ctx}: heartbeat interval must be positive")));
    }

    Ok(())
}

// ------------
// | Defaults |
// ------------

/// The default base fee multiplier
fn default_base_fee_multiplier() -> u64 {
    DEFAULT_BASE_FEE_MULTIPLIER
}

/// The default sample block count
fn default_sample_block_count() -> usize {
    DEFAULT_SAMPLE_BLOCK_COUNT
}

/// The default gas price percentile
fn default_gas_price_percentile() -> u64 {
    DEFAULT_GAS_PRICE_PERCENTILE
}

/// The default gas oracle update interval
fn default_gas_oracle_update_interval() -> u64 {
    DEFAULT_GAS_ORACLE_UPDATE_INTERVAL
}

/// The default gas oracle call timeout
fn default_gas_oracle_max_timeout() -> u64 {
    DEFAULT_GAS_ORACLE_MAX_TIMEOUT
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;
    use eyre::Result;

    use super::*;
    use crate::test_utils::{mock_config, SPONSOR};

    /// Build a JSON config with a single beacon and one trigger
    fn json_config(beacon_id: B256) -> String {
        format!(
            r#"{{
                "chains": {{
                    "31337": {{
                        "data_feed_server": "0x5FbDB2315678afecb367f032d93F642f64180aa3",
                        "providers": {{ "local": {{ "url": "http://127.0.0.1:8545" }} }},
                        "options": {{ "tx_type": "legacy", "fallback_gas_price_wei": 1000000000 }}
                    }}
                }},
                "beacons": {{
                    "{beacon_id}": {{
                        "airnode": "0xA30CA71Ba54E83127214D3271aEA8F5D6bD4Dace",
                        "template_id": "0xea30f92923ece1a97af69d450a8418db31be5a26a886540a13c09c739ba8eaaa"
                    }}
                }},
                "triggers": {{
                    "31337": {{
                        "{SPONSOR}": {{
                            "beacons": [
                                {{ "beacon_id": "{beacon_id}", "deviation_threshold": 0.5, "heartbeat_interval": 86400 }}
                            ],
                            "update_interval": 30
                        }}
                    }}
                }},
                "sponsor_wallet_keys": {{
                    "{SPONSOR}": "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
                }}
            }}"#
        )
    }

    /// Tests parsing a JSON configuration with defaults applied
    #[test]
    fn test_parse_json() -> Result<()> {
        let airnode = address!("A30CA71Ba54E83127214D3271aEA8F5D6bD4Dace");
        let template_id = B256::from_str(
            "0xea30f92923ece1a97af69d450a8418db31be5a26a886540a13c09c739ba8eaaa",
        )?;
        let id = beacon_id(airnode, template_id);

        let config = Config::from_json(&json_config(id))?;
        let chain = &config.chains[&31337];
        assert_eq!(chain.options.tx_type, TxType::Legacy);
        assert_eq!(chain.options.base_fee_multiplier, DEFAULT_BASE_FEE_MULTIPLIER);
        assert_eq!(chain.options.gas_oracle.percentile, DEFAULT_GAS_PRICE_PERCENTILE);
        assert_eq!(chain.options.priority_fee(), DEFAULT_PRIORITY_FEE_WEI);
        assert_eq!(config.triggers[&31337][&SPONSOR].update_interval(), Duration::from_secs(30));
        assert_eq!(config.sponsor_signer(&SPONSOR)?.address(), SPONSOR);
        Ok(())
    }

    /// Tests that a beacon id not derived from its definition is rejected
    #[test]
    fn test_mismatched_beacon_id() {
        let res = Config::from_json(&json_config(B256::repeat_byte(7)));
        assert!(matches!(res, Err(UpdaterError::Config(_))));
    }

    /// Tests that triggers must reference known data feeds
    #[test]
    fn test_unknown_trigger_reference() {
        let mut config = mock_config();
        let triggers = config.triggers.get_mut(&31337).unwrap().get_mut(&SPONSOR).unwrap();
        triggers.beacons[0].beacon_id = B256::repeat_byte(9);
        assert!(config.validate().is_err());
    }

    /// Tests that a configuration without triggers is rejected
    #[test]
    fn test_no_triggers() {
        let mut config = mock_config();
        config.triggers.clear();
        assert!(config.validate().is_err());
    }

    /// Tests that invalid thresholds are rejected
    #[test]
    fn test_invalid_thresholds() {
        let mut config = mock_config();
        let triggers = config.triggers.get_mut(&31337).unwrap().get_mut(&SPONSOR).unwrap();
        triggers.beacons[0].deviation_threshold = -1.0;
        assert!(config.validate().is_err());

        let mut config = mock_config();
        let triggers = config.triggers.get_mut(&31337).unwrap().get_mut(&SPONSOR).unwrap();
        triggers.beacons[0].heartbeat_interval = 0;
        assert!(config.validate().is_err());
    }

    /// Tests that the mock configuration used across tests is valid
    #[test]
    fn test_mock_config_valid() -> Result<()> {
        mock_config().validate()?;
        Ok(())
    }
}
