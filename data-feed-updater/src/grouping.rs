//! Partitions the configured update triggers into independent work units
//!
//! One group is built per network, sponsor and provider. Groups of the same
//! sponsor on different providers of a network run independently and may
//! submit the same update; the losing transaction reverts or no-ops in the
//! contract at the cost of its gas.

use std::time::Duration;

use alloy::signers::local::PrivateKeySigner;
use alloy_primitives::{Address, B256};
use tracing::warn;

use crate::{
    chain::{ProviderHandle, ProviderPool},
    condition::UpdateThresholds,
    config::{ChainOptions, Config, SponsorTriggers},
    types::{Beacon, ChainId},
};

/// A beacon to keep updated
#[derive(Clone, Debug)]
pub struct BeaconTarget {
    /// The beacon
    pub beacon: Beacon,
    /// Its update thresholds
    pub thresholds: UpdateThresholds,
}

/// A beacon set to keep updated
#[derive(Clone, Debug)]
pub struct BeaconSetTarget {
    /// The beacon set id
    pub id: B256,
    /// The member beacons, in the set's order
    pub members: Vec<Beacon>,
    /// Its update thresholds
    pub thresholds: UpdateThresholds,
}

/// The update work of one sponsor on one provider of one network
#[derive(Clone)]
pub struct ProviderSponsorGroup {
    /// The network
    pub chain_id: ChainId,
    /// The provider the group reads from and writes through
    pub provider: ProviderHandle,
    /// The sponsor address
    pub sponsor: Address,
    /// The signer of the sponsor wallet
    pub signer: PrivateKeySigner,
    /// The transaction options of the network
    pub options: ChainOptions,
    /// The interval between update cycles
    pub update_interval: Duration,
    /// The beacons to keep updated
    pub beacons: Vec<BeaconTarget>,
    /// The beacon sets to keep updated
    pub beacon_sets: Vec<BeaconSetTarget>,
}

impl ProviderSponsorGroup {
    /// The number of data feeds in the group
    pub fn len(&self) -> usize {
        self.beacons.len() + self.beacon_sets.len()
    }

    /// Whether the group has no data feeds
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build one group per network, sponsor and provider
///
/// Networks without providers and sponsors without a usable wallet key are
/// skipped with a warning.
pub fn build_groups(config: &Config, pool: &ProviderPool) -> Vec<ProviderSponsorGroup> {
    let mut groups = Vec::new();
    for (chain_id, sponsors) in &config.triggers {
        let Some(chain) = config.chains.get(chain_id) else {
            warn!(chain_id, "no configuration for chain, skipping its triggers");
            continue;
        };

        let providers = pool.providers(*chain_id);
        if providers.is_empty() {
            warn!(chain_id, "no providers for chain, skipping its triggers");
            continue;
        }

        for (sponsor, triggers) in sponsors {
            let signer = match config.sponsor_signer(sponsor) {
                Ok(signer) => signer,
                Err(e) => {
                    warn!(chain_id, %sponsor, "skipping sponsor: {e}");
                    continue;
                },
            };

            let (beacons, beacon_sets) = resolve_targets(config, *chain_id, triggers);
            for provider in providers {
                groups.push(ProviderSponsorGroup {
                    chain_id: *chain_id,
                    provider: provider.clone(),
                    sponsor: *sponsor,
                    signer: signer.clone(),
                    options: chain.options.clone(),
                    update_interval: triggers.update_interval(),
                    beacons: beacons.clone(),
                    beacon_sets: beacon_sets.clone(),
                });
            }
        }
    }

    groups
}

/// Resolve the data feeds referenced by a sponsor's triggers
fn resolve_targets(
    config: &Config,
    chain_id: ChainId,
    triggers: &SponsorTriggers,
) -> (Vec<BeaconTarget>, Vec<BeaconSetTarget>) {
    let beacons = triggers
        .beacons
        .iter()
        .filter_map(|trigger| match config.beacon(&trigger.beacon_id) {
            Some(beacon) => Some(BeaconTarget { beacon, thresholds: trigger.thresholds() }),
            None => {
                warn!(chain_id, beacon_id = %trigger.beacon_id, "unknown beacon, skipping");
                None
            },
        })
        .collect();

    let beacon_sets = triggers
        .beacon_sets
        .iter()
        .filter_map(|trigger| match config.beacon_set_members(&trigger.beacon_set_id) {
            Some(members) => Some(BeaconSetTarget {
                id: trigger.beacon_set_id,
                members,
                thresholds: trigger.thresholds(),
            }),
            None => {
                let beacon_set_id = trigger.beacon_set_id;
                warn!(chain_id, %beacon_set_id, "unknown beacon set, skipping");
                None
            },
        })
        .collect();

    (beacons, beacon_sets)
}
