//! Runs one update cycle of a provider sponsor group
//!
//! A cycle reads the on-chain values of the group's data feeds in chunks,
//! decides per data feed whether the cached signed observations warrant an
//! update, and submits the updates in batches, one `tryMulticall`
//! transaction per batch. Every chain call is retried under a policy bounded
//! by the cycle's deadline, `start + updateInterval`. A call that exhausts
//! its budget ends the cycle; batches already sent stay sent.

use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::{Bytes, TxHash, B256};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    abi::{
        decode_read_data_feed, encode_beacon_value, encode_read_data_feed,
        encode_update_beacon, encode_update_beacon_set, is_in_int224_range,
    },
    chain::GasTarget,
    condition::{check_update_condition, UpdateDecision, UpdateThresholds},
    error::UpdaterResult,
    gas_oracle::gas_target,
    grouping::{BeaconSetTarget, BeaconTarget, ProviderSponsorGroup},
    math::{mean_timestamp, median},
    retry::RetryPolicy,
    state::State,
    types::{Beacon, DataFeedValue, SignedObservation},
};

/// The number of data feeds read in one multicall
pub const READ_BATCH_SIZE: usize = 100;
/// The number of updates sent in one transaction
pub const WRITE_BATCH_SIZE: usize = 10;

/// A data feed of a group
#[derive(Clone, Copy)]
enum Target<'a> {
    /// A beacon
    Beacon(&'a BeaconTarget),
    /// A beacon set
    BeaconSet(&'a BeaconSetTarget),
}

impl Target<'_> {
    /// The data feed id
    fn id(&self) -> B256 {
        match self {
            Target::Beacon(t) => t.beacon.id,
            Target::BeaconSet(t) => t.id,
        }
    }
}

/// An update that passed its condition check
#[derive(Clone, Debug)]
struct PendingUpdate {
    /// The updated data feed
    data_feed_id: B256,
    /// The reason for the update
    decision: UpdateDecision,
    /// The encoded update call
    calldata: Bytes,
}

/// The outcome of a completed cycle
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// The number of data feeds read from chain
    pub feeds_read: usize,
    /// The number of data feed updates submitted
    pub updates: usize,
    /// The number of transactions submitted
    pub transactions: usize,
}

/// Executes update cycles for one group
pub struct UpdateExecutor {
    /// The shared state
    state: State,
    /// The group being updated
    group: ProviderSponsorGroup,
}

impl UpdateExecutor {
    /// Constructor
    pub fn new(state: State, group: ProviderSponsorGroup) -> Self {
        Self { state, group }
    }

    /// The group being updated
    pub fn group(&self) -> &ProviderSponsorGroup {
        &self.group
    }

    /// Run one update cycle
    ///
    /// The transaction count of the sponsor wallet is fetched the first time
    /// an update is due and advanced locally by one per sent batch.
    pub async fn run_cycle(&self) -> UpdaterResult<CycleSummary> {
        let deadline = Instant::now() + self.group.update_interval;
        let targets: Vec<Target<'_>> = self
            .group
            .beacons
            .iter()
            .map(Target::Beacon)
            .chain(self.group.beacon_sets.iter().map(Target::BeaconSet))
            .collect();

        let mut summary = CycleSummary::default();
        let mut nonce = None;
        for chunk in targets.chunks(READ_BATCH_SIZE) {
            let ids: Vec<B256> = chunk.iter().map(Target::id).collect();
            let on_chain_values = self.read_data_feeds(&ids, deadline).await?;
            summary.feeds_read += chunk.len();

            let now = unix_now();
            let mut updates = Vec::new();
            for (target, on_chain) in chunk.iter().zip(on_chain_values) {
                let Some(on_chain) = on_chain else {
                    warn!(data_feed_id = %target.id(), "cannot read data feed from chain");
                    continue;
                };

                let update = match target {
                    Target::Beacon(t) => self.beacon_update(t, &on_chain, now),
                    Target::BeaconSet(t) => {
                        self.beacon_set_update(t, &on_chain, now, deadline).await
                    },
                };
                updates.extend(update);
            }

            for batch in updates.chunks(WRITE_BATCH_SIZE) {
                let current = match nonce {
                    Some(nonce) => nonce,
                    None => self.fetch_nonce(deadline).await?,
                };

                let tx_hash = self.send_batch(batch, current, deadline).await?;
                info!(%tx_hash, nonce = current, updates = batch.len(), "sent data feed updates");
                for update in batch {
                    let data_feed_id = update.data_feed_id;
                    let decision = update.decision;
                    debug!(%tx_hash, %data_feed_id, ?decision, "updated data feed");
                }

                nonce = Some(current + 1);
                summary.updates += batch.len();
                summary.transactions += 1;
            }
        }

        Ok(summary)
    }

    // ---------
    // | Reads |
    // ---------

    /// Read the on-chain values of the given data feeds in one multicall,
    /// `None` for the data feeds whose read failed
    async fn read_data_feeds(
        &self,
        ids: &[B256],
        deadline: Instant,
    ) -> UpdaterResult<Vec<Option<DataFeedValue>>> {
        let calls: Vec<Bytes> = ids.iter().map(|id| encode_read_data_feed(*id)).collect();
        let client = &self.group.provider.client;
        let results = RetryPolicy::until(deadline)
            .run("read data feeds", || client.try_multicall(calls.clone()))
            .await?;

        Ok(results
            .into_iter()
            .map(|(success, data)| {
                if !success {
                    return None;
                }
                decode_read_data_feed(&data).ok()
            })
            .collect())
    }

    /// Decide the update of a beacon from its cached observation
    fn beacon_update(
        &self,
        target: &BeaconTarget,
        on_chain: &DataFeedValue,
        now: u64,
    ) -> Option<PendingUpdate> {
        let id = target.beacon.id;
        let Some(observation) = self.state.observation(&id) else {
            debug!(beacon_id = %id, "no signed observation");
            return None;
        };

        let value = match observation.decoded_value() {
            Ok(value) => value,
            Err(e) => {
                warn!(beacon_id = %id, "invalid signed observation: {e}");
                return None;
            },
        };

        let candidate = DataFeedValue::new(value, observation.timestamp);
        let decision = decide(id, on_chain, &candidate, &target.thresholds, now)?;
        Some(PendingUpdate {
            data_feed_id: id,
            decision,
            calldata: encode_update_beacon(&target.beacon, &observation),
        })
    }

    /// Decide the update of a beacon set from its members' observations
    ///
    /// Members without a cached observation are read from chain and carried
    /// into the update with their on-chain value and an empty signature. The
    /// set is skipped when such a read fails.
    async fn beacon_set_update(
        &self,
        target: &BeaconSetTarget,
        on_chain: &DataFeedValue,
        now: u64,
        deadline: Instant,
    ) -> Option<PendingUpdate> {
        let cached: Vec<Option<SignedObservation>> =
            target.members.iter().map(|beacon| self.state.observation(&beacon.id)).collect();

        let missing: Vec<B256> = target
            .members
            .iter()
            .zip(&cached)
            .filter(|(_, observation)| observation.is_none())
            .map(|(beacon, _)| beacon.id)
            .collect();

        let substitutes = if missing.is_empty() {
            Vec::new()
        } else {
            match self.read_data_feeds(&missing, deadline).await {
                Ok(values) => values,
                Err(e) => {
                    warn!(beacon_set_id = %target.id, "cannot read member beacons: {e}");
                    return None;
                },
            }
        };

        let mut substitutes = substitutes.into_iter();

        let mut members: Vec<(Beacon, SignedObservation)> = Vec::with_capacity(cached.len());
        let mut values = Vec::with_capacity(cached.len());
        let mut timestamps = Vec::with_capacity(cached.len());
        for (beacon, observation) in target.members.iter().zip(cached) {
            let (observation, value) = match observation {
                Some(observation) => match observation.data_feed_value() {
                    Ok(value) if !is_in_int224_range(value.value) => {
                        let (beacon_id, value) = (beacon.id, value.value);
                        warn!(%beacon_id, %value, "member value out of int224 range, skipping set");
                        return None;
                    },
                    Ok(value) => (observation, value),
                    Err(e) => {
                        warn!(beacon_id = %beacon.id, "invalid signed observation: {e}");
                        return None;
                    },
                },
                None => {
                    let Some(value) = substitutes.next().flatten() else {
                        warn!(beacon_set_id = %target.id, beacon_id = %beacon.id, "no value");
                        return None;
                    };
                    (on_chain_substitute(&value), value)
                },
            };

            values.push(value.value);
            timestamps.push(value.timestamp);
            members.push((beacon.clone(), observation));
        }

        let candidate = DataFeedValue::new(median(&values)?, mean_timestamp(&timestamps)?);
        let decision = decide(target.id, on_chain, &candidate, &target.thresholds, now)?;
        Some(PendingUpdate {
            data_feed_id: target.id,
            decision,
            calldata: encode_update_beacon_set(&members),
        })
    }

    // ----------
    // | Writes |
    // ----------

    /// Fetch the transaction count of the sponsor wallet
    async fn fetch_nonce(&self, deadline: Instant) -> UpdaterResult<u64> {
        let client = &self.group.provider.client;
        let address = self.group.signer.address();
        let nonce = RetryPolicy::until(deadline)
            .run("fetch nonce", || client.transaction_count(address))
            .await?;
        debug!(%address, nonce, "fetched sponsor wallet nonce");

        Ok(nonce)
    }

    /// Price and send one batch of updates
    async fn send_batch(
        &self,
        batch: &[PendingUpdate],
        nonce: u64,
        deadline: Instant,
    ) -> UpdaterResult<TxHash> {
        let group = &self.group;
        let gas: GasTarget =
            gas_target(&self.state, group.chain_id, &group.provider, &group.options, deadline)
                .await;

        let calls: Vec<Bytes> = batch.iter().map(|u| u.calldata.clone()).collect();
        let client = &group.provider.client;
        RetryPolicy::until(deadline)
            .run("send data feed updates", || {
                client.send_multicall(&group.signer, calls.clone(), nonce, gas)
            })
            .await
    }
}

/// Run the condition check on a candidate, `Some` if the data feed should be
/// updated
fn decide(
    data_feed_id: B256,
    on_chain: &DataFeedValue,
    candidate: &DataFeedValue,
    thresholds: &UpdateThresholds,
    now: u64,
) -> Option<UpdateDecision> {
    if !is_in_int224_range(candidate.value) {
        warn!(%data_feed_id, value = %candidate.value, "value does not fit in int224, skipping");
        return None;
    }

    let decision = check_update_condition(on_chain, candidate, thresholds, now);
    if !decision.should_update() {
        debug!(%data_feed_id, ?decision, "no update needed");
        return None;
    }

    Some(decision)
}

/// The stand-in observation of a beacon set member without a cached
/// observation
fn on_chain_substitute(value: &DataFeedValue) -> SignedObservation {
    SignedObservation {
        value: encode_beacon_value(value.value),
        timestamp: value.timestamp,
        signature: Bytes::new(),
    }
}

/// The current unix time in seconds
fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}
