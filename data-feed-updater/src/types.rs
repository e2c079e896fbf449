//! Domain types shared across the updater

use alloy_primitives::{Address, Bytes, B256, I256};
use serde::{Deserialize, Serialize};

use crate::{abi::decode_beacon_value, error::UpdaterResult};

/// The chain id type used to key per-network state
pub type ChainId = u64;

/// A data feed value together with the timestamp it was observed at
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataFeedValue {
    /// The feed value
    pub value: I256,
    /// The unix timestamp (seconds) of the observation
    pub timestamp: u64,
}

impl DataFeedValue {
    /// Constructor
    pub fn new(value: I256, timestamp: u64) -> Self {
        Self { value, timestamp }
    }
}

/// A signed off-chain observation for a single beacon
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedObservation {
    /// The ABI-encoded `int256` value
    pub value: Bytes,
    /// The unix timestamp (seconds) the airnode signed for
    pub timestamp: u64,
    /// The airnode signature over `(templateId, timestamp, value)`
    pub signature: Bytes,
}

impl SignedObservation {
    /// Decode the signed value
    pub fn decoded_value(&self) -> UpdaterResult<I256> {
        decode_beacon_value(&self.value)
    }

    /// Decode the observation into a data feed value
    pub fn data_feed_value(&self) -> UpdaterResult<DataFeedValue> {
        Ok(DataFeedValue::new(self.decoded_value()?, self.timestamp))
    }
}

/// A beacon definition, a single airnode observation slot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Beacon {
    /// The beacon id
    pub id: B256,
    /// The airnode that signs observations for this beacon
    pub airnode: Address,
    /// The template the observations are requested with
    pub template_id: B256,
}
