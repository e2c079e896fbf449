//! ABI definitions and data feed id derivations for the data feed server
//! contract

use alloy_primitives::{aliases::I224, keccak256, Address, Bytes, B256, I256, U256};
use alloy_sol_types::{sol_data, SolCall, SolType, SolValue};

use crate::{
    error::{UpdaterError, UpdaterResult},
    types::{Beacon, DataFeedValue, SignedObservation},
};

// The ABI of the data feed server contract
#[allow(missing_docs, clippy::missing_docs_in_private_items)]
mod contract {
    use alloy_sol_types::sol;

    sol! {
        /// The subset of the data feed server interface used by the updater
        interface IDataFeedServer {
            function dataFeeds(bytes32 dataFeedId) external view returns (int224 value, uint32 timestamp);
            function updateBeaconWithSignedData(address airnode, bytes32 templateId, uint256 timestamp, bytes data, bytes signature) external returns (bytes32 beaconId);
            function updateBeaconSetWithSignedData(address[] airnodes, bytes32[] templateIds, uint256[] timestamps, bytes[] data, bytes[] signatures) external returns (bytes32 beaconSetId);
            function tryMulticall(bytes[] data) external returns (bool[] successes, bytes[] returndata);
        }
    }
}

pub use contract::IDataFeedServer;

/// The byte length of an ABI-encoded `int256`
const ENCODED_VALUE_LEN: usize = 32;

// ----------------
// | Data Feed Ids |
// ----------------

/// Derive a beacon id, `keccak256(abi.encodePacked(airnode, templateId))`
pub fn beacon_id(airnode: Address, template_id: B256) -> B256 {
    let mut packed = [0u8; 52];
    packed[..20].copy_from_slice(airnode.as_slice());
    packed[20..].copy_from_slice(template_id.as_slice());
    keccak256(packed)
}

/// Derive a beacon set id, `keccak256(abi.encode(beaconIds))`
pub fn beacon_set_id(beacon_ids: &[B256]) -> B256 {
    keccak256(beacon_ids.to_vec().abi_encode())
}

// ----------
// | Values |
// ----------

/// The largest value representable by an on-chain `int224`
pub fn int224_max() -> I256 {
    I256::from_raw((U256::from(1) << 223) - U256::from(1))
}

/// The smallest value representable by an on-chain `int224`
pub fn int224_min() -> I256 {
    I256::from_raw(U256::MAX << 223)
}

/// Whether the value fits into the on-chain `int224` data feed slot
pub fn is_in_int224_range(value: I256) -> bool {
    value >= int224_min() && value <= int224_max()
}

/// Sign-extend an on-chain `int224` into an `I256`
pub fn i224_to_i256(value: I224) -> I256 {
    let raw = U256::from_limbs(value.into_raw().into_limbs());
    if value.is_negative() {
        I256::from_raw(raw | (U256::MAX << 224))
    } else {
        I256::from_raw(raw)
    }
}

/// Decode the ABI-encoded `int256` payload of a signed observation
pub fn decode_beacon_value(data: &[u8]) -> UpdaterResult<I256> {
    if data.len() != ENCODED_VALUE_LEN {
        return Err(UpdaterError::abi(format!(
            "expected {ENCODED_VALUE_LEN} bytes of encoded value, got {}",
            data.len()
        )));
    }

    Ok(<sol_data::Int<256> as SolType>::abi_decode(data)?)
}

/// ABI-encode a value as the `int256` payload of a beacon update
pub fn encode_beacon_value(value: I256) -> Bytes {
    Bytes::from(value.abi_encode())
}

// ------------
// | Calldata |
// ------------

/// Encode a read of a data feed's on-chain value
///
/// The getter does not revert for a data feed that was never written, it
/// reads as zero at timestamp 0 so the first update is due by heartbeat.
pub fn encode_read_data_feed(data_feed_id: B256) -> Bytes {
    IDataFeedServer::dataFeedsCall { dataFeedId: data_feed_id }.abi_encode().into()
}

/// Decode the return data of a data feed read
pub fn decode_read_data_feed(data: &[u8]) -> UpdaterResult<DataFeedValue> {
    let ret = IDataFeedServer::dataFeedsCall::abi_decode_returns(data)?;
    Ok(DataFeedValue::new(i224_to_i256(ret.value), u64::from(ret.timestamp)))
}

/// Encode a beacon update with a signed observation
pub fn encode_update_beacon(beacon: &Beacon, observation: &SignedObservation) -> Bytes {
    IDataFeedServer::updateBeaconWithSignedDataCall {
        airnode: beacon.airnode,
        templateId: beacon.template_id,
        timestamp: U256::from(observation.timestamp),
        data: observation.value.clone(),
        signature: observation.signature.clone(),
    }
    .abi_encode()
    .into()
}

/// Encode a beacon set update, one observation per member beacon in the
/// set's configured order
///
/// Members without a fresh observation carry their on-chain value and an
/// empty signature, which the contract accepts in place of a signed value.
pub fn encode_update_beacon_set(members: &[(Beacon, SignedObservation)]) -> Bytes {
    let mut call = IDataFeedServer::updateBeaconSetWithSignedDataCall {
        airnodes: Vec::with_capacity(members.len()),
        templateIds: Vec::with_capacity(members.len()),
        timestamps: Vec::with_capacity(members.len()),
        data: Vec::with_capacity(members.len()),
        signatures: Vec::with_capacity(members.len()),
    };

    for (beacon, observation) in members {
        call.airnodes.push(beacon.airnode);
        call.templateIds.push(beacon.template_id);
        call.timestamps.push(U256::from(observation.timestamp));
        call.data.push(observation.value.clone());
        call.signatures.push(observation.signature.clone());
    }

    call.abi_encode().into()
}

/// Encode a batch of calls into a single `tryMulticall`
pub fn encode_try_multicall(calls: Vec<Bytes>) -> Bytes {
    IDataFeedServer::tryMulticallCall { data: calls }.abi_encode().into()
}

/// Decode the per-call results of a `tryMulticall`
pub fn decode_try_multicall(data: &[u8]) -> UpdaterResult<Vec<(bool, Bytes)>> {
    let ret = IDataFeedServer::tryMulticallCall::abi_decode_returns(data)?;
    if ret.successes.len() != ret.returndata.len() {
        return Err(UpdaterError::abi(format!(
            "multicall returned {} statuses for {} results",
            ret.successes.len(),
            ret.returndata.len()
        )));
    }

    Ok(ret.successes.into_iter().zip(ret.returndata).collect())
}
