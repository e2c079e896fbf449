//! Helpers shared by the unit tests

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use alloy::{eips::BlockNumberOrTag, signers::local::PrivateKeySigner};
use alloy_primitives::{address, aliases::I224, b256, Address, Bytes, TxHash, B256, I256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;

use crate::{
    abi::{beacon_id, beacon_set_id, encode_beacon_value, IDataFeedServer},
    chain::{BlockFees, ChainClient, GasTarget},
    config::{
        BeaconConfig, BeaconSetTrigger, BeaconTrigger, ChainConfig, ChainOptions, Config,
        GasOracleConfig, ProviderConfig, SponsorTriggers, TxType,
    },
    error::{UpdaterError, UpdaterResult},
    types::{ChainId, SignedObservation},
};

/// The chain id used across tests
pub const CHAIN_ID: ChainId = 31337;
/// The sponsor wallet used across tests
pub const SPONSOR: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
/// The private key of the sponsor wallet
pub const SPONSOR_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
/// The airnode of the first test beacon
pub const AIRNODE_A: Address = address!("A30CA71Ba54E83127214D3271aEA8F5D6bD4Dace");
/// The airnode of the second test beacon
pub const AIRNODE_B: Address = address!("c52EeA00154B4fF1EbbF8Ba39FDe37F1AC3B9Fd4");
/// The template of the test beacons
pub const TEMPLATE_ID: B256 =
    b256!("ea30f92923ece1a97af69d450a8418db31be5a26a886540a13c09c739ba8eaaa");

/// The id of the first test beacon
pub fn beacon_a() -> B256 {
    beacon_id(AIRNODE_A, TEMPLATE_ID)
}

/// The id of the second test beacon
pub fn beacon_b() -> B256 {
    beacon_id(AIRNODE_B, TEMPLATE_ID)
}

/// The id of the test beacon set, made of both test beacons
pub fn beacon_set() -> B256 {
    beacon_set_id(&[beacon_a(), beacon_b()])
}

/// Build a signed observation with a placeholder 65-byte signature
pub fn observation(value: i64, timestamp: u64) -> SignedObservation {
    SignedObservation {
        value: encode_beacon_value(I256::try_from(value).unwrap()),
        timestamp,
        signature: Bytes::from(vec![0xab; 65]),
    }
}

/// A valid configuration with two beacons, one beacon set and one sponsor
/// updating all three on a single provider
pub fn mock_config() -> Config {
    let chain = ChainConfig {
        data_feed_server: Address::repeat_byte(0x11),
        providers: BTreeMap::from([(
            "local".to_string(),
            ProviderConfig { url: "http://127.0.0.1:8545".to_string() },
        )]),
        options: ChainOptions {
            tx_type: TxType::Legacy,
            base_fee_multiplier: 2,
            priority_fee_wei: None,
            gas_price_multiplier_percent: None,
            fallback_gas_price_wei: 1_000_000_000,
            gas_oracle: GasOracleConfig::default(),
        },
    };

    let beacon_trigger = |beacon_id| BeaconTrigger {
        beacon_id,
        deviation_threshold: 1.0,
        heartbeat_interval: 86_400,
    };
    let triggers = SponsorTriggers {
        beacons: vec![beacon_trigger(beacon_a()), beacon_trigger(beacon_b())],
        beacon_sets: vec![BeaconSetTrigger {
            beacon_set_id: beacon_set(),
            deviation_threshold: 1.0,
            heartbeat_interval: 86_400,
        }],
        update_interval: 30,
    };

    Config {
        chains: BTreeMap::from([(CHAIN_ID, chain)]),
        beacons: BTreeMap::from([
            (beacon_a(), BeaconConfig { airnode: AIRNODE_A, template_id: TEMPLATE_ID }),
            (beacon_b(), BeaconConfig { airnode: AIRNODE_B, template_id: TEMPLATE_ID }),
        ]),
        beacon_sets: BTreeMap::from([(beacon_set(), vec![beacon_a(), beacon_b()])]),
        triggers: BTreeMap::from([(CHAIN_ID, BTreeMap::from([(SPONSOR, triggers)]))]),
        sponsor_wallet_keys: BTreeMap::from([(SPONSOR, SPONSOR_KEY.to_string())]),
    }
}

// -------------
// | Mock Chain |
// -------------

/// A transaction recorded by the mock chain
#[derive(Clone, Debug)]
pub struct SentTx {
    /// The sender
    pub from: Address,
    /// The batched calls
    pub calls: Vec<Bytes>,
    /// The nonce
    pub nonce: u64,
    /// The gas pricing
    pub gas: GasTarget,
}

/// The mutable state of the mock chain
#[derive(Default)]
struct MockChainState {
    /// The known blocks, the highest one is the latest
    blocks: BTreeMap<u64, BlockFees>,
    /// The pending transaction count of every address
    nonce: u64,
    /// The recommended gas price, an RPC error if unset
    gas_price: Option<u128>,
    /// The on-chain data feed values and timestamps, unset feeds read as
    /// zero at timestamp 0
    feeds: HashMap<B256, (i64, u32)>,
    /// The data feeds whose reads revert
    unreadable: HashSet<B256>,
    /// The number of writes accepted before every further write fails
    write_limit: Option<usize>,
    /// The sent transactions
    sent: Vec<SentTx>,
    /// The blocks requested by number
    block_requests: Vec<u64>,
}

/// An in-memory chain client with scripted responses
#[derive(Default)]
pub struct MockChainClient {
    /// The scripted chain state
    state: Mutex<MockChainState>,
    /// Whether every call fails
    unreachable: AtomicBool,
    /// Whether transaction count fetches fail
    fail_nonce: AtomicBool,
    /// The number of transaction count fetches
    nonce_fetches: AtomicUsize,
    /// The number of multicall reads
    reads: AtomicUsize,
}

impl MockChainClient {
    /// Create an empty mock chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a block
    pub fn push_block(&self, block: BlockFees) {
        self.state.lock().unwrap().blocks.insert(block.number, block);
    }

    /// Set the pending transaction count
    pub fn set_nonce(&self, nonce: u64) {
        self.state.lock().unwrap().nonce = nonce;
    }

    /// Set the recommended gas price
    pub fn set_gas_price(&self, gas_price: u128) {
        self.state.lock().unwrap().gas_price = Some(gas_price);
    }

    /// Set the on-chain value of a data feed
    pub fn set_feed(&self, id: B256, value: i64, timestamp: u32) {
        self.state.lock().unwrap().feeds.insert(id, (value, timestamp));
    }

    /// Make every call fail
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Make transaction count fetches fail
    pub fn set_fail_nonce(&self, fail: bool) {
        self.fail_nonce.store(fail, Ordering::SeqCst);
    }

    /// Make reads of a data feed revert
    pub fn revert_reads_of(&self, id: B256) {
        self.state.lock().unwrap().unreadable.insert(id);
    }

    /// Accept `n` more writes, then fail every further write
    pub fn fail_writes_after(&self, n: usize) {
        let mut state = self.state.lock().unwrap();
        state.write_limit = Some(state.sent.len() + n);
    }

    /// The sent transactions
    pub fn sent(&self) -> Vec<SentTx> {
        self.state.lock().unwrap().sent.clone()
    }

    /// The block numbers requested so far
    pub fn block_requests(&self) -> Vec<u64> {
        self.state.lock().unwrap().block_requests.clone()
    }

    /// The number of transaction count fetches
    pub fn nonce_fetches(&self) -> usize {
        self.nonce_fetches.load(Ordering::SeqCst)
    }

    /// The number of multicall reads
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Fail if the chain is unreachable
    fn check_reachable(&self) -> UpdaterResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(UpdaterError::rpc("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn chain_id(&self) -> UpdaterResult<u64> {
        self.check_reachable()?;
        Ok(CHAIN_ID)
    }

    async fn block_fees(&self, block: BlockNumberOrTag) -> UpdaterResult<Option<BlockFees>> {
        self.check_reachable()?;
        let mut state = self.state.lock().unwrap();
        match block {
            BlockNumberOrTag::Number(number) => {
                state.block_requests.push(number);
                Ok(state.blocks.get(&number).cloned())
            },
            _ => Ok(state.blocks.values().next_back().cloned()),
        }
    }

    async fn transaction_count(&self, _address: Address) -> UpdaterResult<u64> {
        self.check_reachable()?;
        self.nonce_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_nonce.load(Ordering::SeqCst) {
            return Err(UpdaterError::rpc("nonce unavailable"));
        }
        Ok(self.state.lock().unwrap().nonce)
    }

    async fn gas_price(&self) -> UpdaterResult<u128> {
        self.check_reachable()?;
        self.state.lock().unwrap().gas_price.ok_or_else(|| UpdaterError::rpc("no gas price"))
    }

    async fn try_multicall(&self, calls: Vec<Bytes>) -> UpdaterResult<Vec<(bool, Bytes)>> {
        self.check_reachable()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();

        let results = calls
            .iter()
            .map(|call| {
                let read = IDataFeedServer::dataFeedsCall::abi_decode(call).unwrap();
                if state.unreadable.contains(&read.dataFeedId) {
                    return (false, Bytes::new());
                }

                let (value, timestamp) =
                    state.feeds.get(&read.dataFeedId).copied().unwrap_or_default();
                let ret = IDataFeedServer::dataFeedsReturn {
                    value: I224::try_from(value).unwrap(),
                    timestamp,
                };
                let data = IDataFeedServer::dataFeedsCall::abi_encode_returns(&ret);
                (true, Bytes::from(data))
            })
            .collect();

        Ok(results)
    }

    async fn send_multicall(
        &self,
        signer: &PrivateKeySigner,
        calls: Vec<Bytes>,
        nonce: u64,
        gas: GasTarget,
    ) -> UpdaterResult<TxHash> {
        self.check_reachable()?;
        let mut state = self.state.lock().unwrap();
        if state.write_limit.is_some_and(|limit| state.sent.len() >= limit) {
            return Err(UpdaterError::transaction("insufficient funds"));
        }

        state.sent.push(SentTx { from: signer.address(), calls, nonce, gas });
        state.nonce = state.nonce.max(nonce + 1);

        Ok(TxHash::with_last_byte(state.sent.len() as u8))
    }
}
