//! Chain access for the updater
//!
//! The engine talks to a chain only through the [`ChainClient`] trait, one
//! client per configured RPC provider. [`rpc::RpcChainClient`] is the alloy
//! backed implementation; tests substitute an in-memory client.

use alloy::{eips::BlockNumberOrTag, signers::local::PrivateKeySigner};
use alloy_primitives::{Address, Bytes, TxHash};
use async_trait::async_trait;

use crate::error::UpdaterResult;

pub mod pool;
pub mod rpc;

pub use pool::{ProviderHandle, ProviderPool};

/// The fee fields of a transaction needed to derive its effective gas price
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxFee {
    /// A transaction paying a flat gas price
    Legacy {
        /// The gas price, in wei
        gas_price: u128,
    },
    /// A fee-market transaction
    FeeMarket {
        /// The priority fee, in wei
        max_priority_fee_per_gas: u128,
    },
}

/// The fee data of a block
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockFees {
    /// The block number
    pub number: u64,
    /// The base fee of the block, absent before the fee market
    pub base_fee_per_gas: Option<u128>,
    /// The fee fields of the block's transactions
    pub transactions: Vec<TxFee>,
}

impl BlockFees {
    /// The effective gas prices paid by the block's transactions
    ///
    /// Fee-market transactions pay `baseFeePerGas + maxPriorityFeePerGas`.
    pub fn effective_gas_prices(&self) -> Vec<u128> {
        let base_fee = self.base_fee_per_gas.unwrap_or_default();
        self.transactions
            .iter()
            .map(|tx| match tx {
                TxFee::Legacy { gas_price } => *gas_price,
                TxFee::FeeMarket { max_priority_fee_per_gas } => {
                    base_fee.saturating_add(*max_priority_fee_per_gas)
                },
            })
            .collect()
    }
}

/// The gas pricing of a write transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GasTarget {
    /// A legacy transaction
    Legacy {
        /// The gas price, in wei
        gas_price: u128,
    },
    /// A fee-market transaction
    Eip1559 {
        /// The max fee per gas, in wei
        max_fee_per_gas: u128,
        /// The priority fee per gas, in wei
        max_priority_fee_per_gas: u128,
    },
}

/// A connection to one RPC provider of one network
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// The chain id reported by the provider
    async fn chain_id(&self) -> UpdaterResult<u64>;

    /// Fetch a block with its transactions, `None` if it does not exist yet
    async fn block_fees(&self, block: BlockNumberOrTag) -> UpdaterResult<Option<BlockFees>>;

    /// The transaction count of an address, including pending transactions
    async fn transaction_count(&self, address: Address) -> UpdaterResult<u64>;

    /// The gas price recommended by the provider
    async fn gas_price(&self) -> UpdaterResult<u128>;

    /// Execute a batch of read calls against the data feed server in a
    /// single `tryMulticall`, returning a success flag and the return data
    /// per call
    async fn try_multicall(&self, calls: Vec<Bytes>) -> UpdaterResult<Vec<(bool, Bytes)>>;

    /// Sign and submit a batch of write calls to the data feed server as a
    /// single `tryMulticall` transaction
    async fn send_multicall(
        &self,
        signer: &PrivateKeySigner,
        calls: Vec<Bytes>,
        nonce: u64,
        gas: GasTarget,
    ) -> UpdaterResult<TxHash>;
}
