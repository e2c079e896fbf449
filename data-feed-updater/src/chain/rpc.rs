//! An alloy backed chain client bound to one RPC provider

use alloy::{
    consensus::Transaction as _,
    eips::BlockNumberOrTag,
    network::{EthereumWallet, TransactionBuilder},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
    transports::http::reqwest::Url,
};
use alloy_primitives::{Address, Bytes, TxHash};
use async_trait::async_trait;
use tracing::debug;

use super::{BlockFees, ChainClient, GasTarget, TxFee};
use crate::{
    abi::{decode_try_multicall, encode_try_multicall},
    error::{UpdaterError, UpdaterResult},
    types::ChainId,
};

/// A chain client over an HTTP JSON-RPC provider
#[derive(Clone)]
pub struct RpcChainClient {
    /// The underlying provider
    provider: DynProvider,
    /// The data feed server contract
    contract: Address,
    /// The chain id the client was configured for
    chain_id: ChainId,
}

impl RpcChainClient {
    /// Create a client for the given provider URL
    pub fn new(url: &str, contract: Address, chain_id: ChainId) -> UpdaterResult<Self> {
        let url = Url::parse(url)
            .map_err(|e| UpdaterError::config(format!("invalid provider URL {url}: {e}")))?;
        let provider = DynProvider::new(ProviderBuilder::new().connect_http(url));

        Ok(Self { provider, contract, chain_id })
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn chain_id(&self) -> UpdaterResult<u64> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn block_fees(&self, block: BlockNumberOrTag) -> UpdaterResult<Option<BlockFees>> {
        let Some(block) = self.provider.get_block_by_number(block).full().await? else {
            return Ok(None);
        };

        let transactions = block
            .transactions
            .txns()
            .map(|tx| {
                if tx.is_dynamic_fee() {
                    TxFee::FeeMarket {
                        max_priority_fee_per_gas: tx.max_priority_fee_per_gas().unwrap_or_default(),
                    }
                } else {
                    TxFee::Legacy { gas_price: tx.gas_price().unwrap_or_default() }
                }
            })
            .collect();

        Ok(Some(BlockFees {
            number: block.header.number,
            base_fee_per_gas: block.header.base_fee_per_gas.map(u128::from),
            transactions,
        }))
    }

    async fn transaction_count(&self, address: Address) -> UpdaterResult<u64> {
        Ok(self.provider.get_transaction_count(address).pending().await?)
    }

    async fn gas_price(&self) -> UpdaterResult<u128> {
        Ok(self.provider.get_gas_price().await?)
    }

    async fn try_multicall(&self, calls: Vec<Bytes>) -> UpdaterResult<Vec<(bool, Bytes)>> {
        let tx = TransactionRequest::default()
            .with_to(self.contract)
            .with_input(encode_try_multicall(calls));
        let ret = self.provider.call(tx).await?;

        decode_try_multicall(&ret)
    }

    async fn send_multicall(
        &self,
        signer: &PrivateKeySigner,
        calls: Vec<Bytes>,
        nonce: u64,
        gas: GasTarget,
    ) -> UpdaterResult<TxHash> {
        let mut tx = TransactionRequest::default()
            .with_from(signer.address())
            .with_to(self.contract)
            .with_input(encode_try_multicall(calls))
            .with_chain_id(self.chain_id)
            .with_nonce(nonce);

        match gas {
            GasTarget::Legacy { gas_price } => tx.set_gas_price(gas_price),
            GasTarget::Eip1559 { max_fee_per_gas, max_priority_fee_per_gas } => {
                tx.set_max_fee_per_gas(max_fee_per_gas);
                tx.set_max_priority_fee_per_gas(max_priority_fee_per_gas);
            },
        }

        let gas_limit = self.provider.estimate_gas(tx.clone()).await?;
        tx.set_gas_limit(gas_limit);
        debug!(nonce, gas_limit, "signing data feed update");

        let wallet = EthereumWallet::from(signer.clone());
        let envelope = tx.build(&wallet).await.map_err(UpdaterError::transaction)?;
        let pending = self.provider.send_tx_envelope(envelope).await?;

        Ok(*pending.tx_hash())
    }
}
