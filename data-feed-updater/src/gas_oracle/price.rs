//! Prices write transactions
//!
//! Legacy prices fall back in order: the provider's sampled percentile price,
//! the provider's own recommendation scaled by the configured multiplier,
//! and finally the configured constant, so a price is always produced.
//! Fee-market prices derive from the latest base fee and degrade to a legacy
//! price when it cannot be read.

use alloy::eips::BlockNumberOrTag;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    chain::{GasTarget, ProviderHandle},
    config::{ChainOptions, TxType},
    error::{UpdaterError, UpdaterResult},
    retry::RetryPolicy,
    state::{GasOracleKey, State},
    types::ChainId,
};

/// Price a write transaction sent through the given provider
///
/// Chain calls are bounded by both the oracle's call timeout and `deadline`.
pub async fn gas_target(
    state: &State,
    chain_id: ChainId,
    provider: &ProviderHandle,
    options: &ChainOptions,
    deadline: Instant,
) -> GasTarget {
    let policy = || {
        let call_deadline = Instant::now() + options.gas_oracle.max_timeout();
        RetryPolicy::until(call_deadline.min(deadline))
    };

    if options.tx_type == TxType::Eip1559 {
        match policy().run("fetch base fee", || latest_base_fee(provider)).await {
            Ok(base_fee) => return eip1559_target(base_fee, options),
            Err(e) => {
                warn!(chain_id, provider = %provider.name, "no base fee, pricing as legacy: {e}");
            },
        }
    }

    let key = GasOracleKey::new(chain_id, provider.name.clone());
    if let Some(gas_price) = state.recommended_gas_price(&key) {
        debug!(chain_id, provider = %provider.name, gas_price, "using sampled gas price");
        return GasTarget::Legacy { gas_price };
    }

    let gas_price = match policy().run("fetch gas price", || provider.client.gas_price()).await {
        Ok(price) => apply_multiplier(price, options.gas_price_multiplier_percent),
        Err(e) => {
            warn!(chain_id, provider = %provider.name, "using fallback gas price: {e}");
            options.fallback_gas_price_wei
        },
    };

    GasTarget::Legacy { gas_price }
}

/// Read the base fee of the latest block
async fn latest_base_fee(provider: &ProviderHandle) -> UpdaterResult<u128> {
    provider
        .client
        .block_fees(BlockNumberOrTag::Latest)
        .await?
        .and_then(|block| block.base_fee_per_gas)
        .ok_or_else(|| UpdaterError::rpc("latest block has no base fee"))
}

/// Price a fee-market transaction,
/// `maxFeePerGas = baseFeePerGas * baseFeeMultiplier + maxPriorityFeePerGas`
fn eip1559_target(base_fee: u128, options: &ChainOptions) -> GasTarget {
    let max_priority_fee_per_gas = options.priority_fee();
    let max_fee_per_gas = base_fee
        .saturating_mul(u128::from(options.base_fee_multiplier))
        .saturating_add(max_priority_fee_per_gas);

    GasTarget::Eip1559 { max_fee_per_gas, max_priority_fee_per_gas }
}

/// Scale a gas price by an integer percentage
fn apply_multiplier(gas_price: u128, multiplier_percent: Option<u64>) -> u128 {
    match multiplier_percent {
        Some(percent) => gas_price.saturating_mul(u128::from(percent)) / 100,
        None => gas_price,
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        chain::{BlockFees, ProviderPool},
        gas_oracle::BlockSample,
        test_utils::{mock_config, MockChainClient, CHAIN_ID},
    };

    /// Set up a state and a provider over a mock chain
    fn setup() -> (State, Arc<MockChainClient>, ProviderHandle, ChainOptions) {
        let config = mock_config();
        let options = config.chains[&CHAIN_ID].options.clone();
        let state = State::new(config, ProviderPool::new());
        let client = Arc::new(MockChainClient::new());
        let handle = ProviderHandle::new("local", client.clone());
        (state, client, handle, options)
    }

    /// A deadline far enough not to matter
    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    /// Tests that the sampled price is preferred
    #[tokio::test(start_paused = true)]
    async fn test_sampled_price() {
        let (state, client, handle, options) = setup();
        client.set_gas_price(5);
        state.update_gas_window(&GasOracleKey::new(CHAIN_ID, "local"), |w| {
            w.record(1, vec![BlockSample { number: 1, gas_prices: vec![42] }], 20, 60)
        });

        let target = gas_target(&state, CHAIN_ID, &handle, &options, deadline()).await;
        assert_eq!(target, GasTarget::Legacy { gas_price: 42 });
    }

    /// Tests the provider's recommendation with a multiplier
    #[tokio::test(start_paused = true)]
    async fn test_provider_price_with_multiplier() {
        let (state, client, handle, mut options) = setup();
        client.set_gas_price(1_000);
        options.gas_price_multiplier_percent = Some(125);

        let target = gas_target(&state, CHAIN_ID, &handle, &options, deadline()).await;
        assert_eq!(target, GasTarget::Legacy { gas_price: 1_250 });
    }

    /// Tests that the constant fallback is used when the provider is down,
    /// without running past the deadline
    #[tokio::test(start_paused = true)]
    async fn test_constant_fallback() {
        let (state, client, handle, options) = setup();
        client.set_unreachable(true);

        let start = Instant::now();
        let target = gas_target(&state, CHAIN_ID, &handle, &options, deadline()).await;
        assert_eq!(target, GasTarget::Legacy { gas_price: options.fallback_gas_price_wei });
        assert!(start.elapsed() <= options.gas_oracle.max_timeout());
    }

    /// Tests fee-market pricing and its degradation to a legacy price
    #[tokio::test(start_paused = true)]
    async fn test_eip1559() {
        let (state, client, handle, mut options) = setup();
        options.tx_type = TxType::Eip1559;
        client.set_gas_price(77);

        let target = gas_target(&state, CHAIN_ID, &handle, &options, deadline()).await;
        assert_eq!(target, GasTarget::Legacy { gas_price: 77 });

        client.push_block(BlockFees {
            number: 1,
            base_fee_per_gas: Some(100),
            transactions: vec![],
        });
        let target = gas_target(&state, CHAIN_ID, &handle, &options, deadline()).await;
        assert_eq!(
            target,
            GasTarget::Eip1559 {
                max_fee_per_gas: 200 + 3_120_000_000,
                max_priority_fee_per_gas: 3_120_000_000,
            }
        );
    }
}
