//! Defines a worker that samples block gas prices into the shared state

use std::sync::Arc;

use alloy::eips::BlockNumberOrTag;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

use super::window::BlockSample;
use crate::{
    chain::{BlockFees, ChainClient, ProviderHandle},
    config::GasOracleConfig,
    error::{UpdaterError, UpdaterResult},
    retry::RetryPolicy,
    scheduler::sleep_duration,
    state::{GasOracleKey, State},
    types::ChainId,
};

/// The worker that keeps one provider's gas price window up to date
pub struct GasOracleWorker {
    /// The shared state holding the window
    state: State,
    /// The window's key
    key: GasOracleKey,
    /// The provider's client
    client: Arc<dyn ChainClient>,
    /// The sampling parameters
    config: GasOracleConfig,
}

impl GasOracleWorker {
    /// Create a worker for one provider of a network
    pub fn new(
        state: State,
        chain_id: ChainId,
        provider: &ProviderHandle,
        config: GasOracleConfig,
    ) -> Self {
        let key = GasOracleKey::new(chain_id, provider.name.clone());
        Self { state, key, client: provider.client.clone(), config }
    }

    /// Run the worker until the state is stopped
    pub async fn run(self) {
        let interval = self.config.update_interval();
        let span =
            info_span!("gas_oracle", chain_id = self.key.chain_id, provider = %self.key.provider);
        span.in_scope(|| info!("starting gas oracle"));

        loop {
            if self.state.is_stopped() {
                span.in_scope(|| info!("gas oracle stopped"));
                break;
            }

            let start = Instant::now();
            if let Err(e) = self.update().instrument(span.clone()).await {
                span.in_scope(|| warn!("gas oracle update failed: {e}"));
            }

            sleep(sleep_duration(interval, start.elapsed())).await;
        }
    }

    /// Sample the blocks produced since the last update
    pub async fn update(&self) -> UpdaterResult<()> {
        let latest = self
            .fetch_block(BlockNumberOrTag::Latest)
            .await?
            .ok_or_else(|| UpdaterError::rpc("latest block unavailable"))?;

        let sample_count = self.config.sample_block_count;
        let Some(backfill) = self.state.update_gas_window(&self.key, |window| {
            match window.latest_block() {
                Some(known) if known >= latest.number => None,
                _ => Some(window.backfill_range(latest.number, sample_count)),
            }
        }) else {
            debug!(block = latest.number, "no new block");
            return Ok(());
        };

        let mut samples =
            vec![BlockSample { number: latest.number, gas_prices: latest.effective_gas_prices() }];
        for number in backfill.into_iter().flatten() {
            match self.fetch_block(BlockNumberOrTag::Number(number)).await? {
                Some(block) => samples.push(BlockSample {
                    number: block.number,
                    gas_prices: block.effective_gas_prices(),
                }),
                None => debug!(block = number, "block unavailable"),
            }
        }

        let percentile = self.config.percentile;
        let price = self.state.update_gas_window(&self.key, |window| {
            window.record(latest.number, samples, sample_count, percentile);
            window.percentile_price()
        });
        debug!(block = latest.number, gas_price = ?price, "updated gas price window");

        Ok(())
    }

    /// Fetch a block under the oracle's retry policy
    async fn fetch_block(
        &self,
        block: BlockNumberOrTag,
    ) -> UpdaterResult<Option<BlockFees>> {
        let policy = RetryPolicy::with_total_timeout(self.config.max_timeout());
        policy.run("fetch block", || self.client.block_fees(block)).await
    }
}
