//! The sliding window of sampled block gas prices of one provider

use std::{collections::VecDeque, ops::RangeInclusive};

/// The gas prices paid in one sampled block
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockSample {
    /// The block number
    pub number: u64,
    /// The effective gas prices of the block's transactions
    pub gas_prices: Vec<u128>,
}

/// A window of recent non-empty block samples, most recent first, with the
/// recommended price derived from them
#[derive(Clone, Debug, Default)]
pub struct GasPriceWindow {
    /// The sampled blocks, most recent first
    samples: VecDeque<BlockSample>,
    /// The most recent block processed, empty or not
    latest_block: Option<u64>,
    /// The recommended price over the current samples
    percentile_price: Option<u128>,
}

impl GasPriceWindow {
    /// The most recent block processed
    pub fn latest_block(&self) -> Option<u64> {
        self.latest_block
    }

    /// The recommended gas price, `None` until a non-empty block is sampled
    pub fn percentile_price(&self) -> Option<u128> {
        self.percentile_price
    }

    /// The sampled blocks, most recent first
    pub fn samples(&self) -> impl Iterator<Item = &BlockSample> {
        self.samples.iter()
    }

    /// The older blocks to fetch to catch up with `latest`, excluding
    /// `latest` itself
    ///
    /// Covers the blocks after the last processed one, capped so that
    /// together with `latest` at most `sample_count` blocks are fetched.
    /// `None` when there is nothing older than `latest` to fetch.
    pub fn backfill_range(
        &self,
        latest: u64,
        sample_count: usize,
    ) -> Option<RangeInclusive<u64>> {
        if self.latest_block.is_some_and(|known| known >= latest) {
            return None;
        }

        let cap = latest.saturating_sub(sample_count.saturating_sub(1) as u64);
        let start = match self.latest_block {
            Some(known) => known.saturating_add(1).max(cap),
            None => cap,
        };

        (start < latest).then(|| start..=latest - 1)
    }

    /// Record newly fetched blocks and recompute the recommended price
    ///
    /// `new_samples` holds the non-empty blocks among those fetched since the
    /// last update. Recording a `latest` block that was already processed
    /// leaves the window untouched.
    pub fn record(
        &mut self,
        latest: u64,
        mut new_samples: Vec<BlockSample>,
        sample_count: usize,
        percentile: u64,
    ) {
        if self.latest_block.is_some_and(|known| known >= latest) {
            return;
        }

        new_samples.sort_by(|a, b| a.number.cmp(&b.number));
        for sample in new_samples {
            if !sample.gas_prices.is_empty() {
                self.samples.push_front(sample);
            }
        }
        self.samples.truncate(sample_count);
        self.latest_block = Some(latest);

        let mut prices: Vec<u128> =
            self.samples.iter().flat_map(|s| s.gas_prices.iter().copied()).collect();
        if let Some(price) = percentile_of(&mut prices, percentile) {
            self.percentile_price = Some(price);
        }
    }
}

/// The value at the given percentile, `ceil(n * percentile / 100) - 1` in
/// ascending order
pub fn percentile_of(values: &mut [u128], percentile: u64) -> Option<u128> {
    if values.is_empty() {
        return None;
    }

    values.sort_unstable();
    let n = values.len() as u64;
    let rank = (n * percentile.min(100)).div_ceil(100);
    let index = rank.saturating_sub(1) as usize;

    values.get(index).copied()
}
