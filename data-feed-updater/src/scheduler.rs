//! Owns the updater's long-lived loops
//!
//! One loop per provider sponsor group drives the executor, one loop per
//! network and provider drives the gas oracle. Loops check the stop flag at
//! the top of every iteration only, so an in-flight cycle always runs to its
//! own deadline before its loop exits.

use std::time::Duration;

use tokio::{
    task::JoinSet,
    time::{sleep, Instant},
};
use tracing::{error, info, info_span, warn, Instrument};

use crate::{
    executor::UpdateExecutor,
    gas_oracle::GasOracleWorker,
    grouping::{build_groups, ProviderSponsorGroup},
    state::State,
};

/// The time left to sleep after an iteration that took `elapsed`
///
/// An iteration that overran its interval is followed immediately by the
/// next one; missed iterations are never caught up.
pub fn sleep_duration(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

/// Spawns and joins the updater's loops
pub struct Scheduler {
    /// The shared state
    state: State,
    /// The running loops
    tasks: JoinSet<()>,
}

impl Scheduler {
    /// Constructor
    pub fn new(state: State) -> Self {
        Self { state, tasks: JoinSet::new() }
    }

    /// Spawn a gas oracle loop per provider and an update loop per group,
    /// returning the number of groups
    pub fn start(&mut self) -> usize {
        let config = self.state.config();
        for (chain_id, provider) in self.state.providers().iter() {
            let Some(chain) = config.chains.get(&chain_id) else {
                continue;
            };

            let worker = GasOracleWorker::new(
                self.state.clone(),
                chain_id,
                provider,
                chain.options.gas_oracle.clone(),
            );
            self.tasks.spawn(worker.run());
        }

        let groups = build_groups(config, self.state.providers());
        let n_groups = groups.len();
        for group in groups {
            let executor = UpdateExecutor::new(self.state.clone(), group);
            self.tasks.spawn(run_update_loop(self.state.clone(), executor));
        }

        info!(n_groups, "started update loops");
        n_groups
    }

    /// Wait for every loop to exit
    pub async fn join(mut self) {
        while let Some(res) = self.tasks.join_next().await {
            if let Err(e) = res {
                error!("updater loop panicked: {e}");
            }
        }
    }
}

/// Run update cycles for a group until the state is stopped
pub async fn run_update_loop(state: State, executor: UpdateExecutor) {
    let group: &ProviderSponsorGroup = executor.group();
    let span = info_span!(
        "update_loop",
        chain_id = group.chain_id,
        provider = %group.provider.name,
        sponsor = %group.sponsor,
    );
    span.in_scope(|| info!(data_feeds = group.len(), "starting update loop"));

    loop {
        if state.is_stopped() {
            span.in_scope(|| info!("update loop stopped"));
            break;
        }

        let start = Instant::now();
        match executor.run_cycle().instrument(span.clone()).await {
            Ok(summary) => span.in_scope(|| {
                info!(
                    feeds_read = summary.feeds_read,
                    updates = summary.updates,
                    transactions = summary.transactions,
                    elapsed = ?start.elapsed(),
                    "update cycle complete"
                )
            }),
            Err(e) => span.in_scope(|| warn!("update cycle aborted: {e}")),
        }

        sleep(sleep_duration(group.update_interval, start.elapsed())).await;
    }
}
