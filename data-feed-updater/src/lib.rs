//! Keeps on-chain beacon and beacon set data feeds in sync with signed
//! off-chain observations
//!
//! The updater reads each configured data feed from its network's data feed
//! server, compares it against the latest cached observation, and batches
//! the updates that crossed their deviation or heartbeat threshold into
//! sponsored multicall transactions.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::needless_pass_by_ref_mut)]
#![deny(unsafe_code)]
#![deny(clippy::uninlined_format_args)]

pub mod abi;
pub mod api;
pub mod chain;
pub mod cli;
pub mod condition;
pub mod config;
pub mod error;
pub mod executor;
pub mod gas_oracle;
pub mod grouping;
pub mod math;
pub mod retry;
pub mod scheduler;
pub mod state;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;
