//! The gas price oracle
//!
//! One worker per network and provider samples recent blocks into a
//! [`GasPriceWindow`]; the write path prices its transactions through
//! [`gas_target`], which falls back from the sampled price to the provider's
//! recommendation and finally to a configured constant.

pub mod price;
pub mod window;
pub mod worker;

pub use price::gas_target;
pub use window::{BlockSample, GasPriceWindow};
pub use worker::GasOracleWorker;
