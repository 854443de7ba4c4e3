//! Utility modules: retry and token accounting.

pub mod retry;
pub mod usage;

pub use retry::RetryPolicy;
pub use usage::TokenLedger;
