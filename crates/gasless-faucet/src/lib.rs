//! Gasless Faucet - gas funding for token holders
//!
//! This crate provides an HTTP server that tops up wallets with a small,
//! fixed amount of ETH so they can pay for their first transactions:
//! 1. A client posts its address and the current time in milliseconds
//! 2. Stale or future timestamps are rejected
//! 3. Each address is served at most once per cooldown window
//! 4. Addresses that already hold enough ETH, or hold none of the gating
//!    token, are turned away
//! 5. Everyone else receives the configured disbursement
//!
//! The decision logic lives in [`eligibility`] and [`dispatch`] and reaches the
//! chain only through the traits in [`ports`].

pub mod config;
pub mod dispatch;
pub mod eligibility;
pub mod error;
pub mod eth;
pub mod faucet;
pub mod http;
pub mod ports;
pub mod rate_limit;
pub mod store;

pub use config::FaucetConfig;
pub use eligibility::{DenyReason, Verdict};
pub use error::{FaucetError, FaucetResult};
pub use faucet::GasFaucet;
