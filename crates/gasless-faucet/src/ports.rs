//! Capabilities the faucet needs from the chain.
//!
//! The eligibility logic only talks to the ledger through these two traits so
//! it can run against deterministic fakes in tests and against
//! [`EthereumClient`](crate::eth::EthereumClient) in production.

use crate::error::{FaucetError, FaucetResult};
use alloy::primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

/// Read-only chain queries.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChainQuery: Send + Sync {
    /// Native balance of `address`, in wei.
    async fn native_balance(&self, address: Address) -> FaucetResult<U256>;

    /// `balanceOf(holder)` on the ERC-20 contract at `token`.
    async fn token_balance(&self, token: Address, holder: Address) -> FaucetResult<U256>;
}

/// Value transfers out of the faucet wallet.
///
/// `disburse` is not idempotent: every successful call moves funds.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Disburser: Send + Sync {
    /// Address funds are sent from.
    fn sender(&self) -> Address;

    /// Submit a transfer of `amount` wei to `to` and return its hash without
    /// waiting for confirmation.
    async fn disburse(&self, to: Address, amount: U256) -> FaucetResult<TxHash>;
}

/// Run a port call, failing with [`FaucetError::Timeout`] once `limit` elapses.
pub async fn bounded<T>(
    limit: Duration,
    operation: &'static str,
    call: impl Future<Output = FaucetResult<T>>,
) -> FaucetResult<T> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| FaucetError::Timeout(operation))?
}
