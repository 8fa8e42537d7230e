//! Admission controller tying evaluation and dispatch together.

use crate::config::FaucetConfig;
use crate::dispatch::{DisbursementResult, Dispatcher};
use crate::eligibility::{EligibilityEvaluator, EligibilityPolicy, Verdict};
use crate::error::FaucetResult;
use crate::ports::{bounded, ChainQuery, Disburser};
use crate::store::{EligibilityStore, InMemoryEligibilityStore, StoreStats};
use alloy::primitives::{Address, U256};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Snapshot reported by the health endpoint
#[derive(Debug, Clone)]
pub struct FaucetHealth {
    pub faucet_address: Address,
    /// `None` if the balance query failed or timed out
    pub faucet_balance: Option<U256>,
    pub disbursement_amount: U256,
    pub tracked_addresses: usize,
}

pub struct GasFaucet {
    evaluator: EligibilityEvaluator,
    dispatcher: Dispatcher,
    store: Arc<dyn EligibilityStore>,
    chain: Arc<dyn ChainQuery>,
    query_timeout: Duration,
}

impl GasFaucet {
    pub fn new(
        policy: EligibilityPolicy,
        amount: U256,
        store: Arc<dyn EligibilityStore>,
        chain: Arc<dyn ChainQuery>,
        disburser: Arc<dyn Disburser>,
    ) -> Self {
        let query_timeout = policy.query_timeout;
        let evaluator = EligibilityEvaluator::new(store.clone(), chain.clone(), policy);
        let dispatcher = Dispatcher::new(disburser, store.clone(), amount, query_timeout);

        Self {
            evaluator,
            dispatcher,
            store,
            chain,
            query_timeout,
        }
    }

    /// Build a faucet with an in-memory store over a client that serves both ports
    pub fn from_config<C>(config: &FaucetConfig, client: Arc<C>) -> FaucetResult<Self>
    where
        C: ChainQuery + Disburser + 'static,
    {
        let policy = EligibilityPolicy::from_config(config)?;
        let amount = config.ethereum.disbursement_amount()?;

        Ok(Self::new(
            policy,
            amount,
            Arc::new(InMemoryEligibilityStore::new()),
            client.clone(),
            client,
        ))
    }

    /// Handle a funding request using the current time
    pub async fn fund(&self, address: &str, claimed_ms: i64) -> DisbursementResult {
        self.fund_at(address, claimed_ms, now_millis()).await
    }

    /// Handle a funding request as if it arrived at `now_ms`
    pub async fn fund_at(&self, address: &str, claimed_ms: i64, now_ms: i64) -> DisbursementResult {
        match self.evaluator.evaluate(address, claimed_ms, now_ms).await {
            Verdict::Allow(address) => self.dispatcher.dispatch(address).await,
            Verdict::Deny(reason) => {
                info!("Denied funding for {}: {}", address, reason);
                Err(reason)
            }
        }
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    pub async fn health(&self) -> FaucetHealth {
        let faucet_address = self.dispatcher.sender();
        let faucet_balance = match bounded(
            self.query_timeout,
            "faucet balance query",
            self.chain.native_balance(faucet_address),
        )
        .await
        {
            Ok(balance) => Some(balance),
            Err(e) => {
                warn!("Could not read faucet balance: {}", e);
                None
            }
        };

        FaucetHealth {
            faucet_address,
            faucet_balance,
            disbursement_amount: self.dispatcher.amount(),
            tracked_addresses: self.stats().tracked_addresses,
        }
    }
}
