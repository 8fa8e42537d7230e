//! Sending funds to addresses that passed evaluation.

use crate::eligibility::DenyReason;
use crate::ports::{bounded, Disburser};
use crate::store::{EligibilityStore, RecordStatus};
use alloy::primitives::{utils::format_ether, Address, TxHash, U256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// A submitted funding transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disbursement {
    pub to: Address,
    pub amount: U256,
    pub transaction_hash: TxHash,
}

pub type DisbursementResult = Result<Disbursement, DenyReason>;

/// Submits the fixed disbursement and records the outcome.
pub struct Dispatcher {
    disburser: Arc<dyn Disburser>,
    store: Arc<dyn EligibilityStore>,
    amount: U256,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        disburser: Arc<dyn Disburser>,
        store: Arc<dyn EligibilityStore>,
        amount: U256,
        timeout: Duration,
    ) -> Self {
        Self {
            disburser,
            store,
            amount,
            timeout,
        }
    }

    pub fn amount(&self) -> U256 {
        self.amount
    }

    pub fn sender(&self) -> Address {
        self.disburser.sender()
    }

    /// Send the configured amount to `address`.
    ///
    /// Must only be called once per `Allow` verdict. Failures are not retried
    /// and leave the address's reservation in place.
    pub async fn dispatch(&self, address: Address) -> DisbursementResult {
        let result = bounded(
            self.timeout,
            "transaction submission",
            self.disburser.disburse(address, self.amount),
        )
        .await;

        match result {
            Ok(transaction_hash) => {
                info!(
                    "Sent {} ETH to {} (tx: {})",
                    format_ether(self.amount),
                    address,
                    transaction_hash
                );
                self.store
                    .record_outcome(&address, RecordStatus::Disbursed(transaction_hash));
                Ok(Disbursement {
                    to: address,
                    amount: self.amount,
                    transaction_hash,
                })
            }
            Err(e) => {
                error!("Failed to fund {}: {}", address, e);
                self.store
                    .record_outcome(&address, RecordStatus::DispatchFailed);
                Err(DenyReason::DispatchFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FaucetError;
    use crate::ports::MockDisburser;
    use crate::store::InMemoryEligibilityStore;
    use alloy::primitives::address;

    const USER: Address = address!("5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
    const HOUR: Duration = Duration::from_secs(3600);

    fn amount() -> U256 {
        U256::from(100_000_000_000_000_000u64)
    }

    fn dispatcher(disburser: MockDisburser) -> (Dispatcher, Arc<InMemoryEligibilityStore>) {
        let store = Arc::new(InMemoryEligibilityStore::new());
        store.try_reserve(USER, 1_000, HOUR);
        let dispatcher = Dispatcher::new(
            Arc::new(disburser),
            store.clone(),
            amount(),
            Duration::from_secs(5),
        );
        (dispatcher, store)
    }

    #[tokio::test]
    async fn test_dispatch_sends_configured_amount() {
        let tx_hash = TxHash::repeat_byte(0x11);
        let mut disburser = MockDisburser::new();
        disburser
            .expect_disburse()
            .withf(|to, value| *to == USER && *value == U256::from(100_000_000_000_000_000u64))
            .times(1)
            .returning(move |_, _| Ok(tx_hash));
        let (dispatcher, store) = dispatcher(disburser);

        let disbursement = dispatcher.dispatch(USER).await.unwrap();

        assert_eq!(disbursement.to, USER);
        assert_eq!(disbursement.amount, amount());
        assert_eq!(disbursement.transaction_hash, tx_hash);
        assert_eq!(
            store.get(&USER).unwrap().status,
            RecordStatus::Disbursed(tx_hash)
        );
    }

    #[tokio::test]
    async fn test_dispatch_failure_keeps_reservation() {
        let mut disburser = MockDisburser::new();
        disburser
            .expect_disburse()
            .times(1)
            .returning(|_, _| Err(FaucetError::Transaction("insufficient funds".to_string())));
        let (dispatcher, store) = dispatcher(disburser);

        assert_eq!(dispatcher.dispatch(USER).await, Err(DenyReason::DispatchFailed));

        let record = store.get(&USER).unwrap();
        assert_eq!(record.status, RecordStatus::DispatchFailed);
        assert_eq!(record.last_request_ms, 1_000);
    }

    #[tokio::test]
    async fn test_sender_comes_from_disburser() {
        let sender = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        let mut disburser = MockDisburser::new();
        disburser.expect_sender().return_const(sender);
        let (dispatcher, _store) = dispatcher(disburser);

        assert_eq!(dispatcher.sender(), sender);
    }
}
