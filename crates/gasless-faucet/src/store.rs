//! Per-address cooldown records.

use alloy::primitives::{Address, TxHash};
use dashmap::{mapref::entry::Entry, DashMap};
use std::time::Duration;
use tracing::debug;

/// What happened after an address was reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    /// Reserved; the request is still being checked or was denied downstream.
    Reserved,
    /// Funds were sent in this transaction.
    Disbursed(TxHash),
    /// The transfer could not be submitted.
    DispatchFailed,
}

/// Last request seen for an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EligibilityRecord {
    /// Wall-clock milliseconds of the last reservation.
    pub last_request_ms: i64,
    pub status: RecordStatus,
}

/// Outcome of an atomic check-and-reserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The address was free and is now marked with the caller's timestamp.
    Reserved {
        /// Timestamp of the previous reservation, if any.
        previous: Option<i64>,
    },
    /// The address was served too recently. Nothing was written.
    CoolingDown {
        /// Milliseconds until the address becomes eligible again.
        retry_after_ms: i64,
    },
}

/// Storage for last-request timestamps keyed by address.
///
/// `try_reserve` must behave as a single critical section per address: two
/// concurrent callers for the same address can never both get
/// [`Reservation::Reserved`] within one cooldown window.
pub trait EligibilityStore: Send + Sync {
    fn try_reserve(&self, address: Address, now_ms: i64, cooldown: Duration) -> Reservation;

    /// Attach a dispatch outcome to an existing record. The timestamp, and so
    /// the cooldown, is left untouched.
    fn record_outcome(&self, address: &Address, status: RecordStatus);

    fn get(&self, address: &Address) -> Option<EligibilityRecord>;

    fn stats(&self) -> StoreStats;
}

/// Statistics about the current store contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub tracked_addresses: usize,
}

/// Process-lifetime store backed by a sharded concurrent map.
///
/// Records are never evicted; a restart forgets every cooldown.
#[derive(Debug, Default)]
pub struct InMemoryEligibilityStore {
    records: DashMap<Address, EligibilityRecord>,
}

impl EligibilityRecord {
    fn reserved(now_ms: i64) -> Self {
        Self {
            last_request_ms: now_ms,
            status: RecordStatus::Reserved,
        }
    }
}

impl InMemoryEligibilityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EligibilityStore for InMemoryEligibilityStore {
    fn try_reserve(&self, address: Address, now_ms: i64, cooldown: Duration) -> Reservation {
        let cooldown_ms = i64::try_from(cooldown.as_millis()).unwrap_or(i64::MAX);

        // The entry guard holds the shard write lock until the end of the match.
        match self.records.entry(address) {
            Entry::Occupied(mut entry) => {
                let last = entry.get().last_request_ms;
                let elapsed = now_ms.saturating_sub(last);
                if elapsed < cooldown_ms {
                    let retry_after_ms = cooldown_ms.saturating_sub(elapsed);
                    debug!("Address {} cooling down for another {} ms", address, retry_after_ms);
                    return Reservation::CoolingDown { retry_after_ms };
                }
                entry.insert(EligibilityRecord::reserved(now_ms));
                Reservation::Reserved { previous: Some(last) }
            }
            Entry::Vacant(entry) => {
                entry.insert(EligibilityRecord::reserved(now_ms));
                Reservation::Reserved { previous: None }
            }
        }
    }

    fn record_outcome(&self, address: &Address, status: RecordStatus) {
        if let Some(mut record) = self.records.get_mut(address) {
            record.status = status;
        }
    }

    fn get(&self, address: &Address) -> Option<EligibilityRecord> {
        self.records.get(address).map(|entry| *entry.value())
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            tracked_addresses: self.records.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use std::sync::Arc;
    use std::thread;

    const HOUR: Duration = Duration::from_secs(3600);
    const USER: Address = address!("5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");

    #[test]
    fn test_first_reservation() {
        let store = InMemoryEligibilityStore::new();
        assert_eq!(store.get(&USER), None);

        let reservation = store.try_reserve(USER, 1_000, HOUR);
        assert_eq!(reservation, Reservation::Reserved { previous: None });
        assert_eq!(
            store.get(&USER),
            Some(EligibilityRecord {
                last_request_ms: 1_000,
                status: RecordStatus::Reserved,
            })
        );
    }

    #[test]
    fn test_cooldown_blocks_without_writing() {
        let store = InMemoryEligibilityStore::new();
        store.try_reserve(USER, 1_000, HOUR);

        let reservation = store.try_reserve(USER, 61_000, HOUR);
        assert_eq!(
            reservation,
            Reservation::CoolingDown { retry_after_ms: 3_600_000 - 60_000 }
        );
        assert_eq!(store.get(&USER).unwrap().last_request_ms, 1_000);
    }

    #[test]
    fn test_cooldown_boundary() {
        let store = InMemoryEligibilityStore::new();
        store.try_reserve(USER, 0, HOUR);

        assert!(matches!(
            store.try_reserve(USER, 3_599_999, HOUR),
            Reservation::CoolingDown { retry_after_ms: 1 }
        ));
        assert_eq!(
            store.try_reserve(USER, 3_600_000, HOUR),
            Reservation::Reserved { previous: Some(0) }
        );
        assert_eq!(store.get(&USER).unwrap().last_request_ms, 3_600_000);
    }

    #[test]
    fn test_record_outcome_keeps_timestamp() {
        let store = InMemoryEligibilityStore::new();
        store.try_reserve(USER, 1_000, HOUR);

        let tx_hash = TxHash::repeat_byte(0xab);
        store.record_outcome(&USER, RecordStatus::Disbursed(tx_hash));

        let record = store.get(&USER).unwrap();
        assert_eq!(record.last_request_ms, 1_000);
        assert_eq!(record.status, RecordStatus::Disbursed(tx_hash));

        // Still throttled after a failed transfer.
        store.record_outcome(&USER, RecordStatus::DispatchFailed);
        assert!(matches!(
            store.try_reserve(USER, 2_000, HOUR),
            Reservation::CoolingDown { .. }
        ));
    }

    #[test]
    fn test_record_outcome_for_unknown_address_is_ignored() {
        let store = InMemoryEligibilityStore::new();
        store.record_outcome(&USER, RecordStatus::DispatchFailed);
        assert_eq!(store.get(&USER), None);
        assert_eq!(store.stats().tracked_addresses, 0);
    }

    #[test]
    fn test_clock_going_backwards_stays_throttled() {
        let store = InMemoryEligibilityStore::new();
        store.try_reserve(USER, 10_000, HOUR);

        assert!(matches!(
            store.try_reserve(USER, 5_000, HOUR),
            Reservation::CoolingDown { .. }
        ));
    }

    #[test]
    fn test_addresses_are_independent() {
        let store = InMemoryEligibilityStore::new();
        let other = address!("0000000000000000000000000000000000000001");

        store.try_reserve(USER, 1_000, HOUR);
        assert_eq!(
            store.try_reserve(other, 1_001, HOUR),
            Reservation::Reserved { previous: None }
        );
        assert_eq!(store.stats().tracked_addresses, 2);
    }

    #[test]
    fn test_concurrent_reservations_single_winner() {
        let store = Arc::new(InMemoryEligibilityStore::new());
        let mut handles = vec![];

        for i in 0..16 {
            let store_clone = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                store_clone.try_reserve(USER, 1_000 + i, HOUR)
            }));
        }

        let winners = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|reservation| matches!(reservation, Reservation::Reserved { .. }))
            .count();

        assert_eq!(winners, 1);
        assert_eq!(store.stats().tracked_addresses, 1);
    }
}
