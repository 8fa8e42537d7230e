//! Eligibility decisions for gas funding.
//!
//! A request is evaluated in a fixed order:
//!
//! 1. the address must parse,
//! 2. the client timestamp must fall inside the freshness window,
//! 3. the address must not be cooling down, and is reserved on the spot,
//! 4. the address must not already hold enough native currency,
//! 5. the address must hold some of the gating token.
//!
//! Steps 1 and 2 have no side effects. Step 3 is an atomic check-and-set on
//! the [`EligibilityStore`]. Steps 4 and 5 hit the chain after the reservation
//! is committed, so a second request for the same address is already throttled
//! while they run. The reservation is never rolled back.

use crate::config::FaucetConfig;
use crate::error::FaucetResult;
use crate::ports::{bounded, ChainQuery};
use crate::store::{EligibilityStore, Reservation};
use alloy::primitives::{Address, U256};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Wei in one whole unit of native currency.
const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

const SECONDS_PER_HOUR: u64 = 3600;

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    InvalidAddress,
    StaleTimestamp,
    FutureTimestamp,
    CooldownActive,
    /// The address already holds at least the sufficiency threshold.
    AlreadyFunded {
        balance: U256,
    },
    NoEligibilityToken,
    /// A chain query or the transfer itself failed or timed out.
    DispatchFailed,
}

impl DenyReason {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            DenyReason::InvalidAddress => "invalid-address",
            DenyReason::StaleTimestamp => "stale-timestamp",
            DenyReason::FutureTimestamp => "future-timestamp",
            DenyReason::CooldownActive => "cooldown-active",
            DenyReason::AlreadyFunded { .. } => "already-funded",
            DenyReason::NoEligibilityToken => "no-eligibility-token",
            DenyReason::DispatchFailed => "dispatch-failed",
        }
    }

    /// Human-readable explanation for API clients.
    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::InvalidAddress => "Invalid user address",
            DenyReason::StaleTimestamp => "can't use old signature",
            DenyReason::FutureTimestamp => "timestamp is in the future",
            DenyReason::CooldownActive => "hourly gasless limit exceeded",
            DenyReason::AlreadyFunded { .. } => "you already have minimum balance to pay fees",
            DenyReason::NoEligibilityToken => "you don't own the eligibility token",
            DenyReason::DispatchFailed => "funding transaction could not be sent",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Result of evaluating one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Fund this (parsed, canonical) address.
    Allow(Address),
    Deny(DenyReason),
}

/// Tunables for [`EligibilityEvaluator`].
#[derive(Debug, Clone)]
pub struct EligibilityPolicy {
    pub freshness_window: Duration,
    pub cooldown: Duration,
    pub gating_token: Address,
    /// Whole native units at or above which an address is considered funded.
    pub min_sufficient_balance: u64,
    /// Bound on each chain query.
    pub query_timeout: Duration,
}

impl EligibilityPolicy {
    pub fn from_config(config: &FaucetConfig) -> FaucetResult<Self> {
        let cooldown_secs = config
            .eligibility
            .cooldown_hours
            .checked_mul(SECONDS_PER_HOUR)
            .ok_or_else(|| {
                config::ConfigError::Message(format!(
                    "Cooldown of {} hours is out of range",
                    config.eligibility.cooldown_hours
                ))
            })?;

        Ok(Self {
            freshness_window: Duration::from_secs(config.eligibility.freshness_window_secs),
            cooldown: Duration::from_secs(cooldown_secs),
            gating_token: config.ethereum.gating_token()?,
            min_sufficient_balance: config.ethereum.min_sufficient_balance_eth,
            query_timeout: Duration::from_secs(config.ethereum.request_timeout_secs),
        })
    }
}

/// Parse a client-supplied address.
///
/// Accepts 40 hex digits with or without `0x`, in all-lowercase, all-uppercase
/// or valid EIP-55 mixed case. Mixed case with a wrong checksum is rejected.
pub fn parse_address(raw: &str) -> Option<Address> {
    let address = Address::from_str(raw).ok()?;

    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    let has_upper = digits.bytes().any(|b| b.is_ascii_uppercase());
    let has_lower = digits.bytes().any(|b| b.is_ascii_lowercase());
    if has_upper && has_lower {
        let checksummed = address.to_checksum(None);
        if &checksummed[2..] != digits {
            return None;
        }
    }

    Some(address)
}

/// Check `0 < now - claimed < window`, in milliseconds.
pub fn check_freshness(claimed_ms: i64, now_ms: i64, window: Duration) -> Result<(), DenyReason> {
    let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
    let age = now_ms.saturating_sub(claimed_ms);

    if age <= 0 {
        Err(DenyReason::FutureTimestamp)
    } else if age >= window_ms {
        Err(DenyReason::StaleTimestamp)
    } else {
        Ok(())
    }
}

/// Whether `balance` (wei) reaches `threshold` whole units, fraction truncated.
pub fn is_sufficiently_funded(balance: U256, threshold: u64) -> bool {
    balance / U256::from(WEI_PER_ETHER) >= U256::from(threshold)
}

/// Decides whether an address gets funded.
pub struct EligibilityEvaluator {
    store: Arc<dyn EligibilityStore>,
    chain: Arc<dyn ChainQuery>,
    policy: EligibilityPolicy,
}

impl EligibilityEvaluator {
    pub fn new(
        store: Arc<dyn EligibilityStore>,
        chain: Arc<dyn ChainQuery>,
        policy: EligibilityPolicy,
    ) -> Self {
        Self {
            store,
            chain,
            policy,
        }
    }

    /// Evaluate a request at wall-clock time `now_ms`.
    ///
    /// An `Allow` verdict means the address has been reserved and must be
    /// dispatched at most once.
    pub async fn evaluate(&self, address: &str, claimed_ms: i64, now_ms: i64) -> Verdict {
        let Some(address) = parse_address(address) else {
            return Verdict::Deny(DenyReason::InvalidAddress);
        };

        if let Err(reason) = check_freshness(claimed_ms, now_ms, self.policy.freshness_window) {
            debug!(
                "Rejecting timestamp {} for {} (now {}): {}",
                claimed_ms, address, now_ms, reason
            );
            return Verdict::Deny(reason);
        }

        match self.store.try_reserve(address, now_ms, self.policy.cooldown) {
            Reservation::CoolingDown { .. } => return Verdict::Deny(DenyReason::CooldownActive),
            Reservation::Reserved { previous } => {
                debug!("Reserved {} (previous request: {:?})", address, previous);
            }
        }

        match self.check_chain_state(address).await {
            Ok(()) => Verdict::Allow(address),
            Err(reason) => Verdict::Deny(reason),
        }
    }

    async fn check_chain_state(&self, address: Address) -> Result<(), DenyReason> {
        let timeout = self.policy.query_timeout;

        let balance = bounded(timeout, "balance query", self.chain.native_balance(address))
            .await
            .map_err(|e| {
                warn!("Balance query for {} failed: {}", address, e);
                DenyReason::DispatchFailed
            })?;

        if is_sufficiently_funded(balance, self.policy.min_sufficient_balance) {
            return Err(DenyReason::AlreadyFunded { balance });
        }

        let token_balance = bounded(
            timeout,
            "token balance query",
            self.chain.token_balance(self.policy.gating_token, address),
        )
        .await
        .map_err(|e| {
            warn!("Gating token query for {} failed: {}", address, e);
            DenyReason::DispatchFailed
        })?;

        if token_balance.is_zero() {
            return Err(DenyReason::NoEligibilityToken);
        }

        Ok(())
    }
}
