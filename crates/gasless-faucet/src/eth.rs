//! Ethereum JSON-RPC implementation of the chain ports.

use crate::config::EthereumConfig;
use crate::error::{FaucetError, FaucetResult};
use crate::ports::{ChainQuery, Disburser};
use alloy::{
    network::EthereumWallet,
    primitives::{utils::format_ether, Address, TxHash, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
    sol,
};
use async_trait::async_trait;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info, warn};
use url::Url;

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract GatingToken {
        function balanceOf(address who) external view returns (uint256);
    }
}

/// Ethereum client serving balance reads and faucet transfers
///
/// Reads go through a plain provider. Transfers go through a signing provider
/// that hands out nonces from a local cache, so concurrent disbursements from
/// the faucet wallet never share a nonce.
pub struct EthereumClient {
    faucet_address: Address,
    rpc_url: Url,
    wallet: EthereumWallet,
    provider: DynProvider,
    transfers: RwLock<DynProvider>,
}

impl std::fmt::Debug for EthereumClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EthereumClient")
            .field("faucet_address", &self.faucet_address)
            .field("rpc_url", &self.rpc_url.as_str())
            .finish()
    }
}

/// Signing provider for transfers. Nonces are fetched once from the node and
/// then incremented locally.
fn transfer_provider(wallet: EthereumWallet, url: Url) -> DynProvider {
    ProviderBuilder::new()
        .disable_recommended_fillers()
        .with_gas_estimation()
        .with_cached_nonce_management()
        .fetch_chain_id()
        .wallet(wallet)
        .connect_http(url)
        .erased()
}

impl EthereumClient {
    /// Create a new Ethereum client. No network calls are made.
    pub fn new(config: &EthereumConfig) -> FaucetResult<Self> {
        let private_key = config.private_key.strip_prefix("0x").unwrap_or(&config.private_key);
        let signer = PrivateKeySigner::from_str(private_key)
            .map_err(|e| FaucetError::Internal(anyhow::anyhow!("Invalid private key: {}", e)))?;

        let faucet_address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let rpc_url = Url::parse(&config.rpc_url)
            .map_err(|e| FaucetError::Internal(anyhow::anyhow!("Invalid RPC URL: {}", e)))?;

        let provider = ProviderBuilder::new().connect_http(rpc_url.clone()).erased();
        let transfers = RwLock::new(transfer_provider(wallet.clone(), rpc_url.clone()));

        Ok(Self {
            faucet_address,
            rpc_url,
            wallet,
            provider,
            transfers,
        })
    }

    /// Get faucet address
    pub fn get_faucet_address(&self) -> Address {
        self.faucet_address
    }

    fn transfers(&self) -> DynProvider {
        self.transfers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drop the nonce cache. The next transfer reads the pending nonce from
    /// the node again, closing any gap left by a rejected submission.
    fn resync_nonces(&self) {
        let fresh = transfer_provider(self.wallet.clone(), self.rpc_url.clone());
        *self.transfers.write().unwrap_or_else(PoisonError::into_inner) = fresh;
    }
}

#[async_trait]
impl ChainQuery for EthereumClient {
    async fn native_balance(&self, address: Address) -> FaucetResult<U256> {
        let balance = self.provider.get_balance(address).await.map_err(|e| {
            FaucetError::Chain(format!("Failed to get balance for {}: {}", address, e))
        })?;

        debug!("Balance of {} = {} ETH", address, format_ether(balance));
        Ok(balance)
    }

    async fn token_balance(&self, token: Address, holder: Address) -> FaucetResult<U256> {
        let contract = GatingToken::new(token, self.provider.clone());
        let balance = contract.balanceOf(holder).call().await.map_err(|e| {
            FaucetError::Chain(format!(
                "Failed to read token {} balance for {}: {}",
                token, holder, e
            ))
        })?;

        debug!("Token {} balance of {} = {}", token, holder, balance);
        Ok(balance)
    }
}

#[async_trait]
impl Disburser for EthereumClient {
    fn sender(&self) -> Address {
        self.faucet_address
    }

    async fn disburse(&self, to: Address, amount: U256) -> FaucetResult<TxHash> {
        let tx_request = TransactionRequest::default()
            .from(self.faucet_address)
            .to(to)
            .value(amount);

        let pending_tx = match self.transfers().send_transaction(tx_request).await {
            Ok(pending_tx) => pending_tx,
            Err(e) => {
                warn!("Transfer to {} rejected, resyncing nonces: {}", to, e);
                self.resync_nonces();
                return Err(FaucetError::Transaction(format!(
                    "Failed to send transaction: {}",
                    e
                )));
            }
        };

        let tx_hash = *pending_tx.tx_hash();
        info!("Transaction sent: {} ({} ETH to {})", tx_hash, format_ether(amount), to);

        Ok(tx_hash)
    }
}
