//! Read-only blockchain RPC access.
//!
//! # Responsibilities
//! - Fetch transaction receipts, waiting for a confirmation depth
//! - Fetch raw transactions
//! - Fail over across the endpoints configured for a chain
//!
//! # Design Decisions
//! - No retries here: one call either succeeds or surfaces its error;
//!   retry policy lives in `resilience::retries`
//! - Endpoints are resolved per call through the [`NetworkRegistry`], so a
//!   config reload takes effect without restarting the reader
//! - One provider is built per endpoint URL and reused

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::TxHash;
use alloy::providers::{Provider, ProviderBuilder};
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::blockchain::networks::{Network, NetworkRegistry};
use crate::blockchain::types::{
    BlockchainError, BlockchainResult, ChainId, ChainTransaction, Receipt,
};
use crate::observability::metrics;

/// Narrow read-only view of a blockchain node.
#[async_trait]
pub trait RpcReader: Send + Sync {
    /// Wait until the receipt for `tx_hash` exists and is `confirmations`
    /// blocks deep (the mining block counts as one), or `wait` elapses.
    async fn get_receipt(
        &self,
        tx_hash: TxHash,
        chain_id: ChainId,
        confirmations: u32,
        wait: Duration,
    ) -> BlockchainResult<Receipt>;

    /// Fetch a transaction by hash, mined or pending.
    async fn get_transaction(
        &self,
        tx_hash: TxHash,
        chain_id: ChainId,
    ) -> BlockchainResult<ChainTransaction>;
}

type SharedProvider = Arc<dyn Provider + Send + Sync>;

/// [`RpcReader`] backed by alloy HTTP providers.
pub struct AlloyRpcReader {
    networks: Arc<NetworkRegistry>,
    providers: DashMap<url::Url, SharedProvider>,
    poll_interval: Duration,
    call_timeout: Duration,
}

impl AlloyRpcReader {
    /// Create a reader.
    ///
    /// # Arguments
    /// * `networks` - Chain id → endpoint resolution
    /// * `call_timeout` - Deadline for a single JSON-RPC call
    pub fn new(networks: Arc<NetworkRegistry>, call_timeout: Duration) -> Self {
        Self {
            networks,
            providers: DashMap::new(),
            poll_interval: Duration::from_secs(2),
            call_timeout,
        }
    }

    /// Override how often a missing receipt is polled for.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn providers_for(&self, network: &Network) -> Vec<SharedProvider> {
        std::iter::once(&network.rpc_url)
            .chain(network.failover_urls.iter())
            .map(|url| {
                self.providers
                    .entry(url.clone())
                    .or_insert_with(|| {
                        Arc::new(ProviderBuilder::new().connect_http(url.clone())) as SharedProvider
                    })
                    .clone()
            })
            .collect()
    }

    /// Run one JSON-RPC call against each endpoint in order until one answers.
    async fn call<T, E, F, Fut>(
        &self,
        providers: &[SharedProvider],
        method: &'static str,
        f: F,
    ) -> BlockchainResult<T>
    where
        F: Fn(SharedProvider) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut last_error = String::from("no endpoints configured");
        for (i, provider) in providers.iter().enumerate() {
            match timeout(self.call_timeout, f(provider.clone())).await {
                Ok(Ok(result)) => {
                    metrics::record_rpc_call(method, "ok");
                    return Ok(result);
                }
                Ok(Err(e)) => {
                    metrics::record_rpc_call(method, "error");
                    tracing::warn!(provider_idx = i, method, error = %e, "RPC error, trying next provider");
                    last_error = e.to_string();
                }
                Err(_) => {
                    metrics::record_rpc_call(method, "timeout");
                    tracing::warn!(provider_idx = i, method, "RPC timeout, trying next provider");
                    last_error = format!("timed out after {:?}", self.call_timeout);
                }
            }
        }
        Err(BlockchainError::Rpc(format!(
            "All RPC providers failed {}: {}",
            method, last_error
        )))
    }

    async fn poll_receipt(
        &self,
        providers: &[SharedProvider],
        tx_hash: TxHash,
        confirmations: u32,
    ) -> BlockchainResult<Receipt> {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let receipt = match self
                .call(providers, "eth_getTransactionReceipt", |p| async move {
                    p.get_transaction_receipt(tx_hash).await
                })
                .await?
            {
                Some(r) => Receipt::from(&r),
                None => {
                    tracing::debug!(tx_hash = %tx_hash, "Receipt not available yet");
                    continue;
                }
            };

            // A reverted receipt is final regardless of depth.
            if confirmations <= 1 || !receipt.success {
                return Ok(receipt);
            }
            let Some(mined_at) = receipt.block_number else {
                continue;
            };

            let head = self
                .call(providers, "eth_blockNumber", |p| async move {
                    p.get_block_number().await
                })
                .await?;
            let depth = head.saturating_sub(mined_at) + 1;
            if depth >= u64::from(confirmations) {
                return Ok(receipt);
            }

            tracing::debug!(
                tx_hash = %tx_hash,
                depth,
                required = confirmations,
                "Waiting for confirmations"
            );
        }
    }
}

#[async_trait]
impl RpcReader for AlloyRpcReader {
    async fn get_receipt(
        &self,
        tx_hash: TxHash,
        chain_id: ChainId,
        confirmations: u32,
        wait: Duration,
    ) -> BlockchainResult<Receipt> {
        let network = self.networks.get(chain_id)?;
        let providers = self.providers_for(&network);

        match timeout(wait, self.poll_receipt(&providers, tx_hash, confirmations)).await {
            Ok(result) => result,
            Err(_) => Err(BlockchainError::Timeout(wait.as_secs())),
        }
    }

    async fn get_transaction(
        &self,
        tx_hash: TxHash,
        chain_id: ChainId,
    ) -> BlockchainResult<ChainTransaction> {
        let network = self.networks.get(chain_id)?;
        let providers = self.providers_for(&network);

        let tx = self
            .call(&providers, "eth_getTransactionByHash", |p| async move {
                p.get_transaction_by_hash(tx_hash).await
            })
            .await?
            .ok_or(BlockchainError::NotFound(tx_hash))?;

        Ok(ChainTransaction {
            tx_hash,
            block_number: tx.block_number,
        })
    }
}

impl std::fmt::Debug for AlloyRpcReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlloyRpcReader")
            .field("providers", &self.providers.len())
            .field("poll_interval", &self.poll_interval)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}
