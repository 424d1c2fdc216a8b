//! Price Feed Ledger - On-chain Price Commits via alloy-rs 0.9
//!
//! Implements the `LedgerClient` port against a price feed contract:
//!
//! ```text
//! updatePrice(bytes32 pairId, uint256 price, uint64 timestamp,
//!             uint8 confidence, uint8 sourceCount)
//! ```
//!
//! `pairId` is `keccak256(symbol)`; `price` is the aggregate scaled to
//! the pair's fixed-point precision. A submission counts only once its
//! receipt confirms success; a revert is an error. Resubmitting an
//! identical commit returns the earlier handle instead of sending a
//! second transaction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::network::ReceiptResponse;
use alloy::primitives::utils::format_ether;
use alloy::primitives::{Address, B256, Bytes, U256, keccak256};
use alloy::providers::Provider;
use alloy::rpc::types::TransactionRequest;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::LedgerConfig;
use crate::domain::observation::CommitHandle;
use crate::ports::ledger::{LedgerClient, PriceCommit};

use super::provider::LedgerProvider;

/// Solidity signature of the commit entry point.
pub const UPDATE_PRICE_SIGNATURE: &str = "updatePrice(bytes32,uint256,uint64,uint8,uint8)";

/// Contract-level pair identifier.
pub fn pair_id(symbol: &str) -> B256 {
    keccak256(symbol.as_bytes())
}

/// Scale `price` to an integer with `decimal_places` fractional digits,
/// rounding half away from zero.
pub fn scale_price(price: f64, decimal_places: u32) -> Result<u128> {
    anyhow::ensure!(price.is_finite() && price >= 0.0, "cannot scale price {price}");
    anyhow::ensure!(decimal_places <= 18, "decimal_places {decimal_places} exceeds 18");

    let value = Decimal::from_f64(price).with_context(|| format!("price {price} out of decimal range"))?;
    let factor = Decimal::from(10u64.pow(decimal_places));
    value
        .round_dp_with_strategy(decimal_places, RoundingStrategy::MidpointAwayFromZero)
        .checked_mul(factor)
        .and_then(|scaled| scaled.to_u128())
        .with_context(|| format!("price {price} overflows at {decimal_places} decimals"))
}

/// ABI-encode an `updatePrice` call for `commit`.
pub fn encode_update_price(commit: &PriceCommit) -> Result<Bytes> {
    let price = scale_price(commit.price, commit.decimal_places)?;
    let timestamp = u64::try_from(commit.timestamp.timestamp()).context("timestamp before epoch")?;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let confidence = commit.confidence.round().clamp(0.0, 100.0) as u8;
    let source_count = u8::try_from(commit.contributing_sources.len()).unwrap_or(u8::MAX);

    let mut calldata = Vec::with_capacity(4 + 5 * 32);
    calldata.extend_from_slice(&keccak256(UPDATE_PRICE_SIGNATURE.as_bytes())[..4]);
    calldata.extend_from_slice(pair_id(&commit.pair).as_slice());
    calldata.extend_from_slice(&U256::from(price).to_be_bytes::<32>());
    calldata.extend_from_slice(&U256::from(timestamp).to_be_bytes::<32>());
    calldata.extend_from_slice(&U256::from(confidence).to_be_bytes::<32>());
    calldata.extend_from_slice(&U256::from(source_count).to_be_bytes::<32>());
    Ok(Bytes::from(calldata))
}

/// Calldata plus the handle it produced, per pair.
type SubmittedCommits = HashMap<B256, (Bytes, CommitHandle)>;

/// On-chain ledger client.
pub struct ChainLedger {
    /// Shared signing provider.
    provider: Arc<LedgerProvider>,
    /// Price feed contract.
    contract: Address,
    /// Confirmations required before a commit counts.
    confirmations: u64,
    /// Receipt wait limit.
    receipt_timeout: Duration,
    /// Last confirmed submission per pair.
    last_submitted: Mutex<SubmittedCommits>,
}

impl ChainLedger {
    /// Create a ledger client for the configured contract.
    pub fn new(provider: Arc<LedgerProvider>, config: &LedgerConfig) -> Result<Self> {
        let contract = config
            .contract_address
            .parse()
            .context("Invalid price feed contract address")?;
        Ok(Self {
            provider,
            contract,
            confirmations: config.confirmations.max(1),
            receipt_timeout: Duration::from_secs(config.receipt_timeout_secs),
            last_submitted: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl LedgerClient for ChainLedger {
    #[instrument(skip(self, commit), fields(pair = %commit.pair))]
    async fn submit(&self, commit: &PriceCommit) -> Result<CommitHandle> {
        let calldata = encode_update_price(commit)?;
        let id = pair_id(&commit.pair);

        if let Some((previous, handle)) = self.last_submitted.lock().await.get(&id) {
            if *previous == calldata {
                debug!(handle = %handle, "Identical commit already confirmed");
                return Ok(handle.clone());
            }
        }

        let tx = TransactionRequest::default()
            .to(self.contract)
            .input(calldata.clone().into());

        let pending = self
            .provider
            .inner()
            .send_transaction(tx)
            .await
            .context("Failed to send updatePrice transaction")?;
        let tx_hash = *pending.tx_hash();
        debug!(tx_hash = %tx_hash, "updatePrice submitted");

        let receipt = pending
            .with_required_confirmations(self.confirmations)
            .with_timeout(Some(self.receipt_timeout))
            .get_receipt()
            .await
            .with_context(|| format!("No receipt for {tx_hash}"))?;

        if !receipt.status() {
            warn!(tx_hash = %tx_hash, "updatePrice reverted");
            anyhow::bail!("updatePrice transaction {tx_hash} reverted");
        }

        let handle = format!("{tx_hash}");
        info!(
            tx_hash = %handle,
            block = ?receipt.block_number(),
            "updatePrice confirmed"
        );
        self.last_submitted
            .lock()
            .await
            .insert(id, (calldata, handle.clone()));
        Ok(handle)
    }

    async fn balance(&self) -> Result<f64> {
        let wei = self
            .provider
            .inner()
            .get_balance(self.provider.signer_address())
            .await
            .context("Failed to query signer balance")?;
        format_ether(wei)
            .parse::<f64>()
            .context("Unparseable balance")
    }

    async fn health_check(&self) -> bool {
        self.provider.is_healthy().await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{TimeZone, Utc};

    use super::*;

    fn commit(price: f64) -> PriceCommit {
        PriceCommit {
            pair: "BTC/USD".to_string(),
            price,
            timestamp: Utc.with_ymd_and_hms(2024, 6, 11, 0, 0, 0).unwrap(),
            contributing_sources: ["binance", "coinbase"].iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
            confidence: 97.6,
            decimal_places: 8,
        }
    }

    #[test]
    fn test_scale_price() {
        assert_eq!(scale_price(65000.12345678, 8).unwrap(), 6_500_012_345_678);
        assert_eq!(scale_price(2.5, 0).unwrap(), 3);
        assert_eq!(scale_price(0.0, 18).unwrap(), 0);
        assert_eq!(scale_price(1.0, 18).unwrap(), 1_000_000_000_000_000_000);
    }

    #[test]
    fn test_scale_price_rejects_invalid() {
        assert!(scale_price(-1.0, 8).is_err());
        assert!(scale_price(f64::NAN, 8).is_err());
        assert!(scale_price(1.0, 19).is_err());
    }

    #[test]
    fn test_encode_update_price_layout() {
        let data = encode_update_price(&commit(65000.5)).unwrap();
        assert_eq!(data.len(), 4 + 5 * 32);
        assert_eq!(&data[..4], &keccak256(UPDATE_PRICE_SIGNATURE.as_bytes())[..4]);
        assert_eq!(&data[4..36], pair_id("BTC/USD").as_slice());

        let word = |i: usize| U256::from_be_slice(&data[4 + i * 32..4 + (i + 1) * 32]);
        assert_eq!(word(1), U256::from(6_500_050_000_000u128));
        assert_eq!(word(2), U256::from(1_718_064_000u64));
        assert_eq!(word(3), U256::from(98u8));
        assert_eq!(word(4), U256::from(2u8));
    }

    #[test]
    fn test_pair_id_is_stable_per_symbol() {
        assert_eq!(pair_id("ETH/USD"), pair_id("ETH/USD"));
        assert_ne!(pair_id("ETH/USD"), pair_id("BTC/USD"));
    }
}
