//! Ledger RPC Provider - alloy-rs 0.9 Signing Connection
//!
//! Connects a wallet-filled alloy provider to the configured EVM
//! chain. At startup it enforces the expected chain id and checks that
//! the price feed contract has deployed code, so a typo in
//! `config.toml` fails fast instead of at the first commit.
//!
//! The filler stack makes the concrete provider type unwieldy, so it
//! is stored type-erased as `dyn Provider`.

use std::sync::Arc;

use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::config::LedgerConfig;

/// Shared signing provider for ledger writes.
pub struct LedgerProvider {
    /// Wallet-filled provider (type-erased).
    provider: Arc<dyn Provider + Send + Sync>,
    /// Address of the signing account.
    signer_address: Address,
    /// Chain id reported by the node.
    chain_id: u64,
}

impl LedgerProvider {
    /// Connect, sign with `private_key`, and validate chain and contract.
    ///
    /// The key is never logged; only the derived address is.
    #[instrument(skip_all)]
    pub async fn connect(config: &LedgerConfig, private_key: &str) -> Result<Self> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .context("Invalid ledger private key")?;
        let signer_address = signer.address();

        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(signer))
            .on_builtin(&config.rpc_url)
            .await
            .context("Failed to connect to ledger RPC")?;
        let provider: Arc<dyn Provider + Send + Sync> = Arc::new(provider);

        let chain_id = provider
            .get_chain_id()
            .await
            .context("Failed to query chain ID")?;

        if let Some(expected) = config.expected_chain_id {
            if chain_id != expected {
                anyhow::bail!("Expected chain_id={expected}, node reports {chain_id}");
            }
        }

        let contract: Address = config
            .contract_address
            .parse()
            .context("Invalid price feed contract address")?;
        let code = provider
            .get_code_at(contract)
            .await
            .context("Failed to query price feed contract code")?;
        if code.is_empty() {
            anyhow::bail!("Price feed contract at {contract} has no deployed code, check config.toml");
        }

        info!(
            chain_id,
            signer = %signer_address,
            contract = %contract,
            "Connected to ledger RPC"
        );

        Ok(Self {
            provider,
            signer_address,
            chain_id,
        })
    }

    /// Shared reference to the alloy provider (type-erased).
    pub fn inner(&self) -> Arc<dyn Provider + Send + Sync> {
        Arc::clone(&self.provider)
    }

    /// Address that signs commits.
    pub fn signer_address(&self) -> Address {
        self.signer_address
    }

    /// Chain id validated at connect.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Lightweight liveness probe.
    pub async fn is_healthy(&self) -> bool {
        self.provider.get_block_number().await.is_ok()
    }
}
