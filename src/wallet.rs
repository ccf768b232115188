//! Wallet seam for signing Solana bundles

use anyhow::{Context, Result};
use async_trait::async_trait;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::VersionedTransaction,
};
use std::sync::Arc;
use thiserror::Error;

use crate::compat;

#[derive(Debug, Clone, Error)]
pub enum WalletError {
    /// The user declined to sign
    #[error("Transaction rejected")]
    Rejected,

    #[error("Signing failed: {0}")]
    Signing(String),
}

/// Signs every transaction of a bundle in one call.
///
/// Signatures already present in other slots (e.g. program-state) must be
/// kept as they are.
#[async_trait]
pub trait SolanaWallet: Send + Sync {
    fn pubkey(&self) -> Pubkey;

    async fn sign_transactions(
        &self,
        txs: Vec<VersionedTransaction>,
    ) -> Result<Vec<VersionedTransaction>, WalletError>;
}

/// Local keypair wallet
pub struct KeypairWallet {
    keypair: Arc<Keypair>,
}

impl KeypairWallet {
    /// Load from a keypair file (64 raw bytes or a JSON byte array)
    pub fn from_file(path: &str) -> Result<Self> {
        let keypair_bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read keypair file: {}", path))?;
        Self::from_bytes(&keypair_bytes)
    }

    pub fn from_bytes(keypair_bytes: &[u8]) -> Result<Self> {
        let bytes: Vec<u8> = if keypair_bytes.len() == 64 {
            keypair_bytes.to_vec()
        } else {
            serde_json::from_slice(keypair_bytes).context("Failed to parse keypair JSON")?
        };

        if bytes.len() != 64 {
            anyhow::bail!("Invalid keypair length: expected 64 bytes, got {}", bytes.len());
        }
        if bytes.iter().all(|&b| b == 0) {
            anyhow::bail!("Invalid keypair: all-zero key rejected");
        }

        let keypair = Keypair::try_from(bytes.as_slice()).context("Invalid keypair bytes")?;
        Ok(Self::from_keypair(keypair))
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }
}

#[async_trait]
impl SolanaWallet for KeypairWallet {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_transactions(
        &self,
        mut txs: Vec<VersionedTransaction>,
    ) -> Result<Vec<VersionedTransaction>, WalletError> {
        for tx in &mut txs {
            compat::partially_sign(tx, self.keypair.as_ref())
                .map_err(|e| WalletError::Signing(e.to_string()))?;
        }
        Ok(txs)
    }
}
