//! Signing and submission of assembled trades
//!
//! Solana bundles are signed by the wallet in one call, then sent strictly in
//! order (setup, swap, cleanup), each confirmed before the next. EVM trades
//! are a single transaction through [`EvmTxBuilder`].

use crate::config::{SolanaConfig, DEFAULT_SLIPPAGE_ERROR_CODE};
use crate::evm::{EvmSigner, EvmTxBuilder, EvmTxError, EvmTxResponse};
use crate::metrics::metrics;
use crate::rpc::{RpcError, SolanaConnection};
use crate::trade::Trade;
use crate::tx_builder::SolanaTxBundle;
use crate::wallet::{SolanaWallet, WalletError};
use solana_sdk::signature::Signature;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwapStage {
    SetUp,
    Swap,
    CleanUp,
}

impl SwapStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SetUp => "set_up",
            Self::Swap => "swap",
            Self::CleanUp => "clean_up",
        }
    }
}

impl fmt::Display for SwapStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum SendError {
    #[error("Transaction rejected")]
    Rejected,

    #[error("Set up error: {0}")]
    SetUp(String),

    #[error("Swap error: {0}")]
    Swap(String),

    /// On-chain minimum-output check failed
    #[error("Insufficient output amount. Refresh the price or increase max slippage and try again")]
    SlippageExceeded,

    #[error("Clean up error: {0}")]
    CleanUp(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error(transparent)]
    Evm(EvmTxError),
}

impl SendError {
    /// Stage the failure happened in, if any transaction was sent
    pub fn stage(&self) -> Option<SwapStage> {
        match self {
            Self::SetUp(_) => Some(SwapStage::SetUp),
            Self::Swap(_) | Self::SlippageExceeded | Self::Evm(_) => Some(SwapStage::Swap),
            Self::CleanUp(_) => Some(SwapStage::CleanUp),
            Self::Rejected | Self::Wallet(_) => None,
        }
    }
}

impl From<WalletError> for SendError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::Rejected => Self::Rejected,
            WalletError::Signing(message) => Self::Wallet(message),
        }
    }
}

impl From<EvmTxError> for SendError {
    fn from(err: EvmTxError) -> Self {
        match err {
            EvmTxError::Rejected => Self::Rejected,
            other => Self::Evm(other),
        }
    }
}

/// Confirmed signatures of a sent bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSignatures {
    pub set_up: Option<Signature>,
    pub swap: Signature,
    pub clean_up: Option<Signature>,
}

pub struct TxSender {
    slippage_error_code: u32,
}

impl Default for TxSender {
    fn default() -> Self {
        Self::new(DEFAULT_SLIPPAGE_ERROR_CODE)
    }
}

impl TxSender {
    /// `slippage_error_code` is the swap program's custom error for a
    /// violated minimum output
    pub fn new(slippage_error_code: u32) -> Self {
        Self {
            slippage_error_code,
        }
    }

    pub fn from_config(config: &SolanaConfig) -> Self {
        Self::new(config.slippage_error_code)
    }

    pub async fn send_solana<F>(
        &self,
        connection: &dyn SolanaConnection,
        wallet: &dyn SolanaWallet,
        bundle: &SolanaTxBundle,
        mut on_stage: F,
    ) -> Result<BundleSignatures, SendError>
    where
        F: FnMut(SwapStage, &Signature) + Send,
    {
        let mut stages = Vec::with_capacity(3);
        if bundle.setup_tx.is_some() {
            stages.push(SwapStage::SetUp);
        }
        stages.push(SwapStage::Swap);
        if bundle.clean_up_tx.is_some() {
            stages.push(SwapStage::CleanUp);
        }

        let unsigned = bundle.transactions().into_iter().cloned().collect();
        let signed = match wallet.sign_transactions(unsigned).await {
            Ok(signed) => signed,
            Err(WalletError::Rejected) => {
                debug!(wallet = %wallet.pubkey(), "Bundle rejected by user");
                return Err(SendError::Rejected);
            }
            Err(e) => return Err(e.into()),
        };
        if signed.len() != stages.len() {
            return Err(SendError::Wallet(format!(
                "wallet returned {} of {} transactions",
                signed.len(),
                stages.len()
            )));
        }

        let mut set_up = None;
        let mut swap = None;
        let mut clean_up = None;

        for (stage, tx) in stages.into_iter().zip(signed) {
            let signature = match connection.send_and_confirm(&tx).await {
                Ok(signature) => signature,
                Err(e) => {
                    metrics().send_failed(stage.as_str());
                    error!(stage = %stage, error = %e, "Solana transaction failed");
                    return Err(self.stage_error(stage, e));
                }
            };
            info!(stage = %stage, signature = %signature, "Solana transaction confirmed");
            on_stage(stage, &signature);

            match stage {
                SwapStage::SetUp => set_up = Some(signature),
                SwapStage::Swap => swap = Some(signature),
                SwapStage::CleanUp => clean_up = Some(signature),
            }
        }

        let swap = swap.ok_or_else(|| SendError::Swap("swap transaction was not sent".into()))?;
        Ok(BundleSignatures {
            set_up,
            swap,
            clean_up,
        })
    }

    fn stage_error(&self, stage: SwapStage, err: RpcError) -> SendError {
        match stage {
            SwapStage::SetUp => SendError::SetUp(err.to_string()),
            SwapStage::Swap if err.program_error() == Some(self.slippage_error_code) => {
                SendError::SlippageExceeded
            }
            SwapStage::Swap => SendError::Swap(err.to_string()),
            SwapStage::CleanUp => SendError::CleanUp(err.to_string()),
        }
    }

    /// Send an EVM trade through the router. Returns the transaction hash.
    pub async fn send_evm<F>(
        &self,
        builder: &EvmTxBuilder,
        signer: &dyn EvmSigner,
        account: &str,
        trade: &Trade,
        on_response: Option<&(dyn Fn(&EvmTxResponse) + Sync)>,
        mut on_stage: F,
    ) -> Result<String, SendError>
    where
        F: FnMut(SwapStage, &str) + Send,
    {
        let input = trade.input_amount();
        let value = if input.currency.is_native() { input.raw } else { 0 };

        let hash = builder
            .send(
                account,
                signer,
                trade.router_address(),
                trade.encoded_swap_data(),
                value,
                on_response,
            )
            .await?;

        on_stage(SwapStage::Swap, &hash);
        Ok(hash)
    }
}
