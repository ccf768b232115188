use solana_client::client_error::ClientError;
use solana_sdk::{instruction::InstructionError, transaction::TransactionError};
use thiserror::Error;

/// Errors surfaced by a [`super::SolanaConnection`]
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// Transport-level errors (network, connection)
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Timeout: {message}")]
    Timeout { message: String },

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Blockhash not found")]
    BlockhashNotFound,

    #[error("Invalid account data for {account}: {message}")]
    InvalidAccountData { account: String, message: String },

    /// The transaction reached the cluster and failed
    #[error("Transaction failed: {message}")]
    Transaction {
        message: String,
        /// Custom program error code, when an instruction raised one
        program_error: Option<u32>,
    },

    /// RPC response errors (from the RPC server)
    #[error("RPC response error: {message} (code: {code:?})")]
    RpcResponse { message: String, code: Option<i64> },
}

impl RpcError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Transport { .. } => true,
            RpcError::Timeout { .. } => true,
            RpcError::RateLimitExceeded => true,
            RpcError::BlockhashNotFound => true,

            RpcError::InvalidAccountData { .. } => false,
            RpcError::Transaction { .. } => false,

            // Retry on server errors (5xx)
            RpcError::RpcResponse { code, .. } => matches!(code, Some(c) if (500..600).contains(c)),
        }
    }

    /// Custom program error raised on-chain, if any
    pub fn program_error(&self) -> Option<u32> {
        match self {
            RpcError::Transaction { program_error, .. } => *program_error,
            _ => None,
        }
    }

    /// Create from ClientError
    pub fn from_client_error(err: ClientError) -> Self {
        if let Some(tx_err) = err.get_transaction_error() {
            return RpcError::Transaction {
                message: tx_err.to_string(),
                program_error: custom_program_error(&tx_err),
            };
        }

        let err_str = err.to_string().to_lowercase();

        // Classify based on error message
        if err_str.contains("blockhash not found") {
            RpcError::BlockhashNotFound
        } else if err_str.contains("rate limit")
            || err_str.contains("too many requests")
            || err_str.contains("429")
        {
            RpcError::RateLimitExceeded
        } else if err_str.contains("timeout") || err_str.contains("timed out") {
            RpcError::Timeout {
                message: err.to_string(),
            }
        } else if err_str.contains("connection") || err_str.contains("dns") {
            RpcError::Transport {
                message: err.to_string(),
            }
        } else {
            // Extract error code if available
            let code = err_str
                .split("code:")
                .nth(1)
                .and_then(|s| s.split_whitespace().next())
                .and_then(|s| s.trim_matches(|c: char| !c.is_ascii_digit() && c != '-').parse::<i64>().ok());

            RpcError::RpcResponse {
                message: err.to_string(),
                code,
            }
        }
    }
}

impl From<ClientError> for RpcError {
    fn from(err: ClientError) -> Self {
        Self::from_client_error(err)
    }
}

/// `Custom(code)` raised by any instruction of a failed transaction
pub fn custom_program_error(err: &TransactionError) -> Option<u32> {
    match err {
        TransactionError::InstructionError(_, InstructionError::Custom(code)) => Some(*code),
        _ => None,
    }
}
