//! Error types for Solana bundle assembly
//!
//! Every variant maps to a metrics category. A failed assembly leaves the
//! trade retryable; [`TransactionBuilderError::is_retryable`] only says
//! whether retrying the same trade can help.

use crate::rpc::RpcError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransactionBuilderError {
    /// The routing service's encoded message is not a valid legacy message
    #[error("Message decode error: {0}")]
    Decode(String),

    /// Failed to fetch a recent blockhash
    #[error("Blockhash error: {0}")]
    Blockhash(String),

    /// Open-orders lookup or creation failed for a market
    #[error("Open orders error (market={market}): {reason}")]
    OpenOrders { market: String, reason: String },

    /// Failed to build an instruction for a specific program
    #[error("Instruction build error (program={program}): {reason}")]
    InstructionBuild { program: String, reason: String },

    /// Setup instructions out of order (debug builds only)
    #[error("Invalid instruction order: {0}")]
    InvalidInstructionOrder(String),

    /// v0 message compilation failed
    #[error("Message compile error: {0}")]
    Compile(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// RPC client error
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
}

impl TransactionBuilderError {
    /// Check if this error is potentially retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            // Transient failures that may succeed on retry
            Self::Blockhash(_) => true,
            Self::OpenOrders { .. } => true,
            Self::Rpc(e) => e.is_retryable(),

            // Non-retryable failures
            Self::Decode(_) => false,
            Self::InstructionBuild { .. } => false,
            Self::InvalidInstructionOrder(_) => false,
            Self::Compile(_) => false,
            Self::Signing(_) => false,
            Self::Configuration(_) => false,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Blockhash(_) => "blockhash",
            Self::OpenOrders { .. } => "open_orders",
            Self::InstructionBuild { .. } => "instruction",
            Self::InvalidInstructionOrder(_) => "validation",
            Self::Compile(_) => "compile",
            Self::Signing(_) => "signing",
            Self::Configuration(_) => "config",
            Self::Rpc(_) => "rpc",
        }
    }
}

// Convenience constructors for common error scenarios
impl TransactionBuilderError {
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode(reason.into())
    }

    pub fn open_orders(market: impl ToString, reason: impl Into<String>) -> Self {
        Self::OpenOrders {
            market: market.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an instruction build error for a specific program
    pub fn instruction_failed(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InstructionBuild {
            program: program.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid instruction order error
    pub fn invalid_order(reason: impl Into<String>) -> Self {
        Self::InvalidInstructionOrder(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransactionBuilderError::decode("bad base64");
        assert_eq!(err.to_string(), "Message decode error: bad base64");

        let err = TransactionBuilderError::instruction_failed("spl_token", "sync_native");
        assert_eq!(
            err.to_string(),
            "Instruction build error (program=spl_token): sync_native"
        );
    }

    #[test]
    fn test_error_retryability() {
        assert!(TransactionBuilderError::Blockhash("test".to_string()).is_retryable());
        assert!(TransactionBuilderError::open_orders("m", "rpc down").is_retryable());
        assert!(TransactionBuilderError::Rpc(RpcError::BlockhashNotFound).is_retryable());

        assert!(!TransactionBuilderError::decode("test").is_retryable());
        assert!(!TransactionBuilderError::Signing("test".to_string()).is_retryable());
        assert!(!TransactionBuilderError::Configuration("test".to_string()).is_retryable());
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(TransactionBuilderError::decode("x").category(), "decode");
        assert_eq!(
            TransactionBuilderError::Compile("x".to_string()).category(),
            "compile"
        );
        assert_eq!(
            TransactionBuilderError::invalid_order("x").category(),
            "validation"
        );
    }
}
