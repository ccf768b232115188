//! Solana RPC seam
//!
//! Assembly and sending only talk to the chain through [`SolanaConnection`].
//! The production implementation wraps the nonblocking `RpcClient`; tests use
//! `test_utils::MockConnection`.

pub mod rpc_errors;

pub use rpc_errors::RpcError;

use crate::config::SolanaConfig;
use async_trait::async_trait;
use solana_account_decoder::UiAccountEncoding;
use solana_client::{
    nonblocking::rpc_client::RpcClient,
    rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig},
    rpc_filter::{Memcmp, RpcFilterType},
};
use solana_sdk::{
    address_lookup_table::state::AddressLookupTable, commitment_config::CommitmentConfig,
    hash::Hash, message::AddressLookupTableAccount, pubkey::Pubkey, signature::Signature,
    transaction::VersionedTransaction,
};

/// Size of an order-book open-orders account
pub const OPEN_ORDERS_SPAN: usize = 3228;
/// Offset of the market key inside an open-orders account
pub const OPEN_ORDERS_MARKET_OFFSET: usize = 13;
/// Offset of the owner key inside an open-orders account
pub const OPEN_ORDERS_OWNER_OFFSET: usize = 45;

/// Nonblocking client for the configured `solana.rpc_url`, at `confirmed`
pub fn rpc_client(config: &SolanaConfig) -> RpcClient {
    RpcClient::new_with_commitment(config.rpc_url.clone(), CommitmentConfig::confirmed())
}

#[async_trait]
pub trait SolanaConnection: Send + Sync {
    async fn latest_blockhash(&self) -> Result<Hash, RpcError>;

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, RpcError>;

    /// An existing open-orders account of `owner` on `market`
    async fn find_open_orders(
        &self,
        market: &Pubkey,
        owner: &Pubkey,
        program: &Pubkey,
    ) -> Result<Option<Pubkey>, RpcError>;

    async fn rent_exempt_minimum(&self, data_len: usize) -> Result<u64, RpcError>;

    /// `None` when the table account does not exist
    async fn lookup_table(
        &self,
        address: &Pubkey,
    ) -> Result<Option<AddressLookupTableAccount>, RpcError>;

    /// Submit and wait for confirmation
    async fn send_and_confirm(&self, tx: &VersionedTransaction) -> Result<Signature, RpcError>;
}

#[async_trait]
impl SolanaConnection for RpcClient {
    async fn latest_blockhash(&self) -> Result<Hash, RpcError> {
        Ok(self.get_latest_blockhash().await?)
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, RpcError> {
        let response = self
            .get_account_with_commitment(address, self.commitment())
            .await?;
        Ok(response.value.is_some())
    }

    async fn find_open_orders(
        &self,
        market: &Pubkey,
        owner: &Pubkey,
        program: &Pubkey,
    ) -> Result<Option<Pubkey>, RpcError> {
        let config = RpcProgramAccountsConfig {
            filters: Some(vec![
                RpcFilterType::DataSize(OPEN_ORDERS_SPAN as u64),
                RpcFilterType::Memcmp(Memcmp::new_base58_encoded(
                    OPEN_ORDERS_MARKET_OFFSET,
                    market.as_ref(),
                )),
                RpcFilterType::Memcmp(Memcmp::new_base58_encoded(
                    OPEN_ORDERS_OWNER_OFFSET,
                    owner.as_ref(),
                )),
            ]),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                commitment: Some(self.commitment()),
                ..Default::default()
            },
            ..Default::default()
        };

        let accounts = self
            .get_program_accounts_with_config(program, config)
            .await?;
        Ok(accounts.first().map(|(address, _)| *address))
    }

    async fn rent_exempt_minimum(&self, data_len: usize) -> Result<u64, RpcError> {
        Ok(self.get_minimum_balance_for_rent_exemption(data_len).await?)
    }

    async fn lookup_table(
        &self,
        address: &Pubkey,
    ) -> Result<Option<AddressLookupTableAccount>, RpcError> {
        let Some(account) = self
            .get_account_with_commitment(address, self.commitment())
            .await?
            .value
        else {
            return Ok(None);
        };

        let table = AddressLookupTable::deserialize(&account.data).map_err(|e| {
            RpcError::InvalidAccountData {
                account: address.to_string(),
                message: e.to_string(),
            }
        })?;

        Ok(Some(AddressLookupTableAccount {
            key: *address,
            addresses: table.addresses.to_vec(),
        }))
    }

    async fn send_and_confirm(&self, tx: &VersionedTransaction) -> Result<Signature, RpcError> {
        Ok(self.send_and_confirm_transaction(tx).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rpc_client_uses_configured_endpoint() {
        let config = SolanaConfig {
            rpc_url: "http://127.0.0.1:8899".to_string(),
            ..SolanaConfig::default()
        };
        let client = rpc_client(&config);
        assert_eq!(client.url(), "http://127.0.0.1:8899");
        assert_eq!(client.commitment(), CommitmentConfig::confirmed());
    }
}
