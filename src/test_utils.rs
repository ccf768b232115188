//! Test Utilities Module
//!
//! Deterministic, network-free stand-ins for the chain connection, wallets
//! and EVM provider, plus trade fixtures.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use crate::compat;
use crate::evm::{EvmSigner, EvmTxRequest, EvmTxResponse, ProviderError};
use crate::rpc::{RpcError, SolanaConnection};
use crate::wallet::{SolanaWallet, WalletError};
use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::{
    hash::Hash,
    message::AddressLookupTableAccount,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::VersionedTransaction,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// In-memory [`SolanaConnection`]
///
/// Accounts, open-orders and lookup tables are whatever the test registers.
/// Sends are recorded; failures can be injected per send attempt.
pub struct MockConnection {
    blockhash: Hash,
    rent: u64,
    accounts: Mutex<HashSet<Pubkey>>,
    open_orders: Mutex<HashMap<(Pubkey, Pubkey), Pubkey>>,
    lookup_tables: Mutex<HashMap<Pubkey, AddressLookupTableAccount>>,
    fail_blockhash: AtomicBool,
    blockhash_calls: AtomicUsize,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
    send_attempts: AtomicUsize,
    send_failures: Mutex<HashMap<usize, RpcError>>,
    sent: Mutex<Vec<VersionedTransaction>>,
    calls: Mutex<Vec<&'static str>>,
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            blockhash: Hash::new_unique(),
            rent: 23_357_760,
            accounts: Mutex::new(HashSet::new()),
            open_orders: Mutex::new(HashMap::new()),
            lookup_tables: Mutex::new(HashMap::new()),
            fail_blockhash: AtomicBool::new(false),
            blockhash_calls: AtomicUsize::new(0),
            gate: None,
            send_attempts: AtomicUsize::new(0),
            send_failures: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Blockhash fetches block until `gate` is notified; `entered` fires when
    /// a fetch starts waiting. Returns `(connection, gate, entered)`.
    pub fn gated() -> (Self, Arc<Notify>, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let entered = Arc::new(Notify::new());
        let mut conn = Self::new();
        conn.gate = Some((Arc::clone(&gate), Arc::clone(&entered)));
        (conn, gate, entered)
    }

    pub fn blockhash(&self) -> Hash {
        self.blockhash
    }

    pub fn add_account(&self, address: Pubkey) {
        self.accounts.lock().insert(address);
    }

    pub fn add_open_orders(&self, market: Pubkey, owner: Pubkey, account: Pubkey) {
        self.open_orders.lock().insert((market, owner), account);
    }

    pub fn add_lookup_table(&self, table: AddressLookupTableAccount) {
        self.lookup_tables.lock().insert(table.key, table);
    }

    pub fn set_fail_blockhash(&self, fail: bool) {
        self.fail_blockhash.store(fail, Ordering::SeqCst);
    }

    /// The `index`-th send attempt (0-based) fails with `err`
    pub fn fail_send_at(&self, index: usize, err: RpcError) {
        self.send_failures.lock().insert(index, err);
    }

    pub fn blockhash_calls(&self) -> usize {
        self.blockhash_calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<VersionedTransaction> {
        self.sent.lock().clone()
    }

    /// Connection calls in the order they were made; the blockhash fetch
    /// logs both `blockhash_start` and `blockhash_end`
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl SolanaConnection for MockConnection {
    async fn latest_blockhash(&self) -> Result<Hash, RpcError> {
        self.blockhash_calls.fetch_add(1, Ordering::SeqCst);
        self.record("blockhash_start");
        if let Some((gate, entered)) = &self.gate {
            entered.notify_one();
            gate.notified().await;
        }
        self.record("blockhash_end");
        if self.fail_blockhash.load(Ordering::SeqCst) {
            return Err(RpcError::BlockhashNotFound);
        }
        Ok(self.blockhash)
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, RpcError> {
        self.record("account_exists");
        Ok(self.accounts.lock().contains(address))
    }

    async fn find_open_orders(
        &self,
        market: &Pubkey,
        owner: &Pubkey,
        _program: &Pubkey,
    ) -> Result<Option<Pubkey>, RpcError> {
        self.record("find_open_orders");
        Ok(self.open_orders.lock().get(&(*market, *owner)).copied())
    }

    async fn rent_exempt_minimum(&self, _data_len: usize) -> Result<u64, RpcError> {
        Ok(self.rent)
    }

    async fn lookup_table(
        &self,
        address: &Pubkey,
    ) -> Result<Option<AddressLookupTableAccount>, RpcError> {
        self.record("lookup_table");
        Ok(self.lookup_tables.lock().get(address).cloned())
    }

    async fn send_and_confirm(&self, tx: &VersionedTransaction) -> Result<Signature, RpcError> {
        let attempt = self.send_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.send_failures.lock().remove(&attempt) {
            return Err(err);
        }
        self.sent.lock().push(tx.clone());
        Ok(tx.signatures.first().copied().unwrap_or_default())
    }
}

/// Keypair-backed wallet that can be told to reject
pub struct MockWallet {
    keypair: Keypair,
    reject: bool,
    sign_calls: AtomicUsize,
}

impl MockWallet {
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair,
            reject: false,
            sign_calls: AtomicUsize::new(0),
        }
    }

    pub fn rejecting(keypair: Keypair) -> Self {
        Self {
            reject: true,
            ..Self::new(keypair)
        }
    }

    pub fn sign_calls(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SolanaWallet for MockWallet {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_transactions(
        &self,
        mut txs: Vec<VersionedTransaction>,
    ) -> Result<Vec<VersionedTransaction>, WalletError> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(WalletError::Rejected);
        }
        for tx in &mut txs {
            compat::partially_sign(tx, &self.keypair)
                .map_err(|e| WalletError::Signing(e.to_string()))?;
        }
        Ok(txs)
    }
}

/// Scripted EVM provider
pub struct MockEvmSigner {
    estimate: Result<u64, ProviderError>,
    send: Result<EvmTxResponse, ProviderError>,
    requests: Mutex<Vec<EvmTxRequest>>,
}

impl MockEvmSigner {
    pub fn succeeding(estimate: u64, hash: &str) -> Self {
        Self {
            estimate: Ok(estimate),
            send: Ok(EvmTxResponse {
                hash: hash.to_string(),
                raw: serde_json::json!({ "hash": hash }),
            }),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_estimate(err: ProviderError) -> Self {
        Self {
            estimate: Err(err),
            ..Self::succeeding(0, "0x")
        }
    }

    pub fn failing_send(estimate: u64, err: ProviderError) -> Self {
        Self {
            send: Err(err),
            ..Self::succeeding(estimate, "0x")
        }
    }

    /// Requests seen by `send_transaction`
    pub fn sent_requests(&self) -> Vec<EvmTxRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl EvmSigner for MockEvmSigner {
    async fn estimate_gas(&self, _tx: &EvmTxRequest) -> Result<u64, ProviderError> {
        self.estimate.clone()
    }

    async fn send_transaction(&self, tx: &EvmTxRequest) -> Result<EvmTxResponse, ProviderError> {
        self.requests.lock().push(tx.clone());
        self.send.clone()
    }
}

/// Trade fixtures
pub mod fixtures {
    use crate::trade::{PriceImpact, SolanaContext, Swap, TokenInfo, Trade, TradeParts};
    use crate::types::{ChainId, Currency, CurrencyAmount, TradeType, WRAPPED_SOL_MINT};
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use solana_sdk::{
        instruction::{AccountMeta, Instruction},
        message::Message,
        pubkey::Pubkey,
        signature::{Keypair, Signer},
    };
    use std::collections::HashMap;

    pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    pub fn eth() -> Currency {
        Currency::native(ChainId::Evm(1), 18, "ETH")
    }

    pub fn evm_usdc() -> Currency {
        Currency::token(
            ChainId::Evm(1),
            "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
            6,
            "USDC",
        )
    }

    pub fn usdc() -> Currency {
        Currency::token(ChainId::Solana, USDC_MINT, 6, "USDC")
    }

    fn swap(token_in: &str, token_out: &str, amount_in: u128, amount_out: u128) -> Swap {
        Swap {
            pool: "pool-1".to_string(),
            token_in: token_in.to_string(),
            token_out: token_out.to_string(),
            swap_amount: amount_in,
            amount_out,
            exchange: "uniswap".to_string(),
            pool_type: "uniswap-v3".to_string(),
            extra: None,
        }
    }

    /// ETH -> USDC through one pool; received 99 USD for 100 USD in
    pub fn evm_trade(trade_type: TradeType, input_raw: u128, output_raw: u128) -> Trade {
        let input = eth();
        let output = evm_usdc();
        let token_in = input.routing_address().unwrap_or_default();
        let token_out = output.routing_address().unwrap_or_default();

        Trade::from_parts(TradeParts {
            trade_type,
            swaps: vec![vec![swap(&token_in, &token_out, input_raw, output_raw)]],
            tokens: HashMap::from([
                (token_in, TokenInfo { decimals: 18, symbol: "ETH".into() }),
                (token_out, TokenInfo { decimals: 6, symbol: "USDC".into() }),
            ]),
            input_amount: CurrencyAmount::new(input, input_raw),
            output_amount: CurrencyAmount::new(output, output_raw),
            amount_in_usd: Some(100.0),
            amount_out_usd: Some(99.5),
            received_usd: Some(99.0),
            gas_usd: Some(0.5),
            price_impact: PriceImpact::from_usd(Some(100.0), Some(99.5)),
            encoded_swap_data: "0xdeadbeef".to_string(),
            router_address: "0x6131b5fae19ea4f9d964eac0408e4408b66337b5".to_string(),
            solana: None,
        })
    }

    /// A Solana trade as the routing service would quote it
    pub struct SolanaFixture {
        pub trade: Trade,
        pub program_state: Pubkey,
        pub swap_program: Pubkey,
        pub pool: Pubkey,
        /// (market, placeholder) pairs referenced by the message
        pub markets: Vec<(Pubkey, Pubkey)>,
    }

    /// `market_count` order-book markets, each with a placeholder open-orders
    /// key inside the encoded swap message
    pub fn solana_trade(
        input: Currency,
        output: Currency,
        recipient: Pubkey,
        market_count: usize,
    ) -> SolanaFixture {
        build_solana(input, output, recipient, market_count, None)
    }

    /// Same as [`solana_trade`] with a raw `encoded_message` payload
    pub fn solana_trade_with_message(
        input: Currency,
        output: Currency,
        recipient: Pubkey,
        encoded_message: &str,
    ) -> Trade {
        build_solana(input, output, recipient, 0, Some(encoded_message)).trade
    }

    fn build_solana(
        input: Currency,
        output: Currency,
        recipient: Pubkey,
        market_count: usize,
        message_override: Option<&str>,
    ) -> SolanaFixture {
        let program_state = Keypair::new();
        let program_state_key = program_state.pubkey();
        let swap_program = Pubkey::new_unique();
        let pool = Pubkey::new_unique();
        let markets: Vec<(Pubkey, Pubkey)> = (0..market_count)
            .map(|_| (Pubkey::new_unique(), Pubkey::new_unique()))
            .collect();

        let mut accounts = vec![
            AccountMeta::new(recipient, true),
            AccountMeta::new(program_state_key, true),
            AccountMeta::new(pool, false),
        ];
        for (market, placeholder) in &markets {
            accounts.push(AccountMeta::new(*placeholder, false));
            accounts.push(AccountMeta::new_readonly(*market, false));
        }
        let ix = Instruction::new_with_bytes(swap_program, &[7, 1, 0, 0], accounts);
        let message = Message::new(&[ix], Some(&recipient));
        let encoded_message = match message_override {
            Some(raw) => raw.to_string(),
            None => bincode::serialize(&message)
                .map(|bytes| STANDARD.encode(bytes))
                .unwrap_or_default(),
        };

        let mint_of = |c: &Currency| c.routing_address().unwrap_or_else(|| WRAPPED_SOL_MINT.into());
        let (mint_in, mint_out) = (mint_of(&input), mint_of(&output));

        let trade = Trade::from_parts(TradeParts {
            trade_type: TradeType::ExactIn,
            swaps: vec![vec![swap(&mint_in, &mint_out, 1_000_000_000, 150_000_000)]],
            tokens: HashMap::from([
                (mint_in, TokenInfo { decimals: input.decimals(), symbol: input.symbol().into() }),
                (mint_out, TokenInfo { decimals: output.decimals(), symbol: output.symbol().into() }),
            ]),
            input_amount: CurrencyAmount::new(input, 1_000_000_000),
            output_amount: CurrencyAmount::new(output, 150_000_000),
            amount_in_usd: Some(150.0),
            amount_out_usd: Some(149.7),
            received_usd: Some(149.7),
            gas_usd: None,
            price_impact: PriceImpact::from_usd(Some(150.0), Some(149.7)),
            encoded_swap_data: String::new(),
            router_address: String::new(),
            solana: Some(SolanaContext {
                to: recipient,
                program_state,
                encoded_message,
                serum_open_orders_by_market: markets.iter().copied().collect(),
            }),
        });

        SolanaFixture {
            trade,
            program_state: program_state_key,
            swap_program,
            pool,
            markets,
        }
    }
}
