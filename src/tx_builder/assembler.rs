//! Solana bundle assembly
//!
//! Turns a Solana [`Trade`] into setup / swap / cleanup transactions sharing
//! one blockhash. The result is cached on the trade; concurrent calls on the
//! same trade do not build twice.

use crate::compat;
use crate::config::SolanaConfig;
use crate::metrics::{metrics, Timer};
use crate::rpc::{SolanaConnection, OPEN_ORDERS_SPAN};
use crate::trade::{SolanaContext, Trade};
use crate::tx_builder::bundle::{AssemblyOutcome, Begin, BuildingGuard, SolanaTxBundle};
use crate::tx_builder::errors::TransactionBuilderError;
use crate::tx_builder::instructions::{
    create_ata, open_orders_instructions, sanity_check_setup_order, unwrap_sol_instruction,
    wrap_sol_instructions,
};
use crate::tx_builder::message::{
    decode_legacy_message, decompile_instructions, lookup_tables_for, substitute_accounts,
};
use crate::types::{wrapped_sol_mint, ChainId, Currency};
use futures::future::try_join_all;
use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::{v0, AddressLookupTableAccount, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::VersionedTransaction,
};
use spl_associated_token_account::get_associated_token_address;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct SolanaTxAssembler {
    connection: Arc<dyn SolanaConnection>,
    open_orders_program: Pubkey,
    /// account -> lookup table containing it
    lookup_registry: HashMap<Pubkey, Pubkey>,
}

impl SolanaTxAssembler {
    pub fn new(connection: Arc<dyn SolanaConnection>, config: &SolanaConfig) -> anyhow::Result<Self> {
        Ok(Self::with_registry(
            connection,
            config.open_orders_program_id()?,
            config.lookup_table_registry()?,
        ))
    }

    pub fn with_registry(
        connection: Arc<dyn SolanaConnection>,
        open_orders_program: Pubkey,
        lookup_registry: HashMap<Pubkey, Pubkey>,
    ) -> Self {
        Self {
            connection,
            open_orders_program,
            lookup_registry,
        }
    }

    /// Build (or return the cached) bundle for `trade`.
    ///
    /// `Skipped` when the trade has nothing to assemble, `InProgress` when
    /// another call is already building it. On error nothing is cached and
    /// the next call retries.
    pub async fn assemble(&self, trade: &Trade) -> Result<AssemblyOutcome, TransactionBuilderError> {
        let Some(ctx) = trade.solana() else {
            return Ok(AssemblyOutcome::Skipped);
        };
        if ctx.encoded_message.trim().is_empty() || ctx.to == Pubkey::default() {
            debug!("Nothing to assemble: empty message or no recipient");
            metrics().assembly("skipped");
            return Ok(AssemblyOutcome::Skipped);
        }

        let guard = match BuildingGuard::begin(trade.assembly_state()) {
            Begin::Started(guard) => guard,
            Begin::InProgress => return Ok(AssemblyOutcome::InProgress),
            Begin::Ready(bundle) => return Ok(AssemblyOutcome::Built(bundle)),
        };

        let timer = Timer::new();
        match self.build(trade, ctx).await {
            Ok(bundle) => {
                let bundle = guard.complete(bundle);
                timer.observe_duration(&metrics().assembly_latency);
                metrics().assembly("built");
                info!(
                    payer = %ctx.to,
                    blockhash = %bundle.blockhash,
                    setup = bundle.setup_tx.is_some(),
                    clean_up = bundle.clean_up_tx.is_some(),
                    elapsed_ms = (timer.elapsed_secs() * 1000.0) as u64,
                    "Solana bundle assembled"
                );
                Ok(AssemblyOutcome::Built(bundle))
            }
            Err(e) => {
                guard.fail(e.to_string());
                metrics().assembly("failed");
                error!(
                    payer = %ctx.to,
                    category = e.category(),
                    error = %e,
                    "Solana bundle assembly failed"
                );
                Err(e)
            }
        }
    }

    async fn build(
        &self,
        trade: &Trade,
        ctx: &SolanaContext,
    ) -> Result<SolanaTxBundle, TransactionBuilderError> {
        let payer = ctx.to;
        let mut message = decode_legacy_message(&ctx.encoded_message)?;
        let wrap_lamports = native_wrap_amount(trade)?;
        let table_addresses = lookup_tables_for(&message.account_keys, &self.lookup_registry);

        // only needed at compile time; fetched alongside every lookup
        let blockhash = async {
            self.connection
                .latest_blockhash()
                .await
                .map_err(|e| TransactionBuilderError::Blockhash(e.to_string()))
        };
        let (blockhash, (open_orders_ixs, open_orders_signers, substitutions), token_ixs, tables) =
            tokio::try_join!(
                blockhash,
                // 1. open orders, 2. native wrap, 3. token accounts
                self.resolve_open_orders(&payer, &ctx.serum_open_orders_by_market),
                self.token_account_instructions(&payer, trade, wrap_lamports),
                self.lookup_tables(&table_addresses),
            )?;

        let replaced = substitute_accounts(&mut message, &substitutions);
        debug!(
            markets = ctx.serum_open_orders_by_market.len(),
            created = open_orders_signers.len(),
            replaced,
            "Open orders resolved"
        );

        let mut setup_ixs = open_orders_ixs;
        setup_ixs.extend(token_ixs);
        sanity_check_setup_order(&setup_ixs, &self.open_orders_program)?;

        let setup_tx = if setup_ixs.is_empty() {
            None
        } else {
            let mut tx = compile_unsigned(&payer, &setup_ixs, &[], blockhash)?;
            for signer in &open_orders_signers {
                compat::partially_sign(&mut tx, signer)
                    .map_err(|e| TransactionBuilderError::Signing(e.to_string()))?;
            }
            Some(tx)
        };

        let swap_tx = swap_transaction(&message, &ctx.program_state, &tables, blockhash)?;

        let clean_up_tx = if is_native_sol(&trade.output_amount().currency) {
            let close = unwrap_sol_instruction(&payer)?;
            Some(compile_unsigned(&payer, &[close], &[], blockhash)?)
        } else {
            None
        };

        Ok(SolanaTxBundle {
            setup_tx,
            swap_tx,
            clean_up_tx,
            blockhash,
        })
    }

    /// Existing open-orders account per market, or instructions creating one
    async fn resolve_open_orders(
        &self,
        payer: &Pubkey,
        placeholders: &HashMap<Pubkey, Pubkey>,
    ) -> Result<(Vec<Instruction>, Vec<Keypair>, HashMap<Pubkey, Pubkey>), TransactionBuilderError>
    {
        // deterministic instruction order across runs
        let markets: BTreeMap<&Pubkey, &Pubkey> = placeholders.iter().collect();

        let existing = try_join_all(markets.keys().map(|market| async move {
            self.connection
                .find_open_orders(market, payer, &self.open_orders_program)
                .await
                .map_err(|e| TransactionBuilderError::open_orders(market, e.to_string()))
        }))
        .await?;

        let rent = if existing.iter().any(Option::is_none) {
            self.connection
                .rent_exempt_minimum(OPEN_ORDERS_SPAN)
                .await?
        } else {
            0
        };

        let mut instructions = Vec::new();
        let mut signers = Vec::new();
        let mut substitutions = HashMap::with_capacity(markets.len());

        for ((market, placeholder), found) in markets.into_iter().zip(existing) {
            let account = match found {
                Some(account) => account,
                None => {
                    let keypair = Keypair::new();
                    instructions.extend(open_orders_instructions(
                        payer,
                        &keypair.pubkey(),
                        market,
                        &self.open_orders_program,
                        rent,
                    ));
                    let account = keypair.pubkey();
                    signers.push(keypair);
                    account
                }
            };
            substitutions.insert(*placeholder, account);
        }

        Ok((instructions, signers, substitutions))
    }

    /// Wrap instructions followed by missing ATAs of the route's tokens
    async fn token_account_instructions(
        &self,
        payer: &Pubkey,
        trade: &Trade,
        wrap_lamports: Option<u64>,
    ) -> Result<Vec<Instruction>, TransactionBuilderError> {
        let wsol = wrapped_sol_mint();

        let mut mints: Vec<Pubkey> = trade
            .tokens()
            .keys()
            .map(|address| {
                Pubkey::from_str(address).map_err(|_| {
                    TransactionBuilderError::Configuration(format!(
                        "invalid token mint in quote: {}",
                        address
                    ))
                })
            })
            .collect::<Result<_, _>>()?;
        mints.sort();
        mints.dedup();
        if wrap_lamports.is_some() {
            mints.retain(|m| *m != wsol);
        }

        let wsol_ata = get_associated_token_address(payer, &wsol);
        let atas: Vec<Pubkey> = mints
            .iter()
            .map(|mint| get_associated_token_address(payer, mint))
            .collect();

        let probe = async {
            match wrap_lamports {
                Some(_) => self.connection.account_exists(&wsol_ata).await.map(Some),
                None => Ok(None),
            }
        };
        let (wsol_exists, exists) = tokio::try_join!(
            probe,
            try_join_all(atas.iter().map(|ata| self.connection.account_exists(ata)))
        )?;

        let mut instructions = Vec::new();
        if let (Some(lamports), Some(wsol_exists)) = (wrap_lamports, wsol_exists) {
            instructions.extend(wrap_sol_instructions(payer, lamports, !wsol_exists)?);
        }
        for (mint, exists) in mints.iter().zip(exists) {
            if !exists {
                instructions.push(create_ata(payer, payer, mint));
            }
        }
        Ok(instructions)
    }

    async fn lookup_tables(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<AddressLookupTableAccount>, TransactionBuilderError> {
        let tables: Vec<AddressLookupTableAccount> =
            try_join_all(addresses.iter().map(|t| self.connection.lookup_table(t)))
                .await?
                .into_iter()
                .flatten()
                .collect();
        debug!(
            requested = addresses.len(),
            resolved = tables.len(),
            "Lookup tables resolved"
        );
        Ok(tables)
    }
}

fn swap_transaction(
    message: &solana_sdk::message::Message,
    program_state: &Keypair,
    tables: &[AddressLookupTableAccount],
    blockhash: Hash,
) -> Result<VersionedTransaction, TransactionBuilderError> {
    let instructions = decompile_instructions(message)?;
    let fee_payer = message.account_keys[0];

    let mut tx = compile_unsigned(&fee_payer, &instructions, tables, blockhash)?;
    compat::partially_sign(&mut tx, program_state)
        .map_err(|e| TransactionBuilderError::Signing(e.to_string()))?;
    Ok(tx)
}

fn compile_unsigned(
    payer: &Pubkey,
    instructions: &[Instruction],
    tables: &[AddressLookupTableAccount],
    blockhash: Hash,
) -> Result<VersionedTransaction, TransactionBuilderError> {
    let message = v0::Message::try_compile(payer, instructions, tables, blockhash)
        .map_err(|e| TransactionBuilderError::Compile(e.to_string()))?;
    Ok(compat::unsigned_transaction(VersionedMessage::V0(message)))
}

fn is_native_sol(currency: &Currency) -> bool {
    currency.is_native() && currency.chain() == ChainId::Solana
}

fn native_wrap_amount(trade: &Trade) -> Result<Option<u64>, TransactionBuilderError> {
    let input = trade.input_amount();
    if !is_native_sol(&input.currency) {
        return Ok(None);
    }
    u64::try_from(input.raw).map(Some).map_err(|_| {
        TransactionBuilderError::Configuration(format!("input amount {} exceeds u64", input.raw))
    })
}
