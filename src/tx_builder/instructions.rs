//! Setup and cleanup instruction builders
//!
//! Setup instructions go into one transaction in a fixed order:
//! 1. Open-orders account creation + `InitOpenOrders` (per missing market)
//! 2. Native SOL wrap (create ATA if missing, transfer, `sync_native`)
//! 3. Associated token accounts for the route's tokens
//!
//! [`sanity_check_setup_order`] validates that order in debug/test builds
//! and is a no-op in release.

use crate::rpc::OPEN_ORDERS_SPAN;
use crate::tx_builder::errors::TransactionBuilderError;
use crate::types::wrapped_sol_mint;
#[allow(deprecated)]
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_instruction, sysvar,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account_idempotent,
};

/// `InitOpenOrders` tag of the order-book program's instruction enum
const INIT_OPEN_ORDERS_TAG: u32 = 15;

/// spl-token `SyncNative`
const SYNC_NATIVE_TAG: u8 = 17;

/// system program `Transfer`
const SYSTEM_TRANSFER_TAG: [u8; 4] = [2, 0, 0, 0];

/// `InitOpenOrders` for an already allocated account
pub fn init_open_orders(
    program: &Pubkey,
    open_orders: &Pubkey,
    owner: &Pubkey,
    market: &Pubkey,
) -> Instruction {
    let mut data = Vec::with_capacity(5);
    data.push(0u8);
    data.extend_from_slice(&INIT_OPEN_ORDERS_TAG.to_le_bytes());

    Instruction::new_with_bytes(
        *program,
        &data,
        vec![
            AccountMeta::new(*open_orders, false),
            AccountMeta::new_readonly(*owner, true),
            AccountMeta::new_readonly(*market, false),
            AccountMeta::new_readonly(sysvar::rent::id(), false),
        ],
    )
}

/// Allocate a rent-exempt open-orders account owned by `program`, then
/// initialize it for `market`. `open_orders` must co-sign.
#[allow(deprecated)]
pub fn open_orders_instructions(
    payer: &Pubkey,
    open_orders: &Pubkey,
    market: &Pubkey,
    program: &Pubkey,
    rent_lamports: u64,
) -> [Instruction; 2] {
    [
        system_instruction::create_account(
            payer,
            open_orders,
            rent_lamports,
            OPEN_ORDERS_SPAN as u64,
            program,
        ),
        init_open_orders(program, open_orders, payer, market),
    ]
}

/// Create the owner's ATA for `mint`. Only emitted for an ATA found missing;
/// idempotent in case it appears before the setup lands.
pub fn create_ata(payer: &Pubkey, owner: &Pubkey, mint: &Pubkey) -> Instruction {
    create_associated_token_account_idempotent(payer, owner, mint, &spl_token::id())
}

/// Move `lamports` into the owner's wrapped-SOL account and sync its balance
#[allow(deprecated)]
pub fn wrap_sol_instructions(
    owner: &Pubkey,
    lamports: u64,
    create_account: bool,
) -> Result<Vec<Instruction>, TransactionBuilderError> {
    let wsol = wrapped_sol_mint();
    let ata = get_associated_token_address(owner, &wsol);

    let mut instructions = Vec::with_capacity(3);
    if create_account {
        instructions.push(create_ata(owner, owner, &wsol));
    }
    instructions.push(system_instruction::transfer(owner, &ata, lamports));
    instructions.push(
        spl_token::instruction::sync_native(&spl_token::id(), &ata)
            .map_err(|e| TransactionBuilderError::instruction_failed("spl_token", e.to_string()))?,
    );
    Ok(instructions)
}

/// Close the owner's wrapped-SOL account, returning lamports as native SOL
pub fn unwrap_sol_instruction(owner: &Pubkey) -> Result<Instruction, TransactionBuilderError> {
    let ata = get_associated_token_address(owner, &wrapped_sol_mint());
    spl_token::instruction::close_account(&spl_token::id(), &ata, owner, owner, &[])
        .map_err(|e| TransactionBuilderError::instruction_failed("spl_token", e.to_string()))
}

/// Validate setup instruction order (debug/test only)
///
/// - no open-orders initialization after the wrap started
/// - every `sync_native` directly follows a transfer into the same account
#[cfg(debug_assertions)]
#[allow(deprecated)]
pub fn sanity_check_setup_order(
    instructions: &[Instruction],
    open_orders_program: &Pubkey,
) -> Result<(), TransactionBuilderError> {
    let is_transfer = |ix: &Instruction| {
        ix.program_id == solana_sdk::system_program::id()
            && ix.data.len() >= 4
            && ix.data[..4] == SYSTEM_TRANSFER_TAG
    };
    let is_sync_native = |ix: &Instruction| {
        ix.program_id == spl_token::id() && ix.data.first() == Some(&SYNC_NATIVE_TAG)
    };

    let mut wrap_started = false;
    let mut previous: Option<&Instruction> = None;

    for (idx, ix) in instructions.iter().enumerate() {
        if ix.program_id == *open_orders_program && wrap_started {
            return Err(TransactionBuilderError::invalid_order(format!(
                "Open-orders instruction at position {} follows the native wrap",
                idx
            )));
        }

        if is_transfer(ix) {
            wrap_started = true;
        }

        if is_sync_native(ix) {
            let synced = ix.accounts.first().map(|a| a.pubkey);
            let funded = previous
                .filter(|p| is_transfer(p))
                .and_then(|p| p.accounts.get(1))
                .map(|a| a.pubkey);
            if synced.is_none() || synced != funded {
                return Err(TransactionBuilderError::invalid_order(format!(
                    "sync_native at position {} is not preceded by a transfer into the same account",
                    idx
                )));
            }
        }

        previous = Some(ix);
    }

    Ok(())
}

/// No-op version of sanity_check_setup_order for release builds
#[cfg(not(debug_assertions))]
#[inline]
pub fn sanity_check_setup_order(
    _instructions: &[Instruction],
    _open_orders_program: &Pubkey,
) -> Result<(), TransactionBuilderError> {
    Ok(())
}
