//! Legacy message handling for the routing service's swap transaction
//!
//! The service ships a base64, bincode-encoded legacy `Message` whose
//! open-orders accounts are placeholders. The assembler substitutes the real
//! keys, decompiles it back to instructions and recompiles as v0 with lookup
//! tables.

use crate::tx_builder::errors::TransactionBuilderError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    message::Message,
    pubkey::Pubkey,
};
use std::collections::HashMap;

pub fn decode_legacy_message(encoded: &str) -> Result<Message, TransactionBuilderError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| TransactionBuilderError::decode(format!("invalid base64: {}", e)))?;
    let message: Message = bincode::deserialize(&bytes)
        .map_err(|e| TransactionBuilderError::decode(format!("invalid message: {}", e)))?;
    if message.account_keys.is_empty() {
        return Err(TransactionBuilderError::decode("message has no account keys"));
    }
    Ok(message)
}

/// Replace every account key present in `substitutions`. Returns how many
/// keys changed.
pub fn substitute_accounts(message: &mut Message, substitutions: &HashMap<Pubkey, Pubkey>) -> usize {
    let mut replaced = 0;
    for key in message.account_keys.iter_mut() {
        if let Some(actual) = substitutions.get(key) {
            *key = *actual;
            replaced += 1;
        }
    }
    replaced
}

/// Rebuild instructions with signer / writable flags from the header
pub fn decompile_instructions(message: &Message) -> Result<Vec<Instruction>, TransactionBuilderError> {
    let keys = &message.account_keys;
    let n = keys.len();
    let header = &message.header;
    let num_signed = header.num_required_signatures as usize;
    let num_writable_signed = num_signed.saturating_sub(header.num_readonly_signed_accounts as usize);
    let num_writable_unsigned_end = n.saturating_sub(header.num_readonly_unsigned_accounts as usize);

    let is_writable = |i: usize| {
        if i < num_signed {
            i < num_writable_signed
        } else {
            i < num_writable_unsigned_end
        }
    };

    let key_at = |i: u8| {
        keys.get(i as usize).copied().ok_or_else(|| {
            TransactionBuilderError::decode(format!("account index {} out of range ({} keys)", i, n))
        })
    };

    message
        .instructions
        .iter()
        .map(|compiled| {
            let program_id = key_at(compiled.program_id_index)?;
            let accounts = compiled
                .accounts
                .iter()
                .map(|&idx| {
                    let pubkey = key_at(idx)?;
                    let i = idx as usize;
                    Ok(AccountMeta {
                        pubkey,
                        is_signer: i < num_signed,
                        is_writable: is_writable(i),
                    })
                })
                .collect::<Result<Vec<_>, TransactionBuilderError>>()?;
            Ok(Instruction {
                program_id,
                accounts,
                data: compiled.data.clone(),
            })
        })
        .collect()
}

/// Registry tables covering any of `keys`, deduplicated in first-use order
pub fn lookup_tables_for(keys: &[Pubkey], registry: &HashMap<Pubkey, Pubkey>) -> Vec<Pubkey> {
    let mut tables: Vec<Pubkey> = Vec::new();
    for table in keys.iter().filter_map(|k| registry.get(k)) {
        if !tables.contains(table) {
            tables.push(*table);
        }
    }
    tables
}
