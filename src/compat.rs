//! Compatibility layer for Solana SDK types
//!
//! Uniform access to headers, account keys and signature slots of a
//! `VersionedMessage`, whichever version it is (Legacy or V0).
//!
//! Transactions in a bundle are signed by more than one party at different
//! times: the program-state key at assembly, the user's wallet at send. The
//! helpers here place each signature in the slot matching the signer's
//! position among the required signers, leaving the other slots at
//! `Signature::default()`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use solana_sdk::{message::VersionedMessage, signature::Keypair};
//! use swap_engine::compat;
//!
//! fn sign_first(message: VersionedMessage, program_state: &Keypair) {
//!     let mut tx = compat::unsigned_transaction(message);
//!     compat::partially_sign(&mut tx, program_state).unwrap();
//!     assert_eq!(compat::missing_signers(&tx).len() + 1, tx.signatures.len());
//! }
//! ```

use solana_sdk::{
    message::{MessageHeader, VersionedMessage},
    pubkey::Pubkey,
    signature::{Signature, Signer},
    transaction::VersionedTransaction,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0} is not a required signer of the message")]
pub struct NotASigner(pub Pubkey);

/// Get the message header from a `VersionedMessage`.
#[inline]
#[must_use]
pub fn get_message_header(message: &VersionedMessage) -> &MessageHeader {
    match message {
        VersionedMessage::Legacy(legacy_msg) => &legacy_msg.header,
        VersionedMessage::V0(v0_msg) => &v0_msg.header,
    }
}

/// Get the static account keys from a `VersionedMessage`.
///
/// For V0 messages this excludes addresses loaded from lookup tables.
#[inline]
#[must_use]
pub fn get_static_account_keys(message: &VersionedMessage) -> &[Pubkey] {
    match message {
        VersionedMessage::Legacy(legacy_msg) => &legacy_msg.account_keys,
        VersionedMessage::V0(v0_msg) => &v0_msg.account_keys,
    }
}

/// The first `num_required_signatures` static keys, in signature-slot order.
#[must_use]
pub fn get_required_signers(message: &VersionedMessage) -> &[Pubkey] {
    let keys = get_static_account_keys(message);
    let n = (get_message_header(message).num_required_signatures as usize).min(keys.len());
    &keys[..n]
}

/// Signature slot of `signer`, if it is a required signer.
#[must_use]
pub fn signer_position(message: &VersionedMessage, signer: &Pubkey) -> Option<usize> {
    get_required_signers(message).iter().position(|k| k == signer)
}

/// Wrap `message` with one default signature per required signer.
pub fn unsigned_transaction(message: VersionedMessage) -> VersionedTransaction {
    let slots = get_message_header(&message).num_required_signatures as usize;
    VersionedTransaction {
        signatures: vec![Signature::default(); slots],
        message,
    }
}

/// Sign `tx` with `signer`, filling only that signer's slot.
pub fn partially_sign<S: Signer + ?Sized>(
    tx: &mut VersionedTransaction,
    signer: &S,
) -> Result<(), NotASigner> {
    let pubkey = signer.pubkey();
    let position = signer_position(&tx.message, &pubkey).ok_or(NotASigner(pubkey))?;
    let slots = get_message_header(&tx.message).num_required_signatures as usize;
    if tx.signatures.len() < slots {
        tx.signatures.resize(slots, Signature::default());
    }
    tx.signatures[position] = signer.sign_message(&tx.message.serialize());
    Ok(())
}

/// Required signers whose slot still holds the default signature.
#[must_use]
pub fn missing_signers(tx: &VersionedTransaction) -> Vec<Pubkey> {
    get_required_signers(&tx.message)
        .iter()
        .enumerate()
        .filter(|(i, _)| {
            tx.signatures
                .get(*i)
                .map_or(true, |s| *s == Signature::default())
        })
        .map(|(_, k)| *k)
        .collect()
}
