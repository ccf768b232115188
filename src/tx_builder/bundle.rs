//! Assembled Solana bundle and the per-trade assembly state machine
//!
//! A trade's bundle is built at most once. [`BuildingGuard::begin`] is the
//! compare-and-swap that moves the slot to `Building`; a guard dropped before
//! `complete` or `fail` (cancelled future) records `Failed` so a later call
//! can retry.

use parking_lot::Mutex;
use solana_sdk::{hash::Hash, transaction::VersionedTransaction};
use std::sync::Arc;

/// Up to three transactions sent in order: setup, swap, cleanup
#[derive(Debug, Clone)]
pub struct SolanaTxBundle {
    pub setup_tx: Option<VersionedTransaction>,
    pub swap_tx: VersionedTransaction,
    pub clean_up_tx: Option<VersionedTransaction>,
    /// Shared by every transaction of the bundle
    pub blockhash: Hash,
}

impl SolanaTxBundle {
    /// Present transactions in send order
    pub fn transactions(&self) -> Vec<&VersionedTransaction> {
        self.setup_tx
            .iter()
            .chain(std::iter::once(&self.swap_tx))
            .chain(self.clean_up_tx.iter())
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub enum AssemblyState {
    #[default]
    Unbuilt,
    Building,
    Built(Arc<SolanaTxBundle>),
    /// Last attempt failed; the next call retries
    Failed(String),
}

/// Result of `SolanaTxAssembler::assemble`
#[derive(Debug, Clone)]
pub enum AssemblyOutcome {
    Built(Arc<SolanaTxBundle>),
    /// Another call is assembling this trade right now
    InProgress,
    /// Nothing to assemble (not Solana, empty message or no recipient)
    Skipped,
}

impl AssemblyOutcome {
    pub fn bundle(&self) -> Option<&Arc<SolanaTxBundle>> {
        match self {
            Self::Built(bundle) => Some(bundle),
            _ => None,
        }
    }
}

pub(crate) enum Begin<'a> {
    Started(BuildingGuard<'a>),
    InProgress,
    Ready(Arc<SolanaTxBundle>),
}

pub(crate) struct BuildingGuard<'a> {
    slot: &'a Mutex<AssemblyState>,
    finished: bool,
}

impl<'a> BuildingGuard<'a> {
    pub(crate) fn begin(slot: &'a Mutex<AssemblyState>) -> Begin<'a> {
        let mut state = slot.lock();
        match &*state {
            AssemblyState::Building => Begin::InProgress,
            AssemblyState::Built(bundle) => Begin::Ready(Arc::clone(bundle)),
            AssemblyState::Unbuilt | AssemblyState::Failed(_) => {
                *state = AssemblyState::Building;
                Begin::Started(Self {
                    slot,
                    finished: false,
                })
            }
        }
    }

    pub(crate) fn complete(mut self, bundle: SolanaTxBundle) -> Arc<SolanaTxBundle> {
        let bundle = Arc::new(bundle);
        *self.slot.lock() = AssemblyState::Built(Arc::clone(&bundle));
        self.finished = true;
        bundle
    }

    pub(crate) fn fail(mut self, reason: String) {
        *self.slot.lock() = AssemblyState::Failed(reason);
        self.finished = true;
    }
}

impl Drop for BuildingGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            *self.slot.lock() = AssemblyState::Failed("assembly cancelled".to_string());
        }
    }
}
