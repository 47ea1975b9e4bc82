//! Pluggable consensus policy boundary
//!
//! The chain manager drives validation and persistence; everything
//! policy-specific (scoring forks, stamping blocks, custom transaction
//! rules) is delegated through this trait. The engine stores consensus data
//! verbatim and never interprets it.

use crate::blockchain::{Block, DbBlock};
use crate::error::Result;
use crate::ids::Id;
use crate::storage::StoreTransaction;
use crate::transaction::Transaction;
use serde_json::{json, Value};

pub trait Consensus: Send + Sync {
    /// Custom transaction rules, run as the last step of transaction
    /// validation.
    fn verify_transaction(&self, dbtx: &StoreTransaction, tx: &Transaction) -> Result<bool>;

    /// Approve a transaction for the mempool.
    fn submit_transaction(&self, dbtx: &mut StoreTransaction, tx: &Transaction) -> Result<bool>;

    /// Hook run when a transaction is confirmed into a block. Best-effort:
    /// the engine logs a refusal but does not abort the confirmation.
    fn confirm_transaction(&self, dbtx: &mut StoreTransaction, tx: &Transaction) -> Result<bool>;

    /// Policy rules a block must satisfy against its parent.
    fn check_consensus_rules(
        &self,
        dbtx: &StoreTransaction,
        block: &Block,
        previous: &DbBlock,
    ) -> Result<bool>;

    /// Total fork-choice order: should `candidate`'s branch replace the
    /// branch ending at `tip`?
    fn is_block_better(
        &self,
        dbtx: &StoreTransaction,
        candidate: &Block,
        tip: &DbBlock,
    ) -> Result<bool>;

    /// Approve a fully validated block right before its side effects apply.
    fn submit_block(&self, dbtx: &mut StoreTransaction, block: &Block) -> Result<bool>;

    /// Produce the consensus data document for a block being assembled on
    /// `previous_id` by the holder of `public_key`.
    fn generate_consensus_data(
        &self,
        dbtx: &StoreTransaction,
        previous_id: &Id,
        public_key: &str,
    ) -> Result<Value>;
}

/// Consensus for regression networks: every rule passes and fork choice is
/// driven by a `better` flag in the candidate's consensus data, so tests and
/// local deployments can script reorgs deterministically.
#[derive(Debug, Clone, Copy, Default)]
pub struct Regtest;

impl Regtest {
    pub fn new() -> Self {
        Regtest
    }

    fn better_flag(block: &Block) -> bool {
        block
            .consensus_data()
            .get("better")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

impl Consensus for Regtest {
    fn verify_transaction(&self, _dbtx: &StoreTransaction, _tx: &Transaction) -> Result<bool> {
        Ok(true)
    }

    fn submit_transaction(&self, _dbtx: &mut StoreTransaction, _tx: &Transaction) -> Result<bool> {
        Ok(true)
    }

    fn confirm_transaction(&self, _dbtx: &mut StoreTransaction, _tx: &Transaction) -> Result<bool> {
        Ok(true)
    }

    fn check_consensus_rules(
        &self,
        _dbtx: &StoreTransaction,
        _block: &Block,
        _previous: &DbBlock,
    ) -> Result<bool> {
        Ok(true)
    }

    fn is_block_better(
        &self,
        _dbtx: &StoreTransaction,
        candidate: &Block,
        _tip: &DbBlock,
    ) -> Result<bool> {
        Ok(Self::better_flag(candidate))
    }

    fn submit_block(&self, _dbtx: &mut StoreTransaction, _block: &Block) -> Result<bool> {
        Ok(true)
    }

    fn generate_consensus_data(
        &self,
        _dbtx: &StoreTransaction,
        _previous_id: &Id,
        _public_key: &str,
    ) -> Result<Value> {
        Ok(json!({ "better": false }))
    }
}
