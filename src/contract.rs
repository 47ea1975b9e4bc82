//! Script evaluation boundary
//!
//! Outputs may carry a `contract` in their data document; whether spending
//! them is script-valid is decided by an evaluator behind this trait. The
//! engine only consumes the verdict.

use crate::error::Result;
use crate::storage::StoreTransaction;
use crate::transaction::Transaction;

pub trait ContractEvaluator: Send + Sync {
    /// Is the transaction script-valid against the current store state?
    fn evaluate(&self, dbtx: &StoreTransaction, tx: &Transaction) -> Result<bool>;
}

/// Evaluator for deployments without script support: every transaction is
/// script-valid. Contract-guarded outputs are then spendable by anyone, so
/// pair this only with consensus rules that forbid such outputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl ContractEvaluator for Passthrough {
    fn evaluate(&self, _dbtx: &StoreTransaction, _tx: &Transaction) -> Result<bool> {
        Ok(true)
    }
}
