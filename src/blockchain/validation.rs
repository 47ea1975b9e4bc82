//! Transaction validation under a store transaction

use crate::blockchain::chain::Blockchain;
use crate::crypto;
use crate::error::{ChainError, Result};
use crate::storage::StoreTransaction;
use crate::transaction::Transaction;
use log::info;

/// Outcome of validating a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    /// Rejected. `permanent` tells the caller whether retrying is pointless
    /// (malformed or rule-violating) or the condition is benign and possibly
    /// transient (already known, missing parent, mempool conflict).
    Rejected { permanent: bool },
}

impl Verdict {
    pub fn accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    pub fn permanent(&self) -> bool {
        matches!(self, Verdict::Rejected { permanent: true })
    }

    pub(crate) fn transient() -> Self {
        Verdict::Rejected { permanent: false }
    }

    pub(crate) fn invalid() -> Self {
        Verdict::Rejected { permanent: true }
    }
}

/// Size-derived fee floor input: 100 units per canonical byte of every
/// input and output data document. A transaction must pay at least half of
/// this as its fee.
pub fn transaction_size_fee(tx: &Transaction) -> u64 {
    let mut fee = 0u64;
    for input in tx.inputs() {
        fee = fee.saturating_add(100 * input.data.to_string().len() as u64);
    }
    for output in tx.outputs() {
        fee = fee.saturating_add(100 * output.data.to_string().len() as u64);
    }
    fee
}

impl Blockchain {
    /// Validate a transaction against the state visible through `dbtx`.
    /// Checks run in a fixed order: confirmed-duplicate, duplicate outputs,
    /// input resolution and signatures, conservation and fee floor, script
    /// validity, custom consensus rules.
    pub fn verify_transaction(
        &self,
        dbtx: &StoreTransaction,
        tx: &Transaction,
        coinbase: bool,
    ) -> Result<Verdict> {
        let tx_id = tx.id();

        if self.transactions.get(dbtx, &tx_id.to_hex())?.is_some() {
            info!("transaction {} already exists", tx_id);
            return Ok(Verdict::transient());
        }

        let mut output_total = 0u64;
        for output in tx.outputs() {
            if self.utxo_index.contains(dbtx, &output.id())? {
                info!("transaction {} duplicates an existing output", tx_id);
                return Ok(Verdict::transient());
            }
            output_total = output_total.saturating_add(output.value);
        }

        let output_set_id = tx.output_set_id();

        let mut input_total = 0u64;
        for input in tx.inputs() {
            let spent = match self.utxo_index.unspent(dbtx, &input.output_id)? {
                Some(spent) => spent,
                None => {
                    info!("an output of transaction {} has already been spent", tx_id);
                    return Ok(Verdict::transient());
                }
            };
            input_total = input_total.saturating_add(spent.value);

            // Key-locked outputs need a signature over the consumed output
            // id and the full destination set; script-locked outputs are the
            // evaluator's concern instead.
            if let Some(public_key) = spent.public_key() {
                if !spent.has_contract() {
                    let signature = match input.signature() {
                        Some(signature) => signature,
                        None => {
                            info!("could not verify an input signature of transaction {}", tx_id);
                            return Ok(Verdict::invalid());
                        }
                    };
                    let message =
                        format!("{}{}", input.output_id.to_hex(), output_set_id.to_hex());
                    if crypto::verify_signature(public_key, &message, signature).is_err() {
                        info!("could not verify an input signature of transaction {}", tx_id);
                        return Ok(Verdict::invalid());
                    }
                }
            }
        }

        if !coinbase {
            if output_total > input_total {
                info!("transaction {} creates more value than it spends", tx_id);
                return Ok(Verdict::invalid());
            }

            let fee = input_total - output_total;
            if (fee as u128) * 2 < transaction_size_fee(tx) as u128 {
                info!("fee of transaction {} is too low", tx_id);
                return Ok(Verdict::invalid());
            }
        }

        if !self.contract.evaluate(dbtx, tx)? {
            info!("script returned false for transaction {}", tx_id);
            return Ok(Verdict::invalid());
        }

        if !self.consensus.verify_transaction(dbtx, tx)? {
            info!("could not verify custom rules for transaction {}", tx_id);
            return Ok(Verdict::invalid());
        }

        Ok(Verdict::Accepted)
    }

    /// Fee of a transaction whose inputs are known to resolve, i.e. one that
    /// already passed `verify_transaction` under the same store transaction.
    pub fn calculate_transaction_fee(
        &self,
        dbtx: &StoreTransaction,
        tx: &Transaction,
    ) -> Result<u64> {
        let mut output_total = 0u64;
        for output in tx.outputs() {
            output_total = output_total.saturating_add(output.value);
        }

        let mut input_total = 0u64;
        for input in tx.inputs() {
            let spent = self
                .utxo_index
                .unspent(dbtx, &input.output_id)?
                .ok_or(ChainError::NotFound("Output", input.output_id.to_hex()))?;
            input_total = input_total.saturating_add(spent.value);
        }

        Ok(input_total.saturating_sub(output_total))
    }
}
