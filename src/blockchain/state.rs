//! UTXO / STXO index
//!
//! Tracks the spendable set, the spent set and the consumption log. Outputs
//! move between `utxos` and `stxos` but are never deleted; the `inputs`
//! table records every input that ever consumed an output. For every id at
//! most one of `utxos[id]` and `stxos[id]` exists, and the per-owner
//! secondary lists mirror exactly the primary rows whose data carries that
//! owner's public key.

use crate::error::{ChainError, Result};
use crate::ids::Id;
use crate::storage::{StoreTransaction, Table};
use crate::transaction::{DbOutput, Input, Output};
use serde_json::{json, Value};

/// Subindex holding the per-owner output id lists.
pub const OWNER_INDEX: u32 = 0;

pub struct UtxoIndex {
    utxos: Table,
    stxos: Table,
    inputs: Table,
}

impl Default for UtxoIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl UtxoIndex {
    pub fn new() -> Self {
        UtxoIndex {
            utxos: Table::new("utxos"),
            stxos: Table::new("stxos"),
            inputs: Table::new("inputs"),
        }
    }

    /// Look up an output wherever it lives, spendable or spent.
    pub fn output(&self, dbtx: &StoreTransaction, id: &Id) -> Result<DbOutput> {
        let key = id.to_hex();
        let doc = match self.utxos.get(dbtx, &key)? {
            Some(doc) => doc,
            None => self
                .stxos
                .get(dbtx, &key)?
                .ok_or(ChainError::NotFound("Output", key))?,
        };
        DbOutput::from_value(doc)
    }

    /// The output only if it is currently spendable.
    pub fn unspent(&self, dbtx: &StoreTransaction, id: &Id) -> Result<Option<DbOutput>> {
        match self.utxos.get(dbtx, &id.to_hex())? {
            Some(doc) => Ok(Some(DbOutput::from_value(doc)?)),
            None => Ok(None),
        }
    }

    /// Does the id exist at all, in either table?
    pub fn contains(&self, dbtx: &StoreTransaction, id: &Id) -> Result<bool> {
        let key = id.to_hex();
        Ok(self.utxos.get(dbtx, &key)?.is_some() || self.stxos.get(dbtx, &key)?.is_some())
    }

    pub fn unspent_by_owner(
        &self,
        dbtx: &StoreTransaction,
        public_key: &str,
    ) -> Result<Vec<DbOutput>> {
        self.outputs_by_owner(&self.utxos, dbtx, public_key)
    }

    pub fn spent_by_owner(
        &self,
        dbtx: &StoreTransaction,
        public_key: &str,
    ) -> Result<Vec<DbOutput>> {
        self.outputs_by_owner(&self.stxos, dbtx, public_key)
    }

    /// A consumed input from the consumption log.
    pub fn input(&self, dbtx: &StoreTransaction, id: &Id) -> Result<Input> {
        let doc = self
            .inputs
            .get(dbtx, &id.to_hex())?
            .ok_or(ChainError::NotFound("Input", id.to_hex()))?;
        serde_json::from_value(doc).map_err(ChainError::from)
    }

    /// Move the output consumed by `input` from the spendable set to the
    /// spent set and record the consumption.
    pub fn spend_output(&self, dbtx: &mut StoreTransaction, input: &Input) -> Result<()> {
        let key = input.output_id.to_hex();
        let doc = self
            .utxos
            .get(dbtx, &key)?
            .ok_or(ChainError::NotFound("Output", key.clone()))?;
        let spent = DbOutput::from_value(doc.clone())?;

        self.stxos.put(dbtx, &key, &doc);
        if let Some(owner) = spent.public_key() {
            push_owner(&self.stxos, dbtx, owner, &key)?;
            drop_owner(&self.utxos, dbtx, owner, &key)?;
        }
        self.utxos.erase(dbtx, &key);

        self.inputs
            .put(dbtx, &input.id().to_hex(), &input.document());
        Ok(())
    }

    /// Inverse of `spend_output`: the record returns to the spendable set
    /// and the consumption log entry disappears.
    pub fn revert_spend(&self, dbtx: &mut StoreTransaction, input: &Input) -> Result<()> {
        self.inputs.erase(dbtx, &input.id().to_hex());

        let key = input.output_id.to_hex();
        let doc = self
            .stxos
            .get(dbtx, &key)?
            .ok_or(ChainError::NotFound("Output", key.clone()))?;
        let spent = DbOutput::from_value(doc.clone())?;

        self.stxos.erase(dbtx, &key);
        self.utxos.put(dbtx, &key, &doc);
        if let Some(owner) = spent.public_key() {
            drop_owner(&self.stxos, dbtx, owner, &key)?;
            push_owner(&self.utxos, dbtx, owner, &key)?;
        }
        Ok(())
    }

    /// Add a freshly confirmed output to the spendable set.
    pub fn create_output(
        &self,
        dbtx: &mut StoreTransaction,
        output: &Output,
        creating_tx_id: &Id,
    ) -> Result<()> {
        let key = output.id().to_hex();
        if let Some(owner) = output.public_key() {
            push_owner(&self.utxos, dbtx, owner, &key)?;
        }
        self.utxos
            .put(dbtx, &key, &DbOutput::from_output(output, creating_tx_id).document());
        Ok(())
    }

    /// Inverse of `create_output`: the output leaves the spendable set.
    pub fn revert_output(&self, dbtx: &mut StoreTransaction, output: &Output) -> Result<()> {
        let key = output.id().to_hex();
        self.utxos.erase(dbtx, &key);
        if let Some(owner) = output.public_key() {
            drop_owner(&self.utxos, dbtx, owner, &key)?;
        }
        Ok(())
    }

    fn outputs_by_owner(
        &self,
        table: &Table,
        dbtx: &StoreTransaction,
        public_key: &str,
    ) -> Result<Vec<DbOutput>> {
        let mut outputs = Vec::new();
        for key in owner_list(table, dbtx, public_key)? {
            let doc = table
                .get(dbtx, &key)?
                .ok_or(ChainError::NotFound("Output", key))?;
            outputs.push(DbOutput::from_value(doc)?);
        }
        Ok(outputs)
    }
}

fn owner_list(table: &Table, dbtx: &StoreTransaction, owner: &str) -> Result<Vec<String>> {
    let list = match table.get_index(dbtx, owner, OWNER_INDEX)? {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| item.as_str().map(String::from))
            .collect(),
        _ => Vec::new(),
    };
    Ok(list)
}

fn push_owner(table: &Table, dbtx: &mut StoreTransaction, owner: &str, id_hex: &str) -> Result<()> {
    let mut list = owner_list(table, dbtx, owner)?;
    list.push(id_hex.to_string());
    table.put_index(dbtx, owner, &json!(list), OWNER_INDEX);
    Ok(())
}

fn drop_owner(table: &Table, dbtx: &mut StoreTransaction, owner: &str, id_hex: &str) -> Result<()> {
    let mut list = owner_list(table, dbtx, owner)?;
    list.retain(|item| item != id_hex);
    if list.is_empty() {
        // Keep the keyspace clean so reversing a block restores the exact
        // prior table contents.
        table.erase_index(dbtx, owner, OWNER_INDEX);
    } else {
        table.put_index(dbtx, owner, &json!(list), OWNER_INDEX);
    }
    Ok(())
}
