//! Value objects of the transaction data model
//!
//! Outputs and inputs carry an opaque `data` document. An output whose data
//! holds a `publicKey` is owned by that key; one holding a `contract` is
//! guarded by the script evaluator instead. An input's data carries the
//! `signature` authorizing the spend.

use crate::error::{ChainError, Result};
use crate::ids::Id;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Key inside an output's data document naming the owner.
pub const PUBLIC_KEY_FIELD: &str = "publicKey";
/// Key inside an output's data document carrying a spend script.
pub const CONTRACT_FIELD: &str = "contract";
/// Key inside an input's data document carrying the spend signature.
pub const SIGNATURE_FIELD: &str = "signature";

/// An amount of coin locked by the conditions in its data document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub value: u64,
    pub nonce: u64,
    pub data: Value,
}

impl Output {
    pub fn new(value: u64, nonce: u64, data: Value) -> Self {
        Output { value, nonce, data }
    }

    pub fn document(&self) -> Value {
        json!({
            "value": self.value,
            "nonce": self.nonce,
            "data": self.data,
        })
    }

    pub fn id(&self) -> Id {
        Id::of(&self.document())
    }

    pub fn public_key(&self) -> Option<&str> {
        self.data.get(PUBLIC_KEY_FIELD).and_then(Value::as_str)
    }

    pub fn has_contract(&self) -> bool {
        matches!(self.data.get(CONTRACT_FIELD), Some(v) if !v.is_null())
    }
}

/// A reference consuming a previously created output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    pub output_id: Id,
    pub data: Value,
}

impl Input {
    pub fn new(output_id: Id, data: Value) -> Self {
        Input { output_id, data }
    }

    pub fn document(&self) -> Value {
        json!({
            "output_id": self.output_id.to_hex(),
            "data": self.data,
        })
    }

    pub fn id(&self) -> Id {
        Id::of(&self.document())
    }

    pub fn signature(&self) -> Option<&str> {
        self.data.get(SIGNATURE_FIELD).and_then(Value::as_str)
    }
}

/// A transfer of value from a set of spent outputs to a set of new ones.
/// Inputs and outputs are kept sorted by id, so the ordered output id
/// sequence committed to by spend signatures is the ascending one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    inputs: Vec<Input>,
    outputs: Vec<Output>,
    timestamp: u64,
    coinbase: bool,
}

impl Transaction {
    pub fn new(
        mut inputs: Vec<Input>,
        mut outputs: Vec<Output>,
        timestamp: u64,
        coinbase: bool,
    ) -> Self {
        inputs.sort_by_cached_key(|input| input.id());
        inputs.dedup_by_key(|input| input.id());
        outputs.sort_by_cached_key(|output| output.id());
        outputs.dedup_by_key(|output| output.id());
        Transaction {
            inputs,
            outputs,
            timestamp,
            coinbase,
        }
    }

    /// Parse a transaction document, restoring the sorted-by-id invariant.
    pub fn from_value(value: Value) -> Result<Self> {
        let parsed: Transaction = serde_json::from_value(value)?;
        Ok(Transaction::new(
            parsed.inputs,
            parsed.outputs,
            parsed.timestamp,
            parsed.coinbase,
        ))
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn is_coinbase(&self) -> bool {
        self.coinbase
    }

    pub fn document(&self) -> Value {
        json!({
            "inputs": self.inputs.iter().map(Input::document).collect::<Vec<_>>(),
            "outputs": self.outputs.iter().map(Output::document).collect::<Vec<_>>(),
            "timestamp": self.timestamp,
            "coinbase": self.coinbase,
        })
    }

    /// Transaction id over inputs, outputs and timestamp. The coinbase flag
    /// does not contribute.
    pub fn id(&self) -> Id {
        Id::of(&json!({
            "inputs": self.inputs.iter().map(Input::document).collect::<Vec<_>>(),
            "outputs": self.outputs.iter().map(Output::document).collect::<Vec<_>>(),
            "timestamp": self.timestamp,
        }))
    }

    /// Hash of the ordered sequence of output ids. Spend signatures commit
    /// to this, binding each input to the full destination set.
    pub fn output_set_id(&self) -> Id {
        let mut text = String::new();
        for output in &self.outputs {
            text.push_str(&output.id().to_hex());
        }
        Id::of_text(&text)
    }

    /// Canonical serialized size in bytes; the mempool accounts in these.
    pub fn size(&self) -> u64 {
        self.document().to_string().len() as u64
    }
}

/// Stored form of a confirmed output: the output plus the transaction that
/// created it. Keyed in the store by the output's own id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbOutput {
    pub value: u64,
    pub nonce: u64,
    pub data: Value,
    pub creating_tx_id: Id,
}

impl DbOutput {
    pub fn from_output(output: &Output, creating_tx_id: &Id) -> Self {
        DbOutput {
            value: output.value,
            nonce: output.nonce,
            data: output.data.clone(),
            creating_tx_id: creating_tx_id.clone(),
        }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(ChainError::from)
    }

    pub fn to_output(&self) -> Output {
        Output::new(self.value, self.nonce, self.data.clone())
    }

    pub fn document(&self) -> Value {
        json!({
            "value": self.value,
            "nonce": self.nonce,
            "data": self.data,
            "creating_tx_id": self.creating_tx_id.to_hex(),
        })
    }

    /// Same id as the output this record stores; the creating transaction
    /// does not contribute.
    pub fn id(&self) -> Id {
        self.to_output().id()
    }

    pub fn public_key(&self) -> Option<&str> {
        self.data.get(PUBLIC_KEY_FIELD).and_then(Value::as_str)
    }

    pub fn has_contract(&self) -> bool {
        matches!(self.data.get(CONTRACT_FIELD), Some(v) if !v.is_null())
    }
}

/// Stored form of a confirmed transaction: bodies are replaced by ids and
/// the confirming block is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbTransaction {
    pub id: Id,
    pub inputs: Vec<Id>,
    pub outputs: Vec<Id>,
    pub timestamp: u64,
    pub coinbase: bool,
    pub confirming_block: Id,
}

impl DbTransaction {
    pub fn from_transaction(tx: &Transaction, confirming_block: &Id, coinbase: bool) -> Self {
        DbTransaction {
            id: tx.id(),
            inputs: tx.inputs().iter().map(Input::id).collect(),
            outputs: tx.outputs().iter().map(Output::id).collect(),
            timestamp: tx.timestamp(),
            coinbase,
            confirming_block: confirming_block.clone(),
        }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(ChainError::from)
    }

    pub fn document(&self) -> Value {
        json!({
            "id": self.id.to_hex(),
            "inputs": self.inputs.iter().map(Id::to_hex).collect::<Vec<_>>(),
            "outputs": self.outputs.iter().map(Id::to_hex).collect::<Vec<_>>(),
            "timestamp": self.timestamp,
            "coinbase": self.coinbase,
            "confirming_block": self.confirming_block.to_hex(),
        })
    }
}
