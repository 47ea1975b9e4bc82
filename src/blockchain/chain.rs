//! Chain manager: tip tracking, block submission, reorganizations and block
//! assembly
//!
//! All mutating operations run under exactly one [`StoreTransaction`] which
//! commits only if the operation succeeded, so a failed submission leaves no
//! trace. The manager itself takes `&mut self` for every mutation; embedders
//! that share it across threads wrap it in `Arc<Mutex<Blockchain>>`, which
//! serializes public operations the same way.

use crate::consensus::Consensus;
use crate::contract::ContractEvaluator;
use crate::crypto::KeyPair;
use crate::economics::block_reward;
use crate::error::{ChainError, Result};
use crate::ids::Id;
use crate::mempool::Mempool;
use crate::storage::{Storage, StoreTransaction, Table};
use crate::transaction::{DbOutput, DbTransaction, Output, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::state::UtxoIndex;
use super::validation::Verdict;

use chrono::Utc;
use log::{error, info, warn};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Key of the main-chain head in the `blocks` table.
pub const TIP_KEY: &str = "tip";

/// Subindex of the `blocks` table mapping heights to block ids.
const HEIGHT_INDEX: u32 = 0;

/// A block with full transaction bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    transactions: Vec<Transaction>,
    coinbase_tx: Transaction,
    previous_block_id: Id,
    timestamp: u64,
    consensus_data: Value,
    height: u64,
}

impl Block {
    pub fn new(
        mut transactions: Vec<Transaction>,
        coinbase_tx: Transaction,
        previous_block_id: Id,
        timestamp: u64,
        consensus_data: Value,
        height: u64,
    ) -> Self {
        transactions.sort_by_cached_key(|tx| tx.id());
        transactions.dedup_by_key(|tx| tx.id());
        Block {
            transactions,
            coinbase_tx,
            previous_block_id,
            timestamp,
            consensus_data,
            height,
        }
    }

    /// Parse a block document, restoring the sorted-by-id invariant.
    pub fn from_value(value: Value) -> Result<Self> {
        let parsed: Block = serde_json::from_value(value)?;
        Ok(Block::new(
            parsed.transactions,
            parsed.coinbase_tx,
            parsed.previous_block_id,
            parsed.timestamp,
            parsed.consensus_data,
            parsed.height,
        ))
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn coinbase_tx(&self) -> &Transaction {
        &self.coinbase_tx
    }

    pub fn previous_block_id(&self) -> &Id {
        &self.previous_block_id
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn consensus_data(&self) -> &Value {
        &self.consensus_data
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn document(&self) -> Value {
        json!({
            "transactions": self.transactions.iter().map(Transaction::document).collect::<Vec<_>>(),
            "coinbase_tx": self.coinbase_tx.document(),
            "previous_block_id": self.previous_block_id.to_hex(),
            "timestamp": self.timestamp,
            "consensus_data": self.consensus_data,
            "height": self.height,
        })
    }

    /// Block id over the transaction id set, coinbase id, previous id,
    /// timestamp and consensus data. Height does not contribute.
    pub fn id(&self) -> Id {
        Id::of(&json!({
            "transactions": self.transactions.iter().map(|tx| tx.id().to_hex()).collect::<Vec<_>>(),
            "coinbase_tx": self.coinbase_tx.id().to_hex(),
            "previous_block_id": self.previous_block_id.to_hex(),
            "timestamp": self.timestamp,
            "consensus_data": self.consensus_data,
        }))
    }
}

/// Stored form of an on-chain block: transaction bodies replaced by ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbBlock {
    pub id: Id,
    pub transactions: Vec<Id>,
    pub coinbase_tx: Id,
    pub previous_block_id: Id,
    pub timestamp: u64,
    pub consensus_data: Value,
    pub height: u64,
}

impl DbBlock {
    /// Stored form at the block's own height.
    pub fn from_block(block: &Block) -> Self {
        Self::at_height(block, block.height())
    }

    /// Stored form at an externally determined height; submission computes
    /// the height from the parent rather than trusting the block body.
    pub fn at_height(block: &Block, height: u64) -> Self {
        DbBlock {
            id: block.id(),
            transactions: block.transactions().iter().map(Transaction::id).collect(),
            coinbase_tx: block.coinbase_tx().id(),
            previous_block_id: block.previous_block_id().clone(),
            timestamp: block.timestamp(),
            consensus_data: block.consensus_data().clone(),
            height,
        }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(ChainError::from)
    }

    pub fn document(&self) -> Value {
        json!({
            "id": self.id.to_hex(),
            "transactions": self.transactions.iter().map(Id::to_hex).collect::<Vec<_>>(),
            "coinbase_tx": self.coinbase_tx.to_hex(),
            "previous_block_id": self.previous_block_id.to_hex(),
            "timestamp": self.timestamp,
            "consensus_data": self.consensus_data,
            "height": self.height,
        })
    }
}

/// The ledger engine. Owns the storage tables and the mempool; consensus
/// policy and script evaluation are supplied by the embedder.
pub struct Blockchain {
    pub(crate) storage: Storage,
    pub(crate) blocks: Table,
    pub(crate) transactions: Table,
    pub(crate) candidates: Table,
    pub(crate) utxo_index: UtxoIndex,
    pub(crate) mempool: Mempool,
    pub(crate) consensus: Box<dyn Consensus>,
    pub(crate) contract: Box<dyn ContractEvaluator>,
    genesis_block_id: Option<Id>,
}

impl Blockchain {
    pub fn new(
        storage: Storage,
        consensus: Box<dyn Consensus>,
        contract: Box<dyn ContractEvaluator>,
    ) -> Self {
        Blockchain {
            storage,
            blocks: Table::new("blocks"),
            transactions: Table::new("transactions"),
            candidates: Table::new("candidates"),
            utxo_index: UtxoIndex::new(),
            mempool: Mempool::new(),
            consensus,
            contract,
            genesis_block_id: None,
        }
    }

    /// Open the store named by `config` and build an engine on it.
    pub fn from_config(
        config: &crate::config::Config,
        consensus: Box<dyn Consensus>,
        contract: Box<dyn ContractEvaluator>,
    ) -> Result<Self> {
        let storage = Storage::open(Path::new(&config.database.path))?;
        Ok(Self::new(storage, consensus, contract))
    }

    /// Bring up the chain. When no tip exists the store is cleared and a
    /// genesis block is imported from `genesis_file`; if the file is absent
    /// or invalid a fresh genesis is generated from an ephemeral key pair
    /// and written there. Idempotent after the first success.
    pub fn load_chain(&mut self, genesis_file: &Path) -> Result<()> {
        let dbtx = self.storage.begin();
        let tip_exists = self.blocks.get(&dbtx, TIP_KEY)?.is_some();
        dbtx.abort();

        if !tip_exists {
            self.storage.clear()?;

            let mut new_genesis_block = false;
            match fs::read_to_string(genesis_file) {
                Ok(text) => {
                    let parsed = serde_json::from_str::<Value>(&text)
                        .map_err(ChainError::from)
                        .and_then(Block::from_value);
                    match parsed {
                        Ok(genesis) => {
                            if self.submit_committing(genesis, true)?.accepted() {
                                info!("successfully imported genesis block");
                            } else {
                                warn!("failed to import genesis block");
                                new_genesis_block = true;
                            }
                        }
                        Err(err) => {
                            warn!("could not parse genesis block file: {}", err);
                            new_genesis_block = true;
                        }
                    }
                }
                Err(_) => {
                    warn!("failed to open genesis block file");
                    new_genesis_block = true;
                }
            }

            if new_genesis_block {
                info!("generating new genesis block");
                let keys = KeyPair::generate()?;
                let genesis = self.generate_verifying_block(&keys.public_key_hex())?;

                if !self.submit_committing(genesis.clone(), true)?.accepted() {
                    error!("failed to import new genesis block");
                }

                fs::write(genesis_file, serde_json::to_string_pretty(&genesis.document())?)?;
            }
        }

        let genesis = self.get_block_by_height(1)?;
        self.genesis_block_id = Some(genesis.id());
        Ok(())
    }

    pub fn genesis_block_id(&self) -> Option<&Id> {
        self.genesis_block_id.as_ref()
    }

    /// Validate a transaction and admit it to the mempool. Commits the store
    /// transaction only on acceptance.
    pub fn submit_transaction(&mut self, tx: Transaction) -> Result<Verdict> {
        let mut dbtx = self.storage.begin();
        let verdict = self.submit_transaction_with(&mut dbtx, tx)?;
        if verdict.accepted() {
            dbtx.commit()?;
        }
        Ok(verdict)
    }

    /// Run a block through the submission state machine. Commits the store
    /// transaction only on acceptance.
    pub fn submit_block(&mut self, block: Block) -> Result<Verdict> {
        self.submit_committing(block, false)
    }

    fn submit_committing(&mut self, block: Block, genesis: bool) -> Result<Verdict> {
        let mut dbtx = self.storage.begin();
        let verdict = self.submit_block_with(&mut dbtx, block, genesis)?;
        if verdict.accepted() {
            dbtx.commit()?;
        }
        Ok(verdict)
    }

    pub(crate) fn submit_transaction_with(
        &mut self,
        dbtx: &mut StoreTransaction,
        tx: Transaction,
    ) -> Result<Verdict> {
        let verdict = self.verify_transaction(dbtx, &tx, false)?;
        if !verdict.accepted() {
            info!("failed to verify transaction {}", tx.id());
            return Ok(verdict);
        }

        if !self.consensus.submit_transaction(dbtx, &tx)? {
            info!("consensus rejected transaction {}", tx.id());
            return Ok(Verdict::invalid());
        }

        let id = tx.id();
        if self.mempool.insert(tx) {
            info!("received transaction {}", id);
            Ok(Verdict::Accepted)
        } else {
            info!("transaction {} has a mempool conflict", id);
            Ok(Verdict::transient())
        }
    }

    fn submit_block_with(
        &mut self,
        dbtx: &mut StoreTransaction,
        block: Block,
        genesis: bool,
    ) -> Result<Verdict> {
        let id = block.id();
        let id_hex = id.to_hex();

        if self.blocks.get(dbtx, &id_hex)?.is_some() {
            info!("block {} is already in the main chain", id);
            return Ok(Verdict::Accepted);
        }

        let mut height = 1u64;
        let mut only_save = false;

        if !genesis {
            let previous_hex = block.previous_block_id().to_hex();
            let previous = match self.blocks.get(dbtx, &previous_hex)? {
                Some(doc) => DbBlock::from_value(doc)?,
                None => match self.candidates.get(dbtx, &previous_hex)? {
                    Some(doc) => DbBlock::from_block(&Block::from_value(doc)?),
                    None => {
                        info!("previous block of {} does not exist", id);
                        return Ok(Verdict::invalid());
                    }
                },
            };

            if !self.consensus.check_consensus_rules(dbtx, &block, &previous)? {
                info!("consensus rules cannot verify block {}", id);
                return Ok(Verdict::invalid());
            }

            let tip = self.get_block_db(dbtx, TIP_KEY)?;
            if previous.id != tip.id {
                // The block does not lead on from the tip. Reorg if its
                // branch should have won, otherwise keep it as a candidate.
                if self.consensus.is_block_better(dbtx, &block, &tip)? {
                    info!("forking the chain to {}", id);
                    if !self.reorg_chain(dbtx, block.previous_block_id())? {
                        info!("alternative chain is not valid");
                        return Ok(Verdict::invalid());
                    }
                    height = self.get_block_db(dbtx, TIP_KEY)?.height + 1;
                } else {
                    warn!("block {} has less backing than the current chain", id);
                    height = self.get_block_db(dbtx, &previous_hex)?.height + 1;
                    only_save = true;
                }
            } else {
                height = tip.height + 1;
            }
        }

        if !only_save {
            let txs = block.transactions();
            if !txs.is_empty() {
                let engine: &Blockchain = &*self;
                let snapshot: &StoreTransaction = &*dbtx;
                let workers = thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1);
                let chunk_size = txs.len().div_ceil(workers);
                let failed = AtomicBool::new(false);

                let outcome: Result<()> = thread::scope(|scope| {
                    let mut handles = Vec::new();
                    for batch in txs.chunks(chunk_size) {
                        let failed = &failed;
                        handles.push(scope.spawn(move || -> Result<()> {
                            for tx in batch {
                                if failed.load(Ordering::Relaxed) {
                                    break;
                                }
                                if !engine.verify_transaction(snapshot, tx, false)?.accepted() {
                                    failed.store(true, Ordering::Relaxed);
                                    break;
                                }
                            }
                            Ok(())
                        }));
                    }
                    for handle in handles {
                        handle.join().map_err(|_| {
                            ChainError::InternalError(
                                "block validation worker panicked".to_string(),
                            )
                        })??;
                    }
                    Ok(())
                });
                outcome?;

                if failed.load(Ordering::Relaxed) {
                    info!("a transaction of block {} could not be verified", id);
                    return Ok(Verdict::invalid());
                }
            }

            let mut fees = 0u64;
            for tx in block.transactions() {
                fees = fees.saturating_add(self.calculate_transaction_fee(dbtx, tx)?);
            }

            if !self.verify_transaction(dbtx, block.coinbase_tx(), true)?.accepted() {
                info!("coinbase transaction of block {} could not be verified", id);
                return Ok(Verdict::invalid());
            }

            let mut coinbase_total = 0u64;
            for output in block.coinbase_tx().outputs() {
                coinbase_total = coinbase_total.saturating_add(output.value);
            }

            if coinbase_total > fees.saturating_add(block_reward(height)) {
                info!("coinbase output of block {} is not the correct value", id);
                return Ok(Verdict::invalid());
            }

            if !self.consensus.submit_block(dbtx, &block)? {
                info!("consensus submit callback rejected block {}", id);
                return Ok(Verdict::invalid());
            }

            self.confirm_transaction(dbtx, block.coinbase_tx(), &id, true)?;
            for tx in block.transactions() {
                self.confirm_transaction(dbtx, tx, &id, false)?;
            }
        }

        if only_save {
            let mut doc = block.document();
            doc["height"] = json!(height);
            self.candidates.put(dbtx, &id_hex, &doc);
        } else {
            let stored = DbBlock::at_height(&block, height).document();
            self.candidates.erase(dbtx, &id_hex);
            self.blocks.put(dbtx, TIP_KEY, &stored);
            self.blocks
                .put_index(dbtx, &height.to_string(), &json!(id_hex.clone()), HEIGHT_INDEX);
            self.blocks.put(dbtx, &id_hex, &stored);
            self.rescan_mempool(dbtx)?;
        }

        if genesis {
            self.genesis_block_id = Some(id.clone());
        }

        info!("successfully submitted block {} at height {}", id, height);
        Ok(Verdict::Accepted)
    }

    /// Move a validated transaction into the confirmed set: spend its
    /// inputs, create its outputs and record it against the confirming
    /// block. The consensus hook is advisory; a refusal is logged only.
    fn confirm_transaction(
        &mut self,
        dbtx: &mut StoreTransaction,
        tx: &Transaction,
        confirming_block: &Id,
        coinbase: bool,
    ) -> Result<()> {
        if !self.consensus.confirm_transaction(dbtx, tx)? {
            error!("consensus rules failed to confirm transaction {}", tx.id());
        }

        for input in tx.inputs() {
            self.utxo_index.spend_output(dbtx, input)?;
        }

        let tx_id = tx.id();
        for output in tx.outputs() {
            self.utxo_index.create_output(dbtx, output, &tx_id)?;
        }

        self.transactions.put(
            dbtx,
            &tx_id.to_hex(),
            &DbTransaction::from_transaction(tx, confirming_block, coinbase).document(),
        );

        self.mempool.remove(tx);
        Ok(())
    }

    /// Undo the current tip: outputs it created leave the spendable set,
    /// outputs it spent return, its record moves to the candidate pool and
    /// its transactions are replayed into the mempool where still valid.
    pub fn reverse_block(&mut self, dbtx: &mut StoreTransaction) -> Result<()> {
        let tip_db = self.get_block_db(dbtx, TIP_KEY)?;
        let tip = self.build_block(dbtx, &tip_db)?;

        for output in tip.coinbase_tx().outputs() {
            self.utxo_index.revert_output(dbtx, output)?;
        }
        self.transactions
            .erase(dbtx, &tip.coinbase_tx().id().to_hex());

        let mut replay = Vec::new();
        for tx in tip.transactions() {
            for output in tx.outputs() {
                self.utxo_index.revert_output(dbtx, output)?;
            }
            for input in tx.inputs() {
                self.utxo_index.revert_spend(dbtx, input)?;
            }
            self.transactions.erase(dbtx, &tx.id().to_hex());
            replay.push(tx.clone());
        }

        self.blocks
            .erase_index(dbtx, &tip_db.height.to_string(), HEIGHT_INDEX);
        self.blocks.erase(dbtx, &tip_db.id.to_hex());
        let previous = self.get_block_db(dbtx, &tip.previous_block_id().to_hex())?;
        self.blocks.put(dbtx, TIP_KEY, &previous.document());

        self.candidates
            .put(dbtx, &tip_db.id.to_hex(), &tip.document());

        self.rescan_mempool(dbtx)?;

        for tx in replay {
            let tx_id = tx.id();
            if !self.submit_transaction_with(dbtx, tx)?.accepted() {
                warn!("previously confirmed transaction {} is now invalid", tx_id);
            }
        }

        Ok(())
    }

    /// Switch the main chain to the candidate branch ending at `new_tip_id`:
    /// reverse down to the fork point, then apply the branch oldest-first.
    /// Returns false when the branch fails to verify; durable state is safe
    /// either way because the caller never commits a failing submission.
    fn reorg_chain(&mut self, dbtx: &mut StoreTransaction, new_tip_id: &Id) -> Result<bool> {
        // Walk the candidate branch backwards until it leaves the pool.
        let mut branch = Vec::new();
        let mut cursor = new_tip_id.clone();
        while let Some(doc) = self.candidates.get(dbtx, &cursor.to_hex())? {
            let block = Block::from_value(doc)?;
            cursor = block.previous_block_id().clone();
            branch.push(block);
        }

        // Fork point: parent of the deepest candidate, or the new tip itself
        // when its parent is already on the main chain.
        let fork_id = match branch.last() {
            Some(block) => block.previous_block_id().clone(),
            None => new_tip_id.clone(),
        };

        loop {
            let tip = self.get_block_db(dbtx, TIP_KEY)?;
            if tip.id == fork_id {
                break;
            }
            if tip.height <= 1 {
                warn!("fork point {} is not on the main chain", fork_id);
                return Ok(false);
            }
            self.reverse_block(dbtx)?;
        }

        while let Some(block) = branch.pop() {
            if !self.submit_block_with(dbtx, block, false)?.accepted() {
                warn!("new chain failed to verify during reorg");
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Revalidate every mempool member against the current store state and
    /// drop the ones that no longer verify. Run after any main-chain change.
    fn rescan_mempool(&mut self, dbtx: &StoreTransaction) -> Result<()> {
        let mut removals = Vec::new();
        for tx in self.mempool.transactions() {
            if !self.verify_transaction(dbtx, &tx, false)?.accepted() {
                removals.push(tx);
            }
        }
        for tx in &removals {
            self.mempool.remove(tx);
        }
        Ok(())
    }

    /// Assemble an unsigned candidate block on the current tip (or as
    /// genesis) from the mempool selection, paying the subsidy plus fees to
    /// `public_key`.
    pub fn generate_verifying_block(&self, public_key: &str) -> Result<Block> {
        let dbtx = self.storage.begin();

        let selection = self.mempool.selection();

        let (height, previous_block_id, genesis) = match self.tip(&dbtx)? {
            Some(tip) => (tip.height + 1, tip.id, false),
            None => (1, Id::zero(), true),
        };

        let now = Utc::now().timestamp() as u64;

        let mut value = block_reward(height);
        for tx in &selection {
            value = value.saturating_add(self.calculate_transaction_fee(&dbtx, tx)?);
        }

        let nonce = rand::random::<u32>() as u64;
        let coinbase_tx = Transaction::new(
            Vec::new(),
            vec![Output::new(value, nonce, json!({ "publicKey": public_key }))],
            now,
            true,
        );

        let consensus_data = if genesis {
            Value::Null
        } else {
            self.consensus
                .generate_consensus_data(&dbtx, &previous_block_id, public_key)?
        };

        Ok(Block::new(
            selection,
            coinbase_tx,
            previous_block_id,
            now,
            consensus_data,
            height,
        ))
    }

    pub fn get_block(&self, id: &Id) -> Result<Block> {
        let dbtx = self.storage.begin();
        let db_block = self.get_block_db(&dbtx, &id.to_hex())?;
        self.build_block(&dbtx, &db_block)
    }

    pub fn get_block_by_height(&self, height: u64) -> Result<Block> {
        let dbtx = self.storage.begin();
        let id_hex = self
            .blocks
            .get_index(&dbtx, &height.to_string(), HEIGHT_INDEX)?
            .and_then(|value| value.as_str().map(String::from))
            .ok_or(ChainError::NotFound("Block at height", height.to_string()))?;
        let db_block = self.get_block_db(&dbtx, &id_hex)?;
        self.build_block(&dbtx, &db_block)
    }

    pub fn get_transaction(&self, id: &Id) -> Result<Transaction> {
        let dbtx = self.storage.begin();
        self.get_transaction_with(&dbtx, id)
    }

    /// The head of the main chain.
    pub fn get_tip(&self) -> Result<DbBlock> {
        let dbtx = self.storage.begin();
        self.get_block_db(&dbtx, TIP_KEY)
    }

    pub fn get_output(&self, id: &Id) -> Result<DbOutput> {
        let dbtx = self.storage.begin();
        self.utxo_index.output(&dbtx, id)
    }

    pub fn get_unspent_outputs(&self, public_key: &str) -> Result<Vec<DbOutput>> {
        let dbtx = self.storage.begin();
        self.utxo_index.unspent_by_owner(&dbtx, public_key)
    }

    pub fn get_spent_outputs(&self, public_key: &str) -> Result<Vec<DbOutput>> {
        let dbtx = self.storage.begin();
        self.utxo_index.spent_by_owner(&dbtx, public_key)
    }

    pub fn get_unconfirmed_transactions(&self) -> Vec<Transaction> {
        self.mempool.transactions()
    }

    pub fn mempool_count(&self) -> usize {
        self.mempool.count()
    }

    pub fn mempool_size(&self) -> u64 {
        self.mempool.size()
    }

    /// A fresh store transaction for external readers. Dropping the handle
    /// releases it on every exit path.
    pub fn tx_handle(&self) -> StoreTransaction {
        self.storage.begin()
    }

    /// The current tip, or `None` before any block landed.
    fn tip(&self, dbtx: &StoreTransaction) -> Result<Option<DbBlock>> {
        match self.blocks.get(dbtx, TIP_KEY)? {
            Some(doc) => Ok(Some(DbBlock::from_value(doc)?)),
            None => Ok(None),
        }
    }

    /// Stored block by key (`"tip"`, or an id hex), falling back to the
    /// candidate pool for blocks off the main chain.
    pub(crate) fn get_block_db(&self, dbtx: &StoreTransaction, key: &str) -> Result<DbBlock> {
        if let Some(doc) = self.blocks.get(dbtx, key)? {
            return DbBlock::from_value(doc);
        }
        if let Some(doc) = self.candidates.get(dbtx, key)? {
            return Ok(DbBlock::from_block(&Block::from_value(doc)?));
        }
        Err(ChainError::NotFound("Block", key.to_string()))
    }

    /// Reconstruct full transaction bodies for a stored block. Candidates
    /// whose transactions were never confirmed come back from the candidate
    /// pool instead.
    pub(crate) fn build_block(&self, dbtx: &StoreTransaction, db_block: &DbBlock) -> Result<Block> {
        match self.assemble_block(dbtx, db_block) {
            Ok(block) => Ok(block),
            Err(ChainError::NotFound(kind, missing)) => {
                if let Some(doc) = self.candidates.get(dbtx, &db_block.id.to_hex())? {
                    Block::from_value(doc)
                } else {
                    Err(ChainError::NotFound(kind, missing))
                }
            }
            Err(err) => Err(err),
        }
    }

    fn assemble_block(&self, dbtx: &StoreTransaction, db_block: &DbBlock) -> Result<Block> {
        let mut transactions = Vec::new();
        for tx_id in &db_block.transactions {
            transactions.push(self.get_transaction_with(dbtx, tx_id)?);
        }
        let coinbase_tx = self.get_transaction_with(dbtx, &db_block.coinbase_tx)?;

        Ok(Block::new(
            transactions,
            coinbase_tx,
            db_block.previous_block_id.clone(),
            db_block.timestamp,
            db_block.consensus_data.clone(),
            db_block.height,
        ))
    }

    fn get_transaction_with(&self, dbtx: &StoreTransaction, id: &Id) -> Result<Transaction> {
        let doc = self
            .transactions
            .get(dbtx, &id.to_hex())?
            .ok_or(ChainError::NotFound("Transaction", id.to_hex()))?;
        let db_tx = DbTransaction::from_value(doc)?;

        let mut outputs = Vec::new();
        for output_id in &db_tx.outputs {
            outputs.push(self.utxo_index.output(dbtx, output_id)?.to_output());
        }

        let mut inputs = Vec::new();
        for input_id in &db_tx.inputs {
            inputs.push(self.utxo_index.input(dbtx, input_id)?);
        }

        Ok(Transaction::new(
            inputs,
            outputs,
            db_tx.timestamp,
            db_tx.coinbase,
        ))
    }
}
