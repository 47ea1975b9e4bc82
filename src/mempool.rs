//! In-memory pool of unconfirmed transactions
//!
//! The pool indexes every input and every output id its members touch, so a
//! conflicting spend (or a duplicated output) is refused at insertion time.
//! The chain manager revalidates the pool after every change to the main
//! chain and drops members that no longer verify.

use crate::ids::Id;
use crate::transaction::Transaction;
use std::collections::{BTreeMap, HashMap};

/// Upper bound on the cumulative canonical size of a block's selected
/// transactions: ⌊3.9 × 1024 × 1024⌋ bytes.
const SELECTION_BYTE_LIMIT: u64 = 4_089_446;

#[derive(Debug, Clone, Default)]
pub struct Mempool {
    txs: BTreeMap<Id, Transaction>,
    /// Input id → owning transaction id.
    inputs: HashMap<Id, Id>,
    /// Output id → transaction id. Holds both the outputs members create
    /// and the outputs they consume.
    outputs: HashMap<Id, Id>,
    bytes: u64,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a transaction, refusing any conflict with the current members.
    /// Returns false and leaves the pool untouched when the transaction is
    /// already present, reuses an indexed input, or touches an output id
    /// another member already created or consumed.
    pub fn insert(&mut self, tx: Transaction) -> bool {
        let tx_id = tx.id();
        if self.txs.contains_key(&tx_id) {
            return false;
        }

        for input in tx.inputs() {
            if self.inputs.contains_key(&input.id()) {
                return false;
            }
            if self.outputs.contains_key(&input.output_id) {
                return false;
            }
        }

        for output in tx.outputs() {
            if self.outputs.contains_key(&output.id()) {
                return false;
            }
        }

        self.bytes += tx.size();

        for input in tx.inputs() {
            self.inputs.insert(input.id(), tx_id.clone());
            self.outputs.insert(input.output_id.clone(), tx_id.clone());
        }

        for output in tx.outputs() {
            self.outputs.insert(output.id(), tx_id.clone());
        }

        self.txs.insert(tx_id, tx);
        true
    }

    /// Tear down a member's index entries. A transaction that is not in the
    /// pool is ignored.
    pub fn remove(&mut self, tx: &Transaction) {
        let tx_id = tx.id();
        if let Some(member) = self.txs.remove(&tx_id) {
            self.bytes -= member.size();

            for input in member.inputs() {
                self.inputs.remove(&input.id());
                self.outputs.remove(&input.output_id);
            }

            for output in member.outputs() {
                self.outputs.remove(&output.id());
            }
        }
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.txs.contains_key(id)
    }

    /// Snapshot of every member, in ascending id order.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.txs.values().cloned().collect()
    }

    /// Members to include in the next block, in ascending id order, stopping
    /// at the first transaction whose size would push the total past the
    /// byte limit.
    pub fn selection(&self) -> Vec<Transaction> {
        let mut total = 0u64;
        let mut selected = Vec::new();

        for tx in self.txs.values() {
            if total + tx.size() > SELECTION_BYTE_LIMIT {
                break;
            }
            total += tx.size();
            selected.push(tx.clone());
        }

        selected
    }

    pub fn count(&self) -> usize {
        self.txs.len()
    }

    /// Cumulative canonical size of the members, in bytes.
    pub fn size(&self) -> u64 {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{Input, Output};
    use serde_json::json;

    fn output(value: u64, nonce: u64) -> Output {
        Output::new(value, nonce, json!({"publicKey": "02abcd"}))
    }

    fn spend(consumed: &Output, produced_nonce: u64, timestamp: u64) -> Transaction {
        let input = Input::new(consumed.id(), json!({"signature": "00"}));
        Transaction::new(
            vec![input],
            vec![output(consumed.value, produced_nonce)],
            timestamp,
            false,
        )
    }

    #[test]
    fn test_insert_and_remove_account_bytes() {
        let mut pool = Mempool::new();
        let tx = spend(&output(10, 1), 2, 100);
        let size = tx.size();

        assert!(pool.insert(tx.clone()));
        assert_eq!(pool.count(), 1);
        assert_eq!(pool.size(), size);

        pool.remove(&tx);
        assert_eq!(pool.count(), 0);
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn test_duplicate_insert_refused() {
        let mut pool = Mempool::new();
        let tx = spend(&output(10, 1), 2, 100);
        assert!(pool.insert(tx.clone()));
        assert!(!pool.insert(tx));
        assert_eq!(pool.count(), 1);
    }

    #[test]
    fn test_conflicting_spend_refused() {
        let mut pool = Mempool::new();
        let consumed = output(10, 1);

        assert!(pool.insert(spend(&consumed, 2, 100)));
        // A different transaction consuming the same output must be refused
        // and leave the pool unchanged.
        let conflict = spend(&consumed, 3, 200);
        let before = pool.size();
        assert!(!pool.insert(conflict));
        assert_eq!(pool.count(), 1);
        assert_eq!(pool.size(), before);
    }

    #[test]
    fn test_duplicate_produced_output_refused() {
        let mut pool = Mempool::new();
        let a = spend(&output(10, 1), 7, 100);
        // Same produced output document from a different spend.
        let b = Transaction::new(
            vec![Input::new(output(10, 2).id(), json!({"signature": "01"}))],
            vec![output(10, 7)],
            100,
            false,
        );

        assert!(pool.insert(a));
        assert!(!pool.insert(b));
    }

    #[test]
    fn test_spending_a_pool_produced_output_refused() {
        let mut pool = Mempool::new();
        let first = spend(&output(10, 1), 2, 100);
        let produced = first.outputs()[0].clone();
        assert!(pool.insert(first));

        // The produced output is already indexed, so a chained spend
        // conflicts until the parent confirms.
        assert!(!pool.insert(spend(&produced, 3, 200)));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut pool = Mempool::new();
        let tx = spend(&output(10, 1), 2, 100);
        assert!(pool.insert(tx.clone()));

        pool.remove(&tx);
        pool.remove(&tx);
        assert_eq!(pool.count(), 0);
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn test_selection_respects_byte_limit() {
        let mut pool = Mempool::new();
        for nonce in 0..10u64 {
            // Pad the data document so each member is roughly 450 KiB.
            let data = json!({"publicKey": "02abcd", "pad": "x".repeat(450 * 1024)});
            let out = Output::new(1, nonce, data);
            let input = Input::new(output(1, nonce).id(), json!({"signature": "00"}));
            assert!(pool.insert(Transaction::new(vec![input], vec![out], nonce, false)));
        }

        let selected = pool.selection();
        assert!(selected.len() < pool.count());

        let total: u64 = selected.iter().map(Transaction::size).sum();
        assert!(total <= SELECTION_BYTE_LIMIT);
    }

    #[test]
    fn test_selection_order_is_deterministic() {
        let a = spend(&output(10, 1), 2, 100);
        let b = spend(&output(20, 2), 3, 200);

        let mut first = Mempool::new();
        assert!(first.insert(a.clone()));
        assert!(first.insert(b.clone()));

        let mut second = Mempool::new();
        assert!(second.insert(b));
        assert!(second.insert(a));

        let ids = |pool: &Mempool| -> Vec<_> {
            pool.selection().iter().map(Transaction::id).collect()
        };
        assert_eq!(ids(&first), ids(&second));
    }
}
