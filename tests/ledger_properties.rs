//! Ledger invariants: monetary conservation, UTXO/STXO partitioning,
//! per-owner index consistency, reorg reversibility and signature binding

use emberchain::blockchain::{Blockchain, Verdict};
use emberchain::consensus::Regtest;
use emberchain::contract::Passthrough;
use emberchain::crypto::KeyPair;
use emberchain::economics::block_reward;
use emberchain::storage::{MemoryStore, Storage};
use emberchain::transaction::{Input, Output, Transaction};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

const TEST_FEE: u64 = 1_000_000;

fn new_chain() -> (Blockchain, Arc<MemoryStore>, TempDir) {
    let backend = Arc::new(MemoryStore::new());
    let storage = Storage::new(backend.clone());
    let mut chain = Blockchain::new(storage, Box::new(Regtest::new()), Box::new(Passthrough));

    let dir = TempDir::new().unwrap();
    chain.load_chain(&dir.path().join("genesis.json")).unwrap();
    (chain, backend, dir)
}

fn mine_next(chain: &mut Blockchain, public_key: &str) {
    let block = chain.generate_verifying_block(public_key).unwrap();
    assert!(chain.submit_block(block).unwrap().accepted());
}

/// A chain where `keys` mined a block, spent its coinbase to `recipient`
/// and a third party confirmed the spend.
fn chain_with_confirmed_spend(
) -> (Blockchain, Arc<MemoryStore>, TempDir, KeyPair, KeyPair, Transaction) {
    let (mut chain, backend, dir) = new_chain();
    let keys = KeyPair::generate().unwrap();
    let recipient = KeyPair::generate().unwrap();

    mine_next(&mut chain, &keys.public_key_hex());

    let utxos = chain.get_unspent_outputs(&keys.public_key_hex()).unwrap();
    let outputs = vec![Output::new(
        utxos[0].value - TEST_FEE,
        1,
        json!({ "publicKey": recipient.public_key_hex() }),
    )];

    let shell = Transaction::new(Vec::new(), outputs.clone(), 1_700_000_000, false);
    let message = format!(
        "{}{}",
        utxos[0].id().to_hex(),
        shell.output_set_id().to_hex()
    );
    let signature = keys.sign(&message).unwrap();
    let tx = Transaction::new(
        vec![Input::new(utxos[0].id(), json!({ "signature": signature }))],
        outputs,
        1_700_000_000,
        false,
    );

    assert!(chain.submit_transaction(tx.clone()).unwrap().accepted());
    let miner = KeyPair::generate().unwrap();
    mine_next(&mut chain, &miner.public_key_hex());

    (chain, backend, dir, keys, recipient, tx)
}

#[test]
fn test_conservation_and_coinbase_bound() {
    let (chain, _, _dir, _, _, _) = chain_with_confirmed_spend();

    let tip_height = chain.get_tip().unwrap().height;
    for height in 1..=tip_height {
        let block = chain.get_block_by_height(height).unwrap();

        let mut fees = 0u64;
        for tx in block.transactions() {
            assert!(!tx.is_coinbase());

            // Conservation: a confirmed transaction never creates more value
            // than it spends.
            let input_total: u64 = tx
                .inputs()
                .iter()
                .map(|input| chain.get_output(&input.output_id).unwrap().value)
                .sum();
            let output_total: u64 = tx.outputs().iter().map(|out| out.value).sum();
            assert!(input_total >= output_total);
            fees += input_total - output_total;
        }

        // Coinbase bound: subsidy plus fees caps the coinbase claim.
        let coinbase_total: u64 = block
            .coinbase_tx()
            .outputs()
            .iter()
            .map(|out| out.value)
            .sum();
        assert!(coinbase_total <= fees + block_reward(height));
    }
}

#[test]
fn test_utxo_stxo_partition_and_owner_indexes() {
    let (chain, _, _dir, keys, recipient, tx) = chain_with_confirmed_spend();

    for owner in [keys.public_key_hex(), recipient.public_key_hex()] {
        let unspent: Vec<_> = chain
            .get_unspent_outputs(&owner)
            .unwrap()
            .iter()
            .map(|out| out.id())
            .collect();
        let spent: Vec<_> = chain
            .get_spent_outputs(&owner)
            .unwrap()
            .iter()
            .map(|out| out.id())
            .collect();

        // No id sits in both partitions, every listed output resolves, and
        // every resolved output really carries this owner's key.
        for id in unspent.iter().chain(spent.iter()) {
            assert!(!(unspent.contains(id) && spent.contains(id)));
            let output = chain.get_output(id).unwrap();
            assert_eq!(output.public_key(), Some(owner.as_str()));
        }
    }

    // Every consumed input refers to an output that is now spent.
    let spender = keys.public_key_hex();
    for input in tx.inputs() {
        assert!(chain.get_output(&input.output_id).is_ok());
        assert!(!chain
            .get_unspent_outputs(&spender)
            .unwrap()
            .iter()
            .any(|out| out.id() == input.output_id));
    }
}

#[test]
fn test_reverse_block_restores_prior_state() {
    let (mut chain, backend, _dir) = new_chain();
    let keys = KeyPair::generate().unwrap();
    let recipient = KeyPair::generate().unwrap();

    mine_next(&mut chain, &keys.public_key_hex());

    let utxos = chain.get_unspent_outputs(&keys.public_key_hex()).unwrap();
    let outputs = vec![Output::new(
        utxos[0].value - TEST_FEE,
        1,
        json!({ "publicKey": recipient.public_key_hex() }),
    )];
    let shell = Transaction::new(Vec::new(), outputs.clone(), 1_700_000_000, false);
    let message = format!(
        "{}{}",
        utxos[0].id().to_hex(),
        shell.output_set_id().to_hex()
    );
    let signature = keys.sign(&message).unwrap();
    let tx = Transaction::new(
        vec![Input::new(utxos[0].id(), json!({ "signature": signature }))],
        outputs,
        1_700_000_000,
        false,
    );
    assert!(chain.submit_transaction(tx.clone()).unwrap().accepted());

    // Snapshot, confirm the spend, then reverse the tip.
    let non_candidates = |backend: &MemoryStore| {
        backend
            .snapshot()
            .into_iter()
            .filter(|((table, _, _), _)| table != "candidates")
            .collect::<Vec<_>>()
    };
    let before = non_candidates(&backend);

    let block = chain
        .generate_verifying_block(&KeyPair::generate().unwrap().public_key_hex())
        .unwrap();
    let reversed_id = block.id();
    assert!(chain.submit_block(block).unwrap().accepted());
    assert_ne!(non_candidates(&backend), before);

    let mut dbtx = chain.tx_handle();
    chain.reverse_block(&mut dbtx).unwrap();
    dbtx.commit().unwrap();

    // Every table except the candidate pool is back to its prior contents,
    // the reversed block is a candidate, and the spend is replayed into the
    // mempool.
    assert_eq!(non_candidates(&backend), before);
    assert_eq!(chain.get_block(&reversed_id).unwrap().id(), reversed_id);
    assert!(chain
        .get_unconfirmed_transactions()
        .iter()
        .any(|member| member.id() == tx.id()));
}

#[test]
fn test_mempool_members_stay_valid_after_chain_changes() {
    let (mut chain, _, _dir) = new_chain();
    let keys = KeyPair::generate().unwrap();
    let pk = keys.public_key_hex();

    mine_next(&mut chain, &pk);
    let utxos = chain.get_unspent_outputs(&pk).unwrap();
    let outputs = vec![Output::new(
        utxos[0].value - TEST_FEE,
        1,
        json!({ "publicKey": pk }),
    )];
    let shell = Transaction::new(Vec::new(), outputs.clone(), 1_700_000_000, false);
    let message = format!(
        "{}{}",
        utxos[0].id().to_hex(),
        shell.output_set_id().to_hex()
    );
    let signature = keys.sign(&message).unwrap();
    let tx = Transaction::new(
        vec![Input::new(utxos[0].id(), json!({ "signature": signature }))],
        outputs,
        1_700_000_000,
        false,
    );
    assert!(chain.submit_transaction(tx).unwrap().accepted());

    // The next block confirms the member; rescan leaves nothing stale.
    mine_next(&mut chain, &pk);
    assert_eq!(chain.mempool_count(), 0);

    // Everything still unconfirmed must verify against the new tip.
    let handle = chain.tx_handle();
    for member in chain.get_unconfirmed_transactions() {
        assert!(chain
            .verify_transaction(&handle, &member, false)
            .unwrap()
            .accepted());
    }
}

#[test]
fn test_tampered_output_set_invalidates_signatures() {
    let (mut chain, _, _dir) = new_chain();
    let keys = KeyPair::generate().unwrap();
    let recipient = KeyPair::generate().unwrap().public_key_hex();

    mine_next(&mut chain, &keys.public_key_hex());
    let utxos = chain.get_unspent_outputs(&keys.public_key_hex()).unwrap();

    let outputs = vec![Output::new(
        utxos[0].value - TEST_FEE,
        1,
        json!({ "publicKey": recipient }),
    )];
    let shell = Transaction::new(Vec::new(), outputs.clone(), 1_700_000_000, false);
    let message = format!(
        "{}{}",
        utxos[0].id().to_hex(),
        shell.output_set_id().to_hex()
    );
    let signature = keys.sign(&message).unwrap();
    let inputs = vec![Input::new(utxos[0].id(), json!({ "signature": signature }))];

    // Redirect the value without re-signing: the signature no longer covers
    // the output set, so the spend is rejected outright.
    let tampered_outputs = vec![Output::new(
        utxos[0].value - TEST_FEE,
        2,
        json!({ "publicKey": recipient }),
    )];
    let tampered = Transaction::new(inputs.clone(), tampered_outputs, 1_700_000_000, false);
    assert_eq!(
        chain.submit_transaction(tampered).unwrap(),
        Verdict::Rejected { permanent: true }
    );

    // The untampered transaction is accepted.
    let genuine = Transaction::new(inputs, outputs, 1_700_000_000, false);
    assert!(chain.submit_transaction(genuine).unwrap().accepted());
}

#[test]
fn test_fork_choice_is_deterministic() {
    use emberchain::blockchain::Block;

    let dir = TempDir::new().unwrap();
    let genesis_path = dir.path().join("genesis.json");
    let pk = KeyPair::generate().unwrap().public_key_hex();

    let craft = |previous, height, better: bool, timestamp: u64| {
        let coinbase = Transaction::new(
            Vec::new(),
            vec![Output::new(
                block_reward(height),
                timestamp,
                json!({ "publicKey": pk }),
            )],
            timestamp,
            true,
        );
        Block::new(
            Vec::new(),
            coinbase,
            previous,
            timestamp,
            json!({ "better": better }),
            height,
        )
    };

    let run = |stream: &[Block]| {
        let mut chain = Blockchain::new(
            Storage::in_memory(),
            Box::new(Regtest::new()),
            Box::new(Passthrough),
        );
        chain.load_chain(&genesis_path).unwrap();
        for block in stream {
            chain.submit_block(block.clone()).unwrap();
        }
        chain.get_tip().unwrap().id
    };

    // First load writes the genesis file; build the stream on top of it.
    let mut seed = Blockchain::new(
        Storage::in_memory(),
        Box::new(Regtest::new()),
        Box::new(Passthrough),
    );
    seed.load_chain(&genesis_path).unwrap();
    let genesis_id = seed.genesis_block_id().unwrap().clone();

    let b1 = craft(genesis_id.clone(), 2, false, 1_700_000_000);
    let b2 = craft(b1.id(), 3, false, 1_700_000_001);
    let b2_prime = craft(genesis_id, 2, false, 1_700_000_002);
    let b3_prime = craft(b2_prime.id(), 3, true, 1_700_000_003);
    let stream = vec![b1, b2, b2_prime, b3_prime.clone()];

    let first = run(&stream);
    let second = run(&stream);
    assert_eq!(first, second);
    assert_eq!(first, b3_prime.id());
}
