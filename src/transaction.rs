//! Transaction data model: outputs, inputs, transactions and their stored
//! forms

pub mod types;

pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::Id;
    use serde_json::json;

    fn output(value: u64, nonce: u64) -> Output {
        Output::new(value, nonce, json!({"publicKey": "02abcd"}))
    }

    #[test]
    fn test_output_id_is_stable() {
        let a = output(100, 7);
        let b = output(100, 7);
        assert_eq!(a.id(), b.id());

        let c = output(100, 8);
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn test_output_owner_accessors() {
        let owned = output(1, 1);
        assert_eq!(owned.public_key(), Some("02abcd"));
        assert!(!owned.has_contract());

        let scripted = Output::new(1, 1, json!({"contract": "return true"}));
        assert_eq!(scripted.public_key(), None);
        assert!(scripted.has_contract());

        let anyone = Output::new(1, 1, json!({}));
        assert_eq!(anyone.public_key(), None);
        assert!(!anyone.has_contract());
    }

    #[test]
    fn test_transaction_id_ignores_coinbase_flag() {
        let outputs = vec![output(50, 1)];
        let a = Transaction::new(Vec::new(), outputs.clone(), 1000, false);
        let b = Transaction::new(Vec::new(), outputs, 1000, true);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_inputs_and_outputs_sorted_by_id() {
        let outs = vec![output(1, 1), output(2, 2), output(3, 3)];
        let mut reversed = outs.clone();
        reversed.reverse();

        let a = Transaction::new(Vec::new(), outs, 5, false);
        let b = Transaction::new(Vec::new(), reversed, 5, false);
        assert_eq!(a.id(), b.id());
        assert_eq!(a.output_set_id(), b.output_set_id());

        let ids: Vec<_> = a.outputs().iter().map(Output::id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_output_set_id_binds_every_output() {
        let a = Transaction::new(Vec::new(), vec![output(10, 1), output(20, 2)], 5, false);
        let b = Transaction::new(Vec::new(), vec![output(10, 1), output(21, 2)], 5, false);
        assert_ne!(a.output_set_id(), b.output_set_id());
    }

    #[test]
    fn test_document_round_trip() {
        let input = Input::new(output(9, 9).id(), json!({"signature": "00ff"}));
        let tx = Transaction::new(vec![input], vec![output(5, 1)], 42, false);

        let parsed = Transaction::from_value(tx.document()).unwrap();
        assert_eq!(parsed.id(), tx.id());
        assert_eq!(parsed.size(), tx.size());
        assert!(!parsed.is_coinbase());
    }

    #[test]
    fn test_size_is_canonical_document_length() {
        let tx = Transaction::new(Vec::new(), vec![output(5, 1)], 42, true);
        assert_eq!(tx.size(), tx.document().to_string().len() as u64);
    }

    #[test]
    fn test_db_output_keeps_output_id() {
        let out = output(75, 3);
        let creating = Id::of_text("some tx");
        let stored = DbOutput::from_output(&out, &creating);
        assert_eq!(stored.id(), out.id());
        assert_eq!(stored.to_output(), out);

        let parsed = DbOutput::from_value(stored.document()).unwrap();
        assert_eq!(parsed.creating_tx_id, creating);
        assert_eq!(parsed.id(), out.id());
    }

    #[test]
    fn test_db_transaction_records_ids() {
        let input = Input::new(output(9, 9).id(), json!({}));
        let tx = Transaction::new(vec![input.clone()], vec![output(5, 1)], 42, false);
        let block = Id::of_text("a block");

        let stored = DbTransaction::from_transaction(&tx, &block, false);
        assert_eq!(stored.id, tx.id());
        assert_eq!(stored.inputs, vec![input.id()]);
        assert_eq!(stored.outputs, vec![tx.outputs()[0].id()]);
        assert_eq!(stored.confirming_block, block);

        let parsed = DbTransaction::from_value(stored.document()).unwrap();
        assert_eq!(parsed, stored);
    }
}
