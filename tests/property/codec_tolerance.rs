//! Property-based tests for the tolerant history codec.
//!
//! Uses proptest to verify:
//! 1. Random bytes never cause a panic in `decode_history` / `decode_sent`.
//! 2. Every well-formed record in an array survives decoding, in order.
//! 3. Junk items mixed into an array are skipped and counted, never fatal.
//! 4. Numeric and string ids decode to the same canonical identity.
//! 5. Blank string ids never name a record.

use deskchat_proto::codec::{self, DataEnvelope};
use deskchat_proto::message::{RawId, RawMessage};
use proptest::prelude::*;
use serde_json::{Value, json};

/// Strategy for generating arbitrary `RawId` values.
fn arb_raw_id() -> impl Strategy<Value = RawId> {
    prop_oneof![
        any::<i64>().prop_map(RawId::Number),
        "[a-z0-9-]{1,24}".prop_map(RawId::Text),
    ]
}

/// Strategy for generating arbitrary well-formed `RawMessage` values.
fn arb_raw_message() -> impl Strategy<Value = RawMessage> {
    (
        prop::option::of(arb_raw_id()),
        "[^\x00]{0,200}",
        prop::option::of(prop_oneof![Just("user".to_string()), Just("admin".to_string()), "[a-z]{1,8}"]),
        prop::option::of("[0-9T:Z -]{0,25}"),
    )
        .prop_map(|(id, message, from_role, created_at)| RawMessage {
            id,
            message,
            from_role,
            created_at,
        })
}

/// Strategy for JSON values that are never valid records.
fn arb_junk() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-z]{0,10}".prop_map(Value::String),
        any::<i64>().prop_map(|n| json!({ "id": n, "from_role": "admin" })),
    ]
}

proptest! {
    /// Random bytes never cause a panic when decoded as history.
    #[test]
    fn random_bytes_history_no_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = codec::decode_history(&bytes);
    }

    /// Random bytes never cause a panic when decoded as a send response.
    #[test]
    fn random_bytes_sent_no_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = codec::decode_sent(&bytes);
    }

    /// All well-formed records survive decoding in order, bare or enveloped.
    #[test]
    fn well_formed_records_survive(records in prop::collection::vec(arb_raw_message(), 0..20), wrap in any::<bool>()) {
        let bytes = if wrap {
            serde_json::to_vec(&DataEnvelope { data: records.clone() }).unwrap()
        } else {
            serde_json::to_vec(&records).unwrap()
        };
        let page = codec::decode_history(&bytes).unwrap();
        prop_assert_eq!(page.skipped, 0);
        prop_assert_eq!(page.records, records);
    }

    /// Junk items are skipped and counted; valid records keep their order.
    #[test]
    fn junk_items_are_skipped(
        records in prop::collection::vec(arb_raw_message(), 0..10),
        junk in prop::collection::vec(arb_junk(), 0..10),
    ) {
        let mut items: Vec<Value> = Vec::new();
        let mut junk_iter = junk.iter();
        for record in &records {
            items.push(serde_json::to_value(record).unwrap());
            if let Some(j) = junk_iter.next() {
                items.push(j.clone());
            }
        }
        items.extend(junk_iter.cloned());

        let page = codec::decode_history(&serde_json::to_vec(&items).unwrap()).unwrap();
        prop_assert_eq!(page.skipped, junk.len());
        prop_assert_eq!(page.records, records);
    }

    /// A numeric id and its decimal string name the same record.
    #[test]
    fn numeric_and_string_ids_agree(n in any::<i64>()) {
        let numeric = codec::decode_sent(json!({ "id": n, "message": "x" }).to_string().as_bytes()).unwrap();
        let textual = codec::decode_sent(json!({ "id": n.to_string(), "message": "x" }).to_string().as_bytes()).unwrap();
        prop_assert_eq!(
            numeric.id.and_then(|id| id.canonical()),
            textual.id.and_then(|id| id.canonical())
        );
    }

    /// Integral floats and wide integers still carry an identity.
    #[test]
    fn float_and_wide_ids_are_not_dropped(n in 0u32..1_000_000, wide in (1u64 << 63)..u64::MAX) {
        let float = codec::decode_sent(format!(r#"{{"id": {n}.0, "message": "x"}}"#).as_bytes()).unwrap();
        prop_assert_eq!(float.id.and_then(|id| id.canonical()), Some(n.to_string()));

        let big = codec::decode_sent(json!({ "id": wide, "message": "x" }).to_string().as_bytes()).unwrap();
        prop_assert_eq!(big.id.and_then(|id| id.canonical()), Some(wide.to_string()));
    }

    /// Whitespace-only ids decode but have no canonical identity.
    #[test]
    fn blank_ids_have_no_identity(blank in "[ \t]{0,6}") {
        let raw = codec::decode_sent(json!({ "id": blank, "message": "x" }).to_string().as_bytes()).unwrap();
        prop_assert_eq!(raw.id.clone(), Some(RawId::Text(blank)));
        prop_assert_eq!(raw.id.and_then(|id| id.canonical()), None);
    }
}
