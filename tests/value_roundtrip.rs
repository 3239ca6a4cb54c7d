//! Property tests: every supported value kind placed in a decision must be
//! retrievable by key with its original kind and value.

use proptest::prelude::*;
use serde_json::json;

use epd::signaling::decode::{decode_entries, transaction_id};
use epd::signaling::ValueKind;

proptest! {
    #[test]
    fn transaction_ids_round_trip(txid in any::<u32>()) {
        let params = json!([txid, []]);
        prop_assert_eq!(transaction_id(&params), Some(txid));
    }

    #[test]
    fn int_values_round_trip(key in "[a-z_]{1,12}", v in any::<i32>()) {
        let params = json!([1, [["s", [[[key.clone(), v]]]]]]);
        let decoded = decode_entries(&params);
        prop_assert!(decoded.well_formed);
        let d = &decoded.sets[0].decisions()[0];
        prop_assert_eq!(d.kind(&key), Some(ValueKind::Int));
        prop_assert_eq!(d.int(&key), Some(v));
    }

    #[test]
    fn float_values_round_trip(
        key in "[a-z_]{1,12}",
        v in any::<f64>().prop_filter("wire floats are finite", |x| x.is_finite()),
    ) {
        let params = json!([1, [["s", [[[key.clone(), v]]]]]]);
        let decoded = decode_entries(&params);
        prop_assert!(decoded.well_formed);
        let d = &decoded.sets[0].decisions()[0];
        prop_assert_eq!(d.kind(&key), Some(ValueKind::Float));
        prop_assert_eq!(d.float(&key), Some(v));
    }

    #[test]
    fn string_values_round_trip(key in "[a-z_]{1,12}", v in "\\PC{0,40}") {
        let params = json!([1, [["s", [[[key.clone(), v.clone()]]]]]]);
        let decoded = decode_entries(&params);
        prop_assert!(decoded.well_formed);
        let d = &decoded.sets[0].decisions()[0];
        prop_assert_eq!(d.kind(&key), Some(ValueKind::Str));
        prop_assert_eq!(d.str(&key), Some(v.as_str()));
    }

    #[test]
    fn mixed_decisions_round_trip(i in any::<i32>(), s in "\\PC{0,24}") {
        let params = json!([
            1,
            [["s", [[["count", i], ["ratio", 0.125], ["label", s.clone()]]]]]
        ]);
        let decoded = decode_entries(&params);
        prop_assert!(decoded.well_formed);
        let d = &decoded.sets[0].decisions()[0];
        prop_assert_eq!(d.int("count"), Some(i));
        prop_assert_eq!(d.float("ratio"), Some(0.125));
        prop_assert_eq!(d.str("label"), Some(s.as_str()));
    }
}
