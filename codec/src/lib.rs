// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Deterministic wire codec: flattens a structured value into HTTP headers
//! plus a signed multipart body, per spec §4.1.

mod decode;
mod encode;
mod error;
mod flatten;
mod value;

pub use encode::{Codec, EncodedMessage};
pub use error::{DecodeError, EncodeError};
pub use value::Encodable;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn worked_example() -> Encodable {
        Encodable::map([
            ("a", Encodable::Integer(1)),
            ("b", Encodable::str("x")),
            (
                "c",
                Encodable::map([("d", Encodable::Seq(vec![Encodable::Integer(10), Encodable::Integer(20)]))]),
            ),
        ])
    }

    #[test]
    fn small_scalars_become_headers() {
        let encoded = Codec::new().encode(&worked_example()).unwrap();
        assert!(encoded.body.is_none(), "no nested/oversized leaf, no body expected");
        let map: std::collections::HashMap<_, _> = encoded.headers.into_iter().collect();
        assert_eq!(map.get("a").map(String::as_str), Some("1"));
        assert_eq!(map.get("b").map(String::as_str), Some("x"));
        assert_eq!(map.get("ao-types").map(String::as_str), Some("a=integer"));
    }

    #[test]
    fn nested_paths_move_to_body_and_get_digested() {
        let encoded = Codec::new().encode(&worked_example()).unwrap();
        // `c/d/0` and `c/d/1` are nested -> body; `c/d/ao-types` too.
        assert!(encoded.body.is_some());
        assert!(encoded.content_digest.as_deref().unwrap().starts_with("sha-256=:"));
        assert!(encoded
            .content_type
            .as_deref()
            .unwrap()
            .starts_with("multipart/form-data; boundary=\""));
    }

    #[test]
    fn digest_is_independent_of_map_insertion_order() {
        let a = Encodable::map([("a", Encodable::Integer(1)), ("b", Encodable::str("x"))]);
        let b = Encodable::map([("b", Encodable::str("x")), ("a", Encodable::Integer(1))]);
        let ea = Codec::new().encode(&a).unwrap();
        let eb = Codec::new().encode(&b).unwrap();
        assert_eq!(ea, eb);
    }

    #[test]
    fn empty_string_becomes_empty_binary_atom() {
        let value = Encodable::map([("note", Encodable::str(""))]);
        let encoded = Codec::new().encode(&value).unwrap();
        let map: std::collections::HashMap<_, _> = encoded.headers.iter().cloned().collect();
        assert_eq!(map.get("note").map(String::as_str), Some(""));
        assert_eq!(map.get("ao-types").map(String::as_str), Some("note=empty-binary"));
    }

    #[test]
    fn round_trip_is_structurally_equal() {
        let value = worked_example();
        let encoded = Codec::new().encode(&value).unwrap();
        let decoded = Codec::new().decode(&encoded).unwrap();
        assert_eq!(value, decoded);
    }

    #[test]
    fn round_trip_empty_list_and_binary() {
        // Keys listed in sorted order: `decode` always reconstructs map
        // entries key-sorted (flattening is order-independent), so a
        // structural-equality check needs the literal in that same order.
        let value = Encodable::map([
            ("blob", Encodable::Bytes(vec![1, 2, 3, 4])),
            ("flag", Encodable::from(true)),
            ("items", Encodable::Seq(Vec::new())),
        ]);
        let encoded = Codec::new().encode(&value).unwrap();
        let decoded = Codec::new().decode(&encoded).unwrap();
        assert_eq!(value, decoded);
    }

    #[test]
    fn non_finite_float_fails_to_encode() {
        let value = Encodable::map([("x", Encodable::Float(f64::NAN))]);
        assert!(Codec::new().encode(&value).is_err());
    }

    #[test]
    fn bare_scalar_root_is_rejected() {
        assert!(Codec::new().encode(&Encodable::Integer(1)).is_err());
    }

    #[test]
    fn oversized_value_is_pushed_to_body() {
        let long = "x".repeat(5000);
        let value = Encodable::map([("huge", Encodable::str(long.clone()))]);
        let encoded = Codec::new().encode(&value).unwrap();
        assert!(encoded.headers.iter().all(|(k, _)| k != "huge"));
        let body = encoded.body.unwrap();
        assert!(String::from_utf8_lossy(&body).contains(&long));
    }

    #[test]
    fn body_keys_header_is_opt_in() {
        let long = "x".repeat(5000);
        let value = Encodable::map([("huge", Encodable::str(long))]);
        let plain = Codec::new().encode(&value).unwrap();
        assert!(plain.headers.iter().all(|(k, _)| k != "body-keys"));

        let with_header = Codec::new().with_body_keys_header().encode(&value).unwrap();
        let map: std::collections::HashMap<_, _> = with_header.headers.into_iter().collect();
        assert_eq!(map.get("body-keys").map(String::as_str), Some("huge"));
    }
}
