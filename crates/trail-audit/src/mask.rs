//! Compliance masking of sensitive detail fields.
//!
//! Masking only runs when the serialized details mention "password"
//! somewhere. When it runs, every key at any depth whose name contains
//! `password`, `secret`, `token` or `key` (case-insensitive) has its value
//! replaced with [`MASK`].
//!
//! If the details cannot be decoded into a map or re-encoded, they are left
//! unmasked. That can leak a sensitive value into the store; it is logged at
//! `warn` so it shows up in monitoring.

use crate::codec::{self, DetailMap, DetailValue};
use crate::record::AuditRecord;

/// Replacement text for sensitive values.
pub const MASK: &str = "*****";

const GATE: &str = "password";

const SENSITIVE_KEYS: [&str; 4] = ["password", "secret", "token", "key"];

/// Mask sensitive fields in the record's details.
pub fn mask(mut record: AuditRecord) -> AuditRecord {
    if !record.details.to_lowercase().contains(GATE) {
        return record;
    }

    let decoded = match codec::decode(&record.details) {
        Ok(value @ DetailValue::Map(_)) => value,
        Ok(_) => {
            tracing::warn!(action = %record.action, "Audit details are not a map, left unmasked");
            return record;
        }
        Err(e) => {
            tracing::warn!(action = %record.action, error = %e, "Failed to decode details for masking");
            return record;
        }
    };

    match codec::encode(Some(&mask_value(&decoded))) {
        Ok(masked) => record.details = masked,
        Err(e) => {
            tracing::warn!(action = %record.action, error = %e, "Failed to encode masked details");
        }
    }
    record
}

/// Return a copy of `value` with every sensitive key's value masked.
pub fn mask_value(value: &DetailValue) -> DetailValue {
    match value {
        DetailValue::Map(map) => DetailValue::Map(
            map.iter()
                .map(|(k, v)| {
                    if is_sensitive(k) {
                        (k, DetailValue::Text(MASK.to_string()))
                    } else {
                        (k, mask_value(v))
                    }
                })
                .collect::<DetailMap>(),
        ),
        DetailValue::List(items) => DetailValue::List(items.iter().map(mask_value).collect()),
        other => other.clone(),
    }
}

fn is_sensitive(key: &str) -> bool {
    let key = key.to_lowercase();
    SENSITIVE_KEYS.iter().any(|s| key.contains(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_details(details: &str) -> AuditRecord {
        let mut record = AuditRecord::builder("UPDATE").unwrap().build();
        record.details = details.to_string();
        record
    }

    #[test]
    fn masks_nested_sensitive_keys() {
        let r = mask(with_details(r#"{"password":"p@ss","nested":{"apiKey":"k"}}"#));
        assert_eq!(r.details(), r#"{"password":"*****","nested":{"apiKey":"*****"}}"#);
    }

    #[test]
    fn leaves_unrelated_keys() {
        let r = mask(with_details(
            r#"{"user":"alice","Password":"x","session_token":"t","count":3}"#,
        ));
        assert_eq!(
            r.details(),
            r#"{"user":"alice","Password":"*****","session_token":"*****","count":3}"#
        );
    }

    #[test]
    fn unrelated_numbers_keep_their_exact_text() {
        let r = mask(with_details(
            r#"{"password":"p","traceId":18446744073709551615,"offset":-42,"ratio":0.25}"#,
        ));
        assert_eq!(
            r.details(),
            r#"{"password":"*****","traceId":18446744073709551615,"offset":-42,"ratio":0.25}"#
        );
    }

    #[test]
    fn wide_details_masked_in_order() {
        let fields: Vec<String> = (0..20_000).map(|i| format!(r#""f{}":{}"#, i, i)).collect();
        let r = mask(with_details(&format!(r#"{{"password":"p",{}}}"#, fields.join(","))));
        assert_eq!(
            r.details(),
            format!(r#"{{"password":"*****",{}}}"#, fields.join(","))
        );
    }

    #[test]
    fn masks_maps_inside_lists() {
        let r = mask(with_details(
            r#"{"password":"a","accounts":[{"clientSecret":"s","name":"n"}]}"#,
        ));
        assert_eq!(
            r.details(),
            r#"{"password":"*****","accounts":[{"clientSecret":"*****","name":"n"}]}"#
        );
    }

    #[test]
    fn gate_skips_details_without_password() {
        let original = r#"{"apiKey":"k","secret":"s"}"#;
        let r = mask(with_details(original));
        assert_eq!(r.details(), original);
    }

    #[test]
    fn gate_matches_values_too() {
        let r = mask(with_details(r#"{"note":"reset password","token":"abc"}"#));
        assert_eq!(r.details(), r#"{"note":"reset password","token":"*****"}"#);
    }

    #[test]
    fn undecodable_details_left_unmasked() {
        let original = r#"{"password": "p@ss""#;
        let r = mask(with_details(original));
        assert_eq!(r.details(), original);
    }

    #[test]
    fn non_map_details_left_unmasked() {
        let original = r#"["password"]"#;
        let r = mask(with_details(original));
        assert_eq!(r.details(), original);
    }

    #[test]
    fn mask_value_does_not_touch_input() {
        let input = DetailValue::Map(DetailMap::new().with("token", "t"));
        let masked = mask_value(&input);
        assert_eq!(input.as_map().unwrap().get("token"), Some(&DetailValue::from("t")));
        assert_eq!(masked.as_map().unwrap().get("token"), Some(&DetailValue::from(MASK)));
    }
}
