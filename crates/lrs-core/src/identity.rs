//! # Identity Generator
//!
//! Produces statement identifiers for statements stored without one.
//!
//! Identifiers are random version-4 UUIDs. No uniqueness check against the
//! store is performed; the generator holds no state and may be called from
//! any thread.

use crate::StatementId;
use uuid::{Uuid, Variant};

/// Generate a fresh statement id.
#[must_use]
pub fn new_statement_id() -> StatementId {
    StatementId::new(Uuid::new_v4())
}

/// Check the canonical form: hyphenated lowercase hex, version 1 to 5,
/// RFC 4122 variant.
#[must_use]
pub fn is_canonical_uuid(s: &str) -> bool {
    Uuid::try_parse(s).is_ok_and(|uuid| {
        (1..=5).contains(&uuid.get_version_num())
            && uuid.get_variant() == Variant::RFC4122
            && s == uuid.hyphenated().to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn generated_ids_are_canonical_v4() {
        for _ in 0..100 {
            let id = new_statement_id();
            let text = id.to_string();
            assert!(is_canonical_uuid(&text), "not canonical: {}", text);
            assert_eq!(id.as_uuid().get_version_num(), 4);
        }
    }

    #[test]
    fn generated_ids_differ() {
        let ids: BTreeSet<_> = (0..1000).map(|_| new_statement_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn canonical_check_rejects_malformed() {
        assert!(is_canonical_uuid("12345678-1234-5678-8234-567812345678"));
        assert!(!is_canonical_uuid("12345678-1234-5678-1234-567812345678"));
        assert!(!is_canonical_uuid("12345678-1234-0678-8234-567812345678"));
        assert!(!is_canonical_uuid("12345678123456788234567812345678"));
        assert!(!is_canonical_uuid("ABCDEF01-1234-5678-8234-567812345678"));
        assert!(!is_canonical_uuid("{12345678-1234-5678-8234-567812345678}"));
        assert!(!is_canonical_uuid("urn:uuid:12345678-1234-5678-8234-567812345678"));
    }
}
