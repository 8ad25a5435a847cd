//! # Fixed Primitives
//!
//! Hardcoded constants for the record store.
//!
//! These values are compiled into the binary and are immutable at runtime.

/// IRI of the reserved voiding verb.
///
/// A statement with this verb whose object is a statement reference marks
/// the referenced statement as voided.
pub const VOID_VERB_IRI: &str = "http://adlnet.gov/expapi/verbs/voided";

/// Current record encoding version.
///
/// Every stored record is prefixed with this byte. Increment it when making
/// breaking changes to the stored layout.
pub const FORMAT_VERSION: u8 = 1;

/// Content type assumed for state documents that do not name one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length of a state id.
///
/// Longer ids are rejected before touching the backend.
pub const MAX_STATE_ID_LENGTH: usize = 1024;

/// Maximum size of a state payload (16 MB).
pub const MAX_DOCUMENT_SIZE: usize = 16 * 1024 * 1024;

/// Maximum number of writes held in a repository's flush queue.
///
/// Reaching the limit forces a flush on the next queued write.
pub const MAX_PENDING_WRITES: usize = 10_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn void_verb_is_adl_voided() {
        assert_eq!(VOID_VERB_IRI, "http://adlnet.gov/expapi/verbs/voided");
    }

    #[test]
    fn limits_are_positive() {
        assert!(MAX_STATE_ID_LENGTH > 0);
        assert!(MAX_DOCUMENT_SIZE > 0);
        assert!(MAX_PENDING_WRITES > 0);
    }
}
