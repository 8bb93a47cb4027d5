use crate::types::ValueId;

/// Errors raised while projecting values to canonical ids.
///
/// A cache that sees one of these while hashing a state reports a miss for
/// that call: extra exploration is always sound, a spurious hit is not.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The registry refused to intern another value.
    #[error("unique registry is full ({limit} live values)")]
    CapacityExceeded { limit: usize },
    /// The id was never handed out, or its value has been swept.
    #[error("no value registered for id {0}")]
    UnknownId(ValueId),
}
