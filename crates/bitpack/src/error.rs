//! Error types for codec derivation, encoding and decoding.

use thiserror::Error;

/// Error raised by schema registration, codec derivation, or an
/// encode/decode/size call.
///
/// All errors are fatal to the current operation; nothing is retried or
/// downgraded internally. Encoding and decoding are all-or-nothing per call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("no codec can be derived for {name}: {reason}")]
    UnsupportedType { name: String, reason: &'static str },

    #[error(
        "subtype list of {parent} is already sealed; derive a codec for {child} \
         before the first use of the parent type"
    )]
    SealedRegistry { parent: String, child: String },

    #[error(
        "unknown subtype {name} of {ancestor}; derive codecs for all subtypes \
         before the first use of the ancestor type"
    )]
    UnknownSubtype { name: String, ancestor: String },

    #[error("type tag {tag} out of range for {ancestor} ({count} registered subtypes)")]
    InvalidTypeTag {
        tag: u32,
        ancestor: String,
        count: usize,
    },

    #[error("non-nullable field {record}.{field} holds a null value")]
    NullabilityViolation { record: String, field: String },

    #[error("decoded value ends at byte {actual}, expected byte {expected}")]
    FramingMismatch { expected: usize, actual: usize },

    #[error("collection size changed during encoding")]
    ConcurrentMutation,

    #[error("cursor out of bounds: need {need} bytes at offset {at}, buffer holds {len}")]
    BufferBounds { at: usize, need: usize, len: usize },

    #[error("varint exceeds maximum length (5 bytes)")]
    VarintTooLong,

    #[error("invalid UTF-8 in text value")]
    InvalidUtf8,

    #[error("value shape mismatch: codec expects {expected}, value is {found}")]
    ValueMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("value instantiates a different type than codec {name} encodes")]
    RecordMismatch { name: String },

    #[error("record {name} carries {actual} field values, its codec expects {expected}")]
    FieldCountMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("type {name} is already defined")]
    TypeRedefined { name: String },

    #[error("type {name} is declared but never defined")]
    UndefinedType { name: String },

    #[error("cannot infer a declared type for this value: {reason}")]
    UninferableType { reason: &'static str },
}
