//! Data model: schema descriptors and dynamic values.
//!
//! The codec core never inspects host-language types. A [`Schema`] holds the
//! ordered field descriptors of every composite type, and encode/decode work
//! on a dynamic [`Value`] graph shaped by those descriptors.

pub mod schema;
pub mod value;

pub use schema::{CollectionKind, FieldDef, RecordDef, Schema, TypeId, TypeRef};
pub use value::{Record, Value};
