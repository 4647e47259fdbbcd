//! bitpack: schema-driven bit-packed binary object codec.
//!
//! This crate encodes structured values into a compact binary form in which
//! booleans, presence flags, and type tags cost single bits instead of whole
//! bytes. Header bits for all fields of a record (and all items of a
//! container) are packed together into one shared header area ahead of the
//! field bodies, so the common case of "many small flags, few large bodies"
//! stays dense on the wire.
//!
//! # Overview
//!
//! - **Schema-driven**: record shapes, nullability, and subtype relations
//!   live in a [`Schema`]; values are dynamic [`Value`] trees checked
//!   against it.
//! - **Derived codecs**: the [`Serializer`] derives one codec per type on
//!   first use and caches it, including cycle analysis for recursive
//!   schemas.
//! - **Polymorphic dispatch**: values typed as an ancestor are encoded with
//!   a minimal-width subtype tag; the subtype set seals on first use so
//!   tags stay stable.
//!
//! # Quick Start
//!
//! ```rust
//! use bitpack::{RecordDef, Schema, Serializer, TypeRef, Value};
//!
//! let mut schema = Schema::new();
//! let point = schema
//!     .record(
//!         "Point",
//!         RecordDef::new()
//!             .field("x", TypeRef::I32)
//!             .field("y", TypeRef::I32)
//!             .nullable("label", TypeRef::Text),
//!     )
//!     .unwrap();
//!
//! let mut serializer = Serializer::new(schema);
//! let value = Value::record(
//!     point,
//!     vec![Value::I32(3), Value::I32(-4), Value::text("origin-ish")],
//! );
//!
//! let bytes = serializer.encode(&value).unwrap();
//! let decoded = serializer
//!     .decode(&TypeRef::named(point), &bytes, 0)
//!     .unwrap();
//! assert_eq!(decoded, value);
//! ```
//!
//! # Modules
//!
//! - [`model`]: schemas, type references, and dynamic values
//! - [`codec`]: bit cursors and the derived codec machinery
//! - [`error`]: error types
//!
//! Top-level entry points are re-exported at the crate root.

pub mod codec;
pub mod error;
pub mod model;

mod serializer;

pub use codec::{CodecId, Reader, Writer};
pub use error::Error;
pub use model::{CollectionKind, FieldDef, Record, RecordDef, Schema, TypeId, TypeRef, Value};
pub use serializer::{CodecInfo, Serializer};
