//! Dynamic values: the object graphs the codec encodes and decodes.

use crate::model::schema::{CollectionKind, TypeId, TypeRef};

/// A dynamic value shaped by a schema type.
///
/// `Null` is only legal where the owning field is declared nullable.
/// Floating-point variants compare by `PartialEq`, so `NaN != NaN` as usual.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Text(String),
    Record(Record),
    /// Homogeneous array; items in index order.
    Array(Vec<Value>),
    /// Collection of the given kind; items in iteration order.
    Collection(CollectionKind, Vec<Value>),
}

/// A composite value: the type it instantiates plus one value per declared
/// field, in declared field order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub type_id: TypeId,
    pub fields: Vec<Value>,
}

impl Value {
    /// Builds a record value for a declared type.
    pub fn record(type_id: TypeId, fields: Vec<Value>) -> Value {
        Value::Record(Record { type_id, fields })
    }

    /// Builds a text value.
    pub fn text(s: impl Into<String>) -> Value {
        Value::Text(s.into())
    }

    /// Builds a list collection value.
    pub fn list(items: Vec<Value>) -> Value {
        Value::Collection(CollectionKind::List, items)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the value's shape, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Text(_) => "text",
            Value::Record(_) => "record",
            Value::Array(_) => "array",
            Value::Collection(..) => "collection",
        }
    }

    /// Infers the declared type this value would encode as.
    ///
    /// Records carry their type; container element types are taken from the
    /// first item, so empty containers (and `Null`) cannot infer.
    pub fn type_ref(&self) -> Option<TypeRef> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(TypeRef::Bool),
            Value::I8(_) => Some(TypeRef::I8),
            Value::I16(_) => Some(TypeRef::I16),
            Value::I32(_) => Some(TypeRef::I32),
            Value::I64(_) => Some(TypeRef::I64),
            Value::F32(_) => Some(TypeRef::F32),
            Value::F64(_) => Some(TypeRef::F64),
            Value::Text(_) => Some(TypeRef::Text),
            Value::Record(r) => Some(TypeRef::Named(r.type_id)),
            Value::Array(items) => {
                let elem = items.first()?.type_ref()?;
                Some(TypeRef::array(elem))
            }
            Value::Collection(kind, items) => {
                let elem = items.first()?.type_ref()?;
                Some(TypeRef::collection(*kind, elem))
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Value {
        Value::I8(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Value {
        Value::I16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Value {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::I64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Value {
        Value::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::F64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::Text(v)
    }
}
