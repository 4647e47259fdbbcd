//! Record codec: ordered field bindings over a shared header region.
//!
//! A record owns one header region sized to the sum of its field header
//! widths. Nullable fields contribute one presence bit; boxed fields (those
//! that close a dependency cycle) contribute none and are written as nested
//! self-delimited regions instead.

use crate::codec::cursor::{Reader, Writer};
use crate::codec::{CodecArena, CodecId};
use crate::error::Error;
use crate::model::{Record, Schema, TypeId, Value};

/// Derived codec for one concrete record type.
#[derive(Debug)]
pub(crate) struct RecordCodec {
    pub(crate) type_id: TypeId,
    pub(crate) name: Box<str>,
    pub(crate) fields: Vec<FieldBinding>,
    /// Total header width: presence bits plus inlined field headers.
    pub(crate) bit_count: u32,
    /// True if any field (transitively reachable through inlined targets)
    /// had to be boxed.
    pub(crate) circular: bool,
}

/// One field of a record codec, bound to its target codec.
#[derive(Debug)]
pub(crate) struct FieldBinding {
    pub(crate) name: Box<str>,
    pub(crate) target: CodecId,
    pub(crate) nullable: bool,
    /// Boxed fields write a nested region with the target's own header area
    /// instead of sharing the record's header.
    pub(crate) boxed: bool,
}

impl RecordCodec {
    pub(crate) fn body_size(
        &self,
        schema: &Schema,
        arena: &CodecArena,
        value: &Value,
    ) -> Result<usize, Error> {
        let record = self.check(value)?;
        let mut size = 0;
        for (binding, field) in self.fields.iter().zip(&record.fields) {
            size += binding.size(schema, arena, &self.name, field)?;
        }
        Ok(size)
    }

    pub(crate) fn write(
        &self,
        schema: &Schema,
        arena: &CodecArena,
        value: &Value,
        writer: &mut Writer<'_>,
    ) -> Result<(), Error> {
        let record = self.check(value)?;
        for (binding, field) in self.fields.iter().zip(&record.fields) {
            binding.write(schema, arena, &self.name, field, writer)?;
        }
        Ok(())
    }

    pub(crate) fn read(
        &self,
        schema: &Schema,
        arena: &CodecArena,
        reader: &mut Reader<'_>,
    ) -> Result<Value, Error> {
        let mut fields = Vec::with_capacity(self.fields.len());
        for binding in &self.fields {
            fields.push(binding.read(schema, arena, reader)?);
        }
        Ok(Value::record(self.type_id, fields))
    }

    fn check<'v>(&self, value: &'v Value) -> Result<&'v Record, Error> {
        let Value::Record(record) = value else {
            return Err(Error::ValueMismatch {
                expected: "record",
                found: value.kind_name(),
            });
        };
        if record.type_id != self.type_id {
            return Err(Error::RecordMismatch {
                name: self.name.to_string(),
            });
        }
        if record.fields.len() != self.fields.len() {
            return Err(Error::FieldCountMismatch {
                name: self.name.to_string(),
                expected: self.fields.len(),
                actual: record.fields.len(),
            });
        }
        Ok(record)
    }
}

impl FieldBinding {
    fn size(
        &self,
        schema: &Schema,
        arena: &CodecArena,
        record: &str,
        value: &Value,
    ) -> Result<usize, Error> {
        if value.is_null() {
            return if self.nullable {
                Ok(0)
            } else {
                Err(self.null_violation(record))
            };
        }
        if self.boxed {
            arena.full_size(schema, self.target, value)
        } else {
            arena.body_size(schema, self.target, value)
        }
    }

    fn write(
        &self,
        schema: &Schema,
        arena: &CodecArena,
        record: &str,
        value: &Value,
        writer: &mut Writer<'_>,
    ) -> Result<(), Error> {
        if value.is_null() {
            if !self.nullable {
                return Err(self.null_violation(record));
            }
            return writer.write_bit(false);
        }
        if self.nullable {
            writer.write_bit(true)?;
        }
        if self.boxed {
            writer.with_sub_writer(arena.bit_count(self.target) as usize, |sub| {
                arena.write(schema, self.target, value, sub)
            })
        } else {
            arena.write(schema, self.target, value, writer)
        }
    }

    fn read(
        &self,
        schema: &Schema,
        arena: &CodecArena,
        reader: &mut Reader<'_>,
    ) -> Result<Value, Error> {
        if self.nullable && !reader.read_bit()? {
            return Ok(Value::Null);
        }
        if self.boxed {
            reader.with_sub_reader(arena.bit_count(self.target) as usize, |sub| {
                arena.read(schema, self.target, sub)
            })
        } else {
            arena.read(schema, self.target, reader)
        }
    }

    fn null_violation(&self, record: &str) -> Error {
        Error::NullabilityViolation {
            record: record.to_string(),
            field: self.name.to_string(),
        }
    }
}
