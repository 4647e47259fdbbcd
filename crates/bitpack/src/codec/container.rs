//! Container codecs: arrays and collections of a single element type.
//!
//! Layout: varint item count, then (for non-empty containers) one nested
//! region whose header area holds `count * elem_bits` bits shared by all
//! items, followed by the item bodies back to back. An empty container is
//! just its count byte.
//!
//! Because the nested region is self-delimited, element resolution clears
//! the inline boundary during derivation: a cycle that passes through a
//! container never forces boxing above it.

use crate::codec::cursor::{self, Reader, Writer};
use crate::codec::{CodecArena, CodecId};
use crate::error::Error;
use crate::model::{CollectionKind, Schema, Value};

/// Derived codec for an array or a collection type.
#[derive(Debug)]
pub(crate) struct ContainerCodec {
    /// `None` for arrays; collections carry their kind so a value of the
    /// wrong collection kind is rejected.
    pub(crate) kind: Option<CollectionKind>,
    pub(crate) elem: CodecId,
}

impl ContainerCodec {
    pub(crate) fn body_size(
        &self,
        schema: &Schema,
        arena: &CodecArena,
        value: &Value,
    ) -> Result<usize, Error> {
        let items = self.check(value)?;
        let bits = arena.bit_count(self.elem) as usize * items.len();
        let mut bytes = cursor::var_u32_len(items.len() as u32) + bits.div_ceil(8);
        for item in items {
            bytes += arena.body_size(schema, self.elem, item)?;
        }
        Ok(bytes)
    }

    pub(crate) fn write(
        &self,
        schema: &Schema,
        arena: &CodecArena,
        value: &Value,
        writer: &mut Writer<'_>,
    ) -> Result<(), Error> {
        let items = self.check(value)?;
        writer.write_var_u32(items.len() as u32)?;
        if items.is_empty() {
            return Ok(());
        }
        let bits = arena.bit_count(self.elem) as usize * items.len();
        writer.with_sub_writer(bits, |sub| {
            for item in items {
                arena.write(schema, self.elem, item, sub)?;
            }
            Ok(())
        })
    }

    pub(crate) fn read(
        &self,
        schema: &Schema,
        arena: &CodecArena,
        reader: &mut Reader<'_>,
    ) -> Result<Value, Error> {
        let count = reader.read_var_u32()? as usize;
        let items = if count == 0 {
            Vec::new()
        } else {
            let bits = arena.bit_count(self.elem) as usize * count;
            reader.with_sub_reader(bits, |sub| {
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(arena.read(schema, self.elem, sub)?);
                }
                Ok(items)
            })?
        };
        Ok(match self.kind {
            None => Value::Array(items),
            Some(kind) => Value::Collection(kind, items),
        })
    }

    fn check<'v>(&self, value: &'v Value) -> Result<&'v [Value], Error> {
        match (self.kind, value) {
            (None, Value::Array(items)) => Ok(items),
            (Some(expected), Value::Collection(found, items)) => {
                if expected == *found {
                    Ok(items)
                } else {
                    Err(Error::ValueMismatch {
                        expected: expected.name(),
                        found: found.name(),
                    })
                }
            }
            (None, _) => Err(Error::ValueMismatch {
                expected: "array",
                found: value.kind_name(),
            }),
            (Some(expected), _) => Err(Error::ValueMismatch {
                expected: expected.name(),
                found: value.kind_name(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;

    fn roundtrip(schema: &Schema, arena: &CodecArena, id: CodecId, value: &Value) -> Vec<u8> {
        let size = arena.full_size(schema, id, value).unwrap();
        let mut buf = vec![0u8; size];
        let bits = arena.bit_count(id) as usize;
        let mut writer = Writer::new(&mut buf, 0, bits);
        arena.write(schema, id, value, &mut writer).unwrap();
        writer.finish().unwrap();
        assert_eq!(writer.offset(), size);

        let mut reader = Reader::new(&buf, 0, bits);
        assert_eq!(&arena.read(schema, id, &mut reader).unwrap(), value);
        assert_eq!(reader.offset(), size);
        buf
    }

    #[test]
    fn list_of_i32_layout() {
        let schema = Schema::new();
        let mut arena = CodecArena::default();
        let elem = arena.insert(Codec::I32);
        let id = arena.insert(Codec::Container(ContainerCodec {
            kind: Some(CollectionKind::List),
            elem,
        }));
        let value = Value::list(vec![Value::I32(1), Value::I32(2)]);
        let buf = roundtrip(&schema, &arena, id, &value);
        assert_eq!(buf, [2, 0, 0, 0, 1, 0, 0, 0, 2]);
    }

    #[test]
    fn empty_container_is_one_count_byte() {
        let schema = Schema::new();
        let mut arena = CodecArena::default();
        let elem = arena.insert(Codec::Bool);
        let id = arena.insert(Codec::Container(ContainerCodec { kind: None, elem }));
        let value = Value::Array(vec![]);
        assert_eq!(roundtrip(&schema, &arena, id, &value), [0]);
    }

    #[test]
    fn boolean_items_share_one_header_area() {
        let schema = Schema::new();
        let mut arena = CodecArena::default();
        let elem = arena.insert(Codec::Bool);
        let id = arena.insert(Codec::Container(ContainerCodec {
            kind: Some(CollectionKind::List),
            elem,
        }));
        let value = Value::list(vec![
            Value::Bool(true),
            Value::Bool(false),
            Value::Bool(true),
        ]);
        // 3 bits of headers packed in one byte, no bodies
        assert_eq!(roundtrip(&schema, &arena, id, &value), [3, 0b1010_0000]);
    }

    #[test]
    fn nested_lists_roundtrip() {
        let schema = Schema::new();
        let mut arena = CodecArena::default();
        let leaf = arena.insert(Codec::I16);
        let inner = arena.insert(Codec::Container(ContainerCodec {
            kind: Some(CollectionKind::List),
            elem: leaf,
        }));
        let id = arena.insert(Codec::Container(ContainerCodec {
            kind: Some(CollectionKind::List),
            elem: inner,
        }));
        let value = Value::list(vec![
            Value::list(vec![Value::I16(1), Value::I16(2)]),
            Value::list(vec![]),
            Value::list(vec![Value::I16(3)]),
        ]);
        roundtrip(&schema, &arena, id, &value);
    }

    #[test]
    fn collection_kind_is_checked() {
        let schema = Schema::new();
        let mut arena = CodecArena::default();
        let elem = arena.insert(Codec::I32);
        let id = arena.insert(Codec::Container(ContainerCodec {
            kind: Some(CollectionKind::SortedSet),
            elem,
        }));
        let value = Value::list(vec![Value::I32(1)]);
        assert_eq!(
            arena.body_size(&schema, id, &value).unwrap_err(),
            Error::ValueMismatch {
                expected: "sorted set",
                found: "list",
            }
        );
    }
}
