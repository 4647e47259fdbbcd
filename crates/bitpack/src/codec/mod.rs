//! Codec core: derived per-type encoders/decoders and the arena that owns
//! them.
//!
//! Codecs reference each other by [`CodecId`] instead of owning their
//! dependencies, so mutually recursive record types form plain index cycles
//! inside one [`CodecArena`]. Derivation (see [`derive`]) fills arena slots
//! in dependency order; encode/decode never observe an unfilled slot.

pub(crate) mod container;
pub(crate) mod cursor;
pub(crate) mod derive;
pub(crate) mod poly;
pub(crate) mod record;

pub use cursor::{Reader, Writer};

use crate::codec::container::ContainerCodec;
use crate::codec::poly::{MultiCodec, SingleCodec};
use crate::codec::record::RecordCodec;
use crate::error::Error;
use crate::model::{Schema, Value};

/// Index of a codec inside its [`CodecArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodecId(pub(crate) usize);

/// One derived codec.
///
/// Every variant knows three things about its type: the header width in bits
/// (`bit_count`), the body size of a concrete value, and how to write/read
/// that value against a cursor positioned inside a shared region.
#[derive(Debug)]
pub(crate) enum Codec {
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Text,
    Record(RecordCodec),
    Container(ContainerCodec),
    Multi(MultiCodec),
    Single(SingleCodec),
}

#[derive(Debug)]
enum Slot {
    /// Reserved during derivation; back-references point here before the
    /// codec is finished.
    Building,
    Ready(Codec),
}

/// Append-only store of derived codecs.
#[derive(Debug, Default)]
pub(crate) struct CodecArena {
    slots: Vec<Slot>,
}

impl CodecArena {
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Reserves a slot for a codec under construction.
    pub(crate) fn reserve(&mut self) -> CodecId {
        let id = CodecId(self.slots.len());
        self.slots.push(Slot::Building);
        id
    }

    /// Fills a previously reserved slot.
    pub(crate) fn fill(&mut self, id: CodecId, codec: Codec) {
        debug_assert!(matches!(self.slots[id.0], Slot::Building));
        self.slots[id.0] = Slot::Ready(codec);
    }

    /// Inserts a finished codec directly.
    pub(crate) fn insert(&mut self, codec: Codec) -> CodecId {
        let id = CodecId(self.slots.len());
        self.slots.push(Slot::Ready(codec));
        id
    }

    /// Drops every slot at or past `watermark`; used to roll back a failed
    /// derivation.
    pub(crate) fn truncate(&mut self, watermark: usize) {
        self.slots.truncate(watermark);
    }

    /// Access that tolerates an unfilled slot; used during derivation.
    pub(crate) fn try_get(&self, id: CodecId) -> Option<&Codec> {
        match &self.slots[id.0] {
            Slot::Building => None,
            Slot::Ready(codec) => Some(codec),
        }
    }

    fn get(&self, id: CodecId) -> &Codec {
        match &self.slots[id.0] {
            Slot::Ready(codec) => codec,
            // derivation fills every reserved slot before handing out ids
            Slot::Building => unreachable!("codec {} used before it was built", id.0),
        }
    }

    /// Header width of the codec, in bits.
    ///
    /// Pass-through codecs delegate to their target, which is why this takes
    /// the arena rather than living on [`Codec`].
    pub(crate) fn bit_count(&self, id: CodecId) -> u32 {
        match self.get(id) {
            Codec::Bool => 1,
            Codec::I8
            | Codec::I16
            | Codec::I32
            | Codec::I64
            | Codec::F32
            | Codec::F64
            | Codec::Text
            | Codec::Container(_) => 0,
            Codec::Record(codec) => codec.bit_count,
            Codec::Multi(codec) => codec.tag_bits,
            Codec::Single(codec) => self.bit_count(codec.target),
        }
    }

    /// Header width if the codec (and any pass-through target) is already
    /// built; `None` while the slot is still under construction.
    pub(crate) fn try_bit_count(&self, id: CodecId) -> Option<u32> {
        match &self.slots[id.0] {
            Slot::Building => None,
            Slot::Ready(Codec::Single(codec)) => self.try_bit_count(codec.target),
            Slot::Ready(_) => Some(self.bit_count(id)),
        }
    }

    /// Whether the codec writes through any boxed (self-delimited) field.
    pub(crate) fn is_circular(&self, id: CodecId) -> bool {
        match self.get(id) {
            Codec::Record(codec) => codec.circular,
            Codec::Single(codec) => self.is_circular(codec.target),
            _ => false,
        }
    }

    /// Size of the value's body bytes, excluding this codec's own header
    /// bits.
    pub(crate) fn body_size(
        &self,
        schema: &Schema,
        id: CodecId,
        value: &Value,
    ) -> Result<usize, Error> {
        match (self.get(id), value) {
            (Codec::Bool, Value::Bool(_)) => Ok(0),
            (Codec::I8, Value::I8(_)) => Ok(1),
            (Codec::I16, Value::I16(_)) => Ok(2),
            (Codec::I32, Value::I32(_)) => Ok(4),
            (Codec::I64, Value::I64(_)) => Ok(8),
            (Codec::F32, Value::F32(_)) => Ok(4),
            (Codec::F64, Value::F64(_)) => Ok(8),
            (Codec::Text, Value::Text(s)) => Ok(cursor::str_size(s)),
            (Codec::Record(codec), _) => codec.body_size(schema, self, value),
            (Codec::Container(codec), _) => codec.body_size(schema, self, value),
            (Codec::Multi(codec), _) => codec.body_size(schema, self, value),
            (Codec::Single(codec), _) => codec.body_size(schema, self, value),
            (codec, _) => Err(mismatch(codec, value)),
        }
    }

    /// Size of a complete self-delimited region for the value: header bytes
    /// plus body.
    pub(crate) fn full_size(
        &self,
        schema: &Schema,
        id: CodecId,
        value: &Value,
    ) -> Result<usize, Error> {
        Ok((self.bit_count(id) as usize).div_ceil(8) + self.body_size(schema, id, value)?)
    }

    pub(crate) fn write(
        &self,
        schema: &Schema,
        id: CodecId,
        value: &Value,
        writer: &mut Writer<'_>,
    ) -> Result<(), Error> {
        match (self.get(id), value) {
            (Codec::Bool, Value::Bool(v)) => writer.write_bit(*v),
            (Codec::I8, Value::I8(v)) => writer.write_i8(*v),
            (Codec::I16, Value::I16(v)) => writer.write_i16(*v),
            (Codec::I32, Value::I32(v)) => writer.write_i32(*v),
            (Codec::I64, Value::I64(v)) => writer.write_i64(*v),
            (Codec::F32, Value::F32(v)) => writer.write_f32(*v),
            (Codec::F64, Value::F64(v)) => writer.write_f64(*v),
            (Codec::Text, Value::Text(s)) => writer.write_str(s),
            (Codec::Record(codec), _) => codec.write(schema, self, value, writer),
            (Codec::Container(codec), _) => codec.write(schema, self, value, writer),
            (Codec::Multi(codec), _) => codec.write(schema, self, value, writer),
            (Codec::Single(codec), _) => codec.write(schema, self, value, writer),
            (codec, _) => Err(mismatch(codec, value)),
        }
    }

    pub(crate) fn read(
        &self,
        schema: &Schema,
        id: CodecId,
        reader: &mut Reader<'_>,
    ) -> Result<Value, Error> {
        match self.get(id) {
            Codec::Bool => Ok(Value::Bool(reader.read_bit()?)),
            Codec::I8 => Ok(Value::I8(reader.read_i8()?)),
            Codec::I16 => Ok(Value::I16(reader.read_i16()?)),
            Codec::I32 => Ok(Value::I32(reader.read_i32()?)),
            Codec::I64 => Ok(Value::I64(reader.read_i64()?)),
            Codec::F32 => Ok(Value::F32(reader.read_f32()?)),
            Codec::F64 => Ok(Value::F64(reader.read_f64()?)),
            Codec::Text => Ok(Value::Text(reader.read_str()?)),
            Codec::Record(codec) => codec.read(schema, self, reader),
            Codec::Container(codec) => codec.read(schema, self, reader),
            Codec::Multi(codec) => codec.read(schema, self, reader),
            Codec::Single(codec) => codec.read(schema, self, reader),
        }
    }
}

fn mismatch(codec: &Codec, value: &Value) -> Error {
    let expected = match codec {
        Codec::Bool => "bool",
        Codec::I8 => "i8",
        Codec::I16 => "i16",
        Codec::I32 => "i32",
        Codec::I64 => "i64",
        Codec::F32 => "f32",
        Codec::F64 => "f64",
        Codec::Text => "text",
        Codec::Record(_) => "record",
        Codec::Container(_) => "container",
        Codec::Multi(_) | Codec::Single(_) => "record",
    };
    Error::ValueMismatch {
        expected,
        found: value.kind_name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_sizes_and_headers() {
        let schema = Schema::new();
        let mut arena = CodecArena::default();
        let cases: &[(Codec, u32, Value, usize)] = &[
            (Codec::Bool, 1, Value::Bool(true), 0),
            (Codec::I8, 0, Value::I8(1), 1),
            (Codec::I16, 0, Value::I16(1), 2),
            (Codec::I32, 0, Value::I32(1), 4),
            (Codec::I64, 0, Value::I64(1), 8),
            (Codec::F32, 0, Value::F32(1.0), 4),
            (Codec::F64, 0, Value::F64(1.0), 8),
            (Codec::Text, 0, Value::text("ab"), 3),
        ];
        for (codec, bits, value, body) in cases {
            let id = arena.insert(match codec {
                Codec::Bool => Codec::Bool,
                Codec::I8 => Codec::I8,
                Codec::I16 => Codec::I16,
                Codec::I32 => Codec::I32,
                Codec::I64 => Codec::I64,
                Codec::F32 => Codec::F32,
                Codec::F64 => Codec::F64,
                Codec::Text => Codec::Text,
                _ => unreachable!(),
            });
            assert_eq!(arena.bit_count(id), *bits);
            assert_eq!(arena.body_size(&schema, id, value).unwrap(), *body);
        }
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let schema = Schema::new();
        let mut arena = CodecArena::default();
        let id = arena.insert(Codec::I32);
        let err = arena.body_size(&schema, id, &Value::text("x")).unwrap_err();
        assert_eq!(
            err,
            Error::ValueMismatch {
                expected: "i32",
                found: "text",
            }
        );
    }

    #[test]
    fn rollback_discards_reserved_slots() {
        let mut arena = CodecArena::default();
        arena.insert(Codec::I32);
        let watermark = arena.len();
        arena.reserve();
        arena.insert(Codec::Bool);
        arena.truncate(watermark);
        assert_eq!(arena.len(), watermark);
    }
}
