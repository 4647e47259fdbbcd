//! Public facade: the codec cache and the encode/decode entry points.

use rustc_hash::FxHashMap;

use crate::codec::cursor::{Reader, Writer};
use crate::codec::derive::Deriver;
use crate::codec::poly::SubtypeRegistry;
use crate::codec::{Codec, CodecArena, CodecId};
use crate::error::Error;
use crate::model::{Schema, TypeRef, Value};

/// Codec registry and encode/decode entry point.
///
/// Codecs are derived on first use and cached per [`TypeRef`], so repeated
/// calls for the same type reuse one codec. Not thread safe; use one
/// serializer per thread.
#[derive(Debug)]
pub struct Serializer {
    schema: Schema,
    arena: CodecArena,
    cache: FxHashMap<TypeRef, CodecId>,
    registry: SubtypeRegistry,
}

/// Derivation facts about a codec, exposed for introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecInfo {
    /// Width of the codec's header region, in bits.
    pub header_bits: u32,
    /// Whether any field had to be boxed to break a dependency cycle.
    pub circular: bool,
}

impl Serializer {
    pub fn new(schema: Schema) -> Serializer {
        let mut arena = CodecArena::default();
        let mut cache = FxHashMap::default();
        for (ty, codec) in [
            (TypeRef::Bool, Codec::Bool),
            (TypeRef::I8, Codec::I8),
            (TypeRef::I16, Codec::I16),
            (TypeRef::I32, Codec::I32),
            (TypeRef::I64, Codec::I64),
            (TypeRef::F32, Codec::F32),
            (TypeRef::F64, Codec::F64),
            (TypeRef::Text, Codec::Text),
        ] {
            let id = arena.insert(codec);
            cache.insert(ty, id);
        }
        Serializer {
            schema,
            arena,
            cache,
            registry: SubtypeRegistry::default(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Mutable schema access; declared types are append-only, so existing
    /// codecs stay valid.
    pub fn schema_mut(&mut self) -> &mut Schema {
        &mut self.schema
    }

    /// Returns the cached codec handle for a type, deriving it on first use.
    ///
    /// Deriving a subtype's codec also registers it for polymorphic
    /// dispatch, so call this for every subtype before the first use of its
    /// ancestor.
    pub fn codec(&mut self, ty: &TypeRef) -> Result<CodecId, Error> {
        if let Some(&id) = self.cache.get(ty) {
            return Ok(id);
        }
        let watermark = self.arena.len();
        let mut deriver = Deriver::new(
            &self.schema,
            &mut self.arena,
            &mut self.cache,
            &mut self.registry,
        );
        match deriver.resolve(ty) {
            Ok(id) => Ok(id),
            Err(err) => {
                // drop half-built codecs; subtype registrations stay
                self.arena.truncate(watermark);
                self.cache.retain(|_, id| id.0 < watermark);
                Err(err)
            }
        }
    }

    /// Header width and cycle facts for a type's codec.
    pub fn codec_info(&mut self, ty: &TypeRef) -> Result<CodecInfo, Error> {
        let id = self.codec(ty)?;
        Ok(CodecInfo {
            header_bits: self.arena.bit_count(id),
            circular: self.arena.is_circular(id),
        })
    }

    /// Encodes a value as its inferred type.
    pub fn encode(&mut self, value: &Value) -> Result<Vec<u8>, Error> {
        let ty = self.infer(value)?;
        self.encode_as(value, &ty)
    }

    /// Encodes a value as an explicit type into a fresh buffer.
    pub fn encode_as(&mut self, value: &Value, ty: &TypeRef) -> Result<Vec<u8>, Error> {
        let id = self.codec(ty)?;
        let size = self.arena.full_size(&self.schema, id, value)?;
        let mut buf = vec![0u8; size];
        let bits = self.arena.bit_count(id) as usize;
        let mut writer = Writer::new(&mut buf, 0, bits);
        self.arena.write(&self.schema, id, value, &mut writer)?;
        writer.finish()?;
        debug_assert_eq!(writer.offset(), size);
        Ok(buf)
    }

    /// Encodes into a caller-provided buffer at `offset`; returns the end
    /// offset of the encoded value.
    pub fn encode_into(
        &mut self,
        value: &Value,
        ty: &TypeRef,
        buf: &mut [u8],
        offset: usize,
    ) -> Result<usize, Error> {
        let id = self.codec(ty)?;
        let bits = self.arena.bit_count(id) as usize;
        let mut writer = Writer::new(buf, offset, bits);
        self.arena.write(&self.schema, id, value, &mut writer)?;
        writer.finish()?;
        Ok(writer.offset())
    }

    /// Number of bytes the value encodes to as its inferred type.
    pub fn size(&mut self, value: &Value) -> Result<usize, Error> {
        let ty = self.infer(value)?;
        self.size_as(value, &ty)
    }

    /// Number of bytes the value encodes to as an explicit type.
    pub fn size_as(&mut self, value: &Value, ty: &TypeRef) -> Result<usize, Error> {
        let id = self.codec(ty)?;
        self.arena.full_size(&self.schema, id, value)
    }

    /// Decodes one value of `ty` starting at `offset`.
    pub fn decode(&mut self, ty: &TypeRef, buf: &[u8], offset: usize) -> Result<Value, Error> {
        let id = self.codec(ty)?;
        let bits = self.arena.bit_count(id) as usize;
        let mut reader = Reader::new(buf, offset, bits);
        self.arena.read(&self.schema, id, &mut reader)
    }

    /// Decodes one value of `ty` that must span exactly `len` bytes.
    pub fn decode_exact(
        &mut self,
        ty: &TypeRef,
        buf: &[u8],
        offset: usize,
        len: usize,
    ) -> Result<Value, Error> {
        let id = self.codec(ty)?;
        let bits = self.arena.bit_count(id) as usize;
        let mut reader = Reader::new(buf, offset, bits);
        let value = self.arena.read(&self.schema, id, &mut reader)?;
        if reader.offset() != offset + len {
            return Err(Error::FramingMismatch {
                expected: offset + len,
                actual: reader.offset(),
            });
        }
        Ok(value)
    }

    fn infer(&self, value: &Value) -> Result<TypeRef, Error> {
        value.type_ref().ok_or(Error::UninferableType {
            reason: "null values and empty containers carry no element type",
        })
    }
}
