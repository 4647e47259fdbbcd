//! Codec derivation.
//!
//! Derivation walks a [`TypeRef`] and the schema definitions it reaches,
//! reserving an arena slot per composite type before resolving its fields so
//! recursive references land on the reserved slot instead of recursing
//! forever.
//!
//! Cycle handling follows the region structure of the wire format. The
//! deriver keeps a stack of records under construction and an inline
//! boundary: a field whose type is found on the stack at or above the
//! boundary closes a cycle inside the current shared region, so every frame
//! from the hit upward is marked and those fields are boxed into nested
//! regions. Containers and multi-leaf dispatch open nested regions of their
//! own, so they move the boundary to the top of the stack while their
//! element or leaf codecs resolve; a hit below the boundary reuses the
//! unfinished codec without marking anything. Single-leaf pass-through
//! shares the caller's region and keeps the boundary where it is.

use rustc_hash::FxHashMap;

use crate::codec::container::ContainerCodec;
use crate::codec::poly::{tag_width, MultiCodec, SingleCodec, SubtypeRegistry};
use crate::codec::record::{FieldBinding, RecordCodec};
use crate::codec::{Codec, CodecArena, CodecId};
use crate::error::Error;
use crate::model::schema::TypeDef;
use crate::model::{CollectionKind, Schema, TypeId, TypeRef};

pub(crate) struct Deriver<'a> {
    schema: &'a Schema,
    arena: &'a mut CodecArena,
    cache: &'a mut FxHashMap<TypeRef, CodecId>,
    registry: &'a mut SubtypeRegistry,
    stack: Vec<Frame>,
    /// Index of the first frame inside the current shared region.
    mark: usize,
}

struct Frame {
    ty: TypeId,
    codec: CodecId,
    circular: bool,
}

impl<'a> Deriver<'a> {
    pub(crate) fn new(
        schema: &'a Schema,
        arena: &'a mut CodecArena,
        cache: &'a mut FxHashMap<TypeRef, CodecId>,
        registry: &'a mut SubtypeRegistry,
    ) -> Deriver<'a> {
        Deriver {
            schema,
            arena,
            cache,
            registry,
            stack: Vec::new(),
            mark: 0,
        }
    }

    pub(crate) fn resolve(&mut self, ty: &TypeRef) -> Result<CodecId, Error> {
        if let TypeRef::Named(id) = ty {
            if let Some(i) = self.stack.iter().position(|frame| frame.ty == *id) {
                if i >= self.mark {
                    for frame in &mut self.stack[i..] {
                        frame.circular = true;
                    }
                }
                return Ok(self.stack[i].codec);
            }
        }
        if let Some(&id) = self.cache.get(ty) {
            return Ok(id);
        }
        let id = self.create(ty)?;
        self.cache.insert(ty.clone(), id);
        Ok(id)
    }

    fn create(&mut self, ty: &TypeRef) -> Result<CodecId, Error> {
        match ty {
            TypeRef::Bool => Ok(self.arena.insert(Codec::Bool)),
            TypeRef::I8 => Ok(self.arena.insert(Codec::I8)),
            TypeRef::I16 => Ok(self.arena.insert(Codec::I16)),
            TypeRef::I32 => Ok(self.arena.insert(Codec::I32)),
            TypeRef::I64 => Ok(self.arena.insert(Codec::I64)),
            TypeRef::F32 => Ok(self.arena.insert(Codec::F32)),
            TypeRef::F64 => Ok(self.arena.insert(Codec::F64)),
            TypeRef::Text => Ok(self.arena.insert(Codec::Text)),
            TypeRef::Array(elem) => self.create_container(None, elem),
            TypeRef::Collection(kind, elem) => self.create_container(Some(*kind), elem),
            TypeRef::Named(id) => self.create_named(*id),
        }
    }

    fn create_container(
        &mut self,
        kind: Option<CollectionKind>,
        elem: &TypeRef,
    ) -> Result<CodecId, Error> {
        let saved = self.mark;
        self.mark = self.stack.len();
        let resolved = self.resolve(elem);
        self.mark = saved;
        let elem = resolved?;
        Ok(self.arena.insert(Codec::Container(ContainerCodec { kind, elem })))
    }

    fn create_named(&mut self, id: TypeId) -> Result<CodecId, Error> {
        let schema = self.schema;
        let def = schema.def(id)?;
        for &parent in schema.parents(id) {
            self.registry.register(id, parent, schema)?;
        }
        match self.registry.collect_leaves(id, schema) {
            Some(leaves) => self.create_poly(id, leaves),
            None => match def {
                TypeDef::Record { .. } => self.create_record(id),
                TypeDef::Abstract => Err(Error::UnsupportedType {
                    name: schema.lookup_name(id),
                    reason: "abstract type with no registered subtypes",
                }),
            },
        }
    }

    fn create_poly(&mut self, id: TypeId, leaves: Vec<TypeId>) -> Result<CodecId, Error> {
        if leaves.is_empty() {
            return Err(Error::UnsupportedType {
                name: self.schema.lookup_name(id),
                reason: "no concrete subtypes registered",
            });
        }
        if leaves.len() == 1 {
            let leaf = leaves[0];
            if leaf == id {
                return self.create_record(id);
            }
            // pass-through shares the caller's region; the slot is cached
            // up front so a leaf field referencing the ancestor reuses it
            let slot = self.arena.reserve();
            self.cache.insert(TypeRef::Named(id), slot);
            let target = self.resolve(&TypeRef::Named(leaf))?;
            self.arena.fill(
                slot,
                Codec::Single(SingleCodec {
                    ancestor: id,
                    leaf,
                    target,
                }),
            );
            return Ok(slot);
        }

        let slot = self.arena.reserve();
        self.cache.insert(TypeRef::Named(id), slot);
        let saved = self.mark;
        self.mark = self.stack.len();
        let resolved = self.resolve_leaves(id, &leaves);
        self.mark = saved;
        let (entries, base) = resolved?;

        let mut indices = FxHashMap::default();
        for (tag, &(leaf, _)) in entries.iter().enumerate() {
            indices.insert(leaf, tag);
        }
        self.arena.fill(
            slot,
            Codec::Multi(MultiCodec {
                ancestor: id,
                leaves: entries,
                indices,
                tag_bits: tag_width(leaves.len()),
                base,
            }),
        );
        Ok(slot)
    }

    fn resolve_leaves(
        &mut self,
        id: TypeId,
        leaves: &[TypeId],
    ) -> Result<(Vec<(TypeId, CodecId)>, Option<CodecId>), Error> {
        let mut entries = Vec::with_capacity(leaves.len());
        let mut base = None;
        for &leaf in leaves {
            let codec = if leaf == id {
                let codec = self.create_record(id)?;
                base = Some(codec);
                codec
            } else {
                let resolved = self.resolve(&TypeRef::Named(leaf))?;
                self.record_codec_of(resolved)
            };
            entries.push((leaf, codec));
        }
        Ok((entries, base))
    }

    /// A leaf may itself resolve to a dispatch codec; unwrap to the record
    /// codec that encodes the leaf's own fields. A still-building slot is
    /// always a record codec.
    fn record_codec_of(&self, id: CodecId) -> CodecId {
        match self.arena.try_get(id) {
            Some(Codec::Multi(multi)) => multi.base.unwrap_or(id),
            Some(Codec::Single(single)) => self.record_codec_of(single.target),
            _ => id,
        }
    }

    fn create_record(&mut self, id: TypeId) -> Result<CodecId, Error> {
        let schema = self.schema;
        let TypeDef::Record { fields } = schema.def(id)? else {
            return Err(Error::UnsupportedType {
                name: schema.lookup_name(id),
                reason: "abstract type cannot be instantiated",
            });
        };
        let slot = self.arena.reserve();
        self.stack.push(Frame {
            ty: id,
            codec: slot,
            circular: false,
        });

        let mut bindings = Vec::with_capacity(fields.len());
        let mut bit_count = 0u32;
        for field in fields {
            // a failed derivation discards the whole deriver, so the early
            // return skips stack cleanup
            let target = self.resolve(&field.ty)?;
            let in_cycle = self.stack.last().is_some_and(|frame| frame.circular);
            // an unfinished target has no known header width yet; boxing it
            // defers the width question to encode time
            let boxed = in_cycle || self.arena.try_bit_count(target).is_none();
            if field.nullable {
                bit_count += 1;
            }
            if !boxed {
                bit_count += self.arena.try_bit_count(target).unwrap_or(0);
            }
            bindings.push(FieldBinding {
                name: field.name.as_str().into(),
                target,
                nullable: field.nullable,
                boxed,
            });
        }

        self.stack.pop();
        let circular = bindings.iter().any(|binding| binding.boxed);
        self.arena.fill(
            slot,
            Codec::Record(RecordCodec {
                type_id: id,
                name: schema.name(id).into(),
                fields: bindings,
                bit_count,
                circular,
            }),
        );
        Ok(slot)
    }
}
