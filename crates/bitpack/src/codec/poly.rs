//! Polymorphic dispatch: the subtype registry and the codecs derived for
//! types with registered subtypes.
//!
//! Every declared type registers itself under its direct parents the first
//! time its codec is derived. When a codec is later derived for an ancestor,
//! the registry walk seals every visited entry and the concrete leaves
//! become the ancestor's dispatch table. Deriving a subtype after its
//! ancestor's table is sealed is an error: the table defines the wire tags,
//! so it must be complete before the first ancestor-typed value is encoded.

use rustc_hash::FxHashMap;

use crate::codec::cursor::{Reader, Writer};
use crate::codec::{CodecArena, CodecId};
use crate::error::Error;
use crate::model::{Record, Schema, TypeId, Value};

/// Parent-to-children registration table.
#[derive(Debug, Default)]
pub(crate) struct SubtypeRegistry {
    entries: FxHashMap<TypeId, SubtypeEntry>,
}

#[derive(Debug, Default)]
struct SubtypeEntry {
    children: Vec<TypeId>,
    sealed: bool,
}

impl SubtypeRegistry {
    /// Records `child` as a direct subtype of `parent`.
    ///
    /// Re-registering a known child is a no-op; adding a new child to a
    /// sealed entry fails.
    pub(crate) fn register(
        &mut self,
        child: TypeId,
        parent: TypeId,
        schema: &Schema,
    ) -> Result<(), Error> {
        let entry = self.entries.entry(parent).or_default();
        if entry.children.contains(&child) {
            return Ok(());
        }
        if entry.sealed {
            return Err(Error::SealedRegistry {
                parent: schema.lookup_name(parent),
                child: schema.lookup_name(child),
            });
        }
        entry.children.push(child);
        Ok(())
    }

    /// Collects the concrete leaves reachable from `root` and seals every
    /// visited entry.
    ///
    /// Returns `None` when nothing was ever registered under `root`. The
    /// walk is depth-first in registration order with `root` itself first,
    /// so tag assignment is deterministic for a fixed derivation order.
    pub(crate) fn collect_leaves(
        &mut self,
        root: TypeId,
        schema: &Schema,
    ) -> Option<Vec<TypeId>> {
        if !self.entries.contains_key(&root) {
            return None;
        }
        let mut visited = vec![root];
        self.visit(root, &mut visited);
        visited.retain(|&ty| schema.is_concrete(ty));
        Some(visited)
    }

    fn visit(&mut self, ty: TypeId, visited: &mut Vec<TypeId>) {
        let children = match self.entries.get_mut(&ty) {
            Some(entry) => {
                entry.sealed = true;
                entry.children.clone()
            }
            None => return,
        };
        for child in children {
            if !visited.contains(&child) {
                visited.push(child);
                self.visit(child, visited);
            }
        }
    }
}

/// Dispatch codec for an ancestor with two or more concrete leaves.
///
/// Header holds a fixed-width type tag; the leaf payload follows as a
/// nested region sized to the leaf's own header width.
#[derive(Debug)]
pub(crate) struct MultiCodec {
    pub(crate) ancestor: TypeId,
    /// Leaves in tag order; the codec ids point at plain record codecs.
    pub(crate) leaves: Vec<(TypeId, CodecId)>,
    pub(crate) indices: FxHashMap<TypeId, usize>,
    pub(crate) tag_bits: u32,
    /// Record codec for the ancestor itself, when the ancestor is concrete.
    pub(crate) base: Option<CodecId>,
}

impl MultiCodec {
    pub(crate) fn body_size(
        &self,
        schema: &Schema,
        arena: &CodecArena,
        value: &Value,
    ) -> Result<usize, Error> {
        let (_, leaf) = self.dispatch(schema, value)?;
        arena.full_size(schema, leaf, value)
    }

    pub(crate) fn write(
        &self,
        schema: &Schema,
        arena: &CodecArena,
        value: &Value,
        writer: &mut Writer<'_>,
    ) -> Result<(), Error> {
        let (tag, leaf) = self.dispatch(schema, value)?;
        writer.write_bits(tag as u32, self.tag_bits)?;
        writer.with_sub_writer(arena.bit_count(leaf) as usize, |sub| {
            arena.write(schema, leaf, value, sub)
        })
    }

    pub(crate) fn read(
        &self,
        schema: &Schema,
        arena: &CodecArena,
        reader: &mut Reader<'_>,
    ) -> Result<Value, Error> {
        let tag = reader.read_bits(self.tag_bits)?;
        let Some(&(_, leaf)) = self.leaves.get(tag as usize) else {
            return Err(Error::InvalidTypeTag {
                tag,
                ancestor: schema.lookup_name(self.ancestor),
                count: self.leaves.len(),
            });
        };
        reader.with_sub_reader(arena.bit_count(leaf) as usize, |sub| {
            arena.read(schema, leaf, sub)
        })
    }

    fn dispatch(&self, schema: &Schema, value: &Value) -> Result<(usize, CodecId), Error> {
        let record = expect_record(value)?;
        match self.indices.get(&record.type_id) {
            Some(&tag) => Ok((tag, self.leaves[tag].1)),
            None => Err(Error::UnknownSubtype {
                name: schema.lookup_name(record.type_id),
                ancestor: schema.lookup_name(self.ancestor),
            }),
        }
    }
}

/// Pass-through codec for an ancestor with exactly one concrete leaf.
///
/// No tag is written; the leaf's layout is used directly, so this codec's
/// header width is the leaf's. The width is read through the arena because
/// the leaf may still be under construction when this codec is created.
#[derive(Debug)]
pub(crate) struct SingleCodec {
    pub(crate) ancestor: TypeId,
    pub(crate) leaf: TypeId,
    pub(crate) target: CodecId,
}

impl SingleCodec {
    pub(crate) fn body_size(
        &self,
        schema: &Schema,
        arena: &CodecArena,
        value: &Value,
    ) -> Result<usize, Error> {
        self.check(schema, value)?;
        arena.body_size(schema, self.target, value)
    }

    pub(crate) fn write(
        &self,
        schema: &Schema,
        arena: &CodecArena,
        value: &Value,
        writer: &mut Writer<'_>,
    ) -> Result<(), Error> {
        self.check(schema, value)?;
        arena.write(schema, self.target, value, writer)
    }

    pub(crate) fn read(
        &self,
        schema: &Schema,
        arena: &CodecArena,
        reader: &mut Reader<'_>,
    ) -> Result<Value, Error> {
        arena.read(schema, self.target, reader)
    }

    fn check(&self, schema: &Schema, value: &Value) -> Result<(), Error> {
        let record = expect_record(value)?;
        if record.type_id != self.leaf {
            return Err(Error::UnknownSubtype {
                name: schema.lookup_name(record.type_id),
                ancestor: schema.lookup_name(self.ancestor),
            });
        }
        Ok(())
    }
}

fn expect_record(value: &Value) -> Result<&Record, Error> {
    match value {
        Value::Record(record) => Ok(record),
        other => Err(Error::ValueMismatch {
            expected: "record",
            found: other.kind_name(),
        }),
    }
}

/// Width of the type tag for `count` leaves: 0 for one leaf, else the
/// number of bits needed to index the last leaf.
pub(crate) fn tag_width(count: usize) -> u32 {
    32 - ((count - 1) as u32).leading_zeros()
}
