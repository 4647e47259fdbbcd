//! Schema descriptors: the registration contract that replaces reflection.
//!
//! Every composite type is declared up front and then defined with an
//! ordered field list. The declared field order is the canonical
//! construction order: decoding produces field values positionally in
//! exactly this order.

use rustc_hash::FxHashMap;

use crate::error::Error;

/// Opaque handle to a declared type.
///
/// Assigned by [`Schema::declare`]; stable for the lifetime of the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub(crate) u32);

/// Supported concrete collection kinds.
///
/// The kind is part of the type reference, so `List<I32>` and
/// `SortedSet<I32>` derive distinct codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    /// Growable array, iteration in insertion order.
    List,
    /// Double-ended queue, iteration in insertion order.
    Deque,
    /// Unique-membership set, unspecified iteration order.
    HashSet,
    /// Unique-membership set, insertion-order iteration.
    OrderedSet,
    /// Unique-membership set, sorted-order iteration.
    SortedSet,
}

impl CollectionKind {
    /// Kind name for error messages.
    pub fn name(self) -> &'static str {
        match self {
            CollectionKind::List => "list",
            CollectionKind::Deque => "deque",
            CollectionKind::HashSet => "hash set",
            CollectionKind::OrderedSet => "ordered set",
            CollectionKind::SortedSet => "sorted set",
        }
    }
}

/// A fully parameterized type reference.
///
/// `TypeRef` is the codec cache key: two references share a codec iff they
/// are equal, including all type arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Text,
    /// Homogeneous array of the element type.
    Array(Box<TypeRef>),
    /// Supported collection of the element type.
    Collection(CollectionKind, Box<TypeRef>),
    /// A declared composite or abstract type.
    Named(TypeId),
}

impl TypeRef {
    /// Reference to a declared type.
    pub fn named(id: TypeId) -> TypeRef {
        TypeRef::Named(id)
    }

    /// Array of `elem`.
    pub fn array(elem: TypeRef) -> TypeRef {
        TypeRef::Array(Box::new(elem))
    }

    /// List of `elem`.
    pub fn list(elem: TypeRef) -> TypeRef {
        TypeRef::Collection(CollectionKind::List, Box::new(elem))
    }

    /// Collection of `elem` with an explicit kind.
    pub fn collection(kind: CollectionKind, elem: TypeRef) -> TypeRef {
        TypeRef::Collection(kind, Box::new(elem))
    }
}

/// One field descriptor: name, declared type, nullability.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub(crate) name: String,
    pub(crate) ty: TypeRef,
    pub(crate) nullable: bool,
}

/// Builder for a concrete record definition.
///
/// Fields are encoded in the order they are added here.
#[derive(Debug, Clone, Default)]
pub struct RecordDef {
    pub(crate) fields: Vec<FieldDef>,
    pub(crate) parents: Vec<TypeId>,
}

impl RecordDef {
    pub fn new() -> RecordDef {
        RecordDef::default()
    }

    /// Adds a non-nullable field.
    pub fn field(mut self, name: impl Into<String>, ty: TypeRef) -> RecordDef {
        self.fields.push(FieldDef {
            name: name.into(),
            ty,
            nullable: false,
        });
        self
    }

    /// Adds a nullable field (one presence bit in the shared header).
    pub fn nullable(mut self, name: impl Into<String>, ty: TypeRef) -> RecordDef {
        self.fields.push(FieldDef {
            name: name.into(),
            ty,
            nullable: true,
        });
        self
    }

    /// Declares a direct supertype or implemented interface.
    pub fn parent(mut self, id: TypeId) -> RecordDef {
        self.parents.push(id);
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) enum TypeDef {
    /// Concrete record with ordered fields.
    Record { fields: Vec<FieldDef> },
    /// Abstract or interface node; only usable through registered subtypes.
    Abstract,
}

#[derive(Debug, Clone)]
struct TypeEntry {
    name: String,
    parents: Vec<TypeId>,
    def: Option<TypeDef>,
}

/// Registry of declared types.
///
/// Declaration and definition are separate steps so mutually recursive
/// records can reference each other's [`TypeId`] before either is defined.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    types: Vec<TypeEntry>,
    by_name: FxHashMap<String, TypeId>,
}

impl Schema {
    pub fn new() -> Schema {
        Schema::default()
    }

    /// Declares a type name and returns its handle.
    ///
    /// Declaring the same name twice returns the existing handle.
    pub fn declare(&mut self, name: impl Into<String>) -> TypeId {
        let name = name.into();
        if let Some(&id) = self.by_name.get(&name) {
            return id;
        }
        let id = TypeId(self.types.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.types.push(TypeEntry {
            name,
            parents: Vec::new(),
            def: None,
        });
        id
    }

    /// Defines a declared type as a concrete record.
    pub fn define_record(&mut self, id: TypeId, def: RecordDef) -> Result<(), Error> {
        let entry = &mut self.types[id.0 as usize];
        if entry.def.is_some() {
            return Err(Error::TypeRedefined {
                name: entry.name.clone(),
            });
        }
        entry.parents = def.parents;
        entry.def = Some(TypeDef::Record { fields: def.fields });
        Ok(())
    }

    /// Defines a declared type as abstract, with its direct parents.
    pub fn define_abstract(&mut self, id: TypeId, parents: &[TypeId]) -> Result<(), Error> {
        let entry = &mut self.types[id.0 as usize];
        if entry.def.is_some() {
            return Err(Error::TypeRedefined {
                name: entry.name.clone(),
            });
        }
        entry.parents = parents.to_vec();
        entry.def = Some(TypeDef::Abstract);
        Ok(())
    }

    /// Convenience: declare and define a record in one step.
    pub fn record(&mut self, name: impl Into<String>, def: RecordDef) -> Result<TypeId, Error> {
        let id = self.declare(name);
        self.define_record(id, def)?;
        Ok(id)
    }

    /// Returns the declared name of a type.
    pub fn name(&self, id: TypeId) -> &str {
        &self.types[id.0 as usize].name
    }

    /// Name lookup that tolerates handles from a foreign schema; used in
    /// error paths only.
    pub(crate) fn lookup_name(&self, id: TypeId) -> String {
        match self.types.get(id.0 as usize) {
            Some(entry) => entry.name.clone(),
            None => format!("#{}", id.0),
        }
    }

    pub(crate) fn parents(&self, id: TypeId) -> &[TypeId] {
        &self.types[id.0 as usize].parents
    }

    pub(crate) fn def(&self, id: TypeId) -> Result<&TypeDef, Error> {
        self.types[id.0 as usize].def.as_ref().ok_or_else(|| {
            Error::UndefinedType {
                name: self.name(id).to_string(),
            }
        })
    }

    pub(crate) fn is_concrete(&self, id: TypeId) -> bool {
        matches!(self.types[id.0 as usize].def, Some(TypeDef::Record { .. }))
    }
}
