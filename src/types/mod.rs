//! The type database: per-type sizes, field layouts, and integer constants
//! published by the target VM build.
//!
//! A database is assembled once by a loader (usually [hotspot], reading the
//! table the VM embeds in its own binary) and is immutable afterwards.
//! Every layout question the runtime wrappers ever ask — "how big is an
//! `ObjectMonitor`", "where is `_owner`", "what is `_BLOCKSIZE`" — is
//! answered here, and an item the target build never defined fails with a
//! distinguishable [LookupError] rather than a silent null.

use std::{collections::HashMap, io, sync::Arc};

use thiserror::Error;

use crate::dbg::{Address, MachineDescription};

mod field;
pub use field::*;

pub mod hotspot;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("type {0:?} is not defined by the target VM build")]
    UnknownType(String),
    #[error("type {type_name:?} has no field {field:?}")]
    UnknownField { type_name: String, field: String },
    #[error("integer constant {0:?} is not defined by the target VM build")]
    UnknownConstant(String),
    #[error("field {type_name}::{field} is declared as {declared:?}, not usable as {wanted}")]
    FieldKindMismatch {
        type_name: String,
        field: String,
        declared: String,
        wanted: &'static str,
    },
}

/// How a field's declared native type maps onto a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldKind {
    CInteger { size: u64, signed: bool },
    Address,
    Oop,
    Metadata,
    /// Embedded struct, or a type this database cannot size. Only the
    /// field's offset is usable.
    Opaque,
}

/// Where a field lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLocation {
    /// Byte offset from the start of the enclosing object.
    Offset(u64),
    /// Absolute target address of a static field.
    Static(u64),
}

/// One field record inside a [Type]: resolved location plus declared type.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    declared_type: String,
    location: FieldLocation,
    kind: FieldKind,
}

impl Field {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_type(&self) -> &str {
        &self.declared_type
    }

    pub fn location(&self) -> FieldLocation {
        self.location
    }

    /// Byte offset for instance fields, `None` for statics.
    pub fn offset(&self) -> Option<u64> {
        match self.location {
            FieldLocation::Offset(o) => Some(o),
            FieldLocation::Static(_) => None,
        }
    }

    pub fn is_static(&self) -> bool {
        matches!(self.location, FieldLocation::Static(_))
    }
}

#[derive(Debug)]
struct TypeInner {
    name: String,
    superclass: Option<String>,
    size: u64,
    /// Own fields plus inherited ones, flattened at build time; own fields
    /// shadow same-named inherited ones.
    fields: HashMap<String, Field>,
    vtbl: Option<u64>,
    /// Size of the region defined by the topmost polymorphic superclass;
    /// `None` when the type is not polymorphic.
    poly_region_size: Option<u64>,
}

/// A named native type: total size plus field layout. Immutable; cheap to
/// clone.
#[derive(Debug, Clone)]
pub struct Type(Arc<TypeInner>);

impl Type {
    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn size(&self) -> u64 {
        self.0.size
    }

    pub fn superclass_name(&self) -> Option<&str> {
        self.0.superclass.as_deref()
    }

    pub fn field(&self, name: &str) -> Result<&Field, LookupError> {
        self.0.fields.get(name).ok_or_else(|| LookupError::UnknownField {
            type_name: self.0.name.clone(),
            field: name.to_owned(),
        })
    }

    /// All fields of this type, inherited ones included, in no particular
    /// order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.0.fields.values()
    }

    fn mismatch(&self, f: &Field, wanted: &'static str) -> LookupError {
        LookupError::FieldKindMismatch {
            type_name: self.0.name.clone(),
            field: f.name.clone(),
            declared: f.declared_type.clone(),
            wanted,
        }
    }

    pub fn c_integer_field(&self, name: &str) -> Result<CIntegerField, LookupError> {
        let f = self.field(name)?;
        match f.kind {
            FieldKind::CInteger { size, signed } => {
                Ok(CIntegerField::new(f.location, size, signed))
            }
            _ => Err(self.mismatch(f, "a C integer")),
        }
    }

    pub fn address_field(&self, name: &str) -> Result<AddressField, LookupError> {
        let f = self.field(name)?;
        match f.kind {
            FieldKind::Address | FieldKind::Metadata => Ok(AddressField::new(f.location)),
            _ => Err(self.mismatch(f, "an address")),
        }
    }

    pub fn oop_field(&self, name: &str) -> Result<OopField, LookupError> {
        let f = self.field(name)?;
        match f.kind {
            FieldKind::Oop => Ok(OopField::new(f.location)),
            _ => Err(self.mismatch(f, "an oop")),
        }
    }

    pub fn metadata_field(&self, name: &str) -> Result<MetadataField, LookupError> {
        let f = self.field(name)?;
        match f.kind {
            FieldKind::Metadata | FieldKind::Address => Ok(MetadataField::new(f.location)),
            _ => Err(self.mismatch(f, "a metadata pointer")),
        }
    }
}

#[derive(Debug)]
struct DbInner {
    types: HashMap<String, Type>,
    constants: HashMap<String, i64>,
}

/// The frozen database. Lookups are deterministic and total for anything
/// the target build defines; everything else is a [LookupError].
#[derive(Debug, Clone)]
pub struct TypeDataBase(Arc<DbInner>);

impl TypeDataBase {
    pub fn builder() -> TypeDataBaseBuilder {
        TypeDataBaseBuilder::default()
    }

    pub fn lookup_type(&self, name: &str) -> Result<Type, LookupError> {
        self.0
            .types
            .get(name)
            .cloned()
            .ok_or_else(|| LookupError::UnknownType(name.to_owned()))
    }

    pub fn lookup_int_constant(&self, name: &str) -> Result<i64, LookupError> {
        self.0
            .constants
            .get(name)
            .copied()
            .ok_or_else(|| LookupError::UnknownConstant(name.to_owned()))
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.0.types.keys().map(String::as_str)
    }

    /// Whether the object at `addr` has the exact runtime type `ty`.
    ///
    /// Decided by comparing candidate dispatch-table words of the object —
    /// the word at offset 0, and the last two pointer-aligned words of the
    /// region defined by the topmost polymorphic superclass (where older
    /// compilers put the vptr) — against the vtbl address registered for
    /// `ty`. A type with no registered vtbl is not polymorphic and never
    /// matches. An unreadable word at offset 0 propagates; the trailing
    /// candidates are a heuristic and an unreadable word there is just a
    /// mismatch, since the real object may be smaller than `ty`.
    pub fn address_type_is_equal_to_type(&self, addr: &Address, ty: &Type) -> io::Result<bool> {
        let Some(vtbl) = ty.0.vtbl else {
            return Ok(false);
        };
        if addr.pointer_at(0)? == vtbl {
            return Ok(true);
        }
        let ptr = addr.space().machine().pointer_size as u64;
        if let Some(region) = ty.0.poly_region_size {
            let end = region & !(ptr - 1);
            for k in 1..=2 {
                if end >= ptr * (k + 1) {
                    if let Ok(word) = addr.pointer_at(end - ptr * k) {
                        if word == vtbl {
                            return Ok(true);
                        }
                    }
                }
            }
        }
        Ok(false)
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("superclass cycle through type {0:?}")]
    SuperclassCycle(String),
}

#[derive(Debug, Clone)]
struct RawField {
    name: String,
    declared_type: String,
    location: FieldLocation,
}

#[derive(Debug, Clone, Default)]
struct RawType {
    superclass: Option<String>,
    size: u64,
    fields: Vec<RawField>,
}

/// Accumulates loader output, then freezes it into a [TypeDataBase].
///
/// Declaration order does not matter: a field may name a type that is only
/// added later, and a field on a type the loader never declares creates
/// that type with unknown (zero) size, the way struct tables reference
/// types the type table omits.
#[derive(Debug, Default)]
pub struct TypeDataBaseBuilder {
    types: HashMap<String, RawType>,
    integers: HashMap<String, (u64, bool)>,
    constants: HashMap<String, i64>,
    vtbls: HashMap<String, u64>,
}

impl TypeDataBaseBuilder {
    /// A builder pre-seeded with the C/JVM integer types every HotSpot
    /// build uses, sized for the given target machine.
    pub fn with_standard_integer_types(machine: &MachineDescription) -> Self {
        let ptr = machine.pointer_size as u64;
        let mut b = Self::default();
        for (name, size, signed) in [
            ("jbyte", 1, true),
            ("jboolean", 1, false),
            ("jchar", 2, false),
            ("jshort", 2, true),
            ("jint", 4, true),
            ("jlong", 8, true),
            ("u1", 1, false),
            ("u2", 2, false),
            ("u4", 4, false),
            ("u8", 8, false),
            ("char", 1, true),
            ("bool", 1, false),
            ("short", 2, true),
            ("int", 4, true),
            ("unsigned int", 4, false),
            ("uint", 4, false),
            ("uint32_t", 4, false),
            ("int32_t", 4, true),
            ("uint64_t", 8, false),
            ("int64_t", 8, true),
            ("intptr_t", ptr, true),
            ("uintptr_t", ptr, false),
            ("size_t", ptr, false),
        ] {
            b.add_integer_type(name, size, signed);
        }
        b
    }

    pub fn add_type(&mut self, name: &str, superclass: Option<&str>, size: u64) -> &mut Self {
        let raw = self.types.entry(name.to_owned()).or_default();
        raw.superclass = superclass.map(str::to_owned);
        raw.size = size;
        self
    }

    pub fn add_integer_type(&mut self, name: &str, size: u64, signed: bool) -> &mut Self {
        self.integers.insert(name.to_owned(), (size, signed));
        self
    }

    pub fn add_field(
        &mut self,
        type_name: &str,
        field: &str,
        declared_type: &str,
        offset: u64,
    ) -> &mut Self {
        self.push_field(type_name, field, declared_type, FieldLocation::Offset(offset))
    }

    pub fn add_static_field(
        &mut self,
        type_name: &str,
        field: &str,
        declared_type: &str,
        address: u64,
    ) -> &mut Self {
        self.push_field(type_name, field, declared_type, FieldLocation::Static(address))
    }

    fn push_field(
        &mut self,
        type_name: &str,
        field: &str,
        declared_type: &str,
        location: FieldLocation,
    ) -> &mut Self {
        self.types
            .entry(type_name.to_owned())
            .or_default()
            .fields
            .push(RawField {
                name: field.to_owned(),
                declared_type: declared_type.to_owned(),
                location,
            });
        self
    }

    pub fn add_int_constant(&mut self, name: &str, value: i64) -> &mut Self {
        self.constants.insert(name.to_owned(), value);
        self
    }

    /// Registers the dispatch-table address of a polymorphic type; the
    /// address must be what an object's vptr actually holds.
    pub fn add_vtbl(&mut self, type_name: &str, address: u64) -> &mut Self {
        self.vtbls.insert(type_name.to_owned(), address);
        self
    }

    fn field_kind(&self, declared: &str) -> FieldKind {
        if let Some(&(size, signed)) = self.integers.get(declared) {
            return FieldKind::CInteger { size, signed };
        }
        match declared {
            "address" | "void*" => FieldKind::Address,
            "oop" | "markOop" | "markWord" | "HeapWord*" => FieldKind::Oop,
            _ => match declared.strip_suffix('*') {
                Some(pointee) if METADATA_TYPES.contains(&pointee.trim_end()) => {
                    FieldKind::Metadata
                }
                Some(_) => FieldKind::Address,
                None => FieldKind::Opaque,
            },
        }
    }

    /// The chain from the root superclass down to `name` itself, so that
    /// flattening lets subclass fields shadow inherited ones.
    fn chain_of(&self, name: &str) -> Result<Vec<String>, BuildError> {
        let mut chain = vec![name.to_owned()];
        let mut cur = name;
        while let Some(sup) = self.types.get(cur).and_then(|t| t.superclass.as_deref()) {
            if chain.iter().any(|n| n == sup) {
                return Err(BuildError::SuperclassCycle(sup.to_owned()));
            }
            chain.push(sup.to_owned());
            cur = sup;
        }
        chain.reverse();
        Ok(chain)
    }

    pub fn build(self) -> Result<TypeDataBase, BuildError> {
        let mut types = HashMap::new();

        for (name, &(size, _)) in &self.integers {
            types.insert(
                name.clone(),
                Type(Arc::new(TypeInner {
                    name: name.clone(),
                    superclass: None,
                    size,
                    fields: HashMap::new(),
                    vtbl: None,
                    poly_region_size: None,
                })),
            );
        }

        for name in self.types.keys() {
            let chain = self.chain_of(name)?;

            let mut fields = HashMap::new();
            for link in &chain {
                if let Some(raw) = self.types.get(link) {
                    for f in &raw.fields {
                        fields.insert(
                            f.name.clone(),
                            Field {
                                name: f.name.clone(),
                                declared_type: f.declared_type.clone(),
                                location: f.location,
                                kind: self.field_kind(&f.declared_type),
                            },
                        );
                    }
                }
            }

            let vtbl = self.vtbls.get(name).copied();
            let poly_region_size = vtbl.and_then(|_| {
                chain
                    .iter()
                    .find(|link| self.vtbls.contains_key(*link))
                    .and_then(|link| self.types.get(link))
                    .map(|raw| raw.size)
            });

            let raw = &self.types[name];
            types.insert(
                name.clone(),
                Type(Arc::new(TypeInner {
                    name: name.clone(),
                    superclass: raw.superclass.clone(),
                    size: raw.size,
                    fields,
                    vtbl,
                    poly_region_size,
                })),
            );
        }

        log::debug!(
            "type database frozen: {} types, {} constants",
            types.len(),
            self.constants.len()
        );

        Ok(TypeDataBase(Arc::new(DbInner {
            types,
            constants: self.constants,
        })))
    }
}

const METADATA_TYPES: &[&str] = &[
    "Metadata",
    "Klass",
    "InstanceKlass",
    "ArrayKlass",
    "Method",
    "ConstMethod",
    "MethodData",
    "ConstantPool",
    "ConstantPoolCache",
    "Symbol",
    "Array<u2>",
    "Array<Method*>",
];
