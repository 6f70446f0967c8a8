use std::{
    cmp::Ordering,
    fmt::{self, Debug, Formatter},
    io::{self, Error, ErrorKind},
};

use crate::{
    dbg::Address,
    runtime::Vm,
    types::{CIntegerField, FieldLocation, LookupError, TypeDataBase},
};

/// Where a Symbol's length lives; it moved into the packed
/// length-and-refcount word in later VM versions, so the location is
/// probed at attach.
pub(crate) enum LengthWhere {
    Plain(CIntegerField),
    /// Length occupies the high 16 bits of the packed word.
    PackedWithRefcount(CIntegerField),
}

pub(crate) struct SymbolFields {
    length: LengthWhere,
    body_offset: u64,
}

impl SymbolFields {
    pub(crate) fn resolve(db: &TypeDataBase) -> Result<Self, LookupError> {
        let ty = db.lookup_type("Symbol")?;
        let length = match ty.c_integer_field("_length") {
            Ok(f) => LengthWhere::Plain(f),
            Err(plain_missing) => match ty.c_integer_field("_length_and_refcount") {
                Ok(f) => LengthWhere::PackedWithRefcount(f),
                Err(_) => return Err(plain_missing),
            },
        };
        let body = ty.field("_body")?;
        let body_offset = match body.location() {
            FieldLocation::Offset(o) => o,
            FieldLocation::Static(_) => {
                return Err(LookupError::FieldKindMismatch {
                    type_name: "Symbol".to_owned(),
                    field: "_body".to_owned(),
                    declared: body.declared_type().to_owned(),
                    wanted: "an instance field",
                })
            }
        };
        Ok(SymbolFields { length, body_offset })
    }
}

/// An interned name in the target VM.
///
/// Symbols are canonical: the VM never keeps two with the same bytes, so
/// identity *and* order are by address. That is what makes
/// [Symbol::fast_compare] a valid sort key for method arrays.
#[derive(Clone)]
pub struct Symbol {
    vm: Vm,
    addr: Address,
}

impl Symbol {
    /// Wraps the symbol at `addr`; nothing verifies the address actually
    /// denotes one.
    pub fn new(vm: Vm, addr: Address) -> Self {
        Self { vm, addr }
    }

    fn fields(&self) -> &SymbolFields {
        &self.vm.inner().symbol
    }

    pub fn address(&self) -> &Address {
        &self.addr
    }

    pub fn length(&self) -> io::Result<usize> {
        let raw = match &self.fields().length {
            LengthWhere::Plain(f) => f.value(&self.addr)?,
            LengthWhere::PackedWithRefcount(f) => (f.value(&self.addr)? >> 16) & 0xffff,
        };
        usize::try_from(raw).map_err(|_| {
            Error::new(ErrorKind::InvalidData, format!("negative symbol length {raw}"))
        })
    }

    /// The symbol's bytes decoded from the VM's modified UTF-8.
    pub fn as_string(&self) -> io::Result<String> {
        let len = self.length()?;
        let bytes = self.addr.bytes_at(self.fields().body_offset, len)?;
        cesu8::from_java_cesu8(&bytes)
            .map(|s| s.into_owned())
            .map_err(|_| Error::from(ErrorKind::InvalidData))
    }

    /// The interned-symbol total order the VM sorts method arrays by.
    pub fn fast_compare(&self, other: &Symbol) -> Ordering {
        self.addr.raw().cmp(&other.addr.raw())
    }
}

impl Debug for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.as_string() {
            Ok(s) => write!(f, "Symbol({:#x}, {s:?})", self.addr.raw()),
            Err(_) => write!(f, "Symbol({:#x}, <unreadable>)", self.addr.raw()),
        }
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl Eq for Symbol {}
