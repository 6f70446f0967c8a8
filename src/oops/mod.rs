//! Wrappers over the target's metadata objects: klasses, methods, symbols
//! and the arrays that tie them together.

use std::io::{self, Error, ErrorKind};

use bitflags::bitflags;

use crate::dbg::Address;

mod array;
pub use array::*;

mod symbol;
pub use symbol::*;

mod method;
pub use method::*;

mod instance_klass;
pub use instance_klass::*;

bitflags! {
    /// `JVM_ACC_*` access and attribute bits as the VM stores them per
    /// field and method. Only the bits this crate interprets are named;
    /// unknown bits are retained.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessFlags: u32 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const NATIVE = 0x0100;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        /// The field carries a trailing generic-signature slot, appended
        /// out-of-band at the end of the field-info array.
        const FIELD_HAS_GENERIC_SIGNATURE = 0x0800;
    }
}

impl AccessFlags {
    pub fn from_raw(bits: u32) -> Self {
        Self::from_bits_retain(bits)
    }

    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    pub fn field_has_generic_signature(self) -> bool {
        self.contains(Self::FIELD_HAS_GENERIC_SIGNATURE)
    }
}

/// A metadata object whose concrete type was recovered from its vtbl by
/// the virtual constructor.
#[derive(Debug, Clone)]
pub enum Metadata {
    InstanceKlass(InstanceKlass),
    Method(Method),
    ConstantPool(ConstantPool),
}

impl Metadata {
    pub fn address(&self) -> &Address {
        match self {
            Metadata::InstanceKlass(k) => k.address(),
            Metadata::Method(m) => m.address(),
            Metadata::ConstantPool(p) => p.address(),
        }
    }
}

// a null pointer where well-formed metadata guarantees a value means the
// target is mid-mutation or corrupt; surfaced as data errors, not panics
pub(crate) fn require(addr: Option<Address>, what: &str) -> io::Result<Address> {
    addr.ok_or_else(|| Error::new(ErrorKind::InvalidData, format!("unexpected null {what}")))
}
