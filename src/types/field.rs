use std::io::{self, Error, ErrorKind};

use crate::dbg::{Address, OopHandle, SharedSpace};

use super::FieldLocation;

fn misuse(msg: &'static str) -> Error {
    Error::new(ErrorKind::InvalidInput, msg)
}

/// Accessor for one C integer field: a resolved location plus width and
/// signedness. Every call re-reads the target; nothing is cached, so a
/// value is never staler than the accessor call that produced it.
///
/// No descriptor validates its base address. Reading through a base that
/// does not denote a live instance of the expected type yields garbage or
/// a transport error; establishing the base is the caller's job, normally
/// via the virtual constructor.
#[derive(Debug, Clone)]
pub struct CIntegerField {
    location: FieldLocation,
    size: u64,
    signed: bool,
}

impl CIntegerField {
    pub(crate) fn new(location: FieldLocation, size: u64, signed: bool) -> Self {
        Self { location, size, signed }
    }

    pub fn value(&self, base: &Address) -> io::Result<i64> {
        match self.location {
            FieldLocation::Offset(o) => base.c_integer_at(o, self.size as usize, self.signed),
            FieldLocation::Static(_) => Err(misuse("static field read through a base address")),
        }
    }

    pub fn static_value(&self, space: &SharedSpace) -> io::Result<i64> {
        match self.location {
            FieldLocation::Static(a) => {
                space.addr(a).c_integer_at(0, self.size as usize, self.signed)
            }
            FieldLocation::Offset(_) => Err(misuse("instance field read as a static")),
        }
    }

    pub fn offset(&self) -> Option<u64> {
        match self.location {
            FieldLocation::Offset(o) => Some(o),
            FieldLocation::Static(_) => None,
        }
    }
}

macro_rules! pointer_field {
    ($(#[$doc:meta])* $name:ident -> $value:ty, |$addr:ident, $off:ident| $read:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name {
            location: FieldLocation,
        }

        impl $name {
            pub(crate) fn new(location: FieldLocation) -> Self {
                Self { location }
            }

            pub fn value(&self, base: &Address) -> io::Result<Option<$value>> {
                match self.location {
                    FieldLocation::Offset(o) => {
                        let ($addr, $off) = (base, o);
                        $read
                    }
                    FieldLocation::Static(_) => {
                        Err(misuse("static field read through a base address"))
                    }
                }
            }

            pub fn static_value(&self, space: &SharedSpace) -> io::Result<Option<$value>> {
                match self.location {
                    FieldLocation::Static(a) => {
                        let ($addr, $off) = (&space.addr(a), 0);
                        $read
                    }
                    FieldLocation::Offset(_) => Err(misuse("instance field read as a static")),
                }
            }

            pub fn offset(&self) -> Option<u64> {
                match self.location {
                    FieldLocation::Offset(o) => Some(o),
                    FieldLocation::Static(_) => None,
                }
            }
        }
    };
}

pointer_field! {
    /// Accessor for a pointer field; a null pointer reads as `None`.
    AddressField -> Address, |addr, off| addr.address_at(off)
}

pointer_field! {
    /// Accessor for a field holding a Java heap reference.
    OopField -> OopHandle, |addr, off| addr.oop_handle_at(off)
}

pointer_field! {
    /// Accessor for a field pointing at VM metadata (klasses, methods,
    /// symbol and constant-pool structures).
    MetadataField -> Address, |addr, off| addr.address_at(off)
}
