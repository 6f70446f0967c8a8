//! Access to the target's address space.
//!
//! Everything above this module sees the target process through two small
//! abstractions: [AddressSpace], a transport that can read raw bytes (a
//! live-process reader, a core file reader), and [Address], a typed location
//! within such a space. Neither owns the memory it points at; the target is
//! free to mutate or unmap any of it between two reads.

use std::{fmt::Debug, io, ops::Deref, sync::Arc};

mod address;
pub use address::*;

#[cfg(target_os = "linux")]
pub mod procmem;

/// Reported identity and word layout of the target machine.
///
/// `os` and `cpu` are whatever strings the transport reports (`"linux"`,
/// `"windows"`, `"amd64"`, `"aarch64"`, ...); platform selection at attach
/// time matches on them verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineDescription {
    pub os: String,
    pub cpu: String,
    /// Size of a target pointer in bytes, 4 or 8.
    pub pointer_size: usize,
    pub big_endian: bool,
}

/// Raw read access to a remote address space.
///
/// Implementations do not interpret what they read; all layout knowledge
/// lives in the type database layer above. The symbol queries are
/// best-effort and allowed to always return `None` (stripped core files,
/// plain `/proc` readers).
pub trait AddressSpace: Debug + Send + Sync {
    /// Reads exactly `buf.len()` bytes starting at `addr`.
    fn read_bytes(&self, addr: u64, buf: &mut [u8]) -> io::Result<()>;

    fn machine(&self) -> &MachineDescription;

    /// Address of the named symbol in the target, if known.
    fn symbol_address(&self, name: &str) -> Option<u64>;

    /// Name of a symbol covering `addr`, if known. Used only to decorate
    /// diagnostics, never for dispatch decisions.
    fn symbol_for_address(&self, addr: u64) -> Option<String>;
}

/// Cheaply clonable handle to the target address space; every [Address] and
/// every runtime wrapper holds one.
#[derive(Debug, Clone)]
pub struct SharedSpace(Arc<dyn AddressSpace>);

impl SharedSpace {
    pub fn new(space: impl AddressSpace + 'static) -> Self {
        Self(Arc::new(space))
    }

    /// An [Address] denoting `raw` within this space.
    pub fn addr(&self, raw: u64) -> Address {
        Address::new(self.clone(), raw)
    }

    pub(crate) fn same_space(&self, other: &SharedSpace) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for SharedSpace {
    type Target = dyn AddressSpace;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl<S: AddressSpace + 'static> From<S> for SharedSpace {
    fn from(space: S) -> Self {
        Self::new(space)
    }
}
