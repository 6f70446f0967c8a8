use std::{
    fmt::{self, Debug, Formatter},
    io,
};

use log::trace;
use thiserror::Error;

use crate::{
    dbg::Address,
    types::{LookupError, TypeDataBase},
};

/// Picks the concrete wrapper for a polymorphic native object given only
/// its address, since no virtual call can be made into the target.
///
/// Registrations form an *ordered list* and the first matching entry wins,
/// so callers must register more-derived types before their bases whenever
/// both could match an address. That ordering is part of the contract, not
/// an implementation detail.
pub struct VirtualConstructor<T> {
    db: TypeDataBase,
    mappings: Vec<Mapping<T>>,
}

struct Mapping<T> {
    type_name: String,
    construct: Box<dyn Fn(Address) -> T + Send + Sync>,
}

#[derive(Debug, Error)]
pub enum WrongTypeError {
    /// No registered native type matched the object at the address.
    #[error("no registered wrapper matches the object at {addr:#x}{hint}")]
    NoMatch { addr: u64, hint: String },
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl<T> VirtualConstructor<T> {
    pub fn new(db: TypeDataBase) -> Self {
        Self { db, mappings: Vec::new() }
    }

    /// Registers a wrapper constructor for a native type name.
    ///
    /// Returns `false`, leaving the registry unchanged, when the name is
    /// already registered; well-behaved setup code registers each name
    /// exactly once, but a re-attempt is reported rather than fatal.
    pub fn add_mapping(
        &mut self,
        type_name: &str,
        construct: impl Fn(Address) -> T + Send + Sync + 'static,
    ) -> bool {
        if self.mappings.iter().any(|m| m.type_name == type_name) {
            return false;
        }
        self.mappings.push(Mapping {
            type_name: type_name.to_owned(),
            construct: Box::new(construct),
        });
        true
    }

    /// Builds the wrapper for the object at `addr`.
    ///
    /// A null (absent) address is "no object", not an error, and is
    /// answered without consulting the registry. An address whose runtime
    /// type matches no registration is a [WrongTypeError::NoMatch].
    pub fn instantiate_wrapper_for(
        &self,
        addr: Option<&Address>,
    ) -> Result<Option<T>, WrongTypeError> {
        let Some(addr) = addr else {
            return Ok(None);
        };
        for m in &self.mappings {
            let ty = self.db.lookup_type(&m.type_name)?;
            if self.db.address_type_is_equal_to_type(addr, &ty)? {
                trace!("object at {:#x} dispatched as {}", addr.raw(), m.type_name);
                return Ok(Some((m.construct)(addr.clone())));
            }
        }
        Err(WrongTypeError::NoMatch {
            addr: addr.raw(),
            hint: dispatch_hint(addr),
        })
    }
}

/// Best-effort decoration for the no-match error: the word at offset 0 is
/// the vtbl slot if the object has one, so resolving it to a symbol often
/// names the actual type. Purely informational; never affects the
/// dispatch outcome.
fn dispatch_hint(addr: &Address) -> String {
    let Ok(word) = addr.pointer_at(0) else {
        return String::new();
    };
    match addr.space().symbol_for_address(word) {
        Some(sym) => format!(" (word at offset 0 is {word:#x}, near symbol {sym:?})"),
        None => format!(" (word at offset 0 is {word:#x})"),
    }
}

impl<T> Debug for VirtualConstructor<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.mappings.iter().map(|m| &m.type_name))
            .finish()
    }
}
