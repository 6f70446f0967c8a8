use std::{
    fmt::{self, Debug, Formatter},
    io::{self, Write},
};

use crate::{
    dbg::{Address, OopHandle},
    types::{AddressField, CIntegerField, FieldLocation, LookupError, TypeDataBase},
};

use super::Vm;

pub(crate) struct MonitorFields {
    header_offset: u64,
    object_offset: u64,
    owner_offset: u64,
    count: CIntegerField,
    waiters: CIntegerField,
    recursions: CIntegerField,
    free_next: AddressField,
    pub(crate) type_size: u64,
}

impl MonitorFields {
    pub(crate) fn resolve(db: &TypeDataBase) -> Result<Self, LookupError> {
        let ty = db.lookup_type("ObjectMonitor")?;
        // _header, _object and _owner are published without a usable type
        // (they are raw words in the VM too), so they are read through
        // plain offsets
        let raw_offset = |name: &str| -> Result<u64, LookupError> {
            let f = ty.field(name)?;
            match f.location() {
                FieldLocation::Offset(o) => Ok(o),
                FieldLocation::Static(_) => Err(LookupError::FieldKindMismatch {
                    type_name: "ObjectMonitor".to_owned(),
                    field: name.to_owned(),
                    declared: f.declared_type().to_owned(),
                    wanted: "an instance field",
                }),
            }
        };
        Ok(MonitorFields {
            header_offset: raw_offset("_header")?,
            object_offset: raw_offset("_object")?,
            owner_offset: raw_offset("_owner")?,
            count: ty.c_integer_field("_count")?,
            waiters: ty.c_integer_field("_waiters")?,
            recursions: ty.c_integer_field("_recursions")?,
            free_next: ty.address_field("FreeNext")?,
            type_size: ty.size(),
        })
    }
}

/// An inflated monitor in the target VM.
///
/// Reads are live and individually atomic at best: reading `owner` and then
/// `count` is *not* an atomic pair, and against a running target the two
/// can describe different moments. Callers wanting a coherent picture must
/// quiesce the target first.
#[derive(Clone)]
pub struct ObjectMonitor {
    vm: Vm,
    addr: Address,
}

impl ObjectMonitor {
    /// Wraps the monitor at `addr`. Construction is just address-wrapping;
    /// nothing verifies the address actually denotes a monitor.
    pub fn new(vm: Vm, addr: Address) -> Self {
        Self { vm, addr }
    }

    fn fields(&self) -> &MonitorFields {
        &self.vm.inner().monitor
    }

    pub fn address(&self) -> &Address {
        &self.addr
    }

    /// The displaced mark word.
    pub fn header_word(&self) -> io::Result<u64> {
        self.addr.pointer_at(self.fields().header_offset)
    }

    /// The Java object this monitor is inflated for.
    pub fn object(&self) -> io::Result<Option<OopHandle>> {
        self.addr.oop_handle_at(self.fields().object_offset)
    }

    /// The raw owner word: a `JavaThread` address for an inflated monitor
    /// held by a thread, or an address inside the owning thread's stack for
    /// a lock that was inflated while stack-locked. Resolving it to a
    /// thread is [super::Threads::owning_thread_from_monitor]'s job.
    pub fn owner(&self) -> io::Result<Option<Address>> {
        self.addr.address_at(self.fields().owner_offset)
    }

    pub fn count(&self) -> io::Result<i64> {
        self.fields().count.value(&self.addr)
    }

    pub fn waiters(&self) -> io::Result<i64> {
        self.fields().waiters.value(&self.addr)
    }

    pub fn recursions(&self) -> io::Result<i64> {
        self.fields().recursions.value(&self.addr)
    }

    /// Next block on the free-monitor chain; meaningful only on the block
    /// header monitor (slot 0 of a block).
    pub fn free_next(&self) -> io::Result<Option<ObjectMonitor>> {
        let next = self.fields().free_next.value(&self.addr)?;
        Ok(next.map(|a| ObjectMonitor::new(self.vm.clone(), a)))
    }

    /// Number of threads contending for entry.
    ///
    /// Windows targets account the owner inside `_count`, so it is
    /// subtracted there to keep the meaning uniform across targets.
    pub fn contentions(&self) -> io::Result<i64> {
        let count = self.count()?;
        if self.vm.inner().pd.is_windows() {
            Ok(count - 1)
        } else {
            Ok(count)
        }
    }

    /// Writes a human-readable description of this monitor.
    pub fn print_info_on(&self, out: &mut dyn Write) -> io::Result<()> {
        write!(out, "monitor @ {:#x}:", self.addr.raw())?;
        match self.object()? {
            Some(obj) => write!(out, " object = {:#x},", obj.raw())?,
            None => write!(out, " object = null,")?,
        }
        match self.owner()? {
            Some(owner) => write!(out, " owner = {:#x},", owner.raw())?,
            None => write!(out, " owner = null,")?,
        }
        writeln!(
            out,
            " count = {}, waiters = {}, recursions = {}",
            self.count()?,
            self.waiters()?,
            self.recursions()?
        )
    }
}

impl Debug for ObjectMonitor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectMonitor({:#x})", self.addr.raw())
    }
}

impl PartialEq for ObjectMonitor {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl Eq for ObjectMonitor {}
