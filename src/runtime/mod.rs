//! Live views over the target VM: the attach context and the runtime
//! wrapper objects.
//!
//! [Vm::attach] is the explicit "database ready" step: it resolves every
//! field descriptor and constant the wrappers will ever need, exactly once,
//! and fails fast if required metadata is absent or the platform is
//! unknown. The handle it returns is cheap to clone and is carried by every
//! wrapper; wrappers themselves are just `(handle, address)` pairs that
//! re-read target memory on each accessor call, so no read is ever staler
//! than the call that produced it.

use std::{
    fmt::{self, Debug, Formatter},
    io,
    sync::Arc,
};

use log::info;
use thiserror::Error;

use crate::{
    dbg::{Address, MachineDescription, SharedSpace},
    oops::{
        ArrayShapes, ConstantPool, InstanceKlass, KlassFields, Metadata, Method, MethodFields,
        SymbolFields,
    },
    types::{LookupError, TypeDataBase},
};

mod virtual_constructor;
pub use virtual_constructor::*;

mod pd;
pub use pd::PdAccess;

mod threads;
pub use threads::*;

mod java_thread;
pub use java_thread::*;

mod object_monitor;
pub use object_monitor::*;

mod object_synchronizer;
pub use object_synchronizer::*;

mod frame;
pub use frame::*;

mod stub_routines;
pub use stub_routines::*;

#[derive(Debug, Error)]
pub enum AttachError {
    #[error("no thread access support for OS {os:?} on CPU {cpu:?}")]
    UnsupportedPlatform { os: String, cpu: String },
    /// A required piece of metadata is absent: the target build and this
    /// tool disagree about the VM's layout.
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error("monitor block size constant {0} is unusable")]
    BadBlockSize(i64),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MetadataTag {
    InstanceKlass,
    Method,
    ConstantPool,
}

pub(crate) struct VmInner {
    space: SharedSpace,
    db: TypeDataBase,
    pub(crate) pd: PdAccess,
    pub(crate) thread_ctor: VirtualConstructor<(ThreadKind, Address)>,
    metadata_ctor: VirtualConstructor<(MetadataTag, Address)>,
    pub(crate) threads: ThreadsStatics,
    pub(crate) thread: ThreadFields,
    pub(crate) monitor: MonitorFields,
    pub(crate) sync: SyncStatics,
    pub(crate) stubs: StubFields,
    pub(crate) arrays: ArrayShapes,
    pub(crate) symbol: SymbolFields,
    pub(crate) method: MethodFields,
    pub(crate) klass: KlassFields,
}

/// Handle to an attached target. Clones share one immutable context; the
/// context is torn down when the last wrapper holding a clone goes away,
/// at which point remaining addresses become meaningless, not invalid.
#[derive(Clone)]
pub struct Vm(Arc<VmInner>);

impl Vm {
    /// Attaches to a target: resolves all field descriptors and constants
    /// against `db` and selects the platform access variant.
    ///
    /// This is the single two-phase initialization point. Any missing
    /// *required* metadata fails here, so wrapper accessors never observe
    /// a half-initialized context; the documented platform-conditional
    /// probes (stub routines, frame-anchor fp, symbol length location)
    /// degrade instead of failing.
    pub fn attach(space: impl Into<SharedSpace>, db: TypeDataBase) -> Result<Vm, AttachError> {
        let space = space.into();
        let machine = space.machine().clone();
        let pd = PdAccess::select(&machine)?;

        let threads = ThreadsStatics::resolve(&db)?;
        let thread = ThreadFields::resolve(&db, pd)?;
        let monitor = MonitorFields::resolve(&db)?;
        let sync = SyncStatics::resolve(&db)?;
        let stubs = StubFields::resolve(&db)?;
        let arrays = ArrayShapes::resolve(&db, &machine)?;
        let symbol = SymbolFields::resolve(&db)?;
        let method = MethodFields::resolve(&db)?;
        let klass = KlassFields::resolve(&db)?;
        let thread_ctor = build_thread_ctor(&db);
        let metadata_ctor = build_metadata_ctor(&db);

        info!(
            "attached to a {}/{} target, pd access {:?}",
            machine.os, machine.cpu, pd
        );

        Ok(Vm(Arc::new(VmInner {
            space,
            db,
            pd,
            thread_ctor,
            metadata_ctor,
            threads,
            thread,
            monitor,
            sync,
            stubs,
            arrays,
            symbol,
            method,
            klass,
        })))
    }

    pub fn space(&self) -> &SharedSpace {
        &self.0.space
    }

    pub fn type_data_base(&self) -> &TypeDataBase {
        &self.0.db
    }

    pub fn machine(&self) -> &MachineDescription {
        self.0.space.machine()
    }

    pub fn pd_access(&self) -> PdAccess {
        self.0.pd
    }

    pub fn threads(&self) -> Threads {
        Threads::new(self.clone())
    }

    pub fn object_synchronizer(&self) -> ObjectSynchronizer {
        ObjectSynchronizer::new(self.clone())
    }

    pub fn stub_routines(&self) -> StubRoutines {
        StubRoutines::new(self.clone())
    }

    /// Dispatches a metadata pointer to its concrete wrapper by runtime
    /// type. A null address is "no object".
    pub fn metadata_at(&self, addr: Option<&Address>) -> Result<Option<Metadata>, WrongTypeError> {
        Ok(self
            .0
            .metadata_ctor
            .instantiate_wrapper_for(addr)?
            .map(|(tag, addr)| match tag {
                MetadataTag::InstanceKlass => {
                    Metadata::InstanceKlass(InstanceKlass::new(self.clone(), addr))
                }
                MetadataTag::Method => Metadata::Method(Method::new(self.clone(), addr)),
                MetadataTag::ConstantPool => {
                    Metadata::ConstantPool(ConstantPool::new(self.clone(), addr))
                }
            }))
    }

    pub(crate) fn inner(&self) -> &VmInner {
        &self.0
    }
}

impl Debug for Vm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let machine = self.machine();
        f.debug_struct("Vm")
            .field("os", &machine.os)
            .field("cpu", &machine.cpu)
            .field("pd", &self.0.pd)
            .finish()
    }
}

/// Thread wrappers are dispatched through the one registry. More-derived
/// thread types go in first; `JavaThread` itself, the base everything else
/// extends, is registered last. Subtypes the target build compiled out are
/// simply not registered.
fn build_thread_ctor(db: &TypeDataBase) -> VirtualConstructor<(ThreadKind, Address)> {
    let mut ctor = VirtualConstructor::new(db.clone());
    for (name, kind) in [
        ("CompilerThread", ThreadKind::Compiler),
        ("CodeCacheSweeperThread", ThreadKind::CodeCacheSweeper),
        ("JvmtiAgentThread", ThreadKind::JvmtiAgent),
        ("ServiceThread", ThreadKind::Service),
    ] {
        if db.lookup_type(name).is_ok() {
            ctor.add_mapping(name, move |addr| (kind, addr));
        }
    }
    ctor.add_mapping("JavaThread", |addr| (ThreadKind::Java, addr));
    ctor
}

fn build_metadata_ctor(db: &TypeDataBase) -> VirtualConstructor<(MetadataTag, Address)> {
    let mut ctor = VirtualConstructor::new(db.clone());
    for (name, tag) in [
        ("InstanceKlass", MetadataTag::InstanceKlass),
        ("Method", MetadataTag::Method),
        ("ConstantPool", MetadataTag::ConstantPool),
    ] {
        if db.lookup_type(name).is_ok() {
            ctor.add_mapping(name, move |addr| (tag, addr));
        }
    }
    ctor
}
