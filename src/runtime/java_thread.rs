use std::{
    fmt::{self, Debug, Formatter},
    hash::{Hash, Hasher},
    io::{self, Error, ErrorKind, Write},
};

use crate::{
    dbg::{Address, OopHandle},
    types::{AddressField, CIntegerField, FieldLocation, LookupError, OopField, TypeDataBase},
};

use super::{Frame, ObjectMonitor, PdAccess, Threads, Vm, WrongTypeError};

/// Which concrete thread subtype the virtual constructor matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadKind {
    Java,
    Compiler,
    CodeCacheSweeper,
    JvmtiAgent,
    Service,
}

/// Execution state of a Java thread, as the VM publishes it. The `*Trans`
/// states are the transition windows the VM passes through between two
/// stable states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadState {
    Uninitialized,
    New,
    NewTrans,
    InNative,
    InNativeTrans,
    InVm,
    InVmTrans,
    InJava,
    InJavaTrans,
    Blocked,
    BlockedTrans,
}

pub(crate) struct ThreadStateConstants {
    values: [(i64, ThreadState); 11],
}

impl ThreadStateConstants {
    fn resolve(db: &TypeDataBase) -> Result<Self, LookupError> {
        use ThreadState::*;
        let c = |name| db.lookup_int_constant(name);
        Ok(ThreadStateConstants {
            values: [
                (c("_thread_uninitialized")?, Uninitialized),
                (c("_thread_new")?, New),
                (c("_thread_new_trans")?, NewTrans),
                (c("_thread_in_native")?, InNative),
                (c("_thread_in_native_trans")?, InNativeTrans),
                (c("_thread_in_vm")?, InVm),
                (c("_thread_in_vm_trans")?, InVmTrans),
                (c("_thread_in_Java")?, InJava),
                (c("_thread_in_Java_trans")?, InJavaTrans),
                (c("_thread_blocked")?, Blocked),
                (c("_thread_blocked_trans")?, BlockedTrans),
            ],
        })
    }

    fn decode(&self, raw: i64) -> io::Result<ThreadState> {
        self.values
            .iter()
            .find(|(v, _)| *v == raw)
            .map(|&(_, s)| s)
            .ok_or_else(|| {
                Error::new(ErrorKind::InvalidData, format!("illegal thread state {raw}"))
            })
    }
}

pub(crate) struct ThreadFields {
    next: AddressField,
    thread_obj: OopField,
    pending_monitor: AddressField,
    waiting_monitor: AddressField,
    stack_base: AddressField,
    stack_size: CIntegerField,
    thread_state: CIntegerField,
    anchor_offset: u64,
    anchor_sp: AddressField,
    anchor_pc: AddressField,
    anchor_fp: Option<AddressField>,
    states: ThreadStateConstants,
}

impl ThreadFields {
    pub(crate) fn resolve(db: &TypeDataBase, pd: PdAccess) -> Result<Self, LookupError> {
        let thread = db.lookup_type("Thread")?;
        let java_thread = db.lookup_type("JavaThread")?;
        let anchor = db.lookup_type("JavaFrameAnchor")?;

        let anchor_field = java_thread.field("_anchor")?;
        let anchor_offset = match anchor_field.location() {
            FieldLocation::Offset(o) => o,
            FieldLocation::Static(_) => {
                return Err(LookupError::FieldKindMismatch {
                    type_name: "JavaThread".to_owned(),
                    field: "_anchor".to_owned(),
                    declared: anchor_field.declared_type().to_owned(),
                    wanted: "an instance field",
                })
            }
        };

        // only frame-pointer platforms publish _last_Java_fp in the anchor
        let anchor_fp = if pd.tracks_frame_pointer() {
            Some(anchor.address_field("_last_Java_fp")?)
        } else {
            None
        };

        Ok(ThreadFields {
            next: java_thread.address_field("_next")?,
            thread_obj: java_thread.oop_field("_threadObj")?,
            pending_monitor: thread.address_field("_current_pending_monitor")?,
            waiting_monitor: thread.address_field("_current_waiting_monitor")?,
            stack_base: thread.address_field("_stack_base")?,
            stack_size: thread.c_integer_field("_stack_size")?,
            thread_state: java_thread.c_integer_field("_thread_state")?,
            anchor_offset,
            anchor_sp: anchor.address_field("_last_Java_sp")?,
            anchor_pc: anchor.address_field("_last_Java_pc")?,
            anchor_fp,
            states: ThreadStateConstants::resolve(db)?,
        })
    }
}

/// One thread of the target VM.
///
/// Wraps exactly one address; every accessor is a fresh read, and two
/// accessor calls against a running target may disagree. Equality and
/// hashing are by target address, since distinct wrapper instances
/// routinely denote the same thread.
#[derive(Clone)]
pub struct JavaThread {
    vm: Vm,
    kind: ThreadKind,
    addr: Address,
}

impl JavaThread {
    pub(crate) fn new(vm: Vm, kind: ThreadKind, addr: Address) -> Self {
        Self { vm, kind, addr }
    }

    fn fields(&self) -> &ThreadFields {
        &self.vm.inner().thread
    }

    /// The thread's identity: the address of its native Thread object.
    pub fn address(&self) -> &Address {
        &self.addr
    }

    pub fn kind(&self) -> ThreadKind {
        self.kind
    }

    pub fn is_compiler_thread(&self) -> bool {
        self.kind == ThreadKind::Compiler
    }

    pub fn is_code_cache_sweeper_thread(&self) -> bool {
        self.kind == ThreadKind::CodeCacheSweeper
    }

    /// Successor on the VM's thread list.
    pub fn next(&self) -> Result<Option<JavaThread>, WrongTypeError> {
        let next = self.fields().next.value(&self.addr)?;
        Threads::new(self.vm.clone()).wrap(next.as_ref())
    }

    /// The `java.lang.Thread` object mirroring this thread, as a heap
    /// reference.
    pub fn thread_obj(&self) -> io::Result<Option<OopHandle>> {
        self.fields().thread_obj.value(&self.addr)
    }

    /// The monitor this thread is blocked trying to enter, if any.
    pub fn current_pending_monitor(&self) -> io::Result<Option<ObjectMonitor>> {
        let addr = self.fields().pending_monitor.value(&self.addr)?;
        Ok(addr.map(|a| ObjectMonitor::new(self.vm.clone(), a)))
    }

    /// The monitor this thread is waiting on in `Object.wait`, if any.
    pub fn current_waiting_monitor(&self) -> io::Result<Option<ObjectMonitor>> {
        let addr = self.fields().waiting_monitor.value(&self.addr)?;
        Ok(addr.map(|a| ObjectMonitor::new(self.vm.clone(), a)))
    }

    pub fn stack_base(&self) -> io::Result<Option<Address>> {
        self.fields().stack_base.value(&self.addr)
    }

    pub fn stack_size(&self) -> io::Result<i64> {
        self.fields().stack_size.value(&self.addr)
    }

    /// Whether `addr` falls within this thread's registered stack range.
    /// The stack grows down from its base, so the base itself is exclusive.
    pub fn is_in_stack(&self, addr: &Address) -> io::Result<bool> {
        let Some(base) = self.stack_base()? else {
            return Ok(false);
        };
        let limit = base.add_offset(-self.stack_size()?);
        Ok(addr.raw() < base.raw() && addr.raw() >= limit.raw())
    }

    pub fn thread_state(&self) -> io::Result<ThreadState> {
        let fields = self.fields();
        let raw = fields.thread_state.value(&self.addr)?;
        fields.states.decode(raw)
    }

    /// The topmost walkable frame this thread published in its anchor, or
    /// `None` when the thread has no last Java frame (e.g. it is running
    /// pure native code).
    pub fn last_frame(&self) -> io::Result<Option<Frame>> {
        let fields = self.fields();
        let anchor = self.addr.add_offset(fields.anchor_offset as i64);
        let Some(sp) = fields.anchor_sp.value(&anchor)? else {
            return Ok(None);
        };
        let pc = fields.anchor_pc.value(&anchor)?;
        let fp = match &fields.anchor_fp {
            Some(field) => field.value(&anchor)?,
            None => None,
        };
        Ok(Some(Frame::new(sp, fp, pc)))
    }

    /// Writes a human-readable description of this thread.
    pub fn print_thread_info_on(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "{:?} thread @ {:#x}", self.kind, self.addr.raw())?;
        writeln!(out, "   state: {:?}", self.thread_state()?)?;
        match (self.stack_base()?, self.stack_size()?) {
            (Some(base), size) => {
                let limit = base.add_offset(-size);
                writeln!(out, "   stack: [{:#x}, {:#x})", limit.raw(), base.raw())?;
            }
            (None, _) => writeln!(out, "   stack: unknown")?,
        }
        if let Some(pending) = self.current_pending_monitor()? {
            writeln!(out, "   pending on monitor @ {:#x}", pending.address().raw())?;
        }
        if let Some(waiting) = self.current_waiting_monitor()? {
            writeln!(out, "   waiting on monitor @ {:#x}", waiting.address().raw())?;
        }
        Ok(())
    }
}

impl Debug for JavaThread {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "JavaThread({:?}, {:#x})", self.kind, self.addr.raw())
    }
}

impl PartialEq for JavaThread {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl Eq for JavaThread {}

impl Hash for JavaThread {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
    }
}
