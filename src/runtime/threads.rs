use std::io;

use crate::{
    dbg::Address,
    types::{AddressField, CIntegerField, LookupError, TypeDataBase},
};

use super::{JavaThread, ObjectMonitor, Vm, WrongTypeError};

pub(crate) struct ThreadsStatics {
    pub(crate) thread_list: AddressField,
    pub(crate) number_of_threads: CIntegerField,
}

impl ThreadsStatics {
    pub(crate) fn resolve(db: &TypeDataBase) -> Result<Self, LookupError> {
        let ty = db.lookup_type("Threads")?;
        Ok(ThreadsStatics {
            thread_list: ty.address_field("_thread_list")?,
            number_of_threads: ty.c_integer_field("_number_of_threads")?,
        })
    }
}

/// View of the target's thread registry: the head of the linked thread
/// list plus the monitor/thread queries that need a full list walk.
#[derive(Debug, Clone)]
pub struct Threads {
    vm: Vm,
}

impl Threads {
    pub(crate) fn new(vm: Vm) -> Self {
        Self { vm }
    }

    pub fn number_of_threads(&self) -> io::Result<i64> {
        self.vm
            .inner()
            .threads
            .number_of_threads
            .static_value(self.vm.space())
    }

    /// The first thread on the target's list, typed through the virtual
    /// constructor; `None` when the list is empty.
    pub fn first(&self) -> Result<Option<JavaThread>, WrongTypeError> {
        let head = self
            .vm
            .inner()
            .threads
            .thread_list
            .static_value(self.vm.space())?;
        self.wrap(head.as_ref())
    }

    pub(crate) fn wrap(
        &self,
        addr: Option<&Address>,
    ) -> Result<Option<JavaThread>, WrongTypeError> {
        Ok(self
            .vm
            .inner()
            .thread_ctor
            .instantiate_wrapper_for(addr)?
            .map(|(kind, addr)| JavaThread::new(self.vm.clone(), kind, addr)))
    }

    /// Walks the linked list from [Threads::first]. Reads are live; a
    /// thread exiting mid-walk can truncate or corrupt the traversal, which
    /// surfaces as an error or a short list, never as a panic.
    pub fn iter(&self) -> ThreadIter {
        ThreadIter {
            pending: self.first().transpose(),
        }
    }

    /// The thread holding the given monitor, if any.
    ///
    /// Two passes in a fixed order: first the owner address is matched
    /// against each thread's identity address, which resolves inflated
    /// monitors cheaply; only when that fails is each thread's stack range
    /// checked, which resolves stack-locked (thin) monitors.
    pub fn owning_thread_from_monitor(
        &self,
        monitor: &ObjectMonitor,
    ) -> Result<Option<JavaThread>, WrongTypeError> {
        self.owning_thread_of(monitor.owner()?.as_ref())
    }

    /// Same as [Threads::owning_thread_from_monitor], starting from the raw
    /// owner word of a monitor or lock record.
    pub fn owning_thread_of(
        &self,
        owner: Option<&Address>,
    ) -> Result<Option<JavaThread>, WrongTypeError> {
        let Some(owner) = owner else {
            return Ok(None);
        };
        for thread in self.iter() {
            let thread = thread?;
            if thread.address() == owner {
                return Ok(Some(thread));
            }
        }
        for thread in self.iter() {
            let thread = thread?;
            if thread.is_in_stack(owner)? {
                return Ok(Some(thread));
            }
        }
        Ok(None)
    }

    /// Threads blocked trying to enter `monitor`, in list order.
    ///
    /// Compiler helper threads never block on ordinary object monitors and
    /// are skipped.
    pub fn pending_threads(
        &self,
        monitor: &ObjectMonitor,
    ) -> Result<Vec<JavaThread>, WrongTypeError> {
        let mut pending = Vec::new();
        for thread in self.iter() {
            let thread = thread?;
            if thread.is_compiler_thread() || thread.is_code_cache_sweeper_thread() {
                continue;
            }
            if thread.current_pending_monitor()?.as_ref() == Some(monitor) {
                pending.push(thread);
            }
        }
        Ok(pending)
    }

    /// Threads waiting (in `Object.wait`) on `monitor`, in list order.
    pub fn waiting_threads(
        &self,
        monitor: &ObjectMonitor,
    ) -> Result<Vec<JavaThread>, WrongTypeError> {
        let mut waiting = Vec::new();
        for thread in self.iter() {
            let thread = thread?;
            if thread.current_waiting_monitor()?.as_ref() == Some(monitor) {
                waiting.push(thread);
            }
        }
        Ok(waiting)
    }
}

/// Iterator over the target's thread list.
#[derive(Debug)]
pub struct ThreadIter {
    pending: Option<Result<JavaThread, WrongTypeError>>,
}

impl Iterator for ThreadIter {
    type Item = Result<JavaThread, WrongTypeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.pending.take()?;
        if let Ok(thread) = &current {
            match thread.next() {
                Ok(Some(next)) => self.pending = Some(Ok(next)),
                Ok(None) => {}
                Err(e) => self.pending = Some(Err(e)),
            }
        }
        Some(current)
    }
}
