use std::io;

use crate::{
    dbg::Address,
    types::{AddressField, TypeDataBase},
};

use super::{AttachError, ObjectMonitor, Vm};

pub(crate) struct SyncStatics {
    g_block_list: AddressField,
    pub(crate) block_size: i64,
}

impl SyncStatics {
    pub(crate) fn resolve(db: &TypeDataBase) -> Result<Self, AttachError> {
        let ty = db.lookup_type("ObjectSynchronizer")?;
        let block_size = db.lookup_int_constant("ObjectSynchronizer::_BLOCKSIZE")?;
        // a zero-slot block can encode nothing and makes the backward walk
        // ill-defined; treat it as corrupt metadata up front
        if block_size < 1 {
            return Err(AttachError::BadBlockSize(block_size));
        }
        Ok(SyncStatics {
            g_block_list: ty.address_field("gBlockList")?,
            block_size,
        })
    }
}

/// View of the VM's monitor bookkeeping: the chain of fixed-size blocks all
/// `ObjectMonitor`s are allocated from.
#[derive(Debug, Clone)]
pub struct ObjectSynchronizer {
    vm: Vm,
}

impl ObjectSynchronizer {
    pub(crate) fn new(vm: Vm) -> Self {
        Self { vm }
    }

    /// Head of the monitor block chain.
    pub fn block_list_head(&self) -> io::Result<Option<Address>> {
        self.vm
            .inner()
            .sync
            .g_block_list
            .static_value(self.vm.space())
    }

    /// Monitors per block, from `ObjectSynchronizer::_BLOCKSIZE`.
    pub fn block_size(&self) -> i64 {
        self.vm.inner().sync.block_size
    }

    /// Iterates every monitor slot in the block chain.
    ///
    /// Within one block, slots are yielded backward, from `block_size - 1`
    /// down to 0; consumers rely on that order for display. When a block is
    /// exhausted the chain pointer in its first slot selects the next
    /// block, and iteration ends after the block whose chain pointer is
    /// null. JVMTI raw monitors are not allocated from these blocks and are
    /// not visited.
    pub fn monitor_iterator(&self) -> io::Result<MonitorIterator> {
        Ok(MonitorIterator {
            vm: self.vm.clone(),
            block: self.block_list_head()?,
            index: self.block_size() - 1,
        })
    }
}

/// Iterator over the free-monitor block chain; see
/// [ObjectSynchronizer::monitor_iterator].
#[derive(Debug)]
pub struct MonitorIterator {
    vm: Vm,
    /// Base address of the block being walked; `None` once exhausted.
    block: Option<Address>,
    /// Next slot to yield, counting down; below 0 the chain is followed.
    index: i64,
}

impl Iterator for MonitorIterator {
    type Item = io::Result<ObjectMonitor>;

    fn next(&mut self) -> Option<Self::Item> {
        let stride = self.vm.inner().monitor.type_size as i64;
        let block_size = self.vm.inner().sync.block_size;
        loop {
            let block = self.block.clone()?;
            if self.index < 0 {
                // block exhausted; the chain pointer lives in its first slot
                let head = ObjectMonitor::new(self.vm.clone(), block);
                match head.free_next() {
                    Ok(next) => {
                        self.block = next.map(|m| m.address().clone());
                        self.index = block_size - 1;
                        continue;
                    }
                    Err(e) => {
                        self.block = None;
                        return Some(Err(e));
                    }
                }
            }
            let addr = block.add_offset(self.index * stride);
            self.index -= 1;
            return Some(Ok(ObjectMonitor::new(self.vm.clone(), addr)));
        }
    }
}
