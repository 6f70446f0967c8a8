use std::{
    fmt::{self, Debug, Formatter},
    hash::{Hash, Hasher},
    io,
};

use crate::{
    dbg::Address,
    runtime::Vm,
    types::{CIntegerField, LookupError, MetadataField, TypeDataBase},
};

use super::{require, Symbol};

pub(crate) struct MethodFields {
    const_method: MetadataField,
    cm_constants: MetadataField,
    cm_name_index: CIntegerField,
    cm_signature_index: CIntegerField,
    /// Constant pool slots start right past the header, so the pool type's
    /// own size is the base offset.
    cp_base_offset: u64,
}

impl MethodFields {
    pub(crate) fn resolve(db: &TypeDataBase) -> Result<Self, LookupError> {
        let method = db.lookup_type("Method")?;
        let const_method = db.lookup_type("ConstMethod")?;
        let pool = db.lookup_type("ConstantPool")?;
        Ok(MethodFields {
            const_method: method.metadata_field("_constMethod")?,
            cm_constants: const_method.metadata_field("_constants")?,
            cm_name_index: const_method.c_integer_field("_name_index")?,
            cm_signature_index: const_method.c_integer_field("_signature_index")?,
            cp_base_offset: pool.size(),
        })
    }
}

/// A method of the target VM.
///
/// Equality and hashing are by metadata address: distinct wrappers for the
/// same `Method*` are the same method.
#[derive(Clone)]
pub struct Method {
    vm: Vm,
    addr: Address,
}

impl Method {
    /// Wraps the method at `addr` without verifying it; [crate::runtime::Vm::metadata_at]
    /// is the checked way in.
    pub fn new(vm: Vm, addr: Address) -> Self {
        Self { vm, addr }
    }

    fn fields(&self) -> &MethodFields {
        &self.vm.inner().method
    }

    pub fn address(&self) -> &Address {
        &self.addr
    }

    pub fn const_method(&self) -> io::Result<ConstMethod> {
        let addr = self.fields().const_method.value(&self.addr)?;
        Ok(ConstMethod::new(
            self.vm.clone(),
            require(addr, "ConstMethod pointer")?,
        ))
    }

    pub fn name(&self) -> io::Result<Symbol> {
        let cm = self.const_method()?;
        let index = self.fields().cm_name_index.value(cm.address())?;
        cm.constants()?.symbol_at(index as usize)
    }

    pub fn signature(&self) -> io::Result<Symbol> {
        let cm = self.const_method()?;
        let index = self.fields().cm_signature_index.value(cm.address())?;
        cm.constants()?.symbol_at(index as usize)
    }
}

impl Debug for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Method({:#x})", self.addr.raw())
    }
}

impl PartialEq for Method {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl Eq for Method {}

impl Hash for Method {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
    }
}

/// The immutable half of a method the VM shares between redefinitions.
#[derive(Clone)]
pub struct ConstMethod {
    vm: Vm,
    addr: Address,
}

impl ConstMethod {
    pub(crate) fn new(vm: Vm, addr: Address) -> Self {
        Self { vm, addr }
    }

    pub fn address(&self) -> &Address {
        &self.addr
    }

    pub fn constants(&self) -> io::Result<ConstantPool> {
        let addr = self.vm.inner().method.cm_constants.value(&self.addr)?;
        Ok(ConstantPool::new(
            self.vm.clone(),
            require(addr, "ConstantPool pointer")?,
        ))
    }
}

impl Debug for ConstMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ConstMethod({:#x})", self.addr.raw())
    }
}

/// A constant pool of the target VM, as far as symbol resolution needs it.
#[derive(Clone)]
pub struct ConstantPool {
    vm: Vm,
    addr: Address,
}

impl ConstantPool {
    pub fn new(vm: Vm, addr: Address) -> Self {
        Self { vm, addr }
    }

    pub fn address(&self) -> &Address {
        &self.addr
    }

    /// The symbol in pool slot `index`. Name and signature entries hold
    /// `Symbol*` words directly.
    pub fn symbol_at(&self, index: usize) -> io::Result<Symbol> {
        let ptr = self.vm.machine().pointer_size as u64;
        let offset = self.vm.inner().method.cp_base_offset + index as u64 * ptr;
        let addr = self.addr.address_at(offset)?;
        Ok(Symbol::new(
            self.vm.clone(),
            require(addr, "Symbol slot")?,
        ))
    }
}

impl Debug for ConstantPool {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ConstantPool({:#x})", self.addr.raw())
    }
}
