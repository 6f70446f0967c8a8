use std::{
    fmt::{self, Debug, Formatter},
    io::{self, Error, ErrorKind},
};

use crate::{
    dbg::{Address, MachineDescription},
    runtime::Vm,
    types::{CIntegerField, FieldLocation, LookupError, TypeDataBase},
};

use super::{require, Method};

/// Resolved layout of one `Array<T>` instantiation: where the length lives,
/// where element 0 starts, and the element stride.
pub(crate) struct ArrayShape {
    length: CIntegerField,
    data_offset: u64,
    stride: u64,
}

impl ArrayShape {
    fn resolve(db: &TypeDataBase, type_name: &str, stride: u64) -> Result<Self, LookupError> {
        let ty = db.lookup_type(type_name)?;
        let data = ty.field("_data")?;
        let data_offset = match data.location() {
            FieldLocation::Offset(o) => o,
            FieldLocation::Static(_) => {
                return Err(LookupError::FieldKindMismatch {
                    type_name: type_name.to_owned(),
                    field: "_data".to_owned(),
                    declared: data.declared_type().to_owned(),
                    wanted: "an instance field",
                })
            }
        };
        Ok(ArrayShape {
            length: ty.c_integer_field("_length")?,
            data_offset,
            stride,
        })
    }

    fn length(&self, base: &Address) -> io::Result<usize> {
        let len = self.length.value(base)?;
        usize::try_from(len)
            .map_err(|_| Error::new(ErrorKind::InvalidData, format!("negative array length {len}")))
    }

    fn element(&self, index: usize) -> u64 {
        self.data_offset + index as u64 * self.stride
    }
}

pub(crate) struct ArrayShapes {
    pub(crate) u2: ArrayShape,
    pub(crate) method_ptr: ArrayShape,
}

impl ArrayShapes {
    pub(crate) fn resolve(
        db: &TypeDataBase,
        machine: &MachineDescription,
    ) -> Result<Self, LookupError> {
        Ok(ArrayShapes {
            u2: ArrayShape::resolve(db, "Array<u2>", 2)?,
            method_ptr: ArrayShape::resolve(db, "Array<Method*>", machine.pointer_size as u64)?,
        })
    }
}

/// An `Array<u2>` in the target, the packed form the VM keeps field-info
/// slots in.
#[derive(Clone)]
pub struct U2Array {
    vm: Vm,
    addr: Address,
}

impl U2Array {
    pub fn new(vm: Vm, addr: Address) -> Self {
        Self { vm, addr }
    }

    fn shape(&self) -> &ArrayShape {
        &self.vm.inner().arrays.u2
    }

    pub fn address(&self) -> &Address {
        &self.addr
    }

    pub fn length(&self) -> io::Result<usize> {
        self.shape().length(&self.addr)
    }

    pub fn at(&self, index: usize) -> io::Result<u16> {
        self.addr.u16_at(self.shape().element(index))
    }
}

impl Debug for U2Array {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "U2Array({:#x})", self.addr.raw())
    }
}

/// An `Array<Method*>` in the target: a klass's method list, kept sorted by
/// interned name symbol.
#[derive(Clone)]
pub struct MethodArray {
    vm: Vm,
    addr: Address,
}

impl MethodArray {
    pub fn new(vm: Vm, addr: Address) -> Self {
        Self { vm, addr }
    }

    fn shape(&self) -> &ArrayShape {
        &self.vm.inner().arrays.method_ptr
    }

    pub fn address(&self) -> &Address {
        &self.addr
    }

    pub fn length(&self) -> io::Result<usize> {
        self.shape().length(&self.addr)
    }

    pub fn at(&self, index: usize) -> io::Result<Method> {
        let slot = self.addr.address_at(self.shape().element(index))?;
        Ok(Method::new(self.vm.clone(), require(slot, "Method slot")?))
    }
}

impl Debug for MethodArray {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "MethodArray({:#x})", self.addr.raw())
    }
}
