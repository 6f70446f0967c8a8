use std::io;

use crate::{
    dbg::Address,
    types::{AddressField, LookupError, TypeDataBase},
};

use super::Vm;

pub(crate) struct StubFields {
    call_stub_return_address: AddressField,
    call_stub_compiled_return: Option<AddressField>,
}

impl StubFields {
    pub(crate) fn resolve(db: &TypeDataBase) -> Result<Self, LookupError> {
        let ty = db.lookup_type("StubRoutines")?;
        // only some platforms have a distinct return into the call stub
        // from compiled code; its absence is a supported configuration,
        // not an error
        let call_stub_compiled_return = db
            .lookup_type("StubRoutines::x86")
            .ok()
            .and_then(|t| t.address_field("_call_stub_compiled_return").ok());
        Ok(StubFields {
            call_stub_return_address: ty.address_field("_call_stub_return_address")?,
            call_stub_compiled_return,
        })
    }
}

/// View of the VM's generated stub entry points, as far as stack walking
/// needs them.
#[derive(Debug, Clone)]
pub struct StubRoutines {
    vm: Vm,
}

impl StubRoutines {
    pub(crate) fn new(vm: Vm) -> Self {
        Self { vm }
    }

    fn fields(&self) -> &StubFields {
        &self.vm.inner().stubs
    }

    pub fn call_stub_return_address(&self) -> io::Result<Option<Address>> {
        self.fields()
            .call_stub_return_address
            .static_value(self.vm.space())
    }

    /// Whether this target publishes a separate compiled-code return point
    /// into the call stub.
    pub fn has_call_stub_compiled_return(&self) -> bool {
        self.fields().call_stub_compiled_return.is_some()
    }

    pub fn call_stub_compiled_return(&self) -> io::Result<Option<Address>> {
        match &self.fields().call_stub_compiled_return {
            Some(field) => field.static_value(self.vm.space()),
            None => Ok(None),
        }
    }

    /// Whether `return_pc` would return into the VM's Java call stub.
    pub fn returns_to_call_stub(&self, return_pc: &Address) -> io::Result<bool> {
        if self.call_stub_return_address()?.as_ref() == Some(return_pc) {
            return Ok(true);
        }
        Ok(self.call_stub_compiled_return()?.as_ref() == Some(return_pc))
    }
}
