use crate::{dbg::Address, oops::Method};

/// A physical frame of a target thread: stack pointer plus, where the
/// platform publishes them, frame pointer and pc. A plain value; compares
/// by content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    sp: Address,
    fp: Option<Address>,
    pc: Option<Address>,
}

impl Frame {
    pub fn new(sp: Address, fp: Option<Address>, pc: Option<Address>) -> Self {
        Self { sp, fp, pc }
    }

    pub fn sp(&self) -> &Address {
        &self.sp
    }

    pub fn fp(&self) -> Option<&Address> {
        self.fp.as_ref()
    }

    pub fn pc(&self) -> Option<&Address> {
        self.pc.as_ref()
    }
}

/// A Java-level view of one frame: the method executing in it and the
/// bytecode index within that method.
///
/// Distinct wrapper instances routinely denote the same logical frame, so
/// equality and hashing use the structural key — owning method identity,
/// bci, and the physical frame — never wrapper identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JavaVFrame {
    method: Method,
    bci: i32,
    frame: Frame,
}

impl JavaVFrame {
    pub fn new(method: Method, bci: i32, frame: Frame) -> Self {
        Self { method, bci, frame }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn bci(&self) -> i32 {
        self.bci
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }
}
