use std::{
    fmt::{self, Debug, Formatter},
    hash::{Hash, Hasher},
    io::{self, Error, ErrorKind},
    ops::Deref,
};

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use paste::paste;

use super::SharedSpace;

/// A location in the target's address space.
///
/// Supports offset arithmetic and width/sign-correct reads, and never owns
/// the memory it denotes: a read may fail at any time if the target unmaps
/// the region, and two reads of the same location may disagree if the
/// target is running. Two addresses are equal when they denote the same
/// location; comparing addresses from different spaces is a caller bug and
/// is only checked in debug builds.
#[derive(Clone)]
pub struct Address {
    space: SharedSpace,
    raw: u64,
}

// reads longer than this are certainly a decoding bug, not real data
const MAX_C_STRING: usize = 4096;

macro_rules! int_at {
    ($($tpe:ident),* $(,)?) => {
        $(
            paste! {
                #[doc = concat!("Reads a `", stringify!($tpe), "` at the given byte offset.")]
                pub fn [<$tpe _at>](&self, offset: u64) -> io::Result<$tpe> {
                    let mut buf = [0; std::mem::size_of::<$tpe>()];
                    self.read(offset, &mut buf)?;
                    Ok(if self.space.machine().big_endian {
                        BigEndian::[<read_ $tpe>](&buf)
                    } else {
                        LittleEndian::[<read_ $tpe>](&buf)
                    })
                }
            }
        )*
    };
}

impl Address {
    pub(crate) fn new(space: SharedSpace, raw: u64) -> Self {
        Self { space, raw }
    }

    /// The numeric value of this address in the target.
    pub fn raw(&self) -> u64 {
        self.raw
    }

    pub fn space(&self) -> &SharedSpace {
        &self.space
    }

    /// This address displaced by `offset` bytes.
    pub fn add_offset(&self, offset: i64) -> Address {
        Address {
            space: self.space.clone(),
            raw: self.raw.wrapping_add_signed(offset),
        }
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.space.read_bytes(self.raw.wrapping_add(offset), buf)
    }

    int_at![u16, i16, u32, i32, u64, i64];

    /// Reads a `u8` at the given byte offset.
    pub fn u8_at(&self, offset: u64) -> io::Result<u8> {
        let mut buf = [0; 1];
        self.read(offset, &mut buf)?;
        Ok(buf[0])
    }

    /// Reads an `i8` at the given byte offset.
    pub fn i8_at(&self, offset: u64) -> io::Result<i8> {
        self.u8_at(offset).map(|b| b as i8)
    }

    /// Reads `len` raw bytes at the given byte offset.
    pub fn bytes_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0; len];
        self.read(offset, &mut buf)?;
        Ok(buf)
    }

    /// Reads a C integer of the given width, sign- or zero-extended to
    /// `i64`. An 8-byte unsigned value comes back as its raw bits.
    pub fn c_integer_at(&self, offset: u64, size: usize, signed: bool) -> io::Result<i64> {
        Ok(match (size, signed) {
            (1, false) => self.u8_at(offset)? as i64,
            (1, true) => self.i8_at(offset)? as i64,
            (2, false) => self.u16_at(offset)? as i64,
            (2, true) => self.i16_at(offset)? as i64,
            (4, false) => self.u32_at(offset)? as i64,
            (4, true) => self.i32_at(offset)? as i64,
            (8, _) => self.i64_at(offset)?,
            _ => {
                let msg = format!("unsupported C integer width: {size}");
                return Err(Error::new(ErrorKind::InvalidInput, msg));
            }
        })
    }

    /// Reads a pointer-sized word, zero-extended.
    pub fn pointer_at(&self, offset: u64) -> io::Result<u64> {
        match self.space.machine().pointer_size {
            4 => self.u32_at(offset).map(u64::from),
            8 => self.u64_at(offset),
            n => {
                let msg = format!("unsupported pointer size: {n}");
                Err(Error::new(ErrorKind::InvalidInput, msg))
            }
        }
    }

    /// Reads a pointer field; a null pointer is `None`, not an error.
    pub fn address_at(&self, offset: u64) -> io::Result<Option<Address>> {
        let raw = self.pointer_at(offset)?;
        Ok((raw != 0).then(|| self.space.addr(raw)))
    }

    /// Reads a pointer field that refers into the target's Java heap.
    pub fn oop_handle_at(&self, offset: u64) -> io::Result<Option<OopHandle>> {
        Ok(self.address_at(offset)?.map(OopHandle))
    }

    /// Reads a NUL-terminated C string.
    pub fn c_string_at(&self, offset: u64) -> io::Result<String> {
        let mut bytes = Vec::new();
        loop {
            let b = self.u8_at(offset + bytes.len() as u64)?;
            if b == 0 {
                break;
            }
            bytes.push(b);
            if bytes.len() >= MAX_C_STRING {
                return Err(Error::new(ErrorKind::InvalidData, "unterminated C string"));
            }
        }
        String::from_utf8(bytes).map_err(|_| Error::from(ErrorKind::InvalidData))
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:#x})", self.raw)
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        debug_assert!(
            self.space.same_space(&other.space),
            "compared addresses from different address spaces"
        );
        self.raw == other.raw
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

/// An [Address] known to point at a Java heap object.
///
/// Kept as a distinct type because heap locations are only meaningful
/// relative to a moment in the target's GC history; holding one across a
/// collection yields garbage, which is the caller's problem to avoid.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct OopHandle(pub(crate) Address);

impl OopHandle {
    pub fn address(&self) -> &Address {
        &self.0
    }
}

impl Deref for OopHandle {
    type Target = Address;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Debug for OopHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "OopHandle({:#x})", self.0.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbg::{AddressSpace, MachineDescription};
    use std::io::{Error, ErrorKind};

    #[derive(Debug)]
    struct Flat {
        base: u64,
        bytes: Vec<u8>,
        machine: MachineDescription,
    }

    impl AddressSpace for Flat {
        fn read_bytes(&self, addr: u64, buf: &mut [u8]) -> std::io::Result<()> {
            let start = addr
                .checked_sub(self.base)
                .ok_or_else(|| Error::from(ErrorKind::UnexpectedEof))? as usize;
            let end = start + buf.len();
            if end > self.bytes.len() {
                return Err(Error::from(ErrorKind::UnexpectedEof));
            }
            buf.copy_from_slice(&self.bytes[start..end]);
            Ok(())
        }

        fn machine(&self) -> &MachineDescription {
            &self.machine
        }

        fn symbol_address(&self, _name: &str) -> Option<u64> {
            None
        }

        fn symbol_for_address(&self, _addr: u64) -> Option<String> {
            None
        }
    }

    fn space(bytes: Vec<u8>, big_endian: bool) -> SharedSpace {
        SharedSpace::new(Flat {
            base: 0x1000,
            bytes,
            machine: MachineDescription {
                os: "linux".to_owned(),
                cpu: "amd64".to_owned(),
                pointer_size: 8,
                big_endian,
            },
        })
    }

    #[test]
    fn endianness_is_honored() {
        let le = space(vec![0x01, 0x02, 0x03, 0x04], false);
        assert_eq!(le.addr(0x1000).u32_at(0).unwrap(), 0x0403_0201);

        let be = space(vec![0x01, 0x02, 0x03, 0x04], true);
        assert_eq!(be.addr(0x1000).u32_at(0).unwrap(), 0x0102_0304);
    }

    #[test]
    fn c_integers_extend_by_signedness() {
        let s = space(vec![0xff, 0xff], false);
        let a = s.addr(0x1000);
        assert_eq!(a.c_integer_at(0, 2, true).unwrap(), -1);
        assert_eq!(a.c_integer_at(0, 2, false).unwrap(), 0xffff);
        assert!(a.c_integer_at(0, 3, false).is_err());
    }

    #[test]
    fn null_pointers_read_as_none() {
        let s = space(vec![0; 8], false);
        assert_eq!(s.addr(0x1000).address_at(0).unwrap(), None);
    }

    #[test]
    fn c_strings_stop_at_nul() {
        let s = space(b"main\0junk".to_vec(), false);
        assert_eq!(s.addr(0x1000).c_string_at(0).unwrap(), "main");
    }

    #[test]
    fn offset_arithmetic_wraps_like_the_target() {
        let s = space(vec![], false);
        let a = s.addr(0x1000);
        assert_eq!(a.add_offset(-0x10).raw(), 0xff0);
        assert_eq!(a.add_offset(8).raw(), 0x1008);
    }
}
