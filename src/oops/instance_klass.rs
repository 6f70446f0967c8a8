use std::{
    fmt::{self, Debug, Formatter},
    io,
};

use thiserror::Error;

use crate::{
    dbg::Address,
    runtime::Vm,
    types::{LookupError, MetadataField, TypeDataBase},
};

use super::{require, AccessFlags, ConstantPool, Method, MethodArray, Symbol, U2Array};

/// The packed field-info encoding: each Java field occupies a fixed group
/// of `u2` slots, and the `(low, high)` slot pair holds a tagged value
/// whose low bits say what the rest encodes. Only the "real instance
/// offset" tag is decodable here; any other tag in a slot we expect an
/// offset in means the metadata is malformed.
pub(crate) struct FieldInfoLayout {
    pub(crate) access_flags_slot: usize,
    pub(crate) name_index_slot: usize,
    pub(crate) signature_index_slot: usize,
    pub(crate) low_slot: usize,
    pub(crate) high_slot: usize,
    pub(crate) field_slots: usize,
    pub(crate) tag_size: u32,
    pub(crate) tag_mask: u16,
    pub(crate) tag_offset: u16,
}

impl FieldInfoLayout {
    fn resolve(db: &TypeDataBase) -> Result<Self, LookupError> {
        let slot = |name: &str| db.lookup_int_constant(name).map(|v| v as usize);
        Ok(FieldInfoLayout {
            access_flags_slot: slot("FieldInfo::access_flags_offset")?,
            name_index_slot: slot("FieldInfo::name_index_offset")?,
            signature_index_slot: slot("FieldInfo::signature_index_offset")?,
            low_slot: slot("FieldInfo::low_packed_offset")?,
            high_slot: slot("FieldInfo::high_packed_offset")?,
            field_slots: slot("FieldInfo::field_slots")?,
            tag_size: db.lookup_int_constant("FIELDINFO_TAG_SIZE")? as u32,
            tag_mask: db.lookup_int_constant("FIELDINFO_TAG_MASK")? as u16,
            tag_offset: db.lookup_int_constant("FIELDINFO_TAG_OFFSET")? as u16,
        })
    }
}

pub(crate) struct KlassFields {
    name: MetadataField,
    fields: MetadataField,
    methods: MetadataField,
    constants: MetadataField,
    pub(crate) fieldinfo: FieldInfoLayout,
}

impl KlassFields {
    pub(crate) fn resolve(db: &TypeDataBase) -> Result<Self, LookupError> {
        let klass = db.lookup_type("Klass")?;
        let ik = db.lookup_type("InstanceKlass")?;
        Ok(KlassFields {
            name: klass.metadata_field("_name")?,
            fields: ik.metadata_field("_fields")?,
            methods: ik.metadata_field("_methods")?,
            constants: ik.metadata_field("_constants")?,
            fieldinfo: FieldInfoLayout::resolve(db)?,
        })
    }
}

#[derive(Debug, Error)]
pub enum FieldDecodeError {
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The slot pair that should hold a packed instance offset carries a
    /// different tag. Well-formed targets never produce this; it means the
    /// metadata being read is not what it claims to be.
    #[error("field {index} carries tag {tag:#x} where the packed-offset tag was expected")]
    UnexpectedTag { index: usize, tag: u16 },
}

/// A loaded (non-array) class of the target VM.
#[derive(Clone)]
pub struct InstanceKlass {
    vm: Vm,
    addr: Address,
}

impl InstanceKlass {
    /// Wraps the klass at `addr` without verifying it; [crate::runtime::Vm::metadata_at]
    /// is the checked way in.
    pub fn new(vm: Vm, addr: Address) -> Self {
        Self { vm, addr }
    }

    fn fields(&self) -> &KlassFields {
        &self.vm.inner().klass
    }

    pub fn address(&self) -> &Address {
        &self.addr
    }

    pub fn name(&self) -> io::Result<Symbol> {
        let addr = self.fields().name.value(&self.addr)?;
        Ok(Symbol::new(self.vm.clone(), require(addr, "Klass name")?))
    }

    /// The raw field-info slot array.
    pub fn fields_array(&self) -> io::Result<U2Array> {
        let addr = self.fields().fields.value(&self.addr)?;
        Ok(U2Array::new(
            self.vm.clone(),
            require(addr, "field-info array")?,
        ))
    }

    pub fn methods(&self) -> io::Result<MethodArray> {
        let addr = self.fields().methods.value(&self.addr)?;
        Ok(MethodArray::new(
            self.vm.clone(),
            require(addr, "method array")?,
        ))
    }

    pub fn constants(&self) -> io::Result<ConstantPool> {
        let addr = self.fields().constants.value(&self.addr)?;
        Ok(ConstantPool::new(
            self.vm.clone(),
            require(addr, "constant pool")?,
        ))
    }

    fn field_slot(&self, fields: &U2Array, index: usize, slot: usize) -> io::Result<u16> {
        fields.at(index * self.fields().fieldinfo.field_slots + slot)
    }

    /// Number of fields described by the field-info array, injected ones
    /// included.
    ///
    /// Generic-signature slots are appended out-of-band at the *end* of the
    /// array rather than inline in their field's slot group, so the
    /// apparent array length is shrunk by one for every field whose access
    /// flags carry the generic-signature bit while counting groups.
    pub fn get_all_fields_count(&self) -> io::Result<usize> {
        let layout = &self.fields().fieldinfo;
        let fields = self.fields_array()?;
        let mut len = fields.length()?;
        let mut count = 0;
        while count * layout.field_slots < len {
            let flags = self.field_access_flags_in(&fields, count)?;
            if flags.field_has_generic_signature() {
                len -= 1;
            }
            count += 1;
        }
        Ok(count)
    }

    fn field_access_flags_in(&self, fields: &U2Array, index: usize) -> io::Result<AccessFlags> {
        let raw = self.field_slot(fields, index, self.fields().fieldinfo.access_flags_slot)?;
        Ok(AccessFlags::from_raw(raw as u32))
    }

    pub fn field_access_flags(&self, index: usize) -> io::Result<AccessFlags> {
        let fields = self.fields_array()?;
        self.field_access_flags_in(&fields, index)
    }

    pub fn field_name(&self, index: usize) -> io::Result<Symbol> {
        let fields = self.fields_array()?;
        let slot = self.field_slot(&fields, index, self.fields().fieldinfo.name_index_slot)?;
        self.constants()?.symbol_at(slot as usize)
    }

    pub fn field_signature(&self, index: usize) -> io::Result<Symbol> {
        let fields = self.fields_array()?;
        let slot = self.field_slot(&fields, index, self.fields().fieldinfo.signature_index_slot)?;
        self.constants()?.symbol_at(slot as usize)
    }

    /// The instance offset of field `index`, unpacked from the tagged
    /// `(low, high)` slot pair. A tag other than the offset tag fails fast
    /// instead of yielding a bogus offset.
    pub fn field_offset(&self, index: usize) -> Result<u64, FieldDecodeError> {
        let layout = &self.fields().fieldinfo;
        let fields = self.fields_array()?;
        let lo = self.field_slot(&fields, index, layout.low_slot)?;
        let hi = self.field_slot(&fields, index, layout.high_slot)?;
        if lo & layout.tag_mask != layout.tag_offset {
            return Err(FieldDecodeError::UnexpectedTag {
                index,
                tag: lo & layout.tag_mask,
            });
        }
        Ok((build_int_from_shorts(lo, hi) >> layout.tag_size) as u64)
    }

    /// Looks up a method by name and signature symbols.
    ///
    /// The VM keeps the method array sorted by interned name symbol, so the
    /// binary search finds *some* method with the right name. Overloads
    /// share that name with different signatures and cluster around the
    /// hit, so both neighbors are then scanned linearly; skipping that scan
    /// finds an arbitrary overload, not the requested one.
    pub fn find_method(
        &self,
        name: &Symbol,
        signature: &Symbol,
    ) -> io::Result<Option<Method>> {
        let methods = self.methods()?;
        let len = methods.length()? as i64;
        let (mut l, mut h) = (0, len - 1);
        while l <= h {
            let mid = (l + h) >> 1;
            let m = methods.at(mid as usize)?;
            match m.name()?.fast_compare(name) {
                std::cmp::Ordering::Equal => {
                    if m.signature()? == *signature {
                        return Ok(Some(m));
                    }
                    for i in (l..mid).rev() {
                        let m = methods.at(i as usize)?;
                        if m.name()? != *name {
                            break;
                        }
                        if m.signature()? == *signature {
                            return Ok(Some(m));
                        }
                    }
                    for i in mid + 1..=h {
                        let m = methods.at(i as usize)?;
                        if m.name()? != *name {
                            break;
                        }
                        if m.signature()? == *signature {
                            return Ok(Some(m));
                        }
                    }
                    return Ok(None);
                }
                std::cmp::Ordering::Less => l = mid + 1,
                std::cmp::Ordering::Greater => h = mid - 1,
            }
        }
        Ok(None)
    }
}

impl Debug for InstanceKlass {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceKlass({:#x})", self.addr.raw())
    }
}

impl PartialEq for InstanceKlass {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl Eq for InstanceKlass {}

/// Reassembles the 32-bit value the VM split across two `u2` slots.
fn build_int_from_shorts(lo: u16, hi: u16) -> u32 {
    ((hi as u32) << 16) | lo as u32
}
