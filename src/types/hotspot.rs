//! Loader for the type database HotSpot embeds in its own binary.
//!
//! The VM exports four entry tables — structs, types, int constants, long
//! constants — together with, per table, exported integers giving the entry
//! stride and the offset of every entry member. Walking them needs nothing
//! but raw reads and two symbol lookups per table, so the same loader works
//! against live processes and core files.

use std::io;

use log::{debug, warn};
use thiserror::Error;

use crate::dbg::{Address, SharedSpace};

use super::{BuildError, TypeDataBase, TypeDataBaseBuilder};

#[derive(Debug, Error)]
pub enum HotSpotDbError {
    #[error("target does not export {0}")]
    MissingSymbol(String),
    #[error("table {0} has no terminator within {MAX_ENTRIES} entries")]
    RunawayTable(&'static str),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Build(#[from] BuildError),
}

// a real table is a few thousand entries; anything past this is a corrupt
// or foreign table
const MAX_ENTRIES: u64 = 65536;

/// Reads the embedded vmStructs tables out of the target and freezes them
/// into a [TypeDataBase].
pub fn read_type_database(space: &SharedSpace) -> Result<TypeDataBase, HotSpotDbError> {
    let mut builder = TypeDataBaseBuilder::with_standard_integer_types(space.machine());
    let struct_names = read_vm_types(space, &mut builder)?;
    read_vm_structs(space, &mut builder)?;
    read_constants(space, &mut builder, "gHotSpotVMIntConstants", "gHotSpotVMIntConstantEntry", 4)?;
    read_constants(space, &mut builder, "gHotSpotVMLongConstants", "gHotSpotVMLongConstantEntry", 8)?;
    probe_vtbls(space, &mut builder, &struct_names);
    Ok(builder.build()?)
}

fn exported(space: &SharedSpace, name: &str) -> Result<Address, HotSpotDbError> {
    let addr = space
        .symbol_address(name)
        .ok_or_else(|| HotSpotDbError::MissingSymbol(name.to_owned()))?;
    Ok(space.addr(addr))
}

// the exported strides and member offsets are uint64_t regardless of the
// target's pointer size
fn exported_u64(space: &SharedSpace, name: &str) -> Result<u64, HotSpotDbError> {
    Ok(exported(space, name)?.u64_at(0)?)
}

fn exported_table(space: &SharedSpace, name: &str) -> Result<Option<Address>, HotSpotDbError> {
    Ok(exported(space, name)?.address_at(0)?)
}

fn read_vm_types(
    space: &SharedSpace,
    builder: &mut TypeDataBaseBuilder,
) -> Result<Vec<String>, HotSpotDbError> {
    let Some(base) = exported_table(space, "gHotSpotVMTypes")? else {
        return Ok(Vec::new());
    };
    let stride = exported_u64(space, "gHotSpotVMTypeEntryArrayStride")?;
    let name_off = exported_u64(space, "gHotSpotVMTypeEntryTypeNameOffset")?;
    let super_off = exported_u64(space, "gHotSpotVMTypeEntrySuperclassNameOffset")?;
    let is_int_off = exported_u64(space, "gHotSpotVMTypeEntryIsIntegerTypeOffset")?;
    let is_unsigned_off = exported_u64(space, "gHotSpotVMTypeEntryIsUnsignedOffset")?;
    let size_off = exported_u64(space, "gHotSpotVMTypeEntrySizeOffset")?;

    let mut names = Vec::new();
    for i in 0..MAX_ENTRIES {
        let entry = base.add_offset((i * stride) as i64);
        let Some(name_ptr) = entry.address_at(name_off)? else {
            debug!("read {} vm type entries", names.len());
            return Ok(names);
        };
        let name = name_ptr.c_string_at(0)?;

        if entry.i32_at(is_int_off)? != 0 {
            let unsigned = entry.i32_at(is_unsigned_off)? != 0;
            builder.add_integer_type(&name, entry.u64_at(size_off)?, !unsigned);
        } else {
            let superclass = match entry.address_at(super_off)? {
                Some(p) => Some(p.c_string_at(0)?),
                None => None,
            };
            builder.add_type(&name, superclass.as_deref(), entry.u64_at(size_off)?);
            names.push(name);
        }
    }
    Err(HotSpotDbError::RunawayTable("gHotSpotVMTypes"))
}

fn read_vm_structs(
    space: &SharedSpace,
    builder: &mut TypeDataBaseBuilder,
) -> Result<(), HotSpotDbError> {
    let Some(base) = exported_table(space, "gHotSpotVMStructs")? else {
        return Ok(());
    };
    let stride = exported_u64(space, "gHotSpotVMStructEntryArrayStride")?;
    let type_off = exported_u64(space, "gHotSpotVMStructEntryTypeNameOffset")?;
    let field_off = exported_u64(space, "gHotSpotVMStructEntryFieldNameOffset")?;
    let decl_off = exported_u64(space, "gHotSpotVMStructEntryTypeStringOffset")?;
    let is_static_off = exported_u64(space, "gHotSpotVMStructEntryIsStaticOffset")?;
    let offset_off = exported_u64(space, "gHotSpotVMStructEntryOffsetOffset")?;
    let address_off = exported_u64(space, "gHotSpotVMStructEntryAddressOffset")?;

    for i in 0..MAX_ENTRIES {
        let entry = base.add_offset((i * stride) as i64);
        let Some(type_ptr) = entry.address_at(type_off)? else {
            debug!("read {i} vm struct entries");
            return Ok(());
        };
        let type_name = type_ptr.c_string_at(0)?;
        let Some(field_ptr) = entry.address_at(field_off)? else {
            warn!("struct entry {i} for {type_name} has no field name, skipping");
            continue;
        };
        let field = field_ptr.c_string_at(0)?;
        let declared = match entry.address_at(decl_off)? {
            Some(p) => p.c_string_at(0)?,
            // fields published without a type string are read as raw words
            None => "void*".to_owned(),
        };

        if entry.i32_at(is_static_off)? != 0 {
            let address = entry.pointer_at(address_off)?;
            builder.add_static_field(&type_name, &field, &declared, address);
        } else {
            let offset = entry.u64_at(offset_off)?;
            builder.add_field(&type_name, &field, &declared, offset);
        }
    }
    Err(HotSpotDbError::RunawayTable("gHotSpotVMStructs"))
}

fn read_constants(
    space: &SharedSpace,
    builder: &mut TypeDataBaseBuilder,
    table: &'static str,
    entry_prefix: &str,
    value_size: usize,
) -> Result<(), HotSpotDbError> {
    let Some(base) = exported_table(space, table)? else {
        return Ok(());
    };
    let stride = exported_u64(space, &format!("{entry_prefix}ArrayStride"))?;
    let name_off = exported_u64(space, &format!("{entry_prefix}NameOffset"))?;
    let value_off = exported_u64(space, &format!("{entry_prefix}ValueOffset"))?;

    for i in 0..MAX_ENTRIES {
        let entry = base.add_offset((i * stride) as i64);
        let Some(name_ptr) = entry.address_at(name_off)? else {
            debug!("read {i} entries from {table}");
            return Ok(());
        };
        let name = name_ptr.c_string_at(0)?;
        let value = entry.c_integer_at(value_off, value_size, true)?;
        builder.add_int_constant(&name, value);
    }
    Err(HotSpotDbError::RunawayTable(table))
}

/// Registers vtbl addresses for the polymorphic subset of `names` by
/// probing the Itanium-mangled vtable symbols. An object's vptr points
/// past the offset-to-top and RTTI slots, so two words are added. Types
/// whose symbol cannot be found (namespaced or templated names, stripped
/// targets, other ABIs) simply never match type-identity checks.
fn probe_vtbls(space: &SharedSpace, builder: &mut TypeDataBaseBuilder, names: &[String]) {
    let ptr = space.machine().pointer_size as u64;
    let mut found = 0u32;
    for name in names {
        if name.contains("::") || name.contains('<') {
            continue;
        }
        let mangled = format!("_ZTV{}{}", name.len(), name);
        if let Some(sym) = space.symbol_address(&mangled) {
            builder.add_vtbl(name, sym + 2 * ptr);
            found += 1;
        }
    }
    debug!("resolved vtbls for {found} of {} struct types", names.len());
}
