#![allow(dead_code)]

use std::{
    collections::HashMap,
    io::{Error, ErrorKind},
};

use hsdb::{
    dbg::{AddressSpace, MachineDescription, SharedSpace},
    runtime::Vm,
    types::{TypeDataBase, TypeDataBaseBuilder},
};

pub fn init_logs() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Trace)
        .try_init();
}

/// An in-memory stand-in for a target process: a byte-granular sparse
/// memory image plus a symbol table. Reads of bytes that were never
/// written fail the way an unmapped page would.
#[derive(Debug)]
pub struct FakeSpace {
    memory: HashMap<u64, u8>,
    symbols: HashMap<String, u64>,
    machine: MachineDescription,
}

impl FakeSpace {
    pub fn new() -> Self {
        Self::with_machine("linux", "amd64")
    }

    pub fn with_machine(os: &str, cpu: &str) -> Self {
        FakeSpace {
            memory: HashMap::new(),
            symbols: HashMap::new(),
            machine: MachineDescription {
                os: os.to_owned(),
                cpu: cpu.to_owned(),
                pointer_size: 8,
                big_endian: false,
            },
        }
    }

    pub fn put_bytes(&mut self, addr: u64, bytes: &[u8]) -> &mut Self {
        for (i, b) in bytes.iter().enumerate() {
            self.memory.insert(addr + i as u64, *b);
        }
        self
    }

    pub fn put_zeros(&mut self, addr: u64, len: u64) -> &mut Self {
        for i in 0..len {
            self.memory.insert(addr + i, 0);
        }
        self
    }

    pub fn put_u16(&mut self, addr: u64, value: u16) -> &mut Self {
        self.put_bytes(addr, &value.to_le_bytes())
    }

    pub fn put_u32(&mut self, addr: u64, value: u32) -> &mut Self {
        self.put_bytes(addr, &value.to_le_bytes())
    }

    pub fn put_u64(&mut self, addr: u64, value: u64) -> &mut Self {
        self.put_bytes(addr, &value.to_le_bytes())
    }

    pub fn put_ptr(&mut self, addr: u64, value: u64) -> &mut Self {
        self.put_u64(addr, value)
    }

    pub fn put_cstr(&mut self, addr: u64, s: &str) -> &mut Self {
        self.put_bytes(addr, s.as_bytes());
        self.put_bytes(addr + s.len() as u64, &[0])
    }

    pub fn add_symbol(&mut self, name: &str, addr: u64) -> &mut Self {
        self.symbols.insert(name.to_owned(), addr);
        self
    }

    pub fn into_space(self) -> SharedSpace {
        SharedSpace::new(self)
    }
}

impl AddressSpace for FakeSpace {
    fn read_bytes(&self, addr: u64, buf: &mut [u8]) -> std::io::Result<()> {
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = *self.memory.get(&(addr + i as u64)).ok_or_else(|| {
                Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("unmapped target address {:#x}", addr + i as u64),
                )
            })?;
        }
        Ok(())
    }

    fn machine(&self) -> &MachineDescription {
        &self.machine
    }

    fn symbol_address(&self, name: &str) -> Option<u64> {
        self.symbols.get(name).copied()
    }

    fn symbol_for_address(&self, addr: u64) -> Option<String> {
        // nearest symbol at or below, the way a real symbolizer answers
        self.symbols
            .iter()
            .filter(|(_, &a)| a <= addr && addr - a < 0x1000)
            .max_by_key(|(_, &a)| a)
            .map(|(name, _)| name.clone())
    }
}

/// Object layout of the synthetic target every integration test attaches
/// to. Offsets are arbitrary but fixed, so snapshots stay stable.
pub mod layout {
    // Thread
    pub const THREAD_PENDING_MONITOR: u64 = 0x10;
    pub const THREAD_WAITING_MONITOR: u64 = 0x18;
    pub const THREAD_STACK_BASE: u64 = 0x20;
    pub const THREAD_STACK_SIZE: u64 = 0x28;
    // JavaThread
    pub const JT_NEXT: u64 = 0x40;
    pub const JT_THREAD_OBJ: u64 = 0x48;
    pub const JT_ANCHOR: u64 = 0x50;
    pub const JT_THREAD_STATE: u64 = 0x70;
    pub const JT_SIZE: u64 = 0x200;
    pub const CT_SIZE: u64 = 0x210;
    // JavaFrameAnchor
    pub const ANCHOR_SP: u64 = 0x0;
    pub const ANCHOR_PC: u64 = 0x8;
    pub const ANCHOR_FP: u64 = 0x10;
    // ObjectMonitor
    pub const OM_HEADER: u64 = 0x0;
    pub const OM_OBJECT: u64 = 0x8;
    pub const OM_OWNER: u64 = 0x10;
    pub const OM_COUNT: u64 = 0x18;
    pub const OM_WAITERS: u64 = 0x20;
    pub const OM_RECURSIONS: u64 = 0x28;
    pub const OM_FREE_NEXT: u64 = 0x30;
    pub const OM_SIZE: u64 = 0x40;
    pub const BLOCK_SIZE: i64 = 4;
    // Klass / InstanceKlass
    pub const KLASS_NAME: u64 = 0x8;
    pub const IK_FIELDS: u64 = 0x50;
    pub const IK_METHODS: u64 = 0x58;
    pub const IK_CONSTANTS: u64 = 0x60;
    pub const IK_SIZE: u64 = 0x1b0;
    // Symbol
    pub const SYM_LENGTH: u64 = 0x4;
    pub const SYM_BODY: u64 = 0x6;
    // Method / ConstMethod / ConstantPool
    pub const METHOD_CONST_METHOD: u64 = 0x10;
    pub const METHOD_SIZE: u64 = 0x60;
    pub const CM_CONSTANTS: u64 = 0x8;
    pub const CM_NAME_INDEX: u64 = 0x2a;
    pub const CM_SIGNATURE_INDEX: u64 = 0x2c;
    pub const CM_SIZE: u64 = 0x48;
    pub const CP_SIZE: u64 = 0x50;
    // Array<u2> / Array<Method*>
    pub const U2_ARRAY_DATA: u64 = 0x4;
    pub const PTR_ARRAY_DATA: u64 = 0x8;
    // statics
    pub const THREAD_LIST_ADDR: u64 = 0x9000;
    pub const NUM_THREADS_ADDR: u64 = 0x9008;
    pub const G_BLOCK_LIST_ADDR: u64 = 0x9010;
    pub const CALL_STUB_RETURN_ADDR: u64 = 0x9018;
    pub const CALL_STUB_COMPILED_ADDR: u64 = 0x9020;
    // vtbls
    pub const JAVA_THREAD_VTBL: u64 = 0x7000;
    pub const COMPILER_THREAD_VTBL: u64 = 0x7040;
    pub const IK_VTBL: u64 = 0x7080;
    pub const METHOD_VTBL: u64 = 0x70c0;
    pub const CP_VTBL: u64 = 0x7100;
}

use layout::*;

/// Builds the synthetic target: the standard type database plus whatever
/// objects a test writes into the fake memory before attaching.
pub struct Target {
    pub space: FakeSpace,
    pub db: TypeDataBaseBuilder,
}

impl Target {
    pub fn new() -> Self {
        Self::with_machine("linux", "amd64")
    }

    pub fn with_machine(os: &str, cpu: &str) -> Self {
        init_logs();
        let mut space = FakeSpace::with_machine(os, cpu);
        let mut db = TypeDataBaseBuilder::with_standard_integer_types(space.machine());

        db.add_type("Thread", None, 0x30);
        db.add_field("Thread", "_current_pending_monitor", "ObjectMonitor*", THREAD_PENDING_MONITOR);
        db.add_field("Thread", "_current_waiting_monitor", "ObjectMonitor*", THREAD_WAITING_MONITOR);
        db.add_field("Thread", "_stack_base", "address", THREAD_STACK_BASE);
        db.add_field("Thread", "_stack_size", "size_t", THREAD_STACK_SIZE);

        db.add_type("JavaThread", Some("Thread"), JT_SIZE);
        db.add_field("JavaThread", "_next", "JavaThread*", JT_NEXT);
        db.add_field("JavaThread", "_threadObj", "oop", JT_THREAD_OBJ);
        db.add_field("JavaThread", "_anchor", "JavaFrameAnchor", JT_ANCHOR);
        db.add_field("JavaThread", "_thread_state", "int", JT_THREAD_STATE);
        db.add_vtbl("JavaThread", JAVA_THREAD_VTBL);

        db.add_type("CompilerThread", Some("JavaThread"), CT_SIZE);
        db.add_vtbl("CompilerThread", COMPILER_THREAD_VTBL);

        db.add_type("JavaFrameAnchor", None, 0x18);
        db.add_field("JavaFrameAnchor", "_last_Java_sp", "intptr_t*", ANCHOR_SP);
        db.add_field("JavaFrameAnchor", "_last_Java_pc", "address", ANCHOR_PC);
        db.add_field("JavaFrameAnchor", "_last_Java_fp", "intptr_t*", ANCHOR_FP);

        db.add_type("Threads", None, 0x8);
        db.add_static_field("Threads", "_thread_list", "JavaThread*", THREAD_LIST_ADDR);
        db.add_static_field("Threads", "_number_of_threads", "int", NUM_THREADS_ADDR);

        db.add_type("ObjectMonitor", None, OM_SIZE);
        db.add_field("ObjectMonitor", "_header", "markOop", OM_HEADER);
        db.add_field("ObjectMonitor", "_object", "void*", OM_OBJECT);
        db.add_field("ObjectMonitor", "_owner", "void*", OM_OWNER);
        db.add_field("ObjectMonitor", "_count", "intptr_t", OM_COUNT);
        db.add_field("ObjectMonitor", "_waiters", "intptr_t", OM_WAITERS);
        db.add_field("ObjectMonitor", "_recursions", "intptr_t", OM_RECURSIONS);
        db.add_field("ObjectMonitor", "FreeNext", "ObjectMonitor*", OM_FREE_NEXT);

        db.add_type("ObjectSynchronizer", None, 0x8);
        db.add_static_field("ObjectSynchronizer", "gBlockList", "ObjectMonitor*", G_BLOCK_LIST_ADDR);
        db.add_int_constant("ObjectSynchronizer::_BLOCKSIZE", BLOCK_SIZE);

        db.add_type("StubRoutines", None, 0x8);
        db.add_static_field("StubRoutines", "_call_stub_return_address", "address", CALL_STUB_RETURN_ADDR);

        db.add_type("Klass", None, 0x40);
        db.add_field("Klass", "_name", "Symbol*", KLASS_NAME);
        db.add_type("InstanceKlass", Some("Klass"), IK_SIZE);
        db.add_field("InstanceKlass", "_fields", "Array<u2>*", IK_FIELDS);
        db.add_field("InstanceKlass", "_methods", "Array<Method*>*", IK_METHODS);
        db.add_field("InstanceKlass", "_constants", "ConstantPool*", IK_CONSTANTS);
        db.add_vtbl("InstanceKlass", IK_VTBL);

        db.add_type("Symbol", None, 0x10);
        db.add_field("Symbol", "_length", "u2", SYM_LENGTH);
        db.add_field("Symbol", "_body", "jbyte", SYM_BODY);

        db.add_type("Method", None, METHOD_SIZE);
        db.add_field("Method", "_constMethod", "ConstMethod*", METHOD_CONST_METHOD);
        db.add_vtbl("Method", METHOD_VTBL);
        db.add_type("ConstMethod", None, CM_SIZE);
        db.add_field("ConstMethod", "_constants", "ConstantPool*", CM_CONSTANTS);
        db.add_field("ConstMethod", "_name_index", "u2", CM_NAME_INDEX);
        db.add_field("ConstMethod", "_signature_index", "u2", CM_SIGNATURE_INDEX);
        db.add_type("ConstantPool", None, CP_SIZE);
        db.add_vtbl("ConstantPool", CP_VTBL);

        db.add_type("Array<u2>", None, U2_ARRAY_DATA);
        db.add_field("Array<u2>", "_length", "int", 0);
        db.add_field("Array<u2>", "_data", "u2", U2_ARRAY_DATA);
        db.add_type("Array<Method*>", None, PTR_ARRAY_DATA);
        db.add_field("Array<Method*>", "_length", "int", 0);
        db.add_field("Array<Method*>", "_data", "Method*", PTR_ARRAY_DATA);

        for (name, value) in [
            ("_thread_uninitialized", 0),
            ("_thread_new", 2),
            ("_thread_new_trans", 3),
            ("_thread_in_native", 4),
            ("_thread_in_native_trans", 5),
            ("_thread_in_vm", 6),
            ("_thread_in_vm_trans", 7),
            ("_thread_in_Java", 8),
            ("_thread_in_Java_trans", 9),
            ("_thread_blocked", 10),
            ("_thread_blocked_trans", 11),
        ] {
            db.add_int_constant(name, value);
        }

        for (name, value) in [
            ("FieldInfo::access_flags_offset", 0),
            ("FieldInfo::name_index_offset", 1),
            ("FieldInfo::signature_index_offset", 2),
            ("FieldInfo::initval_index_offset", 3),
            ("FieldInfo::low_packed_offset", 4),
            ("FieldInfo::high_packed_offset", 5),
            ("FieldInfo::field_slots", 6),
            ("FIELDINFO_TAG_SIZE", 2),
            ("FIELDINFO_TAG_MASK", 3),
            ("FIELDINFO_TAG_OFFSET", 1),
        ] {
            db.add_int_constant(name, value);
        }

        // statics all start out null/zero
        space.put_zeros(THREAD_LIST_ADDR, 0x30);

        Target { space, db }
    }

    /// Adds the platform-conditional compiled-code return stub, which the
    /// default target deliberately lacks.
    pub fn with_compiled_call_stub(&mut self) -> &mut Self {
        self.db.add_type("StubRoutines::x86", None, 0x8);
        self.db.add_static_field(
            "StubRoutines::x86",
            "_call_stub_compiled_return",
            "address",
            CALL_STUB_COMPILED_ADDR,
        );
        self.space.put_zeros(CALL_STUB_COMPILED_ADDR, 8);
        self
    }

    pub fn build_db(self) -> (SharedSpace, TypeDataBase) {
        (self.space.into_space(), self.db.build().expect("db build"))
    }

    pub fn attach(self) -> Vm {
        let (space, db) = self.build_db();
        Vm::attach(space, db).expect("attach")
    }

    // --- object writers ---

    pub fn def_java_thread(&mut self, addr: u64) -> &mut Self {
        self.space.put_zeros(addr, JT_SIZE);
        self.space.put_ptr(addr, JAVA_THREAD_VTBL);
        self.space.put_u32(addr + JT_THREAD_STATE, 8); // _thread_in_Java
        self
    }

    pub fn def_compiler_thread(&mut self, addr: u64) -> &mut Self {
        self.space.put_zeros(addr, CT_SIZE);
        self.space.put_ptr(addr, COMPILER_THREAD_VTBL);
        self.space.put_u32(addr + JT_THREAD_STATE, 8);
        self
    }

    /// Chains already-defined threads into the VM's list and points the
    /// static head at the first.
    pub fn link_threads(&mut self, threads: &[u64]) -> &mut Self {
        self.space
            .put_ptr(THREAD_LIST_ADDR, threads.first().copied().unwrap_or(0));
        self.space.put_u32(NUM_THREADS_ADDR, threads.len() as u32);
        for pair in threads.windows(2) {
            self.space.put_ptr(pair[0] + JT_NEXT, pair[1]);
        }
        if let Some(last) = threads.last() {
            self.space.put_ptr(last + JT_NEXT, 0);
        }
        self
    }

    pub fn set_thread_stack(&mut self, thread: u64, base: u64, size: u64) -> &mut Self {
        self.space.put_ptr(thread + THREAD_STACK_BASE, base);
        self.space.put_u64(thread + THREAD_STACK_SIZE, size);
        self
    }

    pub fn set_pending_monitor(&mut self, thread: u64, monitor: u64) -> &mut Self {
        self.space.put_ptr(thread + THREAD_PENDING_MONITOR, monitor);
        self
    }

    pub fn set_waiting_monitor(&mut self, thread: u64, monitor: u64) -> &mut Self {
        self.space.put_ptr(thread + THREAD_WAITING_MONITOR, monitor);
        self
    }

    pub fn def_monitor(&mut self, addr: u64) -> &mut Self {
        self.space.put_zeros(addr, OM_SIZE);
        self
    }

    /// A full monitor block: `BLOCK_SIZE` zeroed slots, with the free-chain
    /// pointer in slot 0.
    pub fn def_monitor_block(&mut self, base: u64, free_next: u64) -> &mut Self {
        self.space.put_zeros(base, OM_SIZE * BLOCK_SIZE as u64);
        self.space.put_ptr(base + OM_FREE_NEXT, free_next);
        self
    }

    pub fn set_monitor_owner(&mut self, monitor: u64, owner: u64) -> &mut Self {
        self.space.put_ptr(monitor + OM_OWNER, owner);
        self
    }

    pub fn def_symbol(&mut self, addr: u64, text: &str) -> &mut Self {
        let bytes = cesu8::to_java_cesu8(text);
        self.space.put_zeros(addr, SYM_BODY);
        self.space.put_u16(addr + SYM_LENGTH, bytes.len() as u16);
        self.space.put_bytes(addr + SYM_BODY, &bytes);
        self
    }

    pub fn def_u2_array(&mut self, addr: u64, values: &[u16]) -> &mut Self {
        self.space.put_u32(addr, values.len() as u32);
        for (i, v) in values.iter().enumerate() {
            self.space.put_u16(addr + U2_ARRAY_DATA + 2 * i as u64, *v);
        }
        self
    }

    pub fn def_method_array(&mut self, addr: u64, methods: &[u64]) -> &mut Self {
        self.space.put_u32(addr, methods.len() as u32);
        self.space.put_zeros(addr + 4, 4);
        for (i, m) in methods.iter().enumerate() {
            self.space.put_ptr(addr + PTR_ARRAY_DATA + 8 * i as u64, *m);
        }
        self
    }

    /// A constant pool whose listed slots hold symbol pointers.
    pub fn def_constant_pool(&mut self, addr: u64, symbols: &[(usize, u64)]) -> &mut Self {
        self.space.put_zeros(addr, CP_SIZE);
        self.space.put_ptr(addr, CP_VTBL);
        for &(index, sym) in symbols {
            self.space.put_ptr(addr + CP_SIZE + 8 * index as u64, sym);
        }
        self
    }

    pub fn def_method(
        &mut self,
        addr: u64,
        const_method: u64,
        pool: u64,
        name_index: u16,
        signature_index: u16,
    ) -> &mut Self {
        self.space.put_zeros(addr, METHOD_SIZE);
        self.space.put_ptr(addr, METHOD_VTBL);
        self.space.put_ptr(addr + METHOD_CONST_METHOD, const_method);
        self.space.put_zeros(const_method, CM_SIZE);
        self.space.put_ptr(const_method + CM_CONSTANTS, pool);
        self.space.put_u16(const_method + CM_NAME_INDEX, name_index);
        self.space.put_u16(const_method + CM_SIGNATURE_INDEX, signature_index);
        self
    }

    pub fn def_instance_klass(
        &mut self,
        addr: u64,
        name_symbol: u64,
        fields_array: u64,
        methods_array: u64,
        pool: u64,
    ) -> &mut Self {
        self.space.put_zeros(addr, IK_SIZE);
        self.space.put_ptr(addr, IK_VTBL);
        self.space.put_ptr(addr + KLASS_NAME, name_symbol);
        self.space.put_ptr(addr + IK_FIELDS, fields_array);
        self.space.put_ptr(addr + IK_METHODS, methods_array);
        self.space.put_ptr(addr + IK_CONSTANTS, pool);
        self
    }
}
