//! Live-process transport over `/proc/<pid>/mem`.

use std::{fs::File, io, os::unix::fs::FileExt};

use super::{AddressSpace, MachineDescription};

/// Reads a cooperative live process through `/proc/<pid>/mem`.
///
/// The target keeps running unless the caller stops it by other means, so
/// reads observe whatever is mapped at the instant of the syscall. No
/// symbol information is available through this transport; type databases
/// must come from elsewhere. Only same-architecture targets are supported,
/// since the machine description is taken from the host.
#[derive(Debug)]
pub struct ProcMem {
    mem: File,
    machine: MachineDescription,
}

impl ProcMem {
    pub fn attach(pid: u32) -> io::Result<ProcMem> {
        let mem = File::open(format!("/proc/{pid}/mem"))?;
        Ok(ProcMem {
            mem,
            machine: MachineDescription {
                os: "linux".to_owned(),
                cpu: hotspot_cpu_name().to_owned(),
                pointer_size: std::mem::size_of::<usize>(),
                big_endian: cfg!(target_endian = "big"),
            },
        })
    }
}

// the VM reports its CPU under the Java os.arch names
fn hotspot_cpu_name() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "x86",
        other => other,
    }
}

impl AddressSpace for ProcMem {
    fn read_bytes(&self, addr: u64, buf: &mut [u8]) -> io::Result<()> {
        self.mem.read_exact_at(buf, addr)
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
