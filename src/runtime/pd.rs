use crate::dbg::MachineDescription;

use super::AttachError;

/// Platform-dependent thread access, selected once at attach from the
/// (OS, CPU) strings the transport reports. An (OS, CPU) pair with no
/// variant here fails the attach; there is no generic fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdAccess {
    LinuxX86,
    LinuxAmd64,
    LinuxAarch64,
    LinuxPpc64,
    BsdAmd64,
    BsdAarch64,
    WindowsAmd64,
}

impl PdAccess {
    pub(crate) fn select(machine: &MachineDescription) -> Result<PdAccess, AttachError> {
        use PdAccess::*;
        Ok(match (machine.os.as_str(), machine.cpu.as_str()) {
            ("linux", "x86") => LinuxX86,
            ("linux", "amd64") => LinuxAmd64,
            ("linux", "aarch64") => LinuxAarch64,
            ("linux", "ppc64" | "ppc64le") => LinuxPpc64,
            ("bsd" | "darwin", "amd64") => BsdAmd64,
            ("bsd" | "darwin", "aarch64") => BsdAarch64,
            ("windows", "amd64") => WindowsAmd64,
            _ => {
                return Err(AttachError::UnsupportedPlatform {
                    os: machine.os.clone(),
                    cpu: machine.cpu.clone(),
                })
            }
        })
    }

    /// Whether the target ABI publishes a last Java frame pointer in the
    /// frame anchor. Where it does not, the anchor only carries sp and pc.
    pub fn tracks_frame_pointer(self) -> bool {
        use PdAccess::*;
        matches!(
            self,
            LinuxX86 | LinuxAmd64 | LinuxAarch64 | BsdAmd64 | BsdAarch64 | WindowsAmd64
        )
    }

    pub(crate) fn is_windows(self) -> bool {
        matches!(self, PdAccess::WindowsAmd64)
    }
}
