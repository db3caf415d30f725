//! Platform memory access
//!
//! ACPI tables, the SMBIOS structure table, the log area and caller
//! supplied pointers are all flat physical addresses. The measurement core
//! only ever touches them through [`Platform`].

/// Firmware platform services
pub trait Platform {
    /// Physical address of the ACPI RSDP, if firmware found one
    fn rsdp_address(&self) -> Option<u64>;

    /// Physical address of the SMBIOS 2.x entry point, if present
    fn smbios_entry_point(&self) -> Option<u64>;

    /// Borrow `len` bytes of physical memory at `addr`
    fn read_phys(&self, addr: u64, len: usize) -> Option<&[u8]>;

    /// Hand out the ACPI log area for exclusive use by the event log
    fn log_area(&mut self, base: u64, len: usize) -> Option<&'static mut [u8]>;
}

/// Platform where physical memory is identity mapped
#[derive(Debug)]
pub struct IdentityMapped {
    rsdp: Option<u64>,
    smbios: Option<u64>,
}

impl IdentityMapped {
    /// Create a platform view over identity-mapped memory
    ///
    /// # Safety
    ///
    /// Every address later passed to [`Platform::read_phys`] must be mapped
    /// and readable, and the log area must not be accessed by anything else
    /// while the event log owns it.
    pub const unsafe fn new(rsdp: Option<u64>, smbios: Option<u64>) -> Self {
        Self { rsdp, smbios }
    }
}

impl Platform for IdentityMapped {
    fn rsdp_address(&self) -> Option<u64> {
        self.rsdp
    }

    fn smbios_entry_point(&self) -> Option<u64> {
        self.smbios
    }

    fn read_phys(&self, addr: u64, len: usize) -> Option<&[u8]> {
        if addr == 0 {
            return None;
        }
        let ptr = usize::try_from(addr).ok()? as *const u8;
        // SAFETY: the constructor contract guarantees the range is mapped
        Some(unsafe { core::slice::from_raw_parts(ptr, len) })
    }

    fn log_area(&mut self, base: u64, len: usize) -> Option<&'static mut [u8]> {
        if base == 0 || len == 0 {
            return None;
        }
        let ptr = usize::try_from(base).ok()? as *mut u8;
        // SAFETY: the constructor contract grants the log exclusive access
        Some(unsafe { core::slice::from_raw_parts_mut(ptr, len) })
    }
}
