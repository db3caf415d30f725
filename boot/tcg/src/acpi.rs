//! ACPI TCPA table discovery
//!
//! The client TCPA table names the physical log area (LASA) and its minimum
//! length (LAML). It is found by walking the RSDT that the RSDP points at.

use static_assertions::const_assert_eq;

use crate::platform::Platform;
use crate::TcgBios;

/// RSDP signature "RSD PTR "
pub const RSDP_SIGNATURE: [u8; 8] = *b"RSD PTR ";

/// Known ACPI table signatures
pub mod signature {
    /// Root System Description Table
    pub const RSDT: [u8; 4] = *b"RSDT";
    /// Trusted Computing Platform Alliance table
    pub const TCPA: [u8; 4] = *b"TCPA";
}

/// Byte-sum over a table; zero for a valid table
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |a, &b| a.wrapping_add(b))
}

// =============================================================================
// RSDP
// =============================================================================

/// ACPI 1.0 RSDP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rsdp {
    /// Checksum (ACPI 1.0)
    pub checksum: u8,
    /// OEM ID
    pub oem_id: [u8; 6],
    /// Revision
    pub revision: u8,
    /// RSDT address (32-bit)
    pub rsdt_address: u32,
}

impl Rsdp {
    /// Size
    pub const SIZE: usize = 20;

    /// Parse and checksum the first 20 bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }

        let sig: [u8; 8] = bytes[0..8].try_into().ok()?;
        if sig != RSDP_SIGNATURE || checksum(&bytes[..Self::SIZE]) != 0 {
            return None;
        }

        Some(Self {
            checksum: bytes[8],
            oem_id: bytes[9..15].try_into().ok()?,
            revision: bytes[15],
            rsdt_address: u32::from_le_bytes(bytes[16..20].try_into().ok()?),
        })
    }
}

// =============================================================================
// SDT HEADER
// =============================================================================

/// SDT header (common to all ACPI tables)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdtHeader {
    /// Signature
    pub signature: [u8; 4],
    /// Length including the header
    pub length: u32,
    /// Revision
    pub revision: u8,
    /// Checksum
    pub checksum: u8,
    /// OEM ID
    pub oem_id: [u8; 6],
    /// OEM table ID
    pub oem_table_id: [u8; 8],
    /// OEM revision
    pub oem_revision: u32,
    /// Creator ID
    pub creator_id: u32,
    /// Creator revision
    pub creator_revision: u32,
}

impl SdtHeader {
    /// Size
    pub const SIZE: usize = 36;

    /// Parse from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }

        Some(Self {
            signature: bytes[0..4].try_into().ok()?,
            length: u32::from_le_bytes(bytes[4..8].try_into().ok()?),
            revision: bytes[8],
            checksum: bytes[9],
            oem_id: bytes[10..16].try_into().ok()?,
            oem_table_id: bytes[16..24].try_into().ok()?,
            oem_revision: u32::from_le_bytes(bytes[24..28].try_into().ok()?),
            creator_id: u32::from_le_bytes(bytes[28..32].try_into().ok()?),
            creator_revision: u32::from_le_bytes(bytes[32..36].try_into().ok()?),
        })
    }
}

// =============================================================================
// RSDT
// =============================================================================

/// RSDT (32-bit pointers)
#[derive(Debug)]
pub struct Rsdt<'a> {
    header: SdtHeader,
    data: &'a [u8],
}

impl<'a> Rsdt<'a> {
    /// Parse RSDT
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        let header = SdtHeader::from_bytes(data)?;
        if header.signature != signature::RSDT {
            return None;
        }

        Some(Self { header, data })
    }

    /// Number of entries the declared length covers
    pub fn entry_count(&self) -> usize {
        (self.header.length as usize).saturating_sub(SdtHeader::SIZE) / 4
    }

    /// Iterate table addresses in table order
    pub fn entries(&self) -> impl Iterator<Item = u32> + 'a {
        let data = self.data;
        (0..self.entry_count()).map_while(move |i| {
            let offset = SdtHeader::SIZE + i * 4;
            let raw = data.get(offset..offset + 4)?;
            Some(u32::from_le_bytes(raw.try_into().ok()?))
        })
    }
}

// =============================================================================
// TCPA
// =============================================================================

/// Client TCPA table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpaDescriptor {
    /// Table header
    pub header: SdtHeader,
    /// Platform class (0 = client)
    pub platform_class: u16,
    /// Minimum length of the log area (LAML)
    pub log_area_minimum_length: u32,
    /// Physical start of the log area (LASA)
    pub log_area_start_address: u64,
}

const_assert_eq!(TcpaDescriptor::SIZE, SdtHeader::SIZE + 2 + 4 + 8);

impl TcpaDescriptor {
    /// Size of the client layout
    pub const SIZE: usize = 50;

    /// Parse a complete table, checking signature and checksum
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let header = SdtHeader::from_bytes(bytes)?;
        let length = header.length as usize;

        if header.signature != signature::TCPA
            || length < Self::SIZE
            || bytes.len() < length
            || checksum(&bytes[..length]) != 0
        {
            return None;
        }

        Some(Self {
            header,
            platform_class: u16::from_le_bytes(bytes[36..38].try_into().ok()?),
            log_area_minimum_length: u32::from_le_bytes(bytes[38..42].try_into().ok()?),
            log_area_start_address: u64::from_le_bytes(bytes[42..50].try_into().ok()?),
        })
    }
}

/// Walk the RSDT behind `rsdp_addr` and return the first valid TCPA table
pub fn find_tcpa<P: Platform>(platform: &P, rsdp_addr: u64) -> Option<TcpaDescriptor> {
    let rsdp = Rsdp::from_bytes(platform.read_phys(rsdp_addr, Rsdp::SIZE)?)?;
    let rsdt_addr = u64::from(rsdp.rsdt_address);

    let rsdt_header = SdtHeader::from_bytes(platform.read_phys(rsdt_addr, SdtHeader::SIZE)?)?;
    let rsdt = Rsdt::parse(platform.read_phys(rsdt_addr, rsdt_header.length as usize)?)?;

    rsdt.entries().find_map(|entry| {
        let addr = u64::from(entry);
        let header = SdtHeader::from_bytes(platform.read_phys(addr, SdtHeader::SIZE)?)?;
        if header.signature != signature::TCPA {
            return None;
        }
        TcpaDescriptor::from_bytes(platform.read_phys(addr, header.length as usize)?)
    })
}

// =============================================================================
// LOCATOR
// =============================================================================

impl<P: Platform> TcgBios<P> {
    /// Locate the TCPA table, using the session cache when it is filled
    ///
    /// A platform without an RSDP gets its preboot interface latched off.
    pub(crate) fn find_tcpa_table(&mut self) -> Option<TcpaDescriptor> {
        if let Some(tcpa) = self.state.tcpa {
            return Some(tcpa);
        }

        let Some(rsdp) = self.platform.rsdp_address() else {
            log::warn!("TCG: RSDP not found, disabling preboot interface");
            self.state.shutdown_interface();
            return None;
        };

        let tcpa = find_tcpa(&self.platform, rsdp);
        match tcpa {
            Some(table) => {
                log::debug!(
                    "TCG: TCPA LASA={:#x} LAML={:#x}",
                    table.log_area_start_address,
                    table.log_area_minimum_length
                );
                self.state.tcpa = Some(table);
            }
            None => log::warn!("TCG: TCPA ACPI table not found"),
        }

        tcpa
    }
}

// =============================================================================
// TESTS
// =============================================================================
