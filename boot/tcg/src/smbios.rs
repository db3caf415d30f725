//! SMBIOS entry point
//!
//! Only the 2.x entry point is consulted; the structure table it points at
//! is hashed whole into PCR 1.

use crate::platform::Platform;

/// SMBIOS 2.x anchor
pub const SMBIOS_ANCHOR: [u8; 4] = *b"_SM_";

/// SMBIOS 2.x entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Smbios2EntryPoint {
    /// Entry point length
    pub length: u8,
    /// Major version
    pub major_version: u8,
    /// Minor version
    pub minor_version: u8,
    /// Structure table length
    pub structure_table_length: u16,
    /// Structure table address
    pub structure_table_address: u32,
    /// Number of structures
    pub number_of_structures: u16,
}

impl Smbios2EntryPoint {
    /// Size
    pub const SIZE: usize = 31;

    /// Parse from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }

        let anchor: [u8; 4] = bytes[0..4].try_into().ok()?;
        if anchor != SMBIOS_ANCHOR {
            return None;
        }

        Some(Self {
            length: bytes[5],
            major_version: bytes[6],
            minor_version: bytes[7],
            structure_table_length: u16::from_le_bytes(bytes[22..24].try_into().ok()?),
            structure_table_address: u32::from_le_bytes(bytes[24..28].try_into().ok()?),
            number_of_structures: u16::from_le_bytes(bytes[28..30].try_into().ok()?),
        })
    }

    /// Borrow the structure table this entry point describes
    pub fn structure_table<'a, P: Platform>(&self, platform: &'a P) -> Option<&'a [u8]> {
        platform.read_phys(
            u64::from(self.structure_table_address),
            usize::from(self.structure_table_length),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockPlatform, SMBIOS_EP_ADDR};

    #[test]
    fn test_parse_entry_point() {
        let platform = MockPlatform::with_tcpa(0x8000, 4096).with_smbios(b"type0-type1-type127");
        let ep = Smbios2EntryPoint::from_bytes(
            platform.read_phys(SMBIOS_EP_ADDR, Smbios2EntryPoint::SIZE).unwrap(),
        )
        .unwrap();

        assert_eq!(ep.structure_table_length, 19);
        assert_eq!(ep.structure_table(&platform).unwrap(), b"type0-type1-type127");
    }

    #[test]
    fn test_bad_anchor() {
        let mut bytes = [0u8; Smbios2EntryPoint::SIZE];
        bytes[0..4].copy_from_slice(b"_SM3");
        assert!(Smbios2EntryPoint::from_bytes(&bytes).is_none());
    }
}
