//! Event log wire formats
//!
//! The log is read back by external verifiers, so every structure here has
//! a fixed little-endian layout whose size is pinned at compile time.

use static_assertions::const_assert_eq;

use crate::consts::{event_id, SHA1_DIGEST_SIZE};

// =============================================================================
// PCR EVENT HEADER
// =============================================================================

/// `TCG_PCClientPCREventStruct` header, followed by `event_data_size` bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcrEventHeader {
    /// PCR the digest was extended into
    pub pcr_index: u32,
    /// Event type
    pub event_type: u32,
    /// SHA-1 digest
    pub digest: [u8; SHA1_DIGEST_SIZE],
    /// Length of the event body
    pub event_data_size: u32,
}

const_assert_eq!(PcrEventHeader::SIZE, 32);

impl PcrEventHeader {
    /// Encoded size
    pub const SIZE: usize = 4 + 4 + SHA1_DIGEST_SIZE + 4;

    /// Parse from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }

        let mut digest = [0u8; SHA1_DIGEST_SIZE];
        digest.copy_from_slice(&bytes[8..28]);

        Some(Self {
            pcr_index: u32::from_le_bytes(bytes[0..4].try_into().ok()?),
            event_type: u32::from_le_bytes(bytes[4..8].try_into().ok()?),
            digest,
            event_data_size: u32::from_le_bytes(bytes[28..32].try_into().ok()?),
        })
    }

    /// Encode to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.pcr_index.to_le_bytes());
        out[4..8].copy_from_slice(&self.event_type.to_le_bytes());
        out[8..28].copy_from_slice(&self.digest);
        out[28..32].copy_from_slice(&self.event_data_size.to_le_bytes());
        out
    }
}

// =============================================================================
// PCR EVENT
// =============================================================================

/// A measurement ready to be logged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcrEvent<'a> {
    /// Target PCR
    pub pcr_index: u32,
    /// Event type
    pub event_type: u32,
    /// Digest that was (or will be) extended
    pub digest: [u8; SHA1_DIGEST_SIZE],
    /// Event body copied into the log verbatim
    pub data: &'a [u8],
}

/// Body length as carried in the header
fn event_data_size(len: usize) -> Option<u32> {
    u32::try_from(len).ok()
}

impl<'a> PcrEvent<'a> {
    /// Create an event with a zero digest
    pub const fn new(pcr_index: u32, event_type: u32, data: &'a [u8]) -> Self {
        Self {
            pcr_index,
            event_type,
            digest: [0; SHA1_DIGEST_SIZE],
            data,
        }
    }

    /// Fill the digest from `hash_data` when there is any
    pub fn with_hash(mut self, hash_data: Option<&[u8]>) -> Self {
        if let Some(data) = hash_data {
            self.digest = crate::digest::sha1(data);
        }
        self
    }

    /// Header as written to the log, `None` if the body overflows `event_data_size`
    pub fn header(&self) -> Option<PcrEventHeader> {
        Some(PcrEventHeader {
            pcr_index: self.pcr_index,
            event_type: self.event_type,
            digest: self.digest,
            event_data_size: event_data_size(self.data.len())?,
        })
    }

    /// Total bytes this event occupies in the log
    pub fn encoded_len(&self) -> usize {
        PcrEventHeader::SIZE + self.data.len()
    }
}

// =============================================================================
// TAGGED EVENT BODIES
// =============================================================================

/// `EV_EVENT_TAG` body for the SMBIOS structure table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmbiosEvent {
    /// Digest of the structure table
    pub digest: [u8; SHA1_DIGEST_SIZE],
}

const_assert_eq!(SmbiosEvent::SIZE, 28);

impl SmbiosEvent {
    /// Encoded size
    pub const SIZE: usize = 4 + 4 + SHA1_DIGEST_SIZE;

    /// Encode to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&event_id::SMBIOS.to_le_bytes());
        out[4..8].copy_from_slice(&(SHA1_DIGEST_SIZE as u32).to_le_bytes());
        out[8..28].copy_from_slice(&self.digest);
        out
    }
}

/// `EV_EVENT_TAG` body for an executed option ROM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionRomEvent {
    /// PCI function address of the device, 0 when unknown
    pub pfa: u16,
    /// Digest of the ROM image
    pub digest: [u8; SHA1_DIGEST_SIZE],
}

const_assert_eq!(OptionRomEvent::SIZE, 32);

impl OptionRomEvent {
    /// Encoded size
    pub const SIZE: usize = 4 + 4 + 2 + 2 + SHA1_DIGEST_SIZE;

    /// Size of the part after `event_data_size`
    const BODY_SIZE: u32 = (Self::SIZE - 8) as u32;

    /// Encode to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&event_id::OPTION_ROM_EXEC.to_le_bytes());
        out[4..8].copy_from_slice(&Self::BODY_SIZE.to_le_bytes());
        // 8..10 reserved
        out[10..12].copy_from_slice(&self.pfa.to_le_bytes());
        out[12..32].copy_from_slice(&self.digest);
        out
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::event_type;

    #[test]
    fn test_header_layout() {
        let header = PcrEventHeader {
            pcr_index: 4,
            event_type: event_type::EV_ACTION,
            digest: [0xAB; SHA1_DIGEST_SIZE],
            event_data_size: 15,
        };
        let bytes = header.to_bytes();

        assert_eq!(&bytes[0..4], &[4, 0, 0, 0]);
        assert_eq!(&bytes[4..8], &[5, 0, 0, 0]);
        assert_eq!(&bytes[28..32], &[15, 0, 0, 0]);
        assert_eq!(PcrEventHeader::from_bytes(&bytes), Some(header));
        assert_eq!(PcrEventHeader::from_bytes(&bytes[..31]), None);
    }

    #[test]
    fn test_event_header_tracks_body() {
        let event = PcrEvent::new(2, event_type::EV_ACTION, b"Start Option ROM Scan")
            .with_hash(Some(b"Start Option ROM Scan"));

        assert_eq!(event.header().map(|h| h.event_data_size), Some(21));
        assert_eq!(event.encoded_len(), 53);
        assert_eq!(event.digest, crate::digest::sha1(b"Start Option ROM Scan"));
    }

    #[test]
    fn test_event_data_size_bounds() {
        assert_eq!(event_data_size(0), Some(0));
        assert_eq!(event_data_size(u32::MAX as usize), Some(u32::MAX));
        #[cfg(target_pointer_width = "64")]
        assert_eq!(event_data_size(u32::MAX as usize + 1), None);
    }

    #[test]
    fn test_tagged_bodies() {
        let smbios = SmbiosEvent { digest: [1; SHA1_DIGEST_SIZE] }.to_bytes();
        assert_eq!(&smbios[0..8], &[1, 0, 0, 0, 20, 0, 0, 0]);

        let rom = OptionRomEvent { pfa: 0x0010, digest: [2; SHA1_DIGEST_SIZE] }.to_bytes();
        assert_eq!(&rom[0..12], &[7, 0, 0, 0, 24, 0, 0, 0, 0, 0, 0x10, 0]);
        assert_eq!(&rom[12..], &[2; SHA1_DIGEST_SIZE]);
    }
}
