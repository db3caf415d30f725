//! TPM 1.2 and TCG PC Client constants
//!
//! Ordinals, tags, return codes and event types used by the legacy BIOS
//! measured boot path. Only SHA-1 banks exist on these devices.

use bitflags::bitflags;

// =============================================================================
// LIMITS
// =============================================================================

/// SHA-1 digest size
pub const SHA1_DIGEST_SIZE: usize = 20;

/// Number of PCRs on a PC Client TPM 1.2
pub const TPM_NUM_PCRS: u32 = 24;

/// Locality used for everything except the establishment bit reset
pub const TPM_LOCALITY_0: u8 = 0;

/// Locality the establishment bit may be reset from
pub const TPM_LOCALITY_3: u8 = 3;

// =============================================================================
// COMMAND TAGS
// =============================================================================

/// Command tags
pub mod tag {
    /// Request without authorization
    pub const TPM_TAG_RQU_CMD: u16 = 0x00C1;
    /// Response without authorization
    pub const TPM_TAG_RSP_CMD: u16 = 0x00C4;
}

// =============================================================================
// ORDINALS
// =============================================================================

/// TPM 1.2 command ordinals
pub mod ordinal {
    /// TPM_Extend
    pub const TPM_ORD_EXTEND: u32 = 0x0000_0014;
    /// TPM_SelfTestFull
    pub const TPM_ORD_SELF_TEST_FULL: u32 = 0x0000_0050;
    /// TPM_GetCapability
    pub const TPM_ORD_GET_CAPABILITY: u32 = 0x0000_0065;
    /// TPM_SetTempDeactivated
    pub const TPM_ORD_SET_TEMP_DEACTIVATED: u32 = 0x0000_0073;
    /// TPM_Startup
    pub const TPM_ORD_STARTUP: u32 = 0x0000_0099;
    /// TSC_PhysicalPresence
    pub const TSC_ORD_PHYSICAL_PRESENCE: u32 = 0x4000_000A;
    /// TSC_ResetEstablishmentBit
    pub const TSC_ORD_RESET_ESTABLISHMENT_BIT: u32 = 0x4000_000B;
}

// =============================================================================
// RETURN CODES
// =============================================================================

/// TPM 1.2 return codes the BIOS path interprets
pub mod rc {
    /// Success
    pub const TPM_SUCCESS: u32 = 0x00;
    /// Command sent from the wrong locality
    pub const TPM_BAD_LOCALITY: u32 = 0x3D;
    /// TPM_Startup issued after the TPM was already started
    pub const TPM_INVALID_POSTINIT: u32 = 0x26;
}

// =============================================================================
// STARTUP
// =============================================================================

/// TPM_Startup type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum StartupType {
    /// Cold boot
    Clear = 0x0001,
    /// Resume from S3, restore saved state
    State = 0x0002,
    /// Come up deactivated
    Deactivated = 0x0003,
}

impl StartupType {
    /// Wire encoding
    pub const fn to_be_bytes(self) -> [u8; 2] {
        (self as u16).to_be_bytes()
    }
}

bitflags! {
    /// TSC_PhysicalPresence command word
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PhysicalPresence: u16 {
        /// Lock the physical presence state
        const LOCK = 0x0004;
        /// Assert physical presence
        const PRESENT = 0x0008;
        /// Deassert physical presence
        const NOT_PRESENT = 0x0010;
        /// Enable the software physical presence command
        const CMD_ENABLE = 0x0020;
        /// Enable hardware physical presence
        const HW_ENABLE = 0x0040;
        /// Lock the enable bits for the lifetime of the TPM
        const LIFETIME_LOCK = 0x0080;
        /// Disable the software physical presence command
        const CMD_DISABLE = 0x0100;
        /// Disable hardware physical presence
        const HW_DISABLE = 0x0200;
    }
}

impl PhysicalPresence {
    /// Wire encoding
    pub const fn to_be_bytes(self) -> [u8; 2] {
        self.bits().to_be_bytes()
    }
}

// =============================================================================
// CAPABILITY QUERIES
// =============================================================================

/// TPM_GetCapability parameters
pub mod capability {
    /// TPM_CAP_PROPERTY
    pub const TPM_CAP_PROPERTY: u32 = 0x0000_0005;
    /// TPM_CAP_PROP_TIS_TIMEOUT
    pub const TPM_CAP_PROP_TIS_TIMEOUT: u32 = 0x0000_0115;
    /// TPM_CAP_PROP_DURATION
    pub const TPM_CAP_PROP_DURATION: u32 = 0x0000_0120;

    /// Encoded GetCapability(PROPERTY, subcap) request body
    pub const fn property_request(sub_cap: u32) -> [u8; 12] {
        let cap = TPM_CAP_PROPERTY.to_be_bytes();
        let size = 4u32.to_be_bytes();
        let sub = sub_cap.to_be_bytes();
        [
            cap[0], cap[1], cap[2], cap[3],
            size[0], size[1], size[2], size[3],
            sub[0], sub[1], sub[2], sub[3],
        ]
    }
}

// =============================================================================
// EVENT TYPES
// =============================================================================

/// TCG PC Client event types used by the BIOS
pub mod event_type {
    /// Separator between pre-boot and boot phases
    pub const EV_SEPARATOR: u32 = 0x0000_0004;
    /// Free-text action
    pub const EV_ACTION: u32 = 0x0000_0005;
    /// Tagged event (SMBIOS, option ROM)
    pub const EV_EVENT_TAG: u32 = 0x0000_0006;
    /// Compact hash via the capability surface
    pub const EV_COMPACT_HASH: u32 = 0x0000_000C;
    /// Initial program loader code
    pub const EV_IPL: u32 = 0x0000_000D;
    /// Initial program loader data
    pub const EV_IPL_PARTITION_DATA: u32 = 0x0000_000E;
}

/// Event IDs inside `EV_EVENT_TAG` bodies
pub mod event_id {
    /// SMBIOS structure table
    pub const SMBIOS: u32 = 1;
    /// Option ROM execution
    pub const OPTION_ROM_EXEC: u32 = 7;
}

/// PCR assignments for the PC Client BIOS
pub mod pcr {
    /// Host platform configuration
    pub const PLATFORM_CONFIG: u32 = 1;
    /// Option ROM code
    pub const OPTION_ROM_CODE: u32 = 2;
    /// IPL code
    pub const IPL_CODE: u32 = 4;
    /// IPL configuration and data
    pub const IPL_CONFIG: u32 = 5;
    /// Last PCR that receives a separator before boot
    pub const LAST_PRE_OS: u32 = 7;
}

/// Separator event digest input
pub const EVENT_SEPARATOR: [u8; 4] = [0xFF; 4];

// =============================================================================
// TESTS
// =============================================================================
