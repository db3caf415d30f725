//! Error types for the TCG BIOS extension
//!
//! Every failure that can leave the measurement core is one of the
//! variants below. Each maps onto the numeric status the capability
//! surface hands back to option ROMs and boot loaders.

use core::fmt;

/// Result type for TCG operations
pub type Result<T> = core::result::Result<T, TcgError>;

// =============================================================================
// STATUS CODES
// =============================================================================

/// Numeric status codes reported through the capability surface
pub mod status {
    /// Request completed
    pub const TCG_PC_OK: u32 = 0x00;
    /// Event log region exhausted
    pub const TCG_PC_LOGOVERFLOW: u32 = 0x02;
    /// Function not supported
    pub const TCG_PC_UNSUPPORTED: u32 = 0x03;

    const TPM_RET_BASE: u32 = 0x01;

    /// TPM not working (never found, or degraded for the session)
    pub const TCG_GENERAL_ERROR: u32 = TPM_RET_BASE;
    /// Internal sizing invariant violated
    pub const TCG_FIRMWARE_ERROR: u32 = TPM_RET_BASE + 0x05;
    /// Driver or transport failure
    pub const TCG_FATAL_COM_ERROR: u32 = TPM_RET_BASE + 0x17;
    /// Malformed caller block
    pub const TCG_INVALID_INPUT_PARA: u32 = TPM_RET_BASE + 0x18;
    /// Device returned a nonzero status inside a command sequence
    pub const TCG_TCG_COMMAND_ERROR: u32 = TPM_RET_BASE + 0x19;
    /// Preboot interface latched off
    pub const TCG_INTERFACE_SHUTDOWN: u32 = TPM_RET_BASE + 0x20;
    /// No TPM on this platform
    pub const TCG_PC_TPM_NOT_PRESENT: u32 = TPM_RET_BASE + 0x22;
}

// =============================================================================
// ERROR TYPE
// =============================================================================

/// TCG BIOS error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcgError {
    /// TPM is not currently working
    GeneralError,
    /// Malformed caller-supplied block or out-of-range PCR index
    InvalidInput,
    /// Preboot interface has been shut down for this session
    InterfaceShutdown,
    /// Event log region exhausted or never established
    LogOverflow,
    /// Driver, timeout or framing failure while talking to the TPM
    FatalComError,
    /// TPM reported a nonzero status during a command sequence
    CommandError,
    /// Internal staging buffer sizing violated
    FirmwareError,
    /// No TPM present
    NotPresent,
    /// Function not supported
    Unsupported,
}

impl TcgError {
    /// Numeric status code for the capability surface
    pub const fn code(&self) -> u32 {
        match self {
            TcgError::GeneralError => status::TCG_GENERAL_ERROR,
            TcgError::InvalidInput => status::TCG_INVALID_INPUT_PARA,
            TcgError::InterfaceShutdown => status::TCG_INTERFACE_SHUTDOWN,
            TcgError::LogOverflow => status::TCG_PC_LOGOVERFLOW,
            TcgError::FatalComError => status::TCG_FATAL_COM_ERROR,
            TcgError::CommandError => status::TCG_TCG_COMMAND_ERROR,
            TcgError::FirmwareError => status::TCG_FIRMWARE_ERROR,
            TcgError::NotPresent => status::TCG_PC_TPM_NOT_PRESENT,
            TcgError::Unsupported => status::TCG_PC_UNSUPPORTED,
        }
    }
}

impl fmt::Display for TcgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TcgError::GeneralError => write!(f, "TPM not working"),
            TcgError::InvalidInput => write!(f, "invalid input parameter"),
            TcgError::InterfaceShutdown => write!(f, "preboot interface shut down"),
            TcgError::LogOverflow => write!(f, "event log overflow"),
            TcgError::FatalComError => write!(f, "fatal TPM communication error"),
            TcgError::CommandError => write!(f, "TPM command error"),
            TcgError::FirmwareError => write!(f, "firmware internal error"),
            TcgError::NotPresent => write!(f, "TPM not present"),
            TcgError::Unsupported => write!(f, "unsupported function"),
        }
    }
}

/// Collapse a result into the status word returned to callers
pub fn status_of<T>(result: &Result<T>) -> u32 {
    match result {
        Ok(_) => status::TCG_PC_OK,
        Err(e) => e.code(),
    }
}

// =============================================================================
// TESTS
// =============================================================================
