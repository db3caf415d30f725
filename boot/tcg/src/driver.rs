//! TPM driver interface
//!
//! The byte-level transport (TIS FIFO, CRB, virtual devices) lives outside
//! this crate. Every driver the firmware links in implements [`TpmDriver`]
//! and is registered with the context in priority order; the first one that
//! reports a device is used for the rest of the session.

use core::fmt;

// =============================================================================
// DURATION CLASSES
// =============================================================================

/// Command latency class used to select a response timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationClass {
    /// Short commands (extend, physical presence, capability queries)
    Short,
    /// Medium commands
    Medium,
    /// Long commands (self test, pass-through)
    Long,
}

impl DurationClass {
    /// Index into the TPM-reported duration table
    pub const fn index(self) -> usize {
        match self {
            DurationClass::Short => 0,
            DurationClass::Medium => 1,
            DurationClass::Long => 2,
        }
    }
}

// =============================================================================
// DRIVER ERRORS
// =============================================================================

/// Driver-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// Locality could not be requested
    Locality,
    /// Device did not become ready in time
    Timeout,
    /// Register or FIFO access failed
    Io,
    /// Response did not fit the supplied buffer
    BufferTooSmall,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Locality => write!(f, "locality not granted"),
            DriverError::Timeout => write!(f, "timeout"),
            DriverError::Io => write!(f, "I/O error"),
            DriverError::BufferTooSmall => write!(f, "response buffer too small"),
        }
    }
}

/// Driver result type
pub type DriverResult<T> = core::result::Result<T, DriverError>;

// =============================================================================
// DRIVER TRAIT
// =============================================================================

/// Index of a registered driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverId(pub usize);

impl DriverId {
    /// Position in the registration order
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Low-level TPM transport
pub trait TpmDriver {
    /// Check whether a device answers on this interface
    fn probe(&mut self) -> bool;

    /// Bring the interface into its initial state after a successful probe
    fn init(&mut self);

    /// Request the given locality
    fn activate(&mut self, locality: u8) -> DriverResult<()>;

    /// Send a complete command
    fn send(&mut self, command: &[u8]) -> DriverResult<()>;

    /// Wait until the status register is valid
    fn wait_data_valid(&mut self) -> DriverResult<()>;

    /// Wait for the response using the timeout of `duration`
    fn wait_response_ready(&mut self, duration: DurationClass) -> DriverResult<()>;

    /// Read the response into `buffer`, returning the number of bytes read
    fn read_response(&mut self, buffer: &mut [u8]) -> DriverResult<usize>;

    /// Return the interface to idle
    fn ready(&mut self);

    /// Install device-reported timeouts (A, B, C, D) and durations
    /// (short, medium, long), all in microseconds
    fn set_timeouts(&mut self, timeouts: [u32; 4], durations: [u32; 3]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_index() {
        assert_eq!(DurationClass::Short.index(), 0);
        assert_eq!(DurationClass::Medium.index(), 1);
        assert_eq!(DurationClass::Long.index(), 2);
    }
}
