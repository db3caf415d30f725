//! # Helix TCG BIOS Extension
//!
//! TCG measured boot for legacy PC firmware: drives a TPM 1.2, keeps the
//! ACPI event log, and serves the TCG BIOS capability interface used by
//! option ROMs and boot loaders.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Boot hooks (setup, option ROM, IPL, INT 19h, S3 resume)        │
//! │  Capability interface (status, hash-log-extend, pass-through)   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Measurement pipeline: extend PCR, then append to the log       │
//! ├──────────────────────────────┬──────────────────────────────────┤
//! │  Command transport           │  Event log (ACPI TCPA LASA)      │
//! ├──────────────────────────────┼──────────────────────────────────┤
//! │  TpmDriver (TIS, CRB, ...)   │  Platform (RSDP, SMBIOS, memory) │
//! └──────────────────────────────┴──────────────────────────────────┘
//! ```
//!
//! All session state lives in one [`TcgBios`] value owned by the firmware.
//! Nothing here is global and nothing is locked: the firmware calls in from
//! a single thread of control.
//!
//! ## Features
//!
//! - `coreboot` - tolerate a TPM that earlier firmware already started
//! - `xen` - leave TPM startup to the host, only set up the log
//! - `debug_output` - verbose tracing through the `log` facade

#![no_std]

extern crate alloc;

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

// =============================================================================
// MODULES
// =============================================================================

pub mod acpi;
pub mod config;
pub mod consts;
pub mod digest;
pub mod driver;
pub mod error;
pub mod event;
pub mod eventlog;
pub mod interface;
pub mod measure;
pub mod platform;
pub mod smbios;
pub mod state;
pub mod transport;

#[cfg(test)]
mod mock;

pub use config::TcgConfig;
pub use driver::{DriverId, DurationClass, TpmDriver};
pub use error::{Result, TcgError};
pub use eventlog::EventLog;
pub use interface::{CallFrame, Registers};
pub use platform::Platform;
pub use state::{TpmPresence, TpmState};

// =============================================================================
// CONTEXT
// =============================================================================

/// TCG BIOS session context
pub struct TcgBios<P: Platform> {
    pub(crate) platform: P,
    pub(crate) drivers: Vec<Box<dyn TpmDriver>>,
    pub(crate) state: TpmState,
    pub(crate) log: EventLog,
    pub(crate) config: TcgConfig,
}

impl<P: Platform> TcgBios<P> {
    /// Create a context with no drivers registered
    pub fn new(platform: P, config: TcgConfig) -> Self {
        Self {
            platform,
            drivers: Vec::new(),
            state: TpmState::new(),
            log: EventLog::new(),
            config,
        }
    }

    /// Register a driver; probing tries drivers in registration order
    pub fn register_driver(&mut self, driver: Box<dyn TpmDriver>) -> DriverId {
        self.drivers.push(driver);
        DriverId(self.drivers.len() - 1)
    }

    /// Session state
    pub fn state(&self) -> &TpmState {
        &self.state
    }

    /// Event log
    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// Configuration
    pub fn config(&self) -> &TcgConfig {
        &self.config
    }

    /// Platform services
    pub fn platform(&self) -> &P {
        &self.platform
    }
}

impl<P: Platform> fmt::Debug for TcgBios<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcgBios")
            .field("drivers", &self.drivers.len())
            .field("state", &self.state)
            .field("log", &self.log)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockPlatform, MockTpm};

    #[test]
    fn test_probe_order() {
        let absent = MockTpm::new(false);
        let first = MockTpm::new(true);
        let second = MockTpm::new(true);

        let mut bios = TcgBios::new(MockPlatform::bare(), TcgConfig::new());
        bios.register_driver(absent.driver());
        let expected = bios.register_driver(first.driver());
        bios.register_driver(second.driver());

        assert!(bios.is_working());
        assert_eq!(bios.state().presence(), TpmPresence::Working(expected));
        assert!(first.is_initialized());
        assert!(!second.is_initialized());
    }

    #[test]
    fn test_no_drivers() {
        let mut bios = TcgBios::new(MockPlatform::bare(), TcgConfig::new());

        assert!(!bios.is_working());
        assert_eq!(bios.state().presence(), TpmPresence::Absent);
        assert_eq!(bios.log().entry_count(), 0);
    }
}
