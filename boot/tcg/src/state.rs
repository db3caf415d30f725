//! TPM session state
//!
//! A single [`TpmState`] lives inside the context for the whole boot
//! session. Presence and health are one tagged value so a failed TPM can
//! never look working again without an explicit [`TcgBios::reset_state`].

use crate::acpi::TcpaDescriptor;
use crate::driver::DriverId;
use crate::platform::Platform;
use crate::TcgBios;

/// Probe outcome and health of the TPM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpmPresence {
    /// No probe has run this session
    NotProbed,
    /// Every registered driver declined
    Absent,
    /// Device found and usable through the given driver
    Working(DriverId),
    /// Device found but degraded for the rest of the session
    Failed(DriverId),
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmState {
    presence: TpmPresence,
    interface_shutdown: bool,
    /// Located TCPA table, kept across [`TpmState::reset`]
    pub(crate) tcpa: Option<TcpaDescriptor>,
}

impl TpmState {
    /// Fresh, unprobed state
    pub const fn new() -> Self {
        Self {
            presence: TpmPresence::NotProbed,
            interface_shutdown: false,
            tcpa: None,
        }
    }

    /// Current presence
    pub const fn presence(&self) -> TpmPresence {
        self.presence
    }

    /// A probe has run
    pub const fn is_probed(&self) -> bool {
        !matches!(self.presence, TpmPresence::NotProbed)
    }

    /// A device was found, working or not
    pub const fn is_found(&self) -> bool {
        matches!(self.presence, TpmPresence::Working(_) | TpmPresence::Failed(_))
    }

    /// Device is usable, without probing
    pub const fn is_working(&self) -> bool {
        matches!(self.presence, TpmPresence::Working(_))
    }

    /// Driver selected at probe time
    pub const fn driver(&self) -> Option<DriverId> {
        match self.presence {
            TpmPresence::Working(id) | TpmPresence::Failed(id) => Some(id),
            TpmPresence::NotProbed | TpmPresence::Absent => None,
        }
    }

    /// Preboot interface is latched off
    pub const fn is_interface_shutdown(&self) -> bool {
        self.interface_shutdown
    }

    /// Cached TCPA table
    pub const fn tcpa(&self) -> Option<&TcpaDescriptor> {
        self.tcpa.as_ref()
    }

    /// Record the probe result; ignored once probed
    pub(crate) fn record_probe(&mut self, driver: Option<DriverId>) {
        if self.is_probed() {
            return;
        }
        self.presence = match driver {
            Some(id) => TpmPresence::Working(id),
            None => TpmPresence::Absent,
        };
    }

    /// Move a working TPM to the failed state
    pub(crate) fn degrade(&mut self) {
        if let TpmPresence::Working(id) = self.presence {
            self.presence = TpmPresence::Failed(id);
        }
    }

    /// Latch the preboot interface off
    pub(crate) fn shutdown_interface(&mut self) {
        self.interface_shutdown = true;
    }

    /// Clear presence and the shutdown latch
    pub(crate) fn reset(&mut self) {
        self.presence = TpmPresence::NotProbed;
        self.interface_shutdown = false;
    }
}

impl Default for TpmState {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TRACKER OPERATIONS
// =============================================================================

impl<P: Platform> TcgBios<P> {
    /// Probe registered drivers in order, once per session
    pub fn probe(&mut self) {
        if self.state.is_probed() {
            return;
        }

        let found = self
            .drivers
            .iter_mut()
            .position(|driver| driver.probe())
            .map(DriverId);

        if let Some(id) = found {
            if let Some(driver) = self.drivers.get_mut(id.index()) {
                driver.init();
            }
            log::info!("TCG: TPM found on driver {}", id.index());
        } else {
            log::info!("TCG: no TPM found");
        }

        self.state.record_probe(found);
    }

    /// Whether the TPM is usable, probing first if needed
    pub fn is_working(&mut self) -> bool {
        self.probe();
        self.state.is_working()
    }

    /// Forget presence, health and the shutdown latch; the next query probes again
    pub fn reset_state(&mut self) {
        self.state.reset();
    }
}
