//! Runtime configuration
//!
//! Defaults follow the crate features so a firmware image configured at
//! build time needs no extra wiring; tests and embedders can override.

/// TCG BIOS configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcgConfig {
    /// Accept `TPM_INVALID_POSTINIT` from `TPM_Startup(ST_CLEAR)`
    pub tolerate_invalid_postinit: bool,
    /// Only establish state and the log; leave the TPM startup to the host
    pub skip_startup: bool,
}

impl TcgConfig {
    /// Configuration derived from the enabled crate features
    pub const fn new() -> Self {
        Self {
            tolerate_invalid_postinit: cfg!(feature = "coreboot"),
            skip_startup: cfg!(feature = "xen"),
        }
    }

    /// Set whether an already-started TPM is acceptable
    pub const fn with_tolerate_invalid_postinit(mut self, value: bool) -> Self {
        self.tolerate_invalid_postinit = value;
        self
    }

    /// Set whether the startup sequence is skipped
    pub const fn with_skip_startup(mut self, value: bool) -> Self {
        self.skip_startup = value;
        self
    }
}

impl Default for TcgConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = TcgConfig::new()
            .with_tolerate_invalid_postinit(true)
            .with_skip_startup(false);

        assert!(config.tolerate_invalid_postinit);
        assert!(!config.skip_startup);
    }
}
