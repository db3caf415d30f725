//! Measurement pipeline and boot sequence hooks
//!
//! Every measurement is "extend, then log". The extend cannot be undone, so
//! a log failure after it leaves the PCR ahead of the log; the session is
//! degraded instead of trying to compensate.

use crate::consts::{
    capability, event_type, ordinal, pcr, rc, PhysicalPresence, StartupType, EVENT_SEPARATOR,
    TPM_LOCALITY_0, TPM_LOCALITY_3, TPM_NUM_PCRS,
};
use crate::digest::sha1;
use crate::driver::DurationClass;
use crate::error::{Result, TcgError};
use crate::event::{OptionRomEvent, PcrEvent, SmbiosEvent};
use crate::platform::Platform;
use crate::smbios::Smbios2EntryPoint;
use crate::transport::{request_header, EXTEND_REQUEST_SIZE, EXTEND_RESPONSE_SIZE, TPM_HEADER_SIZE};
use crate::TcgBios;

/// Size of an MBR sector
pub const MBR_SIZE: usize = 0x200;

/// Start of the partition table inside the MBR
pub const MBR_PARTITION_TABLE: usize = 0x1b8;

/// Fail the current sequence unless the device reported success
fn check_rc(name: &str, code: u32) -> Result<()> {
    log::debug!("TCG: {} returned {:#010x}", name, code);
    if code == rc::TPM_SUCCESS {
        Ok(())
    } else {
        Err(TcgError::CommandError)
    }
}

// =============================================================================
// PIPELINE
// =============================================================================

impl<P: Platform> TcgBios<P> {
    /// Quiesce the TPM and degrade the session
    ///
    /// The deactivation commands are best effort and their outcome is ignored.
    pub fn mark_failed(&mut self) {
        log::error!("TCG: TPM malfunctioning, deactivating for this session");

        let _ = self.build_and_send(
            TPM_LOCALITY_0,
            ordinal::TSC_ORD_PHYSICAL_PRESENCE,
            &PhysicalPresence::CMD_ENABLE.to_be_bytes(),
            0,
            DurationClass::Short,
        );
        let _ = self.build_and_send(
            TPM_LOCALITY_0,
            ordinal::TSC_ORD_PHYSICAL_PRESENCE,
            &PhysicalPresence::PRESENT.to_be_bytes(),
            0,
            DurationClass::Short,
        );
        let _ = self.build_and_send(
            TPM_LOCALITY_0,
            ordinal::TPM_ORD_SET_TEMP_DEACTIVATED,
            &[],
            0,
            DurationClass::Short,
        );

        self.state.degrade();
    }

    /// Extend `event.digest` into its PCR, then append it to the log
    pub fn log_extend_event(&mut self, event: &PcrEvent<'_>) -> Result<()> {
        if !self.is_working() {
            return Err(TcgError::GeneralError);
        }
        if event.pcr_index >= TPM_NUM_PCRS {
            return Err(TcgError::InvalidInput);
        }

        let mut request = [0u8; EXTEND_REQUEST_SIZE];
        request[..TPM_HEADER_SIZE]
            .copy_from_slice(&request_header(EXTEND_REQUEST_SIZE as u32, ordinal::TPM_ORD_EXTEND));
        request[TPM_HEADER_SIZE..TPM_HEADER_SIZE + 4].copy_from_slice(&event.pcr_index.to_be_bytes());
        request[TPM_HEADER_SIZE + 4..].copy_from_slice(&event.digest);

        let mut response = [0u8; EXTEND_RESPONSE_SIZE];
        match self.transmit(TPM_LOCALITY_0, &request, &mut response, DurationClass::Short) {
            Ok(EXTEND_RESPONSE_SIZE) => {}
            Ok(len) => {
                log::warn!("TCG: extend response of {} bytes", len);
                self.mark_failed();
                return Err(TcgError::FatalComError);
            }
            Err(e) => {
                self.mark_failed();
                return Err(e);
            }
        }

        if let Err(e) = self.log.append(event) {
            log::warn!(
                "TCG: PCR {} extended but not logged, log is behind the TPM",
                event.pcr_index
            );
            self.mark_failed();
            return Err(e);
        }

        Ok(())
    }

    /// Hash `hash_input` (if any) and run the extend-and-log pipeline
    pub fn measure(
        &mut self,
        pcr_index: u32,
        event_type: u32,
        event_data: &[u8],
        hash_input: Option<&[u8]>,
    ) -> Result<()> {
        let event = PcrEvent::new(pcr_index, event_type, event_data).with_hash(hash_input);
        self.log_extend_event(&event)
    }

    /// Measure a free-text action
    pub fn add_action(&mut self, pcr_index: u32, text: &str) -> Result<()> {
        self.measure(pcr_index, event_type::EV_ACTION, text.as_bytes(), Some(text.as_bytes()))
    }

    /// Separators for PCR 0 through 7
    fn add_event_separators(&mut self) -> Result<()> {
        if !self.is_working() {
            return Err(TcgError::GeneralError);
        }

        for index in 0..=pcr::LAST_PRE_OS {
            self.measure(index, event_type::EV_SEPARATOR, &[], Some(&EVENT_SEPARATOR))?;
        }
        Ok(())
    }

    /// Measure the SMBIOS structure table into PCR 1
    fn smbios_measure(&mut self) -> Result<()> {
        if !self.is_working() {
            return Err(TcgError::GeneralError);
        }

        let Some(ep_addr) = self.platform.smbios_entry_point() else {
            return Ok(());
        };
        let digest = self
            .platform
            .read_phys(ep_addr, Smbios2EntryPoint::SIZE)
            .and_then(Smbios2EntryPoint::from_bytes)
            .and_then(|ep| ep.structure_table(&self.platform).map(sha1));

        let Some(digest) = digest else {
            log::warn!("TCG: SMBIOS at {:#x} unreadable, not measured", ep_addr);
            return Ok(());
        };

        let body = SmbiosEvent { digest }.to_bytes();
        self.measure(pcr::PLATFORM_CONFIG, event_type::EV_EVENT_TAG, &body, Some(&body))
    }

    // =========================================================================
    // STARTUP
    // =========================================================================

    /// Read a TPM_CAP_PROPERTY answer made of `N` big-endian words
    fn property<const N: usize>(&mut self, sub_cap: u32) -> Result<[u32; N]> {
        let rsp = self.build_and_send(
            TPM_LOCALITY_0,
            ordinal::TPM_ORD_GET_CAPABILITY,
            &capability::property_request(sub_cap),
            TPM_HEADER_SIZE + 4 + 4 * N,
            DurationClass::Short,
        )?;
        check_rc("TPM_GetCapability", rsp.return_code())?;

        let mut values = [0u32; N];
        for (i, value) in values.iter_mut().enumerate() {
            *value = rsp
                .be_u32(TPM_HEADER_SIZE + 4 + 4 * i)
                .ok_or(TcgError::CommandError)?;
        }
        Ok(values)
    }

    /// Hand the device-reported timeouts and durations to the driver
    fn determine_timeouts(&mut self) -> Result<()> {
        let timeouts: [u32; 4] = self.property(capability::TPM_CAP_PROP_TIS_TIMEOUT)?;
        let durations: [u32; 3] = self.property(capability::TPM_CAP_PROP_DURATION)?;

        log::debug!("TCG: timeouts {:?}, durations {:?}", timeouts, durations);

        let id = self.state.driver().ok_or(TcgError::FatalComError)?;
        let driver = self
            .drivers
            .get_mut(id.index())
            .ok_or(TcgError::FatalComError)?;
        driver.set_timeouts(timeouts, durations);
        Ok(())
    }

    fn startup_sequence(&mut self) -> Result<()> {
        log::debug!("TCG: starting with TPM_Startup(ST_CLEAR)");
        let mut code = self
            .build_and_send(
                TPM_LOCALITY_0,
                ordinal::TPM_ORD_STARTUP,
                &StartupType::Clear.to_be_bytes(),
                0,
                DurationClass::Short,
            )?
            .return_code();
        if code == rc::TPM_INVALID_POSTINIT && self.config.tolerate_invalid_postinit {
            log::debug!("TCG: TPM already started by earlier firmware");
            code = rc::TPM_SUCCESS;
        }
        check_rc("TPM_Startup", code)?;

        self.determine_timeouts()?;

        let code = self
            .build_and_send(TPM_LOCALITY_0, ordinal::TPM_ORD_SELF_TEST_FULL, &[], 0, DurationClass::Long)?
            .return_code();
        check_rc("TPM_SelfTestFull", code)?;

        let code = self
            .build_and_send(
                TPM_LOCALITY_3,
                ordinal::TSC_ORD_RESET_ESTABLISHMENT_BIT,
                &[],
                0,
                DurationClass::Short,
            )?
            .return_code();
        if code != rc::TPM_BAD_LOCALITY {
            check_rc("TSC_ResetEstablishmentBit", code)?;
        }

        self.smbios_measure()?;
        self.add_action(pcr::OPTION_ROM_CODE, "Start Option ROM Scan")
    }

    /// Start the TPM, negotiate timeouts, self test and take the first measurements
    ///
    /// A failure at any step degrades the session. The sequence is not retried.
    pub fn startup(&mut self) -> Result<()> {
        if !self.is_working() {
            return Err(TcgError::GeneralError);
        }

        let result = self.startup_sequence();
        if let Err(e) = result {
            log::error!("TCG: startup failed: {}", e);
            self.mark_failed();
        }
        result
    }

    // =========================================================================
    // BOOT SEQUENCE HOOKS
    // =========================================================================

    /// Session setup at POST
    ///
    /// Probes, latches the preboot interface off when there is no TPM,
    /// establishes the log and runs [`TcgBios::startup`] unless configured
    /// to leave that to the host.
    pub fn setup(&mut self) -> Result<()> {
        self.reset_state();

        if !self.is_working() {
            self.state.shutdown_interface();
            return Ok(());
        }

        self.reset_acpi_log();

        if self.config.skip_startup {
            log::info!("TCG: TPM startup left to the host");
            return Ok(());
        }

        self.startup()
    }

    fn prepare_sequence(&mut self) -> Result<()> {
        let code = self
            .build_and_send(
                TPM_LOCALITY_0,
                ordinal::TSC_ORD_PHYSICAL_PRESENCE,
                &PhysicalPresence::CMD_ENABLE.to_be_bytes(),
                0,
                DurationClass::Short,
            )?
            .return_code();
        check_rc("TSC_PhysicalPresence(CMD_ENABLE)", code)?;

        let code = self
            .build_and_send(
                TPM_LOCALITY_0,
                ordinal::TSC_ORD_PHYSICAL_PRESENCE,
                &(PhysicalPresence::NOT_PRESENT | PhysicalPresence::LOCK).to_be_bytes(),
                0,
                DurationClass::Short,
            )?
            .return_code();
        check_rc("TSC_PhysicalPresence(NOT_PRESENT|LOCK)", code)?;

        self.add_action(pcr::IPL_CODE, "Calling INT 19h")?;
        self.add_event_separators()
    }

    /// Lock physical presence and close the pre-OS PCRs before INT 19h
    pub fn prepare_for_boot_target(&mut self) -> Result<()> {
        if !self.is_working() {
            return Err(TcgError::GeneralError);
        }

        let result = self.prepare_sequence();
        if result.is_err() {
            self.mark_failed();
        }
        result
    }

    /// Measure an option ROM image into PCR 2
    ///
    /// `pfa` is the PCI function address of the owning device, 0 if unknown.
    pub fn measure_option_rom(&mut self, image: &[u8], pfa: u16) -> Result<()> {
        if !self.is_working() {
            return Err(TcgError::GeneralError);
        }

        let body = OptionRomEvent { pfa, digest: sha1(image) }.to_bytes();
        self.measure(pcr::OPTION_ROM_CODE, event_type::EV_EVENT_TAG, &body, Some(&body))
    }

    /// Measure the boot sector of a BCV device
    ///
    /// Code goes into PCR 4, the partition table into PCR 5.
    pub fn measure_bcv(&mut self, drive: u8, mbr: &[u8]) -> Result<()> {
        if !self.is_working() {
            return Err(TcgError::GeneralError);
        }
        if mbr.len() < MBR_SIZE {
            return Err(TcgError::InvalidInput);
        }

        let action = if drive == 0x80 {
            "Booting BCV device 80h (HDD)"
        } else {
            "Booting BCV device 00h (Floppy)"
        };
        self.add_action(pcr::IPL_CODE, action)?;

        self.measure(
            pcr::IPL_CODE,
            event_type::EV_IPL,
            b"MBR",
            Some(&mbr[..MBR_PARTITION_TABLE]),
        )?;
        self.measure(
            pcr::IPL_CONFIG,
            event_type::EV_IPL_PARTITION_DATA,
            b"MBR PARTITION_TABLE",
            Some(&mbr[MBR_PARTITION_TABLE..MBR_SIZE]),
        )
    }

    /// Measure an El Torito boot image into PCR 4
    pub fn measure_cdrom(&mut self, image: &[u8]) -> Result<()> {
        if !self.is_working() {
            return Err(TcgError::GeneralError);
        }

        self.add_action(pcr::IPL_CODE, "Booting from CD ROM device")?;
        self.measure(pcr::IPL_CODE, event_type::EV_IPL, b"EL TORITO IPL", Some(image))
    }

    /// Measure an El Torito boot catalog into PCR 5
    pub fn measure_cdrom_catalog(&mut self, catalog: &[u8]) -> Result<()> {
        if !self.is_working() {
            return Err(TcgError::GeneralError);
        }

        self.add_action(pcr::IPL_CODE, "Booting from CD ROM device")?;
        self.measure(
            pcr::IPL_CONFIG,
            event_type::EV_IPL_PARTITION_DATA,
            b"BOOT CATALOG",
            Some(catalog),
        )
    }

    /// Restore TPM state after S3; the log is left as it is
    pub fn resume_from_sleep(&mut self) -> Result<()> {
        if !self.is_working() {
            return Err(TcgError::GeneralError);
        }

        log::debug!("TCG: resuming with TPM_Startup(ST_STATE)");
        let result = self
            .build_and_send(
                TPM_LOCALITY_0,
                ordinal::TPM_ORD_STARTUP,
                &StartupType::State.to_be_bytes(),
                0,
                DurationClass::Short,
            )
            .and_then(|rsp| check_rc("TPM_Startup(ST_STATE)", rsp.return_code()));

        if result.is_err() {
            self.mark_failed();
        }
        result
    }
}

// =============================================================================
// TESTS
// =============================================================================
