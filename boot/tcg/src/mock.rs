//! Test doubles: a scripted TPM 1.2 and an in-memory platform

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::acpi::{checksum, RSDP_SIGNATURE};
use crate::config::TcgConfig;
use crate::consts::{capability, ordinal, SHA1_DIGEST_SIZE, TPM_NUM_PCRS};
use crate::driver::{DriverError, DriverResult, DurationClass, TpmDriver};
use crate::platform::Platform;
use crate::transport::TPM_HEADER_SIZE;
use crate::TcgBios;

// =============================================================================
// MOCK TPM
// =============================================================================

/// A request the mock received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRequest {
    pub locality: u8,
    pub bytes: Vec<u8>,
    pub duration: DurationClass,
}

impl SentRequest {
    pub fn ordinal(&self) -> u32 {
        u32::from_be_bytes([self.bytes[6], self.bytes[7], self.bytes[8], self.bytes[9]])
    }
}

#[derive(Debug)]
struct MockTpmState {
    present: bool,
    initialized: bool,
    pcrs: [[u8; SHA1_DIGEST_SIZE]; TPM_NUM_PCRS as usize],
    requests: Vec<SentRequest>,
    pending: Vec<u8>,
    timeouts: Option<([u32; 4], [u32; 3])>,
    return_codes: Vec<(u32, u32)>,
    fail_next_send: bool,
    fail_ordinals: Vec<u32>,
    short_extend: bool,
}

/// Shared view of the mock TPM used by tests
#[derive(Debug, Clone)]
pub struct MockTpm {
    inner: Rc<RefCell<MockTpmState>>,
}

pub const MOCK_TIMEOUTS: [u32; 4] = [750_000, 2_000_000, 750_000, 750_000];
pub const MOCK_DURATIONS: [u32; 3] = [2_000_000, 20_000_000, 300_000_000];

impl MockTpm {
    pub fn new(present: bool) -> Self {
        Self {
            inner: Rc::new(RefCell::new(MockTpmState {
                present,
                initialized: false,
                pcrs: [[0; SHA1_DIGEST_SIZE]; TPM_NUM_PCRS as usize],
                requests: Vec::new(),
                pending: Vec::new(),
                timeouts: None,
                return_codes: Vec::new(),
                fail_next_send: false,
                fail_ordinals: Vec::new(),
                short_extend: false,
            })),
        }
    }

    pub fn driver(&self) -> Box<dyn TpmDriver> {
        Box::new(self.clone())
    }

    pub fn pcr(&self, index: usize) -> [u8; SHA1_DIGEST_SIZE] {
        self.inner.borrow().pcrs[index]
    }

    pub fn requests(&self) -> Vec<SentRequest> {
        self.inner.borrow().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.inner.borrow().requests.len()
    }

    pub fn ordinals(&self) -> Vec<u32> {
        self.inner.borrow().requests.iter().map(SentRequest::ordinal).collect()
    }

    pub fn last_request(&self) -> Option<Vec<u8>> {
        self.inner.borrow().requests.last().map(|r| r.bytes.clone())
    }

    pub fn last_duration(&self) -> Option<DurationClass> {
        self.inner.borrow().requests.last().map(|r| r.duration)
    }

    pub fn timeouts(&self) -> Option<([u32; 4], [u32; 3])> {
        self.inner.borrow().timeouts
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.borrow().initialized
    }

    pub fn clear_requests(&self) {
        self.inner.borrow_mut().requests.clear();
    }

    /// Answer `ordinal` with `rc` from now on
    pub fn set_return_code(&self, ordinal: u32, rc: u32) {
        self.inner.borrow_mut().return_codes.push((ordinal, rc));
    }

    pub fn fail_next_send(&self) {
        self.inner.borrow_mut().fail_next_send = true;
    }

    /// Drop every request carrying `ordinal` at the transport level
    pub fn fail_ordinal(&self, ordinal: u32) {
        self.inner.borrow_mut().fail_ordinals.push(ordinal);
    }

    /// Truncate extend responses by one byte
    pub fn short_extend(&self) {
        self.inner.borrow_mut().short_extend = true;
    }

    fn respond(state: &mut MockTpmState, request: &[u8]) -> Vec<u8> {
        let command = u32::from_be_bytes([request[6], request[7], request[8], request[9]]);
        let rc = state
            .return_codes
            .iter()
            .rev()
            .find(|(ord, _)| *ord == command)
            .map_or(0, |&(_, rc)| rc);

        let mut body = Vec::new();
        if rc == 0 {
            match command {
                ordinal::TPM_ORD_EXTEND if request.len() >= 34 => {
                    let index = u32::from_be_bytes([request[10], request[11], request[12], request[13]]);
                    if let Some(pcr) = state.pcrs.get_mut(index as usize) {
                        let mut digest = [0u8; SHA1_DIGEST_SIZE];
                        digest.copy_from_slice(&request[14..34]);
                        *pcr = crate::digest::extend(pcr, &digest);
                        body.extend_from_slice(pcr);
                    }
                    if state.short_extend {
                        body.pop();
                    }
                }
                ordinal::TPM_ORD_GET_CAPABILITY if request.len() >= 22 => {
                    let sub = u32::from_be_bytes([request[18], request[19], request[20], request[21]]);
                    let values: &[u32] = match sub {
                        capability::TPM_CAP_PROP_TIS_TIMEOUT => &MOCK_TIMEOUTS,
                        capability::TPM_CAP_PROP_DURATION => &MOCK_DURATIONS,
                        _ => &[],
                    };
                    body.extend_from_slice(&((values.len() * 4) as u32).to_be_bytes());
                    for value in values {
                        body.extend_from_slice(&value.to_be_bytes());
                    }
                }
                _ => {}
            }
        }

        let total = (TPM_HEADER_SIZE + body.len()) as u32;
        let mut out = vec![0x00, 0xC4];
        out.extend_from_slice(&total.to_be_bytes());
        out.extend_from_slice(&rc.to_be_bytes());
        out.extend_from_slice(&body);
        out
    }
}

impl TpmDriver for MockTpm {
    fn probe(&mut self) -> bool {
        self.inner.borrow().present
    }

    fn init(&mut self) {
        self.inner.borrow_mut().initialized = true;
    }

    fn activate(&mut self, _locality: u8) -> DriverResult<()> {
        Ok(())
    }

    fn send(&mut self, command: &[u8]) -> DriverResult<()> {
        let mut state = self.inner.borrow_mut();
        if state.fail_next_send {
            state.fail_next_send = false;
            return Err(DriverError::Io);
        }
        if command.len() < TPM_HEADER_SIZE {
            return Err(DriverError::Io);
        }
        let ordinal = u32::from_be_bytes([command[6], command[7], command[8], command[9]]);
        if state.fail_ordinals.contains(&ordinal) {
            return Err(DriverError::Timeout);
        }

        state.requests.push(SentRequest {
            locality: 0,
            bytes: command.to_vec(),
            duration: DurationClass::Short,
        });
        let response = Self::respond(&mut state, command);
        state.pending = response;
        Ok(())
    }

    fn wait_data_valid(&mut self) -> DriverResult<()> {
        Ok(())
    }

    fn wait_response_ready(&mut self, duration: DurationClass) -> DriverResult<()> {
        if let Some(last) = self.inner.borrow_mut().requests.last_mut() {
            last.duration = duration;
        }
        Ok(())
    }

    fn read_response(&mut self, buffer: &mut [u8]) -> DriverResult<usize> {
        let mut state = self.inner.borrow_mut();
        let pending = core::mem::take(&mut state.pending);
        let dst = buffer.get_mut(..pending.len()).ok_or(DriverError::BufferTooSmall)?;
        dst.copy_from_slice(&pending);
        Ok(pending.len())
    }

    fn ready(&mut self) {}

    fn set_timeouts(&mut self, timeouts: [u32; 4], durations: [u32; 3]) {
        self.inner.borrow_mut().timeouts = Some((timeouts, durations));
    }
}

/// Records the locality each request was sent at
#[derive(Debug)]
struct LocalityTap {
    tpm: MockTpm,
    locality: u8,
}

impl TpmDriver for LocalityTap {
    fn probe(&mut self) -> bool {
        self.tpm.probe()
    }
    fn init(&mut self) {
        self.tpm.init()
    }
    fn activate(&mut self, locality: u8) -> DriverResult<()> {
        self.locality = locality;
        self.tpm.activate(locality)
    }
    fn send(&mut self, command: &[u8]) -> DriverResult<()> {
        self.tpm.send(command)?;
        if let Some(last) = self.tpm.inner.borrow_mut().requests.last_mut() {
            last.locality = self.locality;
        }
        Ok(())
    }
    fn wait_data_valid(&mut self) -> DriverResult<()> {
        self.tpm.wait_data_valid()
    }
    fn wait_response_ready(&mut self, duration: DurationClass) -> DriverResult<()> {
        self.tpm.wait_response_ready(duration)
    }
    fn read_response(&mut self, buffer: &mut [u8]) -> DriverResult<usize> {
        self.tpm.read_response(buffer)
    }
    fn ready(&mut self) {
        self.tpm.ready()
    }
    fn set_timeouts(&mut self, timeouts: [u32; 4], durations: [u32; 3]) {
        self.tpm.set_timeouts(timeouts, durations)
    }
}

// =============================================================================
// MOCK PLATFORM
// =============================================================================

pub const RSDP_ADDR: u64 = 0x000E_0000;
pub const RSDT_ADDR: u64 = 0x0000_1000;
pub const TCPA_ADDR: u64 = 0x0000_2000;
pub const SMBIOS_EP_ADDR: u64 = 0x000F_0000;
pub const SMBIOS_TABLE_ADDR: u64 = 0x0000_4000;

/// Flat physical memory made of disjoint regions
#[derive(Debug, Default)]
pub struct MockPlatform {
    regions: Vec<(u64, Vec<u8>)>,
    rsdp: Option<u64>,
    smbios: Option<u64>,
}

fn seal_checksum(bytes: &mut [u8], at: usize) {
    bytes[at] = 0;
    bytes[at] = 0u8.wrapping_sub(checksum(bytes));
}

impl MockPlatform {
    /// No RSDP, no SMBIOS
    pub fn bare() -> Self {
        Self::default()
    }

    /// RSDP -> RSDT -> TCPA describing a log at `lasa` of `laml` bytes
    pub fn with_tcpa(lasa: u64, laml: u32) -> Self {
        let mut rsdp = vec![0u8; 20];
        rsdp[0..8].copy_from_slice(&RSDP_SIGNATURE);
        rsdp[16..20].copy_from_slice(&(RSDT_ADDR as u32).to_le_bytes());
        seal_checksum(&mut rsdp, 8);

        let mut platform = Self::bare();
        platform.rsdp = Some(RSDP_ADDR);
        platform.add_region(RSDP_ADDR, rsdp);
        platform.add_region(TCPA_ADDR, Self::tcpa_table(lasa, laml));
        platform.set_rsdt(&[TCPA_ADDR as u32]);
        platform
    }

    /// Client TCPA table bytes
    pub fn tcpa_table(lasa: u64, laml: u32) -> Vec<u8> {
        let mut table = vec![0u8; 50];
        table[0..4].copy_from_slice(b"TCPA");
        table[4..8].copy_from_slice(&50u32.to_le_bytes());
        table[8] = 2;
        table[38..42].copy_from_slice(&laml.to_le_bytes());
        table[42..50].copy_from_slice(&lasa.to_le_bytes());
        seal_checksum(&mut table, 9);
        table
    }

    /// Replace the RSDT with one listing `entries`
    pub fn set_rsdt(&mut self, entries: &[u32]) {
        let length = 36 + entries.len() * 4;
        let mut rsdt = vec![0u8; length];
        rsdt[0..4].copy_from_slice(b"RSDT");
        rsdt[4..8].copy_from_slice(&(length as u32).to_le_bytes());
        for (i, entry) in entries.iter().enumerate() {
            rsdt[36 + i * 4..40 + i * 4].copy_from_slice(&entry.to_le_bytes());
        }
        seal_checksum(&mut rsdt, 9);
        self.regions.retain(|(addr, _)| *addr != RSDT_ADDR);
        self.add_region(RSDT_ADDR, rsdt);
    }

    /// Add an SMBIOS 2.x entry point describing `table`
    pub fn with_smbios(mut self, table: &[u8]) -> Self {
        let mut ep = vec![0u8; 31];
        ep[0..4].copy_from_slice(b"_SM_");
        ep[5] = 31;
        ep[6] = 2;
        ep[7] = 8;
        ep[16..21].copy_from_slice(b"_DMI_");
        ep[22..24].copy_from_slice(&(table.len() as u16).to_le_bytes());
        ep[24..28].copy_from_slice(&(SMBIOS_TABLE_ADDR as u32).to_le_bytes());
        self.smbios = Some(SMBIOS_EP_ADDR);
        self.add_region(SMBIOS_EP_ADDR, ep);
        self.add_region(SMBIOS_TABLE_ADDR, table.to_vec());
        self
    }

    pub fn add_region(&mut self, addr: u64, bytes: Vec<u8>) {
        self.regions.push((addr, bytes));
    }

    /// Flip a byte in place
    pub fn corrupt(&mut self, addr: u64) {
        for (base, bytes) in &mut self.regions {
            if addr >= *base && addr < *base + bytes.len() as u64 {
                bytes[(addr - *base) as usize] ^= 0xFF;
            }
        }
    }
}

impl Platform for MockPlatform {
    fn rsdp_address(&self) -> Option<u64> {
        self.rsdp
    }

    fn smbios_entry_point(&self) -> Option<u64> {
        self.smbios
    }

    fn read_phys(&self, addr: u64, len: usize) -> Option<&[u8]> {
        self.regions.iter().find_map(|(base, bytes)| {
            let start = usize::try_from(addr.checked_sub(*base)?).ok()?;
            bytes.get(start..start.checked_add(len)?)
        })
    }

    fn log_area(&mut self, base: u64, len: usize) -> Option<&'static mut [u8]> {
        if base == 0 {
            return None;
        }
        Some(Box::leak(vec![0xA5u8; len].into_boxed_slice()))
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Context with one present mock TPM registered
pub fn bios_with_tpm(platform: MockPlatform) -> (TcgBios<MockPlatform>, MockTpm) {
    bios_with_config(platform, TcgConfig::new())
}

/// As [`bios_with_tpm`] with an explicit configuration
pub fn bios_with_config(
    platform: MockPlatform,
    config: TcgConfig,
) -> (TcgBios<MockPlatform>, MockTpm) {
    let tpm = MockTpm::new(true);
    let mut bios = TcgBios::new(platform, config);
    bios.register_driver(Box::new(LocalityTap {
        tpm: tpm.clone(),
        locality: 0,
    }));
    (bios, tpm)
}
