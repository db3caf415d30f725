//! TCG BIOS capability interface (INT 1Ah, AH=BBh)
//!
//! Option ROMs and boot loaders reach the measurement core through a fixed
//! set of functions, each taking a little-endian input parameter block and
//! filling an output parameter block. Pointers inside the blocks are flat
//! 32-bit physical addresses resolved through [`Platform::read_phys`].
//!
//! Every function except the status check and the shutdown request refuses
//! to run once the preboot interface has been shut down.

use alloc::vec::Vec;

use static_assertions::const_assert_eq;

use crate::consts::{event_type, SHA1_DIGEST_SIZE, TPM_LOCALITY_0, TPM_NUM_PCRS};
use crate::digest::sha1;
use crate::driver::DurationClass;
use crate::error::{status, status_of, Result, TcgError};
use crate::event::{PcrEvent, PcrEventHeader};
use crate::platform::Platform;
use crate::transport::{declared_length, TPM_HEADER_SIZE};
use crate::TcgBios;

// =============================================================================
// CONSTANTS
// =============================================================================

/// "TCPA" as returned in EBX by the status check
pub const TCG_MAGIC: u32 = 0x4150_4354;

/// Interface version major
pub const TCG_VERSION_MAJOR: u8 = 1;

/// Interface version minor
pub const TCG_VERSION_MINOR: u8 = 2;

/// SHA-1 algorithm identifier for Hash-All
pub const TPM_ALG_SHA: u32 = 0x0000_0004;

/// Output block size of the error form
pub const ERROR_BLOCK_SIZE: usize = 4;

/// Capability functions (AL)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Function {
    /// Presence, version and log pointers
    StatusCheck = 0,
    /// Hash, extend and log
    HashLogExtendEvent = 1,
    /// Raw TPM command
    PassThroughToTpm = 2,
    /// Disable the interface until the next boot
    ShutdownPreBootInterface = 3,
    /// Hash and log without extending
    HashLogEvent = 4,
    /// Hash only
    HashAll = 5,
    /// TSS entry, not provided
    Tss = 6,
    /// Extend and log a 32-bit info word
    CompactHashLogExtendEvent = 7,
}

impl Function {
    /// Decode AL
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Function::StatusCheck),
            1 => Some(Function::HashLogExtendEvent),
            2 => Some(Function::PassThroughToTpm),
            3 => Some(Function::ShutdownPreBootInterface),
            4 => Some(Function::HashLogEvent),
            5 => Some(Function::HashAll),
            6 => Some(Function::Tss),
            7 => Some(Function::CompactHashLogExtendEvent),
            _ => None,
        }
    }
}

// =============================================================================
// PARAMETER BLOCKS
// =============================================================================

fn le_u16(bytes: &[u8], offset: usize) -> Result<u16> {
    bytes
        .get(offset..offset + 2)
        .and_then(|b| b.try_into().ok())
        .map(u16::from_le_bytes)
        .ok_or(TcgError::InvalidInput)
}

fn le_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    bytes
        .get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or(TcgError::InvalidInput)
}

/// Write `{opb_len, reserved}` at the start of an output block
fn write_block_header(output: &mut [u8], length: usize) {
    if let Some(head) = output.get_mut(..ERROR_BLOCK_SIZE) {
        head[0..2].copy_from_slice(&(length as u16).to_le_bytes());
        head[2..4].fill(0);
    }
}

/// Hash-Log-Extend-Event input layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HleeiLayout {
    /// 24-byte form with 32-bit fields
    Short,
    /// 36-byte form with reserved words between fields
    Long,
}

impl HleeiLayout {
    /// Short block size
    pub const SHORT_SIZE: usize = 24;
    /// Long block size
    pub const LONG_SIZE: usize = 36;

    /// Select the layout from the declared block length
    pub const fn from_length(length: u16) -> Option<Self> {
        match length as usize {
            Self::SHORT_SIZE => Some(HleeiLayout::Short),
            Self::LONG_SIZE => Some(HleeiLayout::Long),
            _ => None,
        }
    }

    /// Offsets of hash_ptr, hash_len, pcr_index, log_ptr, log_len
    const fn offsets(self) -> [usize; 5] {
        match self {
            HleeiLayout::Short => [4, 8, 12, 16, 20],
            HleeiLayout::Long => [4, 12, 16, 24, 32],
        }
    }

    /// Block size
    pub const fn size(self) -> usize {
        match self {
            HleeiLayout::Short => Self::SHORT_SIZE,
            HleeiLayout::Long => Self::LONG_SIZE,
        }
    }
}

/// Hash-Log-Extend-Event input, normalized over both layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashLogExtendEventInput {
    /// Layout the caller used
    pub layout: HleeiLayout,
    /// Data to hash, 0 to keep the digest inside the log entry
    pub hash_ptr: u32,
    /// Length of the data to hash
    pub hash_len: u32,
    /// PCR to extend
    pub pcr_index: u32,
    /// Caller-built log entry (header and body)
    pub log_ptr: u32,
    /// Length of the caller-built entry
    pub log_len: u32,
}

impl HashLogExtendEventInput {
    /// Decode either layout
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let layout = HleeiLayout::from_length(le_u16(bytes, 0)?).ok_or(TcgError::InvalidInput)?;
        if bytes.len() < layout.size() {
            return Err(TcgError::InvalidInput);
        }

        let [hash_ptr, hash_len, pcr_index, log_ptr, log_len] = layout.offsets();
        Ok(Self {
            layout,
            hash_ptr: le_u32(bytes, hash_ptr)?,
            hash_len: le_u32(bytes, hash_len)?,
            pcr_index: le_u32(bytes, pcr_index)?,
            log_ptr: le_u32(bytes, log_ptr)?,
            log_len: le_u32(bytes, log_len)?,
        })
    }
}

/// Hash-Log-Event input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashLogEventInput {
    /// Data to hash, 0 to keep the digest inside the log entry
    pub hash_ptr: u32,
    /// Length of the data to hash
    pub hash_len: u32,
    /// PCR named in the log entry
    pub pcr_index: u32,
    /// Event type of the log entry
    pub log_event_type: u32,
    /// Caller-built log entry
    pub log_ptr: u32,
    /// Length of the caller-built entry
    pub log_len: u32,
}

impl HashLogEventInput {
    /// Block size
    pub const SIZE: usize = 28;

    /// Decode
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if usize::from(le_u16(bytes, 0)?) != Self::SIZE {
            return Err(TcgError::InvalidInput);
        }

        Ok(Self {
            hash_ptr: le_u32(bytes, 4)?,
            hash_len: le_u32(bytes, 8)?,
            pcr_index: le_u32(bytes, 12)?,
            log_event_type: le_u32(bytes, 16)?,
            log_ptr: le_u32(bytes, 20)?,
            log_len: le_u32(bytes, 24)?,
        })
    }
}

/// Hash-All input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashAllInput {
    /// Data to hash
    pub hash_ptr: u32,
    /// Length of the data
    pub hash_len: u32,
    /// Requested algorithm
    pub algorithm_id: u32,
}

impl HashAllInput {
    /// Block size
    pub const SIZE: usize = 16;

    /// Decode and validate
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let input = Self {
            hash_ptr: le_u32(bytes, 4)?,
            hash_len: le_u32(bytes, 8)?,
            algorithm_id: le_u32(bytes, 12)?,
        };

        if usize::from(le_u16(bytes, 0)?) != Self::SIZE
            || input.hash_ptr == 0
            || input.hash_len == 0
            || input.algorithm_id != TPM_ALG_SHA
        {
            return Err(TcgError::InvalidInput);
        }
        Ok(input)
    }
}

/// Pass-Through-To-TPM input prefix size
pub const PTTTI_PREFIX_SIZE: usize = 8;

/// Pass-Through-To-TPM output prefix size
pub const PTTTO_PREFIX_SIZE: usize = 4;

/// Hash-Log-Extend-Event output size
pub const HLEEO_SIZE: usize = 28;

/// Hash-Log-Event output size
pub const HLEO_SIZE: usize = 8;

/// TSS output size
pub const TO_SIZE: usize = 4;

const_assert_eq!(HLEEO_SIZE, 4 + 4 + SHA1_DIGEST_SIZE);
const_assert_eq!(HleeiLayout::LONG_SIZE, HleeiLayout::SHORT_SIZE + 12);

/// Values returned by the status check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusInfo {
    /// Always [`TCG_MAGIC`]
    pub magic: u32,
    /// Interface version major
    pub version_major: u8,
    /// Interface version minor
    pub version_minor: u8,
    /// Feature flags, none defined
    pub feature_flags: u32,
    /// Physical base of the event log
    pub log_area_start: u64,
    /// Physical address of the last entry, 0 when empty
    pub log_area_last_entry: u64,
}

// =============================================================================
// CALL FRAME
// =============================================================================

/// 32-bit register file of an interface call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    /// AL selects the function, EAX receives the status
    pub eax: u32,
    /// EBX
    pub ebx: u32,
    /// ECX
    pub ecx: u32,
    /// EDX
    pub edx: u32,
    /// ESI
    pub esi: u32,
    /// EDI
    pub edi: u32,
    /// Carry flag
    pub carry: bool,
}

/// An interface call with its parameter blocks already mapped
///
/// `input` is the block at ES:DI and `output` the block at DS:SI.
#[derive(Debug)]
pub struct CallFrame<'a> {
    /// Registers on entry, updated in place
    pub regs: Registers,
    /// Input parameter block
    pub input: &'a [u8],
    /// Output parameter block
    pub output: &'a mut [u8],
}

// =============================================================================
// FUNCTIONS
// =============================================================================

impl<P: Platform> TcgBios<P> {
    fn ensure_interface_up(&self) -> Result<()> {
        if self.state.is_interface_shutdown() {
            Err(TcgError::InterfaceShutdown)
        } else {
            Ok(())
        }
    }

    fn caller_bytes(&self, ptr: u32, len: u32) -> Result<&[u8]> {
        self.platform
            .read_phys(u64::from(ptr), len as usize)
            .ok_or(TcgError::InvalidInput)
    }

    /// Load a caller-built log entry and check it against the block
    fn caller_event(
        &self,
        pcr_index: u32,
        event_type: Option<u32>,
        log_ptr: u32,
        log_len: u32,
        hash_ptr: u32,
        hash_len: u32,
    ) -> Result<(PcrEventHeader, Vec<u8>)> {
        let mut header = PcrEventHeader::from_bytes(self.caller_bytes(log_ptr, PcrEventHeader::SIZE as u32)?)
            .ok_or(TcgError::InvalidInput)?;

        let expected_len = (PcrEventHeader::SIZE as u64) + u64::from(header.event_data_size);
        if header.pcr_index >= TPM_NUM_PCRS
            || header.pcr_index != pcr_index
            || event_type.is_some_and(|t| t != header.event_type)
            || u64::from(log_len) != expected_len
        {
            return Err(TcgError::InvalidInput);
        }

        let entry = self.caller_bytes(log_ptr, log_len)?;
        let body = entry[PcrEventHeader::SIZE..].to_vec();

        if hash_ptr != 0 {
            header.digest = sha1(self.caller_bytes(hash_ptr, hash_len)?);
        }
        Ok((header, body))
    }

    /// Status check
    pub fn status_check(&mut self) -> Result<StatusInfo> {
        self.probe();
        if !self.state.is_found() {
            return Err(TcgError::NotPresent);
        }

        Ok(StatusInfo {
            magic: TCG_MAGIC,
            version_major: TCG_VERSION_MAJOR,
            version_minor: TCG_VERSION_MINOR,
            feature_flags: 0,
            log_area_start: self.log.base(),
            log_area_last_entry: self.log.last_entry_address().unwrap_or(0),
        })
    }

    fn hash_log_extend_event_inner(&mut self, input: &[u8], output: &[u8]) -> Result<(u32, [u8; SHA1_DIGEST_SIZE])> {
        self.ensure_interface_up()?;

        let block = HashLogExtendEventInput::from_bytes(input)?;
        if output.len() < HLEEO_SIZE {
            return Err(TcgError::InvalidInput);
        }
        let (header, body) = self.caller_event(
            block.pcr_index,
            None,
            block.log_ptr,
            block.log_len,
            block.hash_ptr,
            block.hash_len,
        )?;

        let event = PcrEvent {
            pcr_index: header.pcr_index,
            event_type: header.event_type,
            digest: header.digest,
            data: &body,
        };
        self.log_extend_event(&event)?;
        Ok((self.log.entry_count(), header.digest))
    }

    /// Hash-Log-Extend-Event; returns the event number
    pub fn hash_log_extend_event(&mut self, input: &[u8], output: &mut [u8]) -> Result<u32> {
        match self.hash_log_extend_event_inner(input, output) {
            Ok((event_number, digest)) => {
                write_block_header(output, HLEEO_SIZE);
                output[4..8].copy_from_slice(&event_number.to_le_bytes());
                output[8..HLEEO_SIZE].copy_from_slice(&digest);
                Ok(event_number)
            }
            Err(e) => {
                write_block_header(output, ERROR_BLOCK_SIZE);
                Err(e)
            }
        }
    }

    fn pass_through_inner(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        self.ensure_interface_up()?;

        let ipb_len = usize::from(le_u16(input, 0)?);
        let opb_len = usize::from(le_u16(input, 4)?);
        let request = input.get(PTTTI_PREFIX_SIZE..).ok_or(TcgError::InvalidInput)?;
        let declared = declared_length(request).ok_or(TcgError::InvalidInput)?;

        if ipb_len < PTTTI_PREFIX_SIZE + TPM_HEADER_SIZE
            || ipb_len as u64 != PTTTI_PREFIX_SIZE as u64 + u64::from(declared)
            || ipb_len > input.len()
            || opb_len < PTTTO_PREFIX_SIZE
            || opb_len > output.len()
        {
            return Err(TcgError::InvalidInput);
        }

        if !self.is_working() {
            return Err(TcgError::GeneralError);
        }

        let request = &input[PTTTI_PREFIX_SIZE..ipb_len];
        let response = &mut output[PTTTO_PREFIX_SIZE..opb_len];
        match self.transmit(TPM_LOCALITY_0, request, response, DurationClass::Long) {
            Ok(len) => Ok(PTTTO_PREFIX_SIZE + len),
            Err(e) => {
                self.mark_failed();
                Err(e)
            }
        }
    }

    /// Pass-Through-To-TPM; returns the output block length
    pub fn pass_through_to_tpm(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        let result = self.pass_through_inner(input, output);
        match result {
            Ok(len) => write_block_header(output, len),
            Err(_) => write_block_header(output, ERROR_BLOCK_SIZE),
        }
        result
    }

    /// Shut the preboot interface down until the next boot
    pub fn shutdown_preboot_interface(&mut self) -> Result<()> {
        self.ensure_interface_up()?;
        log::info!("TCG: preboot interface shut down");
        self.state.shutdown_interface();
        Ok(())
    }

    fn hash_log_event_inner(&mut self, input: &[u8], output: &[u8]) -> Result<u32> {
        self.ensure_interface_up()?;

        let block = HashLogEventInput::from_bytes(input)?;
        if output.len() < HLEO_SIZE {
            return Err(TcgError::InvalidInput);
        }
        let (header, body) = self.caller_event(
            block.pcr_index,
            Some(block.log_event_type),
            block.log_ptr,
            block.log_len,
            block.hash_ptr,
            block.hash_len,
        )?;

        if !self.is_working() {
            return Err(TcgError::GeneralError);
        }

        self.log.append(&PcrEvent {
            pcr_index: header.pcr_index,
            event_type: header.event_type,
            digest: header.digest,
            data: &body,
        })?;
        Ok(self.log.entry_count())
    }

    /// Hash-Log-Event; logs without extending, returns the event number
    ///
    /// Refused with a failed TPM like every other measurement.
    pub fn hash_log_event(&mut self, input: &[u8], output: &mut [u8]) -> Result<u32> {
        match self.hash_log_event_inner(input, output) {
            Ok(event_number) => {
                write_block_header(output, HLEO_SIZE);
                output[4..8].copy_from_slice(&event_number.to_le_bytes());
                Ok(event_number)
            }
            Err(e) => {
                write_block_header(output, ERROR_BLOCK_SIZE);
                Err(e)
            }
        }
    }

    /// Hash-All; writes the 20-byte digest to `output`
    pub fn hash_all(&mut self, input: &[u8], output: &mut [u8]) -> Result<()> {
        self.ensure_interface_up()?;

        let block = HashAllInput::from_bytes(input)?;
        let out = output.get_mut(..SHA1_DIGEST_SIZE).ok_or(TcgError::InvalidInput)?;
        out.copy_from_slice(&sha1(self.caller_bytes(block.hash_ptr, block.hash_len)?));
        Ok(())
    }

    /// TSS entry; never provided
    pub fn tss(&mut self, _input: &[u8], output: &mut [u8]) -> Result<()> {
        write_block_header(output, TO_SIZE);
        self.ensure_interface_up()?;
        Err(TcgError::Unsupported)
    }

    /// Compact-Hash-Log-Extend-Event; returns the event number
    pub fn compact_hash_log_extend_event(&mut self, data: &[u8], info: u32, pcr_index: u32) -> Result<u32> {
        self.ensure_interface_up()?;
        if pcr_index >= TPM_NUM_PCRS {
            return Err(TcgError::InvalidInput);
        }

        let info = info.to_le_bytes();
        let event = PcrEvent::new(pcr_index, event_type::EV_COMPACT_HASH, &info).with_hash(Some(data));
        self.log_extend_event(&event)?;
        Ok(self.log.entry_count())
    }

    // =========================================================================
    // DISPATCH
    // =========================================================================

    /// Run one interface call, updating the frame registers
    pub fn dispatch(&mut self, frame: &mut CallFrame<'_>) {
        let regs = &mut frame.regs;
        regs.carry = false;

        let Some(function) = Function::from_u8(regs.eax as u8) else {
            log::debug!("TCG: unknown interface function {:#x}", regs.eax as u8);
            regs.eax = status::TCG_PC_UNSUPPORTED;
            regs.carry = true;
            return;
        };
        log::debug!("TCG: interface call {:?}", function);

        regs.eax = match function {
            Function::StatusCheck => match self.status_check() {
                Ok(info) => {
                    regs.ebx = info.magic;
                    regs.ecx = (regs.ecx & !0xFFFF)
                        | (u32::from(info.version_major) << 8)
                        | u32::from(info.version_minor);
                    regs.edx = info.feature_flags;
                    regs.esi = info.log_area_start as u32;
                    regs.edi = info.log_area_last_entry as u32;
                    status::TCG_PC_OK
                }
                Err(e) => e.code(),
            },
            Function::HashLogExtendEvent => {
                status_of(&self.hash_log_extend_event(frame.input, frame.output))
            }
            Function::PassThroughToTpm => {
                status_of(&self.pass_through_to_tpm(frame.input, frame.output))
            }
            Function::ShutdownPreBootInterface => status_of(&self.shutdown_preboot_interface()),
            Function::HashLogEvent => status_of(&self.hash_log_event(frame.input, frame.output)),
            Function::HashAll => status_of(&self.hash_all(frame.input, frame.output)),
            Function::Tss => status_of(&self.tss(frame.input, frame.output)),
            Function::CompactHashLogExtendEvent => {
                let result = frame
                    .input
                    .get(..regs.ecx as usize)
                    .ok_or(TcgError::InvalidInput)
                    .and_then(|data| self.compact_hash_log_extend_event(data, regs.esi, regs.edx));
                if let Ok(event_number) = result {
                    regs.edx = event_number;
                }
                status_of(&result)
            }
        };
    }
}

// =============================================================================
// TESTS
// =============================================================================
