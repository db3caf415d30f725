//! TPM command transport
//!
//! [`TcgBios::transmit`] pushes one framed command through the selected
//! driver. [`TcgBios::build_and_send`] frames the small fixed commands the
//! BIOS issues itself and hands back the device return code uninterpreted.

use static_assertions::const_assert_eq;

use crate::consts::{tag, SHA1_DIGEST_SIZE};
use crate::driver::DurationClass;
use crate::error::{Result, TcgError};
use crate::platform::Platform;
use crate::TcgBios;

// =============================================================================
// FRAMING
// =============================================================================

/// Request and response header size (`tag u16, length u32, ordinal/rc u32`)
pub const TPM_HEADER_SIZE: usize = 10;

/// Largest payload [`TcgBios::build_and_send`] will frame
pub const MAX_PAYLOAD_SIZE: usize = 20;

/// Response staging buffer size
pub const RESPONSE_BUFFER_SIZE: usize = 64;

/// TPM_Extend request: header, PCR index, digest
pub const EXTEND_REQUEST_SIZE: usize = TPM_HEADER_SIZE + 4 + SHA1_DIGEST_SIZE;

/// TPM_Extend response: header, new PCR value
pub const EXTEND_RESPONSE_SIZE: usize = TPM_HEADER_SIZE + SHA1_DIGEST_SIZE;

const_assert_eq!(EXTEND_REQUEST_SIZE, 34);
const_assert_eq!(EXTEND_RESPONSE_SIZE, 30);
const_assert_eq!(TPM_HEADER_SIZE + MAX_PAYLOAD_SIZE, 30);

/// Encode a request header
pub fn request_header(total_len: u32, ordinal: u32) -> [u8; TPM_HEADER_SIZE] {
    let mut out = [0u8; TPM_HEADER_SIZE];
    out[0..2].copy_from_slice(&tag::TPM_TAG_RQU_CMD.to_be_bytes());
    out[2..6].copy_from_slice(&total_len.to_be_bytes());
    out[6..10].copy_from_slice(&ordinal.to_be_bytes());
    out
}

/// Declared total length of a framed request or response
pub fn declared_length(bytes: &[u8]) -> Option<u32> {
    Some(u32::from_be_bytes(bytes.get(2..6)?.try_into().ok()?))
}

/// Return code field of a response
pub fn return_code(bytes: &[u8]) -> Option<u32> {
    Some(u32::from_be_bytes(bytes.get(6..10)?.try_into().ok()?))
}

/// Response of a BIOS-issued command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    buffer: [u8; RESPONSE_BUFFER_SIZE],
    len: usize,
}

impl Response {
    /// Device return code, 0 on success
    pub fn return_code(&self) -> u32 {
        return_code(self.bytes()).unwrap_or(u32::MAX)
    }

    /// Bytes the device returned
    pub fn bytes(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    /// Big-endian u32 at `offset`
    pub fn be_u32(&self, offset: usize) -> Option<u32> {
        Some(u32::from_be_bytes(self.bytes().get(offset..offset + 4)?.try_into().ok()?))
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

impl<P: Platform> TcgBios<P> {
    /// Send `request` at `locality` and read the reply into `response`
    ///
    /// Every driver failure collapses to [`TcgError::FatalComError`].
    pub fn transmit(
        &mut self,
        locality: u8,
        request: &[u8],
        response: &mut [u8],
        duration: DurationClass,
    ) -> Result<usize> {
        let id = self.state.driver().ok_or(TcgError::FatalComError)?;
        let driver = self
            .drivers
            .get_mut(id.index())
            .ok_or(TcgError::FatalComError)?;

        #[cfg(feature = "debug_output")]
        log::trace!("TCG: locality {} request {:02x?}", locality, request);

        let result = driver
            .activate(locality)
            .and_then(|()| driver.send(request))
            .and_then(|()| driver.wait_data_valid())
            .and_then(|()| driver.wait_response_ready(duration))
            .and_then(|()| driver.read_response(response));

        match result {
            Ok(len) => {
                driver.ready();
                Ok(len)
            }
            Err(e) => {
                log::debug!("TCG: transmit failed: {}", e);
                Err(TcgError::FatalComError)
            }
        }
    }

    /// Frame `ordinal` with `payload` and send it
    ///
    /// `expected` is the response size the caller intends to read; it and
    /// the payload are checked against the staging buffers before anything
    /// reaches the device.
    pub fn build_and_send(
        &mut self,
        locality: u8,
        ordinal: u32,
        payload: &[u8],
        expected: usize,
        duration: DurationClass,
    ) -> Result<Response> {
        if payload.len() > MAX_PAYLOAD_SIZE || expected > RESPONSE_BUFFER_SIZE {
            log::error!("TCG: internal error, command {:#x} exceeds staging buffers", ordinal);
            return Err(TcgError::FirmwareError);
        }

        let total = TPM_HEADER_SIZE + payload.len();
        let mut request = [0u8; TPM_HEADER_SIZE + MAX_PAYLOAD_SIZE];
        request[..TPM_HEADER_SIZE].copy_from_slice(&request_header(total as u32, ordinal));
        request[TPM_HEADER_SIZE..total].copy_from_slice(payload);

        let mut response = Response {
            buffer: [0u8; RESPONSE_BUFFER_SIZE],
            len: 0,
        };
        response.len = self.transmit(locality, &request[..total], &mut response.buffer, duration)?;
        Ok(response)
    }
}

// =============================================================================
// TESTS
// =============================================================================
