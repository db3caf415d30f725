//! ACPI event log
//!
//! The log lives in the LASA region the TCPA table describes. Entries are
//! packed back to back from offset 0; the only mutation is [`EventLog::append`],
//! which bounds-checks before copying so an overflow never leaves a partial
//! entry behind.

use core::fmt;

use crate::error::{Result, TcgError};
use crate::event::{PcrEvent, PcrEventHeader};
use crate::platform::Platform;
use crate::TcgBios;

/// Append-only event log over a fixed region
pub struct EventLog {
    area: Option<&'static mut [u8]>,
    base: u64,
    next_offset: usize,
    last_entry: Option<usize>,
    entry_count: u32,
}

impl EventLog {
    /// Log with no region established
    pub const fn new() -> Self {
        Self {
            area: None,
            base: 0,
            next_offset: 0,
            last_entry: None,
            entry_count: 0,
        }
    }

    /// Take ownership of a region, zero it and rewind the cursor
    ///
    /// With `area == None` the log stays unestablished and every append
    /// reports an overflow.
    pub fn reset(&mut self, base: u64, mut area: Option<&'static mut [u8]>) {
        if let Some(bytes) = area.as_deref_mut() {
            bytes.fill(0);
        }

        self.area = area;
        self.base = if self.area.is_some() { base } else { 0 };
        self.next_offset = 0;
        self.last_entry = None;
        self.entry_count = 0;
    }

    /// Append one entry
    pub fn append(&mut self, event: &PcrEvent<'_>) -> Result<()> {
        let Some(area) = self.area.as_deref_mut() else {
            log::warn!("TCG: event log not established");
            return Err(TcgError::LogOverflow);
        };

        let Some(header) = event.header() else {
            log::warn!("TCG: event body of {} bytes cannot be logged", event.data.len());
            return Err(TcgError::LogOverflow);
        };

        let size = event.encoded_len();
        let start = self.next_offset;
        let end = match start.checked_add(size) {
            Some(end) if end <= area.len() => end,
            _ => {
                log::warn!("TCG: log overflow, entry size {} at offset {}", size, start);
                return Err(TcgError::LogOverflow);
            }
        };

        let data_start = start + PcrEventHeader::SIZE;
        area[start..data_start].copy_from_slice(&header.to_bytes());
        area[data_start..end].copy_from_slice(event.data);

        self.last_entry = Some(start);
        self.next_offset = end;
        self.entry_count += 1;

        log::debug!(
            "TCG: logged pcr={} type={:#x} at offset {}",
            event.pcr_index,
            event.event_type,
            start
        );
        Ok(())
    }

    /// Region is available
    pub fn is_established(&self) -> bool {
        self.area.is_some()
    }

    /// Physical base (LASA), 0 when unestablished
    pub const fn base(&self) -> u64 {
        self.base
    }

    /// Region size in bytes
    pub fn capacity(&self) -> usize {
        self.area.as_deref().map_or(0, <[u8]>::len)
    }

    /// Offset the next entry will be written at
    pub const fn next_offset(&self) -> usize {
        self.next_offset
    }

    /// Offset of the most recent entry
    pub const fn last_entry(&self) -> Option<usize> {
        self.last_entry
    }

    /// Physical address of the most recent entry
    pub fn last_entry_address(&self) -> Option<u64> {
        self.last_entry.map(|offset| self.base + offset as u64)
    }

    /// Entries appended since the last reset
    pub const fn entry_count(&self) -> u32 {
        self.entry_count
    }

    /// Raw region contents
    pub fn as_bytes(&self) -> &[u8] {
        self.area.as_deref().unwrap_or(&[])
    }

    /// Decode the entry starting at `offset`
    pub fn entry_at(&self, offset: usize) -> Option<LogEntry<'_>> {
        if offset >= self.next_offset {
            return None;
        }

        let bytes = self.area.as_deref()?;
        let header = PcrEventHeader::from_bytes(bytes.get(offset..)?)?;
        let data_start = offset + PcrEventHeader::SIZE;
        let data = bytes.get(data_start..data_start + header.event_data_size as usize)?;

        Some(LogEntry { offset, header, data })
    }

    /// Iterate entries in log order
    pub fn entries(&self) -> impl Iterator<Item = LogEntry<'_>> + '_ {
        let mut offset = 0;
        core::iter::from_fn(move || {
            let entry = self.entry_at(offset)?;
            offset = entry.end();
            Some(entry)
        })
    }

    /// Entry by position
    pub fn entry(&self, index: usize) -> Option<LogEntry<'_>> {
        self.entries().nth(index)
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("base", &self.base)
            .field("capacity", &self.capacity())
            .field("next_offset", &self.next_offset)
            .field("last_entry", &self.last_entry)
            .field("entry_count", &self.entry_count)
            .finish()
    }
}

/// A decoded log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEntry<'a> {
    /// Offset from the log base
    pub offset: usize,
    /// Entry header
    pub header: PcrEventHeader,
    /// Event body
    pub data: &'a [u8],
}

impl LogEntry<'_> {
    /// Offset just past this entry
    pub fn end(&self) -> usize {
        self.offset + PcrEventHeader::SIZE + self.data.len()
    }
}

// =============================================================================
// LOG SETUP
// =============================================================================

impl<P: Platform> TcgBios<P> {
    /// Point the log at the TCPA log area and clear it
    pub(crate) fn reset_acpi_log(&mut self) {
        let tcpa = self.find_tcpa_table();
        let region = tcpa.and_then(|table| {
            let len = usize::try_from(table.log_area_minimum_length).ok()?;
            let base = table.log_area_start_address;
            self.platform.log_area(base, len).map(|area| (base, area))
        });

        match region {
            Some((base, area)) => self.log.reset(base, Some(area)),
            None => self.log.reset(0, None),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::event_type;
    use alloc::boxed::Box;
    use alloc::vec;

    fn region(len: usize) -> &'static mut [u8] {
        Box::leak(vec![0xAAu8; len].into_boxed_slice())
    }

    fn event(data: &[u8]) -> PcrEvent<'_> {
        PcrEvent::new(0, event_type::EV_ACTION, data)
    }

    #[test]
    fn test_reset_zeroes() {
        let mut log = EventLog::new();
        log.reset(0x8000, Some(region(128)));

        assert_eq!(log.entry_count(), 0);
        assert_eq!(log.last_entry(), None);
        assert!(log.as_bytes().iter().all(|&b| b == 0));

        log.append(&event(b"abc")).unwrap();
        log.reset(0x8000, Some(region(128)));
        assert_eq!(log.entry_count(), 0);
        assert_eq!(log.next_offset(), 0);
        assert!(log.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_unestablished_overflows() {
        let mut log = EventLog::new();
        assert_eq!(log.append(&event(b"x")), Err(TcgError::LogOverflow));

        log.reset(0x8000, None);
        assert_eq!(log.base(), 0);
        assert_eq!(log.append(&event(b"x")), Err(TcgError::LogOverflow));
    }

    #[test]
    fn test_count_and_last_entry() {
        let mut log = EventLog::new();
        log.reset(0x8000, Some(region(256)));

        for i in 0..4u32 {
            let offset = log.next_offset();
            log.append(&event(b"0123456789")).unwrap();
            assert_eq!(log.entry_count(), i + 1);
            assert_eq!(log.last_entry(), Some(offset));
            assert_eq!(log.next_offset(), offset + PcrEventHeader::SIZE + 10);
        }
        assert_eq!(log.last_entry_address(), Some(0x8000 + 126));
    }

    #[test]
    fn test_entry_round_trip() {
        let mut log = EventLog::new();
        log.reset(0x8000, Some(region(256)));
        log.append(&PcrEvent::new(4, event_type::EV_IPL, b"MBR").with_hash(Some(b"sector")))
            .unwrap();
        log.append(&event(b"")).unwrap();

        let first = log.entry(0).unwrap();
        assert_eq!(first.header.pcr_index, 4);
        assert_eq!(first.header.event_data_size as usize, first.data.len());
        assert_eq!(first.data, b"MBR");
        assert_eq!(first.header.digest, crate::digest::sha1(b"sector"));

        let second = log.entry(1).unwrap();
        assert_eq!(second.offset, first.end());
        assert!(log.entry(2).is_none());
        assert_eq!(log.entries().count(), 2);
    }

    #[test]
    fn test_overflow_scenario() {
        let mut log = EventLog::new();
        log.reset(0x8000, Some(region(4096)));

        log.append(&event(&[0x11; 32])).unwrap();
        assert_eq!(log.entry_count(), 1);
        assert_eq!(log.next_offset(), 64);

        // 63 entries of 64 bytes reach 4032, then one of 58 reaches 4090
        for _ in 0..62 {
            log.append(&event(&[0x22; 32])).unwrap();
        }
        log.append(&event(&[0x33; 26])).unwrap();
        assert_eq!(log.next_offset(), 4090);

        let snapshot = log.as_bytes().to_vec();
        let count = log.entry_count();

        for _ in 0..2 {
            assert_eq!(log.append(&event(&[])), Err(TcgError::LogOverflow));
            assert_eq!(log.next_offset(), 4090);
            assert_eq!(log.entry_count(), count);
            assert_eq!(log.as_bytes(), &snapshot[..]);
        }
    }
}
