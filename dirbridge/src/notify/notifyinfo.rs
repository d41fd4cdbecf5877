use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use widestring::{U16Str, U16String};

use crate::constants::NotifyAction;
use crate::error::{BridgeError, Result};

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct FileNotifyHeader {
    next_entry_offset: u32,
    action: u32,
    file_name_length: u32,
}

const_assert_eq!(std::mem::size_of::<FileNotifyHeader>(), 12);
const HEADER_SIZE: usize = std::mem::size_of::<FileNotifyHeader>();

#[derive(Debug, Clone, PartialEq, Eq)]
/// Information about a filesystem event.
///
/// The file name is relative to the watched directory.
pub struct NotifyInfo {
    /// The filter for this event.
    pub filter: u32,
    /// The event action that occurred.
    pub action: NotifyAction,
    file_name: U16String,
}

impl NotifyInfo {
    pub fn new(filter: u32, action: NotifyAction, file_name: &U16Str) -> Self {
        Self {
            filter,
            action,
            file_name: file_name.to_ustring(),
        }
    }

    pub fn file_name(&self) -> &U16Str {
        &self.file_name
    }

    /// Size of the record as written to a caller's buffer.
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.file_name.len() * std::mem::size_of::<u16>()
    }

    /// Write the record to the start of `buffer`, returning the bytes written, or `None` if it
    /// does not fit.
    pub fn write_to(&self, buffer: &mut [u8]) -> Option<usize> {
        let size = self.size();
        if buffer.len() < size {
            return None;
        }
        let header = FileNotifyHeader {
            next_entry_offset: 0,
            action: self.action as u32,
            file_name_length: (size - HEADER_SIZE) as u32,
        };
        buffer[..HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(&header));
        buffer[HEADER_SIZE..size].copy_from_slice(bytemuck::cast_slice(self.file_name.as_slice()));
        Some(size)
    }

    /// Encode the record into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut record = Vec::new();
        record.try_reserve_exact(self.size())?;
        record.resize(self.size(), 0);
        let written = self.write_to(&mut record);
        debug_assert_eq!(written, Some(record.len()));
        Ok(record)
    }

    /// Read the action code and file name of the first record in `buffer`.
    pub fn parse(buffer: &[u8]) -> Result<(u32, U16String)> {
        if buffer.len() < HEADER_SIZE {
            return Err(BridgeError::MalformedMessage("notify record shorter than its header"));
        }
        let header: FileNotifyHeader = bytemuck::pod_read_unaligned(&buffer[..HEADER_SIZE]);
        let name_length = header.file_name_length as usize;
        if name_length % 2 != 0 || HEADER_SIZE + name_length > buffer.len() {
            return Err(BridgeError::MalformedMessage("notify record name out of bounds"));
        }
        let name = buffer[HEADER_SIZE..HEADER_SIZE + name_length]
            .chunks_exact(2)
            .map(|c| u16::from_ne_bytes([c[0], c[1]]))
            .collect::<Vec<u16>>();
        Ok((header.action, U16String::from_vec(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::completion_filter;
    use widestring::u16str;

    #[test]
    fn record_layout() {
        let info = NotifyInfo::new(
            completion_filter::FILE_NAME,
            NotifyAction::Added,
            u16str!("a.txt"),
        );
        assert_eq!(info.size(), 12 + 10);
        let record = info.to_bytes().unwrap();
        assert_eq!(&record[..4], &0u32.to_ne_bytes());
        assert_eq!(&record[4..8], &1u32.to_ne_bytes());
        assert_eq!(&record[8..12], &10u32.to_ne_bytes());
        let (action, name) = NotifyInfo::parse(&record).unwrap();
        assert_eq!(action, NotifyAction::Added as u32);
        assert_eq!(name, u16str!("a.txt").to_ustring());
    }

    #[test]
    fn record_must_fit() {
        let info = NotifyInfo::new(0, NotifyAction::Removed, u16str!("long-name"));
        let mut small = [0u8; 8];
        assert_eq!(info.write_to(&mut small), None);
    }
}
