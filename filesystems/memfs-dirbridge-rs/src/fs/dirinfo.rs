use bytemuck::{Pod, Zeroable};
use widestring::U16Str;

use dirbridge::constants::InformationClass;

pub const FILE_ATTRIBUTE_DIRECTORY: u32 = 0x10;
pub const FILE_ATTRIBUTE_NORMAL: u32 = 0x80;

#[derive(Default, Clone, Copy, Debug)]
/// A struct that holds information about a file.
pub struct FileInfo {
    pub file_attributes: u32,
    pub allocation_size: u64,
    pub file_size: u64,
    pub creation_time: u64,
    pub last_access_time: u64,
    pub last_write_time: u64,
    pub change_time: u64,
    pub index_number: u64,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct FileNamesInformation {
    next_entry_offset: u32,
    file_index: u32,
    file_name_length: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct FileDirectoryInformation {
    next_entry_offset: u32,
    file_index: u32,
    creation_time: u64,
    last_access_time: u64,
    last_write_time: u64,
    change_time: u64,
    end_of_file: u64,
    allocation_size: u64,
    file_attributes: u32,
    file_name_length: u32,
}

const NAMES_HEADER: usize = std::mem::size_of::<FileNamesInformation>();
const DIRECTORY_HEADER: usize = std::mem::size_of::<FileDirectoryInformation>();
const _: () = assert!(NAMES_HEADER == 12 && DIRECTORY_HEADER == 64);

const ENTRY_ALIGNMENT: usize = 8;

/// Whether the file system can answer queries in `class`.
pub fn is_supported(class: InformationClass) -> bool {
    class == InformationClass::NAMES || class == InformationClass::DIRECTORY
}

fn header_size(class: InformationClass) -> usize {
    if class == InformationClass::NAMES {
        NAMES_HEADER
    } else {
        DIRECTORY_HEADER
    }
}

/// Packs directory entries back to back in the layout of an information class.
#[derive(Debug)]
pub struct DirInfoBuffer {
    class: InformationClass,
    capacity: usize,
    data: Vec<u8>,
    last_entry: Option<usize>,
    count: usize,
}

impl DirInfoBuffer {
    pub fn new(class: InformationClass, capacity: u32) -> Self {
        Self {
            class,
            capacity: capacity as usize,
            data: Vec::new(),
            last_entry: None,
            count: 0,
        }
    }

    /// Append an entry. Returns `false`, leaving the buffer untouched, if it does not fit.
    pub fn push(&mut self, file_index: u32, name: &U16Str, info: &FileInfo) -> bool {
        let name_bytes: &[u8] = bytemuck::cast_slice(name.as_slice());
        let start = self.data.len().next_multiple_of(ENTRY_ALIGNMENT);
        let end = start + header_size(self.class) + name_bytes.len();
        if end > self.capacity {
            return false;
        }

        if let Some(last) = self.last_entry {
            let offset = (start - last) as u32;
            self.data[last..last + 4].copy_from_slice(&offset.to_ne_bytes());
        }
        self.data.resize(start, 0);
        if self.class == InformationClass::NAMES {
            let header = FileNamesInformation {
                next_entry_offset: 0,
                file_index,
                file_name_length: name_bytes.len() as u32,
            };
            self.data.extend_from_slice(bytemuck::bytes_of(&header));
        } else {
            let header = FileDirectoryInformation {
                next_entry_offset: 0,
                file_index,
                creation_time: info.creation_time,
                last_access_time: info.last_access_time,
                last_write_time: info.last_write_time,
                change_time: info.change_time,
                end_of_file: info.file_size,
                allocation_size: info.allocation_size,
                file_attributes: info.file_attributes,
                file_name_length: name_bytes.len() as u32,
            };
            self.data.extend_from_slice(bytemuck::bytes_of(&header));
        }
        self.data.extend_from_slice(name_bytes);
        self.last_entry = Some(start);
        self.count += 1;
        true
    }

    /// The number of packed entries.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

/// Read back the names of the entries packed in `buffer`.
pub fn read_names(class: InformationClass, buffer: &[u8]) -> anyhow::Result<Vec<String>> {
    let header = header_size(class);
    let name_length_at = header - 4;
    let mut names = Vec::new();
    let mut offset = 0usize;
    while offset + header <= buffer.len() {
        let entry = &buffer[offset..];
        let read_u32 = |at: usize| u32::from_ne_bytes([entry[at], entry[at + 1], entry[at + 2], entry[at + 3]]);
        let next = read_u32(0) as usize;
        let name_length = read_u32(name_length_at) as usize;
        let name = entry
            .get(header..header + name_length)
            .ok_or_else(|| anyhow::anyhow!("entry name runs past the buffer"))?;
        let wide: Vec<u16> = name
            .chunks_exact(2)
            .map(|c| u16::from_ne_bytes([c[0], c[1]]))
            .collect();
        names.push(String::from_utf16_lossy(&wide));
        if next == 0 {
            break;
        }
        offset += next;
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use widestring::u16str;

    #[test]
    fn entries_are_linked_and_aligned() {
        let mut buffer = DirInfoBuffer::new(InformationClass::NAMES, 64);
        assert!(buffer.push(0, u16str!("a"), &FileInfo::default()));
        assert!(buffer.push(1, u16str!("bcd"), &FileInfo::default()));
        assert_eq!(buffer.count(), 2);
        let data = buffer.into_inner();
        assert_eq!(u32::from_ne_bytes(data[0..4].try_into().unwrap()), 16);
        assert_eq!(data.len(), 16 + 12 + 6);
        assert_eq!(
            read_names(InformationClass::NAMES, &data).unwrap(),
            vec!["a".to_string(), "bcd".to_string()]
        );
    }

    #[test]
    fn entry_that_does_not_fit_is_refused() {
        let mut buffer = DirInfoBuffer::new(InformationClass::DIRECTORY, 70);
        assert!(buffer.push(0, u16str!("abc"), &FileInfo::default()));
        assert!(!buffer.push(1, u16str!("d"), &FileInfo::default()));
        assert_eq!(buffer.count(), 1);
        assert_eq!(buffer.into_inner().len(), 70);
    }
}
