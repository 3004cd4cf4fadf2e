use packed_struct::prelude::*;

use indexmap::IndexMap;
use log::warn;
use std::fs;
use std::path::Path;

use crate::cursor::{Cursor, CursorError};
use crate::restype::TypeTag;

pub const MAGIC_ARCHIVE: &[u8; 4] = b"MHWK";
pub const MAGIC_RESOURCE_FORK: &[u8; 4] = b"RSRC";

const EXPECTED_VERSION: u16 = 0x0100;
/// Signature + declared size; stripped before any directory offset applies.
const OUTER_HEADER_LEN: usize = 8;

#[derive(Debug)]
pub enum ArchiveError {
    IoError(std::io::Error),
    BadSignature([u8; 4]),
    CorruptDirectory(DirectoryFault),
    OutOfRange(CursorError),
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum DirectoryFault {
    /// directory pointer lands inside the outer header
    DirectoryBeforeHeader(u32),
    /// resource table entry carries index 0 (the table is 1-based)
    ZeroFileIndex(u16),
    /// name table references a file index with no resource entry
    UnregisteredIndex(u16),
    /// file table offsets must be ascending for derived sizes
    UnsortedFileTable(usize),
    /// resource points outside the file table
    IndexPastFileTable(usize),
}

impl From<std::io::Error> for ArchiveError {
    fn from(error: std::io::Error) -> Self {
        ArchiveError::IoError(error)
    }
}

impl From<CursorError> for ArchiveError {
    fn from(error: CursorError) -> Self {
        ArchiveError::OutOfRange(error)
    }
}

#[derive(PackedStruct)]
#[packed_struct(endian="msb")]
pub struct ResourceForkHeader {
    pub signature: [u8; 4],
    pub version: u16,
    pub unused: u16,
    pub size: u32,
    pub dir_offset: u32,
    pub file_table_offset: u16,
    pub file_table_length: u16,
}

#[derive(PackedStruct)]
#[packed_struct(endian="msb")]
pub struct FileTableEntry {
    pub offset: u32,
    pub size_low: u16,
    pub size_mid: u8,
    pub size_high: u8,
    pub flags: u16,
}

pub struct TypeInfo {
    pub resource_table_offset: u16,
    pub name_table_offset: u16,
    index_to_id: IndexMap<u16, u16>,
    pub resources: IndexMap<u16, ResourceInfo>,
}

pub struct ResourceInfo {
    pub tag: TypeTag,
    pub id: u16,
    /// zero-based position in the file table (1-based on disk)
    pub file_index: usize,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileInfo {
    pub offset: u32,
    pub size: u32,
}

pub struct Archive {
    buffer: Vec<u8>,
    pub types: IndexMap<TypeTag, TypeInfo>,
    pub files: Vec<FileInfo>,
}

impl Archive {
    pub fn load(path: &Path) -> Result<Archive, ArchiveError> {
        let data = fs::read(path)?;
        Archive::parse(&data)
    }

    pub fn parse(data: &[u8]) -> Result<Archive, ArchiveError> {
        let mut outer = Cursor::new(data);
        let mut magic = [ 0u8; 4 ];
        magic.copy_from_slice(outer.read_bytes(4)?);
        if &magic != MAGIC_ARCHIVE {
            return Err(ArchiveError::BadSignature(magic));
        }
        let size = outer.read_u32()? as usize;
        let buffer = outer.read_bytes(size)?.to_vec();

        let mut cursor = Cursor::new(&buffer);
        let fork = ResourceForkHeader::unpack_from_slice(cursor.read_bytes(20)?).unwrap();
        if fork.signature != *MAGIC_RESOURCE_FORK {
            return Err(ArchiveError::BadSignature(fork.signature));
        }
        if fork.version != EXPECTED_VERSION {
            // observed archives always carry 0x0100, but the field is not enforced
            warn!("resource fork version {:#06x}, expected {:#06x}", fork.version, EXPECTED_VERSION);
        }
        let dir_base = match (fork.dir_offset as usize).checked_sub(OUTER_HEADER_LEN) {
            Some(base) => base,
            None => {
                return Err(ArchiveError::CorruptDirectory(
                    DirectoryFault::DirectoryBeforeHeader(fork.dir_offset)));
            }
        };

        cursor.seek(dir_base)?;
        let name_list_offset = cursor.read_u16()? as usize;
        let type_count = cursor.read_u16()?;
        let mut types: IndexMap<TypeTag, TypeInfo> = IndexMap::new();
        for _ in 0..type_count {
            let mut tag = [ 0u8; 4 ];
            tag.copy_from_slice(cursor.read_bytes(4)?);
            let resource_table_offset = cursor.read_u16()?;
            let name_table_offset = cursor.read_u16()?;
            types.insert(TypeTag(tag), TypeInfo{
                resource_table_offset,
                name_table_offset,
                index_to_id: IndexMap::new(),
                resources: IndexMap::new(),
            });
        }

        for (tag, info) in types.iter_mut() {
            cursor.seek(dir_base + info.resource_table_offset as usize)?;
            let resource_count = cursor.read_u16()?;
            for _ in 0..resource_count {
                let resource_id = cursor.read_u16()?;
                let raw_index = cursor.read_u16()?;
                if raw_index == 0 {
                    return Err(ArchiveError::CorruptDirectory(
                        DirectoryFault::ZeroFileIndex(raw_index)));
                }
                info.index_to_id.insert(raw_index, resource_id);
                info.resources.insert(resource_id, ResourceInfo{
                    tag: *tag,
                    id: resource_id,
                    file_index: raw_index as usize - 1,
                    name: None,
                });
            }

            cursor.seek(dir_base + info.name_table_offset as usize)?;
            let name_count = cursor.read_u16()?;
            for _ in 0..name_count {
                let name_offset = cursor.read_u16()? as usize;
                let raw_index = cursor.read_u16()?;
                cursor.mark();
                cursor.seek(dir_base + name_list_offset + name_offset)?;
                let name = read_name(&mut cursor)?;
                cursor.reset();
                // resource tables precede name tables, so the index must be known
                let resource_id = match info.index_to_id.get(&raw_index) {
                    Some(id) => *id,
                    None => {
                        return Err(ArchiveError::CorruptDirectory(
                            DirectoryFault::UnregisteredIndex(raw_index)));
                    }
                };
                let resource = info.resources.get_mut(&resource_id)
                    .ok_or(ArchiveError::CorruptDirectory(DirectoryFault::UnregisteredIndex(raw_index)))?;
                resource.name = Some(name);
            }
        }

        cursor.seek(dir_base + fork.file_table_offset as usize)?;
        let file_count = cursor.read_u32()? as usize;
        let mut files: Vec<FileInfo> = Vec::with_capacity(file_count);
        for i in 0..file_count {
            let entry = FileTableEntry::unpack_from_slice(cursor.read_bytes(10)?).unwrap();
            if i > 0 {
                // a span runs up to the next entry's offset; only the final
                // entry keeps its packed 24-bit size
                let prev = &mut files[i - 1];
                prev.size = match entry.offset.checked_sub(prev.offset) {
                    Some(size) => size,
                    None => {
                        return Err(ArchiveError::CorruptDirectory(
                            DirectoryFault::UnsortedFileTable(i)));
                    }
                };
            }
            let size = entry.size_low as u32
                | ((entry.size_mid as u32) << 16)
                | (((entry.size_high & 0b111) as u32) << 24);
            files.push(FileInfo{ offset: entry.offset, size });
        }

        Ok(Archive{ buffer, types, files })
    }

    pub fn file_info(&self, resource: &ResourceInfo) -> Result<FileInfo, ArchiveError> {
        match self.files.get(resource.file_index) {
            Some(file) => Ok(*file),
            None => Err(ArchiveError::CorruptDirectory(
                DirectoryFault::IndexPastFileTable(resource.file_index))),
        }
    }

    /// The resource's span in the working buffer. Stored offsets are
    /// relative to the outer file; the working buffer starts past the
    /// 8-byte outer header.
    pub fn span(&self, file: &FileInfo) -> Result<&[u8], ArchiveError> {
        let start = match (file.offset as usize).checked_sub(OUTER_HEADER_LEN) {
            Some(start) => start,
            None => {
                return Err(ArchiveError::OutOfRange(CursorError::OutOfRange{
                    position: file.offset as usize,
                    length: file.size as usize,
                }));
            }
        };
        let end = start + file.size as usize;
        if end > self.buffer.len() {
            return Err(ArchiveError::OutOfRange(CursorError::OutOfRange{
                position: start,
                length: file.size as usize,
            }));
        }
        Ok(&self.buffer[start..end])
    }

    pub fn resource_bytes(&self, resource: &ResourceInfo) -> Result<&[u8], ArchiveError> {
        let file = self.file_info(resource)?;
        self.span(&file)
    }
}

fn read_name(cursor: &mut Cursor) -> Result<String, CursorError> {
    let mut name = String::new();
    loop {
        let ch = cursor.read_u8()?;
        if ch == 0 {
            break;
        }
        // names are single-byte text, one char per byte
        name.push(ch as char);
    }
    Ok(name)
}
