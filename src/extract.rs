use log::{info, warn};
use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::archive::{Archive, ArchiveError, ResourceInfo};
use crate::bitmap::{self, BitmapError};
use crate::movie::{self, MovieError};
use crate::restype::{self, ResourceKind};

#[derive(Debug)]
pub enum ExtractError {
    IoError(std::io::Error),
}

impl From<std::io::Error> for ExtractError {
    fn from(error: std::io::Error) -> Self {
        ExtractError::IoError(error)
    }
}

/// Failure of a single resource; reported and counted, never fatal for the
/// rest of the archive.
#[derive(Debug)]
pub enum ResourceError {
    Archive(ArchiveError),
    Bitmap(BitmapError),
    Movie(MovieError),
    IoError(std::io::Error),
}

impl From<ArchiveError> for ResourceError {
    fn from(error: ArchiveError) -> Self {
        ResourceError::Archive(error)
    }
}

impl From<BitmapError> for ResourceError {
    fn from(error: BitmapError) -> Self {
        ResourceError::Bitmap(error)
    }
}

impl From<MovieError> for ResourceError {
    fn from(error: MovieError) -> Self {
        ResourceError::Movie(error)
    }
}

impl From<std::io::Error> for ResourceError {
    fn from(error: std::io::Error) -> Self {
        ResourceError::IoError(error)
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct ExtractStats {
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Extracts every bitmap and movie resource of an archive into
/// `out_dir/<type>/<id>.<ext>`. An output that already exists skips its
/// resource entirely, so re-runs never re-decode or overwrite.
pub fn extract_archive(archive: &Archive, out_dir: &Path) -> Result<ExtractStats, ExtractError> {
    let mut stats = ExtractStats::default();
    for (tag, type_info) in archive.types.iter() {
        let kind = match restype::resource_kind(*tag) {
            Some(kind) => kind,
            None => continue,
        };
        let type_dir = out_dir.join(tag.as_str());
        fs::create_dir_all(&type_dir)?;
        for (id, resource) in type_info.resources.iter() {
            let out_path = type_dir.join(format!("{}.{}", id, kind.extension()));
            if out_path.exists() {
                stats.skipped += 1;
                continue;
            }
            let result = match kind {
                ResourceKind::Bitmap => write_bitmap(archive, resource, &out_path),
                ResourceKind::Movie => write_movie(archive, resource, &out_path),
            };
            match result {
                Ok(()) => {
                    info!("{} {} -> {}", tag, id, out_path.display());
                    stats.written += 1;
                }
                Err(error) => {
                    warn!("{} {}: {:?}", tag, id, error);
                    stats.failed += 1;
                }
            }
        }
    }
    Ok(stats)
}

fn write_bitmap(archive: &Archive, resource: &ResourceInfo, out_path: &Path)
    -> Result<(), ResourceError>
{
    let data = archive.resource_bytes(resource)?;
    let decoded = bitmap::decode_bitmap(data)?;
    let pixels = decoded.resolve()?;
    let width = decoded.width as u32;
    let mut image = bmp::Image::new(width, decoded.height as u32);
    for y in 0..decoded.height as u32 {
        for x in 0..width {
            let color = pixels[(y * width + x) as usize];
            image.set_pixel(x, y, bmp::Pixel::new(color.r, color.g, color.b));
        }
    }
    image.save(out_path).map_err(ResourceError::IoError)?;
    Ok(())
}

fn write_movie(archive: &Archive, resource: &ResourceInfo, out_path: &Path)
    -> Result<(), ResourceError>
{
    let file = archive.file_info(resource)?;
    let mut payload = archive.span(&file)?.to_vec();
    let tables = movie::relocate_chunk_offsets(&mut payload, file.offset)?;
    if tables == 0 {
        warn!("{} {}: no chunk offset table", resource.tag, resource.id);
    }
    let mut out = File::create(out_path)?;
    out.write_all(&payload)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_u16(out: &mut Vec<u8>, value: u16) {
        out.extend_from_slice(&value.to_be_bytes());
    }

    fn put_u32(out: &mut Vec<u8>, value: u32) {
        out.extend_from_slice(&value.to_be_bytes());
    }

    // One tBMP resource (id 1): an uncompressed 2x1 indexed bitmap.
    fn build_archive(compression: u16) -> Vec<u8> {
        let mut bitmap = Vec::new();
        put_u16(&mut bitmap, 2);           // width
        put_u16(&mut bitmap, 1);           // height
        put_u16(&mut bitmap, 2);           // row stride
        put_u16(&mut bitmap, compression);
        bitmap.extend_from_slice(&[ 0, 0, 0 ]);
        bitmap.push(1);                    // two palette entries
        bitmap.extend_from_slice(&[ 10, 20, 30, 40, 50, 60 ]);
        bitmap.extend_from_slice(&[ 0, 1 ]);

        let mut inner = Vec::new();
        inner.extend_from_slice(b"RSRC");
        put_u16(&mut inner, 0x0100);
        put_u16(&mut inner, 0);
        put_u32(&mut inner, 0);            // size repeat, unused
        put_u32(&mut inner, 28);           // directory pointer
        put_u16(&mut inner, 24);           // file table offset
        put_u16(&mut inner, 14);           // file table length

        put_u16(&mut inner, 24);           // name list offset (no names)
        put_u16(&mut inner, 1);            // type count
        inner.extend_from_slice(b"tBMP");
        put_u16(&mut inner, 12);           // resource table offset
        put_u16(&mut inner, 18);           // name table offset

        put_u16(&mut inner, 1);            // resource count
        put_u16(&mut inner, 1);            // id
        put_u16(&mut inner, 1);            // file index

        put_u16(&mut inner, 0);            // name count

        put_u16(&mut inner, 0);            // padding up to the file table
        put_u16(&mut inner, 0);

        assert_eq!(inner.len(), 44);       // dir base 20 + file table offset 24
        put_u32(&mut inner, 1);            // file count
        put_u32(&mut inner, 66);           // span starts at inner 58
        put_u16(&mut inner, bitmap.len() as u16);
        inner.push(0);
        inner.push(0);
        put_u16(&mut inner, 0);

        assert_eq!(inner.len(), 58);
        inner.extend_from_slice(&bitmap);

        let mut data = Vec::new();
        data.extend_from_slice(b"MHWK");
        put_u32(&mut data, inner.len() as u32);
        data.extend_from_slice(&inner);
        data
    }

    #[test]
    fn writes_bitmap_once_and_skips_on_rerun() {
        let archive = Archive::parse(&build_archive(0x0002)).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let stats = extract_archive(&archive, dir.path()).unwrap();
        assert_eq!(stats, ExtractStats{ written: 1, skipped: 0, failed: 0 });
        let out_path = dir.path().join("tBMP").join("1.bmp");
        assert!(out_path.is_file());
        let first_bytes = fs::read(&out_path).unwrap();

        let stats = extract_archive(&archive, dir.path()).unwrap();
        assert_eq!(stats, ExtractStats{ written: 0, skipped: 1, failed: 0 });
        assert_eq!(fs::read(&out_path).unwrap(), first_bytes);
    }

    #[test]
    fn failed_resource_is_counted_and_produces_no_file() {
        // primary compression 2 (LZ_OTHER) is unsupported
        let archive = Archive::parse(&build_archive(0x0202)).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let stats = extract_archive(&archive, dir.path()).unwrap();
        assert_eq!(stats, ExtractStats{ written: 0, skipped: 0, failed: 1 });
        assert!(!dir.path().join("tBMP").join("1.bmp").exists());
    }
}
