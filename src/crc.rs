//! CRC Verifier (§4.3).
//!
//! Computes a zlib-parameter CRC-32 over `[start, start + super.size)` of
//! the image with the 4 bytes at `fsid.crc`'s location logically replaced
//! by zero, and compares against the stored value. Two reader strategies
//! are supported, as spec.md requires: a read-only memory map, or a
//! bounded streaming read; both must be byte-identical. Neither ever
//! writes to the image itself — the CRC slot is only ever zeroed in a
//! private, in-memory copy.

use crate::error::PolyfsckError;
use crate::error::Result;
use crate::superblock::Superblock;
use memmap2::Mmap;
use std::fs::File;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;

/// Offset of the `fsid.crc` field within the superblock record, relative
/// to the superblock's start offset.
const CRC_FIELD_OFFSET: u64 = 16;

const STREAM_CHUNK: usize = 4096;

/// Verifies the image's CRC-32 against `super.fsid.crc`.
pub fn verify_crc(file: &File, start: u64, sb: &Superblock) -> Result<()> {
    let computed = match try_mmap_crc(file, start, sb.size) {
        Some(crc) => crc,
        None => stream_crc(file, start, sb.size)?,
    };
    if computed != sb.fsid.crc {
        return Err(PolyfsckError::CrcMismatch);
    }
    Ok(())
}

/// Attempts the memory-mapped strategy. Returns `None` if mapping fails
/// (e.g. the underlying device can't be mapped), so the caller can fall
/// back to streaming.
fn try_mmap_crc(file: &File, start: u64, size: u64) -> Option<u32> {
    let map = unsafe { Mmap::map(file) }.ok()?;
    let end = (start + size) as usize;
    if end > map.len() {
        return None;
    }
    let mut region = map[start as usize..end].to_vec();
    zero_crc_slot(&mut region);
    Some(crc32(&region))
}

/// Streaming fallback: reads the region in bounded chunks, zeroing the CRC
/// slot within the first chunk before it's ever hashed.
fn stream_crc(file: &File, start: u64, size: u64) -> Result<u32> {
    let mut file = file.try_clone()?;
    file.seek(SeekFrom::Start(start))?;

    let mut hasher = crc32fast::Hasher::new();
    let mut remaining = size;
    let mut pos: u64 = 0;
    let mut buf = vec![0u8; STREAM_CHUNK];

    while remaining > 0 {
        let want = remaining.min(STREAM_CHUNK as u64) as usize;
        file.read_exact(&mut buf[..want])?;

        // Zero out whatever part of the CRC field falls in this chunk.
        let chunk_start = pos;
        let chunk_end = pos + want as u64;
        if CRC_FIELD_OFFSET < chunk_end && CRC_FIELD_OFFSET + 4 > chunk_start {
            let lo = CRC_FIELD_OFFSET.max(chunk_start) - chunk_start;
            let hi = (CRC_FIELD_OFFSET + 4).min(chunk_end) - chunk_start;
            for b in &mut buf[lo as usize..hi as usize] {
                *b = 0;
            }
        }

        hasher.update(&buf[..want]);
        pos += want as u64;
        remaining -= want as u64;
    }

    Ok(hasher.finalize())
}

fn zero_crc_slot(region: &mut [u8]) {
    let off = CRC_FIELD_OFFSET as usize;
    region[off..off + 4].fill(0);
}

fn crc32(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn make_image(size: usize, crc_value: u32) -> Vec<u8> {
        let mut buf = vec![0xAAu8; size];
        buf[CRC_FIELD_OFFSET as usize..CRC_FIELD_OFFSET as usize + 4]
            .copy_from_slice(&crc_value.to_le_bytes());
        buf
    }

    fn expected_crc(mut image: Vec<u8>) -> u32 {
        zero_crc_slot(&mut image);
        crc32(&image)
    }

    #[test]
    fn matches_when_crc_correct() {
        let mut image = make_image(4096, 0);
        let correct = expected_crc(image.clone());
        image[CRC_FIELD_OFFSET as usize..CRC_FIELD_OFFSET as usize + 4]
            .copy_from_slice(&correct.to_le_bytes());

        let mut f = tempfile::tempfile().unwrap();
        f.write_all(&image).unwrap();
        f.seek(SeekFrom::Start(0)).unwrap();

        let sb = Superblock {
            size: 4096,
            flags: Default::default(),
            fsid: crate::superblock::FsId {
                crc: correct,
                edition: 0,
                blocks: 0,
                files: 1,
            },
            root: Default::default(),
        };
        verify_crc(&f, 0, &sb).unwrap();
    }

    #[test]
    fn mismatches_when_byte_flipped() {
        let mut image = make_image(4096, 0);
        let correct = expected_crc(image.clone());
        image[CRC_FIELD_OFFSET as usize..CRC_FIELD_OFFSET as usize + 4]
            .copy_from_slice(&correct.to_le_bytes());
        // Flip a byte outside the CRC slot.
        image[100] ^= 0xff;

        let mut f = tempfile::tempfile().unwrap();
        f.write_all(&image).unwrap();
        f.seek(SeekFrom::Start(0)).unwrap();

        let sb = Superblock {
            size: 4096,
            flags: Default::default(),
            fsid: crate::superblock::FsId {
                crc: correct,
                edition: 0,
                blocks: 0,
                files: 1,
            },
            root: Default::default(),
        };
        assert!(matches!(
            verify_crc(&f, 0, &sb),
            Err(PolyfsckError::CrcMismatch)
        ));
    }
}
