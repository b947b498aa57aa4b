//! On-disk superblock layout, discovery and validation.
//!
//! Mirrors the way the teacher decodes fixed-width, little-endian,
//! `#[repr(C, packed)]` on-disk records (see `mkfs::ext2::Superblock` and
//! `fdisk::partition::GPT`): a raw struct read by copying bytes out of a
//! buffer, byte-swapped into a host-order struct that carries the semantics.

use crate::error::PolyfsckError;
use crate::error::Result;
use crate::inode::RawInode;
use crate::BLOCK_SIZE;
use crate::PAD_SIZE;
use bitflags::bitflags;

/// The polyfs magic value, stored little-endian on disk.
pub const MAGIC: u32 = 0x464c5950; // "PYLF" as bytes b'P','Y','L','F' reversed by LE storage

/// Size in bytes of the on-disk superblock record (including the embedded
/// root inode).
pub const SUPERBLOCK_SIZE: usize = 44;

bitflags! {
    /// Superblock feature flags (§3).
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct Flags: u32 {
        /// The filesystem uses the version-1 on-disk layout. Required.
        const FSID_VERSION_1 = 0x0001;
        /// The root inode's offset is not required to equal the
        /// immediate post-superblock location.
        const SHIFTED_ROOT_OFFSET = 0x0002;
        /// Data blocks are LZO-compressed.
        const LZO_COMPRESSION = 0x0004;
        /// Data blocks are zlib-compressed.
        const ZLIB_COMPRESSION = 0x0008;
    }
}

impl Flags {
    /// All flag bits the validator understands.
    pub const SUPPORTED: Self = Self::FSID_VERSION_1
        .union(Self::SHIFTED_ROOT_OFFSET)
        .union(Self::LZO_COMPRESSION)
        .union(Self::ZLIB_COMPRESSION);

    /// Returns the compression algorithm implied by the flags, failing if
    /// both compression bits are set.
    pub fn algorithm(&self) -> Result<crate::decompress::Algorithm> {
        use crate::decompress::Algorithm;
        match (
            self.contains(Self::LZO_COMPRESSION),
            self.contains(Self::ZLIB_COMPRESSION),
        ) {
            (true, true) => Err(PolyfsckError::UnsupportedFeature),
            (true, false) => Ok(Algorithm::Lzo),
            (false, true) => Ok(Algorithm::Zlib),
            (false, false) => Ok(Algorithm::None),
        }
    }
}

/// The filesystem identification block (§3).
#[derive(Clone, Copy, Debug, Default)]
pub struct FsId {
    /// CRC-32 over the image body, computed with this field zeroed.
    pub crc: u32,
    /// Arbitrary edition number.
    pub edition: u32,
    /// Total number of blocks described by the image.
    pub blocks: u32,
    /// Total number of files described by the image.
    pub files: u32,
}

/// Host-order, validated superblock.
#[derive(Clone, Copy, Debug)]
pub struct Superblock {
    pub size: u64,
    pub flags: Flags,
    pub fsid: FsId,
    pub root: RawInode,
}

/// Where the accepted superblock begins within the image.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StartOffset {
    Zero,
    Pad,
}

impl StartOffset {
    /// Byte offset this variant corresponds to.
    pub fn as_u64(self) -> u64 {
        match self {
            Self::Zero => 0,
            Self::Pad => PAD_SIZE as u64,
        }
    }
}

/// Decodes the raw little-endian superblock bytes (exactly
/// [`SUPERBLOCK_SIZE`] bytes) into host order, without semantic validation.
fn decode_raw(buf: &[u8]) -> (u32, u32, u32, u32, FsId, RawInode) {
    let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    let size = u32::from_le_bytes(buf[4..8].try_into().unwrap());
    let flags = u32::from_le_bytes(buf[8..12].try_into().unwrap());
    let future = u32::from_le_bytes(buf[12..16].try_into().unwrap());
    let fsid = FsId {
        crc: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
        edition: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
        blocks: u32::from_le_bytes(buf[24..28].try_into().unwrap()),
        files: u32::from_le_bytes(buf[28..32].try_into().unwrap()),
    };
    let root = RawInode::decode(&buf[32..44]);
    (magic, size, flags, future, fsid, root)
}

/// Superblock Locator (§4.2): tries offset 0, then [`PAD_SIZE`].
pub fn locate(reader: &mut crate::block_reader::BlockReader) -> Result<(StartOffset, Superblock)> {
    let image_len = reader.len()?;

    let try_at = |reader: &mut crate::block_reader::BlockReader, off: u64| -> Result<Option<(u32, u32, u32, u32, FsId, RawInode)>> {
        if off + SUPERBLOCK_SIZE as u64 > image_len {
            return Ok(None);
        }
        let buf = reader.read_at(off, SUPERBLOCK_SIZE)?;
        let decoded = decode_raw(&buf);
        if decoded.0 == MAGIC {
            Ok(Some(decoded))
        } else {
            Ok(None)
        }
    };

    let (start, (_, size, flags, _future, fsid, root)) = if let Some(d) = try_at(reader, 0)? {
        (StartOffset::Zero, d)
    } else if let Some(d) = try_at(reader, PAD_SIZE as u64)? {
        (StartOffset::Pad, d)
    } else {
        return Err(PolyfsckError::BadMagic);
    };

    let flags = Flags::from_bits_truncate(flags);
    if flags.bits() & !Flags::SUPPORTED.bits() != 0 {
        return Err(PolyfsckError::UnsupportedFeature);
    }
    if (size as u64) < BLOCK_SIZE as u64 {
        return Err(PolyfsckError::SuperblockTooSmall);
    }
    if !flags.contains(Flags::FSID_VERSION_1) {
        return Err(PolyfsckError::InvalidVersion);
    }
    if fsid.files == 0 {
        return Err(PolyfsckError::ZeroFileCount);
    }
    if image_len < size as u64 {
        return Err(PolyfsckError::TruncatedImage { size: size as u64 });
    }
    // image_len > size is a warning only; caller decides whether to print it.

    Ok((
        start,
        Superblock {
            size: size as u64,
            flags,
            fsid,
            root,
        },
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block_reader::BlockReader;
    use std::io::Seek;
    use std::io::SeekFrom;
    use std::io::Write;

    fn build_superblock(size: u32, flags: u32, files: u32) -> Vec<u8> {
        let mut buf = vec![0u8; SUPERBLOCK_SIZE];
        buf[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        buf[4..8].copy_from_slice(&size.to_le_bytes());
        buf[8..12].copy_from_slice(&flags.to_le_bytes());
        buf[16..20].copy_from_slice(&0u32.to_le_bytes()); // crc
        buf[20..24].copy_from_slice(&1u32.to_le_bytes()); // edition
        buf[24..28].copy_from_slice(&1u32.to_le_bytes()); // blocks
        buf[28..32].copy_from_slice(&files.to_le_bytes());
        // root inode: directory mode, offset = SUPERBLOCK_SIZE/4 units
        let mode: u16 = 0o040755;
        let uid: u16 = 0;
        let raw_second: u32 = 0; // size=0, gid=0
        let offset_units = (SUPERBLOCK_SIZE as u32) / 4;
        let raw_third: u32 = offset_units << 6; // namelen=0
        buf[32..34].copy_from_slice(&mode.to_le_bytes());
        buf[34..36].copy_from_slice(&uid.to_le_bytes());
        buf[36..40].copy_from_slice(&raw_second.to_le_bytes());
        buf[40..44].copy_from_slice(&raw_third.to_le_bytes());
        buf
    }

    fn file_with(data: &[u8]) -> std::fs::File {
        let mut f = tempfile::tempfile().unwrap();
        f.write_all(data).unwrap();
        f.seek(SeekFrom::Start(0)).unwrap();
        f
    }

    #[test]
    fn locate_at_offset_zero() {
        let mut image = build_superblock(BLOCK_SIZE as u32, Flags::FSID_VERSION_1.bits(), 1);
        image.resize(BLOCK_SIZE, 0);
        let mut reader = BlockReader::new(file_with(&image));
        let (start, sb) = locate(&mut reader).unwrap();
        assert_eq!(start, StartOffset::Zero);
        assert_eq!(sb.size, BLOCK_SIZE as u64);
    }

    #[test]
    fn locate_at_pad_offset() {
        let sb_bytes = build_superblock(BLOCK_SIZE as u32, Flags::FSID_VERSION_1.bits(), 1);
        let mut image = vec![0u8; PAD_SIZE];
        image.extend_from_slice(&sb_bytes);
        image.resize(PAD_SIZE + BLOCK_SIZE, 0);
        let mut reader = BlockReader::new(file_with(&image));
        let (start, _sb) = locate(&mut reader).unwrap();
        assert_eq!(start, StartOffset::Pad);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let image = vec![0u8; BLOCK_SIZE];
        let mut reader = BlockReader::new(file_with(&image));
        assert!(matches!(locate(&mut reader), Err(PolyfsckError::BadMagic)));
    }

    #[test]
    fn zero_file_count_is_rejected() {
        let mut image = build_superblock(BLOCK_SIZE as u32, Flags::FSID_VERSION_1.bits(), 0);
        image.resize(BLOCK_SIZE, 0);
        let mut reader = BlockReader::new(file_with(&image));
        assert!(matches!(
            locate(&mut reader),
            Err(PolyfsckError::ZeroFileCount)
        ));
    }

    #[test]
    fn missing_version_flag_is_rejected() {
        let mut image = build_superblock(BLOCK_SIZE as u32, 0, 1);
        image.resize(BLOCK_SIZE, 0);
        let mut reader = BlockReader::new(file_with(&image));
        assert!(matches!(
            locate(&mut reader),
            Err(PolyfsckError::InvalidVersion)
        ));
    }

    #[test]
    fn truncated_image_is_rejected() {
        let image = build_superblock((BLOCK_SIZE * 2) as u32, Flags::FSID_VERSION_1.bits(), 1);
        let mut reader = BlockReader::new(file_with(&image));
        assert!(matches!(
            locate(&mut reader),
            Err(PolyfsckError::TruncatedImage { .. })
        ));
    }
}
