//! Tree Walker (§4.6, §4.7): recursive descent over the directory tree,
//! enforcing structural invariants per inode kind while decoding file data
//! and driving extraction.

use crate::block_reader::BlockReader;
use crate::decompress;
use crate::decompress::Algorithm;
use crate::error::PolyfsckError;
use crate::error::Result;
use crate::inode::FileType;
use crate::inode::RawInode;
use crate::inode::RAW_INODE_SIZE;
use crate::region::Regions;
use crate::sink::ExtractionSink;
use crate::superblock::StartOffset;
use crate::superblock::Superblock;
use crate::Verbosity;
use crate::BLOCK_SIZE;
use std::path::Path;

/// Per-walk context threaded through the recursion instead of global
/// state (spec.md §9).
struct Context<'a, S: ExtractionSink> {
    reader: &'a mut BlockReader,
    algo: Algorithm,
    verbosity: Verbosity,
    regions: Regions,
    sink: &'a mut S,
}

/// Entry point: validates the whole image tree starting from the embedded
/// root inode, and extracts it if `sink` is a [`crate::sink::HostSink`].
pub fn walk_image<S: ExtractionSink>(
    reader: &mut BlockReader,
    start: StartOffset,
    sb: &Superblock,
    verbosity: Verbosity,
    sink: &mut S,
) -> Result<()> {
    let sb_end = start.as_u64() + crate::superblock::SUPERBLOCK_SIZE as u64;

    if sb.root.file_type() != FileType::Directory {
        return Err(PolyfsckError::RootNotDirectory);
    }
    if !sb.flags.contains(crate::superblock::Flags::SHIFTED_ROOT_OFFSET) {
        let expected = sb_end;
        if sb.root.byte_offset() != expected {
            return Err(PolyfsckError::BadRootOffset);
        }
    }

    let algo = sb.flags.algorithm()?;
    let mut ctx = Context {
        reader,
        algo,
        verbosity,
        regions: Regions::new(sb.root.byte_offset()),
        sink,
    };

    walk(&mut ctx, &sb.root, Path::new(""), "/")?;

    ctx.regions.finish(sb_end, sb.size)?;

    Ok(())
}

/// Dispatches a single inode by its file-type bits, then applies metadata
/// uniformly across all kinds (§4.6).
fn walk<S: ExtractionSink>(
    ctx: &mut Context<S>,
    inode: &RawInode,
    path: &Path,
    display_name: &str,
) -> Result<()> {
    match inode.file_type() {
        FileType::Directory => walk_dir(ctx, inode, path, display_name)?,
        FileType::Regular => walk_regular(ctx, inode, path, display_name)?,
        FileType::Symlink => walk_symlink(ctx, inode, path, display_name)?,
        FileType::CharDevice | FileType::BlockDevice | FileType::Fifo | FileType::Socket => {
            walk_special(ctx, inode, path, display_name)?
        }
        FileType::Unknown => return Err(PolyfsckError::BogusMode),
    }
    ctx.sink.apply_metadata(path, inode)?;
    Ok(())
}

fn print_inode_line(verbosity: Verbosity, inode: &RawInode, name: &str) {
    if !verbosity.prints_inodes() {
        return;
    }
    let info = match inode.file_type() {
        FileType::CharDevice | FileType::BlockDevice => {
            let (major, minor) = device_numbers(inode.size);
            format!("{major:4},{minor:4}")
        }
        _ => format!("{:9}", inode.size),
    };
    println!(
        "{} {:04o} {} {:4}:{:<4} {}",
        inode.file_type().tag(),
        inode.mode & 0o7777,
        info,
        inode.uid,
        inode.gid,
        name
    );
}

/// Splits a device inode's packed `size` field into (major, minor), each a
/// 12-bit quantity.
fn device_numbers(size: u32) -> (u32, u32) {
    let major = (size >> 12) & 0xfff;
    let minor = size & 0xfff;
    (major, minor)
}

fn walk_dir<S: ExtractionSink>(
    ctx: &mut Context<S>,
    inode: &RawInode,
    path: &Path,
    display_name: &str,
) -> Result<()> {
    // Invariant 5 (§3) is a full biconditional, matching how the regular-
    // file check below enforces both directions (`walk_regular`).
    if (inode.byte_offset() == 0) != (inode.size == 0) {
        return Err(PolyfsckError::BadDirInode);
    }

    print_inode_line(ctx.verbosity, inode, display_name);

    ctx.regions.note_dir_start(inode.byte_offset());
    ctx.sink.mkdir(path, inode.mode)?;

    let mut cursor = inode.byte_offset();
    let mut remaining: i64 = inode.size as i64;

    while remaining > 0 {
        let raw = ctx.reader.read_at(cursor, RAW_INODE_SIZE)?;
        let child = RawInode::decode(&raw);
        cursor += RAW_INODE_SIZE as u64;

        let name_field_len = child.name_field_len();
        let name_bytes = ctx.reader.read_at(cursor, name_field_len)?;
        let actual_len = name_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(name_field_len);

        if actual_len == 0 {
            return Err(PolyfsckError::EmptyName);
        }
        if name_field_len < actual_len || name_field_len - actual_len > 3 {
            return Err(PolyfsckError::BadNameLength);
        }

        let name = String::from_utf8_lossy(&name_bytes[..actual_len]).into_owned();

        if child.file_type() == FileType::Directory
            && child.byte_offset() != 0
            && child.byte_offset() <= ctx.regions.start_dir
        {
            return Err(PolyfsckError::BadChildOffset);
        }

        let child_path = path.join(&name);
        walk(ctx, &child, &child_path, &name)?;

        cursor += name_field_len as u64;
        ctx.regions.advance_end_dir(cursor);
        if cursor <= ctx.regions.start_dir {
            return Err(PolyfsckError::BadChildOffset);
        }

        remaining -= (RAW_INODE_SIZE + name_field_len) as i64;
    }

    Ok(())
}

fn walk_regular<S: ExtractionSink>(
    ctx: &mut Context<S>,
    inode: &RawInode,
    path: &Path,
    display_name: &str,
) -> Result<()> {
    if (inode.byte_offset() == 0) != (inode.size == 0) {
        return Err(PolyfsckError::FileInodeInconsistent);
    }

    print_inode_line(ctx.verbosity, inode, display_name);

    if inode.size == 0 {
        ctx.sink.write_file(path, &[], inode.mode)?;
        return Ok(());
    }

    ctx.regions.note_data_start(inode.byte_offset());

    let data = decode_file_blocks(ctx, inode)?;
    ctx.sink.write_file(path, &data, inode.mode)?;
    Ok(())
}

/// File Data Block Decoding (§4.7).
fn decode_file_blocks<S: ExtractionSink>(
    ctx: &mut Context<S>,
    inode: &RawInode,
) -> Result<Vec<u8>> {
    let size = inode.size as u64;
    let num_blocks = size.div_ceil(BLOCK_SIZE as u64) as usize;

    let table_off = inode.byte_offset();
    let table_bytes = ctx.reader.read_at(table_off, 4 * num_blocks)?;
    let pointers: Vec<u64> = table_bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes(c.try_into().unwrap()) as u64)
        .collect();

    let mut out = Vec::with_capacity(size as usize);
    let data_start = table_off + 4 * num_blocks as u64;

    for (k, &next) in pointers.iter().enumerate() {
        let cur = if k == 0 { data_start } else { pointers[k - 1] };

        let produced_so_far = k as u64 * BLOCK_SIZE as u64;
        let remaining_s = size - produced_so_far;
        let is_final = k + 1 == num_blocks;
        let expected_len = if is_final {
            let rem = (size % BLOCK_SIZE as u64) as usize;
            if rem == 0 {
                BLOCK_SIZE
            } else {
                rem
            }
        } else {
            BLOCK_SIZE
        };

        if cur == next {
            let hole_len = (BLOCK_SIZE as u64).min(remaining_s) as usize;
            if ctx.verbosity.prints_blocks() {
                println!("  block {k}: hole ({hole_len} bytes)");
            }
            out.extend(std::iter::repeat(0u8).take(hole_len));
        } else {
            let src = ctx.reader.read_at(cur, (next - cur) as usize)?;
            let decoded = decompress::decompress(&src, ctx.algo, expected_len)?;
            if decoded.len() != expected_len {
                return Err(PolyfsckError::BlockSizeMismatch);
            }
            if ctx.verbosity.prints_blocks() {
                println!(
                    "  block {k}: {} bytes compressed -> {} bytes",
                    src.len(),
                    decoded.len()
                );
            }
            out.extend(decoded);
        }

        ctx.regions.advance_end_data(next);
    }

    Ok(out)
}

fn walk_symlink<S: ExtractionSink>(
    ctx: &mut Context<S>,
    inode: &RawInode,
    path: &Path,
    display_name: &str,
) -> Result<()> {
    if inode.byte_offset() == 0 {
        return Err(PolyfsckError::SymlinkZeroOffset);
    }
    if inode.size == 0 {
        return Err(PolyfsckError::SymlinkZeroSize);
    }

    ctx.regions.note_data_start(inode.byte_offset());

    let ptr_bytes = ctx.reader.read_at(inode.byte_offset(), 4)?;
    let end = u32::from_le_bytes(ptr_bytes.try_into().unwrap()) as u64;
    let payload_start = inode.byte_offset() + 4;
    if end < payload_start {
        return Err(PolyfsckError::BadChildOffset);
    }
    let src = ctx
        .reader
        .read_at(payload_start, (end - payload_start) as usize)?;
    let decoded = decompress::decompress(&src, ctx.algo, inode.size as usize)?;
    if decoded.len() != inode.size as usize {
        return Err(PolyfsckError::SymlinkSizeMismatch);
    }
    let target = String::from_utf8_lossy(&decoded).into_owned();

    if ctx.verbosity.prints_inodes() {
        println!(
            "{} {:04o} {:9} {:4}:{:<4} {} -> {}",
            inode.file_type().tag(),
            inode.mode & 0o7777,
            inode.size,
            inode.uid,
            inode.gid,
            display_name,
            target
        );
    }

    ctx.sink.symlink(path, &target)?;
    ctx.regions.advance_end_data(end);
    Ok(())
}

fn walk_special<S: ExtractionSink>(
    ctx: &mut Context<S>,
    inode: &RawInode,
    path: &Path,
    display_name: &str,
) -> Result<()> {
    match inode.file_type() {
        FileType::Fifo if inode.size != 0 => return Err(PolyfsckError::FifoHasSize),
        FileType::Socket if inode.size != 0 => return Err(PolyfsckError::SocketHasSize),
        _ => {}
    }
    if inode.byte_offset() != 0 {
        return Err(PolyfsckError::SpecialHasOffset);
    }

    print_inode_line(ctx.verbosity, inode, display_name);

    let (major, minor) = device_numbers(inode.size);
    ctx.sink
        .mknod(path, inode.file_type(), inode.mode, major, minor)?;
    Ok(())
}
