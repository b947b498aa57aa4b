/*
 * Copyright 2026 polyfsck contributors
 *
 * This file is part of polyfsck.
 *
 * polyfsck is free software: you can redistribute it and/or modify it under
 * the terms of the GNU General Public License as published by the Free
 * Software Foundation, either version 3 of the License, or (at your option)
 * any later version.
 *
 * polyfsck is distributed in the hope that it will be useful, but WITHOUT
 * ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
 * FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
 * more details.
 *
 * You should have received a copy of the GNU General Public License along
 * with polyfsck. If not, see <https://www.gnu.org/licenses/>.
 */

//! Validates and optionally extracts a read-only compressed polyfs
//! filesystem image.
//!
//! The core is the image validator and extractor: superblock discovery, a
//! CRC pass over the whole image, a recursive inode walk that enforces
//! structural invariants while decoding every data block, and the block
//! decompression contract (including the LZO "overlap safety" check that
//! mirrors how a kernel driver decodes in place). CLI argument parsing,
//! usage text and the concrete extraction side effects live at the edges
//! (`cli`, `sink`) and are treated as the core's collaborators, the same
//! separation the teacher draws between `FSFactory` and its caller.

pub mod block_reader;
pub mod cli;
pub mod crc;
pub mod decompress;
pub mod error;
pub mod inode;
pub mod region;
pub mod sink;
pub mod superblock;
pub mod walker;

/// Uncompressed block granularity.
pub const BLOCK_SIZE: usize = 4096;
/// Alternate superblock offset for bootloader-prefixed images.
pub const PAD_SIZE: usize = 512;
/// Upper bound on an LZO-compressed block: `BLOCK_SIZE + BLOCK_SIZE/16 + 64 + 3`.
pub const MAX_BLOCK_OVERHEAD: usize = BLOCK_SIZE + BLOCK_SIZE / 16 + 64 + 3;

use error::Result;
use std::fs::File;
use std::path::Path;

/// Verbosity level requested on the command line (§6).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, PartialOrd, Ord)]
pub struct Verbosity(pub u8);

impl Verbosity {
    pub fn silent() -> Self {
        Self(0)
    }

    pub fn prints_inodes(&self) -> bool {
        self.0 >= 1
    }

    pub fn prints_blocks(&self) -> bool {
        self.0 >= 2
    }
}

/// Outcome of a successful validation pass: whether the image is longer
/// than its declared size (a warning, not an error, per §4.2).
pub struct VerifyReport {
    pub image_longer_than_declared: bool,
}

/// Runs the full validation pass (locator, CRC, tree walk, region check)
/// over the image at `path`, optionally extracting into `extract_to`.
pub fn run(
    path: &Path,
    extract_to: Option<&Path>,
    verbosity: Verbosity,
) -> Result<VerifyReport> {
    let file = File::open(path)?;
    let mut reader = block_reader::BlockReader::new(file.try_clone()?);

    let (start, sb) = superblock::locate(&mut reader)?;
    crc::verify_crc(&file, start.as_u64(), &sb)?;

    let image_len = reader.len()?;
    let image_longer_than_declared = image_len > sb.size;

    match extract_to {
        Some(dir) => {
            let mut sink = sink::HostSink::new(dir)?;
            walker::walk_image(&mut reader, start, &sb, verbosity, &mut sink)?;
        }
        None => {
            let mut sink = sink::NullSink;
            walker::walk_image(&mut reader, start, &sb, verbosity, &mut sink)?;
        }
    }

    Ok(VerifyReport {
        image_longer_than_declared,
    })
}
