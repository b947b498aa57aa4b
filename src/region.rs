//! Region Tracker (§4.8): the four watermarks bounding the directory and
//! data regions, and the global layout check run once the walk completes.
//!
//! Kept as a plain context value threaded through the walker rather than
//! process-wide globals, per the rewrite note in spec.md §9.

use crate::error::PolyfsckError;
use crate::error::Result;

/// Sentinel meaning "never set"; `start_data`/`end_data` use it to tell
/// "no data blocks exist yet" apart from a legitimate offset of 0.
const UNSET: u64 = u64::MAX;

/// Process-scoped (here: walk-scoped) watermarks for the directory and
/// data regions.
#[derive(Debug)]
pub struct Regions {
    pub start_dir: u64,
    pub end_dir: u64,
    pub start_data: u64,
    pub end_data: u64,
}

impl Regions {
    /// Creates a fresh tracker, seeded with the root directory's offset as
    /// the initial `start_dir`/`end_dir` watermark.
    pub fn new(root_offset: u64) -> Self {
        Self {
            start_dir: root_offset,
            end_dir: root_offset,
            start_data: UNSET,
            end_data: UNSET,
        }
    }

    /// Registers a directory entry's offset, keeping `start_dir` at the
    /// lowest one seen.
    pub fn note_dir_start(&mut self, offset: u64) {
        if offset != 0 {
            self.start_dir = self.start_dir.min(offset);
        }
    }

    /// Advances `end_dir` to at least `cursor`, monotonically (invariant 2
    /// of §3).
    pub fn advance_end_dir(&mut self, cursor: u64) {
        self.end_dir = self.end_dir.max(cursor);
    }

    /// Registers the start of a regular file's or symlink's data.
    pub fn note_data_start(&mut self, offset: u64) {
        self.start_data = self.start_data.min(offset);
    }

    /// Advances `end_data` to at least `next`, monotonically.
    pub fn advance_end_data(&mut self, next: u64) {
        if self.end_data == UNSET {
            self.end_data = next;
        } else {
            self.end_data = self.end_data.max(next);
        }
    }

    /// Final cross-checks once the walk is done (§4.8).
    pub fn finish(&self, superblock_end: u64, image_size: u64) -> Result<()> {
        if self.start_data != UNSET && self.start_data < superblock_end {
            return Err(PolyfsckError::DataBeforeSuper);
        }
        if self.start_data != UNSET && self.end_dir != self.start_data {
            return Err(PolyfsckError::DirDataGap);
        }
        if self.end_data != UNSET && self.end_data > image_size {
            return Err(PolyfsckError::DataPastEnd);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn watermarks_start_at_root_offset() {
        let r = Regions::new(100);
        assert_eq!(r.start_dir, 100);
        assert_eq!(r.end_dir, 100);
    }

    #[test]
    fn end_dir_is_monotonic() {
        let mut r = Regions::new(0);
        r.advance_end_dir(50);
        r.advance_end_dir(30);
        assert_eq!(r.end_dir, 50);
        r.advance_end_dir(80);
        assert_eq!(r.end_dir, 80);
    }

    #[test]
    fn finish_requires_end_dir_equals_start_data_when_data_present() {
        let mut r = Regions::new(44);
        r.advance_end_dir(60);
        r.note_data_start(60);
        assert!(r.finish(44, 4096).is_ok());

        let mut r2 = Regions::new(44);
        r2.advance_end_dir(60);
        r2.note_data_start(70);
        assert!(matches!(r2.finish(44, 4096), Err(PolyfsckError::DirDataGap)));
    }

    #[test]
    fn finish_rejects_data_past_end() {
        let mut r = Regions::new(44);
        r.advance_end_dir(60);
        r.note_data_start(60);
        r.advance_end_data(5000);
        assert!(matches!(r.finish(44, 4096), Err(PolyfsckError::DataPastEnd)));
    }

    #[test]
    fn finish_ok_with_no_data_at_all() {
        let r = Regions::new(44);
        assert!(r.finish(44, 4096).is_ok());
    }
}
