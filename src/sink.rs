//! Extraction Sink (§4.8 collaborator interface): the host-filesystem side
//! effects of `-x DIR`. `spec.md` treats this as an external collaborator;
//! `SPEC_FULL.md` supplies a concrete implementation since the CLI needs
//! one to do anything on `-x`.

use crate::error::Result;
use crate::inode::FileType;
use crate::inode::RawInode;
use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::symlink;
use std::path::Path;
use std::path::PathBuf;

/// Everything the Tree Walker needs from a destination for the files it
/// discovers. Kept small and dispatched by inode kind, mirroring the small
/// trait-per-concern shape of the teacher's `FSFactory`
/// (`mkfs/src/main.rs`).
///
/// Every `path` the walker passes in is relative to the image's root (the
/// root inode itself is `""`); implementations are responsible for
/// anchoring it under whatever destination they were constructed with.
pub trait ExtractionSink {
    /// Creates a directory at `path` with the given mode.
    fn mkdir(&mut self, path: &Path, mode: u16) -> Result<()>;

    /// Writes `data` as the full contents of a new regular file at `path`.
    fn write_file(&mut self, path: &Path, data: &[u8], mode: u16) -> Result<()>;

    /// Creates a symlink at `path` pointing at `target`.
    fn symlink(&mut self, path: &Path, target: &str) -> Result<()>;

    /// Creates a device/FIFO/socket node at `path`.
    fn mknod(&mut self, path: &Path, file_type: FileType, mode: u16, major: u32, minor: u32)
        -> Result<()>;

    /// Applies ownership, permission and time metadata to an already
    /// created path, per §4.6: uid/gid only when running as root, mode
    /// preserved including suid/sgid bits, mtime/atime zeroed, `lchown`
    /// used for symlinks instead of `chown`.
    fn apply_metadata(&mut self, path: &Path, inode: &RawInode) -> Result<()>;
}

/// No-op sink used for validate-only runs, so the walker never has to
/// branch on whether extraction is enabled.
pub struct NullSink;

impl ExtractionSink for NullSink {
    fn mkdir(&mut self, _path: &Path, _mode: u16) -> Result<()> {
        Ok(())
    }

    fn write_file(&mut self, _path: &Path, _data: &[u8], _mode: u16) -> Result<()> {
        Ok(())
    }

    fn symlink(&mut self, _path: &Path, _target: &str) -> Result<()> {
        Ok(())
    }

    fn mknod(
        &mut self,
        _path: &Path,
        _file_type: FileType,
        _mode: u16,
        _major: u32,
        _minor: u32,
    ) -> Result<()> {
        Ok(())
    }

    fn apply_metadata(&mut self, _path: &Path, _inode: &RawInode) -> Result<()> {
        Ok(())
    }
}

/// Materializes the tree onto the host filesystem, rooted at a directory
/// that must already exist (the image's root becomes that directory
/// itself, per §6). Every path handed in by the walker is relative to the
/// image root, so every method anchors it under `root` before touching
/// the host filesystem.
pub struct HostSink {
    root: PathBuf,
    is_root_uid: bool,
}

impl HostSink {
    /// Creates a sink. `root` must exist; the caller (the walker's entry
    /// point) treats it as the destination for the image's root inode.
    pub fn new(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{}: extraction directory does not exist", root.display()),
            )
            .into());
        }
        Ok(Self {
            root: root.to_path_buf(),
            is_root_uid: unsafe { libc::geteuid() } == 0,
        })
    }

    /// Anchors a walker-relative `path` under the extraction root. The
    /// image's own root inode is passed down as an empty path, which must
    /// resolve to `root` itself rather than a child of it.
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.as_os_str().is_empty() {
            self.root.clone()
        } else {
            self.root.join(path)
        }
    }
}

impl ExtractionSink for HostSink {
    fn mkdir(&mut self, path: &Path, mode: u16) -> Result<()> {
        let full = self.resolve(path);
        match fs::create_dir(&full) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }
        chmod(&full, mode)?;
        Ok(())
    }

    fn write_file(&mut self, path: &Path, data: &[u8], mode: u16) -> Result<()> {
        let full = self.resolve(path);
        fs::write(&full, data)?;
        chmod(&full, mode)?;
        Ok(())
    }

    fn symlink(&mut self, path: &Path, target: &str) -> Result<()> {
        let full = self.resolve(path);
        symlink(target, &full)?;
        Ok(())
    }

    fn mknod(
        &mut self,
        path: &Path,
        file_type: FileType,
        mode: u16,
        major: u32,
        minor: u32,
    ) -> Result<()> {
        let full = self.resolve(path);
        let c_path = CString::new(full.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let type_bits: libc::mode_t = match file_type {
            FileType::CharDevice => libc::S_IFCHR,
            FileType::BlockDevice => libc::S_IFBLK,
            FileType::Fifo => libc::S_IFIFO,
            FileType::Socket => libc::S_IFSOCK,
            _ => unreachable!("mknod called for a non-special file type"),
        };
        let dev = unsafe { libc::makedev(major, minor) };
        let ret = unsafe {
            libc::mknod(
                c_path.as_ptr(),
                type_bits | (mode as libc::mode_t & 0o7777),
                dev,
            )
        };
        if ret != 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(())
    }

    fn apply_metadata(&mut self, path: &Path, inode: &RawInode) -> Result<()> {
        let full = self.resolve(path);
        let is_symlink = inode.file_type() == FileType::Symlink;

        if self.is_root_uid {
            let c_path = CString::new(full.as_os_str().as_bytes())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            let ret = unsafe {
                libc::lchown(c_path.as_ptr(), inode.uid as libc::uid_t, inode.gid as libc::gid_t)
            };
            if ret != 0 {
                return Err(io::Error::last_os_error().into());
            }
        }

        if !is_symlink {
            // mode (including suid/sgid) was already applied at creation
            // time for files/dirs; re-apply here in case mknod/symlink
            // creation didn't carry the full permission bits.
            chmod(&full, inode.mode)?;

            let times = libc::utimbuf {
                actime: 0,
                modtime: 0,
            };
            let c_path = CString::new(full.as_os_str().as_bytes())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            let ret = unsafe { libc::utime(c_path.as_ptr(), &times) };
            if ret != 0 {
                return Err(io::Error::last_os_error().into());
            }
        }

        Ok(())
    }
}

fn chmod(path: &Path, mode: u16) -> Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let ret = unsafe { libc::chmod(c_path.as_ptr(), (mode & 0o7777) as libc::mode_t) };
    if ret != 0 {
        return Err(io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn null_sink_never_errors() {
        let mut sink = NullSink;
        let path = Path::new("/nonexistent/path");
        assert!(sink.mkdir(path, 0o755).is_ok());
        assert!(sink.write_file(path, b"data", 0o644).is_ok());
        assert!(sink.symlink(path, "target").is_ok());
    }

    #[test]
    fn host_sink_requires_existing_root() {
        let missing = Path::new("/definitely/does/not/exist/polyfsck-test");
        assert!(HostSink::new(missing).is_err());
    }

    #[test]
    fn host_sink_creates_dir_and_file() {
        // Paths are relative to the extraction root, the same way the
        // walker passes them (`path.join(&name)` starting from `""`).
        let dir = tempdir().unwrap();
        let mut sink = HostSink::new(dir.path()).unwrap();
        sink.mkdir(Path::new("child"), 0o755).unwrap();
        assert!(dir.path().join("child").is_dir());

        sink.write_file(Path::new("child/hello"), b"hi!\n", 0o644)
            .unwrap();
        assert_eq!(fs::read(dir.path().join("child/hello")).unwrap(), b"hi!\n");
    }

    #[test]
    fn host_sink_creates_symlink() {
        let dir = tempdir().unwrap();
        let mut sink = HostSink::new(dir.path()).unwrap();
        sink.symlink(Path::new("link"), "target").unwrap();
        assert_eq!(
            fs::read_link(dir.path().join("link"))
                .unwrap()
                .to_str()
                .unwrap(),
            "target"
        );
    }

    #[test]
    fn root_path_resolves_to_extraction_root_itself() {
        // The walker calls every sink method for the root inode with an
        // empty path (`src/walker.rs`'s `walk_image` starts the recursion
        // at `Path::new("")`); that must land on the extraction root
        // itself, not a child of it.
        let dir = tempdir().unwrap();
        let mut sink = HostSink::new(dir.path()).unwrap();
        sink.mkdir(Path::new(""), 0o755).unwrap();
        assert!(dir.path().is_dir());

        sink.write_file(Path::new("at_root"), b"data", 0o644)
            .unwrap();
        assert_eq!(fs::read(dir.path().join("at_root")).unwrap(), b"data");
    }
}
