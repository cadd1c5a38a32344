//! In-flight representation of a single archive member.

use std::path::{Path, PathBuf};

/// File type of an archive entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FileType {
    /// Regular file.
    #[default]
    Regular,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Hard link to an entry stored earlier in the archive.
    Hardlink,
    /// Named pipe.
    Fifo,
    /// Unix domain socket.
    Socket,
    /// Block device node.
    BlockDevice,
    /// Character device node.
    CharDevice,
}

impl FileType {
    /// Returns whether an existing filesystem object of this entry type
    /// constitutes a conflict. Directories never conflict with
    /// directories; everything else does.
    pub fn conflicts_with_existing(self) -> bool {
        !matches!(self, FileType::Directory)
    }
}

/// A point in time with nanosecond precision, as stored in archive
/// entry metadata. Each of the four entry timestamps is independently
/// present or absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryTime {
    /// Seconds since the unix epoch.
    pub seconds: i64,
    /// Nanosecond part.
    pub nanos: u32,
}

impl EntryTime {
    /// Creates a new timestamp from whole seconds.
    pub fn from_seconds(seconds: i64) -> Self {
        Self { seconds, nanos: 0 }
    }
}

/// Represents a single member of an archive.
///
/// Lives only for the duration of one engine step: the codec produces
/// one per header during reading, and the compressor populates one per
/// filesystem object during writing.
#[derive(Debug, Default, Clone)]
pub struct ArchiveEntry {
    /// Pathname as advertised in the archive. Raw bytes, not
    /// necessarily valid UTF-8.
    pub pathname: Vec<u8>,
    /// Target pathname of a hard link, if any.
    pub hardlink: Option<Vec<u8>>,
    /// Target pathname of a symbolic link, if any. Stored verbatim and
    /// never resolved by the engines.
    pub symlink: Option<Vec<u8>>,
    /// File type of the entry.
    pub file_type: FileType,
    /// Uncompressed size in bytes. Zero for non-regular entries, and
    /// possibly zero for regular entries of raw-format archives.
    pub size: u64,
    /// Permission bits.
    pub mode: u32,
    /// Owning user id.
    pub uid: u64,
    /// Owning group id.
    pub gid: u64,
    /// Owning user name, when the archive stores one.
    pub uname: Option<String>,
    /// Owning group name, when the archive stores one.
    pub gname: Option<String>,
    /// Device major number for block and character devices.
    pub rdev_major: u32,
    /// Device minor number for block and character devices.
    pub rdev_minor: u32,
    /// Number of hard links.
    pub nlink: u32,
    /// Access time.
    pub atime: Option<EntryTime>,
    /// Creation (birth) time.
    pub btime: Option<EntryTime>,
    /// Status change time.
    pub ctime: Option<EntryTime>,
    /// Modification time.
    pub mtime: Option<EntryTime>,
    /// Whether the entry body is encrypted.
    pub encrypted: bool,
}

impl ArchiveEntry {
    /// Creates an entry with the given pathname and type, all other
    /// metadata defaulted.
    pub fn new(pathname: impl Into<Vec<u8>>, file_type: FileType) -> Self {
        Self {
            pathname: pathname.into(),
            file_type,
            ..Default::default()
        }
    }

    /// Creates an entry from a filesystem object without following
    /// symbolic links.
    ///
    /// # Arguments
    /// * `path` - The filesystem path to extract metadata from
    /// * `pathname` - The pathname to use for this entry within the archive
    pub fn from_path(path: impl AsRef<Path>, pathname: impl Into<Vec<u8>>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let meta = std::fs::symlink_metadata(path)?;

        let mut entry = ArchiveEntry {
            pathname: pathname.into(),
            file_type: file_type_of(&meta),
            ..Default::default()
        };

        if entry.file_type == FileType::Symlink {
            let target = std::fs::read_link(path)?;
            entry.symlink = Some(path_bytes(&target));
        } else if entry.file_type == FileType::Regular {
            entry.size = meta.len();
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;

            entry.mode = meta.mode() & 0o7777;
            entry.uid = meta.uid() as u64;
            entry.gid = meta.gid() as u64;
            entry.nlink = meta.nlink() as u32;
            entry.atime = Some(EntryTime {
                seconds: meta.atime(),
                nanos: meta.atime_nsec() as u32,
            });
            entry.ctime = Some(EntryTime {
                seconds: meta.ctime(),
                nanos: meta.ctime_nsec() as u32,
            });
            entry.mtime = Some(EntryTime {
                seconds: meta.mtime(),
                nanos: meta.mtime_nsec() as u32,
            });
            if matches!(entry.file_type, FileType::BlockDevice | FileType::CharDevice) {
                let rdev = meta.rdev();
                entry.rdev_major = nix::sys::stat::major(rdev) as u32;
                entry.rdev_minor = nix::sys::stat::minor(rdev) as u32;
            }
        }

        if let Ok(created) = meta.created() {
            if let Ok(since_epoch) = created.duration_since(std::time::UNIX_EPOCH) {
                entry.btime = Some(EntryTime {
                    seconds: since_epoch.as_secs() as i64,
                    nanos: since_epoch.subsec_nanos(),
                });
            }
        }

        Ok(entry)
    }

    /// Returns the pathname as a filesystem path.
    pub fn pathname_path(&self) -> PathBuf {
        bytes_to_path(&self.pathname)
    }

    /// Returns the pathname decoded as UTF-8 when possible, lossily
    /// otherwise.
    pub fn pathname_lossy(&self) -> String {
        String::from_utf8_lossy(&self.pathname).into_owned()
    }

    /// Returns whether this entry is a directory.
    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }

    /// Returns whether this entry is one of the special file types that
    /// carry no body (fifo, socket, block or character device).
    pub fn is_special(&self) -> bool {
        matches!(
            self.file_type,
            FileType::Fifo | FileType::Socket | FileType::BlockDevice | FileType::CharDevice
        )
    }
}

fn file_type_of(meta: &std::fs::Metadata) -> FileType {
    let ft = meta.file_type();
    if ft.is_symlink() {
        return FileType::Symlink;
    }
    if ft.is_dir() {
        return FileType::Directory;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;

        if ft.is_fifo() {
            return FileType::Fifo;
        }
        if ft.is_socket() {
            return FileType::Socket;
        }
        if ft.is_block_device() {
            return FileType::BlockDevice;
        }
        if ft.is_char_device() {
            return FileType::CharDevice;
        }
    }
    FileType::Regular
}

/// Converts raw pathname bytes into a filesystem path. On unix the
/// bytes are used as-is; elsewhere they are decoded lossily.
pub(crate) fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    #[cfg(unix)]
    {
        use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

        PathBuf::from(OsStr::from_bytes(bytes))
    }
    #[cfg(not(unix))]
    {
        PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Converts a filesystem path into raw bytes.
pub(crate) fn path_bytes(path: &Path) -> Vec<u8> {
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;

        path.as_os_str().as_bytes().to_vec()
    }
    #[cfg(not(unix))]
    {
        path.to_string_lossy().into_owned().into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_from_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        std::fs::write(&path, b"payload").unwrap();

        let entry = ArchiveEntry::from_path(&path, &b"file.txt"[..]).unwrap();
        assert_eq!(entry.file_type, FileType::Regular);
        assert_eq!(entry.size, 7);
        assert!(entry.mtime.is_some());
        assert_eq!(entry.pathname_lossy(), "file.txt");
    }

    #[cfg(unix)]
    #[test]
    fn entry_from_symlink_keeps_target_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("link");
        std::os::unix::fs::symlink("/nonexistent/target", &path).unwrap();

        let entry = ArchiveEntry::from_path(&path, &b"link"[..]).unwrap();
        assert_eq!(entry.file_type, FileType::Symlink);
        assert_eq!(entry.symlink.as_deref(), Some(&b"/nonexistent/target"[..]));
        assert_eq!(entry.size, 0);
    }

    #[test]
    fn entry_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let entry = ArchiveEntry::from_path(dir.path(), &b"dir"[..]).unwrap();
        assert_eq!(entry.file_type, FileType::Directory);
        assert!(entry.is_directory());
        assert_eq!(entry.size, 0);
    }
}
