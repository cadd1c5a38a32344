//! The extraction engine.
//!
//! An [`Extractor`] unpacks one archive into a destination directory
//! in two passes: a scan pass that discovers the entry set, sizes and
//! the common top-level, and an extract pass that writes filesystem
//! objects. In between, the destination is chosen and offered to the
//! host. Entry pathnames are never trusted: every written path is
//! mapped under the destination directory and parent chains are
//! validated without following symlinks.

use std::{
    collections::HashMap,
    io::Read,
    path::{Path, PathBuf},
    time::Duration,
};

use crossbeam_channel::Receiver;
use filetime::FileTime;
use tracing::{debug, warn};

use crate::{
    ArchiveEntry, Cancel, ConflictAction, Error, FileType,
    codec::{ReadMode, read::open_reader},
    entry::bytes_to_path,
    event::{ChannelEmitter, EngineEvent, EventHandler, Progress},
    sanitize::{PathSanitizer, common_prefix, lexical_child},
    util::basename_remove_extension,
};

const DEFAULT_NOTIFY_INTERVAL_US: u64 = 100_000;
const BLOCK_SIZE: usize = 64 * 1024;

/// Unpacks one archive into a destination directory.
///
/// # Example
///
/// ```no_run
/// use autoarc::{EventHandler, Extractor};
///
/// struct Quiet;
/// impl EventHandler for Quiet {}
///
/// let extractor = Extractor::new("/downloads/project.tar.gz", "/downloads");
/// extractor.run(&mut Quiet).unwrap();
/// ```
pub struct Extractor {
    source_file: PathBuf,
    output: PathBuf,
    output_is_dest: bool,
    delete_after_extraction: bool,
    passphrase: Option<String>,
    notify_interval: Duration,
    cancel: Cancel,
}

/// Result of the scan pass.
struct Scan {
    mode: ReadMode,
    total_files: u64,
    total_size: u64,
    /// Computed output path per entry, in archive order.
    files: Vec<PathBuf>,
    /// Deepest directory under the output containing every entry, when
    /// all entries stay inside the output.
    prefix: Option<PathBuf>,
}

enum ScanOutcome {
    Done(Scan),
    /// An encrypted entry was found and no passphrase is set.
    NeedsPassphrase,
}

impl Extractor {
    /// Creates an extractor for the given archive and output path.
    ///
    /// # Arguments
    /// * `source_file` - Path of the archive to unpack
    /// * `output` - Directory to unpack into. Unless
    ///   [`Extractor::set_output_is_dest`] is set, a top-level name
    ///   derived from the archive's base name may be nested inside it
    pub fn new(source_file: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            source_file: source_file.into(),
            output: output.into(),
            output_is_dest: false,
            delete_after_extraction: false,
            passphrase: None,
            notify_interval: Duration::from_micros(DEFAULT_NOTIFY_INTERVAL_US),
            cancel: Cancel::new(),
        }
    }

    /// Uses the output directory verbatim instead of deriving a single
    /// top-level output name from the archive's base name.
    pub fn set_output_is_dest(&mut self, output_is_dest: bool) -> &mut Self {
        self.output_is_dest = output_is_dest;
        self
    }

    /// Deletes the source archive after a successful extraction.
    /// Deletion is best-effort; failures are not fatal.
    pub fn set_delete_after_extraction(&mut self, delete: bool) -> &mut Self {
        self.delete_after_extraction = delete;
        self
    }

    /// Presets the passphrase used for encrypted archives.
    pub fn set_passphrase(&mut self, passphrase: impl Into<String>) -> &mut Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// Sets the minimum interval between progress events, in
    /// microseconds. Default is 100 000.
    pub fn set_notify_interval_us(&mut self, interval: u64) -> &mut Self {
        self.notify_interval = Duration::from_micros(interval);
        self
    }

    /// Returns a handle to this run's cancel token.
    pub fn cancel_token(&self) -> Cancel {
        self.cancel.clone()
    }

    /// Runs the extraction on the caller's thread. Events are delivered
    /// inline; exactly one terminal event is emitted.
    pub fn run(mut self, handler: &mut dyn EventHandler) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            handler.cancelled();
            return Err(Error::Cancelled);
        }
        match self.drive(handler) {
            Ok(()) => {
                handler.completed();
                Ok(())
            }
            Err(e) if e.is_cancelled() => {
                handler.cancelled();
                Err(Error::Cancelled)
            }
            Err(e) => {
                handler.error(&e);
                Err(e)
            }
        }
    }

    /// Runs the extraction on a worker thread. The returned receiver
    /// yields [`EngineEvent`] values to be pumped on the host's main
    /// thread; the terminal event is the last one.
    pub fn spawn(self) -> (std::thread::JoinHandle<()>, Receiver<EngineEvent>) {
        let (mut emitter, rx) = ChannelEmitter::new(self.cancel.clone());
        let handle = std::thread::spawn(move || {
            let _ = self.run(&mut emitter);
        });
        (handle, rx)
    }

    fn drive(&mut self, handler: &mut dyn EventHandler) -> Result<(), Error> {
        let source_basename = self
            .source_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source_file.to_string_lossy().into_owned());
        let suggested_destname = basename_remove_extension(&self.source_file);

        // Step 0: scan all entries, restarting once a passphrase is
        // obtained from the host.
        let scan = loop {
            match self.scan(&source_basename)? {
                ScanOutcome::Done(scan) => break scan,
                ScanOutcome::NeedsPassphrase => match handler.request_passphrase() {
                    Some(passphrase) => {
                        self.passphrase = Some(passphrase);
                        continue;
                    }
                    None => return Err(Error::PassphraseRequired),
                },
            }
        };
        debug!(total_files = scan.total_files, "extractor scan finished");
        handler.scanned(scan.total_files);
        self.cancel.check()?;

        // Step 1: set the destination from client preference or archive
        // contents.
        let mut prefix = scan.prefix.clone();
        let destination_dir = if self.output_is_dest {
            self.output.clone()
        } else if let Some(found) = &prefix {
            let prefix_name = found
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let prefix_name_no_ext = basename_remove_extension(found);
            if prefix_name == suggested_destname || prefix_name_no_ext == suggested_destname {
                // The archive is self-contained in a directory carrying
                // its own name.
                self.output.clone()
            } else {
                prefix = None;
                self.output.join(&suggested_destname)
            }
        } else {
            self.output.join(&suggested_destname)
        };

        // Step 2: let the host inspect and possibly replace the
        // destination.
        let entry_paths: Vec<PathBuf> = scan
            .files
            .iter()
            .map(|file| match file.strip_prefix(&self.output) {
                Ok(relative) => destination_dir.join(relative),
                Err(_) => file.clone(),
            })
            .collect();
        let proposed = prefix.clone().unwrap_or_else(|| destination_dir.clone());
        let reply = handler.decide_destination(&proposed, &entry_paths);

        let mut destination_dir = destination_dir;
        let mut new_prefix = None;
        if prefix.is_some() {
            new_prefix = reply;
        } else if let Some(replacement) = reply {
            destination_dir = replacement;
        }
        debug!(destination = %destination_dir.display(), "extractor destination decided");

        std::fs::create_dir_all(&destination_dir)
            .map_err(|e| Error::io_msg(e, "failed to create destination directory"))?;
        self.cancel.check()?;

        // Step 3: extract.
        let mut sanitizer = PathSanitizer::new(destination_dir.clone());
        if let (Some(old), Some(new)) = (prefix.clone(), new_prefix.clone()) {
            sanitizer.set_prefix_rewrite(old, new);
        }

        let mut codec = open_reader(
            &self.source_file,
            &source_basename,
            scan.mode,
            self.passphrase.as_deref(),
            &self.cancel,
        )?;

        let mut progress = Progress::new(handler, self.notify_interval);
        progress.counters.total_files = scan.total_files;
        progress.counters.total_size = scan.total_size;

        let mut pass = ExtractPass {
            cancel: self.cancel.clone(),
            destination: destination_dir,
            sanitizer,
            raw_mode: scan.mode == ReadMode::Raw,
            progress,
            dirs: Vec::new(),
            users: HashMap::new(),
            groups: HashMap::new(),
        };

        codec.for_each_entry(&mut |entry, reader| pass.process(entry, reader))?;

        // Step 4: re-apply directory attributes. Writing children
        // updated the parents' modification times.
        let dirs = std::mem::take(&mut pass.dirs);
        for (path, entry) in &dirs {
            self.cancel.check()?;
            pass.apply_metadata(path, entry);
        }

        // Step 5: force progress to 100% and dispose of the source.
        pass.progress.counters.completed_size = pass.progress.counters.total_size;
        pass.progress.counters.completed_files = pass.progress.counters.total_files;
        pass.progress.force_notify();

        if self.delete_after_extraction {
            debug!(source = %self.source_file.display(), "deleting extracted source");
            if let Err(e) = std::fs::remove_file(&self.source_file) {
                warn!(error = %e, "failed to delete the source archive");
            }
        }
        Ok(())
    }

    /// Scan pass: opens the archive (all-formats first, raw as the
    /// fallback), counts entries and sizes, collects the computed
    /// output paths and finds the common top-level.
    fn scan(&self, source_name: &str) -> Result<ScanOutcome, Error> {
        let (mut codec, mode) = match open_reader(
            &self.source_file,
            source_name,
            ReadMode::AllFormats,
            self.passphrase.as_deref(),
            &self.cancel,
        ) {
            Ok(codec) => (codec, ReadMode::AllFormats),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(Error::IncorrectPassphrase) => return Err(Error::IncorrectPassphrase),
            Err(_) => {
                let codec = open_reader(
                    &self.source_file,
                    source_name,
                    ReadMode::Raw,
                    self.passphrase.as_deref(),
                    &self.cancel,
                )?;
                // A raw stream with no filter would be a pointless
                // copy of the source file.
                if codec.filter_count() <= 1 {
                    return Err(Error::NotAnArchive(source_name.to_string()));
                }
                (codec, ReadMode::Raw)
            }
        };

        let mut total_files = 0u64;
        let mut total_size = 0u64;
        let mut files = Vec::new();
        let mut all_inside = true;
        let mut encrypted = false;

        codec.for_each_entry(&mut |entry, _reader| {
            self.cancel.check()?;
            if entry.encrypted && self.passphrase.is_none() {
                encrypted = true;
                return Ok(false);
            }
            let name = entry.pathname_path();
            match lexical_child(&self.output, &name) {
                Some(path) => files.push(path),
                None => {
                    all_inside = false;
                    files.push(match name.file_name() {
                        Some(base) => self.output.join(base),
                        None => self.output.clone(),
                    });
                }
            }
            total_files += 1;
            total_size += entry.size;
            // The body is left unread, so the codec skips it.
            Ok(true)
        })?;

        if encrypted {
            return Ok(ScanOutcome::NeedsPassphrase);
        }
        if files.is_empty() {
            return Err(Error::EmptyArchive(source_name.to_string()));
        }
        if total_size == 0 {
            total_size = u64::MAX;
        }

        let prefix = if all_inside {
            common_prefix(&files, &self.output)
        } else {
            None
        };
        if let Some(prefix) = &prefix {
            debug!(prefix = %prefix.display(), "extractor found common prefix");
        }

        Ok(ScanOutcome::Done(Scan {
            mode,
            total_files,
            total_size,
            files,
            prefix,
        }))
    }
}

/// State of the extract pass, one instance per run.
struct ExtractPass<'a> {
    cancel: Cancel,
    destination: PathBuf,
    sanitizer: PathSanitizer,
    raw_mode: bool,
    progress: Progress<'a>,
    /// Directories written so far, re-applied in step 4.
    dirs: Vec<(PathBuf, ArchiveEntry)>,
    /// Per-run caches of user and group name lookups.
    users: HashMap<String, Option<u32>>,
    groups: HashMap<String, Option<u32>>,
}

impl ExtractPass<'_> {
    fn process(&mut self, entry: &ArchiveEntry, reader: &mut dyn Read) -> Result<bool, Error> {
        self.cancel.check()?;

        let mut dest = self.sanitizer.sanitize(&entry.pathname);
        let hardlink = entry
            .hardlink
            .as_deref()
            .map(|raw| self.sanitizer.sanitize(raw));

        // Solve any name conflict before touching the filesystem.
        while file_conflict(&dest, entry.file_type) {
            match self.progress.handler.conflict(&dest) {
                ConflictAction::Overwrite => break,
                ConflictAction::ChangeDestination(new_dest) => {
                    dest = new_dest;
                }
                ConflictAction::Skip | ConflictAction::Unhandled => {
                    debug!(path = %dest.display(), "conflicting entry skipped");
                    return Ok(true);
                }
            }
        }

        self.write_entry(entry, reader, &dest, hardlink.as_deref())?;
        self.progress.file_done();
        Ok(true)
    }

    fn write_entry(
        &mut self,
        entry: &ArchiveEntry,
        reader: &mut dyn Read,
        dest: &Path,
        hardlink: Option<&Path>,
    ) -> Result<(), Error> {
        self.ensure_parents(dest)?;

        if let Some(link_target) = hardlink {
            match std::fs::hard_link(link_target, dest) {
                Ok(()) => {
                    debug!(target = %link_target.display(), dest = %dest.display(), "hard link");
                    self.apply_metadata(dest, entry);
                    return Ok(());
                }
                Err(e) => {
                    // Fall back to writing the entry as its underlying
                    // type.
                    warn!(
                        target = %link_target.display(),
                        error = %e,
                        "hard link failed"
                    );
                }
            }
        }

        match entry.file_type {
            FileType::Regular | FileType::Hardlink => {
                self.write_regular(entry, reader, dest)?;
                self.apply_metadata(dest, entry);
            }
            FileType::Directory => {
                self.write_directory(entry, dest)?;
            }
            FileType::Symlink => {
                self.write_symlink(entry, dest)?;
                self.apply_metadata(dest, entry);
            }
            FileType::Fifo | FileType::Socket | FileType::BlockDevice | FileType::CharDevice => {
                self.displace_existing_dir(dest)?;
                // Special files are unimportant in regular archives, so
                // failing to create one is not fatal.
                if let Err(e) = self.write_special(entry, dest) {
                    warn!(path = %dest.display(), error = %e, "special file creation failed");
                    if let Err(e) = std::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(dest)
                    {
                        warn!(path = %dest.display(), error = %e, "placeholder creation failed");
                    }
                }
                self.apply_metadata(dest, entry);
            }
        }
        Ok(())
    }

    /// Creates the missing parents of `dest` below the destination
    /// directory. An existing parent component that is not a real
    /// directory (a symlink in particular) refuses the entry, so no
    /// write can traverse outside the destination.
    fn ensure_parents(&self, dest: &Path) -> Result<(), Error> {
        let Some(parent) = dest.parent() else {
            return Ok(());
        };
        let Ok(relative) = parent.strip_prefix(&self.destination) else {
            return Ok(());
        };

        let mut current = self.destination.clone();
        for component in relative.components() {
            current.push(component);
            match std::fs::symlink_metadata(&current) {
                Ok(meta) if meta.is_dir() => continue,
                Ok(_) => {
                    return Err(Error::io_msg(
                        std::io::Error::new(
                            std::io::ErrorKind::NotADirectory,
                            "parent is not a directory",
                        ),
                        current.to_string_lossy().into_owned(),
                    ));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    std::fs::create_dir(&current)
                        .map_err(|e| Error::io_msg(e, current.to_string_lossy().into_owned()))?;
                }
                Err(e) => {
                    return Err(Error::io_msg(e, current.to_string_lossy().into_owned()));
                }
            }
        }
        Ok(())
    }

    /// A non-directory entry colliding with a directory may only take
    /// its place when the directory is empty; a populated directory
    /// fails the run.
    fn displace_existing_dir(&self, dest: &Path) -> Result<(), Error> {
        if let Ok(meta) = std::fs::symlink_metadata(dest) {
            if meta.is_dir() {
                let mut children = std::fs::read_dir(dest).map_err(Error::io)?;
                if children.next().is_some() {
                    return Err(Error::NotEmpty(dest.to_path_buf()));
                }
                std::fs::remove_dir(dest).map_err(Error::io)?;
            }
        }
        Ok(())
    }

    fn write_regular(
        &mut self,
        entry: &ArchiveEntry,
        reader: &mut dyn Read,
        dest: &Path,
    ) -> Result<(), Error> {
        self.displace_existing_dir(dest)?;
        if std::fs::symlink_metadata(dest).is_ok() {
            // Replace semantics without following an existing symlink
            // at the final component.
            std::fs::remove_file(dest)
                .map_err(|e| Error::io_msg(e, dest.to_string_lossy().into_owned()))?;
        }

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dest)
            .map_err(|e| Error::file_open(e, dest.to_string_lossy().into_owned()))?;

        if entry.size > 0 || self.raw_mode {
            use std::io::Write;

            let mut buffer = vec![0u8; BLOCK_SIZE];
            loop {
                self.cancel.check()?;
                let n = reader.read(&mut buffer).map_err(Error::io)?;
                if n == 0 {
                    break;
                }
                file.write_all(&buffer[..n])
                    .map_err(|e| Error::io_msg(e, dest.to_string_lossy().into_owned()))?;
                self.progress.add_size(n as u64);
            }
        }
        Ok(())
    }

    fn write_directory(&mut self, entry: &ArchiveEntry, dest: &Path) -> Result<(), Error> {
        match std::fs::create_dir(dest) {
            Ok(()) => {}
            // "File exists" is not fatal as long as the existing object
            // is a directory.
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let meta = std::fs::symlink_metadata(dest).map_err(Error::io)?;
                if !meta.is_dir() {
                    return Err(Error::io_msg(e, dest.to_string_lossy().into_owned()));
                }
            }
            Err(e) => return Err(Error::io_msg(e, dest.to_string_lossy().into_owned())),
        }
        self.dirs.push((dest.to_path_buf(), entry.clone()));
        Ok(())
    }

    fn write_symlink(&mut self, entry: &ArchiveEntry, dest: &Path) -> Result<(), Error> {
        self.displace_existing_dir(dest)?;
        let target = bytes_to_path(entry.symlink.as_deref().unwrap_or_default());

        #[cfg(unix)]
        {
            match std::os::unix::fs::symlink(&target, dest) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    // Atomically replace the existing object through a
                    // sibling link and a rename.
                    let staged = staging_name(dest);
                    std::os::unix::fs::symlink(&target, &staged)
                        .map_err(|e| Error::io_msg(e, staged.to_string_lossy().into_owned()))?;
                    std::fs::rename(&staged, dest)
                        .map_err(|e| Error::io_msg(e, dest.to_string_lossy().into_owned()))
                }
                Err(e) => Err(Error::io_msg(e, dest.to_string_lossy().into_owned())),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = target;
            warn!(path = %dest.display(), "symbolic links are not supported on this platform");
            Ok(())
        }
    }

    #[cfg(unix)]
    fn write_special(&mut self, entry: &ArchiveEntry, dest: &Path) -> Result<(), Error> {
        use nix::sys::stat::{Mode, SFlag, makedev, mknod};

        let mode = Mode::from_bits_truncate(entry.mode as _);
        match entry.file_type {
            FileType::Fifo => {
                nix::unistd::mkfifo(dest, mode)
                    .map_err(|e| Error::io(std::io::Error::from(e)))?;
            }
            FileType::Socket => {
                mknod(dest, SFlag::S_IFSOCK, mode, 0)
                    .map_err(|e| Error::io(std::io::Error::from(e)))?;
            }
            FileType::BlockDevice | FileType::CharDevice => {
                let kind = if entry.file_type == FileType::BlockDevice {
                    SFlag::S_IFBLK
                } else {
                    SFlag::S_IFCHR
                };
                let rdev = makedev(entry.rdev_major as u64, entry.rdev_minor as u64);
                mknod(dest, kind, mode, rdev).map_err(|e| Error::io(std::io::Error::from(e)))?;
            }
            _ => unreachable!("write_special called for a non-special entry"),
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn write_special(&mut self, _entry: &ArchiveEntry, _dest: &Path) -> Result<(), Error> {
        Err(Error::io(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "special files are not supported on this platform",
        )))
    }

    /// Applies timestamps, ownership and permission bits to a written
    /// object, without following symlinks. Failures are logged, never
    /// fatal.
    fn apply_metadata(&mut self, path: &Path, entry: &ArchiveEntry) {
        let is_symlink = entry.file_type == FileType::Symlink;

        let atime = entry.atime.or(entry.mtime);
        let mtime = entry.mtime.or(entry.atime);
        if let (Some(atime), Some(mtime)) = (atime, mtime) {
            let atime = FileTime::from_unix_time(atime.seconds, atime.nanos);
            let mtime = FileTime::from_unix_time(mtime.seconds, mtime.nanos);
            let result = if is_symlink {
                filetime::set_symlink_file_times(path, atime, mtime)
            } else {
                filetime::set_file_times(path, atime, mtime)
            };
            if let Err(e) = result {
                warn!(path = %path.display(), error = %e, "failed to set file times");
            }
        }

        #[cfg(unix)]
        {
            let uid = match &entry.uname {
                Some(uname) => Some(self.lookup_user(uname).unwrap_or(entry.uid as u32)),
                None => (entry.uid != 0).then_some(entry.uid as u32),
            };
            let gid = match &entry.gname {
                Some(gname) => Some(self.lookup_group(gname).unwrap_or(entry.gid as u32)),
                None => (entry.gid != 0).then_some(entry.gid as u32),
            };
            if uid.is_some() || gid.is_some() {
                if let Err(e) = std::os::unix::fs::lchown(path, uid, gid) {
                    debug!(path = %path.display(), error = %e, "failed to change ownership");
                }
            }

            if !is_symlink {
                use std::os::unix::fs::PermissionsExt;

                let permissions = std::fs::Permissions::from_mode(entry.mode);
                if let Err(e) = std::fs::set_permissions(path, permissions) {
                    warn!(path = %path.display(), error = %e, "failed to set permissions");
                }
            }
        }
    }

    #[cfg(unix)]
    fn lookup_user(&mut self, name: &str) -> Option<u32> {
        *self.users.entry(name.to_string()).or_insert_with(|| {
            nix::unistd::User::from_name(name)
                .ok()
                .flatten()
                .map(|user| user.uid.as_raw())
        })
    }

    #[cfg(unix)]
    fn lookup_group(&mut self, name: &str) -> Option<u32> {
        *self.groups.entry(name.to_string()).or_insert_with(|| {
            nix::unistd::Group::from_name(name)
                .ok()
                .flatten()
                .map(|group| group.gid.as_raw())
        })
    }
}

/// A conflict exists when the computed path already exists and the
/// entry is not a directory. Directory entries merge with whatever is
/// there; the mkdir call sorts out the rest.
fn file_conflict(path: &Path, file_type: FileType) -> bool {
    if !file_type.conflicts_with_existing() {
        return false;
    }
    std::fs::symlink_metadata(path).is_ok()
}

/// Sibling path used to stage an atomic symlink replacement.
#[cfg(unix)]
fn staging_name(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".autoarc-staged");
    dest.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directories_never_conflict() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!file_conflict(dir.path(), FileType::Directory));
        assert!(file_conflict(dir.path(), FileType::Regular));
        assert!(!file_conflict(&dir.path().join("absent"), FileType::Regular));
    }

    #[cfg(unix)]
    #[test]
    fn parent_chain_refuses_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let dest_root = dir.path().join("dest");
        std::fs::create_dir(&dest_root).unwrap();
        std::os::unix::fs::symlink("/tmp", dest_root.join("link")).unwrap();

        struct Quiet;
        impl EventHandler for Quiet {}
        let mut handler = Quiet;
        let pass = ExtractPass {
            cancel: Cancel::new(),
            destination: dest_root.clone(),
            sanitizer: PathSanitizer::new(dest_root.clone()),
            raw_mode: false,
            progress: Progress::new(&mut handler, Duration::from_micros(0)),
            dirs: Vec::new(),
            users: HashMap::new(),
            groups: HashMap::new(),
        };

        let err = pass
            .ensure_parents(&dest_root.join("link/escape.txt"))
            .unwrap_err();
        assert_eq!(err.io_kind(), Some(std::io::ErrorKind::NotADirectory));

        // A plain nested parent is created on demand.
        pass.ensure_parents(&dest_root.join("a/b/file.txt")).unwrap();
        assert!(dest_root.join("a/b").is_dir());
    }
}
