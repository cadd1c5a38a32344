//! The compression engine.
//!
//! A [`Compressor`] packs an ordered list of filesystem entries into a
//! single new archive. It is single-use: create it with its inputs,
//! start it synchronously with [`Compressor::run`] or on a worker
//! thread with [`Compressor::spawn`], and observe exactly one terminal
//! event.

use std::{
    collections::HashMap,
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    time::Duration,
};

use crossbeam_channel::Receiver;
use tracing::debug;

use crate::{
    ArchiveEntry, Cancel, Error, FileType, Filter, Format,
    codec::{EntryWrite, write::open_writer},
    entry::path_bytes,
    event::{ChannelEmitter, EngineEvent, EventHandler, Progress},
    format,
    util::basename_remove_extension,
};

const DEFAULT_NOTIFY_INTERVAL_US: u64 = 100_000;

/// Packs a set of filesystem entries into a new archive.
///
/// # Example
///
/// ```no_run
/// use autoarc::{Compressor, EventHandler, Filter, Format};
///
/// struct Quiet;
/// impl EventHandler for Quiet {}
///
/// let compressor = Compressor::new(
///     vec!["/home/me/documents".into()],
///     "/home/me",
///     Format::Tar,
///     Filter::Gzip,
/// );
/// compressor.run(&mut Quiet).unwrap();
/// ```
pub struct Compressor {
    source_files: Vec<PathBuf>,
    output: PathBuf,
    format: Format,
    filter: Filter,
    create_top_level_directory: bool,
    output_is_dest: bool,
    passphrase: Option<String>,
    notify_interval: Duration,
    cancel: Cancel,
}

impl Compressor {
    /// Creates a compressor for the given sources and output.
    ///
    /// # Arguments
    /// * `source_files` - Filesystem entries to archive, in order. Must not be empty
    /// * `output` - Directory the archive is created in, or the exact
    ///   archive path when `output_is_dest` is set
    /// * `format` - Container format of the archive
    /// * `filter` - Compression filter applied over the format
    pub fn new(
        source_files: Vec<PathBuf>,
        output: impl Into<PathBuf>,
        format: Format,
        filter: Filter,
    ) -> Self {
        assert!(!source_files.is_empty(), "at least one source is required");
        Self {
            source_files,
            output: output.into(),
            format,
            filter,
            create_top_level_directory: false,
            output_is_dest: false,
            passphrase: None,
            notify_interval: Duration::from_micros(DEFAULT_NOTIFY_INTERVAL_US),
            cancel: Cancel::new(),
        }
    }

    /// Wraps the archived entries in a top-level directory named after
    /// the first source.
    pub fn set_create_top_level_directory(&mut self, create: bool) -> &mut Self {
        self.create_top_level_directory = create;
        self
    }

    /// Uses the output path verbatim as the archive path instead of
    /// deriving a file name inside it.
    pub fn set_output_is_dest(&mut self, output_is_dest: bool) -> &mut Self {
        self.output_is_dest = output_is_dest;
        self
    }

    /// Encrypts entry contents with the given passphrase, for formats
    /// that support it.
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

    /// Runs the compression on the caller's thread. Events are
    /// delivered inline; exactly one terminal event is emitted.
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

    /// Runs the compression on a worker thread. The returned receiver
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
        let archive_path = self.decide_archive_path()?;
        debug!(path = %archive_path.display(), "compressor destination decided");
        handler.decide_destination(&archive_path, &[]);

        let mut codec = open_writer(
            &archive_path,
            self.format,
            self.filter,
            self.passphrase.as_deref(),
            &self.cancel,
        )?;

        let mut progress = Progress::new(handler, self.notify_interval);
        let mut walk = Walk {
            format: self.format,
            cancel: self.cancel.clone(),
            hardlinks: HashMap::new(),
            names: NameCache::default(),
        };

        let top_level = self
            .create_top_level_directory
            .then(|| basename_remove_extension(&self.source_files[0]));

        for source in &self.source_files {
            self.cancel.check()?;
            let name = self.root_entry_name(source, top_level.as_deref());
            walk.add_path(source, &name, codec.as_mut(), &mut progress)?;
        }

        codec.finish()?;

        progress.counters.completed_size = progress.counters.total_size;
        progress.counters.completed_files = progress.counters.total_files;
        progress.force_notify();
        Ok(())
    }

    fn decide_archive_path(&self) -> Result<PathBuf, Error> {
        if self.output_is_dest {
            if let Some(parent) = self.output.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::io_msg(e, "failed to create output directory"))?;
            }
            return Ok(self.output.clone());
        }

        std::fs::create_dir_all(&self.output)
            .map_err(|e| Error::io_msg(e, "failed to create output directory"))?;

        let base = basename_remove_extension(&self.source_files[0]);
        let extension = format::extension(self.format, self.filter);
        let mut candidate = self.output.join(format!("{base}{extension}"));
        let mut counter = 1;
        while candidate.exists() {
            candidate = self.output.join(format!("{base}({counter}){extension}"));
            counter += 1;
        }
        Ok(candidate)
    }

    /// The archive pathname of a source root. Ar dialects cannot store
    /// directories, so they always get the bare basename.
    fn root_entry_name(&self, source: &Path, top_level: Option<&str>) -> Vec<u8> {
        let basename = source
            .file_name()
            .map(path_bytes_of_os)
            .unwrap_or_else(|| path_bytes(source));
        if self.format.is_ar() {
            return basename;
        }
        match top_level {
            Some(top) => {
                let mut name = top.as_bytes().to_vec();
                name.push(b'/');
                name.extend_from_slice(&basename);
                name
            }
            None => basename,
        }
    }
}

fn path_bytes_of_os(name: &std::ffi::OsStr) -> Vec<u8> {
    path_bytes(Path::new(name))
}

/// Wraps a source file so that body streaming updates the counters and
/// stays cancellable between blocks.
struct CountingReader<'a, 'b> {
    inner: File,
    progress: &'a mut Progress<'b>,
    cancel: Cancel,
}

impl Read for CountingReader<'_, '_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(Cancel::io_error());
        }
        let n = self.inner.read(buf)?;
        self.progress.add_size(n as u64);
        Ok(n)
    }
}

struct Walk {
    format: Format,
    cancel: Cancel,
    /// First archived pathname per (device, inode), for hardlink
    /// coalescing.
    hardlinks: HashMap<(u64, u64), Vec<u8>>,
    names: NameCache,
}

impl Walk {
    fn add_path(
        &mut self,
        path: &Path,
        name: &[u8],
        codec: &mut dyn EntryWrite,
        progress: &mut Progress<'_>,
    ) -> Result<(), Error> {
        self.cancel.check()?;
        debug!(path = %path.display(), "compressor walking");

        let mut entry = ArchiveEntry::from_path(path, name)
            .map_err(|e| Error::io_msg(e, path.to_string_lossy().into_owned()))?;

        if self.format.is_ar() && entry.file_type != FileType::Regular {
            return Err(Error::codec(
                "ar archives can only store regular files",
                entry.pathname_lossy(),
            ));
        }
        if self.format == Format::Zip && entry.is_special() {
            return Err(Error::codec(
                "zip archives cannot store special files",
                entry.pathname_lossy(),
            ));
        }

        self.names.fill(&mut entry);
        progress.counters.total_files += 1;
        progress.counters.total_size += entry.size;
        self.coalesce_hardlink(path, &mut entry, progress)?;

        if entry.file_type == FileType::Regular && entry.size > 0 {
            let file = File::open(path)
                .map_err(|e| Error::file_open(e, path.to_string_lossy().into_owned()))?;
            let mut reader = CountingReader {
                inner: file,
                progress: &mut *progress,
                cancel: self.cancel.clone(),
            };
            codec.write_entry(&entry, Some(&mut reader))?;
        } else {
            codec.write_entry(&entry, None)?;
        }
        progress.file_done();

        if entry.file_type == FileType::Directory {
            let children = std::fs::read_dir(path)
                .map_err(|e| Error::io_msg(e, path.to_string_lossy().into_owned()))?;
            for child in children {
                let child = child.map_err(Error::io)?;
                let mut child_name = name.to_vec();
                child_name.push(b'/');
                child_name.extend_from_slice(&path_bytes_of_os(&child.file_name()));
                self.add_path(&child.path(), &child_name, codec, progress)?;
            }
        }

        Ok(())
    }

    /// Rewrites a regular entry whose inode was archived before into a
    /// hardlink referencing the first occurrence. The unwritten body
    /// still advances the completed counter so progress stays
    /// consistent. Zip has no hardlink notion, so every occurrence
    /// keeps its body there.
    fn coalesce_hardlink(
        &mut self,
        path: &Path,
        entry: &mut ArchiveEntry,
        progress: &mut Progress<'_>,
    ) -> Result<(), Error> {
        if entry.file_type != FileType::Regular || entry.nlink <= 1 || !self.format.is_tar() {
            return Ok(());
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;

            let meta = std::fs::symlink_metadata(path).map_err(Error::io)?;
            let key = (meta.dev(), meta.ino());
            match self.hardlinks.get(&key) {
                Some(first) => {
                    debug!(path = %path.display(), "hardlink coalesced");
                    entry.file_type = FileType::Hardlink;
                    entry.hardlink = Some(first.clone());
                    progress.add_size(entry.size);
                    entry.size = 0;
                }
                None => {
                    self.hardlinks.insert(key, entry.pathname.clone());
                }
            }
        }
        Ok(())
    }
}

/// Per-run cache of uid and gid to name lookups.
#[derive(Default)]
struct NameCache {
    #[cfg(unix)]
    users: HashMap<u32, Option<String>>,
    #[cfg(unix)]
    groups: HashMap<u32, Option<String>>,
}

impl NameCache {
    #[cfg(unix)]
    fn fill(&mut self, entry: &mut ArchiveEntry) {
        let uid = entry.uid as u32;
        entry.uname = self
            .users
            .entry(uid)
            .or_insert_with(|| {
                nix::unistd::User::from_uid(nix::unistd::Uid::from_raw(uid))
                    .ok()
                    .flatten()
                    .map(|user| user.name)
            })
            .clone();

        let gid = entry.gid as u32;
        entry.gname = self
            .groups
            .entry(gid)
            .or_insert_with(|| {
                nix::unistd::Group::from_gid(nix::unistd::Gid::from_raw(gid))
                    .ok()
                    .flatten()
                    .map(|group| group.name)
            })
            .clone();
    }

    #[cfg(not(unix))]
    fn fill(&mut self, _entry: &mut ArchiveEntry) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "at least one source is required")]
    fn empty_source_list_is_refused() {
        let _ = Compressor::new(Vec::new(), "/tmp", Format::Tar, Filter::None);
    }

    #[test]
    fn derived_archive_name_avoids_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("notes.txt");
        std::fs::write(&source, b"notes").unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();
        std::fs::write(out.join("notes.tar.gz"), b"taken").unwrap();
        std::fs::write(out.join("notes(1).tar.gz"), b"also taken").unwrap();

        let compressor = Compressor::new(vec![source], &out, Format::Tar, Filter::Gzip);
        let path = compressor.decide_archive_path().unwrap();
        assert_eq!(path, out.join("notes(2).tar.gz"));
    }

    #[test]
    fn root_entry_name_honors_top_level_and_ar() {
        let tar = Compressor::new(
            vec![PathBuf::from("/data/project")],
            "/out",
            Format::Tar,
            Filter::None,
        );
        assert_eq!(
            tar.root_entry_name(Path::new("/data/project"), Some("project")),
            b"project/project".to_vec()
        );
        assert_eq!(
            tar.root_entry_name(Path::new("/data/project"), None),
            b"project".to_vec()
        );

        let ar = Compressor::new(
            vec![PathBuf::from("/data/lib.o")],
            "/out",
            Format::ArBsd,
            Filter::None,
        );
        assert_eq!(
            ar.root_entry_name(Path::new("/data/lib.o"), Some("ignored")),
            b"lib.o".to_vec()
        );
    }
}
