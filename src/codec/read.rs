//! Built-in read codecs: zip, the tar dialects behind an optional
//! decompression filter, and the raw single-stream mode.

use std::{
    fs::File,
    io::{BufReader, Read, Seek, SeekFrom},
    path::Path,
};

use crate::{
    ArchiveEntry, Cancel, EntryTime, Error, FileType, Filter,
    codec::{EntryRead, ReadMode},
    util::basename_remove_extension,
};

const BLOCK_SIZE: usize = 64 * 1024;
const TAR_HEADER_LEN: usize = 512;

/// Shared state of the read-side codec callbacks: the input byte
/// stream, the cancel flag and a sticky error slot. Every read and
/// seek consults cancel and sticky first; the first IO failure is
/// latched and short-circuits everything after it.
pub(crate) struct ReadSource {
    inner: BufReader<File>,
    cancel: Cancel,
    failed: Option<std::io::ErrorKind>,
}

impl ReadSource {
    pub(crate) fn open(path: &Path, cancel: Cancel) -> std::io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            inner: BufReader::with_capacity(BLOCK_SIZE, file),
            cancel,
            failed: None,
        })
    }

    fn gate(&self) -> std::io::Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Cancel::io_error());
        }
        if let Some(kind) = self.failed {
            return Err(std::io::Error::new(kind, "input stream already failed"));
        }
        Ok(())
    }

    fn latch<T>(&mut self, result: std::io::Result<T>) -> std::io::Result<T> {
        if let Err(e) = &result {
            if self.failed.is_none() && e.kind() != std::io::ErrorKind::Interrupted {
                self.failed = Some(e.kind());
            }
        }
        result
    }
}

impl Read for ReadSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.gate()?;
        let result = self.inner.read(buf);
        self.latch(result)
    }
}

impl Seek for ReadSource {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.gate()?;
        let result = self.inner.seek(pos);
        self.latch(result)
    }
}

fn is_zip_magic(head: &[u8]) -> bool {
    head.len() >= 4
        && head[0] == b'P'
        && head[1] == b'K'
        && matches!((head[2], head[3]), (3, 4) | (5, 6) | (7, 8))
}

/// Detects a compression filter the built-in codec can decode from the
/// stream's magic bytes.
fn detect_filter(head: &[u8]) -> Option<Filter> {
    if head.len() < 6 {
        return None;
    }
    if head[0] == 0x1F && head[1] == 0x8B {
        return Some(Filter::Gzip);
    }
    #[cfg(feature = "bzip2")]
    if &head[0..3] == b"BZh" && head[3].is_ascii_digit() {
        return Some(Filter::Bzip2);
    }
    #[cfg(feature = "xz")]
    {
        if &head[0..6] == &[0xFD, b'7', b'z', b'X', b'Z', 0x00] {
            return Some(Filter::Xz);
        }
        // lzma-alone has no magic; the usual properties byte plus a
        // little-endian power-of-two dictionary size is close enough.
        if head[0] == 0x5D && head[1] == 0x00 {
            return Some(Filter::Lzma);
        }
    }
    None
}

/// Checks whether a 512-byte block is a plausible tar header: the
/// ustar/gnu magic, a validating v7 checksum, or an all-zero block
/// (the leading block of an empty tar archive).
fn looks_like_tar(block: &[u8]) -> bool {
    if block.len() < TAR_HEADER_LEN {
        return false;
    }
    if &block[257..262] == b"ustar" {
        return true;
    }
    if block[..TAR_HEADER_LEN].iter().all(|&b| b == 0) {
        return true;
    }

    let stored = parse_octal(&block[148..156]);
    let mut sum: u64 = 0;
    for (i, &b) in block[..TAR_HEADER_LEN].iter().enumerate() {
        sum += if (148..156).contains(&i) { b' ' as u64 } else { b as u64 };
    }
    stored == Some(sum)
}

fn parse_octal(field: &[u8]) -> Option<u64> {
    let mut value: u64 = 0;
    let mut seen = false;
    for &b in field {
        match b {
            b'0'..=b'7' => {
                value = value * 8 + (b - b'0') as u64;
                seen = true;
            }
            b' ' | 0 => {
                if seen {
                    break;
                }
            }
            _ => return None,
        }
    }
    seen.then_some(value)
}

fn filter_reader(filter: Filter, source: ReadSource) -> Result<Box<dyn Read>, Error> {
    match filter {
        Filter::None => Ok(Box::new(source)),
        Filter::Gzip => Ok(Box::new(flate2::read::GzDecoder::new(source))),
        #[cfg(feature = "bzip2")]
        Filter::Bzip2 => Ok(Box::new(bzip2::read::BzDecoder::new(source))),
        #[cfg(feature = "xz")]
        Filter::Xz => Ok(Box::new(xz2::read::XzDecoder::new(source))),
        #[cfg(feature = "xz")]
        Filter::Lzma => {
            let stream = xz2::stream::Stream::new_lzma_decoder(u64::MAX)
                .map_err(|e| Error::codec(e.to_string(), ""))?;
            Ok(Box::new(xz2::read::XzDecoder::new_stream(source, stream)))
        }
        other => Err(Error::UnsupportedFilter(other)),
    }
}

fn read_up_to(reader: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

fn map_zip_error(error: zip::result::ZipError, source_name: &str) -> Error {
    match error {
        zip::result::ZipError::InvalidPassword => Error::IncorrectPassphrase,
        zip::result::ZipError::Io(e) => Error::io(e),
        other => Error::codec(other.to_string(), source_name),
    }
}

/// Opens a read codec over `source`.
///
/// In [`ReadMode::AllFormats`] the container is recognized from its
/// magic bytes; unrecognized input fails so the caller can retry in
/// [`ReadMode::Raw`], which always succeeds and presents the stream as
/// a single pseudo-entry named after the source file.
pub(crate) fn open_reader(
    source: &Path,
    source_name: &str,
    mode: ReadMode,
    passphrase: Option<&str>,
    cancel: &Cancel,
) -> Result<Box<dyn EntryRead>, Error> {
    let mut src = ReadSource::open(source, cancel.clone())
        .map_err(|e| Error::file_open(e, source_name.to_string()))?;

    let mut head = [0u8; TAR_HEADER_LEN];
    let head_len = read_up_to(&mut src, &mut head).map_err(Error::io)?;
    src.seek(SeekFrom::Start(0)).map_err(Error::io)?;
    let head = &head[..head_len];

    match mode {
        ReadMode::AllFormats => {
            if is_zip_magic(head) {
                let archive = zip::ZipArchive::new(src)
                    .map_err(|e| map_zip_error(e, source_name))?;
                return Ok(Box::new(ZipReadCodec {
                    archive,
                    passphrase: passphrase.map(str::to_string),
                    source_name: source_name.to_string(),
                }));
            }

            match detect_filter(head) {
                None => {
                    if looks_like_tar(head) {
                        Ok(Box::new(TarReadCodec::new(Box::new(src), 1, source_name)))
                    } else {
                        Err(Error::codec("unrecognized archive format", source_name))
                    }
                }
                Some(filter) => {
                    let mut decoded = filter_reader(filter, src)?;
                    let mut inner_head = vec![0u8; TAR_HEADER_LEN];
                    let inner_len = read_up_to(decoded.as_mut(), &mut inner_head)
                        .map_err(|e| Error::io_msg(e, source_name.to_string()))?;
                    inner_head.truncate(inner_len);
                    if looks_like_tar(&inner_head) {
                        let chained = Box::new(std::io::Cursor::new(inner_head).chain(decoded));
                        Ok(Box::new(TarReadCodec::new(chained, 2, source_name)))
                    } else {
                        Err(Error::codec("unrecognized archive format", source_name))
                    }
                }
            }
        }
        ReadMode::Raw => {
            let (reader, filters): (Box<dyn Read>, u32) = match detect_filter(head) {
                Some(filter) => (filter_reader(filter, src)?, 2),
                None => (Box::new(src), 1),
            };
            let pathname = basename_remove_extension(source).into_bytes();
            Ok(Box::new(RawReadCodec {
                entry: ArchiveEntry::new(pathname, FileType::Regular),
                reader,
                filters,
            }))
        }
    }
}

struct TarReadCodec {
    archive: tar::Archive<Box<dyn Read>>,
    filters: u32,
    source_name: String,
}

impl TarReadCodec {
    fn new(reader: Box<dyn Read>, filters: u32, source_name: &str) -> Self {
        Self {
            archive: tar::Archive::new(reader),
            filters,
            source_name: source_name.to_string(),
        }
    }
}

impl EntryRead for TarReadCodec {
    fn for_each_entry(
        &mut self,
        f: &mut dyn FnMut(&ArchiveEntry, &mut dyn Read) -> Result<bool, Error>,
    ) -> Result<(), Error> {
        let source_name = self.source_name.clone();
        let entries = self
            .archive
            .entries()
            .map_err(|e| Error::codec(e.to_string(), &source_name))?;

        for entry in entries {
            let mut entry = entry.map_err(|e| {
                if e.kind() == std::io::ErrorKind::Interrupted {
                    Error::io(e)
                } else {
                    Error::codec(e.to_string(), &source_name)
                }
            })?;
            let Some(meta) = tar_entry_meta(&entry) else {
                // Extension records the tar reader already folded into
                // the surrounding entries.
                continue;
            };
            if !f(&meta, &mut entry)? {
                return Ok(());
            }
        }
        Ok(())
    }

    fn filter_count(&self) -> u32 {
        self.filters
    }
}

fn tar_entry_meta(entry: &tar::Entry<'_, Box<dyn Read>>) -> Option<ArchiveEntry> {
    let header = entry.header();
    let kind = header.entry_type();

    let file_type = if kind.is_hard_link() {
        FileType::Hardlink
    } else if kind.is_symlink() {
        FileType::Symlink
    } else if kind.is_dir() {
        FileType::Directory
    } else if kind.is_fifo() {
        FileType::Fifo
    } else if kind.is_block_special() {
        FileType::BlockDevice
    } else if kind.is_character_special() {
        FileType::CharDevice
    } else if kind.is_file() || kind.is_contiguous() {
        FileType::Regular
    } else {
        return None;
    };

    let mut meta = ArchiveEntry::new(entry.path_bytes().into_owned(), file_type);

    let link_bytes = entry.link_name_bytes().map(|bytes| bytes.into_owned());
    match file_type {
        FileType::Hardlink => meta.hardlink = link_bytes,
        FileType::Symlink => meta.symlink = link_bytes,
        _ => {}
    }

    if file_type == FileType::Regular {
        meta.size = header.size().unwrap_or(0);
    }
    meta.mode = header.mode().unwrap_or(0);
    meta.uid = header.uid().unwrap_or(0);
    meta.gid = header.gid().unwrap_or(0);
    meta.uname = header
        .username()
        .ok()
        .flatten()
        .filter(|name| !name.is_empty())
        .map(str::to_string);
    meta.gname = header
        .groupname()
        .ok()
        .flatten()
        .filter(|name| !name.is_empty())
        .map(str::to_string);
    meta.rdev_major = header.device_major().ok().flatten().unwrap_or(0);
    meta.rdev_minor = header.device_minor().ok().flatten().unwrap_or(0);
    if let Ok(mtime) = header.mtime() {
        meta.mtime = Some(EntryTime::from_seconds(mtime as i64));
    }
    if let Some(gnu) = header.as_gnu() {
        if let Ok(atime) = gnu.atime() {
            if atime != 0 {
                meta.atime = Some(EntryTime::from_seconds(atime as i64));
            }
        }
        if let Ok(ctime) = gnu.ctime() {
            if ctime != 0 {
                meta.ctime = Some(EntryTime::from_seconds(ctime as i64));
            }
        }
    }

    Some(meta)
}

struct ZipReadCodec {
    archive: zip::ZipArchive<ReadSource>,
    passphrase: Option<String>,
    source_name: String,
}

impl EntryRead for ZipReadCodec {
    fn for_each_entry(
        &mut self,
        f: &mut dyn FnMut(&ArchiveEntry, &mut dyn Read) -> Result<bool, Error>,
    ) -> Result<(), Error> {
        for index in 0..self.archive.len() {
            let mut meta = {
                let raw = self
                    .archive
                    .by_index_raw(index)
                    .map_err(|e| map_zip_error(e, &self.source_name))?;

                let mode = raw.unix_mode().unwrap_or(0);
                let file_type = if raw.is_dir() {
                    FileType::Directory
                } else if mode & 0o170000 == 0o120000 {
                    FileType::Symlink
                } else {
                    FileType::Regular
                };

                let mut meta = ArchiveEntry::new(raw.name_raw().to_vec(), file_type);
                if file_type == FileType::Regular {
                    meta.size = raw.size();
                }
                meta.mode = mode & 0o7777;
                meta.encrypted = raw.encrypted();
                if let Some(datetime) = raw.last_modified() {
                    if let Ok(datetime) = chrono::NaiveDateTime::try_from(datetime) {
                        meta.mtime = Some(EntryTime::from_seconds(datetime.and_utc().timestamp()));
                    }
                }
                meta
            };

            if meta.encrypted && self.passphrase.is_none() {
                // Cannot open the body without a passphrase; the scan
                // pass aborts on the flag before reading any data.
                if !f(&meta, &mut std::io::empty())? {
                    return Ok(());
                }
                continue;
            }

            let mut file = match &self.passphrase {
                Some(passphrase) if meta.encrypted => self
                    .archive
                    .by_index_decrypt(index, passphrase.as_bytes())
                    .map_err(|e| map_zip_error(e, &self.source_name))?,
                _ => self
                    .archive
                    .by_index(index)
                    .map_err(|e| map_zip_error(e, &self.source_name))?,
            };

            let keep_going = if meta.file_type == FileType::Symlink {
                // Zip stores the symlink target as the entry body.
                let mut target = Vec::new();
                file.read_to_end(&mut target)
                    .map_err(|e| map_zip_error(zip::result::ZipError::Io(e), &self.source_name))?;
                meta.symlink = Some(target);
                f(&meta, &mut std::io::empty())?
            } else {
                f(&meta, &mut file)?
            };
            if !keep_going {
                return Ok(());
            }
        }
        Ok(())
    }

    fn filter_count(&self) -> u32 {
        1
    }
}

struct RawReadCodec {
    entry: ArchiveEntry,
    reader: Box<dyn Read>,
    filters: u32,
}

impl EntryRead for RawReadCodec {
    fn for_each_entry(
        &mut self,
        f: &mut dyn FnMut(&ArchiveEntry, &mut dyn Read) -> Result<bool, Error>,
    ) -> Result<(), Error> {
        f(&self.entry, &mut self.reader)?;
        Ok(())
    }

    fn filter_count(&self) -> u32 {
        self.filters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zip_magic_is_recognized() {
        assert!(is_zip_magic(b"PK\x03\x04rest"));
        assert!(is_zip_magic(b"PK\x05\x06\0\0"));
        assert!(!is_zip_magic(b"PKXY"));
        assert!(!is_zip_magic(b"\x1f\x8b\x08\0"));
    }

    #[test]
    fn filter_magics_are_recognized() {
        assert_eq!(detect_filter(b"\x1f\x8b\x08\0\0\0"), Some(Filter::Gzip));
        #[cfg(feature = "bzip2")]
        assert_eq!(detect_filter(b"BZh91AY"), Some(Filter::Bzip2));
        #[cfg(feature = "xz")]
        assert_eq!(detect_filter(b"\xfd7zXZ\x00"), Some(Filter::Xz));
        assert_eq!(detect_filter(b"plain text"), None);
        assert_eq!(detect_filter(b"PK\x03\x04\0\0"), None);
    }

    #[test]
    fn tar_header_is_recognized() {
        let mut block = [0u8; 512];
        block[257..262].copy_from_slice(b"ustar");
        assert!(looks_like_tar(&block));

        // All-zero leading block of an empty tar.
        assert!(looks_like_tar(&[0u8; 512]));

        let mut garbage = [b'x'; 512];
        garbage[0] = b'y';
        assert!(!looks_like_tar(&garbage));
        assert!(!looks_like_tar(b"short"));
    }

    #[test]
    fn v7_checksum_validates() {
        let mut block = [0u8; 512];
        block[0..4].copy_from_slice(b"name");
        // Checksum field is treated as spaces while summing.
        let mut sum: u64 = 0;
        for (i, &b) in block.iter().enumerate() {
            sum += if (148..156).contains(&i) { b' ' as u64 } else { b as u64 };
        }
        let rendered = format!("{sum:06o}\0 ");
        block[148..156].copy_from_slice(rendered.as_bytes());
        assert!(looks_like_tar(&block));
    }

    #[test]
    fn octal_fields_parse() {
        assert_eq!(parse_octal(b"000644 \0"), Some(0o644));
        assert_eq!(parse_octal(b"        "), None);
        assert_eq!(parse_octal(b"bogus"), None);
    }
}
