//! Built-in write codecs: the tar dialects behind an optional
//! compression filter, and zip.

use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};

use tracing::warn;

use crate::{
    ArchiveEntry, Cancel, Error, FileType, Filter, Format,
    codec::EntryWrite,
    util::display_name,
};

/// Bound on consecutive zero-length writes the sink tolerates per
/// chunk before declaring failure.
const MAX_ZERO_WRITES: u32 = 5;

/// Shared state of the write-side codec callbacks: the output byte
/// stream, the cancel flag and a sticky error slot. Creation fails if
/// the output file already exists.
#[derive(Debug)]
pub(crate) struct WriteSink {
    inner: File,
    cancel: Cancel,
    failed: Option<std::io::ErrorKind>,
}

impl WriteSink {
    pub(crate) fn create(path: &Path, cancel: Cancel) -> std::io::Result<Self> {
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        Ok(Self {
            inner: file,
            cancel,
            failed: None,
        })
    }

    fn gate(&self) -> std::io::Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Cancel::io_error());
        }
        if let Some(kind) = self.failed {
            return Err(std::io::Error::new(kind, "output stream already failed"));
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

impl Write for WriteSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.gate()?;
        if buf.is_empty() {
            return Ok(0);
        }
        let mut zero_writes = 0;
        loop {
            let result = self.inner.write(buf);
            match self.latch(result) {
                Ok(0) => {
                    zero_writes += 1;
                    if zero_writes >= MAX_ZERO_WRITES {
                        self.failed = Some(std::io::ErrorKind::WriteZero);
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::WriteZero,
                            "output stream accepted no data",
                        ));
                    }
                }
                other => return other,
            }
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.gate()?;
        let result = self.inner.flush();
        self.latch(result)
    }
}

impl Seek for WriteSink {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.gate()?;
        let result = self.inner.seek(pos);
        self.latch(result)
    }
}

/// Compression layer over the output sink. An enum rather than a trait
/// object so the concrete encoder can be finished and the sink
/// recovered for the final flush.
enum FilterEncoder {
    Plain(WriteSink),
    Gzip(flate2::write::GzEncoder<WriteSink>),
    #[cfg(feature = "bzip2")]
    Bzip2(bzip2::write::BzEncoder<WriteSink>),
    #[cfg(feature = "xz")]
    Xz(xz2::write::XzEncoder<WriteSink>),
}

impl FilterEncoder {
    fn new(filter: Filter, sink: WriteSink) -> Result<Self, Error> {
        match filter {
            Filter::None => Ok(Self::Plain(sink)),
            Filter::Gzip => Ok(Self::Gzip(flate2::write::GzEncoder::new(
                sink,
                flate2::Compression::default(),
            ))),
            #[cfg(feature = "bzip2")]
            Filter::Bzip2 => Ok(Self::Bzip2(bzip2::write::BzEncoder::new(
                sink,
                bzip2::Compression::new(6),
            ))),
            #[cfg(feature = "xz")]
            Filter::Xz => Ok(Self::Xz(xz2::write::XzEncoder::new(sink, 6))),
            #[cfg(feature = "xz")]
            Filter::Lzma => {
                let options = xz2::stream::LzmaOptions::new_preset(6)
                    .map_err(|e| Error::codec(e.to_string(), ""))?;
                let stream = xz2::stream::Stream::new_lzma_encoder(&options)
                    .map_err(|e| Error::codec(e.to_string(), ""))?;
                Ok(Self::Xz(xz2::write::XzEncoder::new_stream(sink, stream)))
            }
            other => Err(Error::UnsupportedFilter(other)),
        }
    }

    fn finish(self) -> std::io::Result<WriteSink> {
        match self {
            Self::Plain(sink) => Ok(sink),
            Self::Gzip(encoder) => encoder.finish(),
            #[cfg(feature = "bzip2")]
            Self::Bzip2(encoder) => encoder.finish(),
            #[cfg(feature = "xz")]
            Self::Xz(encoder) => encoder.finish(),
        }
    }
}

impl Write for FilterEncoder {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Plain(sink) => sink.write(buf),
            Self::Gzip(encoder) => encoder.write(buf),
            #[cfg(feature = "bzip2")]
            Self::Bzip2(encoder) => encoder.write(buf),
            #[cfg(feature = "xz")]
            Self::Xz(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Plain(sink) => sink.flush(),
            Self::Gzip(encoder) => encoder.flush(),
            #[cfg(feature = "bzip2")]
            Self::Bzip2(encoder) => encoder.flush(),
            #[cfg(feature = "xz")]
            Self::Xz(encoder) => encoder.flush(),
        }
    }
}

/// Opens a write codec producing `format` with `filter` applied, at
/// `path`. Fails when the path already exists.
pub(crate) fn open_writer(
    path: &Path,
    format: Format,
    filter: Filter,
    passphrase: Option<&str>,
    cancel: &Cancel,
) -> Result<Box<dyn EntryWrite>, Error> {
    let sink = WriteSink::create(path, cancel.clone())
        .map_err(|e| Error::file_open(e, display_name(path)))?;

    if format.is_tar() {
        let encoder = FilterEncoder::new(filter, sink)?;
        return Ok(Box::new(TarWriteCodec {
            builder: Some(tar::Builder::new(encoder)),
            format,
        }));
    }

    match format {
        Format::Zip => {
            if filter != Filter::None {
                // The zip container is written in place and cannot sit
                // behind a streaming filter.
                return Err(Error::UnsupportedFilter(filter));
            }
            Ok(Box::new(ZipWriteCodec {
                writer: Some(zip::ZipWriter::new(sink)),
                passphrase: passphrase.map(str::to_string),
            }))
        }
        other => Err(Error::UnsupportedFormat(other)),
    }
}

struct TarWriteCodec {
    builder: Option<tar::Builder<FilterEncoder>>,
    format: Format,
}

impl TarWriteCodec {
    fn header(&self, entry: &ArchiveEntry) -> tar::Header {
        let mut header = match self.format {
            Format::Ustar => tar::Header::new_ustar(),
            _ => tar::Header::new_gnu(),
        };
        header.set_mode(entry.mode);
        header.set_uid(entry.uid);
        header.set_gid(entry.gid);
        header.set_size(0);
        if let Some(mtime) = entry.mtime {
            header.set_mtime(mtime.seconds.max(0) as u64);
        }
        if let Some(uname) = &entry.uname {
            if header.set_username(uname).is_err() {
                warn!(uname = %uname, "user name does not fit the tar header");
            }
        }
        if let Some(gname) = &entry.gname {
            if header.set_groupname(gname).is_err() {
                warn!(gname = %gname, "group name does not fit the tar header");
            }
        }
        header
    }
}

impl EntryWrite for TarWriteCodec {
    fn write_entry(&mut self, entry: &ArchiveEntry, data: Option<&mut dyn Read>) -> Result<(), Error> {
        let mut header = self.header(entry);
        let path = entry.pathname_path();
        let builder = self
            .builder
            .as_mut()
            .expect("write_entry called after finish");

        match entry.file_type {
            FileType::Regular => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_size(entry.size);
                match data {
                    Some(reader) => builder.append_data(&mut header, &path, reader)?,
                    None => builder.append_data(&mut header, &path, std::io::empty())?,
                }
            }
            FileType::Directory => {
                header.set_entry_type(tar::EntryType::Directory);
                builder.append_data(&mut header, &path, std::io::empty())?;
            }
            FileType::Symlink => {
                header.set_entry_type(tar::EntryType::Symlink);
                let target = entry.symlink.as_deref().unwrap_or_default();
                builder.append_link(&mut header, &path, crate::entry::bytes_to_path(target))?;
            }
            FileType::Hardlink => {
                header.set_entry_type(tar::EntryType::Link);
                let target = entry.hardlink.as_deref().unwrap_or_default();
                builder.append_link(&mut header, &path, crate::entry::bytes_to_path(target))?;
            }
            FileType::Fifo => {
                header.set_entry_type(tar::EntryType::Fifo);
                builder.append_data(&mut header, &path, std::io::empty())?;
            }
            FileType::BlockDevice | FileType::CharDevice => {
                header.set_entry_type(if entry.file_type == FileType::BlockDevice {
                    tar::EntryType::Block
                } else {
                    tar::EntryType::Char
                });
                header.set_device_major(entry.rdev_major)?;
                header.set_device_minor(entry.rdev_minor)?;
                builder.append_data(&mut header, &path, std::io::empty())?;
            }
            FileType::Socket => {
                // Tar has no socket representation; archiving one is a
                // silent no-op, matching common tar implementations.
                warn!(path = %path.display(), "sockets cannot be stored in tar archives");
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), Error> {
        let builder = self.builder.take().expect("finish called twice");
        let encoder = builder.into_inner().map_err(Error::io)?;
        let mut sink = encoder.finish().map_err(Error::io)?;
        sink.flush().map_err(Error::io)?;
        Ok(())
    }
}

struct ZipWriteCodec {
    writer: Option<zip::ZipWriter<WriteSink>>,
    passphrase: Option<String>,
}

impl ZipWriteCodec {
    fn options<'a>(entry: &ArchiveEntry, passphrase: Option<&'a str>) -> zip::write::FileOptions<'a, ()> {
        let mut options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(entry.mode)
            .large_file(entry.size >= 4 * 1024 * 1024 * 1024);
        if let Some(mtime) = entry.mtime {
            if let Some(datetime) = chrono::DateTime::from_timestamp(mtime.seconds, 0) {
                if let Ok(datetime) = zip::DateTime::try_from(datetime.naive_utc()) {
                    options = options.last_modified_time(datetime);
                }
            }
        }
        if let Some(passphrase) = passphrase {
            options = options.with_aes_encryption(zip::AesMode::Aes256, passphrase);
        }
        options
    }
}

impl EntryWrite for ZipWriteCodec {
    fn write_entry(&mut self, entry: &ArchiveEntry, data: Option<&mut dyn Read>) -> Result<(), Error> {
        let name = entry.pathname_lossy();
        let options = Self::options(entry, self.passphrase.as_deref());
        let writer = self
            .writer
            .as_mut()
            .expect("write_entry called after finish");

        match entry.file_type {
            FileType::Regular | FileType::Hardlink => {
                writer
                    .start_file(&*name, options)
                    .map_err(|e| Error::codec(e.to_string(), name.clone()))?;
                if let Some(reader) = data {
                    std::io::copy(reader, writer).map_err(Error::io)?;
                }
            }
            FileType::Directory => {
                writer
                    .add_directory(&*name, options)
                    .map_err(|e| Error::codec(e.to_string(), name.clone()))?;
            }
            FileType::Symlink => {
                let target = entry
                    .symlink
                    .as_deref()
                    .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                    .unwrap_or_default();
                writer
                    .add_symlink(&*name, &*target, options)
                    .map_err(|e| Error::codec(e.to_string(), name.clone()))?;
            }
            other => {
                // The compressor rejects special sources for zip before
                // they reach the codec.
                return Err(Error::codec(
                    format!("zip cannot store {other:?} entries"),
                    name,
                ));
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), Error> {
        let writer = self.writer.take().expect("finish called twice");
        let mut sink = writer
            .finish()
            .map_err(|e| Error::codec(e.to_string(), String::new()))?;
        sink.flush().map_err(Error::io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_refuses_an_existing_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.tar");
        std::fs::write(&path, b"occupied").unwrap();

        let result = WriteSink::create(&path, Cancel::new());
        assert_eq!(
            result.unwrap_err().kind(),
            std::io::ErrorKind::AlreadyExists
        );
    }

    #[test]
    fn sink_reports_cancellation_as_interrupted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.tar");
        let cancel = Cancel::new();
        let mut sink = WriteSink::create(&path, cancel.clone()).unwrap();

        assert!(sink.write(b"data").is_ok());
        cancel.cancel();
        let err = sink.write(b"more").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::Interrupted);
    }

    #[test]
    fn unsupported_formats_are_rejected_at_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.cpio");
        let result = open_writer(&path, Format::Cpio, Filter::None, None, &Cancel::new());
        assert!(matches!(result, Err(Error::UnsupportedFormat(Format::Cpio))));
    }
}
