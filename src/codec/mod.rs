//! Streaming bridge between the engines and the archive codecs.
//!
//! The engines only know the two object-safe traits below. The crate
//! ships built-in codecs for zip and the tar dialects (with gzip,
//! bzip2, xz and lzma filters) plus the raw single-stream mode used
//! when a file is compressed but not an archive.

pub(crate) mod read;
pub(crate) mod write;

use std::io::Read;

use crate::{ArchiveEntry, Error};

/// Sequential, push-style reader over the entries of one archive.
pub(crate) trait EntryRead {
    /// Walks the archive, invoking `f` once per entry with the entry
    /// metadata and a reader over its body. Returning `false` from `f`
    /// stops the walk early; not reading from the body skips it.
    fn for_each_entry(
        &mut self,
        f: &mut dyn FnMut(&ArchiveEntry, &mut dyn Read) -> Result<bool, Error>,
    ) -> Result<(), Error>;

    /// Number of layers in the filter chain, counting the trivial
    /// "none" layer. A raw-mode source with a recognized compression
    /// filter reports 2.
    fn filter_count(&self) -> u32;
}

/// Sequential writer producing one archive.
pub(crate) trait EntryWrite {
    /// Appends one entry. Regular entries stream their body from
    /// `data`; all other entry types pass `None`.
    fn write_entry(&mut self, entry: &ArchiveEntry, data: Option<&mut dyn Read>) -> Result<(), Error>;

    /// Flushes and closes the archive. Must be called exactly once;
    /// errors here are fatal to the run.
    fn finish(&mut self) -> Result<(), Error>;
}

/// Codec configuration chosen by the extractor's scan pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadMode {
    /// Recognize any supported container format.
    AllFormats,
    /// Treat the input as a single compressed stream without archive
    /// structure.
    Raw,
}
