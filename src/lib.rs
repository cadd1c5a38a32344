//! Automatic archive creation and extraction for file-manager style
//! applications.
//!
//! The crate provides two single-use engines. The [`Compressor`] packs
//! a list of filesystem entries into a new archive; the [`Extractor`]
//! unpacks an archive into a destination directory while protecting
//! the host from hostile contents (path traversal, symlinked parents,
//! hardlink tricks). Both report progress and solicit decisions
//! (destination, conflicts, passphrases) through an [`EventHandler`],
//! either inline on the caller's thread or marshalled from a worker
//! thread as [`EngineEvent`] values.
//!
//! ## Built-in codecs
//!
//! | Format                      | Extraction | Creation |
//! |-----------------------------|------------|----------|
//! | ZIP (incl. AES encryption)  | ✓          | ✓        |
//! | TAR (gnu, ustar, pax)       | ✓          | ✓        |
//! | raw compressed stream       | ✓          |          |
//!
//! | Filter  | Extraction | Creation |
//! |---------|------------|----------|
//! | GZIP    | ✓          | ✓        |
//! | BZIP2 (*) | ✓        | ✓        |
//! | XZ (*)  | ✓          | ✓        |
//! | LZMA (*) | ✓         | ✓        |
//!
//! (*) Require optional cargo feature.
//!
//! The remaining formats of the registry (cpio, 7z, ar, xar, iso9660)
//! are described by [`Format`] but have no built-in codec; opening
//! them fails with [`Error::UnsupportedFormat`].
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

mod cancel;
mod codec;
mod compress;
mod entry;
mod error;
mod event;
mod extract;
mod format;
mod sanitize;
mod util;

pub use cancel::Cancel;
pub use compress::Compressor;
pub use entry::{ArchiveEntry, EntryTime, FileType};
pub use error::Error;
pub use event::{ConflictAction, EngineEvent, EventHandler};
pub use extract::Extractor;
pub use format::{Filter, Format, description, extension, mime_type};
