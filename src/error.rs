use std::{borrow::Cow, fmt::Display};

use crate::{Filter, Format};

/// The error type of the crate.
#[derive(Debug)]
pub enum Error {
    /// A format identifier outside the enumerated set was given.
    InvalidFormat(u32),
    /// A filter identifier outside the enumerated set was given.
    InvalidFilter(u32),
    /// The source file is not recognized as an archive.
    NotAnArchive(String),
    /// The archive contains no entries.
    EmptyArchive(String),
    /// The archive contains encrypted entries the codec cannot decrypt.
    EncryptedUnsupported,
    /// The archive is encrypted and no passphrase was provided.
    PassphraseRequired,
    /// The provided passphrase does not decrypt the archive.
    IncorrectPassphrase,
    /// A non-directory entry collides with a non-empty directory.
    NotEmpty(std::path::PathBuf),
    /// The built-in codec has no backend for this container format.
    UnsupportedFormat(Format),
    /// The built-in codec has no backend for this compression filter.
    UnsupportedFilter(Filter),
    /// IO error with optional context message.
    Io(std::io::Error, Cow<'static, str>),
    /// Codec error with description and the display name of the source.
    Codec(String, String),
    /// The run was cancelled through its cancel token.
    Cancelled,
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::io(value)
    }
}

impl Error {
    #[inline]
    pub(crate) fn io(e: std::io::Error) -> Self {
        Self::io_msg(e, "")
    }

    #[inline]
    pub(crate) fn io_msg(e: std::io::Error, msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Io(e, msg.into())
    }

    #[inline]
    pub(crate) fn file_open(e: std::io::Error, filename: impl Into<Cow<'static, str>>) -> Self {
        Self::Io(e, filename.into())
    }

    #[inline]
    pub(crate) fn codec(msg: impl Into<String>, source_name: impl Into<String>) -> Self {
        Self::Codec(msg.into(), source_name.into())
    }

    /// Returns whether this error was caused by cancellation.
    ///
    /// Cancellation observed inside a codec callback surfaces as an
    /// interrupted IO error; both spellings count.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Io(e, _) => e.kind() == std::io::ErrorKind::Interrupted,
            _ => false,
        }
    }

    /// Returns the IO error kind when this error wraps an IO failure.
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            Self::Io(e, _) => Some(e.kind()),
            _ => None,
        }
    }

    /// Structural copy. `std::io::Error` is not `Clone`, so the wrapped
    /// IO error is rebuilt from its kind and message.
    pub(crate) fn clone_approx(&self) -> Self {
        match self {
            Self::InvalidFormat(v) => Self::InvalidFormat(*v),
            Self::InvalidFilter(v) => Self::InvalidFilter(*v),
            Self::NotAnArchive(name) => Self::NotAnArchive(name.clone()),
            Self::EmptyArchive(name) => Self::EmptyArchive(name.clone()),
            Self::EncryptedUnsupported => Self::EncryptedUnsupported,
            Self::PassphraseRequired => Self::PassphraseRequired,
            Self::IncorrectPassphrase => Self::IncorrectPassphrase,
            Self::NotEmpty(path) => Self::NotEmpty(path.clone()),
            Self::UnsupportedFormat(format) => Self::UnsupportedFormat(*format),
            Self::UnsupportedFilter(filter) => Self::UnsupportedFilter(*filter),
            Self::Io(e, msg) => Self::Io(std::io::Error::new(e.kind(), e.to_string()), msg.clone()),
            Self::Codec(msg, name) => Self::Codec(msg.clone(), name.clone()),
            Self::Cancelled => Self::Cancelled,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self, f)
    }
}

impl std::error::Error for Error {}
