//! Static registry of container formats and compression filters.
//!
//! Maps the engine identifiers to the codec-library identifiers, the
//! canonical filename extension, the MIME type and a human-readable
//! description. Pure data, no IO.

use crate::Error;

/// Container format of an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Format {
    /// Zip archive.
    Zip = 1,
    /// Tar archive (restricted pax).
    Tar = 2,
    /// CPIO archive.
    Cpio = 3,
    /// 7-zip archive.
    SevenZip = 4,
    /// AR archive (BSD).
    ArBsd = 5,
    /// AR archive (SVR4).
    ArSvr4 = 6,
    /// SV4 CPIO archive.
    CpioNewc = 7,
    /// Tar archive (GNU tar).
    GnuTar = 8,
    /// Raw CD image.
    Iso9660 = 9,
    /// Tar archive (pax interchange).
    Pax = 10,
    /// Tar archive (ustar).
    Ustar = 11,
    /// Xar archive.
    Xar = 12,
}

/// Compression filter applied over a container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum Filter {
    /// No filter.
    #[default]
    None = 1,
    /// UNIX compress.
    Compress = 2,
    /// Gzip.
    Gzip = 3,
    /// Bzip2.
    Bzip2 = 4,
    /// XZ.
    Xz = 5,
    /// LZMA (legacy lzma-alone container).
    Lzma = 6,
    /// Lzip.
    Lzip = 7,
    /// LZO.
    Lzop = 8,
    /// GRZip.
    Grzip = 9,
    /// Long Range ZIP (lrzip).
    Lrzip = 10,
}

struct FormatDescription {
    codec_id: u32,
    extension: &'static str,
    keyword: &'static str,
    mime_type: &'static str,
    description: &'static str,
}

struct FilterDescription {
    codec_id: u32,
    extension: &'static str,
    keyword: &'static str,
    mime_type: &'static str,
    description: &'static str,
}

// Codec identifiers follow the libarchive numbering scheme.
const FORMATS: [FormatDescription; 12] = [
    FormatDescription {
        codec_id: 0x50000,
        extension: "zip",
        keyword: "zip",
        mime_type: "application/zip",
        description: "Zip archive",
    },
    FormatDescription {
        codec_id: 0x30003,
        extension: "tar",
        keyword: "tar",
        mime_type: "application/x-tar",
        description: "Tar archive (restricted pax)",
    },
    FormatDescription {
        codec_id: 0x10001,
        extension: "cpio",
        keyword: "cpio",
        mime_type: "application/x-cpio",
        description: "CPIO archive",
    },
    FormatDescription {
        codec_id: 0xE0000,
        extension: "7z",
        keyword: "7z-compressed",
        mime_type: "application/x-7z-compressed",
        description: "7-zip archive",
    },
    FormatDescription {
        codec_id: 0x70002,
        extension: "a",
        keyword: "ar",
        mime_type: "application/x-ar",
        description: "AR archive (BSD)",
    },
    FormatDescription {
        codec_id: 0x70001,
        extension: "a",
        keyword: "ar",
        mime_type: "application/x-ar",
        description: "AR archive (SVR4)",
    },
    FormatDescription {
        codec_id: 0x10004,
        extension: "cpio",
        keyword: "sv4cpio",
        mime_type: "application/x-sv4cpio",
        description: "SV4 CPIO archive",
    },
    FormatDescription {
        codec_id: 0x30004,
        extension: "tar",
        keyword: "tar",
        mime_type: "application/x-tar",
        description: "Tar archive (GNU tar)",
    },
    FormatDescription {
        codec_id: 0x40000,
        extension: "iso",
        keyword: "cd-image",
        mime_type: "application/x-cd-image",
        description: "Raw CD Image",
    },
    FormatDescription {
        codec_id: 0x30002,
        extension: "tar",
        keyword: "tar",
        mime_type: "application/x-tar",
        description: "Tar archive (pax)",
    },
    FormatDescription {
        codec_id: 0x30001,
        extension: "tar",
        keyword: "tar",
        mime_type: "application/x-tar",
        description: "Tar archive (ustar)",
    },
    FormatDescription {
        codec_id: 0xA0000,
        extension: "xar",
        keyword: "xar",
        mime_type: "application/x-xar",
        description: "Xar archive",
    },
];

const FILTERS: [FilterDescription; 10] = [
    FilterDescription {
        codec_id: 0,
        extension: "",
        keyword: "",
        mime_type: "",
        description: "",
    },
    FilterDescription {
        codec_id: 3,
        extension: "Z",
        keyword: "compress",
        mime_type: "application/x-compress",
        description: "UNIX-compressed",
    },
    FilterDescription {
        codec_id: 1,
        extension: "gz",
        keyword: "gzip",
        mime_type: "application/gzip",
        description: "Gzip",
    },
    FilterDescription {
        codec_id: 2,
        extension: "bz2",
        keyword: "bzip",
        mime_type: "application/x-bzip",
        description: "Bzip2",
    },
    FilterDescription {
        codec_id: 6,
        extension: "xz",
        keyword: "xz",
        mime_type: "application/x-xz",
        description: "XZ",
    },
    FilterDescription {
        codec_id: 5,
        extension: "lzma",
        keyword: "lzma",
        mime_type: "application/x-lzma",
        description: "LZMA",
    },
    FilterDescription {
        codec_id: 9,
        extension: "lz",
        keyword: "lzip",
        mime_type: "application/x-lzip",
        description: "Lzip",
    },
    FilterDescription {
        codec_id: 11,
        extension: "lzo",
        keyword: "lzop",
        mime_type: "application/x-lzop",
        description: "LZO",
    },
    FilterDescription {
        codec_id: 12,
        extension: "grz",
        keyword: "grzip",
        mime_type: "application/x-grzip",
        description: "GRZip",
    },
    FilterDescription {
        codec_id: 10,
        extension: "lrz",
        keyword: "lrzip",
        mime_type: "application/x-lrzip",
        description: "Long Range ZIP (lrzip)",
    },
];

impl Format {
    const ALL: [Format; 12] = [
        Format::Zip,
        Format::Tar,
        Format::Cpio,
        Format::SevenZip,
        Format::ArBsd,
        Format::ArSvr4,
        Format::CpioNewc,
        Format::GnuTar,
        Format::Iso9660,
        Format::Pax,
        Format::Ustar,
        Format::Xar,
    ];

    #[inline]
    fn entry(self) -> &'static FormatDescription {
        &FORMATS[self as usize - 1]
    }

    /// Returns the canonical filename extension, without a leading dot.
    pub fn extension(self) -> &'static str {
        self.entry().extension
    }

    /// Returns the MIME type of the bare format.
    pub fn mime_type(self) -> &'static str {
        self.entry().mime_type
    }

    /// Returns a human-readable description of the format.
    pub fn description(self) -> &'static str {
        self.entry().description
    }

    /// Returns the identifier the codec library uses for this format.
    pub fn codec_format_id(self) -> u32 {
        self.entry().codec_id
    }

    /// Returns whether this is one of the tar dialects.
    pub fn is_tar(self) -> bool {
        matches!(self, Format::Tar | Format::GnuTar | Format::Pax | Format::Ustar)
    }

    /// Returns whether this is one of the ar dialects, which can only
    /// store regular files.
    pub fn is_ar(self) -> bool {
        matches!(self, Format::ArBsd | Format::ArSvr4)
    }
}

impl Filter {
    const ALL: [Filter; 10] = [
        Filter::None,
        Filter::Compress,
        Filter::Gzip,
        Filter::Bzip2,
        Filter::Xz,
        Filter::Lzma,
        Filter::Lzip,
        Filter::Lzop,
        Filter::Grzip,
        Filter::Lrzip,
    ];

    #[inline]
    fn entry(self) -> &'static FilterDescription {
        &FILTERS[self as usize - 1]
    }

    /// Returns the canonical filename extension, without a leading dot.
    /// Empty for [`Filter::None`].
    pub fn extension(self) -> &'static str {
        self.entry().extension
    }

    /// Returns the MIME type of the bare filter. Empty for [`Filter::None`].
    pub fn mime_type(self) -> &'static str {
        self.entry().mime_type
    }

    /// Returns a human-readable description of the filter.
    pub fn description(self) -> &'static str {
        self.entry().description
    }

    /// Returns the identifier the codec library uses for this filter.
    pub fn codec_filter_id(self) -> u32 {
        self.entry().codec_id
    }
}

impl TryFrom<u32> for Format {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Error> {
        Format::ALL
            .get(value.wrapping_sub(1) as usize)
            .copied()
            .ok_or(Error::InvalidFormat(value))
    }
}

impl TryFrom<u32> for Filter {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Error> {
        Filter::ALL
            .get(value.wrapping_sub(1) as usize)
            .copied()
            .ok_or(Error::InvalidFilter(value))
    }
}

/// Returns the extension of a format and filter combination, with a
/// leading dot: `.tar.gz`, `.zip`.
pub fn extension(format: Format, filter: Filter) -> String {
    let filter_ext = filter.extension();
    if filter_ext.is_empty() {
        format!(".{}", format.extension())
    } else {
        format!(".{}.{}", format.extension(), filter_ext)
    }
}

/// Returns the conventional MIME name of a format and filter combination.
pub fn mime_type(format: Format, filter: Filter) -> String {
    let keyword = format.entry().keyword;
    match filter {
        Filter::None => format.mime_type().to_string(),
        Filter::Compress => format!("application/x-{keyword}z"),
        Filter::Gzip => format!("application/x-compressed-{keyword}"),
        _ => format!("application/x-{}-compressed-{keyword}", filter.entry().keyword),
    }
}

/// Returns a human-readable description of a format and filter
/// combination.
pub fn description(format: Format, filter: Filter) -> String {
    match filter {
        Filter::None => format.description().to_string(),
        _ => format!("{}, {}-compressed", format.description(), filter.description()),
    }
}
