use std::path::Path;

/// Returns the base name of `path` with its extension stripped. A
/// `.tar` or `.cpio` preceding the final extension is stripped with it,
/// so `archive.tar.gz` becomes `archive`.
pub(crate) fn basename_remove_extension(path: &Path) -> String {
    let basename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());

    let Some(dot) = basename.rfind('.') else {
        return basename;
    };
    if dot == 0 {
        return basename;
    }

    let mut cut = dot;
    for inner in [".tar", ".cpio"] {
        if cut > inner.len() && basename[..cut].ends_with(inner) {
            cut -= inner.len();
            break;
        }
    }
    basename[..cut].to_string()
}

/// Display name of a source file for error reporting: the path when it
/// is representable, a URI-style rendering otherwise.
pub(crate) fn display_name(path: &Path) -> String {
    match path.to_str() {
        Some(s) => s.to_string(),
        None => format!("file://{}", path.to_string_lossy()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_single_extension() {
        assert_eq!(basename_remove_extension(Path::new("/tmp/a.zip")), "a");
        assert_eq!(basename_remove_extension(Path::new("archive.7z")), "archive");
    }

    #[test]
    fn strips_compound_tar_extension() {
        assert_eq!(basename_remove_extension(Path::new("archive.tar.gz")), "archive");
        assert_eq!(basename_remove_extension(Path::new("archive.cpio.xz")), "archive");
        assert_eq!(basename_remove_extension(Path::new("archive.tar")), "archive");
    }

    #[test]
    fn keeps_names_without_extension() {
        assert_eq!(basename_remove_extension(Path::new("/tmp/archive")), "archive");
        assert_eq!(basename_remove_extension(Path::new(".hidden")), ".hidden");
    }
}
