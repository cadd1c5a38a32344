//! Maps archive-advertised pathnames to safe destination paths.
//!
//! Sanitization is textual: the pathname is resolved lexically against
//! the destination directory, without touching the filesystem. Symlink
//! targets are never dereferenced and intermediate components are never
//! stat'ed here; escape detection operates purely on the candidate path
//! text.

use std::path::{Component, Path, PathBuf};

use crate::entry::bytes_to_path;

/// Resolves `name` lexically under `root`. `..` segments pop within the
/// subtree; a segment that would climb above `root`, an absolute name
/// or a path prefix makes the candidate escape, reported as `None`.
pub(crate) fn lexical_child(root: &Path, name: &Path) -> Option<PathBuf> {
    let mut result = root.to_path_buf();
    let mut depth = 0usize;
    for component in name.components() {
        match component {
            Component::Normal(part) => {
                result.push(part);
                depth += 1;
            }
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                result.pop();
                depth -= 1;
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(result)
}

/// Per-run path mapper of the extract pass.
///
/// Every mapped path is either the destination directory itself or a
/// strict descendant of it. When the client renamed the archive's
/// common top-level, the old prefix is rewritten to the new one after
/// containment is established.
#[derive(Debug)]
pub(crate) struct PathSanitizer {
    destination: PathBuf,
    prefix: Option<PathBuf>,
    new_prefix: Option<PathBuf>,
}

impl PathSanitizer {
    pub(crate) fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            prefix: None,
            new_prefix: None,
        }
    }

    /// Installs a prefix rewrite `old -> new`, applied after
    /// containment.
    pub(crate) fn set_prefix_rewrite(&mut self, old: PathBuf, new: PathBuf) {
        self.prefix = Some(old);
        self.new_prefix = Some(new);
    }

    /// Maps raw archive pathname bytes to a destination path.
    pub(crate) fn sanitize(&self, raw: &[u8]) -> PathBuf {
        let name = bytes_to_path(raw);
        let mut candidate = match lexical_child(&self.destination, &name) {
            Some(path) => path,
            // Absolute names and names escaping the destination keep
            // only their final component.
            None => match name.file_name() {
                Some(base) => self.destination.join(base),
                None => self.destination.clone(),
            },
        };

        if let (Some(prefix), Some(new_prefix)) = (&self.prefix, &self.new_prefix) {
            if let Ok(relative) = candidate.strip_prefix(prefix) {
                candidate = new_prefix.join(relative);
            }
        }

        candidate
    }
}

/// Returns the deepest directory under `root` that is an ancestor of
/// every path in `paths`: the direct child of `root` that the first
/// path descends from, provided every other path descends from it too.
pub(crate) fn common_prefix(paths: &[PathBuf], root: &Path) -> Option<PathBuf> {
    let first = paths.first()?;
    if !first.starts_with(root) || first == root {
        return None;
    }

    let mut prefix = first.clone();
    while prefix.parent() != Some(root) {
        prefix = prefix.parent()?.to_path_buf();
    }

    for path in paths {
        if path != &prefix && !path.starts_with(&prefix) {
            return None;
        }
    }

    Some(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitizer() -> PathSanitizer {
        PathSanitizer::new("/extract/dest")
    }

    #[test]
    fn plain_relative_path_stays_inside() {
        let result = sanitizer().sanitize(b"subdir/file.txt");
        assert_eq!(result, Path::new("/extract/dest/subdir/file.txt"));
    }

    #[test]
    fn current_dir_segments_collapse() {
        let result = sanitizer().sanitize(b"./subdir/./file.txt");
        assert_eq!(result, Path::new("/extract/dest/subdir/file.txt"));
    }

    #[test]
    fn interior_parent_segments_resolve_lexically() {
        let result = sanitizer().sanitize(b"a/b/../c/file.txt");
        assert_eq!(result, Path::new("/extract/dest/a/c/file.txt"));
    }

    #[test]
    fn escaping_parent_segments_keep_only_the_basename() {
        let result = sanitizer().sanitize(b"./../file.txt");
        assert_eq!(result, Path::new("/extract/dest/file.txt"));
    }

    #[test]
    fn absolute_path_keeps_only_the_basename() {
        let result = sanitizer().sanitize(b"/etc/passwd");
        assert_eq!(result, Path::new("/extract/dest/passwd"));
    }

    #[test]
    fn deep_escape_keeps_only_the_basename() {
        let result = sanitizer().sanitize(b"a/../../../../etc/passwd");
        assert_eq!(result, Path::new("/extract/dest/passwd"));
    }

    #[test]
    fn prefix_rewrite_applies_after_containment() {
        let mut sanitizer = sanitizer();
        sanitizer.set_prefix_rewrite(
            PathBuf::from("/extract/dest/old-root"),
            PathBuf::from("/extract/dest/renamed"),
        );
        let result = sanitizer.sanitize(b"old-root/nested/file.txt");
        assert_eq!(result, Path::new("/extract/dest/renamed/nested/file.txt"));
    }

    #[test]
    fn paths_outside_the_prefix_are_left_alone() {
        let mut sanitizer = sanitizer();
        sanitizer.set_prefix_rewrite(
            PathBuf::from("/extract/dest/old-root"),
            PathBuf::from("/extract/dest/renamed"),
        );
        let result = sanitizer.sanitize(b"other/file.txt");
        assert_eq!(result, Path::new("/extract/dest/other/file.txt"));
    }

    #[test]
    fn common_prefix_of_a_single_rooted_tree() {
        let root = Path::new("/out");
        let paths = vec![
            PathBuf::from("/out/top/a.txt"),
            PathBuf::from("/out/top/sub/b.txt"),
            PathBuf::from("/out/top"),
        ];
        assert_eq!(common_prefix(&paths, root), Some(PathBuf::from("/out/top")));
    }

    #[test]
    fn common_prefix_absent_for_divergent_roots() {
        let root = Path::new("/out");
        let paths = vec![PathBuf::from("/out/a/x.txt"), PathBuf::from("/out/b/y.txt")];
        assert_eq!(common_prefix(&paths, root), None);
    }

    #[test]
    fn common_prefix_absent_when_a_path_leaves_the_root() {
        let root = Path::new("/out");
        let paths = vec![PathBuf::from("/out/top/a.txt"), PathBuf::from("/elsewhere/b.txt")];
        assert_eq!(common_prefix(&paths, root), None);
    }
}
