// src/watch/path_utils.rs

use std::path::{Path, PathBuf};

/// Find the watch root `path` lives under and return the path relative to
/// it, with forward slashes so ignore globs match on every platform.
///
/// Roots are expected to be canonical already, since notify reports paths
/// under the root as it was registered. When roots are nested the longest
/// (most specific) root wins.
pub fn relative_to_roots<'a>(roots: &'a [PathBuf], path: &Path) -> Option<(&'a Path, String)> {
    let (root, rel) = roots
        .iter()
        .filter_map(|root| path.strip_prefix(root).ok().map(|rel| (root.as_path(), rel)))
        .max_by_key(|(root, _)| root.components().count())?;

    Some((root, rel.to_string_lossy().replace('\\', "/")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_outside_every_root_are_unrelated() {
        let roots = vec![PathBuf::from("/srv/app")];
        assert_eq!(relative_to_roots(&roots, Path::new("/etc/passwd")), None);
        // A shared string prefix is not a shared directory.
        assert_eq!(relative_to_roots(&roots, Path::new("/srv/application/x")), None);
    }

    #[test]
    fn most_specific_root_wins() {
        let roots = vec![PathBuf::from("/srv/app"), PathBuf::from("/srv/app/config")];
        let (root, rel) = relative_to_roots(&roots, Path::new("/srv/app/config/a.toml")).unwrap();
        assert_eq!(root, Path::new("/srv/app/config"));
        assert_eq!(rel, "a.toml");

        let (root, rel) = relative_to_roots(&roots, Path::new("/srv/app/src/main.rs")).unwrap();
        assert_eq!(root, Path::new("/srv/app"));
        assert_eq!(rel, "src/main.rs");
    }
}
