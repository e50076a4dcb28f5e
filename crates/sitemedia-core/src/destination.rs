use std::path::{Path, PathBuf};

use crate::error::MediaError;
use crate::tree::BatchTree;

/// Find a free path for `filename` inside `dir`.
///
/// The desired name is tried first, then `<stem>_1<ext>`, `<stem>_2<ext>`, and
/// so on. `own` is the file being placed: a candidate equal to it counts as
/// free, so a file that already sits at its desired name keeps it.
///
/// Existence is checked through the tree, so names planned earlier in a dry
/// run are treated as taken.
pub fn resolve(
    tree: &BatchTree,
    dir: &Path,
    filename: &str,
    own: Option<&Path>,
) -> Result<PathBuf, MediaError> {
    let is_free = |candidate: &Path| own == Some(candidate) || !tree.exists(candidate);

    let desired = dir.join(filename);
    if is_free(&desired) {
        return Ok(desired);
    }

    let (stem, ext) = split_name(filename);
    for n in 1..=u32::MAX {
        let candidate = dir.join(format!("{stem}_{n}{ext}"));
        if is_free(&candidate) {
            return Ok(candidate);
        }
    }

    Err(MediaError::CollisionExhausted {
        dir: dir.to_path_buf(),
        name: filename.to_string(),
    })
}

/// Split `name` into stem and extension (with its dot). Names without an
/// extension, or dotfiles, keep everything in the stem.
fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(i) => name.split_at(i),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_free_name_is_used_as_is() {
        let dir = tempdir().unwrap();
        let tree = BatchTree::new(dir.path(), false);
        let got = resolve(&tree, dir.path(), "a.jpg", None).unwrap();
        assert_eq!(got, dir.path().join("a.jpg"));
    }

    #[test]
    fn test_suffixes_skip_taken_names() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.jpg"), b"1").unwrap();
        fs::write(dir.path().join("a_1.jpg"), b"2").unwrap();
        let tree = BatchTree::new(dir.path(), false);

        let got = resolve(&tree, dir.path(), "a.jpg", None).unwrap();
        assert_eq!(got, dir.path().join("a_2.jpg"));
    }

    #[test]
    fn test_own_path_counts_as_free() {
        let dir = tempdir().unwrap();
        let own = dir.path().join("a.jpg");
        fs::write(&own, b"1").unwrap();
        let tree = BatchTree::new(dir.path(), false);

        let got = resolve(&tree, dir.path(), "a.jpg", Some(&own)).unwrap();
        assert_eq!(got, own);
    }

    #[test]
    fn test_planned_names_are_taken_in_dry_run() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("x.jpg"), b"1").unwrap();
        let mut tree = BatchTree::new(dir.path(), true);
        tree.move_file(&dir.path().join("x.jpg"), &dir.path().join("a.jpg"))
            .unwrap();

        let got = resolve(&tree, dir.path(), "a.jpg", None).unwrap();
        assert_eq!(got, dir.path().join("a_1.jpg"));
        // the vacated source is free again
        let got = resolve(&tree, dir.path(), "x.jpg", None).unwrap();
        assert_eq!(got, dir.path().join("x.jpg"));
    }

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("a.b.jpg"), ("a.b", ".jpg"));
        assert_eq!(split_name("noext"), ("noext", ""));
        assert_eq!(split_name(".hidden"), (".hidden", ""));
    }
}
