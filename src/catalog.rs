//! Asset catalog: discovery of indexable images under an asset root.
//!
//! The catalog walks the directory tree, keeps files with a recognized
//! image extension, and derives a coarse category from the first path
//! segment under the root. The output ordering is load-bearing: integer
//! ids are assigned in catalog order during index construction, so the
//! catalog is sorted lexicographically by relative path to make rebuilds
//! deterministic for an unchanged file set.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Image extensions the indexer recognizes (compared case-insensitively).
pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// Category assigned to assets that live directly under the asset root.
pub const ROOT_CATEGORY: &str = "__root__";

/// One discovered asset: its path relative to the asset root plus the
/// category derived from its top-level folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    /// Path relative to the asset root, using the platform separator.
    pub relative_path: String,
    /// First path segment under the root, or [`ROOT_CATEGORY`].
    pub category: String,
}

/// Recursively collect all indexable images under `asset_root`, sorted by
/// relative path.
///
/// # Errors
///
/// Returns [`Error::AssetsNotFound`] when `asset_root` does not exist.
pub fn collect(asset_root: &Path) -> Result<Vec<AssetRecord>> {
    if !asset_root.exists() {
        return Err(Error::AssetsNotFound(asset_root.to_path_buf()));
    }

    let mut records = Vec::new();
    walk(asset_root, asset_root, &mut records)?;
    records.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(records)
}

fn walk(root: &Path, dir: &Path, records: &mut Vec<AssetRecord>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk(root, &path, records)?;
        } else if has_image_extension(&path) {
            // walk is only ever called with descendants of root
            let relative = path.strip_prefix(root).expect("entry under asset root");
            records.push(AssetRecord {
                relative_path: relative.to_string_lossy().into_owned(),
                category: category_of(relative),
            });
        }
    }
    Ok(())
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
}

fn category_of(relative: &Path) -> String {
    let mut components = relative.components();
    let first = components.next();
    if components.next().is_some() {
        first
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .unwrap_or_else(|| ROOT_CATEGORY.to_string())
    } else {
        ROOT_CATEGORY.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn missing_root_is_an_error() {
        let result = collect(Path::new("/definitely/not/a/real/dir"));
        assert!(matches!(result, Err(Error::AssetsNotFound(_))));
    }

    #[test]
    fn collects_sorted_with_categories() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("WeaponIcons/sword.png"));
        touch(&dir.path().join("SkillsIcons/fireball.jpg"));
        touch(&dir.path().join("SkillsIcons/deep/frost.webp"));
        touch(&dir.path().join("loose.png"));
        touch(&dir.path().join("WeaponIcons/readme.txt"));

        let records = collect(dir.path()).unwrap();
        let paths: Vec<&str> = records.iter().map(|r| r.relative_path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "SkillsIcons/deep/frost.webp",
                "SkillsIcons/fireball.jpg",
                "WeaponIcons/sword.png",
                "loose.png",
            ]
        );
        assert_eq!(records[0].category, "SkillsIcons");
        assert_eq!(records[2].category, "WeaponIcons");
        assert_eq!(records[3].category, ROOT_CATEGORY);
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("icons/SHOUT.PNG"));
        touch(&dir.path().join("icons/photo.JpEg"));
        touch(&dir.path().join("icons/notes.md"));

        let records = collect(dir.path()).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn empty_root_yields_empty_catalog() {
        let dir = tempdir().unwrap();
        let records = collect(dir.path()).unwrap();
        assert!(records.is_empty());
    }
}
