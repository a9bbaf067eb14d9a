use crate::error::{IoContext, MigrationResult};
use crate::syre::paths::{LEGACY_THOT_FOLDER, SYRE_FOLDER};
use std::fs;
use std::path::{Path, PathBuf};

/// Immediate subdirectories of `dir`, sorted by name.
pub fn child_dirs(dir: &Path) -> MigrationResult<Vec<PathBuf>> {
    let read_dir = fs::read_dir(dir).io_context(|| format!("failed to read {}", dir.display()))?;
    let mut out = Vec::new();
    for entry in read_dir {
        let entry = entry.io_context(|| format!("failed to read {}", dir.display()))?;
        let file_type = entry
            .file_type()
            .io_context(|| format!("failed to stat {}", entry.path().display()))?;
        if file_type.is_dir() {
            out.push(entry.path());
        }
    }
    out.sort();
    Ok(out)
}

fn is_metadata_dir(path: &Path) -> bool {
    matches!(
        path.file_name().and_then(|s| s.to_str()),
        Some(SYRE_FOLDER) | Some(LEGACY_THOT_FOLDER)
    )
}

/// Every directory named `name` under `root` (root excluded). Matches are
/// not descended into.
pub fn find_dirs_named(root: &Path, name: &str) -> MigrationResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for child in child_dirs(&dir)? {
            if child.file_name().and_then(|s| s.to_str()) == Some(name) {
                found.push(child);
            } else if !is_metadata_dir(&child) {
                stack.push(child);
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Every directory under `root` (root included) holding `.syre/<file_name>`.
pub fn dirs_with_metadata(root: &Path, file_name: &str) -> MigrationResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        if dir.join(SYRE_FOLDER).join(file_name).is_file() {
            found.push(dir.clone());
        }
        for child in child_dirs(&dir)? {
            if !is_metadata_dir(&child) {
                stack.push(child);
            }
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn finds_nested_metadata_without_entering_syre() {
        let tmp = tempdir().expect("tempdir");
        let root = tmp.path().join("data");
        for dir in ["data/.syre", "data/a/.syre", "data/a/b/c/.syre", "data/d"] {
            fs::create_dir_all(tmp.path().join(dir)).expect("mkdir");
        }
        for file in ["data/.syre/assets.json", "data/a/b/c/.syre/assets.json"] {
            fs::write(tmp.path().join(file), "[]").expect("write");
        }
        fs::create_dir_all(tmp.path().join("data/.syre/inner/.syre")).expect("mkdir");
        fs::write(tmp.path().join("data/.syre/inner/.syre/assets.json"), "[]").expect("write");

        let found = dirs_with_metadata(&root, "assets.json").expect("walk");
        assert_eq!(found, vec![root.clone(), root.join("a/b/c")]);
    }

    #[test]
    fn finds_legacy_folders_at_any_depth() {
        let tmp = tempdir().expect("tempdir");
        for dir in [".thot", "data/.thot", "data/x/y/.thot"] {
            fs::create_dir_all(tmp.path().join(dir)).expect("mkdir");
        }
        let found = find_dirs_named(tmp.path(), ".thot").expect("walk");
        assert_eq!(found.len(), 3);
        assert!(found.contains(&tmp.path().join("data/x/y/.thot")));
    }
}
