//! Mapping between local paths and wire names.
//!
//! Wire names always use `/` separators. The receiver never lets a name
//! escape its save directory.

use crate::error::{Error, Result};
use std::io;
use std::path::{Component, Path, PathBuf};

/// Name to put on the wire for `path`.
///
/// With a `root`, the name is the path relative to it; otherwise the basename.
pub fn wire_name(path: &Path, root: Option<&Path>) -> Result<String> {
    let not_utf8 = || Error::Source {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidData, "file name is not UTF-8"),
    };

    if let Some(rel) = root.and_then(|r| path.strip_prefix(r).ok()) {
        let mut parts = Vec::new();
        for comp in rel.components() {
            if let Component::Normal(s) = comp {
                parts.push(s.to_str().ok_or_else(not_utf8)?);
            }
        }
        if !parts.is_empty() {
            return Ok(parts.join("/"));
        }
    }

    let base = path.file_name().ok_or_else(|| Error::Source {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
    })?;
    base.to_str().map(str::to_owned).ok_or_else(not_utf8)
}

/// Where a received `name` is stored under `save_dir`.
///
/// With `recursive` off only the last component is kept.
pub fn destination_for(save_dir: &Path, name: &str, recursive: bool) -> Result<PathBuf> {
    if name.contains('\0') {
        return Err(Error::protocol("name contains NUL byte"));
    }
    if name.starts_with('/') {
        return Err(Error::protocol(format!("absolute name {:?}", name)));
    }

    let mut parts = Vec::new();
    for part in name.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        // Each piece must be exactly one plain component on this platform
        let mut comps = Path::new(part).components();
        match (comps.next(), comps.next()) {
            (Some(Component::Normal(_)), None) => parts.push(part),
            _ => {
                return Err(Error::protocol(format!(
                    "name {:?} contains disallowed component {:?}",
                    name, part
                )))
            }
        }
    }

    let Some(last) = parts.last() else {
        return Err(Error::protocol("empty file name"));
    };

    if recursive {
        Ok(parts.iter().fold(save_dir.to_path_buf(), |acc, p| acc.join(p)))
    } else {
        Ok(save_dir.join(last))
    }
}

/// Create parent directory if needed; existing directories are fine.
pub fn ensure_parent_exists(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn wire_name_basename_without_root() {
        let name = wire_name(Path::new("some/dir/file.txt"), None).unwrap();
        assert_eq!(name, "file.txt");
    }

    #[test]
    fn wire_name_relative_uses_forward_slashes() {
        let root = Path::new("base");
        let path = root.join("sub").join("inner.txt");
        assert_eq!(wire_name(&path, Some(root)).unwrap(), "sub/inner.txt");
    }

    #[test]
    fn wire_name_outside_root_falls_back_to_basename() {
        let name = wire_name(Path::new("/elsewhere/x.bin"), Some(Path::new("/base"))).unwrap();
        assert_eq!(name, "x.bin");
    }

    #[test]
    fn destination_recursive_and_flat() {
        let save = Path::new("dst");
        assert_eq!(
            destination_for(save, "sub/inner.txt", true).unwrap(),
            Path::new("dst").join("sub").join("inner.txt")
        );
        assert_eq!(
            destination_for(save, "sub/inner.txt", false).unwrap(),
            Path::new("dst").join("inner.txt")
        );
        assert_eq!(
            destination_for(save, "./a//b.txt", true).unwrap(),
            Path::new("dst").join("a").join("b.txt")
        );
    }

    #[test]
    fn destination_rejects_escapes() {
        let save = Path::new("dst");
        for bad in ["../etc/passwd", "sub/../../x", "/etc/passwd", "a\0b", "", "./", "//"] {
            assert!(
                matches!(destination_for(save, bad, true), Err(Error::Protocol { .. })),
                "{:?}",
                bad
            );
        }
    }

    #[test]
    fn ensure_parent_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("new").join("nested").join("file.txt");
        ensure_parent_exists(&file).unwrap();
        ensure_parent_exists(&file).unwrap();
        assert!(file.parent().unwrap().is_dir());
    }
}
