use std::path::{Component, Path, PathBuf};

/// Canonicalize without requiring the full path to exist: the longest
/// existing prefix is resolved through the filesystem, the remainder is
/// normalized lexically (`.` dropped, `..` popped).
#[must_use]
pub fn weakly_canonical(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

    let mut prefix = absolute.clone();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();
    while !prefix.as_os_str().is_empty() && !prefix.exists() {
        match (prefix.file_name(), prefix.parent()) {
            (Some(name), Some(parent)) => {
                tail.push(name.to_os_string());
                prefix = parent.to_path_buf();
            }
            _ => break,
        }
    }

    let mut result = std::fs::canonicalize(&prefix).unwrap_or(prefix);
    for segment in tail.iter().rev() {
        match Path::new(segment).components().next() {
            Some(Component::ParentDir) => {
                result.pop();
            }
            Some(Component::CurDir) | None => {}
            _ => result.push(segment),
        }
    }
    result
}

/// Path-safety test: the canonical form of `path` must sit at or below the
/// canonical form of `root`. Neither side has to exist.
#[must_use]
pub fn is_path_within(path: &Path, root: &str) -> bool {
    weakly_canonical(path).starts_with(weakly_canonical(Path::new(root)))
}
