//! Path resolution for declared names.
//!
//! Resolution is lexical: the target may not exist yet, and a missing file
//! must surface as a read failure on the node rather than a resolution error.

use std::path::{Component, Path, PathBuf};

/// Collapse `.` and `..` components without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(name) => out.push(name),
        }
    }
    out
}

/// Resolve a declared name against a base directory.
pub fn resolve_against(base_dir: &Path, name: impl AsRef<Path>) -> PathBuf {
    let name = name.as_ref();
    if name.is_absolute() {
        normalize_path(name)
    } else {
        normalize_path(&base_dir.join(name))
    }
}

/// Directory that a node's own references resolve against.
pub fn base_dir_of(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"))
}

/// Absolute form of the process working directory, without `\\?\` prefixes on Windows.
pub fn working_dir() -> std::io::Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    Ok(dunce::canonicalize(&cwd).unwrap_or(cwd))
}
