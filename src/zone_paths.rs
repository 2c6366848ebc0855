//! Purpose: Logical object-path validation and local zone-root resolution.
//! Exports: `default_root`, `resolve_local_path`, `split_parent`.
//! Role: Keep local backend and CLI path semantics aligned from one source.
//! Invariants: Default root is `$RODSIO_ROOT`, else `~/.rodsio/zone`.
//! Invariants: Logical paths are absolute and never contain empty, `.` or `..` components.

use std::path::{Path, PathBuf};

pub(crate) const ROOT_ENV: &str = "RODSIO_ROOT";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum ZonePathError {
    NotAbsolute,
    EmptyComponent,
    DotComponent,
    IsRoot,
}

impl ZonePathError {
    pub(crate) fn describe(self) -> &'static str {
        match self {
            ZonePathError::NotAbsolute => "logical path must start with '/'",
            ZonePathError::EmptyComponent => "logical path must not contain empty components",
            ZonePathError::DotComponent => "logical path must not contain '.' or '..'",
            ZonePathError::IsRoot => "logical path must name an object, not the zone root",
        }
    }
}

pub(crate) fn default_root() -> PathBuf {
    if let Some(root) = std::env::var_os(ROOT_ENV) {
        if !root.is_empty() {
            return PathBuf::from(root);
        }
    }
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".rodsio").join("zone")
}

fn components(logical: &str) -> Result<Vec<&str>, ZonePathError> {
    let rest = logical
        .strip_prefix('/')
        .ok_or(ZonePathError::NotAbsolute)?;
    if rest.is_empty() {
        return Err(ZonePathError::IsRoot);
    }
    let mut parts = Vec::new();
    for part in rest.split('/') {
        match part {
            "" => return Err(ZonePathError::EmptyComponent),
            "." | ".." => return Err(ZonePathError::DotComponent),
            part => parts.push(part),
        }
    }
    Ok(parts)
}

pub(crate) fn resolve_local_path(root: &Path, logical: &str) -> Result<PathBuf, ZonePathError> {
    let mut path = root.to_path_buf();
    for part in components(logical)? {
        path.push(part);
    }
    Ok(path)
}

/// Splits `/a/b/c` into (`/a/b`, `c`); a top-level object has parent `/`.
pub(crate) fn split_parent(logical: &str) -> Result<(String, String), ZonePathError> {
    let mut parts = components(logical)?;
    let name = parts.pop().unwrap_or_default().to_string();
    Ok((format!("/{}", parts.join("/")), name))
}
