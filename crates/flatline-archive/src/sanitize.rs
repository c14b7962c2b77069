use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Result of sanitizing an archive entry path against a base directory.
#[derive(Clone, Debug)]
pub struct SanitizedPath {
    pub original: String,
    pub relative: PathBuf,
    pub resolved: PathBuf,
}

/// Normalize an archive entry name into a relative path.
///
/// Backslashes count as separators regardless of platform. Absolute names,
/// drive prefixes, NUL bytes and `..` components that climb above the
/// archive root are rejected.
pub fn normalize_entry_name(name: &str) -> Result<PathBuf> {
    if name.contains('\0') {
        return Err(Error::InvalidPath);
    }

    let unified = name.replace('\\', "/");
    if unified.starts_with('/') || has_drive_prefix(&unified) {
        return Err(Error::UnsafePath {
            entry: name.to_string(),
            resolved: PathBuf::from(unified),
        });
    }

    let mut parts: Vec<&str> = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(Error::UnsafePath {
                        entry: name.to_string(),
                        resolved: PathBuf::from(unified.as_str()),
                    });
                }
            }
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return Err(Error::InvalidPath);
    }

    Ok(parts.iter().collect())
}

/// Sanitize an entry name and resolve it strictly inside `base`.
pub fn sanitize_path<B: AsRef<Path>>(entry_name: &str, base: B) -> Result<SanitizedPath> {
    let base = base.as_ref();
    let relative = normalize_entry_name(entry_name)?;
    let resolved = normalize_path(&base.join(&relative));

    if !resolved.starts_with(base) || resolved == base {
        return Err(Error::UnsafePath {
            entry: entry_name.to_string(),
            resolved,
        });
    }

    Ok(SanitizedPath {
        original: entry_name.to_string(),
        relative,
        resolved,
    })
}

/// Reduce a name to `[A-Za-z0-9._-]`, replacing everything else with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    const MAX_LEN: usize = 120;

    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_LEN)
        .collect();

    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

fn has_drive_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Resolve `.` and `..` lexically.
fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::Normal(part) => result.push(part),
            Component::RootDir => result.push(component.as_os_str()),
            Component::Prefix(prefix) => result.push(prefix.as_os_str()),
            Component::CurDir => {}
        }
    }

    result
}
