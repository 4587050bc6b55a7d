use crate::error::{invalid_path, TreeResult};

/// Split a slash-separated tree path into its components.
///
/// Every component must be non-empty, must not be `.` or `..`, and must not
/// contain a NUL byte.
pub fn split_path(path: &str) -> TreeResult<Vec<&str>> {
    if path.is_empty() {
        return Err(invalid_path(path, "empty path"));
    }
    path.split('/')
        .map(|component| match component {
            "" => Err(invalid_path(path, "empty path component")),
            "." | ".." => Err(invalid_path(path, "relative path component")),
            c if c.contains('\0') => Err(invalid_path(path, "NUL in path component")),
            c => Ok(c),
        })
        .collect()
}

/// Join components into a tree path.
pub fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}
