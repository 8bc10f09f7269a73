//! Workspace sandbox enforcement.
//!
//! Every filesystem tool resolves its paths through [`validate_path`].
//! Containment is checked against the *symlink-resolved* form of the
//! requested path: the deepest ancestor that exists on disk is
//! canonicalized, any not-yet-created tail is re-applied, and the result
//! must still sit under the canonical workspace root.

use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Validate a tool-supplied path and pin it inside the workspace root.
/// Returns the resolved absolute path, or a human-readable refusal.
pub fn validate_path(workspace_root: &Path, requested: &str) -> Result<PathBuf, String> {
    let relative = Path::new(requested);
    if relative.is_absolute() {
        return Err(format!(
            "path '{requested}' is absolute; tools take workspace-relative paths"
        ));
    }
    if relative
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(format!("path '{requested}' contains '..'"));
    }

    let root = workspace_root.canonicalize().map_err(|e| {
        format!(
            "workspace root '{}' is not resolvable: {e}",
            workspace_root.display()
        )
    })?;

    let resolved = resolve_existing_prefix(&root.join(relative))
        .map_err(|e| format!("cannot resolve '{requested}': {e}"))?;

    if resolved.starts_with(&root) {
        Ok(resolved)
    } else {
        Err(format!(
            "path '{requested}' escapes the workspace after symlink resolution"
        ))
    }
}

/// Canonicalize a path that may not fully exist yet.
///
/// Walks upward on `NotFound`, canonicalizes the deepest ancestor the
/// filesystem knows about (following its symlinks), then re-appends the
/// missing components unchanged.
fn resolve_existing_prefix(path: &Path) -> io::Result<PathBuf> {
    let mut missing: Vec<OsString> = Vec::new();
    let mut cursor = path;

    loop {
        match cursor.canonicalize() {
            Ok(mut real) => {
                for name in missing.iter().rev() {
                    real.push(name);
                }
                return Ok(real);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let Some(parent) = cursor.parent() else {
                    return Err(e);
                };
                if let Some(name) = cursor.file_name() {
                    missing.push(name.to_os_string());
                }
                cursor = parent;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tmp_workspace() -> TempDir {
        TempDir::new().expect("failed to create temp dir")
    }

    #[test]
    fn rejects_parent_traversal() {
        let ws = tmp_workspace();
        let result = validate_path(ws.path(), "../etc/passwd");
        assert!(result.is_err());
        assert!(result.unwrap_err().contains(".."));
    }

    #[test]
    fn rejects_absolute_path() {
        let ws = tmp_workspace();
        let abs_path = if cfg!(windows) { "C:\\Windows\\System32" } else { "/etc/passwd" };
        let result = validate_path(ws.path(), abs_path);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("absolute"));
    }

    #[test]
    fn accepts_existing_file() {
        let ws = tmp_workspace();
        std::fs::write(ws.path().join("hello.txt"), "hi").unwrap();
        let result = validate_path(ws.path(), "hello.txt");
        assert!(result.is_ok());
        assert!(result.unwrap().ends_with("hello.txt"));
    }

    #[test]
    fn accepts_nested_new_file() {
        let ws = tmp_workspace();
        std::fs::create_dir_all(ws.path().join("subdir")).unwrap();
        let result = validate_path(ws.path(), "subdir/new_file.txt");
        assert!(result.is_ok());
    }

    #[test]
    fn resolves_missing_tail_under_existing_ancestor() {
        let ws = tmp_workspace();
        let resolved = validate_path(ws.path(), "a/b/c.txt").unwrap();
        assert!(resolved.starts_with(ws.path().canonicalize().unwrap()));
        assert!(resolved.ends_with("a/b/c.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlink_escape() {
        let ws = tmp_workspace();
        let outside = tmp_workspace();
        std::os::unix::fs::symlink(outside.path(), ws.path().join("link")).unwrap();
        std::fs::write(outside.path().join("secret.txt"), "s").unwrap();

        let result = validate_path(ws.path(), "link/secret.txt");
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("escapes the workspace"));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_new_file_behind_escaping_symlink() {
        let ws = tmp_workspace();
        let outside = tmp_workspace();
        std::os::unix::fs::symlink(outside.path(), ws.path().join("link")).unwrap();

        // The target does not exist yet; the symlinked ancestor still
        // resolves outside the root.
        let result = validate_path(ws.path(), "link/new.txt");
        assert!(result.is_err());
    }
}
