//! Path resolution for raw reference strings.
//!
//! Resolution is purely lexical: the target does not need to exist, and
//! symlinks are not followed. Existence is checked later by the graph builder.

use std::path::{Component, Path, PathBuf};

use crate::error::UnsupportedSpecifier;
use crate::resource::PathType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub path: PathBuf,
    pub path_type: PathType,
}

/// Whether `raw` names a local file (as opposed to a package specifier).
pub fn is_local_reference(raw: &str) -> bool {
    raw.starts_with('.') || raw.starts_with('/')
}

/// Resolve `raw` against the referencing file's directory.
///
/// Root-relative strings (`/lib/a.js`) resolve against `project_root` when
/// given, otherwise against `origin_dir`.
pub fn resolve(
    raw: &str,
    origin_dir: &Path,
    project_root: Option<&Path>,
) -> Result<ResolvedPath, UnsupportedSpecifier> {
    if raw.starts_with('/') {
        let base = project_root.unwrap_or(origin_dir);
        Ok(ResolvedPath {
            path: normalize_path(&base.join(format!(".{}", raw))),
            path_type: PathType::RootRelative,
        })
    } else if raw.starts_with('.') {
        Ok(ResolvedPath {
            path: normalize_path(&origin_dir.join(raw)),
            path_type: PathType::Relative,
        })
    } else {
        Err(UnsupportedSpecifier(raw.to_string()))
    }
}

/// Collapse `.` and `..` components without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = match out.components().next_back() {
                    Some(Component::Normal(_)) => out.pop(),
                    Some(Component::RootDir) | Some(Component::Prefix(_)) => true,
                    _ => false,
                };
                if !popped {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Absolute, normalized form of `path`. Relative paths are taken against the
/// current working directory.
pub fn absolute_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return normalize_path(path);
    }
    match std::env::current_dir() {
        Ok(cwd) => normalize_path(&cwd.join(path)),
        Err(e) => {
            tracing::warn!("Cannot read working directory for {}: {}", path.display(), e);
            normalize_path(path)
        }
    }
}

/// Project-relative filename for a resolved path.
///
/// Relative resources are expressed against `root_dir` (`./x`, `../x`);
/// root-relative resources against `root_base` (`/x`).
pub fn project_filename(
    resolved: &Path,
    path_type: PathType,
    root_dir: &Path,
    root_base: &Path,
) -> String {
    if path_type == PathType::RootRelative {
        if let Some(rel) = pathdiff::diff_paths(resolved, root_base) {
            let rel = to_slash(&rel);
            if !rel.starts_with("..") {
                return format!("/{}", rel);
            }
        }
    }

    match pathdiff::diff_paths(resolved, root_dir) {
        Some(rel) => {
            let rel = to_slash(&rel);
            if rel.starts_with("..") {
                rel
            } else {
                format!("./{}", rel)
            }
        }
        None => to_slash(resolved),
    }
}

/// Directories a single build computes filenames against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    /// Directory of the originating document or module.
    pub root_dir: PathBuf,
    /// Project root when known, otherwise `root_dir`.
    pub root_base: PathBuf,
}

impl ProjectPaths {
    /// Both directories are made absolute so every resolved path shares one
    /// spelling.
    pub fn new(root_dir: &Path, project_root: Option<&Path>) -> Self {
        let root_dir = absolute_path(root_dir);
        let root_base = project_root
            .map(absolute_path)
            .unwrap_or_else(|| root_dir.clone());
        ProjectPaths {
            root_dir,
            root_base,
        }
    }

    /// Resolve a reference found in a file located in `origin_dir`.
    pub fn resolve(
        &self,
        raw: &str,
        origin_dir: &Path,
    ) -> Result<ResolvedPath, UnsupportedSpecifier> {
        resolve(raw, origin_dir, Some(&self.root_base))
    }

    pub fn filename(&self, resolved: &Path, path_type: PathType) -> String {
        project_filename(resolved, path_type, &self.root_dir, &self.root_base)
    }
}

/// Attachment literal as a resolvable reference, or `None` for URLs.
///
/// Bare names are sibling-relative: `data.csv` becomes `./data.csv`.
pub fn attachment_reference(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.contains("://") || raw.starts_with("data:") {
        return None;
    }
    if is_local_reference(raw) {
        Some(raw.to_string())
    } else {
        Some(format!("./{}", raw))
    }
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .filter(|s| s != "/")
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative() {
        let resolved = resolve("./a.js", Path::new("/proj/sub"), None).unwrap();
        assert_eq!(resolved.path, PathBuf::from("/proj/sub/a.js"));
        assert_eq!(resolved.path_type, PathType::Relative);

        let resolved = resolve("../lib/b.js", Path::new("/proj/sub"), None).unwrap();
        assert_eq!(resolved.path, PathBuf::from("/proj/lib/b.js"));
    }

    #[test]
    fn test_resolve_root_relative_uses_project_root() {
        let resolved = resolve(
            "/lib/a.js",
            Path::new("/proj/sub"),
            Some(Path::new("/proj")),
        )
        .unwrap();
        assert_eq!(resolved.path, PathBuf::from("/proj/lib/a.js"));
        assert_eq!(resolved.path_type, PathType::RootRelative);
    }

    #[test]
    fn test_resolve_root_relative_without_project_root() {
        let resolved = resolve("/lib/a.js", Path::new("/proj/sub"), None).unwrap();
        assert_eq!(resolved.path, PathBuf::from("/proj/sub/lib/a.js"));
    }

    #[test]
    fn test_bare_specifier_rejected() {
        assert!(resolve("d3", Path::new("/proj"), None).is_err());
        assert!(resolve("npm:lodash", Path::new("/proj"), None).is_err());
        assert!(!is_local_reference("@observablehq/plot"));
        assert!(is_local_reference("../x.js"));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/a/b/./c/../d.js")),
            PathBuf::from("/a/b/d.js")
        );
        assert_eq!(normalize_path(Path::new("/../a")), PathBuf::from("/a"));
        assert_eq!(normalize_path(Path::new("../a/../b")), PathBuf::from("../b"));
    }

    #[test]
    fn test_absolute_path() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(absolute_path(Path::new("sub/../doc.qmd")), cwd.join("doc.qmd"));
        assert_eq!(absolute_path(Path::new("/a/./b")), PathBuf::from("/a/b"));

        let paths = ProjectPaths::new(Path::new("sub"), Some(Path::new(".")));
        assert_eq!(paths.root_dir, cwd.join("sub"));
        assert_eq!(paths.root_base, cwd);
    }

    #[test]
    fn test_attachment_reference() {
        assert_eq!(attachment_reference("data.csv"), Some("./data.csv".into()));
        assert_eq!(attachment_reference("./a/b.csv"), Some("./a/b.csv".into()));
        assert_eq!(attachment_reference("/data/x.json"), Some("/data/x.json".into()));
        assert_eq!(attachment_reference("https://example.com/x.csv"), None);
        assert_eq!(attachment_reference("data:text/plain,hi"), None);
        assert_eq!(attachment_reference("  "), None);
    }

    #[test]
    fn test_project_paths_resolve() {
        let paths = ProjectPaths::new(Path::new("/proj/sub"), Some(Path::new("/proj")));
        let resolved = paths.resolve("/lib/a.js", Path::new("/proj/sub/deep")).unwrap();
        assert_eq!(resolved.path, PathBuf::from("/proj/lib/a.js"));
        assert_eq!(paths.filename(&resolved.path, resolved.path_type), "/lib/a.js");

        let standalone = ProjectPaths::new(Path::new("/docs"), None);
        assert_eq!(standalone.root_base, PathBuf::from("/docs"));
    }

    #[test]
    fn test_project_filename() {
        let root = Path::new("/proj/sub");
        assert_eq!(
            project_filename(Path::new("/proj/sub/a.js"), PathType::Relative, root, root),
            "./a.js"
        );
        assert_eq!(
            project_filename(Path::new("/proj/lib/a.js"), PathType::Relative, root, root),
            "../lib/a.js"
        );
        assert_eq!(
            project_filename(
                Path::new("/proj/lib/a.js"),
                PathType::RootRelative,
                root,
                Path::new("/proj")
            ),
            "/lib/a.js"
        );
    }
}
