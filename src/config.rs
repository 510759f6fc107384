//! Resolver configuration.
//!
//! Dialect extensions and the attachment function name are passed explicitly
//! to every component instead of living in process-wide state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ResolveError;

/// How a file's content is interpreted during traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Dialect {
    /// The reactive cell dialect (`.ojs`).
    Script,
    /// Standard ES modules (`.js`, `.mjs`).
    PlainJs,
    /// A document whose script cells are concatenated and read as `Script`.
    Document,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolverConfig {
    /// Callee name recognized as an attachment reference.
    pub attachment_function: String,
    /// Cell language tag of the script dialect inside documents.
    pub script_language: String,
    pub script_extensions: Vec<String>,
    pub module_extensions: Vec<String>,
    pub document_extensions: Vec<String>,
    /// Extension eligible for missing-module recovery.
    pub recoverable_extension: String,
    /// Typed-superset extension looked up next to a missing module.
    pub typed_extension: String,
    /// Root-relative references resolve here when set.
    pub project_root: Option<PathBuf>,
    /// Files whose presence marks a project root.
    pub project_markers: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            attachment_function: "FileAttachment".to_string(),
            script_language: "ojs".to_string(),
            script_extensions: vec!["ojs".to_string()],
            module_extensions: vec!["js".to_string(), "mjs".to_string()],
            document_extensions: vec![
                "qmd".to_string(),
                "md".to_string(),
                "rmd".to_string(),
                "ipynb".to_string(),
            ],
            recoverable_extension: "js".to_string(),
            typed_extension: "ts".to_string(),
            project_root: None,
            project_markers: vec!["_quarto.yml".to_string(), "_quarto.yaml".to_string()],
        }
    }
}

impl ResolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = Some(root.into());
        self
    }

    pub fn dialect_for_path(&self, path: &Path) -> Result<Dialect, ResolveError> {
        if self.is_module(path) {
            Ok(Dialect::PlainJs)
        } else if self.is_script(path) {
            Ok(Dialect::Script)
        } else if self.is_document(path) {
            Ok(Dialect::Document)
        } else {
            Err(ResolveError::UnknownDialect(path.to_path_buf()))
        }
    }

    pub fn is_document(&self, path: &Path) -> bool {
        matches_any(&extension_of(path), &self.document_extensions)
    }

    pub fn is_script(&self, path: &Path) -> bool {
        matches_any(&extension_of(path), &self.script_extensions)
    }

    pub fn is_module(&self, path: &Path) -> bool {
        matches_any(&extension_of(path), &self.module_extensions)
    }

    pub fn is_recoverable(&self, path: &Path) -> bool {
        extension_of(path).eq_ignore_ascii_case(&self.recoverable_extension)
    }

    /// Nearest ancestor of `start_dir` (inclusive) containing a project marker.
    pub fn find_project_root(&self, start_dir: &Path) -> Option<PathBuf> {
        start_dir
            .ancestors()
            .find(|dir| {
                self.project_markers
                    .iter()
                    .any(|marker| dir.join(marker).is_file())
            })
            .map(Path::to_path_buf)
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_string())
        .unwrap_or_default()
}

fn matches_any(ext: &str, candidates: &[String]) -> bool {
    !ext.is_empty() && candidates.iter().any(|c| c.eq_ignore_ascii_case(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_for_path() {
        let config = ResolverConfig::default();
        assert_eq!(
            config.dialect_for_path(Path::new("/p/a.js")).unwrap(),
            Dialect::PlainJs
        );
        assert_eq!(
            config.dialect_for_path(Path::new("/p/a.ojs")).unwrap(),
            Dialect::Script
        );
        assert_eq!(
            config.dialect_for_path(Path::new("/p/doc.QMD")).unwrap(),
            Dialect::Document
        );
        assert!(matches!(
            config.dialect_for_path(Path::new("/p/style.css")),
            Err(ResolveError::UnknownDialect(_))
        ));
        assert!(config.dialect_for_path(Path::new("/p/Makefile")).is_err());
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: ResolverConfig = serde_json::from_str(
            r#"{ "attachmentFunction": "Attach", "projectRoot": "/proj" }"#,
        )
        .unwrap();
        assert_eq!(config.attachment_function, "Attach");
        assert_eq!(config.project_root, Some(PathBuf::from("/proj")));
        assert_eq!(config.script_language, "ojs");
    }

    #[test]
    fn test_find_project_root() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("_quarto.yml"), "project: {}").unwrap();

        let config = ResolverConfig::default();
        assert_eq!(
            config.find_project_root(&nested),
            Some(dir.path().to_path_buf())
        );
    }
}
