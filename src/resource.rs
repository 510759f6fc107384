//! Resource graph data model.
//!
//! A `ResourceDescription` is created once during a resolve pass and never
//! mutated afterwards. Uniqueness within a resolved set is by resolved
//! absolute path, which makes `filename` unique as well.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Display name used for references coming from an artificial root.
pub const ROOT_REFERENT: &str = "<root>";

// ═══════════════════════════════════════════════════════════════════════════════
// RESOURCE DESCRIPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PathType {
    /// Starts with `.` or `..`, resolved against the referencing file.
    Relative,
    /// Starts with `/`, resolved against the project root or document directory.
    RootRelative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Import,
    Attachment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescription {
    /// Project-relative path, always starting with `./`, `../` or `/`.
    pub filename: String,
    /// File that referenced this resource; `None` for the artificial root.
    pub referent: Option<PathBuf>,
    /// The reference exactly as written in source.
    pub import_path: String,
    pub path_type: PathType,
    pub resource_type: ResourceType,
    /// Resolved absolute path on disk.
    pub path: PathBuf,
}

impl ResourceDescription {
    pub fn is_import(&self) -> bool {
        self.resource_type == ResourceType::Import
    }

    pub fn is_attachment(&self) -> bool {
        self.resource_type == ResourceType::Attachment
    }
}

pub(crate) fn referent_display(referent: Option<&PathBuf>) -> String {
    referent
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| ROOT_REFERENT.to_string())
}

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTICS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiagnosticKind {
    /// A file or cell failed to parse and contributed no references.
    ParseFailure,
    /// A referenced file does not exist and could not be recovered.
    UnresolvedReference,
}

/// Recoverable problem found during a resolve pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub referent: Option<PathBuf>,
    pub import_path: String,
    pub path: Option<PathBuf>,
    pub message: String,
}

impl Diagnostic {
    pub fn unresolved(resource: &ResourceDescription, reason: impl Into<String>) -> Self {
        Diagnostic {
            kind: DiagnosticKind::UnresolvedReference,
            referent: resource.referent.clone(),
            import_path: resource.import_path.clone(),
            path: Some(resource.path.clone()),
            message: reason.into(),
        }
    }

    pub fn parse_failure(referent: Option<PathBuf>, message: impl Into<String>) -> Self {
        Diagnostic {
            kind: DiagnosticKind::ParseFailure,
            referent,
            import_path: String::new(),
            path: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let referent = referent_display(self.referent.as_ref());
        match self.kind {
            DiagnosticKind::UnresolvedReference => write!(
                f,
                "Unable to resolve '{}' referenced from {}: {}",
                self.import_path, referent, self.message
            ),
            DiagnosticKind::ParseFailure => {
                write!(f, "Skipped unparsable script in {}: {}", referent, self.message)
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESOLVED GRAPH
// ═══════════════════════════════════════════════════════════════════════════════

/// Output of one resolve pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedGraph {
    /// Build-scoped identifier used to key side-effect cleanup.
    pub build_id: String,
    /// Directory project-relative filenames are computed against.
    pub root_dir: PathBuf,
    /// De-duplicated resources in discovery order, documents excluded.
    pub resources: Vec<ResourceDescription>,
    pub diagnostics: Vec<Diagnostic>,
    /// Files emitted by missing-module recovery during this build.
    pub side_effect_files: Vec<PathBuf>,
}

impl ResolvedGraph {
    pub fn imports(&self) -> impl Iterator<Item = &ResourceDescription> {
        self.resources.iter().filter(|r| r.is_import())
    }

    pub fn attachments(&self) -> impl Iterator<Item = &ResourceDescription> {
        self.resources.iter().filter(|r| r.is_attachment())
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::UnresolvedReference)
    }
}
