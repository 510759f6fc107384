//! Discovery Module
//!
//! Scans a project directory for documents that carry script cells and
//! resolves each of them with the project root set, so root-relative
//! references agree across every document of the project.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::config::ResolverConfig;
use crate::error::ResolveError;
use crate::graph::DependencyGraphBuilder;
use crate::resource::ResolvedGraph;
use crate::segment::script_cells;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResources {
    pub document: PathBuf,
    pub graph: ResolvedGraph,
}

/// Documents under `project_root` with at least one script cell, sorted.
pub fn discover_documents(project_root: &Path, config: &ResolverConfig) -> Vec<PathBuf> {
    let mut documents = Vec::new();

    let walker = WalkDir::new(project_root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored_dir(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || !config.is_document(path) {
            continue;
        }

        match fs::read_to_string(path) {
            Ok(text) => {
                if !script_cells(path, &text, config).is_empty() {
                    documents.push(path.to_path_buf());
                }
            }
            Err(e) => tracing::warn!("Failed to read document {}: {}", path.display(), e),
        }
    }

    documents.sort();
    documents
}

fn is_ignored_dir(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name.starts_with('_') || name == "node_modules"
}

/// Resolve every script-bearing document of a project.
///
/// The builder's configuration is reused with `project_root` overridden.
pub fn resolve_project(
    project_root: &Path,
    builder: &DependencyGraphBuilder,
) -> Result<Vec<DocumentResources>, ResolveError> {
    let config = builder
        .config()
        .clone()
        .with_project_root(project_root.to_path_buf());
    let documents = discover_documents(project_root, &config);
    let project_builder = builder.clone().with_config(config);

    documents
        .into_iter()
        .map(|document| {
            let graph = project_builder.resolve_document(&document)?;
            Ok(DocumentResources { document, graph })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_discover_documents_skips_ignored_dirs() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "index.qmd", "```{ojs}\nx = 1\n```\n");
        write(dir.path(), "about.qmd", "No cells here.\n");
        write(dir.path(), "posts/one.md", "```{ojs}\ny = 2\n```\n");
        write(dir.path(), "_site/index.qmd", "```{ojs}\nx = 1\n```\n");
        write(dir.path(), "node_modules/pkg/readme.md", "```{ojs}\nz = 3\n```\n");

        let found = discover_documents(dir.path(), &ResolverConfig::default());
        assert_eq!(
            found,
            vec![dir.path().join("index.qmd"), dir.path().join("posts/one.md")]
        );
    }

    #[test]
    fn test_resolve_project_uses_project_root() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "_quarto.yml", "project:\n  type: website\n");
        write(dir.path(), "lib/shared.js", "export const s = 1;");
        write(
            dir.path(),
            "posts/one.qmd",
            "```{ojs}\nimport {s} from \"/lib/shared.js\"\n```\n",
        );

        let builder = DependencyGraphBuilder::default();
        let results = resolve_project(dir.path(), &builder).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document, dir.path().join("posts/one.qmd"));

        let resources = &results[0].graph.resources;
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].filename, "/lib/shared.js");
        assert!(results[0].graph.diagnostics.is_empty());
    }
}
