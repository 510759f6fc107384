//! Packaging of a resolved resource set.
//!
//! Plain mode lists project-relative filenames for copying next to the
//! rendered output. Self-contained mode inlines every resource as a base64
//! `data:` URL so the output needs no external files.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use indexmap::{IndexMap, IndexSet};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::config::ResolverConfig;
use crate::error::PackageError;
use crate::resource::{ResolvedGraph, ResourceDescription};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlinedResource {
    pub mime_type: String,
    /// `data:<mime>;base64,<content>`
    pub payload: String,
}

impl InlinedResource {
    pub fn new(mime_type: &str, content: &[u8]) -> Self {
        InlinedResource {
            mime_type: mime_type.to_string(),
            payload: format!("data:{};base64,{}", mime_type, STANDARD.encode(content)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUNDLER INTERFACE
// ═══════════════════════════════════════════════════════════════════════════════

pub trait ModuleBundler: Send + Sync {
    /// Bundle the ES module `entry` into a single module. Relative specifiers
    /// in `entry` resolve against `resolve_dir`.
    fn bundle(&self, entry: &str, resolve_dir: &Path) -> Result<String, String>;
}

/// Runs an external bundler (`esbuild` by default) with the entry on stdin.
#[derive(Debug, Clone)]
pub struct CommandBundler {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for CommandBundler {
    fn default() -> Self {
        CommandBundler {
            program: "esbuild".to_string(),
            args: ["--bundle", "--format=esm", "--loader=js", "--log-level=error"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl CommandBundler {
    pub fn new(program: impl Into<String>) -> Self {
        CommandBundler {
            program: program.into(),
            ..Self::default()
        }
    }
}

impl ModuleBundler for CommandBundler {
    fn bundle(&self, entry: &str, resolve_dir: &Path) -> Result<String, String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(resolve_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("Failed to run {}: {}", self.program, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(entry.as_bytes())
                .map_err(|e| format!("Failed to write bundle entry: {}", e))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| format!("Failed to wait for {}: {}", self.program, e))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).to_string())
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PLAIN MODE
// ═══════════════════════════════════════════════════════════════════════════════

/// De-duplicated project-relative filenames, in resolution order.
///
/// Document nodes were already dropped by the graph builder; a document
/// referenced as an attachment is a plain file and is listed.
pub fn package_plain(graph: &ResolvedGraph) -> Vec<String> {
    let filenames: IndexSet<&str> = graph
        .resources
        .iter()
        .map(|r| r.filename.as_str())
        .collect();
    filenames.into_iter().map(str::to_string).collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// SELF-CONTAINED MODE
// ═══════════════════════════════════════════════════════════════════════════════

/// Inline every resource of `graph`.
///
/// Keys are the raw import string for imports and the filename for
/// attachments. All plain-ES imports share one bundled payload. When two
/// different files are imported under the same string, the later one is keyed
/// by its filename instead.
pub fn package_self_contained(
    graph: &ResolvedGraph,
    config: &ResolverConfig,
    bundler: &dyn ModuleBundler,
) -> Result<IndexMap<String, InlinedResource>, PackageError> {
    let mut modules = Vec::new();
    let mut individual = Vec::new();
    for resource in &graph.resources {
        if resource.is_import() && config.is_module(&resource.path) {
            modules.push(resource);
        } else {
            individual.push(resource);
        }
    }

    let mut inlined = PayloadMap::default();

    if !modules.is_empty() {
        let entry = synthetic_entry(modules.iter().map(|r| &r.path));
        tracing::info!("Bundling {} module(s) for inlining", modules.len());
        let bundled = bundler
            .bundle(&entry, &graph.root_dir)
            .map_err(|message| PackageError::Bundle {
                count: modules.len(),
                message,
            })?;
        let shared = InlinedResource::new("application/javascript", bundled.as_bytes());
        for module in &modules {
            inlined.insert(module, shared.clone());
        }
    }

    let payloads = individual
        .par_iter()
        .map(|r| inline_file(&r.path))
        .collect::<Result<Vec<_>, PackageError>>()?;

    for (resource, payload) in individual.iter().zip(payloads) {
        inlined.insert(resource, payload);
    }

    Ok(inlined.payloads)
}

/// Inlined payloads plus the file each key was taken for.
#[derive(Default)]
struct PayloadMap {
    payloads: IndexMap<String, InlinedResource>,
    owners: HashMap<String, PathBuf>,
}

impl PayloadMap {
    /// Key by import string (imports) or filename (attachments). A key taken by
    /// a different file falls through to the filename, then the absolute path.
    fn insert(&mut self, resource: &ResourceDescription, payload: InlinedResource) {
        let primary = if resource.is_import() {
            resource.import_path.as_str()
        } else {
            resource.filename.as_str()
        };
        let absolute = resource.path.to_string_lossy();

        for key in [primary, resource.filename.as_str(), &*absolute] {
            match self.owners.get(key) {
                Some(owner) if *owner == resource.path => return,
                Some(owner) => tracing::warn!(
                    "'{}' already names {}; re-keying {}",
                    key,
                    owner.display(),
                    resource.path.display()
                ),
                None => {
                    self.owners.insert(key.to_string(), resource.path.clone());
                    self.payloads.insert(key.to_string(), payload);
                    return;
                }
            }
        }
    }
}

/// One module re-exporting each path, sorted so the bundle input does not
/// depend on traversal order.
pub fn synthetic_entry<'p>(paths: impl Iterator<Item = &'p PathBuf>) -> String {
    let mut sorted: Vec<String> = paths.map(|p| p.to_string_lossy().to_string()).collect();
    sorted.sort();
    sorted.dedup();
    sorted
        .iter()
        .map(|p| {
            let quoted = serde_json::to_string(p).unwrap_or_else(|_| format!("\"{}\"", p));
            format!("export * from {};", quoted)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn inline_file(path: &Path) -> Result<InlinedResource, PackageError> {
    let content = fs::read(path).map_err(|source| PackageError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(InlinedResource::new(mime_type(path, &content), &content))
}

/// MIME type from the extension, falling back to content sniffing.
pub fn mime_type(path: &Path, content: &[u8]) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "js" | "mjs" => "application/javascript",
        "ojs" => "text/plain",
        "json" | "topojson" => "application/json",
        "geojson" => "application/geo+json",
        "csv" => "text/csv",
        "tsv" => "text/tab-separated-values",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "arrow" => "application/vnd.apache.arrow.file",
        "parquet" => "application/vnd.apache.parquet",
        "sqlite" | "db" => "application/x-sqlite3",
        "wasm" => "application/wasm",
        _ => {
            if std::str::from_utf8(content).is_ok() {
                "text/plain"
            } else {
                "application/octet-stream"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type() {
        assert_eq!(mime_type(Path::new("a.CSV"), b""), "text/csv");
        assert_eq!(mime_type(Path::new("a.js"), b""), "application/javascript");
        assert_eq!(mime_type(Path::new("notes"), b"hello"), "text/plain");
        assert_eq!(
            mime_type(Path::new("blob.bin"), &[0xff, 0xfe, 0x00]),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_inlined_payload() {
        let inlined = InlinedResource::new("text/plain", b"hi");
        assert_eq!(inlined.payload, "data:text/plain;base64,aGk=");
    }

    #[test]
    fn test_synthetic_entry_sorted() {
        let paths = vec![PathBuf::from("/p/b.js"), PathBuf::from("/p/a.js")];
        assert_eq!(
            synthetic_entry(paths.iter()),
            "export * from \"/p/a.js\";\nexport * from \"/p/b.js\";"
        );
    }
}
