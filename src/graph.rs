//! # Dependency Graph Builder
//!
//! Turns a root script source into the de-duplicated set of resources it
//! transitively depends on.
//!
//! ## Traversal Invariants
//!
//! 1. **Worklist**: `pending` is an insertion-ordered map keyed by resolved
//!    absolute path. Entries are popped front-first.
//! 2. **Visit Once**: a path is marked visited before its file is read, and a
//!    visited path is never enqueued again. Cycles terminate.
//! 3. **First Seen Wins**: a path reached through a second spelling or a
//!    second referent keeps its first `ResourceDescription`.
//! 4. **Attachments Are Leaves**: attachments are checked for existence but
//!    never read or parsed.
//! 5. **Relative To The Referencing File**: references are resolved against
//!    the directory of the file they appear in. Root-relative references use
//!    the project root, or the originating document's directory.
//! 6. **Documents Are Traversal-Only**: document nodes are expanded but
//!    removed from the final resource set.
//! 7. **Degrade, Don't Abort**: unreadable references and unparsable files
//!    become diagnostics. Only recovery compile failures and unknown dialects
//!    abort the build.

use indexmap::{IndexMap, IndexSet};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::{Dialect, ResolverConfig};
use crate::error::ResolveError;
use crate::extract::{extract_references, ExtractedReferences};
use crate::path::{absolute_path, attachment_reference, ProjectPaths};
use crate::recover::{recover, CleanupRegistry, ModuleCompiler};
use crate::resource::{
    referent_display, Diagnostic, ResolvedGraph, ResourceDescription, ResourceType,
};
use crate::segment::script_cells;

static BUILD_COUNTER: AtomicU64 = AtomicU64::new(0);

// ═══════════════════════════════════════════════════════════════════════════════
// ROOT SOURCES
// ═══════════════════════════════════════════════════════════════════════════════

/// Starting point of a resolve pass.
#[derive(Debug, Clone)]
pub struct RootSource {
    /// Script sources, one per cell. Each is parsed independently.
    pub cells: Vec<String>,
    /// Directory relative references in the root resolve against.
    pub dir: PathBuf,
    pub dialect: Dialect,
    /// Root file on disk, when there is one.
    pub path: Option<PathBuf>,
}

impl RootSource {
    /// Free-standing script-dialect source with an artificial referent.
    pub fn script(source: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        RootSource {
            cells: vec![source.into()],
            dir: dir.into(),
            dialect: Dialect::Script,
            path: None,
        }
    }

    /// Script cells already extracted from a document.
    pub fn cells(cells: Vec<String>, dir: impl Into<PathBuf>) -> Self {
        RootSource {
            cells,
            dir: dir.into(),
            dialect: Dialect::Document,
            path: None,
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUILDER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Default)]
pub struct DependencyGraphBuilder {
    config: ResolverConfig,
    compiler: Option<Arc<dyn ModuleCompiler>>,
    cleanup: Option<Arc<dyn CleanupRegistry>>,
}

impl DependencyGraphBuilder {
    pub fn new(config: ResolverConfig) -> Self {
        DependencyGraphBuilder {
            config,
            compiler: None,
            cleanup: None,
        }
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn ModuleCompiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    pub fn with_cleanup_registry(mut self, registry: Arc<dyn CleanupRegistry>) -> Self {
        self.cleanup = Some(registry);
        self
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve the script cells of a document on disk.
    pub fn resolve_document(&self, path: &Path) -> Result<ResolvedGraph, ResolveError> {
        let text = read_root(path)?;
        let cells = script_cells(path, &text, &self.config);
        let root = RootSource::cells(cells, parent_dir(path)).with_path(path);
        self.build_graph(&root)
    }

    /// Resolve a standalone script, module or document file.
    pub fn resolve_file(&self, path: &Path) -> Result<ResolvedGraph, ResolveError> {
        let dialect = self.config.dialect_for_path(path)?;
        if dialect == Dialect::Document {
            return self.resolve_document(path);
        }
        let source = read_root(path)?;
        let root = RootSource::script(source, parent_dir(path))
            .with_dialect(dialect)
            .with_path(path);
        self.build_graph(&root)
    }

    pub fn build_graph(&self, root: &RootSource) -> Result<ResolvedGraph, ResolveError> {
        let paths = ProjectPaths::new(&root.dir, self.config.project_root.as_deref());
        let build_id = build_id(root);
        tracing::debug!(
            "Resolving dependencies of {} ({})",
            referent_display(root.path.as_ref()),
            build_id
        );

        let mut traversal = Traversal {
            builder: self,
            paths: &paths,
            build_id: &build_id,
            pending: IndexMap::new(),
            visited: IndexSet::new(),
            resolved: IndexMap::new(),
            module_attachments: Vec::new(),
            diagnostics: Vec::new(),
            side_effect_files: Vec::new(),
        };

        let root_referent = root.path.as_deref().map(absolute_path);
        if let Some(path) = &root_referent {
            traversal.visited.insert(path.clone());
        }

        let root_dir = paths.root_dir.clone();
        let refs = traversal.extract_cells(&root.cells, root.dialect, root_referent.as_ref());
        for raw in &refs.imports {
            traversal.enqueue(raw, &root_dir, root_referent.as_ref(), ResourceType::Import);
        }
        for raw in &refs.attachments {
            if let Some(reference) = attachment_reference(raw) {
                traversal.enqueue_attachment(raw, &reference, &root_dir, root_referent.as_ref());
            }
        }

        traversal.run()?;
        traversal.collect_module_attachments();
        Ok(traversal.finish())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRAVERSAL STATE
// ═══════════════════════════════════════════════════════════════════════════════

struct Traversal<'b> {
    builder: &'b DependencyGraphBuilder,
    paths: &'b ProjectPaths,
    build_id: &'b str,
    pending: IndexMap<PathBuf, ResourceDescription>,
    visited: IndexSet<PathBuf>,
    /// Accepted resources keyed by absolute path, in acceptance order.
    resolved: IndexMap<PathBuf, ResourceDescription>,
    /// Attachment literals of visited script-dialect modules, in visit order.
    module_attachments: Vec<(PathBuf, Vec<String>)>,
    diagnostics: Vec<Diagnostic>,
    side_effect_files: Vec<PathBuf>,
}

impl<'b> Traversal<'b> {
    fn config(&self) -> &'b ResolverConfig {
        &self.builder.config
    }

    fn is_known(&self, path: &Path) -> bool {
        self.visited.contains(path)
            || self.pending.contains_key(path)
            || self.resolved.contains_key(path)
    }

    fn describe(
        &self,
        raw: &str,
        reference: &str,
        origin_dir: &Path,
        referent: Option<&PathBuf>,
        resource_type: ResourceType,
    ) -> Option<ResourceDescription> {
        let resolved = self.paths.resolve(reference, origin_dir).ok()?;
        Some(ResourceDescription {
            filename: self.paths.filename(&resolved.path, resolved.path_type),
            referent: referent.cloned(),
            import_path: raw.to_string(),
            path_type: resolved.path_type,
            resource_type,
            path: resolved.path,
        })
    }

    fn enqueue(
        &mut self,
        raw: &str,
        origin_dir: &Path,
        referent: Option<&PathBuf>,
        resource_type: ResourceType,
    ) {
        if let Some(resource) = self.describe(raw, raw, origin_dir, referent, resource_type) {
            self.push_pending(resource);
        }
    }

    fn enqueue_attachment(
        &mut self,
        raw: &str,
        reference: &str,
        origin_dir: &Path,
        referent: Option<&PathBuf>,
    ) {
        if let Some(resource) =
            self.describe(raw, reference, origin_dir, referent, ResourceType::Attachment)
        {
            self.push_pending(resource);
        }
    }

    fn push_pending(&mut self, resource: ResourceDescription) {
        if !self.is_known(&resource.path) {
            self.pending.insert(resource.path.clone(), resource);
        }
    }

    fn unresolved(&mut self, resource: &ResourceDescription, reason: String) {
        let diagnostic = Diagnostic::unresolved(resource, reason);
        tracing::warn!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
    }

    fn extract_cells(
        &mut self,
        cells: &[String],
        dialect: Dialect,
        referent: Option<&PathBuf>,
    ) -> ExtractedReferences {
        let mut refs = ExtractedReferences::default();
        for cell in cells {
            match extract_references(cell, dialect, self.config()) {
                Ok(cell_refs) => refs.extend(cell_refs),
                Err(failure) => {
                    let diagnostic = Diagnostic::parse_failure(referent.cloned(), failure.message);
                    tracing::debug!("{}", diagnostic);
                    self.diagnostics.push(diagnostic);
                }
            }
        }
        refs
    }

    fn run(&mut self) -> Result<(), ResolveError> {
        while let Some((path, resource)) = self.pending.shift_remove_index(0) {
            if !self.visited.insert(path.clone()) {
                continue;
            }

            if resource.is_attachment() {
                if path.is_file() {
                    self.resolved.insert(path, resource);
                } else {
                    self.unresolved(&resource, "attachment not found".to_string());
                }
                continue;
            }

            let Some((source, side_effects)) = self.read_module(&resource)? else {
                continue;
            };
            let dialect = self.config().dialect_for_path(&path)?;
            self.resolved.insert(path.clone(), resource);
            for side_effect in side_effects {
                if !self.is_known(&side_effect.path) {
                    self.visited.insert(side_effect.path.clone());
                    self.resolved.insert(side_effect.path.clone(), side_effect);
                }
            }

            let referent = Some(path.clone());
            let refs = match dialect {
                Dialect::Document => {
                    let cells = script_cells(&path, &source, self.config());
                    self.extract_cells(&cells, Dialect::Script, referent.as_ref())
                }
                other => self.extract_cells(&[source], other, referent.as_ref()),
            };

            let dir = parent_dir(&path);
            for raw in &refs.imports {
                self.enqueue(raw, &dir, referent.as_ref(), ResourceType::Import);
            }
            if dialect == Dialect::Script && !refs.attachments.is_empty() {
                self.module_attachments.push((path, refs.attachments));
            }
        }
        Ok(())
    }

    /// Read a module, falling back to recovery for missing `.js` files.
    /// Also returns the other modules a recovery emitted. `Ok(None)` drops the
    /// node with a diagnostic.
    fn read_module(
        &mut self,
        resource: &ResourceDescription,
    ) -> Result<Option<(String, Vec<ResourceDescription>)>, ResolveError> {
        let error = match fs::read_to_string(&resource.path) {
            Ok(source) => return Ok(Some((source, Vec::new()))),
            Err(e) => e,
        };

        if !self.config().is_recoverable(&resource.path) {
            self.unresolved(resource, error.to_string());
            return Ok(None);
        }

        let compiler = self.builder.compiler.as_deref();
        match recover(resource, self.config(), self.paths, compiler)? {
            Some(recovered) => {
                if let Some(registry) = &self.builder.cleanup {
                    registry.register(self.build_id, &recovered.emitted);
                }
                self.side_effect_files.extend(recovered.emitted);
                Ok(Some((recovered.source, recovered.side_effect_files)))
            }
            None => {
                self.unresolved(resource, error.to_string());
                Ok(None)
            }
        }
    }

    /// Attachments referenced inside imported script-dialect modules.
    fn collect_module_attachments(&mut self) {
        let modules = std::mem::take(&mut self.module_attachments);
        for (module, attachments) in modules {
            let imported = self
                .resolved
                .get(&module)
                .map(|r| r.is_import())
                .unwrap_or(false);
            if !imported {
                continue;
            }

            let dir = parent_dir(&module);
            let referent = Some(module.clone());
            for raw in &attachments {
                let Some(reference) = attachment_reference(raw) else {
                    continue;
                };
                let Some(resource) = self.describe(
                    raw,
                    &reference,
                    &dir,
                    referent.as_ref(),
                    ResourceType::Attachment,
                ) else {
                    continue;
                };
                if self.is_known(&resource.path) {
                    continue;
                }
                self.visited.insert(resource.path.clone());
                if resource.path.is_file() {
                    self.resolved.insert(resource.path.clone(), resource);
                } else {
                    self.unresolved(&resource, "attachment not found".to_string());
                }
            }
        }
    }

    fn finish(self) -> ResolvedGraph {
        let config = self.config();
        let resources = self
            .resolved
            .into_values()
            .filter(|r| !(r.is_import() && config.is_document(&r.path)))
            .collect();

        ResolvedGraph {
            build_id: self.build_id.to_string(),
            root_dir: self.paths.root_dir.clone(),
            resources,
            diagnostics: self.diagnostics,
            side_effect_files: self.side_effect_files,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn read_root(path: &Path) -> Result<String, ResolveError> {
    fs::read_to_string(path).map_err(|source| ResolveError::ReadRoot {
        path: path.to_path_buf(),
        source,
    })
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Unique per build, stable prefix per root.
fn build_id(root: &RootSource) -> String {
    let mut hasher = Sha256::new();
    hasher.update(root.dir.to_string_lossy().as_bytes());
    for cell in &root.cells {
        hasher.update(cell.as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    let n = BUILD_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}", &digest[..12], n)
}
