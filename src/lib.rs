//! # Reactive Script Resource Resolver
//!
//! Discovers every file the reactive script cells of a document depend on,
//! and packages them either as a list of files to copy or as inline payloads.
//!
//! ## Pipeline
//!
//! 1. **Segment**: documents are split into cells; only script-dialect cells
//!    are analyzed (`segment`).
//! 2. **Extract**: each cell or file is parsed with oxc and yields its local
//!    import sources and literal attachment references (`extract`).
//! 3. **Resolve**: raw strings become absolute paths. `./x` and `../x`
//!    resolve against the referencing file, `/x` against the project root or
//!    the originating document's directory (`path`).
//! 4. **Traverse**: a worklist visits every reachable module exactly once,
//!    tolerating cycles (`graph`). Missing `.js` modules with a `.ts` sibling
//!    are compiled on the fly (`recover`).
//! 5. **Package**: plain filenames, or base64 `data:` URLs with all plain ES
//!    modules bundled into one shared payload (`package`).
//!
//! ## Error Model
//!
//! - Unparsable sources and unresolvable references are `Diagnostic`s; the
//!   rest of the graph still builds.
//! - A failed recovery compile and an unknown file dialect are `ResolveError`s
//!   and abort the whole resolve call.
//!
//! ## Example
//!
//! ```no_run
//! use ojs_resolver::{package_plain, DependencyGraphBuilder, ResolverConfig};
//! use std::path::Path;
//!
//! let builder = DependencyGraphBuilder::new(ResolverConfig::default());
//! let graph = builder.resolve_document(Path::new("report/index.qmd"))?;
//! for diagnostic in &graph.diagnostics {
//!     eprintln!("{}", diagnostic);
//! }
//! let files = package_plain(&graph);
//! # Ok::<(), ojs_resolver::ResolveError>(())
//! ```

#[cfg(feature = "napi")]
mod bindings;
mod config;
mod discovery;
mod error;
mod extract;
mod graph;
mod package;
mod path;
mod recover;
mod resource;
mod segment;

#[cfg(test)]
mod package_tests;

pub use config::{Dialect, ResolverConfig};
pub use discovery::{discover_documents, resolve_project, DocumentResources};
pub use error::{PackageError, ResolveError, UnsupportedSpecifier};
pub use extract::{
    extract_attachments, extract_imports, extract_references, ExtractedReferences, ParseFailure,
};
pub use graph::{DependencyGraphBuilder, RootSource};
pub use package::{
    mime_type, package_plain, package_self_contained, CommandBundler, InlinedResource,
    ModuleBundler,
};
pub use path::{resolve, ProjectPaths, ResolvedPath};
pub use recover::{
    recover, CleanupRegistry, CommandCompiler, CompileOutcome, CompileRequest, DeferredCleanup,
    ModuleCompiler, RecoveredModule,
};
pub use resource::{
    Diagnostic, DiagnosticKind, PathType, ResolvedGraph, ResourceDescription, ResourceType,
};
pub use segment::{script_cells, Cell, CellKind, DocumentSegmenter, FencedSegmenter, NotebookSegmenter};
