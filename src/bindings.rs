//! Node bindings.
//!
//! Options are passed as a JSON `ResolverConfig`; results come back as JSON.

use napi_derive::napi;
use std::path::Path;
use std::sync::Arc;

use crate::config::{Dialect, ResolverConfig};
use crate::graph::{DependencyGraphBuilder, RootSource};
use crate::package::{package_plain, package_self_contained, CommandBundler};
use crate::recover::CommandCompiler;
use crate::resource::ResolvedGraph;

fn builder_from(options: Option<serde_json::Value>) -> napi::Result<DependencyGraphBuilder> {
    let config: ResolverConfig = match options {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| napi::Error::from_reason(format!("Invalid options: {}", e)))?,
        None => ResolverConfig::default(),
    };
    Ok(DependencyGraphBuilder::new(config).with_compiler(Arc::new(CommandCompiler::default())))
}

fn to_json(graph: &ResolvedGraph) -> napi::Result<serde_json::Value> {
    serde_json::to_value(graph).map_err(|e| napi::Error::from_reason(e.to_string()))
}

#[napi]
pub fn resolve_document_native(
    path: String,
    options: Option<serde_json::Value>,
) -> napi::Result<serde_json::Value> {
    let builder = builder_from(options)?;
    let graph = builder
        .resolve_document(Path::new(&path))
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    to_json(&graph)
}

#[napi]
pub fn resolve_source_native(
    source: String,
    root_dir: String,
    dialect: Option<String>,
    options: Option<serde_json::Value>,
) -> napi::Result<serde_json::Value> {
    let dialect = match dialect.as_deref() {
        None | Some("script") => Dialect::Script,
        Some("plainJs") => Dialect::PlainJs,
        Some(other) => {
            return Err(napi::Error::from_reason(format!(
                "Unknown dialect '{}'",
                other
            )))
        }
    };
    let builder = builder_from(options)?;
    let root = RootSource::script(source, root_dir).with_dialect(dialect);
    let graph = builder
        .build_graph(&root)
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    to_json(&graph)
}

#[napi]
pub fn package_document_native(
    path: String,
    self_contained: bool,
    options: Option<serde_json::Value>,
) -> napi::Result<serde_json::Value> {
    let builder = builder_from(options)?;
    let graph = builder
        .resolve_document(Path::new(&path))
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;

    let packaged = if self_contained {
        let inlined = package_self_contained(&graph, builder.config(), &CommandBundler::default())
            .map_err(|e| napi::Error::from_reason(e.to_string()))?;
        serde_json::to_value(inlined)
    } else {
        serde_json::to_value(package_plain(&graph))
    };
    packaged.map_err(|e| napi::Error::from_reason(e.to_string()))
}
