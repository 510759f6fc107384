//! Reference extraction.
//!
//! Walks an `oxc` AST and collects:
//! - import / re-export sources that name local files (`.`, `..` or `/` prefixed)
//! - literal first arguments of calls to the configured attachment function
//!
//! The reactive dialect is close enough to ES modules that it parses with oxc
//! after a light normalization pass (`viewof`/`mutable` prefixes, `with`
//! clauses on imports, named block cells).

use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, CallExpression, ExportAllDeclaration, ExportNamedDeclaration, Expression,
    ImportDeclaration,
};
use oxc_ast_visit::{walk, Visit};
use oxc_parser::{ParseOptions, Parser};
use oxc_span::SourceType;
use regex::{Captures, Regex};

use crate::config::{Dialect, ResolverConfig};
use crate::path::is_local_reference;

lazy_static! {
    /// `import {a} with {b} from "..."` -> `import {a} from "..."`
    static ref IMPORT_WITH_RE: Regex =
        Regex::new(r"(\bimport\s*\{[^}]*\})\s*with\s*\{[^}]*\}").unwrap();

    /// Top-level named block cell: `name = { ... }`
    static ref NAMED_BLOCK_RE: Regex =
        Regex::new(r"(?m)^(?:(?:viewof|mutable)\s+)?([A-Za-z_$][\w$]*)\s*=\s*\{").unwrap();

    /// Top-level anonymous block cell: a `{` opening a line
    static ref ANONYMOUS_BLOCK_RE: Regex = Regex::new(r"(?m)^\{").unwrap();

    /// Strings and comments (group 1) are kept; `viewof`/`mutable` before an
    /// identifier is dropped everywhere else.
    static ref CELL_PREFIX_RE: Regex = Regex::new(
        r#"("(?:[^"\\\n]|\\.)*"|'(?:[^'\\\n]|\\.)*'|`(?:[^`\\]|\\.)*`|//[^\n]*|/\*(?s:.*?)\*/)|\b(?:viewof|mutable)\s+([A-Za-z_$])"#
    )
    .unwrap();
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedReferences {
    /// Local import sources in source order.
    pub imports: Vec<String>,
    /// Attachment literals, verbatim.
    pub attachments: Vec<String>,
}

impl ExtractedReferences {
    pub fn extend(&mut self, other: ExtractedReferences) {
        self.imports.extend(other.imports);
        self.attachments.extend(other.attachments);
    }
}

/// Source that could not be parsed; it contributes no references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub message: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// VISITOR
// ═══════════════════════════════════════════════════════════════════════════════

struct ReferenceCollector<'c> {
    attachment_function: Option<&'c str>,
    refs: ExtractedReferences,
}

impl<'c> ReferenceCollector<'c> {
    fn push_import(&mut self, source: &str) {
        if is_local_reference(source) {
            self.refs.imports.push(source.to_string());
        }
    }
}

impl<'a, 'c> Visit<'a> for ReferenceCollector<'c> {
    fn visit_import_declaration(&mut self, decl: &ImportDeclaration<'a>) {
        self.push_import(decl.source.value.as_str());
    }

    fn visit_export_named_declaration(&mut self, decl: &ExportNamedDeclaration<'a>) {
        if let Some(source) = &decl.source {
            self.push_import(source.value.as_str());
        }
        walk::walk_export_named_declaration(self, decl);
    }

    fn visit_export_all_declaration(&mut self, decl: &ExportAllDeclaration<'a>) {
        self.push_import(decl.source.value.as_str());
    }

    fn visit_call_expression(&mut self, expr: &CallExpression<'a>) {
        if let (Some(name), Expression::Identifier(callee)) =
            (self.attachment_function, &expr.callee)
        {
            if callee.name.as_str() == name {
                if let Some(literal) = expr.arguments.first().and_then(literal_argument) {
                    self.refs.attachments.push(literal);
                }
            }
        }
        walk::walk_call_expression(self, expr);
    }
}

fn literal_argument(arg: &Argument<'_>) -> Option<String> {
    match arg {
        Argument::StringLiteral(lit) => Some(lit.value.to_string()),
        Argument::TemplateLiteral(tpl) if tpl.expressions.is_empty() => tpl
            .quasis
            .first()
            .and_then(|q| q.value.cooked.as_ref())
            .map(|cooked| cooked.to_string()),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY POINTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Rewrite reactive-dialect constructs into something an ES parser accepts.
/// Only reference-bearing syntax needs to survive, so spans are not preserved.
pub fn normalize_script(source: &str) -> String {
    let without_with = IMPORT_WITH_RE.replace_all(source, "${1}");
    let blocks = NAMED_BLOCK_RE.replace_all(&without_with, "${1} = async function* () {");
    strip_cell_prefixes(&blocks)
}

fn strip_cell_prefixes(source: &str) -> String {
    CELL_PREFIX_RE
        .replace_all(source, |caps: &Captures<'_>| match caps.get(1) {
            Some(literal) => literal.as_str().to_string(),
            None => caps[2].to_string(),
        })
        .into_owned()
}

/// Anonymous block cells may `yield` or `await`; turn each into a generator
/// expression so the body parses.
fn wrap_anonymous_blocks(source: &str) -> String {
    ANONYMOUS_BLOCK_RE
        .replace_all(source, "void async function* () {")
        .into_owned()
}

/// Parse `source` in `dialect` and collect its direct references.
///
/// Attachments are only collected for the reactive dialect; documents are
/// expected to be passed cell by cell.
pub fn extract_references(
    source: &str,
    dialect: Dialect,
    config: &ResolverConfig,
) -> Result<ExtractedReferences, ParseFailure> {
    let is_script = matches!(dialect, Dialect::Script | Dialect::Document);
    if !is_script {
        return collect_references(source, None);
    }

    let attachment_function = Some(config.attachment_function.as_str());
    let normalized = normalize_script(source);
    match collect_references(&normalized, attachment_function) {
        Ok(refs) => Ok(refs),
        // A top-level `{` is either a block cell or the continuation of an
        // expression; only retry as a block cell once the plain reading fails
        Err(failure) => {
            let wrapped = wrap_anonymous_blocks(&normalized);
            if wrapped == normalized {
                return Err(failure);
            }
            collect_references(&wrapped, attachment_function).map_err(|_| failure)
        }
    }
}

fn collect_references(
    source: &str,
    attachment_function: Option<&str>,
) -> Result<ExtractedReferences, ParseFailure> {
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_module(true);
    let options = ParseOptions {
        allow_return_outside_function: true,
        ..ParseOptions::default()
    };
    let ret = Parser::new(&allocator, source, source_type)
        .with_options(options)
        .parse();

    if ret.panicked || !ret.errors.is_empty() {
        let message = ret
            .errors
            .first()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "parser aborted".to_string());
        return Err(ParseFailure { message });
    }

    let mut collector = ReferenceCollector {
        attachment_function,
        refs: ExtractedReferences::default(),
    };
    collector.visit_program(&ret.program);
    Ok(collector.refs)
}

pub fn extract_imports(
    source: &str,
    dialect: Dialect,
    config: &ResolverConfig,
) -> Result<Vec<String>, ParseFailure> {
    extract_references(source, dialect, config).map(|r| r.imports)
}

pub fn extract_attachments(
    source: &str,
    config: &ResolverConfig,
) -> Result<Vec<String>, ParseFailure> {
    extract_references(source, Dialect::Script, config).map(|r| r.attachments)
}
