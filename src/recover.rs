//! Missing-module recovery.
//!
//! When a `.js` module is referenced but absent, a typed-superset sibling
//! (`.ts`) is compiled on the fly. The compiler is asked for the dependency
//! closure first and then emits plain modules for all of it. Emitted files are
//! side effects of the build and are handed to a cleanup registry.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;

use crate::config::ResolverConfig;
use crate::error::ResolveError;
use crate::path::ProjectPaths;
use crate::resource::{PathType, ResourceDescription, ResourceType};

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER INTERFACE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy)]
pub enum CompileRequest<'p> {
    /// Report every source file the entry pulls in; emit nothing.
    ListDependencies(&'p Path),
    /// Emit plain modules for the given sources.
    Emit(&'p [PathBuf]),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOutcome {
    pub success: bool,
    /// Compiler diagnostics, surfaced verbatim on failure.
    pub output: String,
    /// Listed sources, or emitted files.
    pub files: Vec<PathBuf>,
}

impl CompileOutcome {
    pub fn failed(output: impl Into<String>) -> Self {
        CompileOutcome {
            success: false,
            output: output.into(),
            files: Vec::new(),
        }
    }
}

pub trait ModuleCompiler: Send + Sync {
    fn compile(&self, request: CompileRequest<'_>) -> CompileOutcome;
}

/// Runs an external type-checking compiler (`tsc` by default).
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    pub program: String,
    pub emit_args: Vec<String>,
}

impl Default for CommandCompiler {
    fn default() -> Self {
        CommandCompiler {
            program: "tsc".to_string(),
            emit_args: ["--module", "es2020", "--target", "es2020", "--skipLibCheck"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl CommandCompiler {
    pub fn new(program: impl Into<String>) -> Self {
        CommandCompiler {
            program: program.into(),
            ..Self::default()
        }
    }

    fn run(&self, args: &[String]) -> Result<String, String> {
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| format!("Failed to run {}: {}", self.program, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if output.status.success() {
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(format!("{}{}", stdout, stderr))
        }
    }
}

impl ModuleCompiler for CommandCompiler {
    fn compile(&self, request: CompileRequest<'_>) -> CompileOutcome {
        match request {
            CompileRequest::ListDependencies(entry) => {
                let args = vec![
                    "--listFilesOnly".to_string(),
                    entry.to_string_lossy().to_string(),
                ];
                match self.run(&args) {
                    Ok(stdout) => CompileOutcome {
                        success: true,
                        files: stdout
                            .lines()
                            .map(str::trim)
                            .filter(|l| !l.is_empty())
                            .filter(|l| !l.ends_with(".d.ts") && !l.contains("node_modules"))
                            .map(PathBuf::from)
                            .collect(),
                        output: stdout,
                    },
                    Err(output) => CompileOutcome::failed(output),
                }
            }
            CompileRequest::Emit(sources) => {
                let mut args = self.emit_args.clone();
                args.extend(sources.iter().map(|p| p.to_string_lossy().to_string()));
                match self.run(&args) {
                    Ok(stdout) => CompileOutcome {
                        success: true,
                        files: sources
                            .iter()
                            .map(|p| p.with_extension("js"))
                            .filter(|p| p.is_file())
                            .collect(),
                        output: stdout,
                    },
                    Err(output) => CompileOutcome::failed(output),
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLEANUP REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

pub trait CleanupRegistry: Send + Sync {
    fn register(&self, build_id: &str, files: &[PathBuf]);
}

/// Holds side-effect files per build until `cleanup` is called for that build.
#[derive(Debug, Default)]
pub struct DeferredCleanup {
    pending: Mutex<HashMap<String, Vec<PathBuf>>>,
}

impl DeferredCleanup {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<PathBuf>>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn registered(&self, build_id: &str) -> Vec<PathBuf> {
        self.pending().get(build_id).cloned().unwrap_or_default()
    }

    /// Remove every file registered for `build_id`. Returns how many were removed.
    pub fn cleanup(&self, build_id: &str) -> usize {
        let files = self.pending().remove(build_id).unwrap_or_default();
        let mut removed = 0;
        for file in files {
            match fs::remove_file(&file) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove {}: {}", file.display(), e),
            }
        }
        removed
    }
}

impl CleanupRegistry for DeferredCleanup {
    fn register(&self, build_id: &str, files: &[PathBuf]) {
        self.pending()
            .entry(build_id.to_string())
            .or_default()
            .extend(files.iter().cloned());
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECOVERY
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct RecoveredModule {
    pub source: String,
    /// Every file the compiler emitted, including the recovered module itself.
    pub emitted: Vec<PathBuf>,
    /// Import resources for emitted files other than the recovered module.
    pub side_effect_files: Vec<ResourceDescription>,
}

/// Try to materialize `missing` from its typed sibling.
///
/// `Ok(None)` means there is nothing to recover from; a compiler failure is fatal.
pub fn recover(
    missing: &ResourceDescription,
    config: &ResolverConfig,
    paths: &ProjectPaths,
    compiler: Option<&dyn ModuleCompiler>,
) -> Result<Option<RecoveredModule>, ResolveError> {
    let js_path = &missing.path;
    let typed_path = js_path.with_extension(&config.typed_extension);
    if !typed_path.is_file() {
        return Ok(None);
    }
    let Some(compiler) = compiler else {
        tracing::debug!(
            "Found {} but no compiler is configured for recovery",
            typed_path.display()
        );
        return Ok(None);
    };

    let fail = |output: String| {
        ResolveError::recovery_failure(
            typed_path.clone(),
            &missing.import_path,
            missing.referent.as_ref(),
            output,
        )
    };

    tracing::info!("Compiling {} to recover {}", typed_path.display(), js_path.display());

    let listed = compiler.compile(CompileRequest::ListDependencies(&typed_path));
    if !listed.success {
        return Err(fail(listed.output));
    }
    let sources = if listed.files.is_empty() {
        vec![typed_path.clone()]
    } else {
        listed.files
    };

    let emitted = compiler.compile(CompileRequest::Emit(&sources));
    if !emitted.success {
        return Err(fail(emitted.output));
    }

    let source = fs::read_to_string(js_path).map_err(|e| {
        fail(format!(
            "compilation succeeded but {} could not be read: {}",
            js_path.display(),
            e
        ))
    })?;

    let origin_dir = js_path.parent().unwrap_or_else(|| Path::new("/"));
    let side_effect_files = emitted
        .files
        .iter()
        .filter(|f| *f != js_path)
        .map(|file| ResourceDescription {
            filename: paths.filename(file, PathType::Relative),
            referent: missing.referent.clone(),
            import_path: sibling_import_path(file, origin_dir),
            path_type: PathType::Relative,
            resource_type: ResourceType::Import,
            path: file.clone(),
        })
        .collect();

    let mut all_emitted = emitted.files;
    if !all_emitted.iter().any(|f| f == js_path) {
        all_emitted.push(js_path.clone());
    }

    Ok(Some(RecoveredModule {
        source,
        emitted: all_emitted,
        side_effect_files,
    }))
}

fn sibling_import_path(file: &Path, origin_dir: &Path) -> String {
    match pathdiff::diff_paths(file, origin_dir) {
        Some(rel) => {
            let rel = rel.to_string_lossy().replace('\\', "/");
            if rel.starts_with("..") {
                rel
            } else {
                format!("./{}", rel)
            }
        }
        None => file.to_string_lossy().to_string(),
    }
}
