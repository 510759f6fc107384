use std::path::PathBuf;

use crate::resource::referent_display;

/// Fatal errors. A resolve call that returns one of these yields no partial graph.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(
        "Compiling {typed_path} to recover '{import_path}' (referenced from {referent}) failed:\n{output}"
    )]
    RecoveryCompileFailure {
        typed_path: PathBuf,
        import_path: String,
        referent: String,
        output: String,
    },

    #[error("No dialect is registered for {0}")]
    UnknownDialect(PathBuf),

    #[error("Failed to read {path}: {source}")]
    ReadRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ResolveError {
    pub(crate) fn recovery_failure(
        typed_path: PathBuf,
        import_path: &str,
        referent: Option<&PathBuf>,
        output: String,
    ) -> Self {
        ResolveError::RecoveryCompileFailure {
            typed_path,
            import_path: import_path.to_string(),
            referent: referent_display(referent),
            output,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("Bundling {count} module(s) failed: {message}")]
    Bundle { count: usize, message: String },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Reference string that is neither `.`/`..`-relative nor root-relative.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a local file reference")]
pub struct UnsupportedSpecifier(pub String);
