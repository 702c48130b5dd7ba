//! Error types for bnd-core.

use std::path::PathBuf;

use thiserror::Error;

/// A session, recording or probe name that does not follow the naming grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamingError {
    /// The name does not begin with the subject (or parent) it should belong to.
    #[error("'{name}' has to start with '{prefix}'")]
    MissingPrefix { name: String, prefix: String },

    /// The prefix is not followed by an underscore.
    #[error("'{name}' has to have an underscore after '{prefix}'")]
    MissingSeparator { name: String, prefix: String },

    /// The timestamp part could not be parsed at all.
    #[error("'{value}' in '{name}' doesn't match expected format {format}")]
    BadTimestamp {
        name: String,
        value: String,
        format: &'static str,
    },

    /// The timestamp parses, but is not written the canonical way
    /// (e.g. missing zero padding).
    #[error("'{value}' in '{name}' is not canonical; expected '{canonical}'")]
    NonCanonical {
        name: String,
        value: String,
        canonical: String,
    },

    /// A recording / probe suffix that is not `_g<N>` / `_imec<d>`.
    #[error("'{name}' doesn't match expected {entity} pattern '{expected}'")]
    BadSuffix {
        name: String,
        entity: &'static str,
        expected: String,
    },

    /// A subject name that is empty or contains a path separator.
    #[error("invalid subject name '{0}'")]
    InvalidSubject(String),
}

/// Failures of the storage abstraction.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Recursive listing failed part-way.
    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Convenience constructor for [`StorageError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.into(),
        source,
    }
}

/// All errors that can arise from loading or saving the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, etc.).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the file path.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The config file did not exist at the expected path.
    #[error("config file not found at {path}. Run `bnd init` to create one.")]
    NotFound { path: PathBuf },
}
