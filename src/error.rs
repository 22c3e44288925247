/*!
 * Error types for geosync
 */

use std::fmt;
use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, GeoSyncError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug)]
pub enum GeoSyncError {
    /// I/O error
    Io(io::Error),

    /// Configuration error
    Config(String),

    /// Upstream catalog could not be listed (fatal to the cycle)
    Catalog { source: String, message: String },

    /// Retrieval of a single artifact failed
    Transfer { key: String, message: String },

    /// Conversion of a single artifact failed
    Transform { key: String, message: String },

    /// A derived entry name carried no recognizable observation time
    UnparsableEntry(PathBuf),

    /// No engine registered under this name
    UnknownSource(String),

    /// Worker pool could not be built
    Parallel(String),

    /// A single unit of work panicked inside the worker pool
    WorkerPanic(String),

    /// Generic error with message
    Other(String),
}

impl GeoSyncError {
    /// Shorthand for a catalog failure
    pub fn catalog(source: impl Into<String>, message: impl fmt::Display) -> Self {
        GeoSyncError::Catalog {
            source: source.into(),
            message: message.to_string(),
        }
    }

    /// Shorthand for a transfer failure
    pub fn transfer(key: impl Into<String>, message: impl fmt::Display) -> Self {
        GeoSyncError::Transfer {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Shorthand for a transform failure
    pub fn transform(key: impl Into<String>, message: impl fmt::Display) -> Self {
        GeoSyncError::Transform {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        if self.is_fatal() {
            EXIT_FATAL
        } else {
            EXIT_PARTIAL
        }
    }

    /// Check if this error aborts the whole cycle (or the process)
    pub fn is_fatal(&self) -> bool {
        match self {
            GeoSyncError::Config(_) => true,
            GeoSyncError::Catalog { .. } => true,
            GeoSyncError::UnknownSource(_) => true,
            GeoSyncError::Parallel(_) => true,

            GeoSyncError::Io(_) => false,
            GeoSyncError::Transfer { .. } => false,
            GeoSyncError::Transform { .. } => false,
            GeoSyncError::UnparsableEntry(_) => false,
            GeoSyncError::WorkerPanic(_) => false,
            GeoSyncError::Other(_) => false,
        }
    }

    /// Check if this error only excludes one record from a cycle
    pub fn is_per_record(&self) -> bool {
        matches!(
            self,
            GeoSyncError::Transfer { .. }
                | GeoSyncError::Transform { .. }
                | GeoSyncError::UnparsableEntry(_)
                | GeoSyncError::WorkerPanic(_)
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            GeoSyncError::Io(_) => ErrorCategory::IoError,
            GeoSyncError::Config(_) => ErrorCategory::Configuration,
            GeoSyncError::Catalog { .. } => ErrorCategory::Catalog,
            GeoSyncError::Transfer { .. } => ErrorCategory::Transfer,
            GeoSyncError::Transform { .. } => ErrorCategory::Transform,
            GeoSyncError::UnparsableEntry(_) => ErrorCategory::Bootstrap,
            GeoSyncError::UnknownSource(_) => ErrorCategory::Validation,
            GeoSyncError::Parallel(_) | GeoSyncError::WorkerPanic(_) => {
                ErrorCategory::Concurrency
            }
            GeoSyncError::Other(_) => ErrorCategory::Unknown,
        }
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// I/O operation errors
    IoError,
    /// Configuration errors
    Configuration,
    /// Upstream listing errors
    Catalog,
    /// Retrieval errors
    Transfer,
    /// Conversion errors
    Transform,
    /// Registry reconstruction errors
    Bootstrap,
    /// Caller input errors
    Validation,
    /// Worker pool errors
    Concurrency,
    /// Uncategorized errors
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::IoError => write!(f, "io"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Catalog => write!(f, "catalog"),
            ErrorCategory::Transfer => write!(f, "transfer"),
            ErrorCategory::Transform => write!(f, "transform"),
            ErrorCategory::Bootstrap => write!(f, "bootstrap"),
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::Concurrency => write!(f, "concurrency"),
            ErrorCategory::Unknown => write!(f, "unknown"),
        }
    }
}

impl fmt::Display for GeoSyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeoSyncError::Io(err) => {
                write!(f, "I/O error: {}", err)
            }
            GeoSyncError::Config(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            GeoSyncError::Catalog { source, message } => {
                write!(f, "Catalog for {} unavailable: {}", source, message)
            }
            GeoSyncError::Transfer { key, message } => {
                write!(f, "Transfer of {} failed: {}", key, message)
            }
            GeoSyncError::Transform { key, message } => {
                write!(f, "Transform of {} failed: {}", key, message)
            }
            GeoSyncError::UnparsableEntry(path) => {
                write!(
                    f,
                    "No observation time in entry name: {}",
                    path.display()
                )
            }
            GeoSyncError::UnknownSource(name) => {
                write!(f, "{} is not an active data source", name)
            }
            GeoSyncError::Parallel(msg) => {
                write!(f, "Parallel processing error: {}", msg)
            }
            GeoSyncError::WorkerPanic(msg) => {
                write!(f, "Worker panicked: {}", msg)
            }
            GeoSyncError::Other(msg) => {
                write!(f, "{}", msg)
            }
        }
    }
}

impl std::error::Error for GeoSyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GeoSyncError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for GeoSyncError {
    fn from(err: io::Error) -> Self {
        GeoSyncError::Io(err)
    }
}

impl From<serde_json::Error> for GeoSyncError {
    fn from(err: serde_json::Error) -> Self {
        GeoSyncError::Other(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for GeoSyncError {
    fn from(err: toml::de::Error) -> Self {
        GeoSyncError::Config(format!("TOML parse error: {}", err))
    }
}

impl From<toml::ser::Error> for GeoSyncError {
    fn from(err: toml::ser::Error) -> Self {
        GeoSyncError::Config(format!("TOML write error: {}", err))
    }
}
