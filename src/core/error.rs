use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of a single fragment read or write.
#[derive(Error, Debug)]
pub enum FragmentError {
    #[error("Fragment '{}' not found", .0.display())]
    NotFound(PathBuf),

    #[error("Invalid JSON in file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FragmentError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid fragment name '{0}'")]
    InvalidFilename(String),

    #[error("File {filename} is in invalid format: {reason}.")]
    CorruptFragment { filename: String, reason: String },

    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Directory watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Registry service is no longer running")]
    ServiceStopped,
}

pub type Result<T> = std::result::Result<T, RegistryError>;

impl From<FragmentError> for RegistryError {
    fn from(err: FragmentError) -> Self {
        match err {
            FragmentError::NotFound(path) => Self::Io {
                path,
                source: io::Error::from(io::ErrorKind::NotFound),
            },
            FragmentError::Parse { path, source } => Self::CorruptFragment {
                filename: path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string()),
                reason: source.to_string(),
            },
            FragmentError::Io { path, source } => Self::Io { path, source },
        }
    }
}

impl From<tokio::task::JoinError> for RegistryError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

/// Failures while snapshotting the current OS identity.
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("User database lookup failed: {0}")]
    Lookup(#[from] nix::Error),

    #[error("No user database entry for uid {0}")]
    UnknownUser(u32),

    #[error("No group database entry for gid {0}")]
    UnknownGroup(u32),
}
