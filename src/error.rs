use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum RegroupError {
    NotFound(PathBuf),
    InvalidFormat { path: PathBuf, reason: String },
    InvalidPath(String),
    Io(std::io::Error),
    Serialization(Box<bincode::error::EncodeError>),
    Cache(serde_json::Error),
    Coordinator(String),
    Panic(String),
    Worker(String),
    Other(String),
}

impl RegroupError {
    pub fn invalid_format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        RegroupError::InvalidFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Converts the payload of a caught panic into an error value.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        RegroupError::Panic(message)
    }
}

impl fmt::Display for RegroupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegroupError::NotFound(p) => write!(f, "Not found: {}", p.display()),
            RegroupError::InvalidFormat { path, reason } => {
                write!(f, "Invalid format in {}: {}", path.display(), reason)
            }
            RegroupError::InvalidPath(e) => write!(f, "Invalid path: {}", e),
            RegroupError::Io(e) => write!(f, "IO error: {}", e),
            RegroupError::Serialization(e) => write!(f, "Serialization error: {}", e),
            RegroupError::Cache(e) => write!(f, "Identifier cache error: {}", e),
            RegroupError::Coordinator(e) => write!(f, "Coordinator error: {}", e),
            RegroupError::Panic(e) => write!(f, "Panic: {}", e),
            RegroupError::Worker(e) => write!(f, "Worker error: {}", e),
            RegroupError::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for RegroupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegroupError::Io(e) => Some(e),
            RegroupError::Serialization(e) => Some(e.as_ref()),
            RegroupError::Cache(e) => Some(e),
            _ => None,
        }
    }
}

impl From<bincode::error::EncodeError> for RegroupError {
    fn from(err: bincode::error::EncodeError) -> Self {
        RegroupError::Serialization(Box::new(err))
    }
}

impl From<std::io::Error> for RegroupError {
    fn from(err: std::io::Error) -> Self {
        RegroupError::Io(err)
    }
}

impl From<serde_json::Error> for RegroupError {
    fn from(err: serde_json::Error) -> Self {
        RegroupError::Cache(err)
    }
}

impl From<String> for RegroupError {
    fn from(err: String) -> Self {
        RegroupError::Other(err)
    }
}

impl From<&str> for RegroupError {
    fn from(err: &str) -> Self {
        RegroupError::Other(err.to_string())
    }
}
