//! Error type shared by every collector stage.

use std::fmt;
use std::io;

/// Error type for collection failures.
#[derive(Debug)]
pub enum CollectError {
    /// External command could not be started or exited non-zero.
    Execution {
        command: String,
        stderr: String,
        cause: String,
    },
    /// HTTP request against a tunneled admin endpoint failed.
    Http { url: String, message: String },
    /// Query succeeded but matched no resources.
    NotFound { resource: String },
    /// Background tunnel process failed to start or to terminate.
    Tunnel { target: String, message: String },
    /// Filesystem error while writing collector output.
    Io(io::Error),
}

impl CollectError {
    /// Returns `true` for the expected "nothing matched" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CollectError::NotFound { .. })
    }
}

impl fmt::Display for CollectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectError::Execution {
                command,
                stderr,
                cause,
            } => {
                write!(f, "command '{}' failed: {}", command, cause)?;
                let stderr = stderr.trim();
                if !stderr.is_empty() {
                    write!(f, ": {}", stderr)?;
                }
                Ok(())
            }
            CollectError::Http { url, message } => write!(f, "GET {} failed: {}", url, message),
            CollectError::NotFound { resource } => {
                write!(f, "no '{}' resource found in the cluster", resource)
            }
            CollectError::Tunnel { target, message } => {
                write!(f, "tunnel to {}: {}", target, message)
            }
            CollectError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for CollectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CollectError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CollectError {
    fn from(e: io::Error) -> Self {
        CollectError::Io(e)
    }
}
