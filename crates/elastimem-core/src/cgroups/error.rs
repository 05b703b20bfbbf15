//! Error types for cgroup operations

use std::io;
use thiserror::Error;

/// Cgroup operation errors
#[derive(Debug, Error)]
pub enum CgroupError {
    #[error("Cgroup not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Failed to parse cgroup file: {0}")]
    ParseError(String),

    #[error("Controller not mounted: {0}")]
    ControllerNotMounted(String),

    #[error("Cgroup path too long ({len} bytes, limit {max}): {path}")]
    PathTooLong { path: String, len: usize, max: usize },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, CgroupError>;
