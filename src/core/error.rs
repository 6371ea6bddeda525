//! Error types for the voxsync sandbox

use glam::IVec3;
use thiserror::Error;

/// Main error type for the sandbox
#[derive(Debug, Error)]
pub enum Error {
    /// Add target cell already holds a voxel
    #[error("Cell {0} is already occupied")]
    Occupied(IVec3),

    /// Instance slots exhausted; further adds are refused until capacity grows
    #[error("Instance capacity of {capacity} exceeded")]
    CapacityExceeded { capacity: usize },

    /// External store fetch/write/subscribe failure
    #[error("Store error: {0}")]
    Store(String),

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("Window error: {0}")]
    Window(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for errors the frame loop absorbs without user-visible status
    pub fn is_silent(&self) -> bool {
        matches!(self, Error::Occupied(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Error::Occupied(IVec3::new(1, 2, 3));
        assert_eq!(err.to_string(), "Cell [1, 2, 3] is already occupied");

        let err = Error::CapacityExceeded { capacity: 4 };
        assert_eq!(err.to_string(), "Instance capacity of 4 exceeded");
    }

    #[test]
    fn test_silent() {
        assert!(Error::Occupied(IVec3::ZERO).is_silent());
        assert!(!Error::Store("offline".into()).is_silent());
    }
}
