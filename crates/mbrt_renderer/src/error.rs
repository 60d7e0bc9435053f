//! Error types for building and rendering.

use mbrt_core::{MeshError, SceneError};
use thiserror::Error;

/// Errors raised while setting up or running a render case.
///
/// Intersection never produces one of these; degenerate candidates are
/// reported as misses.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Mesh error: {0}")]
    Mesh(#[from] MeshError),

    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    #[error("Render context unavailable: {0}")]
    Context(String),

    #[error("Build failed: {0}")]
    Build(String),

    #[error("Resolution {width}x{height} does not fit a dispatch of {capacity} pixels")]
    Resolution {
        width: u32,
        height: u32,
        capacity: usize,
    },

    #[error("Function table slot (geometry type {geom_type}, ray type {ray_type}) is out of range")]
    FuncTableSlot { geom_type: u32, ray_type: u32 },

    #[error("Unknown render case '{0}'")]
    UnknownCase(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for renderer operations.
pub type Result<T> = std::result::Result<T, RenderError>;
