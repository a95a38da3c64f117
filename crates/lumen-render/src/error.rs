//! Renderer error types.

use lumen_gpu::GpuError;
use lumen_shaders::ShaderError;
use thiserror::Error;

/// Renderer errors.
#[derive(Error, Debug)]
pub enum RenderError {
    /// A Vulkan-layer operation failed.
    #[error(transparent)]
    Gpu(#[from] GpuError),

    /// The render graph description is malformed.
    #[error(transparent)]
    Graph(#[from] lumen_core::Error),

    /// A shader blob could not be loaded.
    #[error(transparent)]
    Shader(#[from] ShaderError),

    /// Unknown technique or invalid renderer settings.
    #[error("Invalid renderer configuration: {0}")]
    Config(String),

    /// A drawable names a material the renderer does not have.
    #[error("Drawable {drawable} uses material {material}, only {available} exist")]
    UnknownMaterial {
        drawable: usize,
        material: usize,
        available: usize,
    },

    /// Recording was abandoned because the renderer is shutting down.
    #[error("Command recording cancelled")]
    Cancelled,
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, RenderError>;
