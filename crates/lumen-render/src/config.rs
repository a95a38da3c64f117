//! Renderer settings, loadable from a TOML file.
//!
//! ```toml
//! technique = "deferred"
//! worker_threads = 4
//! fence_timeout_ns = 1000000000
//! clear_color = [0.02, 0.02, 0.05, 1.0]
//! ```

use std::path::Path;

use lumen_core::constants::FENCE_TIMEOUT_INFINITE;
use serde::Deserialize;

use crate::error::{RenderError, Result};

/// Renderer settings.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RendererConfig {
    /// Name of the render technique preset.
    pub technique: String,
    /// Worker threads for parallel recording. `None` uses the number of
    /// available cores.
    pub worker_threads: Option<usize>,
    /// Bound on a single frame fence wait, in nanoseconds. A timed-out wait
    /// is logged and retried. [`FENCE_TIMEOUT_INFINITE`] waits without a bound.
    pub fence_timeout_ns: u64,
    /// Clear colour of the presented image.
    pub clear_color: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            technique: "single_pass".to_string(),
            worker_threads: None,
            fence_timeout_ns: 1_000_000_000,
            clear_color: [0.02, 0.02, 0.05, 1.0],
        }
    }
}

impl RendererConfig {
    /// Parse settings from TOML text. Missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| RenderError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load settings from `path`, falling back to defaults if the file does
    /// not exist.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::info!(path = %path.display(), "Renderer config not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| RenderError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml_str(&content)?;

        tracing::info!(path = %path.display(), technique = %config.technique, "Loaded renderer config");
        Ok(config)
    }

    /// Wait on frame fences without a timeout.
    #[must_use]
    pub fn with_infinite_fence_wait(mut self) -> Self {
        self.fence_timeout_ns = FENCE_TIMEOUT_INFINITE;
        self
    }

    /// True when frame fence waits never time out.
    pub fn waits_forever(&self) -> bool {
        self.fence_timeout_ns == FENCE_TIMEOUT_INFINITE
    }

    /// Worker thread count, resolving `None` to the available parallelism.
    pub fn resolved_worker_threads(&self) -> usize {
        self.worker_threads.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        })
    }

    fn validate(&self) -> Result<()> {
        if self.worker_threads == Some(0) {
            return Err(RenderError::Config(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        if self.fence_timeout_ns == 0 {
            return Err(RenderError::Config(
                "fence_timeout_ns must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        let config = RendererConfig::from_toml_str("").unwrap();
        assert_eq!(config, RendererConfig::default());
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let config = RendererConfig::from_toml_str(
            r#"
            technique = "ssao"
            worker_threads = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.technique, "ssao");
        assert_eq!(config.worker_threads, Some(3));
        assert_eq!(config.resolved_worker_threads(), 3);
        assert_eq!(config.fence_timeout_ns, RendererConfig::default().fence_timeout_ns);
    }

    #[test]
    fn clear_color_parsed() {
        let config = RendererConfig::from_toml_str("clear_color = [1.0, 0.5, 0.25, 1.0]").unwrap();
        assert_eq!(config.clear_color, [1.0, 0.5, 0.25, 1.0]);
    }

    #[test]
    fn zero_workers_rejected() {
        assert!(matches!(
            RendererConfig::from_toml_str("worker_threads = 0"),
            Err(RenderError::Config(_))
        ));
    }

    #[test]
    fn unknown_key_rejected() {
        assert!(matches!(
            RendererConfig::from_toml_str("techniqe = \"deferred\""),
            Err(RenderError::Config(_))
        ));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("lumen-render-no-such-config.toml");
        let config = RendererConfig::load_from_path(&path).unwrap();
        assert_eq!(config, RendererConfig::default());
    }

    #[test]
    fn infinite_fence_wait_is_valid() {
        let config = RendererConfig::default().with_infinite_fence_wait();

        assert!(config.waits_forever());
        assert_eq!(config.fence_timeout_ns, FENCE_TIMEOUT_INFINITE);
        assert!(config.validate().is_ok());
        assert!(!RendererConfig::default().waits_forever());
    }

    #[test]
    fn zero_fence_timeout_rejected() {
        assert!(matches!(
            RendererConfig::from_toml_str("fence_timeout_ns = 0"),
            Err(RenderError::Config(_))
        ));
    }

    #[test]
    fn auto_workers_at_least_one() {
        assert!(RendererConfig::default().resolved_worker_threads() >= 1);
    }
}
