//! Technique shaders and SPIR-V loading for the Lumen engine.
//!
//! GLSL sources for the built-in techniques live in this crate's `shaders/`
//! directory and are compiled at build time using shaderc. Compiled blobs
//! are laid out per technique and subpass:
//!
//! ```text
//! <root>/<technique>/<subpass>.vert.spv
//! <root>/<technique>/<subpass>.frag.spv
//! ```
//!
//! [`ShaderLoader::compiled`] reads the build output; [`ShaderLoader::new`]
//! reads any other tree with the same layout.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Root of the SPIR-V tree compiled by the build script.
pub const COMPILED_SHADER_DIR: &str = env!("LUMEN_SPIRV_DIR");

/// SPIR-V magic number, first word of every module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Shader loading errors.
#[derive(Error, Debug)]
pub enum ShaderError {
    /// The blob could not be read.
    #[error("Failed to read shader {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The blob length is not a whole number of 32-bit words.
    #[error("Shader {path} is {len} bytes, not a multiple of 4")]
    Misaligned { path: PathBuf, len: usize },

    /// The blob does not start with the SPIR-V magic number.
    #[error("Shader {path} is not SPIR-V (first word {found:#010x})")]
    BadMagic { path: PathBuf, found: u32 },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, ShaderError>;

/// Programmable stage a blob is compiled for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// File name component for the stage.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Vertex => "vert",
            Self::Fragment => "frag",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Convert raw bytes to SPIR-V words, checking length and magic number.
pub fn bytes_to_spirv(path: &Path, bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 || bytes.is_empty() {
        return Err(ShaderError::Misaligned {
            path: path.to_path_buf(),
            len: bytes.len(),
        });
    }

    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    if words[0] != SPIRV_MAGIC {
        return Err(ShaderError::BadMagic {
            path: path.to_path_buf(),
            found: words[0],
        });
    }

    Ok(words)
}

/// Loads pre-compiled shader blobs from a directory tree.
#[derive(Clone, Debug)]
pub struct ShaderLoader {
    root: PathBuf,
}

impl ShaderLoader {
    /// Create a loader rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a loader for the shaders compiled with this crate.
    pub fn compiled() -> Self {
        Self::new(COMPILED_SHADER_DIR)
    }

    /// Root directory of the shader tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the blob for (`technique`, `subpass`, `stage`).
    pub fn path_for(&self, technique: &str, subpass: u32, stage: ShaderStage) -> PathBuf {
        self.root
            .join(technique)
            .join(format!("{subpass}.{}.spv", stage.extension()))
    }

    /// Load one blob as SPIR-V words.
    pub fn load(&self, technique: &str, subpass: u32, stage: ShaderStage) -> Result<Vec<u32>> {
        let path = self.path_for(technique, subpass, stage);
        let bytes = std::fs::read(&path).map_err(|source| ShaderError::Io {
            path: path.clone(),
            source,
        })?;
        let words = bytes_to_spirv(&path, &bytes)?;

        tracing::debug!(path = %path.display(), words = words.len(), "Loaded shader");
        Ok(words)
    }

    /// Load the vertex and fragment blobs of one subpass.
    pub fn load_subpass(&self, technique: &str, subpass: u32) -> Result<(Vec<u32>, Vec<u32>)> {
        Ok((
            self.load(technique, subpass, ShaderStage::Vertex)?,
            self.load(technique, subpass, ShaderStage::Fragment)?,
        ))
    }
}

impl Default for ShaderLoader {
    fn default() -> Self {
        Self::compiled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spirv_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lumen-shaders-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn words_are_little_endian() {
        let bytes = spirv_bytes(&[SPIRV_MAGIC, 0x0001_0500, 42]);
        let words = bytes_to_spirv(Path::new("test.spv"), &bytes).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0500, 42]);
    }

    #[test]
    fn misaligned_blob_rejected() {
        let mut bytes = spirv_bytes(&[SPIRV_MAGIC]);
        bytes.push(0);
        assert!(matches!(
            bytes_to_spirv(Path::new("bad.spv"), &bytes),
            Err(ShaderError::Misaligned { len: 5, .. })
        ));
        assert!(matches!(
            bytes_to_spirv(Path::new("empty.spv"), &[]),
            Err(ShaderError::Misaligned { len: 0, .. })
        ));
    }

    #[test]
    fn wrong_magic_rejected() {
        let bytes = spirv_bytes(&[0xDEAD_BEEF, 1]);
        assert!(matches!(
            bytes_to_spirv(Path::new("glsl.spv"), &bytes),
            Err(ShaderError::BadMagic {
                found: 0xDEAD_BEEF,
                ..
            })
        ));
    }

    #[test]
    fn path_layout() {
        let loader = ShaderLoader::new("/shaders");
        assert_eq!(
            loader.path_for("deferred", 1, ShaderStage::Fragment),
            Path::new("/shaders/deferred/1.frag.spv")
        );
    }

    #[test]
    fn loads_subpass_from_disk() {
        let root = scratch_dir("load");
        let technique = root.join("single_pass");
        std::fs::create_dir_all(&technique).unwrap();
        std::fs::write(technique.join("0.vert.spv"), spirv_bytes(&[SPIRV_MAGIC, 1])).unwrap();
        std::fs::write(technique.join("0.frag.spv"), spirv_bytes(&[SPIRV_MAGIC, 2])).unwrap();

        let loader = ShaderLoader::new(&root);
        let (vert, frag) = loader.load_subpass("single_pass", 0).unwrap();

        assert_eq!(vert, vec![SPIRV_MAGIC, 1]);
        assert_eq!(frag, vec![SPIRV_MAGIC, 2]);

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn built_in_techniques_are_compiled() {
        let loader = ShaderLoader::default();
        assert_eq!(loader.root(), Path::new(COMPILED_SHADER_DIR));

        for (technique, subpasses) in [
            ("single_pass", 1),
            ("depth_multi_pass", 2),
            ("deferred", 2),
            ("ssao", 3),
        ] {
            for subpass in 0..subpasses {
                let (vert, frag) = loader.load_subpass(technique, subpass).unwrap();
                assert_eq!(vert[0], SPIRV_MAGIC, "{technique}/{subpass}.vert");
                assert_eq!(frag[0], SPIRV_MAGIC, "{technique}/{subpass}.frag");
            }
        }
    }

    #[test]
    fn missing_blob_is_io_error() {
        let root = scratch_dir("missing");
        let loader = ShaderLoader::new(&root);

        assert!(matches!(
            loader.load("ssao", 2, ShaderStage::Vertex),
            Err(ShaderError::Io { .. })
        ));

        std::fs::remove_dir_all(&root).unwrap();
    }
}
