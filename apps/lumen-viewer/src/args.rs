//! Command line options.

use std::path::PathBuf;

use anyhow::{bail, Context};

/// Viewer options, parsed from the command line.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewerArgs {
    /// Render technique override.
    pub technique: Option<String>,
    /// Worker thread override.
    pub threads: Option<usize>,
    /// Compiled shader tree, `None` for the built-in shaders.
    pub shader_dir: Option<PathBuf>,
    /// Renderer settings file.
    pub config: PathBuf,
    /// Cubes per side of the grid.
    pub grid: u32,
    /// Frame rate cap, `None` for unlimited.
    pub target_fps: Option<u32>,
    pub vsync: bool,
    pub help: bool,
}

impl Default for ViewerArgs {
    fn default() -> Self {
        Self {
            technique: None,
            threads: None,
            shader_dir: None,
            config: PathBuf::from("lumen.toml"),
            grid: 16,
            target_fps: None,
            vsync: true,
            help: false,
        }
    }
}

impl ViewerArgs {
    /// Parse the process arguments.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::parse(std::env::args().skip(1))
    }

    /// Parse `args`, not including the program name.
    pub fn parse<I, S>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parsed = Self::default();
        let mut args = args.into_iter().map(Into::<String>::into);

        while let Some(arg) = args.next() {
            let mut value = |name: &str| {
                args.next()
                    .with_context(|| format!("{name} expects a value"))
            };

            match arg.as_str() {
                "-t" | "--technique" => parsed.technique = Some(value(&arg)?),
                "-j" | "--threads" => {
                    let threads: usize = value(&arg)?.parse().context("invalid --threads")?;
                    if threads == 0 {
                        bail!("--threads must be at least 1");
                    }
                    parsed.threads = Some(threads);
                }
                "--shaders" => parsed.shader_dir = Some(PathBuf::from(value(&arg)?)),
                "-c" | "--config" => parsed.config = PathBuf::from(value(&arg)?),
                "-g" | "--grid" => {
                    parsed.grid = value(&arg)?.parse().context("invalid --grid")?;
                    if parsed.grid == 0 {
                        bail!("--grid must be at least 1");
                    }
                }
                "--fps" => parsed.target_fps = Some(value(&arg)?.parse().context("invalid --fps")?),
                "--no-vsync" => parsed.vsync = false,
                "-h" | "--help" => parsed.help = true,
                other => bail!("unknown option: {other}"),
            }
        }

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = ViewerArgs::parse(Vec::<String>::new()).unwrap();
        assert_eq!(args, ViewerArgs::default());
    }

    #[test]
    fn overrides() {
        let args = ViewerArgs::parse([
            "--technique",
            "ssao",
            "-j",
            "3",
            "--grid",
            "4",
            "--shaders",
            "out/spv",
            "--no-vsync",
        ])
        .unwrap();

        assert_eq!(args.technique.as_deref(), Some("ssao"));
        assert_eq!(args.threads, Some(3));
        assert_eq!(args.grid, 4);
        assert_eq!(args.shader_dir, Some(PathBuf::from("out/spv")));
        assert!(!args.vsync);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(ViewerArgs::parse(["--threads", "0"]).is_err());
        assert!(ViewerArgs::parse(["--grid"]).is_err());
        assert!(ViewerArgs::parse(["--grid", "many"]).is_err());
        assert!(ViewerArgs::parse(["--bogus"]).is_err());
    }
}
