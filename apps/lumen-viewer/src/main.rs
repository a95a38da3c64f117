//! Lumen demo viewer.
//!
//! Renders an animated grid of cubes through one of the built-in render
//! techniques, recording the scene subpass in parallel.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p lumen-viewer -- [OPTIONS]
//! ```
//!
//! See `--help` for the option list. `RUST_LOG` sets the log level.

mod app;
mod args;
mod grid;

use lumen_app::{init_logging, run_app, AppConfig};
use lumen_render::RendererConfig;

use crate::app::Viewer;
use crate::args::ViewerArgs;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn main() -> anyhow::Result<()> {
    let args = match ViewerArgs::from_env() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("error: {err:#}\n");
            print_help();
            std::process::exit(2);
        }
    };
    if args.help {
        print_help();
        return Ok(());
    }

    init_logging();

    let mut renderer = RendererConfig::load_from_path(&args.config)?;
    if let Some(technique) = &args.technique {
        renderer.technique = technique.clone();
    }
    if let Some(threads) = args.threads {
        renderer.worker_threads = Some(threads);
    }

    let mut config = AppConfig::new(format!("Lumen Viewer - {}", renderer.technique))
        .with_size(WIDTH, HEIGHT)
        .with_vsync(args.vsync)
        .with_renderer(renderer);
    if let Some(dir) = &args.shader_dir {
        config = config.with_shader_dir(dir.clone());
    }
    if let Some(fps) = args.target_fps {
        config = config.with_target_fps(fps);
    }

    run_app::<Viewer>(config)
}

fn print_help() {
    eprintln!(
        "Lumen Demo Viewer

USAGE:
    cargo run -p lumen-viewer -- [OPTIONS]

OPTIONS:
    -t, --technique <NAME>  Render technique: single_pass, depth_multi_pass,
                            deferred, ssao (default: from config, else single_pass)
    -j, --threads <N>       Recording worker threads (default: available cores)
    -c, --config <PATH>     Renderer settings file (default: lumen.toml)
        --shaders <DIR>     Compiled SPIR-V tree (default: built-in shaders)
    -g, --grid <N>          Cubes per grid side (default: 16)
        --fps <N>           Frame rate cap (default: unlimited)
        --no-vsync          Disable vsync
    -h, --help              Print this help message

KEYS:
    Space                   Pause or resume the animation

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}
