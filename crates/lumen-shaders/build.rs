//! Build script to compile the technique shaders to SPIR-V.
//!
//! Every `shaders/<technique>/<subpass>.<stage>` source is compiled to
//! `$OUT_DIR/spirv/<technique>/<subpass>.<stage>.spv`. The output root is
//! exported to the crate as `LUMEN_SPIRV_DIR`.

use shaderc::{Compiler, ShaderKind};
use std::env;
use std::fs;
use std::path::Path;

fn main() {
    let out_dir = env::var("OUT_DIR").unwrap();
    let shader_dir = Path::new("shaders");
    let spirv_dir = Path::new(&out_dir).join("spirv");

    // Rerun if shaders change
    println!("cargo:rerun-if-changed=shaders/");
    println!("cargo:rustc-env=LUMEN_SPIRV_DIR={}", spirv_dir.display());

    let compiler = Compiler::new().expect("Failed to create shader compiler");

    let mut techniques: Vec<_> = fs::read_dir(shader_dir)
        .expect("Failed to read shaders/")
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.is_dir())
        .collect();
    techniques.sort();

    for technique in techniques {
        let name = technique.file_name().unwrap().to_str().unwrap().to_owned();
        let target = spirv_dir.join(&name);
        fs::create_dir_all(&target)
            .unwrap_or_else(|e| panic!("Failed to create {:?}: {}", target, e));

        let mut sources: Vec<_> = fs::read_dir(&technique)
            .unwrap_or_else(|e| panic!("Failed to read {:?}: {}", technique, e))
            .map(|entry| entry.unwrap().path())
            .collect();
        sources.sort();

        for source in sources {
            let kind = match source.extension().and_then(|e| e.to_str()) {
                Some("vert") => ShaderKind::Vertex,
                Some("frag") => ShaderKind::Fragment,
                _ => continue,
            };
            let file_name = source.file_name().unwrap().to_str().unwrap();
            compile_shader(
                &compiler,
                &source,
                target.join(format!("{file_name}.spv")),
                kind,
            );
        }
    }
}

fn compile_shader(
    compiler: &Compiler,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    kind: ShaderKind,
) {
    let input_path = input.as_ref();
    let output_path = output.as_ref();

    let source = fs::read_to_string(input_path)
        .unwrap_or_else(|e| panic!("Failed to read shader {:?}: {}", input_path, e));

    let file_name = input_path.to_str().unwrap();

    let mut options = shaderc::CompileOptions::new().expect("Failed to create compile options");
    options.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_2 as u32,
    );
    options.set_optimization_level(shaderc::OptimizationLevel::Performance);

    let result = compiler
        .compile_into_spirv(&source, kind, file_name, "main", Some(&options))
        .unwrap_or_else(|e| panic!("Failed to compile shader {:?}: {}", input_path, e));

    if result.get_num_warnings() > 0 {
        println!(
            "cargo:warning=Shader warnings in {:?}: {}",
            input_path,
            result.get_warning_messages()
        );
    }

    fs::write(
        output_path,
        bytemuck::cast_slice::<u32, u8>(result.as_binary()),
    )
    .unwrap_or_else(|e| panic!("Failed to write shader {:?}: {}", output_path, e));
}
