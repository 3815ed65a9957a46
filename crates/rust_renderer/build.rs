// build.rs
// Shader source tracking for the embedded GLSL programs

use std::path::Path;

const SHADERS: &[&str] = &[
    "forward.vert",
    "phong.frag",
    "pbr.frag",
    "shadow_depth.vert",
    "shadow_depth.frag",
    "fullscreen.vert",
    "ssao.frag",
    "ssao_blur.frag",
    "bloom_bright.frag",
    "gaussian_blur.frag",
    "composite.frag",
];

fn main() {
    // Shaders are embedded with include_str!, rebuild whenever one of them changes
    println!("cargo:rerun-if-changed=shaders");

    let shader_dir = Path::new("shaders");
    for name in SHADERS {
        let path = shader_dir.join(name);
        println!("cargo:rerun-if-changed={}", path.display());

        match std::fs::read_to_string(&path) {
            Ok(source) if !source.trim_start().starts_with("#version") => {
                println!("cargo:warning=Shader {} does not start with a #version directive", name);
            }
            Ok(_) => {}
            Err(e) => {
                println!("cargo:warning=Failed to read shader {}: {}", name, e);
            }
        }
    }
}
