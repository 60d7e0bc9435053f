//! Render one built-in case at reduced resolution.
//!
//! Usage: cargo run --example render_case -- [case-name]

use mbrt_renderer::{preset, run_render_case, RenderContext, PRESET_NAMES};

fn main() -> mbrt_renderer::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let name = std::env::args().nth(1).unwrap_or_else(|| "mb-sampling".to_string());
    if !PRESET_NAMES.contains(&name.as_str()) {
        eprintln!("Unknown case '{}'. Available: {}", name, PRESET_NAMES.join(", "));
        return Ok(());
    }

    let config = preset(&name)?.with_resolution(480, 270);
    let render = RenderContext::new(config.threads)?;
    let stats = run_render_case(&render, &config)?;

    println!(
        "{}: {}x{} in {:?} ({} pixels hit)",
        stats.name, stats.width, stats.height, stats.elapsed, stats.hit_pixels
    );
    if let Some(output) = &stats.output {
        println!("Saved to {}", output.display());
    }
    Ok(())
}
