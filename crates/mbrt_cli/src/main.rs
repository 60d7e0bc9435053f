use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use mbrt_renderer::{preset, run_render_case, RenderCaseConfig, RenderContext, PRESET_NAMES};

/// Render the motion-blur test cases to PNG files.
#[derive(Parser)]
#[command(name = "mbrt", version, about = "Motion-blur ray tracing render cases")]
struct Cli {
    /// Built-in case to render; may be repeated.
    #[arg(long = "case")]
    cases: Vec<String>,

    /// JSON case description to render; may be repeated.
    #[arg(long = "config")]
    configs: Vec<PathBuf>,

    /// Render every built-in case.
    #[arg(long)]
    all: bool,

    /// List the built-in cases and exit.
    #[arg(long)]
    list: bool,

    /// Replace each case's meshes with this OBJ or STL file.
    #[arg(long)]
    mesh: Option<PathBuf>,

    /// Directory holding the mesh's material files.
    #[arg(long)]
    material_dir: Option<PathBuf>,

    /// PNG path for a single selected case.
    #[arg(long, conflicts_with = "output_dir")]
    output: Option<PathBuf>,

    /// Directory for the written images, as `<case>.png`.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Worker threads; all cores by default.
    #[arg(long)]
    threads: Option<usize>,
}

impl Cli {
    fn selected_cases(&self) -> Result<Vec<RenderCaseConfig>> {
        let mut configs = Vec::new();

        let names: Vec<String> = if self.all {
            PRESET_NAMES.iter().map(|name| name.to_string()).collect()
        } else {
            self.cases.clone()
        };
        for name in &names {
            configs.push(preset(name).with_context(|| format!("Available cases: {}", PRESET_NAMES.join(", ")))?);
        }
        for path in &self.configs {
            let config = RenderCaseConfig::from_json_file(path)
                .with_context(|| format!("Failed to read case file {}", path.display()))?;
            configs.push(config);
        }

        if self.output.is_some() && configs.len() != 1 {
            bail!("--output names one file but {} cases are selected; use --output-dir", configs.len());
        }
        Ok(configs.into_iter().map(|config| self.apply_overrides(config)).collect())
    }

    fn apply_overrides(&self, mut config: RenderCaseConfig) -> RenderCaseConfig {
        if let Some(mesh) = &self.mesh {
            config = config.with_mesh(mesh, self.material_dir.clone());
        }
        if let Some(output) = &self.output {
            config = config.with_output(output);
        } else if let Some(dir) = &self.output_dir {
            let output = dir.join(format!("{}.png", config.name));
            config = config.with_output(output);
        }
        let width = self.width.unwrap_or(config.width);
        let height = self.height.unwrap_or(config.height);
        config = config.with_resolution(width, height);
        if self.threads.is_some() {
            config.threads = self.threads;
        }
        config
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();

    if cli.list {
        for name in PRESET_NAMES {
            println!("{}", name);
        }
        return Ok(());
    }

    let configs = cli.selected_cases()?;
    if configs.is_empty() {
        bail!("No cases selected; use --case, --config or --all (see --list)");
    }

    let mut failed = Vec::new();
    for config in &configs {
        let result = RenderContext::new(config.threads).and_then(|render| run_render_case(&render, config));
        match result {
            Ok(stats) => println!(
                "{:<28} {}x{} {:>10.2?} {:>8} hit",
                stats.name, stats.width, stats.height, stats.elapsed, stats.hit_pixels
            ),
            Err(e) => {
                log::error!("Case '{}' failed: {}", config.name, e);
                failed.push(config.name.clone());
            }
        }
    }

    if !failed.is_empty() {
        bail!("{} of {} cases failed: {}", failed.len(), configs.len(), failed.join(", "));
    }
    Ok(())
}
