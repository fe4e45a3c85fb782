use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use renderengine::{
    DrawOptions, HeadlessDevice, HeadlessOpts, RenderEngine, RenderEngineOpts, Scene,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "renderengine", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scene against the headless device and print the final engine state.
    Simulate(SimulateArgs),
    /// Print the default engine options as JSON.
    Opts,
}

#[derive(Parser, Debug)]
struct SimulateArgs {
    /// Scene JSON.
    #[arg(long)]
    scene: PathBuf,

    /// Engine options JSON. Defaults apply to missing fields.
    #[arg(long)]
    opts: Option<PathBuf>,

    /// Number of frames to draw (default: one pass over the scene's frames).
    #[arg(long)]
    frames: Option<usize>,

    /// Simulate a device without native fences.
    #[arg(long, default_value_t = false)]
    no_native_fences: bool,

    /// Simulate a device without protected content support.
    #[arg(long, default_value_t = false)]
    no_protected: bool,

    /// Print the engine dump as JSON instead of text.
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Simulate(args) => cmd_simulate(args),
        Command::Opts => cmd_opts(),
    }
}

fn cmd_simulate(args: SimulateArgs) -> anyhow::Result<()> {
    let scene = Scene::from_path(&args.scene)?;
    let opts = match &args.opts {
        Some(path) => RenderEngineOpts::from_path(path)?,
        None => RenderEngineOpts::default(),
    };

    let device = HeadlessDevice::new(HeadlessOpts {
        native_fences: !args.no_native_fences,
        protected_content: !args.no_protected,
        ..HeadlessOpts::default()
    });
    let engine = RenderEngine::new(&device, opts)?;

    let display = scene.display_settings();
    let frames = args.frames.unwrap_or(scene.frames.len());
    for i in 0..frames {
        let (Some(layers), Some(target)) = (scene.layers(i), scene.target(i)) else {
            anyhow::bail!("scene has no frames or targets");
        };
        let out = engine
            .draw_frame(&display, &layers, target, DrawOptions::default(), None)
            .with_context(|| format!("frame {i}"))?;
        engine.cleanup_post_render();

        let st = &out.status;
        eprintln!(
            "frame {}: {} context, {} drawn, {} skipped{}",
            st.frame,
            st.mode,
            st.layers_drawn,
            st.skipped.len(),
            if st.output_cached { ", cached output" } else { "" }
        );
        for s in &st.skipped {
            eprintln!("  layer {} skipped: {:?}", s.index, s.reason);
        }
    }

    let dump = engine.dump();
    if args.json {
        println!("{}", dump.to_json()?);
    } else {
        println!("{dump}");
    }

    let violations = device.violations();
    if !violations.is_empty() {
        anyhow::bail!("device reported misuse: {}", violations.join("; "));
    }
    Ok(())
}

fn cmd_opts() -> anyhow::Result<()> {
    let s = serde_json::to_string_pretty(&RenderEngineOpts::default())
        .context("serialize default options")?;
    println!("{s}");
    Ok(())
}
