use clap::Parser;
use std::path::PathBuf;
use tourviz::geometry::CanvasSize;
use tourviz::palette::Palette;
use tourviz::render::plan;
use tourviz::{export, svg, wire};
use tracing_subscriber::EnvFilter;

/// Render a saved graph and tour without talking to any server
#[derive(Parser, Debug)]
#[command(name = "tourviz-render")]
#[command(version)]
#[command(about = "Render a tour snapshot to SVG, PNG or PDF", long_about = None)]
struct Args {
    /// Snapshot JSON: {"cities": [...], "solution": {"tour": [...], "cost": N}} (use "-" for stdin)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file path (extension determines format: .svg, .png or .pdf)
    #[arg(short, long, value_name = "OUTPUT")]
    output: PathBuf,

    /// Builtin palette name or palette file (TOML or YAML)
    #[arg(short, long, value_name = "PALETTE")]
    palette: Option<String>,

    /// Canvas width in pixels
    #[arg(long, default_value_t = 800)]
    width: u32,

    /// Canvas height in pixels
    #[arg(long, default_value_t = 600)]
    height: u32,

    /// Raster scale multiplier for PNG output
    #[arg(long, default_value_t = 1.0)]
    png_scale: f32,
}

fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tourviz=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let palette = match &args.palette {
        Some(spec) => Palette::resolve(spec).map_err(|e| e.to_string())?,
        None => Palette::default(),
    };

    let snapshot = if args.input.to_str() == Some("-") {
        let mut buffer = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut buffer)
            .map_err(|e| format!("Failed to read from stdin: {}", e))?;
        buffer
    } else {
        std::fs::read_to_string(&args.input)
            .map_err(|e| format!("Failed to read input file: {}", e))?
    };

    let (graph, solution) = wire::decode_snapshot(&snapshot).map_err(|e| e.to_string())?;

    let size = CanvasSize::new(args.width, args.height);
    if size.is_degenerate() {
        return Err(format!("Canvas size {}x{} is not drawable", args.width, args.height));
    }
    if let Some(index) = graph.first_out_of_bounds(size) {
        tracing::warn!(index, "city lies outside the canvas");
    }

    let frame = plan(Some(&graph), solution.as_ref(), size, palette.city_radius);
    let svg = svg::encode(&frame, &palette);

    let format = export::write(&svg, &args.output, args.png_scale).map_err(|e| e.to_string())?;
    eprintln!("{} saved to: {}", format, args.output.display());

    Ok(())
}
