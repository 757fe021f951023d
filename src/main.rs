use clap::Parser;

use terraflow::biomes::BiomeCatalog;
use terraflow::graph::FlowGraph;
use terraflow::hydro::{self, WaterFlowParams};
use terraflow::masks;

#[derive(Parser, Debug)]
#[command(name = "terraflow")]
#[command(about = "Simulate drainage-network erosion over a multi-resolution mesh")]
struct Args {
    /// Random seed (uses a random seed if not specified)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Mesh resolution of the coarse level (vertices per axis)
    #[arg(long, default_value = "48")]
    low_res: usize,

    /// Mesh resolution of the medium level
    #[arg(long, default_value = "96")]
    mid_res: usize,

    /// Mesh resolution of the fine level
    #[arg(long, default_value = "192")]
    high_res: usize,

    /// Map scale knob (0-20); controls physical distance per mesh unit
    #[arg(long, default_value = "20")]
    map_scale: u32,

    /// Width of the final height raster
    #[arg(long, default_value = "1024")]
    output_width: usize,

    /// Width of the synthesized input masks
    #[arg(long, default_value = "512")]
    mask_width: usize,

    /// Output PNG path (16-bit grayscale)
    #[arg(short, long, default_value = "heightmap.png")]
    output: String,

    /// JSON file overriding the pipeline parameters
    #[arg(long)]
    params: Option<String>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let seed = args.seed.unwrap_or_else(rand::random);
    println!("Generating terrain with seed: {}", seed);

    let mut params = match &args.params {
        Some(path) => match load_params(path) {
            Ok(params) => params,
            Err(message) => {
                eprintln!("Failed to load {}: {}", path, message);
                std::process::exit(1);
            }
        },
        None => WaterFlowParams::default(),
    };
    params.map_scale = args.map_scale;
    params.output_width = args.output_width;

    println!("Synthesizing input masks ({0}x{0})...", args.mask_width);
    let land_mask = masks::synth_land_mask(args.mask_width, seed);
    let biome_mask = masks::synth_biome_mask(args.mask_width, seed, 6);
    let uplift_mask = masks::synth_uplift_mask(args.mask_width, seed);
    let land_pixels = land_mask.as_slice().iter().filter(|&&b| b >= 128).count();
    println!(
        "Land coverage: {:.1}%",
        100.0 * land_pixels as f64 / (args.mask_width * args.mask_width) as f64
    );

    println!(
        "Building meshes: {0}x{0} / {1}x{1} / {2}x{2}...",
        args.low_res, args.mid_res, args.high_res
    );
    let graph_small = FlowGraph::jittered_grid(args.low_res, seed.wrapping_add(1));
    let graph_medium = FlowGraph::jittered_grid(args.mid_res, seed.wrapping_add(2));
    let graph_large = FlowGraph::jittered_grid(args.high_res, seed.wrapping_add(3));

    println!(
        "Running erosion ({} + {} + {} iterations)...",
        params.low_iterations, params.mid_iterations, params.high_iterations
    );
    let catalog = BiomeCatalog::standard();
    let start = std::time::Instant::now();
    let height_map = match hydro::generate_water_flows(
        seed,
        &graph_small,
        &graph_medium,
        &graph_large,
        &land_mask,
        &biome_mask,
        &uplift_mask,
        &catalog,
        &params,
    ) {
        Ok(map) => map,
        Err(e) => {
            eprintln!("Generation failed: {}", e);
            std::process::exit(1);
        }
    };
    println!(
        "Simulation finished in {:.1}s, max elevation {:.0}m",
        start.elapsed().as_secs_f32(),
        height_map.max_value()
    );

    let encoded = hydro::render::encode_height_map(&height_map, params.water_line);
    let width = height_map.width as u32;
    let image = match image::ImageBuffer::<image::Luma<u16>, Vec<u16>>::from_raw(
        width, width, encoded,
    ) {
        Some(image) => image,
        None => {
            eprintln!("Encoded buffer does not match raster dimensions");
            std::process::exit(1);
        }
    };
    match image.save(&args.output) {
        Ok(()) => println!("Saved height map: {}", args.output),
        Err(e) => {
            eprintln!("Failed to save {}: {}", args.output, e);
            std::process::exit(1);
        }
    }
}

fn load_params(path: &str) -> Result<WaterFlowParams, String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&text).map_err(|e| e.to_string())
}
