//! Multi-resolution drainage-network erosion pipeline.
//!
//! Three mesh levels run in sequence: the coarsest bootstraps from the
//! input masks, and each refinement level re-seeds its nodes from the
//! previous level's rasterized height field, sampled at the finer mesh's
//! vertex positions. No node identity crosses levels; the raster is the
//! only bridge. Iteration counts shrink with resolution because fine
//! detail needs few relaxation steps once the coarse shape exists.
//!
//! Per iteration: steepest-descent relaxation and lake labeling, pass
//! discovery and greedy lake merging, drainage-area summation, then the
//! implicit height solve. Phases are separated by join barriers; see the
//! submodules for the parallelism rules inside each phase.

pub mod forest;
pub mod lakes;
pub mod node;
pub mod render;
pub mod solver;

use log::{debug, info};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::biomes::{BiomeCatalog, DetailLevel, ErosionSettings};
use crate::error::EngineError;
use crate::graph::FlowGraph;
use crate::raster::Raster;

use forest::build_drainage_forest;
use lakes::{connect_lakes, find_passes, prepare_nodes_and_lakes};
use node::{
    apply_previous_level, build_region_data, create_water_nodes, seed_bootstrap_state, WaterNode,
};
use render::rasterize_heights;
use solver::{compute_areas, compute_heights, TalusJitter};

/// Pipeline tuning knobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterFlowParams {
    /// Integer knob scaling mesh units into physical distance; see
    /// [`distance_scale`].
    pub map_scale: u32,
    /// Width of the final height raster.
    pub output_width: usize,
    /// Erosion iterations at the coarse level.
    pub low_iterations: usize,
    /// Erosion iterations at the medium level.
    pub mid_iterations: usize,
    /// Erosion iterations at the fine level.
    pub high_iterations: usize,
    /// Intermediate raster width handed from the coarse to the medium level.
    pub low_width: usize,
    /// Intermediate raster width handed from the medium to the fine level.
    pub mid_width: usize,
    /// Fraction of the 16-bit output range reserved for water.
    pub water_line: f32,
}

impl Default for WaterFlowParams {
    fn default() -> Self {
        Self {
            map_scale: 20,
            output_width: 4096,
            low_iterations: 50,
            mid_iterations: 25,
            high_iterations: 5,
            low_width: 1024,
            mid_width: 2048,
            water_line: render::WATER_LINE,
        }
    }
}

/// Physical meters per normalized mesh unit for a map-scale knob value.
/// Quadratic in the knob, clamped to the `[10_000, 1_000_000]` range.
pub fn distance_scale(map_scale: u32) -> f32 {
    let scale = ((map_scale * map_scale) as f32 / 400.0).clamp(0.0, 1.0);
    scale * 990_000.0 + 10_000.0
}

/// One mesh level's simulation state: the node arena, the mesh-vertex
/// lookup into it, and the outlet roots. Owned by the level that built it
/// and discarded once the level's raster is written.
pub struct LevelNodes {
    pub node_index: Vec<Option<usize>>,
    pub nodes: Vec<WaterNode>,
    pub rivers: Vec<usize>,
}

/// Run the full three-level simulation and return the finest level's
/// height raster.
#[allow(clippy::too_many_arguments)]
pub fn generate_water_flows(
    seed: u64,
    graph_small: &FlowGraph,
    graph_medium: &FlowGraph,
    graph_large: &FlowGraph,
    land_mask: &Raster<u8>,
    biome_mask: &Raster<u8>,
    uplift_mask: &Raster<u8>,
    catalog: &BiomeCatalog,
    params: &WaterFlowParams,
) -> Result<Raster<f32>, EngineError> {
    assert!(!catalog.is_empty(), "biome catalog must not be empty");
    let scale = distance_scale(params.map_scale);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let forest_seed = rng.gen::<u64>();
    let jitter = TalusJitter::new(seed as u32);

    info!(
        "drainage simulation: {} / {} / {} mesh vertices, distance scale {:.0}",
        graph_small.vertex_count(),
        graph_medium.vertex_count(),
        graph_large.vertex_count(),
        scale
    );

    // The coarse simulation runs while the finer levels' node arenas are
    // being built; both only read the masks.
    let (low_result, (mid_prep, high_prep)) = rayon::join(
        || -> Result<Raster<f32>, EngineError> {
            let mut level = bootstrap_erosion(
                graph_small,
                land_mask,
                biome_mask,
                uplift_mask,
                catalog,
                scale,
                forest_seed,
                &jitter,
            )?;
            perform_erosion(
                graph_small,
                &mut level,
                catalog,
                DetailLevel::Low,
                params.low_iterations,
                params.low_width,
                &jitter,
            )
        },
        || {
            rayon::join(
                || prepare_graph_nodes(graph_medium, land_mask, scale),
                || prepare_graph_nodes(graph_large, land_mask, scale),
            )
        },
    );
    let low_map = low_result?;
    let mut mid_level = mid_prep?;
    let mut high_level = high_prep?;

    apply_previous_level(
        &mut mid_level.nodes,
        graph_medium,
        &low_map,
        catalog,
        biome_mask,
        uplift_mask,
        DetailLevel::Mid,
    );
    let mid_map = perform_erosion(
        graph_medium,
        &mut mid_level,
        catalog,
        DetailLevel::Mid,
        params.mid_iterations,
        params.mid_width,
        &jitter,
    )?;

    apply_previous_level(
        &mut high_level.nodes,
        graph_large,
        &mid_map,
        catalog,
        biome_mask,
        uplift_mask,
        DetailLevel::High,
    );
    perform_erosion(
        graph_large,
        &mut high_level,
        catalog,
        DetailLevel::High,
        params.high_iterations,
        params.output_width,
        &jitter,
    )
}

/// Build and seed the coarsest level from the masks, grow the randomized
/// bootstrap forest, and run the single bootstrap solve that gives the
/// first erosion iteration something to relax.
#[allow(clippy::too_many_arguments)]
pub fn bootstrap_erosion(
    graph: &FlowGraph,
    land_mask: &Raster<u8>,
    biome_mask: &Raster<u8>,
    uplift_mask: &Raster<u8>,
    catalog: &BiomeCatalog,
    scale: f32,
    forest_seed: u64,
    jitter: &TalusJitter,
) -> Result<LevelNodes, EngineError> {
    let region = build_region_data(graph, land_mask)?;
    let (node_index, mut nodes) = create_water_nodes(graph, &region, scale);
    seed_bootstrap_state(&mut nodes, graph, catalog, biome_mask, uplift_mask);

    let rivers: Vec<usize> = region.coast.iter().filter_map(|&v| node_index[v]).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(forest_seed);
    build_drainage_forest(&mut nodes, &rivers, &mut rng)?;

    compute_areas(&mut nodes, &rivers);
    let bootstrap = catalog.bootstrap_settings();
    compute_heights(&mut nodes, &rivers, &bootstrap, jitter);

    debug!(
        "bootstrapped {} land nodes, {} outlets",
        nodes.len(),
        rivers.len()
    );
    Ok(LevelNodes {
        node_index,
        nodes,
        rivers,
    })
}

/// Build a refinement level's node arena. State stays zeroed until the
/// previous level's raster is applied.
pub fn prepare_graph_nodes(
    graph: &FlowGraph,
    land_mask: &Raster<u8>,
    scale: f32,
) -> Result<LevelNodes, EngineError> {
    let region = build_region_data(graph, land_mask)?;
    let (node_index, nodes) = create_water_nodes(graph, &region, scale);
    let rivers: Vec<usize> = region.coast.iter().filter_map(|&v| node_index[v]).collect();
    Ok(LevelNodes {
        node_index,
        nodes,
        rivers,
    })
}

/// Run `iterations` erosion steps on one level and rasterize the result.
pub fn perform_erosion(
    graph: &FlowGraph,
    level: &mut LevelNodes,
    catalog: &BiomeCatalog,
    tier: DetailLevel,
    iterations: usize,
    raster_width: usize,
    jitter: &TalusJitter,
) -> Result<Raster<f32>, EngineError> {
    let schedules: Vec<Vec<&ErosionSettings>> = catalog
        .iter()
        .map(|biome| biome.level(tier).schedule(iterations))
        .collect();
    for (biome, schedule) in schedules.iter().enumerate() {
        if schedule.len() < iterations {
            return Err(EngineError::EmptySchedule { biome });
        }
    }

    for i in 0..iterations {
        let lake_roots = prepare_nodes_and_lakes(&mut level.nodes, &level.rivers);
        let passes = find_passes(&level.nodes, &lake_roots);
        connect_lakes(&mut level.nodes, graph, passes, &level.rivers)?;
        compute_areas(&mut level.nodes, &level.rivers);
        let step: Vec<&ErosionSettings> = schedules.iter().map(|s| s[i]).collect();
        compute_heights(&mut level.nodes, &level.rivers, &step, jitter);
        debug!(
            "erosion iteration {}/{}: {} lakes resolved",
            i + 1,
            iterations,
            lake_roots.len()
        );
    }

    Ok(rasterize_heights(
        graph,
        &level.node_index,
        &level.nodes,
        raster_width,
    ))
}
