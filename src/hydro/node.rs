//! Water-node arena construction.
//!
//! Land vertices of the mesh become [`WaterNode`]s held in a dense arena;
//! parent/child/adjacency links are arena indices, so the drainage forest
//! never owns itself cyclically. A vertex-id lookup (`node_index`) maps mesh
//! vertices back to arena slots for rasterization and pass re-routing.

use rayon::prelude::*;

use crate::biomes::{Biome, BiomeCatalog, DetailLevel};
use crate::error::EngineError;
use crate::graph::FlowGraph;
use crate::raster::Raster;

/// Sentinel for a node not currently owned by any lake or river basin.
pub const NO_LAKE: usize = usize::MAX;

/// Scale from normalized mesh coordinates to talus-jitter noise space.
pub const SIMPLEX_SCALE: f32 = 96.0;

/// One land vertex of the current mesh level.
pub struct WaterNode {
    /// Mesh vertex id this node was built from.
    pub id: usize,
    /// True for coastal vertices: drainage outlets with fixed height.
    pub is_external: bool,
    /// Voronoi cell area in physical units.
    pub area: f32,
    /// `(arena index, edge length in physical units)` per land neighbor.
    pub adjacents: Vec<(usize, f32)>,
    /// Fixed noise-space coordinates for talus jitter sampling.
    pub simplex_x: f32,
    pub simplex_y: f32,
    pub uplift: f32,
    pub height: f32,
    pub drainage_area: f32,
    /// Index into the biome catalog.
    pub biome: usize,
    /// Owning basin id during lake resolution; [`NO_LAKE`] when unset.
    pub lake: usize,
    /// Arena index of the drainage parent; equal to the node's own index
    /// for roots (outlets and unresolved lake minima).
    pub parent: usize,
    pub distance_to_parent: f32,
    /// Arena indices of nodes draining into this one.
    pub children: Vec<usize>,
}

/// Land/water partition of a mesh against the land mask.
pub struct RegionData {
    /// Land vertex ids in ascending order.
    pub land: Vec<usize>,
    /// Per-vertex water flag.
    pub water: Vec<bool>,
    /// Land vertices adjacent to at least one water vertex, ascending.
    pub coast: Vec<usize>,
}

/// Classify mesh vertices against the land mask (byte >= 128 is land) and
/// extract the coastline.
pub fn build_region_data(
    graph: &FlowGraph,
    land_mask: &Raster<u8>,
) -> Result<RegionData, EngineError> {
    let count = graph.vertex_count();
    let mut land = Vec::with_capacity(count);
    let mut water = vec![false; count];
    for id in 0..count {
        let point = graph.point(id);
        if land_mask.sample_nearest(point[0], point[1]) < 128 {
            water[id] = true;
        } else {
            land.push(id);
        }
    }
    if land.is_empty() {
        return Err(EngineError::EmptyLand);
    }

    let coast: Vec<usize> = land
        .iter()
        .copied()
        .filter(|&id| graph.adjacent(id).iter().any(|&adj| water[adj as usize]))
        .collect();
    if coast.is_empty() {
        return Err(EngineError::NoOutlets);
    }

    Ok(RegionData { land, water, coast })
}

/// Build the node arena for a mesh level. Every node starts self-parented
/// with zeroed simulation state; biome/uplift/height seeding happens
/// separately. Construction and adjacency linking are both parallel with a
/// join between them.
pub fn create_water_nodes(
    graph: &FlowGraph,
    region: &RegionData,
    distance_scale: f32,
) -> (Vec<Option<usize>>, Vec<WaterNode>) {
    let area_scale = distance_scale * distance_scale;
    let mut coastal = vec![false; graph.vertex_count()];
    for &id in &region.coast {
        coastal[id] = true;
    }

    let mut nodes: Vec<WaterNode> = region
        .land
        .par_iter()
        .enumerate()
        .map(|(arena_idx, &vertex_id)| {
            let point = graph.point(vertex_id);
            let area = graph.area(vertex_id) * area_scale;
            WaterNode {
                id: vertex_id,
                is_external: coastal[vertex_id],
                area,
                adjacents: Vec::with_capacity(graph.adjacent(vertex_id).len()),
                simplex_x: point[0] * SIMPLEX_SCALE,
                simplex_y: point[1] * SIMPLEX_SCALE,
                uplift: 0.0,
                height: 0.0,
                drainage_area: area,
                biome: 0,
                lake: NO_LAKE,
                parent: arena_idx,
                distance_to_parent: 0.0,
                children: Vec::new(),
            }
        })
        .collect();

    let mut node_index = vec![None; graph.vertex_count()];
    for (arena_idx, node) in nodes.iter().enumerate() {
        node_index[node.id] = Some(arena_idx);
    }

    let index_ref = &node_index;
    nodes.par_iter_mut().for_each(|node| {
        for &adj in graph.adjacent(node.id) {
            // Water neighbors carry no drainage edge.
            if let Some(other) = index_ref[adj as usize] {
                let length = graph.distance(node.id, adj as usize) * distance_scale;
                node.adjacents.push((other, length));
            }
        }
    });

    (node_index, nodes)
}

/// Map an uplift-mask byte to physical uplift for a biome. Byte zero means
/// no uplift at all, not the biome floor.
pub fn uplift_from_mask(byte: u8, biome: &Biome) -> f32 {
    if byte == 0 {
        0.0
    } else {
        (byte as f32 / 256.0) * biome.delta_uplift + biome.min_uplift
    }
}

/// Seed biome and uplift state from the masks at the coarsest level.
pub fn seed_bootstrap_state(
    nodes: &mut [WaterNode],
    graph: &FlowGraph,
    catalog: &BiomeCatalog,
    biome_mask: &Raster<u8>,
    uplift_mask: &Raster<u8>,
) {
    nodes.par_iter_mut().for_each(|node| {
        let point = graph.point(node.id);
        let biome_idx = catalog.index_from_mask(biome_mask.sample_nearest(point[0], point[1]));
        let biome = catalog.get(biome_idx);
        let lift = uplift_from_mask(uplift_mask.sample_nearest(point[0], point[1]), biome);
        node.biome = biome_idx;
        node.uplift = lift * biome.low.uplift_multiplier;
    });
}

/// Re-seed node state for a refinement level: heights come from the
/// previous level's rasterized output sampled at the new vertex positions,
/// biome and uplift are re-sampled from their masks. External nodes stay at
/// the coastline height.
pub fn apply_previous_level(
    nodes: &mut [WaterNode],
    graph: &FlowGraph,
    height_map: &Raster<f32>,
    catalog: &BiomeCatalog,
    biome_mask: &Raster<u8>,
    uplift_mask: &Raster<u8>,
    level: DetailLevel,
) {
    nodes.par_iter_mut().for_each(|node| {
        if node.is_external {
            return;
        }
        let point = graph.point(node.id);
        let biome_idx = catalog.index_from_mask(biome_mask.sample_nearest(point[0], point[1]));
        let biome = catalog.get(biome_idx);
        let settings = biome.level(level);

        let sampled = height_map.sample_nearest(point[0], point[1]);
        node.height = sampled.max(0.0) * settings.previous_tier_blend_weight;
        node.biome = biome_idx;

        let lift = uplift_from_mask(uplift_mask.sample_nearest(point[0], point[1]), biome);
        node.uplift = biome.min_uplift.max(lift * settings.uplift_multiplier);
    });
}

/// Remove `child` from its current parent's child list. No-op for roots.
pub(crate) fn detach(nodes: &mut [WaterNode], child: usize) {
    let parent = nodes[child].parent;
    if parent != child {
        if let Some(pos) = nodes[parent].children.iter().position(|&c| c == child) {
            nodes[parent].children.swap_remove(pos);
        }
    }
}

/// Pre-order listing of a subtree. Iterative: tree depth can reach the node
/// count on degenerate chains, so recursion is off the table.
pub(crate) fn collect_subtree(nodes: &[WaterNode], root: usize) -> Vec<usize> {
    let mut order = Vec::new();
    let mut stack = vec![root];
    while let Some(n) = stack.pop() {
        order.push(n);
        stack.extend_from_slice(&nodes[n].children);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biomes::BiomeCatalog;

    /// 2x2 mesh: vertices 0,1 on the left half (land), 2,3 on the right
    /// (water), all mutually adjacent along grid edges.
    fn half_land_graph() -> (FlowGraph, Raster<u8>) {
        let points = vec![[0.1, 0.25], [0.1, 0.75], [0.9, 0.25], [0.9, 0.75]];
        let adjacency = vec![vec![1, 2], vec![0, 3], vec![0, 3], vec![1, 2]];
        let areas = vec![0.25; 4];
        let graph = FlowGraph::new(points, adjacency, areas, Vec::new());

        let mut mask = Raster::square_with(2, 0u8);
        mask.set(0, 0, 255);
        mask.set(0, 1, 255);
        (graph, mask)
    }

    #[test]
    fn test_region_partition_and_coast() {
        let (graph, mask) = half_land_graph();
        let region = build_region_data(&graph, &mask).unwrap();
        assert_eq!(region.land, vec![0, 1]);
        assert!(!region.water[0] && !region.water[1]);
        assert!(region.water[2] && region.water[3]);
        // Both land vertices touch water, so both are coastal.
        assert_eq!(region.coast, vec![0, 1]);
    }

    #[test]
    fn test_empty_land_is_an_error() {
        let (graph, _) = half_land_graph();
        let mask = Raster::square_with(2, 0u8);
        assert!(matches!(
            build_region_data(&graph, &mask),
            Err(EngineError::EmptyLand)
        ));
    }

    #[test]
    fn test_landlocked_mesh_has_no_outlets() {
        let (graph, _) = half_land_graph();
        let mask = Raster::square_with(2, 255u8);
        assert!(matches!(
            build_region_data(&graph, &mask),
            Err(EngineError::NoOutlets)
        ));
    }

    #[test]
    fn test_create_nodes_scales_and_skips_water() {
        let (graph, mask) = half_land_graph();
        let region = build_region_data(&graph, &mask).unwrap();
        let scale = 1000.0;
        let (node_index, nodes) = create_water_nodes(&graph, &region, scale);

        assert_eq!(nodes.len(), 2);
        assert!(node_index[2].is_none() && node_index[3].is_none());

        let a = &nodes[node_index[0].unwrap()];
        assert!(a.is_external);
        assert_eq!(a.area, 0.25 * scale * scale);
        // Only the land neighbor survives into the adjacency list.
        assert_eq!(a.adjacents.len(), 1);
        let (other, dist) = a.adjacents[0];
        assert_eq!(nodes[other].id, 1);
        assert!((dist - 0.5 * scale).abs() < 1e-3);
        // Every node starts self-parented.
        for (idx, node) in nodes.iter().enumerate() {
            assert_eq!(node.parent, idx);
        }
    }

    #[test]
    fn test_uplift_from_mask() {
        let catalog = BiomeCatalog::standard();
        let biome = catalog.get(0);
        assert_eq!(uplift_from_mask(0, biome), 0.0);
        let full = uplift_from_mask(255, biome);
        assert!((full - (255.0 / 256.0 * biome.delta_uplift + biome.min_uplift)).abs() < 1e-9);
        assert!(uplift_from_mask(1, biome) > biome.min_uplift);
    }

    #[test]
    fn test_detach_and_collect_subtree() {
        let (graph, mask) = half_land_graph();
        let region = build_region_data(&graph, &mask).unwrap();
        let (_, mut nodes) = create_water_nodes(&graph, &region, 1.0);

        nodes[1].parent = 0;
        nodes[0].children.push(1);
        assert_eq!(collect_subtree(&nodes, 0), vec![0, 1]);

        detach(&mut nodes, 1);
        assert!(nodes[0].children.is_empty());
        assert_eq!(collect_subtree(&nodes, 0), vec![0]);
    }
}
