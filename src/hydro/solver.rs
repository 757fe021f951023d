//! Drainage-area and height solvers.
//!
//! Both phases walk every forest root's subtree: areas by post-order
//! summation, heights by pre-order propagation of the parent's updated
//! height. Roots are processed in parallel; because subtrees are disjoint, a
//! worker only ever reads the shared arena and returns its update list,
//! which is applied after the join. Update lists keep result order equal to
//! root order, so output does not depend on the thread count.
//!
//! The height step is an implicit (backward-Euler) solve of the
//! stream-power law `dh/dt = uplift - K·sqrt(A)·(h - h_parent)/d`, stable
//! for any time step — an explicit scheme diverges when flow is large or
//! the parent edge short. After the solve the slope to the parent is
//! clamped to the biome's talus angle, jittered by 3D value noise so scree
//! fields do not form perfectly straight ramps.
//!
//! Traversals use explicit stacks: tree depth is bounded only by the node
//! count, which overflows the call stack on large meshes.

use std::collections::HashMap;

use noise::{NoiseFn, OpenSimplex};
use rayon::prelude::*;

use crate::biomes::ErosionSettings;
use crate::hydro::node::{collect_subtree, WaterNode};

/// 3D value noise used to perturb the talus-angle lookup.
pub struct TalusJitter {
    noise: OpenSimplex,
}

impl TalusJitter {
    pub fn new(seed: u32) -> Self {
        Self {
            noise: OpenSimplex::new(seed),
        }
    }

    /// Noise value in `[-1, 1]`.
    pub fn sample(&self, x: f32, y: f32, z: f32) -> f32 {
        self.noise.get([x as f64, y as f64, z as f64]) as f32
    }
}

/// Recompute `drainage_area` for every node reachable from `roots`:
/// the node's own cell area plus everything upstream.
pub fn compute_areas(nodes: &mut [WaterNode], roots: &[usize]) {
    let snapshot: &[WaterNode] = nodes;
    let updates: Vec<Vec<(usize, f32)>> = roots
        .par_iter()
        .map(|&root| {
            let order = collect_subtree(snapshot, root);
            let mut accumulated: HashMap<usize, f32> = HashMap::with_capacity(order.len());
            // Pre-order reversed puts every child before its parent.
            for &n in order.iter().rev() {
                let mut sum = snapshot[n].area;
                for &child in &snapshot[n].children {
                    sum += accumulated[&child];
                }
                accumulated.insert(n, sum);
            }
            order.into_iter().map(|n| (n, accumulated[&n])).collect()
        })
        .collect();

    for list in updates {
        for (n, area) in list {
            nodes[n].drainage_area = area;
        }
    }
}

/// Advance every non-external node's height by one implicit erosion step,
/// pre-order from `roots` so each node sees its parent's updated height.
/// `settings` is indexed by biome. Roots must be external outlets.
pub fn compute_heights(
    nodes: &mut [WaterNode],
    roots: &[usize],
    settings: &[&ErosionSettings],
    jitter: &TalusJitter,
) {
    let snapshot: &[WaterNode] = nodes;
    let updates: Vec<Vec<(usize, f32)>> = roots
        .par_iter()
        .map(|&root| {
            let mut out = Vec::new();
            let mut stack = vec![(root, 0.0f32)];
            while let Some((n, parent_height)) = stack.pop() {
                let node = &snapshot[n];
                let new_height = if node.is_external {
                    node.height
                } else {
                    solve_node_height(node, parent_height, settings[node.biome], jitter)
                };
                out.push((n, new_height));
                for &child in &node.children {
                    stack.push((child, new_height));
                }
            }
            out
        })
        .collect();

    for list in updates {
        for (n, height) in list {
            nodes[n].height = height;
        }
    }
}

fn solve_node_height(
    node: &WaterNode,
    parent_height: f32,
    settings: &ErosionSettings,
    jitter: &TalusJitter,
) -> f32 {
    let flow = settings.erosion_power as f64 * (node.drainage_area as f64).sqrt();
    let erosion = flow / node.distance_to_parent as f64;
    let dt = settings.delta_time as f64;
    let numerator =
        node.height as f64 + dt * (node.uplift as f64 + erosion * parent_height as f64);
    let mut height = (numerator / (1.0 + erosion * dt)) as f32;

    let variance = jitter.sample(node.simplex_x, node.simplex_y, height / 10.0);
    let height_bucket = ((height * settings.height_multiplier).round() as i64).clamp(0, 1023);
    let jitter_bucket = (((variance + 1.0) * 128.0).round() as i64).clamp(0, 255);
    let talus = settings
        .talus_angles
        .sample(height_bucket as usize, jitter_bucket as usize);
    if (height - parent_height) / node.distance_to_parent > talus {
        height = node.distance_to_parent * talus + parent_height;
    }
    height
}
