//! Lake detection and outlet (pass) resolution.
//!
//! Each erosion iteration first relaxes the forest by steepest descent:
//! every non-external node re-parents onto its lowest neighbor. Nodes that
//! are their own minimum become lake roots. Lakes must still drain, so the
//! boundary between every pair of basins is scanned for its lowest saddle
//! (the pass), and lakes are merged into the drainage network greedily from
//! the globally lowest pass upward — a Kruskal-like order that guarantees
//! each lake spills through its true lowest outlet.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;

use crate::error::EngineError;
use crate::graph::FlowGraph;
use crate::hydro::node::{collect_subtree, detach, WaterNode, NO_LAKE};

/// Lowest known saddle between two basins. `node_a` lies in `lakes.0`,
/// `node_b` in `lakes.1`; the saddle height is the higher of the two
/// endpoint heights.
#[derive(Clone, Debug)]
pub struct Pass {
    pub lakes: (usize, usize),
    pub node_a: usize,
    pub node_b: usize,
    pub height: f32,
}

/// Steepest-descent relaxation and lake labeling.
///
/// Re-parents every non-external node onto its strictly lowest neighbor
/// (keeping the current parent when it already is the minimum), turns
/// self-minima into lake roots, then floods basin ids through the disjoint
/// subtrees: river basins take ids `0..rivers.len()`, lakes follow.
/// Returns the lake roots.
pub fn prepare_nodes_and_lakes(nodes: &mut [WaterNode], rivers: &[usize]) -> Vec<usize> {
    let mut lakes = Vec::new();
    for id in 0..nodes.len() {
        nodes[id].lake = NO_LAKE;
        if nodes[id].is_external {
            continue;
        }
        let mut min_height = nodes[id].height;
        let mut min_node = id;
        let mut distance_to_min = 0.0f32;
        for k in 0..nodes[id].adjacents.len() {
            let (other, distance) = nodes[id].adjacents[k];
            if nodes[other].height < min_height {
                min_node = other;
                distance_to_min = distance;
                min_height = nodes[other].height;
            }
        }
        if min_node != nodes[id].parent {
            detach(nodes, id);
            nodes[id].parent = min_node;
            nodes[id].distance_to_parent = distance_to_min;
            if min_node != id {
                nodes[min_node].children.push(id);
            }
        }
        if min_node == id {
            lakes.push(id);
        }
    }

    // Basin labeling is parallel across the disjoint subtrees.
    let snapshot: &[WaterNode] = nodes;
    let subtrees: Vec<Vec<usize>> = rivers
        .par_iter()
        .chain(lakes.par_iter())
        .map(|&root| collect_subtree(snapshot, root))
        .collect();
    for (lake_id, members) in subtrees.iter().enumerate() {
        for &n in members {
            nodes[n].lake = lake_id;
        }
    }

    lakes
}

/// Scan every lake subtree's adjacency for edges crossing a basin boundary
/// and keep the lowest pass per unordered basin pair. The per-lake scans run
/// in parallel; merging the small candidate maps is serial.
pub fn find_passes(nodes: &[WaterNode], lakes: &[usize]) -> HashMap<(usize, usize), Pass> {
    let per_lake: Vec<Vec<((usize, usize), Pass)>> = lakes
        .par_iter()
        .map(|&lake_root| {
            let mut local: HashMap<(usize, usize), Pass> = HashMap::new();
            for n in collect_subtree(nodes, lake_root) {
                let node = &nodes[n];
                for &(other, _) in &node.adjacents {
                    if nodes[other].lake == node.lake {
                        continue;
                    }
                    let (key, node_a, node_b) = if node.lake < nodes[other].lake {
                        ((node.lake, nodes[other].lake), n, other)
                    } else {
                        ((nodes[other].lake, node.lake), other, n)
                    };
                    let height = node.height.max(nodes[other].height);
                    let better = match local.get(&key) {
                        Some(existing) => existing.height > height,
                        None => true,
                    };
                    if better {
                        local.insert(
                            key,
                            Pass {
                                lakes: key,
                                node_a,
                                node_b,
                                height,
                            },
                        );
                    }
                }
            }
            // Sorted so the serial merge below is order-independent.
            let mut list: Vec<_> = local.into_iter().collect();
            list.sort_by_key(|(key, _)| *key);
            list
        })
        .collect();

    let mut passes: HashMap<(usize, usize), Pass> = HashMap::new();
    for list in per_lake {
        for (key, pass) in list {
            let better = match passes.get(&key) {
                Some(existing) => existing.height > pass.height,
                None => true,
            };
            if better {
                passes.insert(key, pass);
            }
        }
    }
    passes
}

/// Greedy watershed merge: resolve passes from the globally lowest upward.
///
/// Every pass appears in both directions. A pass whose source basin already
/// drains is discarded; a pass whose target basin drains marks the source
/// as draining and physically re-parents the source lake's current root
/// onto the pass's target node. The scan restarts after each merge because
/// the newly draining basin may unlock cheaper passes that were skipped.
pub fn connect_lakes(
    nodes: &mut [WaterNode],
    graph: &FlowGraph,
    passes: HashMap<(usize, usize), Pass>,
    rivers: &[usize],
) -> Result<(), EngineError> {
    let mut expanded = Vec::with_capacity(passes.len() * 2);
    for pass in passes.into_values() {
        expanded.push(Pass {
            lakes: (pass.lakes.1, pass.lakes.0),
            node_a: pass.node_b,
            node_b: pass.node_a,
            height: pass.height,
        });
        expanded.push(pass);
    }
    // Highest first; ties broken by basin pair so the order never depends
    // on hash iteration.
    expanded.sort_by(|a, b| {
        b.height
            .partial_cmp(&a.height)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.lakes.cmp(&b.lakes))
    });

    let mut outflowing: HashSet<usize> = rivers.iter().map(|&r| nodes[r].lake).collect();
    while !expanded.is_empty() {
        let mut progressed = false;
        let mut j = expanded.len();
        while j > 0 {
            j -= 1;
            let (source, target) = expanded[j].lakes;
            if outflowing.contains(&source) {
                expanded.remove(j);
                progressed = true;
                continue;
            }
            if outflowing.contains(&target) {
                let pass = expanded.remove(j);
                outflowing.insert(source);
                let lake_root = find_root(nodes, pass.node_a);
                nodes[pass.node_b].children.push(lake_root);
                nodes[lake_root].parent = pass.node_b;
                nodes[lake_root].distance_to_parent =
                    graph.distance(nodes[lake_root].id, nodes[pass.node_b].id);
                progressed = true;
                break;
            }
        }
        if !progressed {
            // No pass touches a draining basin: the pass graph is cut off
            // from every outlet, which a connected land mass cannot produce.
            return Err(EngineError::LakeResolutionStall {
                remaining: expanded.len(),
            });
        }
    }
    Ok(())
}

/// Chase parent links to the owning root: an external outlet or a
/// self-parented lake minimum.
fn find_root(nodes: &[WaterNode], start: usize) -> usize {
    let mut current = start;
    while !(nodes[current].is_external || nodes[current].parent == current) {
        current = nodes[current].parent;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_node(idx: usize, is_external: bool, height: f32) -> WaterNode {
        WaterNode {
            id: idx,
            is_external,
            area: 1.0,
            adjacents: Vec::new(),
            simplex_x: 0.0,
            simplex_y: 0.0,
            uplift: 0.0,
            height,
            drainage_area: 1.0,
            biome: 0,
            lake: NO_LAKE,
            parent: idx,
            distance_to_parent: 0.0,
            children: Vec::new(),
        }
    }

    fn link_chain(nodes: &mut [WaterNode]) {
        for i in 0..nodes.len() {
            if i > 0 {
                nodes[i].adjacents.push((i - 1, 1.0));
            }
            if i + 1 < nodes.len() {
                nodes[i].adjacents.push((i + 1, 1.0));
            }
        }
    }

    /// Outlet at 0, ridge at 2, closed basin behind it:
    /// heights 0 - 1 - 5 - 1 - 2 along a chain.
    fn ridge_arena() -> Vec<WaterNode> {
        let heights = [0.0, 1.0, 5.0, 1.0, 2.0];
        let mut nodes: Vec<WaterNode> = heights
            .iter()
            .enumerate()
            .map(|(i, &h)| test_node(i, i == 0, h))
            .collect();
        link_chain(&mut nodes);
        nodes
    }

    fn chain_graph(len: usize) -> FlowGraph {
        let points: Vec<[f32; 2]> = (0..len).map(|i| [i as f32 * 0.2, 0.5]).collect();
        let adjacency = (0..len)
            .map(|i| {
                let mut adj = Vec::new();
                if i > 0 {
                    adj.push(i as u32 - 1);
                }
                if i + 1 < len {
                    adj.push(i as u32 + 1);
                }
                adj
            })
            .collect();
        let areas = vec![0.04; len];
        FlowGraph::new(points, adjacency, areas, Vec::new())
    }

    #[test]
    fn test_steepest_descent_reparenting() {
        let mut nodes = ridge_arena();
        let lakes = prepare_nodes_and_lakes(&mut nodes, &[0]);

        assert_eq!(nodes[1].parent, 0, "node 1 should drain to the outlet");
        assert_eq!(nodes[2].parent, 1, "ridge drains down the outlet side");
        assert_eq!(nodes[4].parent, 3, "node 4 drains into the basin");
        // Node 3 has no lower neighbor: a lake.
        assert_eq!(lakes, vec![3]);
        assert_eq!(nodes[3].parent, 3);
    }

    #[test]
    fn test_lake_ids_flood_disjoint_subtrees() {
        let mut nodes = ridge_arena();
        prepare_nodes_and_lakes(&mut nodes, &[0]);

        // River basin is id 0, the lake takes the next id.
        for n in [0, 1, 2] {
            assert_eq!(nodes[n].lake, 0, "node {} not in river basin", n);
        }
        for n in [3, 4] {
            assert_eq!(nodes[n].lake, 1, "node {} not in lake basin", n);
        }
    }

    #[test]
    fn test_single_pass_at_ridge_saddle() {
        let mut nodes = ridge_arena();
        let lakes = prepare_nodes_and_lakes(&mut nodes, &[0]);
        let passes = find_passes(&nodes, &lakes);

        assert_eq!(passes.len(), 1, "expected exactly one pass");
        let pass = passes.get(&(0, 1)).expect("pass keyed by basin pair");
        // The boundary edge is ridge(2) - basin(3); the saddle sits at the
        // ridge node's height.
        assert_eq!(pass.height, 5.0);
        assert_eq!(pass.node_a, 2);
        assert_eq!(pass.node_b, 3);
    }

    #[test]
    fn test_connect_lakes_reaches_outlet() {
        let mut nodes = ridge_arena();
        let lakes = prepare_nodes_and_lakes(&mut nodes, &[0]);
        let passes = find_passes(&nodes, &lakes);
        let graph = chain_graph(5);
        connect_lakes(&mut nodes, &graph, passes, &[0]).unwrap();

        // The lake root now hangs off the river basin's side of the pass.
        assert_eq!(nodes[3].parent, 2);
        assert!(nodes[3].distance_to_parent > 0.0);
        // Every node walks to an external root.
        for start in 0..nodes.len() {
            let root = find_root(&nodes, start);
            assert!(nodes[root].is_external, "node {} stuck in basin", start);
        }
    }

    #[test]
    fn test_two_lakes_chain_through_each_other() {
        // Outlet, then two basins in series behind ridges:
        // 0.0 - 1.0 - 6.0 - 1.0 - 4.0 - 0.5
        let heights = [0.0, 1.0, 6.0, 1.0, 4.0, 0.5];
        let mut nodes: Vec<WaterNode> = heights
            .iter()
            .enumerate()
            .map(|(i, &h)| test_node(i, i == 0, h))
            .collect();
        link_chain(&mut nodes);

        let lakes = prepare_nodes_and_lakes(&mut nodes, &[0]);
        assert_eq!(lakes, vec![3, 5]);
        let passes = find_passes(&nodes, &lakes);
        let graph = chain_graph(6);
        connect_lakes(&mut nodes, &graph, passes, &[0]).unwrap();

        for start in 0..nodes.len() {
            let root = find_root(&nodes, start);
            assert!(nodes[root].is_external, "node {} stuck in basin", start);
        }
    }

    #[test]
    fn test_merge_stall_is_fatal() {
        // Two basins that only know each other and no outlet at all.
        let mut nodes = vec![test_node(0, false, 1.0), test_node(1, false, 2.0)];
        nodes[0].lake = 0;
        nodes[1].lake = 1;
        let mut passes = HashMap::new();
        passes.insert(
            (0, 1),
            Pass {
                lakes: (0, 1),
                node_a: 0,
                node_b: 1,
                height: 2.0,
            },
        );
        let graph = chain_graph(2);
        assert!(matches!(
            connect_lakes(&mut nodes, &graph, passes, &[]),
            Err(EngineError::LakeResolutionStall { remaining: 2 })
        ));
    }
}
