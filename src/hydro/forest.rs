//! Initial drainage forest construction.
//!
//! Before the first erosion step there are no heights to descend along, so
//! the forest is grown outward from the outlets by randomized breadth-first
//! expansion. The result is connectivity, not correctness: every land node
//! drains *somewhere*, and the steepest-descent relaxation of later
//! iterations reshapes the forest into the real drainage network.

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::error::EngineError;
use crate::hydro::node::{detach, WaterNode};

/// Grow the bootstrap forest from the outlet roots.
///
/// Each wave claims the unclaimed neighbors of the previous wave in a
/// shuffled order, so tree shape is randomized but fully determined by the
/// RNG state. Fails if land remains unclaimed after the frontier empties:
/// that land can never drain, which is a mesh configuration error rather
/// than something to paper over.
pub fn build_drainage_forest(
    nodes: &mut [WaterNode],
    rivers: &[usize],
    rng: &mut ChaCha8Rng,
) -> Result<(), EngineError> {
    if rivers.is_empty() {
        return Err(EngineError::NoOutlets);
    }

    let mut used = vec![false; nodes.len()];
    for &root in rivers {
        used[root] = true;
    }
    let mut remaining = nodes.len() - rivers.len();
    let mut next: Vec<usize> = rivers.to_vec();

    while remaining > 0 {
        if next.is_empty() {
            return Err(EngineError::DisconnectedLand { count: remaining });
        }
        let mut wave = std::mem::take(&mut next);
        wave.shuffle(rng);
        for id in wave {
            for k in 0..nodes[id].adjacents.len() {
                let (other, length) = nodes[id].adjacents[k];
                if !used[other] {
                    detach(nodes, other);
                    nodes[other].parent = id;
                    nodes[other].distance_to_parent = length;
                    nodes[id].children.push(other);
                    next.push(other);
                    used[other] = true;
                    remaining -= 1;
                }
            }
        }
    }

    Ok(())
}

/// Walk parent links from every node and check the forest shape: bounded
/// walks that end at an external or self-parented root, child lists that
/// mirror parent links.
#[cfg(test)]
pub(crate) fn assert_forest_invariant(nodes: &[WaterNode]) {
    for start in 0..nodes.len() {
        let mut current = start;
        let mut steps = 0;
        while !(nodes[current].is_external || nodes[current].parent == current) {
            current = nodes[current].parent;
            steps += 1;
            assert!(
                steps <= nodes.len(),
                "parent chain from node {} exceeds node count; cycle suspected",
                start
            );
        }
    }
    for (idx, node) in nodes.iter().enumerate() {
        if node.parent != idx {
            assert!(
                nodes[node.parent].children.contains(&idx),
                "node {} missing from its parent's child list",
                idx
            );
        }
        for &child in &node.children {
            assert_eq!(nodes[child].parent, idx, "child {} disowns parent {}", child, idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydro::node::{NO_LAKE, WaterNode};
    use rand::SeedableRng;

    /// Bare arena node with the given physical-unit adjacency.
    fn test_node(idx: usize, is_external: bool, adjacents: Vec<(usize, f32)>) -> WaterNode {
        WaterNode {
            id: idx,
            is_external,
            area: 1.0,
            adjacents,
            simplex_x: 0.0,
            simplex_y: 0.0,
            uplift: 0.0,
            height: 0.0,
            drainage_area: 1.0,
            biome: 0,
            lake: NO_LAKE,
            parent: idx,
            distance_to_parent: 0.0,
            children: Vec::new(),
        }
    }

    /// Chain 0-1-2-3-4 with unit edges; node 0 is the outlet.
    fn chain_arena() -> Vec<WaterNode> {
        (0..5)
            .map(|i| {
                let mut adj = Vec::new();
                if i > 0 {
                    adj.push((i - 1, 1.0));
                }
                if i < 4 {
                    adj.push((i + 1, 1.0));
                }
                test_node(i, i == 0, adj)
            })
            .collect()
    }

    #[test]
    fn test_chain_forest_reaches_every_node() {
        let mut nodes = chain_arena();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        build_drainage_forest(&mut nodes, &[0], &mut rng).unwrap();

        assert_forest_invariant(&nodes);
        // On a chain the only possible forest is the chain itself.
        for i in 1..5 {
            assert_eq!(nodes[i].parent, i - 1);
            assert_eq!(nodes[i].distance_to_parent, 1.0);
        }
    }

    #[test]
    fn test_forest_is_deterministic_per_seed() {
        // A 3x3 blob with several valid spanning forests.
        let edges: Vec<(usize, usize)> = vec![
            (0, 1),
            (1, 2),
            (0, 3),
            (1, 4),
            (2, 5),
            (3, 4),
            (4, 5),
            (3, 6),
            (4, 7),
            (5, 8),
            (6, 7),
            (7, 8),
        ];
        let build = |seed: u64| {
            let mut nodes: Vec<WaterNode> = (0..9)
                .map(|i| test_node(i, i == 0 || i == 2, Vec::new()))
                .collect();
            for &(a, b) in &edges {
                nodes[a].adjacents.push((b, 1.0));
                nodes[b].adjacents.push((a, 1.0));
            }
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            build_drainage_forest(&mut nodes, &[0, 2], &mut rng).unwrap();
            nodes.iter().map(|n| n.parent).collect::<Vec<_>>()
        };

        assert_eq!(build(7), build(7));
        assert_forest_invariant(&{
            let mut nodes: Vec<WaterNode> = (0..9)
                .map(|i| test_node(i, i == 0 || i == 2, Vec::new()))
                .collect();
            for &(a, b) in &edges {
                nodes[a].adjacents.push((b, 1.0));
                nodes[b].adjacents.push((a, 1.0));
            }
            let mut rng = ChaCha8Rng::seed_from_u64(7);
            build_drainage_forest(&mut nodes, &[0, 2], &mut rng).unwrap();
            nodes
        });
    }

    #[test]
    fn test_disconnected_component_is_fatal() {
        // Two islands; only the first has an outlet.
        let mut nodes = vec![
            test_node(0, true, vec![(1, 1.0)]),
            test_node(1, false, vec![(0, 1.0)]),
            test_node(2, false, vec![(3, 1.0)]),
            test_node(3, false, vec![(2, 1.0)]),
        ];
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        match build_drainage_forest(&mut nodes, &[0], &mut rng) {
            Err(EngineError::DisconnectedLand { count }) => assert_eq!(count, 2),
            other => panic!("expected DisconnectedLand, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_no_outlets_is_fatal() {
        let mut nodes = vec![test_node(0, false, Vec::new())];
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert!(matches!(
            build_drainage_forest(&mut nodes, &[], &mut rng),
            Err(EngineError::NoOutlets)
        ));
    }
}
