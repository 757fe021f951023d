//! Irregular planar mesh consumed by the drainage engine.
//!
//! The engine never builds meshes itself; it consumes a [`FlowGraph`] as
//! plain data: vertex positions in normalized `[0,1]²`, per-vertex adjacency,
//! per-vertex cell area, and a triangle list for rasterization. The
//! [`FlowGraph::jittered_grid`] builder stands in for the external mesh
//! generator so the demo binary and the tests have something to feed in.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// An immutable triangulated mesh over the unit square.
pub struct FlowGraph {
    points: Vec<[f32; 2]>,
    adjacency: Vec<Vec<u32>>,
    areas: Vec<f32>,
    triangles: Vec<[u32; 3]>,
}

impl FlowGraph {
    /// Assemble a graph from externally generated mesh data.
    ///
    /// `adjacency` and `areas` must be parallel to `points`; triangle
    /// indices must be in range. Violations panic in debug builds.
    pub fn new(
        points: Vec<[f32; 2]>,
        adjacency: Vec<Vec<u32>>,
        areas: Vec<f32>,
        triangles: Vec<[u32; 3]>,
    ) -> Self {
        debug_assert_eq!(points.len(), adjacency.len());
        debug_assert_eq!(points.len(), areas.len());
        debug_assert!(triangles
            .iter()
            .all(|t| t.iter().all(|&v| (v as usize) < points.len())));
        Self {
            points,
            adjacency,
            areas,
            triangles,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.points.len()
    }

    pub fn point(&self, id: usize) -> [f32; 2] {
        self.points[id]
    }

    pub fn adjacent(&self, id: usize) -> &[u32] {
        &self.adjacency[id]
    }

    /// Voronoi-cell area of a vertex, in normalized units.
    pub fn area(&self, id: usize) -> f32 {
        self.areas[id]
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    /// Euclidean distance between two vertices, in normalized units.
    pub fn distance(&self, a: usize, b: usize) -> f32 {
        let pa = self.points[a];
        let pb = self.points[b];
        let dx = pa[0] - pb[0];
        let dy = pa[1] - pb[1];
        (dx * dx + dy * dy).sqrt()
    }

    /// Build a jittered grid triangulation of the unit square.
    ///
    /// One vertex per grid cell, displaced by up to 35% of the cell size;
    /// quads are split along alternating diagonals and adjacency is derived
    /// from the triangle edges. Cell areas are uniform. Deterministic for a
    /// given seed.
    pub fn jittered_grid(resolution: usize, seed: u64) -> Self {
        assert!(resolution >= 2, "grid needs at least 2x2 vertices");
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let step = 1.0 / resolution as f32;

        let mut points = Vec::with_capacity(resolution * resolution);
        for y in 0..resolution {
            for x in 0..resolution {
                let jx = rng.gen_range(-0.35..0.35) * step;
                let jy = rng.gen_range(-0.35..0.35) * step;
                points.push([
                    (x as f32 + 0.5) * step + jx,
                    (y as f32 + 0.5) * step + jy,
                ]);
            }
        }

        let vertex = |x: usize, y: usize| (y * resolution + x) as u32;
        let mut triangles = Vec::with_capacity((resolution - 1) * (resolution - 1) * 2);
        for y in 0..resolution - 1 {
            for x in 0..resolution - 1 {
                let v00 = vertex(x, y);
                let v10 = vertex(x + 1, y);
                let v01 = vertex(x, y + 1);
                let v11 = vertex(x + 1, y + 1);
                // Alternate the split diagonal so the mesh has no grain.
                if (x + y) % 2 == 0 {
                    triangles.push([v00, v10, v11]);
                    triangles.push([v00, v11, v01]);
                } else {
                    triangles.push([v00, v10, v01]);
                    triangles.push([v10, v11, v01]);
                }
            }
        }

        let mut adjacency: Vec<Vec<u32>> = vec![Vec::new(); points.len()];
        for tri in &triangles {
            for i in 0..3 {
                let a = tri[i] as usize;
                let b = tri[(i + 1) % 3];
                if !adjacency[a].contains(&b) {
                    adjacency[a].push(b);
                }
                let b = b as usize;
                if !adjacency[b].contains(&tri[i]) {
                    adjacency[b].push(tri[i]);
                }
            }
        }
        for list in &mut adjacency {
            list.sort_unstable();
        }

        let areas = vec![step * step; points.len()];
        Self::new(points, adjacency, areas, triangles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jittered_grid_shape() {
        let graph = FlowGraph::jittered_grid(8, 42);
        assert_eq!(graph.vertex_count(), 64);
        assert_eq!(graph.triangles().len(), 7 * 7 * 2);

        // All points stay inside the unit square.
        for id in 0..graph.vertex_count() {
            let [x, y] = graph.point(id);
            assert!((0.0..=1.0).contains(&x), "x out of range: {}", x);
            assert!((0.0..=1.0).contains(&y), "y out of range: {}", y);
        }
    }

    #[test]
    fn test_jittered_grid_adjacency_symmetric() {
        let graph = FlowGraph::jittered_grid(6, 7);
        for a in 0..graph.vertex_count() {
            for &b in graph.adjacent(a) {
                assert!(
                    graph.adjacent(b as usize).contains(&(a as u32)),
                    "adjacency not symmetric between {} and {}",
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn test_jittered_grid_areas_cover_unit_square() {
        let graph = FlowGraph::jittered_grid(10, 1);
        let total: f32 = (0..graph.vertex_count()).map(|i| graph.area(i)).sum();
        assert!((total - 1.0).abs() < 1e-4, "total cell area {}", total);
    }

    #[test]
    fn test_jittered_grid_deterministic() {
        let a = FlowGraph::jittered_grid(8, 99);
        let b = FlowGraph::jittered_grid(8, 99);
        for id in 0..a.vertex_count() {
            assert_eq!(a.point(id), b.point(id));
        }
    }
}
