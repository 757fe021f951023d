//! Height-field rasterization.
//!
//! The final forest's per-node heights are scan-converted triangle by
//! triangle into a dense float raster using barycentric interpolation.
//! Workers own disjoint horizontal bands of the target and each scans the
//! full triangle list clipped to its band, so no two workers ever write the
//! same pixel and the output is identical for any thread count.
//!
//! Water pixels keep the `-1.0` fill value; the 16-bit encoding maps them
//! to zero and compresses land into the range above the water line.

use rayon::prelude::*;

use crate::graph::FlowGraph;
use crate::hydro::node::WaterNode;
use crate::raster::Raster;

/// Fraction of the 16-bit range reserved for water when encoding.
pub const WATER_LINE: f32 = 0.3;

/// Rasterize node heights into a `width` x `width` float matrix.
/// Triangles touching any water vertex are skipped; uncovered pixels stay
/// at `-1.0`.
pub fn rasterize_heights(
    graph: &FlowGraph,
    node_index: &[Option<usize>],
    nodes: &[WaterNode],
    width: usize,
) -> Raster<f32> {
    let mut raster = Raster::square_with(width, -1.0f32);
    let band_rows = (width + rayon::current_num_threads() - 1) / rayon::current_num_threads();
    let band_rows = band_rows.max(1);

    raster
        .as_mut_slice()
        .par_chunks_mut(band_rows * width)
        .enumerate()
        .for_each(|(band_idx, band)| {
            let y_start = band_idx * band_rows;
            let rows = band.len() / width;
            for triangle in graph.triangles() {
                let (Some(na), Some(nb), Some(nc)) = (
                    node_index[triangle[0] as usize],
                    node_index[triangle[1] as usize],
                    node_index[triangle[2] as usize],
                ) else {
                    continue;
                };
                let scale = (width - 1) as f32;
                let to_pixel = |vertex: u32, node: usize| {
                    let p = graph.point(vertex as usize);
                    [p[0] * scale, p[1] * scale, nodes[node].height]
                };
                let a = to_pixel(triangle[0], na);
                let b = to_pixel(triangle[1], nb);
                let c = to_pixel(triangle[2], nc);

                // Consistent winding: the height-axis cross component
                // decides whether b and c swap.
                let cross_z = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
                let (b, c) = if cross_z < 0.0 { (b, c) } else { (c, b) };

                fill_triangle(band, y_start, rows, width, a, b, c);
            }
        });

    raster
}

fn edge(a: [f32; 3], b: [f32; 3], px: f32, py: f32) -> f32 {
    (b[0] - a[0]) * (py - a[1]) - (b[1] - a[1]) * (px - a[0])
}

/// Scan-convert one triangle into a horizontal band `[y_start, y_start+rows)`
/// of the target raster, interpolating the vertices' heights.
fn fill_triangle(
    band: &mut [f32],
    y_start: usize,
    rows: usize,
    width: usize,
    a: [f32; 3],
    b: [f32; 3],
    c: [f32; 3],
) {
    let area = edge(a, b, c[0], c[1]);
    if area.abs() < 1e-12 {
        return;
    }

    let min_x = a[0].min(b[0]).min(c[0]).ceil().max(0.0) as usize;
    let max_x = (a[0].max(b[0]).max(c[0]).floor() as usize).min(width - 1);
    let min_y = a[1].min(b[1]).min(c[1]).ceil().max(0.0) as usize;
    let max_y = a[1].max(b[1]).max(c[1]).floor() as usize;

    let row_lo = min_y.max(y_start);
    let row_hi = max_y.min(y_start + rows - 1);
    if row_hi < row_lo {
        return;
    }
    const EPS: f32 = 1e-5;

    for y in row_lo..=row_hi {
        let py = y as f32;
        for x in min_x..=max_x {
            let px = x as f32;
            let w0 = edge(b, c, px, py) / area;
            let w1 = edge(c, a, px, py) / area;
            let w2 = edge(a, b, px, py) / area;
            if w0 >= -EPS && w1 >= -EPS && w2 >= -EPS {
                band[(y - y_start) * width + x] = w0 * a[2] + w1 * b[2] + w2 * c[2];
            }
        }
    }
}

/// Encode a height raster into a normalized 16-bit buffer. Land compresses
/// into `[water_line, 1.0]` of the range scaled by the maximum land height;
/// negative (water) cells map to zero.
pub fn encode_height_map(heights: &Raster<f32>, water_line: f32) -> Vec<u16> {
    let max_land = heights.max_value();
    if max_land <= 0.0 {
        return vec![0; heights.width * heights.height];
    }
    let land_factor = (1.0 / max_land) * (1.0 - water_line);
    heights
        .as_slice()
        .iter()
        .map(|&h| {
            if h < 0.0 {
                0
            } else {
                (((h * land_factor) + water_line) * 65535.0) as u16
            }
        })
        .collect()
}
