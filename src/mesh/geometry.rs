//! Geometric quantities derived from point positions.
//!
//! Coordinates are `(r, z)` in a cylindrical frame: `x` is the radius.
//! Areas are planar polygon areas; volumes are per radian of revolution.

use std::ops::Range;

use super::{Chunk, PointId, SideId, Topology, Vec2, ZoneId, cross, rotate_ccw, take_front};

/// Per-zone and per-side geometry for one set of point positions.
#[derive(Debug, Clone, Default)]
pub struct Geometry {
    /// Zone centers (average of the zone's points).
    pub zone_x: Vec<Vec2>,
    pub zone_area: Vec<f64>,
    pub zone_vol: Vec<f64>,
    /// Characteristic length of each zone.
    pub zone_dl: Vec<f64>,
    /// Area of the triangle (p1, p2, zone center).
    pub side_area: Vec<f64>,
    pub side_vol: Vec<f64>,
    /// Median-mesh surface vector from the zone center to the edge midpoint.
    pub side_surf: Vec<Vec2>,
    /// Length of the zone edge under each side.
    pub side_len: Vec<f64>,
}

impl Geometry {
    pub fn new(num_zones: usize, num_sides: usize) -> Self {
        Self {
            zone_x: vec![Vec2::zeros(); num_zones],
            zone_area: vec![0.0; num_zones],
            zone_vol: vec![0.0; num_zones],
            zone_dl: vec![0.0; num_zones],
            side_area: vec![0.0; num_sides],
            side_vol: vec![0.0; num_sides],
            side_surf: vec![Vec2::zeros(); num_sides],
            side_len: vec![0.0; num_sides],
        }
    }

    /// Split into one disjoint mutable view per chunk.
    pub fn chunks_mut<'a>(&'a mut self, chunks: &[Chunk]) -> Vec<GeometryChunk<'a>> {
        let mut zone_x = &mut self.zone_x[..];
        let mut zone_area = &mut self.zone_area[..];
        let mut zone_vol = &mut self.zone_vol[..];
        let mut zone_dl = &mut self.zone_dl[..];
        let mut side_area = &mut self.side_area[..];
        let mut side_vol = &mut self.side_vol[..];
        let mut side_surf = &mut self.side_surf[..];
        let mut side_len = &mut self.side_len[..];

        chunks
            .iter()
            .map(|chunk| {
                let nz = chunk.zones.len();
                let ns = chunk.sides.len();
                GeometryChunk {
                    zones: chunk.zones.clone(),
                    sides: chunk.sides.clone(),
                    zone_x: take_front(&mut zone_x, nz),
                    zone_area: take_front(&mut zone_area, nz),
                    zone_vol: take_front(&mut zone_vol, nz),
                    zone_dl: take_front(&mut zone_dl, nz),
                    side_area: take_front(&mut side_area, ns),
                    side_vol: take_front(&mut side_vol, ns),
                    side_surf: take_front(&mut side_surf, ns),
                    side_len: take_front(&mut side_len, ns),
                }
            })
            .collect()
    }
}

/// Mutable geometry of one chunk; slices are indexed relative to the chunk start.
pub struct GeometryChunk<'a> {
    pub zones: Range<usize>,
    pub sides: Range<usize>,
    pub zone_x: &'a mut [Vec2],
    pub zone_area: &'a mut [f64],
    pub zone_vol: &'a mut [f64],
    pub zone_dl: &'a mut [f64],
    pub side_area: &'a mut [f64],
    pub side_vol: &'a mut [f64],
    pub side_surf: &'a mut [Vec2],
    pub side_len: &'a mut [f64],
}

impl GeometryChunk<'_> {
    /// Recompute every quantity of the chunk from point positions `px`.
    pub fn recompute(&mut self, topology: &Topology, px: &[Vec2]) {
        self.calc_centers(topology, px);
        self.calc_volumes(topology, px);
        self.calc_surface_vectors(topology, px);
        self.calc_lengths(topology, px);
    }

    fn calc_centers(&mut self, topology: &Topology, px: &[Vec2]) {
        for z in self.zones.clone() {
            let sides = topology.zone_sides(ZoneId::new(z));
            let n = sides.len() as f64;
            let sum = sides
                .map(|s| px[topology.side_points(SideId::new(s)).0.index()])
                .fold(Vec2::zeros(), |acc, x| acc + x);
            self.zone_x[z - self.zones.start] = sum / n;
        }
    }

    fn calc_volumes(&mut self, topology: &Topology, px: &[Vec2]) {
        const THIRD: f64 = 1.0 / 3.0;
        for z in self.zones.clone() {
            let zl = z - self.zones.start;
            let zx = self.zone_x[zl];
            let mut area = 0.0;
            let mut vol = 0.0;
            for s in topology.zone_sides(ZoneId::new(z)) {
                let (p1, p2) = side_coords(topology, px, s);
                let sa = 0.5 * cross(p2 - p1, zx - p1);
                let sv = THIRD * sa * (p1.x + p2.x + zx.x);
                self.side_area[s - self.sides.start] = sa;
                self.side_vol[s - self.sides.start] = sv;
                area += sa;
                vol += sv;
            }
            self.zone_area[zl] = area;
            self.zone_vol[zl] = vol;
        }
    }

    fn calc_surface_vectors(&mut self, topology: &Topology, px: &[Vec2]) {
        for s in self.sides.clone() {
            let z = topology.side_zone(SideId::new(s)).index();
            let (p1, p2) = side_coords(topology, px, s);
            let edge_mid = 0.5 * (p1 + p2);
            self.side_surf[s - self.sides.start] = rotate_ccw(edge_mid - self.zone_x[z - self.zones.start]);
        }
    }

    fn calc_lengths(&mut self, topology: &Topology, px: &[Vec2]) {
        for z in self.zones.clone() {
            let zone = ZoneId::new(z);
            let fac = if topology.zone_num_points(zone) == 3 { 3.0 } else { 4.0 };
            let mut dl = 1e99f64;
            for s in topology.zone_sides(zone) {
                let sl = s - self.sides.start;
                let (p1, p2) = side_coords(topology, px, s);
                let len = (p2 - p1).norm();
                self.side_len[sl] = len;
                dl = dl.min(fac * self.side_area[sl] / len);
            }
            self.zone_dl[z - self.zones.start] = dl;
        }
    }
}

#[inline]
fn side_coords(topology: &Topology, px: &[Vec2], s: usize) -> (Vec2, Vec2) {
    let (p1, p2): (PointId, PointId) = topology.side_points(SideId::new(s));
    (px[p1.index()], px[p2.index()])
}
