//! Unstructured polygonal mesh: connectivity, chunking and point positions.

use std::ops::Range;

use rayon::prelude::*;

use super::{Chunk, Geometry, PointId, SideId, Vec2, ZoneId};
use crate::schema::MeshConfig;

/// Tolerance used to match points against boundary planes.
const PLANE_EPS: f64 = 1e-12;

/// Side/zone/point incidence of a polygonal mesh.
///
/// Every zone with `n` points owns `n` consecutive sides. Side `s` runs from
/// point `p1(s)` to `p2(s)` counter-clockwise around its zone; the corner of
/// side `s` sits at `p1(s)`, between `s` and its predecessor in the zone.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    zone_first_side: Vec<usize>,
    side_zone: Vec<ZoneId>,
    side_p1: Vec<PointId>,
    side_p2: Vec<PointId>,
    side_prev: Vec<SideId>,
    /// CSR offsets into `point_corners`, one entry per point plus one.
    point_corner_first: Vec<usize>,
    point_corners: Vec<SideId>,
}

impl Topology {
    fn build(num_points: usize, zones: &[Vec<usize>]) -> Result<Self, MeshError> {
        let num_sides: usize = zones.iter().map(Vec::len).sum();
        let largest = num_sides.max(num_points).max(zones.len());
        if u32::try_from(largest).is_err() {
            return Err(MeshError::TooLarge { entities: largest });
        }
        let mut topo = Topology {
            zone_first_side: Vec::with_capacity(zones.len() + 1),
            side_zone: Vec::with_capacity(num_sides),
            side_p1: Vec::with_capacity(num_sides),
            side_p2: Vec::with_capacity(num_sides),
            side_prev: Vec::with_capacity(num_sides),
            point_corner_first: Vec::new(),
            point_corners: Vec::new(),
        };

        for (z, polygon) in zones.iter().enumerate() {
            let n = polygon.len();
            if n < 3 {
                return Err(MeshError::DegeneratePolygon { zone: z, points: n });
            }
            let first = topo.side_zone.len();
            topo.zone_first_side.push(first);
            for (k, &p) in polygon.iter().enumerate() {
                if p >= num_points {
                    return Err(MeshError::PointOutOfRange { zone: z, point: p });
                }
                topo.side_zone.push(ZoneId::new(z));
                topo.side_p1.push(PointId::new(p));
                topo.side_p2.push(PointId::new(polygon[(k + 1) % n]));
                topo.side_prev.push(SideId::new(first + (k + n - 1) % n));
            }
        }
        topo.zone_first_side.push(num_sides);

        // Corner lists per point (counting sort on p1).
        let mut counts = vec![0usize; num_points + 1];
        for p in &topo.side_p1 {
            counts[p.index() + 1] += 1;
        }
        for i in 0..num_points {
            counts[i + 1] += counts[i];
        }
        let mut fill = counts.clone();
        let mut corners = vec![SideId::new(0); num_sides];
        for (s, p) in topo.side_p1.iter().enumerate() {
            corners[fill[p.index()]] = SideId::new(s);
            fill[p.index()] += 1;
        }
        topo.point_corner_first = counts;
        topo.point_corners = corners;

        Ok(topo)
    }

    #[inline]
    pub fn num_zones(&self) -> usize {
        self.zone_first_side.len().saturating_sub(1)
    }

    #[inline]
    pub fn num_sides(&self) -> usize {
        self.side_zone.len()
    }

    #[inline]
    pub fn num_points(&self) -> usize {
        self.point_corner_first.len().saturating_sub(1)
    }

    /// Zone owning side `s`.
    #[inline]
    pub fn side_zone(&self, s: SideId) -> ZoneId {
        self.side_zone[s.index()]
    }

    /// End points `(p1, p2)` of side `s`.
    #[inline]
    pub fn side_points(&self, s: SideId) -> (PointId, PointId) {
        (self.side_p1[s.index()], self.side_p2[s.index()])
    }

    /// Previous side around the same zone; shares `p1(s)` as its `p2`.
    #[inline]
    pub fn side_predecessor(&self, s: SideId) -> SideId {
        self.side_prev[s.index()]
    }

    /// Sides owned by zone `z`.
    #[inline]
    pub fn zone_sides(&self, z: ZoneId) -> Range<usize> {
        self.zone_first_side[z.index()]..self.zone_first_side[z.index() + 1]
    }

    /// Number of points (equivalently sides) of zone `z`.
    #[inline]
    pub fn zone_num_points(&self, z: ZoneId) -> usize {
        self.zone_sides(z).len()
    }

    /// Corners (named by their sides) located at point `p`.
    #[inline]
    pub fn point_corners(&self, p: PointId) -> &[SideId] {
        &self.point_corners[self.point_corner_first[p.index()]..self.point_corner_first[p.index() + 1]]
    }
}

/// Polygonal mesh of one subdomain.
#[derive(Debug, Clone, Default)]
pub struct PolyMesh {
    pub topology: Topology,
    /// Zone/side chunks processed as parallel units.
    pub chunks: Vec<Chunk>,
    /// Point chunks processed as parallel units.
    pub point_chunks: Vec<Range<usize>>,
    /// Current point positions.
    pub point_x: Vec<Vec2>,
    /// Positions at the start of the cycle.
    pub point_x0: Vec<Vec2>,
    /// Positions at the middle of the cycle.
    pub point_x_pred: Vec<Vec2>,
    /// Geometry of the current positions.
    pub current: Geometry,
    /// Geometry of the predicted positions.
    pub predicted: Geometry,
    /// Zone volumes at the start of the cycle.
    pub zone_vol0: Vec<f64>,
    /// Fraction of its zone's area owned by each side, fixed at construction.
    pub side_mass_frac: Vec<f64>,
}

impl PolyMesh {
    /// Build a mesh from point coordinates and counter-clockwise zone polygons.
    pub fn from_polygons(
        points: Vec<Vec2>,
        zones: &[Vec<usize>],
        chunk_size: usize,
    ) -> Result<Self, MeshError> {
        if chunk_size == 0 {
            return Err(MeshError::ZeroChunkSize);
        }
        if zones.is_empty() || points.is_empty() {
            return Err(MeshError::Empty);
        }

        let topology = Topology::build(points.len(), zones)?;
        let num_zones = topology.num_zones();
        let num_sides = topology.num_sides();
        let num_points = points.len();

        let chunks = (0..num_zones)
            .step_by(chunk_size)
            .map(|first| {
                let last = (first + chunk_size).min(num_zones);
                Chunk {
                    zones: first..last,
                    sides: topology.zone_first_side[first]..topology.zone_first_side[last],
                }
            })
            .collect();
        let point_chunks = (0..num_points)
            .step_by(chunk_size)
            .map(|first| first..(first + chunk_size).min(num_points))
            .collect();

        let mut mesh = Self {
            topology,
            chunks,
            point_chunks,
            point_x0: points.clone(),
            point_x_pred: points.clone(),
            point_x: points,
            current: Geometry::new(num_zones, num_sides),
            predicted: Geometry::new(num_zones, num_sides),
            zone_vol0: vec![0.0; num_zones],
            side_mass_frac: vec![0.0; num_sides],
        };

        mesh.update_current_geometry();
        mesh.zone_vol0.copy_from_slice(&mesh.current.zone_vol);
        for s in 0..num_sides {
            let z = mesh.topology.side_zone(SideId::new(s)).index();
            mesh.side_mass_frac[s] = mesh.current.side_area[s] / mesh.current.zone_area[z];
        }
        mesh.predicted = mesh.current.clone();

        Ok(mesh)
    }

    /// Regular `nx` by `ny` quadrilateral mesh over `[0, len_x] x [0, len_y]`.
    pub fn rectangular(
        nx: usize,
        ny: usize,
        len_x: f64,
        len_y: f64,
        chunk_size: usize,
    ) -> Result<Self, MeshError> {
        if nx == 0 || ny == 0 {
            return Err(MeshError::Empty);
        }
        let mut points = Vec::with_capacity((nx + 1) * (ny + 1));
        for j in 0..=ny {
            for i in 0..=nx {
                points.push(Vec2::new(
                    len_x * i as f64 / nx as f64,
                    len_y * j as f64 / ny as f64,
                ));
            }
        }
        let row = nx + 1;
        let zones: Vec<Vec<usize>> = (0..ny)
            .flat_map(|j| {
                (0..nx).map(move |i| {
                    let p = j * row + i;
                    vec![p, p + 1, p + 1 + row, p + row]
                })
            })
            .collect();
        Self::from_polygons(points, &zones, chunk_size)
    }

    /// Rectangular mesh described by a [`MeshConfig`].
    pub fn from_config(config: &MeshConfig) -> Result<Self, MeshError> {
        Self::rectangular(
            config.nzones_x,
            config.nzones_y,
            config.len_x,
            config.len_y,
            config.chunk_size,
        )
    }

    #[inline]
    pub fn num_zones(&self) -> usize {
        self.topology.num_zones()
    }

    #[inline]
    pub fn num_sides(&self) -> usize {
        self.topology.num_sides()
    }

    #[inline]
    pub fn num_points(&self) -> usize {
        self.point_x.len()
    }

    #[inline]
    pub fn side_predecessor(&self, s: SideId) -> SideId {
        self.topology.side_predecessor(s)
    }

    /// Recompute current-position geometry over all chunks.
    pub fn update_current_geometry(&mut self) {
        let topology = &self.topology;
        let px = &self.point_x;

        self.current
            .chunks_mut(&self.chunks)
            .into_par_iter()
            .for_each(|mut geo| geo.recompute(topology, px));
    }

    /// Accumulate corner mass and force onto points.
    ///
    /// Each point gathers over its own corners, so the result does not depend
    /// on chunk order.
    pub fn scatter_to_points(
        &self,
        corner_mass: &[f64],
        corner_force: &[Vec2],
        point_mass: &mut [f64],
        point_force: &mut [Vec2],
    ) {
        let topology = &self.topology;
        let gather = |p: usize, mass: &mut f64, force: &mut Vec2| {
            let mut m = 0.0;
            let mut f = Vec2::zeros();
            for c in topology.point_corners(PointId::new(p)) {
                m += corner_mass[c.index()];
                f += corner_force[c.index()];
            }
            *mass = m;
            *force = f;
        };

        point_mass
            .par_iter_mut()
            .zip(point_force.par_iter_mut())
            .enumerate()
            .for_each(|(p, (mass, force))| gather(p, mass, force));
    }

    /// Points lying on the plane `x = coord` (axis 0) or `y = coord` (axis 1).
    pub fn points_on_plane(&self, axis: usize, coord: f64) -> Vec<PointId> {
        self.point_x
            .iter()
            .enumerate()
            .filter(|(_, x)| (x[axis] - coord).abs() < PLANE_EPS)
            .map(|(p, _)| PointId::new(p))
            .collect()
    }

    /// Number of sides whose current volume is not positive.
    pub fn inverted_sides(&self) -> usize {
        self.current.side_vol.iter().filter(|&&v| !(v > 0.0)).count()
    }

    /// Sum of current zone volumes.
    pub fn total_volume(&self) -> f64 {
        self.current.zone_vol.iter().sum()
    }
}

/// Errors raised while building a mesh.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("Mesh has no zones or no points")]
    Empty,
    #[error("Chunk size must be non-zero")]
    ZeroChunkSize,
    #[error("Zone {zone} has {points} points; polygons need at least 3")]
    DegeneratePolygon { zone: usize, points: usize },
    #[error("Zone {zone} references missing point {point}")]
    PointOutOfRange { zone: usize, point: usize },
    #[error("Mesh has {entities} entities of one kind; at most u32::MAX are addressable")]
    TooLarge { entities: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> PolyMesh {
        let points = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ];
        PolyMesh::from_polygons(points, &[vec![0, 1, 2, 3]], 8).unwrap()
    }

    #[test]
    fn test_side_connectivity() {
        let mesh = unit_square();
        let topo = &mesh.topology;
        assert_eq!(topo.num_sides(), 4);
        for s in 0..4 {
            let side = SideId::new(s);
            let prev = topo.side_predecessor(side);
            // predecessor ends where this side starts
            assert_eq!(topo.side_points(prev).1, topo.side_points(side).0);
            assert_eq!(topo.side_zone(prev), topo.side_zone(side));
        }
        assert_eq!(topo.side_predecessor(SideId::new(0)), SideId::new(3));
    }

    #[test]
    fn test_rectangular_counts_and_chunks() {
        let mesh = PolyMesh::rectangular(4, 3, 2.0, 1.5, 5).unwrap();
        assert_eq!(mesh.num_zones(), 12);
        assert_eq!(mesh.num_sides(), 48);
        assert_eq!(mesh.num_points(), 20);
        assert_eq!(mesh.chunks.len(), 3);
        assert_eq!(mesh.chunks[2].zones, 10..12);
        assert_eq!(mesh.chunks[2].sides, 40..48);
        assert_eq!(mesh.point_chunks.len(), 4);
        assert_eq!(mesh.point_chunks[3], 15..20);
    }

    #[test]
    fn test_side_mass_fractions_sum_to_one() {
        let mesh = PolyMesh::rectangular(3, 2, 1.0, 1.0, 2).unwrap();
        for z in 0..mesh.num_zones() {
            let sum: f64 = mesh
                .topology
                .zone_sides(ZoneId::new(z))
                .map(|s| mesh.side_mass_frac[s])
                .sum();
            assert!((sum - 1.0).abs() < 1e-14, "zone {z} fractions sum to {sum}");
        }
    }

    #[test]
    fn test_point_corners_cover_every_side_once() {
        let mesh = PolyMesh::rectangular(3, 3, 1.0, 1.0, 4).unwrap();
        let mut seen = vec![0usize; mesh.num_sides()];
        for p in 0..mesh.num_points() {
            for c in mesh.topology.point_corners(PointId::new(p)) {
                assert_eq!(mesh.topology.side_points(*c).0, PointId::new(p));
                seen[c.index()] += 1;
            }
        }
        assert!(seen.iter().all(|&n| n == 1));
        // interior points touch four zones
        assert_eq!(mesh.topology.point_corners(PointId::new(5)).len(), 4);
    }

    #[test]
    fn test_scatter_to_points_sums_corners() {
        let mesh = PolyMesh::rectangular(2, 1, 2.0, 1.0, 1).unwrap();
        let corner_mass = vec![1.0; mesh.num_sides()];
        let corner_force: Vec<Vec2> = (0..mesh.num_sides()).map(|s| Vec2::new(s as f64, 1.0)).collect();
        let mut point_mass = vec![0.0; mesh.num_points()];
        let mut point_force = vec![Vec2::zeros(); mesh.num_points()];
        mesh.scatter_to_points(&corner_mass, &corner_force, &mut point_mass, &mut point_force);

        // bottom-middle point (index 1) is shared by both zones
        assert_eq!(point_mass[1], 2.0);
        assert_eq!(point_mass[0], 1.0);
        let total: f64 = point_mass.iter().sum();
        assert_eq!(total, mesh.num_sides() as f64);
        let fy: f64 = point_force.iter().map(|f| f.y).sum();
        assert_eq!(fy, mesh.num_sides() as f64);
    }

    #[test]
    fn test_points_on_plane() {
        let mesh = PolyMesh::rectangular(4, 2, 1.0, 1.0, 8).unwrap();
        assert_eq!(mesh.points_on_plane(0, 0.0).len(), 3);
        assert_eq!(mesh.points_on_plane(0, 1.0).len(), 3);
        assert_eq!(mesh.points_on_plane(1, 1.0).len(), 5);
        assert!(mesh.points_on_plane(0, 0.3).is_empty());
    }

    #[test]
    fn test_rejects_bad_polygons() {
        let points = vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)];
        assert!(matches!(
            PolyMesh::from_polygons(points.clone(), &[vec![0, 1]], 4),
            Err(MeshError::DegeneratePolygon { zone: 0, points: 2 })
        ));
        assert!(matches!(
            PolyMesh::from_polygons(points.clone(), &[vec![0, 1, 7]], 4),
            Err(MeshError::PointOutOfRange { zone: 0, point: 7 })
        ));
        assert!(matches!(
            PolyMesh::from_polygons(points, &[vec![0, 1, 2]], 0),
            Err(MeshError::ZeroChunkSize)
        ));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_rejects_unaddressable_point_count() {
        assert!(matches!(
            Topology::build(usize::MAX, &[vec![0, 1, 2]]),
            Err(MeshError::TooLarge { entities: usize::MAX })
        ));
    }
}
