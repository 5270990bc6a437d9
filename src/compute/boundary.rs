//! Fixed (reflecting) boundary planes.

use crate::mesh::{PointId, PolyMesh, Vec2};

/// Points on one boundary plane, with the plane's unit normal.
#[derive(Debug, Clone)]
pub struct FixedBoundary {
    normal: Vec2,
    points: Vec<PointId>,
}

impl FixedBoundary {
    pub fn new(normal: Vec2, points: Vec<PointId>) -> Self {
        Self { normal, points }
    }

    /// Every plane `x = bcx[i]` and `y = bcy[j]` of the mesh.
    pub fn from_planes(mesh: &PolyMesh, bcx: &[f64], bcy: &[f64]) -> Vec<Self> {
        let x_planes = bcx
            .iter()
            .map(|&x| Self::new(Vec2::new(1.0, 0.0), mesh.points_on_plane(0, x)));
        let y_planes = bcy
            .iter()
            .map(|&y| Self::new(Vec2::new(0.0, 1.0), mesh.points_on_plane(1, y)));
        x_planes.chain(y_planes).collect()
    }

    pub fn points(&self) -> &[PointId] {
        &self.points
    }

    /// Remove the normal component of `vel0` and `force` at the plane's points.
    pub fn apply(&self, vel0: &mut [Vec2], force: &mut [Vec2]) {
        for p in &self.points {
            let p = p.index();
            vel0[p] = project(vel0[p], self.normal);
            force[p] = project(force[p], self.normal);
        }
    }
}

/// Component of `v` orthogonal to the unit vector `n`.
#[inline]
fn project(v: Vec2, n: Vec2) -> Vec2 {
    v - n * v.dot(&n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planes_found_on_rectangle() {
        let mesh = PolyMesh::rectangular(3, 2, 1.5, 1.0, 4).unwrap();
        let planes = FixedBoundary::from_planes(&mesh, &[0.0, 1.5], &[0.0, 1.0]);
        assert_eq!(planes.len(), 4);
        assert_eq!(planes[0].points().len(), 3);
        assert_eq!(planes[2].points().len(), 4);
    }

    #[test]
    fn test_apply_removes_normal_component() {
        let mesh = PolyMesh::rectangular(1, 1, 1.0, 1.0, 4).unwrap();
        let planes = FixedBoundary::from_planes(&mesh, &[0.0], &[]);
        let mut vel0 = vec![Vec2::new(2.0, 3.0); 4];
        let mut force = vec![Vec2::new(-1.0, 5.0); 4];
        planes[0].apply(&mut vel0, &mut force);

        // points 0 and 2 lie on x = 0
        assert_eq!(vel0[0], Vec2::new(0.0, 3.0));
        assert_eq!(force[2], Vec2::new(0.0, 5.0));
        assert_eq!(vel0[1], Vec2::new(2.0, 3.0), "off-plane points are untouched");
    }
}
