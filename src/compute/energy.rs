//! Energy diagnostic - Internal and kinetic energy of a subdomain.

use std::f64::consts::TAU;
use std::fmt;

use rayon::prelude::*;

use super::{PointFields, ZoneFields};
use crate::mesh::{Chunk, PolyMesh, SideId};

/// Internal and kinetic energy, per radian summed then scaled by `2 pi`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnergyCheck {
    pub internal: f64,
    pub kinetic: f64,
}

impl EnergyCheck {
    pub fn total(&self) -> f64 {
        self.internal + self.kinetic
    }

    /// Relative change of the total against `reference`.
    pub fn relative_drift(&self, reference: &EnergyCheck) -> f64 {
        let base = reference.total().abs().max(f64::MIN_POSITIVE);
        (self.total() - reference.total()).abs() / base
    }
}

impl std::ops::Add for EnergyCheck {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            internal: self.internal + rhs.internal,
            kinetic: self.kinetic + rhs.kinetic,
        }
    }
}

impl fmt::Display for EnergyCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total energy = {:14.6e} (internal = {:14.6e}, kinetic = {:14.6e})",
            self.total(),
            self.internal,
            self.kinetic
        )
    }
}

/// Energy held by the zones and corners of one chunk, using current geometry.
pub fn sum_energy(mesh: &PolyMesh, zones: &ZoneFields, points: &PointFields, chunk: &Chunk) -> EnergyCheck {
    let topology = &mesh.topology;
    let geo = &mesh.current;

    let internal: f64 = zones.energy_tot[chunk.zones.clone()].iter().sum();

    // zone KE = zone mass * volume-weighted average of u^2 / 2 over its corners
    let kinetic: f64 = chunk
        .sides
        .clone()
        .map(|s| {
            let side = SideId::new(s);
            let prev = topology.side_predecessor(side).index();
            let p1 = topology.side_points(side).0.index();
            let z = topology.side_zone(side).index();
            let frac = 0.5 * (mesh.side_mass_frac[s] + mesh.side_mass_frac[prev]);
            let cvol = geo.zone_area[z] * mesh.point_x[p1].x * frac;
            zones.mass[z] * cvol / geo.zone_vol[z] * 0.5 * points.vel[p1].norm_squared()
        })
        .sum();

    EnergyCheck {
        internal: internal * TAU,
        kinetic: kinetic * TAU,
    }
}

/// Energy of the whole subdomain, combined over chunks in chunk order.
pub fn subdomain_energy(mesh: &PolyMesh, zones: &ZoneFields, points: &PointFields) -> EnergyCheck {
    let partials: Vec<EnergyCheck> = mesh
        .chunks
        .par_iter()
        .map(|chunk| sum_energy(mesh, zones, points, chunk))
        .collect();
    partials.into_iter().fold(EnergyCheck::default(), |acc, e| acc + e)
}
