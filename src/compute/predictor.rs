//! Predictor - Advance to mid-cycle and evaluate half-step forces.
//!
//! Point chunks save the start-of-cycle state and extrapolate positions by half
//! a step. Zone chunks then rebuild the mid-cycle geometry, derive predicted
//! density and corner masses, call the force models and form net corner
//! forces. Finally corner mass and force are gathered onto points.

use std::ops::Range;

use rayon::prelude::*;

use super::{
    CornerFields, ForceModels, PointFields, ZoneFields,
    models::{ChunkContext, HalfStepInput},
};
use crate::mesh::{Chunk, GeometryChunk, PolyMesh, SideId, Topology, Vec2, split_ranges_mut, take_front};

/// Half-step ballistic extrapolation: `x_pred = x0 + vel0 * dt / 2`.
pub fn advance_half(dt: f64, x0: &[Vec2], vel0: &[Vec2], x_pred: &mut [Vec2]) {
    let dth = 0.5 * dt;
    for ((xp, x), v) in x_pred.iter_mut().zip(x0).zip(vel0) {
        *xp = x + v * dth;
    }
}

/// Density from fixed mass and a volume: `density = mass / vol`.
pub fn calc_density(mass: &[f64], vol: &[f64], density: &mut [f64]) {
    for ((r, m), v) in density.iter_mut().zip(mass).zip(vol) {
        *r = m / v;
    }
}

/// Corner weighted mass for the sides in `sides`.
///
/// `density_pred` and `zone_area` are indexed from `zone_start`, `out` from
/// `sides.start`; `side_mass_frac` is global.
pub fn calc_corner_mass(
    topology: &Topology,
    sides: &Range<usize>,
    zone_start: usize,
    density_pred: &[f64],
    zone_area: &[f64],
    side_mass_frac: &[f64],
    out: &mut [f64],
) {
    for s in sides.clone() {
        let side = SideId::new(s);
        let prev = topology.side_predecessor(side).index();
        let z = topology.side_zone(side).index() - zone_start;
        out[s - sides.start] =
            density_pred[z] * zone_area[z] * 0.5 * (side_mass_frac[s] + side_mass_frac[prev]);
    }
}

/// Net corner force: summed side force minus that of the predecessor side.
///
/// All slices are indexed from `sides.start`; predecessors stay inside the chunk.
pub fn sum_corner_force(
    topology: &Topology,
    sides: &Range<usize>,
    force_pressure: &[Vec2],
    force_viscosity: &[Vec2],
    force_subzonal: &[Vec2],
    out: &mut [Vec2],
) {
    let total = |i: usize| force_pressure[i] + force_viscosity[i] + force_subzonal[i];
    for s in sides.clone() {
        let sl = s - sides.start;
        let pl = topology.side_predecessor(SideId::new(s)).index() - sides.start;
        out[sl] = total(sl) - total(pl);
    }
}

/// Mutable state touched by one zone/side chunk during the predictor.
struct SideChunk<'a> {
    chunk: &'a Chunk,
    geo: GeometryChunk<'a>,
    zone_vol0: &'a mut [f64],
    density_pred: &'a mut [f64],
    pressure: &'a mut [f64],
    sound_speed: &'a mut [f64],
    velocity_diff: &'a mut [f64],
    corner_mass: &'a mut [f64],
    force_pressure: &'a mut [Vec2],
    force_viscosity: &'a mut [Vec2],
    force_subzonal: &'a mut [Vec2],
    force_total: &'a mut [Vec2],
}

/// Run the predictor over every chunk and gather corner results onto points.
pub fn predict(
    mesh: &mut PolyMesh,
    zones: &mut ZoneFields,
    points: &mut PointFields,
    corners: &mut CornerFields,
    models: &ForceModels,
    dt: f64,
) {
    let PolyMesh {
        topology,
        chunks,
        point_chunks,
        point_x,
        point_x0,
        point_x_pred,
        current,
        predicted,
        zone_vol0,
        side_mass_frac,
    } = mesh;

    // Point chunks: save start-of-cycle state, move to mid-cycle.
    {
        let vel: &[Vec2] = &points.vel;
        let x: &[Vec2] = point_x;
        split_ranges_mut(point_x0, point_chunks)
            .into_par_iter()
            .zip(split_ranges_mut(&mut points.vel0, point_chunks))
            .zip(split_ranges_mut(point_x_pred, point_chunks))
            .zip(point_chunks.par_iter())
            .for_each(|(((x0, vel0), x_pred), range)| {
                x0.copy_from_slice(&x[range.clone()]);
                vel0.copy_from_slice(&vel[range.clone()]);
                advance_half(dt, x0, vel0, x_pred);
            });
    }

    // Zone/side chunks: mid-cycle geometry, state and forces.
    let ZoneFields {
        density,
        density_pred,
        energy_density,
        pressure,
        mass,
        work_rate,
        sound_speed,
        velocity_diff,
        ..
    } = zones;
    let topology: &Topology = topology;
    let x_pred: &[Vec2] = point_x_pred;
    let vel0: &[Vec2] = &points.vel0;
    let zone_vol: &[f64] = &current.zone_vol;
    let side_mass_frac: &[f64] = side_mass_frac;
    let density: &[f64] = density;
    let energy_density: &[f64] = energy_density;
    let work_rate: &[f64] = work_rate;
    let mass: &[f64] = mass;

    let views = {
        let mut zone_vol0 = &mut zone_vol0[..];
        let mut density_pred = &mut density_pred[..];
        let mut pressure = &mut pressure[..];
        let mut sound_speed = &mut sound_speed[..];
        let mut velocity_diff = &mut velocity_diff[..];
        let mut corner_mass = &mut corners.weighted_mass[..];
        let mut force_pressure = &mut corners.force_pressure[..];
        let mut force_viscosity = &mut corners.force_viscosity[..];
        let mut force_subzonal = &mut corners.force_subzonal[..];
        let mut force_total = &mut corners.force_total[..];

        chunks
            .iter()
            .zip(predicted.chunks_mut(chunks))
            .map(|(chunk, geo)| {
                let nz = chunk.zones.len();
                let ns = chunk.sides.len();
                SideChunk {
                    chunk,
                    geo,
                    zone_vol0: take_front(&mut zone_vol0, nz),
                    density_pred: take_front(&mut density_pred, nz),
                    pressure: take_front(&mut pressure, nz),
                    sound_speed: take_front(&mut sound_speed, nz),
                    velocity_diff: take_front(&mut velocity_diff, nz),
                    corner_mass: take_front(&mut corner_mass, ns),
                    force_pressure: take_front(&mut force_pressure, ns),
                    force_viscosity: take_front(&mut force_viscosity, ns),
                    force_subzonal: take_front(&mut force_subzonal, ns),
                    force_total: take_front(&mut force_total, ns),
                }
            })
            .collect::<Vec<_>>()
    };

    views.into_par_iter().for_each(|mut c| {
        let zr = c.chunk.zones.clone();
        let sr = c.chunk.sides.clone();

        c.zone_vol0.copy_from_slice(&zone_vol[zr.clone()]);
        c.geo.recompute(topology, x_pred);

        calc_density(&mass[zr.clone()], c.geo.zone_vol, c.density_pred);
        calc_corner_mass(
            topology,
            &sr,
            zr.start,
            c.density_pred,
            c.geo.zone_area,
            side_mass_frac,
            c.corner_mass,
        );

        let input = HalfStepInput {
            density: &density[zr.clone()],
            volume_pred: &*c.geo.zone_vol,
            volume_prev: &*c.zone_vol0,
            energy_density: &energy_density[zr.clone()],
            work_rate: &work_rate[zr.clone()],
            mass: &mass[zr.clone()],
        };
        models.eos.half_step_state(&input, dt, c.pressure, c.sound_speed);

        let ctx = ChunkContext {
            zones: zr.clone(),
            sides: sr.clone(),
            topology,
            point_x: x_pred,
            point_vel: vel0,
            zone_x: &*c.geo.zone_x,
            zone_area: &*c.geo.zone_area,
            zone_vol: &*c.geo.zone_vol,
            zone_dl: &*c.geo.zone_dl,
            side_area: &*c.geo.side_area,
            side_vol: &*c.geo.side_vol,
            side_surf: &*c.geo.side_surf,
            side_len: &*c.geo.side_len,
            side_mass_frac: &side_mass_frac[sr.clone()],
            density_pred: &*c.density_pred,
        };
        models.eos.pressure_force(&ctx, c.pressure, c.force_pressure);
        models.subzonal.force(&ctx, c.sound_speed, c.force_subzonal);
        models.viscosity.force(&ctx, c.sound_speed, c.force_viscosity, c.velocity_diff);

        sum_corner_force(
            topology,
            &sr,
            c.force_pressure,
            c.force_viscosity,
            c.force_subzonal,
            c.force_total,
        );
    });

    mesh.scatter_to_points(
        &corners.weighted_mass,
        &corners.force_total,
        &mut points.mass,
        &mut points.force,
    );
}
