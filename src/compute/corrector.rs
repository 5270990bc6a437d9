//! Corrector - Full-step advance, work and energy bookkeeping.
//!
//! The corrector runs as one deferred unit of work. It takes ownership of the
//! subdomain state, applies boundary conditions, advances points to the end of
//! the cycle, rebuilds geometry, updates zone energy and density, and returns
//! the state together with the subdomain's time-step recommendation.

use std::ops::Range;

use rayon::prelude::*;

use super::{
    FUZZ, Subdomain, TimeStep,
    predictor::calc_density,
    timestep::{DtBoard, DtInput, calc_dt_hydro},
};
use crate::mesh::{Chunk, SideId, Topology, Vec2, split_ranges_mut, take_front};

/// `accel = force / max(mass, fuzz)`.
pub fn calc_accel(force: &[Vec2], mass: &[f64], accel: &mut [Vec2]) {
    for ((a, f), m) in accel.iter_mut().zip(force).zip(mass) {
        *a = f / m.max(FUZZ);
    }
}

/// `vel = vel0 + accel * dt`, then `x = x0 + (vel + vel0) * dt / 2`.
pub fn advance_full(
    dt: f64,
    x0: &[Vec2],
    vel0: &[Vec2],
    accel: &[Vec2],
    vel: &mut [Vec2],
    x: &mut [Vec2],
) {
    for (p, (v, xp)) in vel.iter_mut().zip(x.iter_mut()).enumerate() {
        *v = vel0[p] + accel[p] * dt;
        *xp = x0[p] + (*v + vel0[p]) * (0.5 * dt);
    }
}

/// Work done by pressure and viscous side forces over the cycle.
///
/// Side forces and zone outputs are chunk-local; point arrays are global.
/// The same increment is added to `work` and `energy_tot`.
#[allow(clippy::too_many_arguments)]
pub fn calc_work(
    dt: f64,
    topology: &Topology,
    sides: &Range<usize>,
    zone_start: usize,
    force_pressure: &[Vec2],
    force_viscosity: &[Vec2],
    vel: &[Vec2],
    vel0: &[Vec2],
    x_pred: &[Vec2],
    energy_tot: &mut [f64],
    work: &mut [f64],
) {
    let dth = 0.5 * dt;
    for s in sides.clone() {
        let side = SideId::new(s);
        let sl = s - sides.start;
        let (p1, p2) = topology.side_points(side);
        let (p1, p2) = (p1.index(), p2.index());
        let z = topology.side_zone(side).index() - zone_start;

        let f = force_pressure[sl] + force_viscosity[sl];
        let sd1 = f.dot(&(vel0[p1] + vel[p1]));
        let sd2 = (-f).dot(&(vel0[p2] + vel[p2]));
        let dwork = -dth * (sd1 * x_pred[p1].x + sd2 * x_pred[p2].x);

        energy_tot[z] += dwork;
        work[z] += dwork;
    }
}

/// `work_rate = (work + pressure * (vol - vol0)) / dt`.
pub fn calc_work_rate(
    dt: f64,
    vol: &[f64],
    vol0: &[f64],
    work: &[f64],
    pressure: &[f64],
    work_rate: &mut [f64],
) {
    let dtinv = 1.0 / dt;
    for (z, wr) in work_rate.iter_mut().enumerate() {
        *wr = (work[z] + pressure[z] * (vol[z] - vol0[z])) * dtinv;
    }
}

/// `energy_density = energy_tot / (mass + fuzz)`.
pub fn calc_energy(energy_tot: &[f64], mass: &[f64], energy_density: &mut [f64]) {
    for ((e, et), m) in energy_density.iter_mut().zip(energy_tot).zip(mass) {
        *e = et / (m + FUZZ);
    }
}

/// Scalar inputs of one corrector run.
#[derive(Debug, Clone, Copy)]
pub struct CorrectorArgs {
    pub dt: f64,
    pub cfl: f64,
    pub cflv: f64,
    pub subdomain: usize,
}

/// Result of a corrector run: the state handed back and the recommendation.
#[derive(Debug)]
pub struct CorrectorOutcome {
    pub state: Subdomain,
    pub recommendation: TimeStep,
}

/// The corrector phase packaged for an execution substrate.
#[derive(Debug)]
pub struct CorrectorTask {
    pub args: CorrectorArgs,
    pub state: Subdomain,
}

struct ZoneChunk<'a> {
    index: usize,
    chunk: &'a Chunk,
    energy_tot: &'a mut [f64],
    work: &'a mut [f64],
    energy_density: &'a mut [f64],
    density: &'a mut [f64],
    work_rate: &'a mut [f64],
}

impl CorrectorTask {
    pub fn new(args: CorrectorArgs, state: Subdomain) -> Self {
        Self { args, state }
    }

    pub fn run(self) -> CorrectorOutcome {
        let CorrectorTask { args, mut state } = self;
        let recommendation = correct(&args, &mut state);
        CorrectorOutcome { state, recommendation }
    }
}

fn correct(args: &CorrectorArgs, state: &mut Subdomain) -> TimeStep {
    let dt = args.dt;
    let Subdomain {
        mesh,
        zones,
        points,
        corners,
        boundaries,
    } = state;

    for bc in boundaries.iter() {
        bc.apply(&mut points.vel0, &mut points.force);
    }

    // Point chunks: acceleration and full-step advance.
    {
        let point_chunks = &mesh.point_chunks;
        let x0: &[Vec2] = &mesh.point_x0;
        let vel0: &[Vec2] = &points.vel0;
        let force: &[Vec2] = &points.force;
        let mass: &[f64] = &points.mass;
        split_ranges_mut(&mut points.accel, point_chunks)
            .into_par_iter()
            .zip(split_ranges_mut(&mut points.vel, point_chunks))
            .zip(split_ranges_mut(&mut mesh.point_x, point_chunks))
            .zip(point_chunks.par_iter())
            .for_each(|(((accel, vel), x), range)| {
                calc_accel(&force[range.clone()], &mass[range.clone()], accel);
                advance_full(dt, &x0[range.clone()], &vel0[range.clone()], accel, vel, x);
            });
    }

    mesh.update_current_geometry();

    // Zone chunks: work, energy, density, work rate, time step.
    let board = DtBoard::new(mesh.chunks.len(), TimeStep::hydro_default(args.subdomain));
    let views = {
        let mut energy_tot = &mut zones.energy_tot[..];
        let mut work = &mut zones.work[..];
        let mut energy_density = &mut zones.energy_density[..];
        let mut density = &mut zones.density[..];
        let mut work_rate = &mut zones.work_rate[..];
        mesh.chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| {
                let nz = chunk.zones.len();
                ZoneChunk {
                    index,
                    chunk,
                    energy_tot: take_front(&mut energy_tot, nz),
                    work: take_front(&mut work, nz),
                    energy_density: take_front(&mut energy_density, nz),
                    density: take_front(&mut density, nz),
                    work_rate: take_front(&mut work_rate, nz),
                }
            })
            .collect::<Vec<_>>()
    };

    let topology = &mesh.topology;
    let geo = &mesh.current;
    let vol0: &[f64] = &mesh.zone_vol0;
    let x_pred: &[Vec2] = &mesh.point_x_pred;
    let (vel, vel0): (&[Vec2], &[Vec2]) = (&points.vel, &points.vel0);
    let (mass, pressure): (&[f64], &[f64]) = (&zones.mass, &zones.pressure);
    let (sound_speed, velocity_diff): (&[f64], &[f64]) = (&zones.sound_speed, &zones.velocity_diff);
    let (force_pressure, force_viscosity): (&[Vec2], &[Vec2]) =
        (&corners.force_pressure, &corners.force_viscosity);

    views.into_par_iter().for_each(|c| {
        let zr = c.chunk.zones.clone();
        let sr = c.chunk.sides.clone();

        c.work.fill(0.0);
        calc_work(
            dt,
            topology,
            &sr,
            zr.start,
            &force_pressure[sr.clone()],
            &force_viscosity[sr.clone()],
            vel,
            vel0,
            x_pred,
            c.energy_tot,
            c.work,
        );
        calc_energy(c.energy_tot, &mass[zr.clone()], c.energy_density);
        calc_density(&mass[zr.clone()], &geo.zone_vol[zr.clone()], c.density);
        calc_work_rate(
            dt,
            &geo.zone_vol[zr.clone()],
            &vol0[zr.clone()],
            c.work,
            &pressure[zr.clone()],
            c.work_rate,
        );

        let input = DtInput {
            zones: zr.clone(),
            zone_dl: &geo.zone_dl[zr.clone()],
            velocity_diff: &velocity_diff[zr.clone()],
            sound_speed: &sound_speed[zr.clone()],
            vol: &geo.zone_vol[zr.clone()],
            vol0: &vol0[zr],
        };
        board.commit(c.index, calc_dt_hydro(&input, dt, args.cfl, args.cflv, args.subdomain));
    });

    let recommendation = board.best();
    log::debug!(
        "subdomain {}: {} (dt = {:e})",
        args.subdomain,
        recommendation.message(),
        recommendation.dt
    );
    recommendation
}
