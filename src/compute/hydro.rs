//! Hydro - One subdomain of the Lagrangian predictor-corrector solver.
//!
//! [`Hydro`] owns the subdomain state between cycles. A cycle runs the
//! predictor in place, hands the state to the substrate as a corrector task and
//! blocks on the deferred outcome, which returns the state together with the
//! subdomain's time-step recommendation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{
    CornerFields, CorrectorArgs, CorrectorTask, EnergyCheck, FixedBoundary, ForceModels, PointFields,
    Substrate, TaskError, TimeStep, ZoneFields, energy::subdomain_energy, predictor::predict,
};
use crate::mesh::{MeshError, PolyMesh, Vec2};
use crate::schema::{ConfigError, HydroConfig};

/// Points closer than this to the origin get no radial velocity.
const RADIAL_EPS: f64 = 1e-12;

/// Everything a cycle mutates, moved into the corrector task and back.
#[derive(Debug, Clone, Default)]
pub struct Subdomain {
    pub mesh: PolyMesh,
    pub zones: ZoneFields,
    pub points: PointFields,
    pub corners: CornerFields,
    pub boundaries: Vec<FixedBoundary>,
}

impl Subdomain {
    /// Allocate zeroed fields sized for `mesh`.
    pub fn new(mesh: PolyMesh, boundaries: Vec<FixedBoundary>) -> Self {
        Self {
            zones: ZoneFields::new(mesh.num_zones()),
            points: PointFields::new(mesh.num_points()),
            corners: CornerFields::new(mesh.num_sides()),
            mesh,
            boundaries,
        }
    }
}

/// Zone results handed to diagnostic output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneRecord {
    pub density: f64,
    pub energy_density: f64,
    pub pressure: f64,
}

/// Errors raised by the solver.
#[derive(Debug, thiserror::Error)]
pub enum HydroError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Invalid mesh: {0}")]
    Mesh(#[from] MeshError),
    #[error("Deferred task failed: {0}")]
    Task(#[from] TaskError),
    #[error("Substrate serves subdomain {substrate} but the configuration names {config}")]
    SubdomainMismatch { substrate: usize, config: usize },
    #[error("Solver state was lost by an earlier failed cycle")]
    Poisoned,
}

/// Solver for one subdomain.
pub struct Hydro {
    cfl: f64,
    cflv: f64,
    subdomain: usize,
    models: ForceModels,
    substrate: Arc<dyn Substrate>,
    /// `None` once a corrector task failed to hand the state back.
    state: Option<Subdomain>,
}

impl Hydro {
    /// Build and initialize a solver on `mesh`.
    pub fn new(
        config: &HydroConfig,
        mesh: PolyMesh,
        models: ForceModels,
        substrate: Arc<dyn Substrate>,
    ) -> Result<Self, HydroError> {
        config.validate()?;
        if substrate.subdomain() != config.subdomain_id {
            return Err(HydroError::SubdomainMismatch {
                substrate: substrate.subdomain(),
                config: config.subdomain_id,
            });
        }

        let boundaries = FixedBoundary::from_planes(&mesh, &config.bcx, &config.bcy);
        let mut state = Subdomain::new(mesh, boundaries);
        init_zones(config, &mut state);
        init_points(config.radial_velocity_init, &state.mesh.point_x, &mut state.points.vel);

        log::debug!(
            "subdomain {}: {} zones, {} sides, {} points in {} chunks",
            config.subdomain_id,
            state.mesh.num_zones(),
            state.mesh.num_sides(),
            state.mesh.num_points(),
            state.mesh.chunks.len()
        );

        Ok(Self {
            cfl: config.cfl,
            cflv: config.cflv,
            subdomain: config.subdomain_id,
            models,
            substrate,
            state: Some(state),
        })
    }

    /// Build the rectangular mesh described by `config` and a solver on it.
    pub fn from_config(
        config: &HydroConfig,
        models: ForceModels,
        substrate: Arc<dyn Substrate>,
    ) -> Result<Self, HydroError> {
        config.validate()?;
        let mesh = PolyMesh::from_config(&config.mesh)?;
        Self::new(config, mesh, models, substrate)
    }

    /// Advance one cycle of length `dt` and return this subdomain's
    /// recommendation for the next time step.
    pub fn do_cycle(&mut self, dt: f64) -> Result<TimeStep, HydroError> {
        let mut state = self.state.take().ok_or(HydroError::Poisoned)?;

        let Subdomain {
            mesh,
            zones,
            points,
            corners,
            ..
        } = &mut state;
        predict(mesh, zones, points, corners, &self.models, dt);

        let args = CorrectorArgs {
            dt,
            cfl: self.cfl,
            cflv: self.cflv,
            subdomain: self.subdomain,
        };
        let outcome = self
            .substrate
            .launch_corrector(CorrectorTask::new(args, state))
            .wait()?;

        self.state = Some(outcome.state);
        Ok(outcome.recommendation)
    }

    /// Tightest recommendation over all subdomains.
    pub fn reduce_time_step(&self, local: TimeStep) -> Result<TimeStep, HydroError> {
        Ok(self.substrate.global_min(local).wait()?)
    }

    /// Global internal and kinetic energy. Subdomain 0 logs the result.
    pub fn energy_check(&self) -> Result<EnergyCheck, HydroError> {
        let state = self.state()?;
        let local = subdomain_energy(&state.mesh, &state.zones, &state.points);

        let internal = self.substrate.global_sum(local.internal).wait()?;
        let kinetic = self.substrate.global_sum(local.kinetic).wait()?;
        let check = EnergyCheck { internal, kinetic };

        if self.subdomain == 0 {
            log::info!("Energy check: {check}");
        }
        Ok(check)
    }

    /// Write density, energy density and pressure of every zone into `out`,
    /// in zone order.
    ///
    /// # Panics
    ///
    /// If `out` does not yield exactly one record per zone.
    pub fn copy_zones_out<'a, I>(&self, out: I) -> Result<(), HydroError>
    where
        I: IntoIterator<Item = &'a mut ZoneRecord>,
    {
        let zones = &self.state()?.zones;
        let expected = zones.len();
        let mut z = 0;
        for record in out {
            assert!(z < expected, "zone copy-out offered more than {expected} zones");
            *record = ZoneRecord {
                density: zones.density[z],
                energy_density: zones.energy_density[z],
                pressure: zones.pressure[z],
            };
            z += 1;
        }
        assert_eq!(z, expected, "zone copy-out visited {z} of {expected} zones");
        Ok(())
    }

    /// One record per zone.
    pub fn zone_records(&self) -> Result<Vec<ZoneRecord>, HydroError> {
        let mut records = vec![ZoneRecord::default(); self.state()?.zones.len()];
        self.copy_zones_out(records.iter_mut())?;
        Ok(records)
    }

    pub fn state(&self) -> Result<&Subdomain, HydroError> {
        self.state.as_ref().ok_or(HydroError::Poisoned)
    }

    pub fn mesh(&self) -> Result<&PolyMesh, HydroError> {
        Ok(&self.state()?.mesh)
    }

    #[inline]
    pub fn subdomain_id(&self) -> usize {
        self.subdomain
    }

    #[inline]
    pub fn is_poisoned(&self) -> bool {
        self.state.is_none()
    }
}

/// Initial density and energy, with the subregion override, then fixed mass.
fn init_zones(config: &HydroConfig, state: &mut Subdomain) {
    let geo = &state.mesh.current;
    let zones = &mut state.zones;
    for z in 0..zones.len() {
        let center = geo.zone_x[z];
        let (density, energy) = match &config.subregion {
            Some(sub) if sub.contains(center.x, center.y) => (sub.density_init_sub, sub.energy_init_sub),
            _ => (config.density_init, config.energy_init),
        };
        zones.density[z] = density;
        zones.energy_density[z] = energy;
        zones.work_rate[z] = 0.0;
        zones.mass[z] = density * geo.zone_vol[z];
        zones.energy_tot[z] = energy * zones.mass[z];
    }
}

/// Radial velocity `speed * x / |x|` away from the origin, zero at it.
pub fn init_points(speed: f64, x: &[Vec2], vel: &mut [Vec2]) {
    if speed == 0.0 {
        vel.fill(Vec2::zeros());
        return;
    }
    for (v, xp) in vel.iter_mut().zip(x) {
        let mag = xp.norm();
        *v = if mag > RADIAL_EPS { xp * (speed / mag) } else { Vec2::zeros() };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::models::{ChunkContext, EquationOfState, HalfStepInput, NoSubzonalPressure, NoViscosity};
    use crate::compute::{CorrectorOutcome, Deferred, LocalSubstrate};
    use crate::schema::{MeshConfig, Subregion};

    /// Gamma-law gas evaluated at the predicted density.
    struct TestGas {
        gamma: f64,
    }

    impl EquationOfState for TestGas {
        fn half_step_state(
            &self,
            input: &HalfStepInput<'_>,
            _dt: f64,
            pressure: &mut [f64],
            sound_speed: &mut [f64],
        ) {
            for z in 0..pressure.len() {
                let rho = input.mass[z] / input.volume_pred[z];
                pressure[z] = (self.gamma - 1.0) * rho * input.energy_density[z];
                sound_speed[z] = (self.gamma * pressure[z] / rho).sqrt();
            }
        }

        fn pressure_force(&self, ctx: &ChunkContext<'_>, pressure: &[f64], force: &mut [Vec2]) {
            for s in ctx.sides.clone() {
                let sl = s - ctx.sides.start;
                force[sl] = -pressure[ctx.local_zone(s)] * ctx.side_surf[sl];
            }
        }
    }

    fn gas() -> ForceModels {
        ForceModels::new(TestGas { gamma: 5.0 / 3.0 }, NoViscosity, NoSubzonalPressure)
    }

    fn config(nx: usize, ny: usize) -> HydroConfig {
        HydroConfig {
            mesh: MeshConfig {
                nzones_x: nx,
                nzones_y: ny,
                len_x: 1.0,
                len_y: 1.0,
                chunk_size: 3,
            },
            ..Default::default()
        }
    }

    fn single() -> Arc<dyn Substrate> {
        Arc::new(LocalSubstrate::single())
    }

    #[test]
    fn test_inert_cycle_leaves_state_unchanged() {
        let mut config = config(1, 1);
        config.energy_init = 2.0;
        let mut hydro = Hydro::from_config(&config, ForceModels::inert(), single()).unwrap();
        let before = hydro.state().unwrap().clone();

        let rec = hydro.do_cycle(1e-3).unwrap();
        let after = hydro.state().unwrap();

        assert_eq!(after.mesh.point_x, before.mesh.point_x);
        assert_eq!(after.points.vel, before.points.vel);
        assert_eq!(after.zones.energy_tot, before.zones.energy_tot);
        assert_eq!(after.zones.energy_density[0], 2.0 / (after.zones.mass[0] + crate::compute::FUZZ));
        assert_eq!(after.zones.density[0], 1.0);
        assert!(rec.dt > 0.0);
    }

    #[test]
    fn test_mass_and_density_consistent_across_cycles() {
        let mut config = config(6, 4);
        config.energy_init = 1.0;
        config.radial_velocity_init = 0.1;
        // axis stays reflecting, the outer faces are free
        config.bcx = vec![0.0];
        config.bcy.clear();
        let mut hydro = Hydro::from_config(&config, gas(), single()).unwrap();
        let mass0 = hydro.state().unwrap().zones.total_mass();

        let mut dt = 1e-3;
        for _ in 0..5 {
            let rec = hydro.do_cycle(dt).unwrap();
            dt = rec.dt.min(1.2 * dt);
        }

        let state = hydro.state().unwrap();
        assert_eq!(state.zones.total_mass(), mass0);
        for z in 0..state.zones.len() {
            let rel = (state.zones.density[z] * state.mesh.current.zone_vol[z] - state.zones.mass[z]).abs()
                / state.zones.mass[z];
            assert!(rel < 1e-14, "zone {z}: density * vol drifted by {rel}");
        }
    }

    #[test]
    fn test_radial_velocity_init() {
        let x = vec![Vec2::new(0.0, 0.0), Vec2::new(3.0, 4.0), Vec2::new(1e-13, 0.0)];
        let mut vel = vec![Vec2::new(7.0, 7.0); 3];
        init_points(2.0, &x, &mut vel);
        assert_eq!(vel[0], Vec2::zeros());
        assert!((vel[1] - Vec2::new(1.2, 1.6)).norm() < 1e-15);
        assert_eq!(vel[2], Vec2::zeros());

        init_points(0.0, &x, &mut vel);
        assert!(vel.iter().all(|v| *v == Vec2::zeros()));
    }

    #[test]
    fn test_subregion_override() {
        let mut config = config(4, 4);
        config.subregion = Some(Subregion {
            xmin: 0.0,
            xmax: 0.5,
            ymin: 0.0,
            ymax: 0.5,
            density_init_sub: 4.0,
            energy_init_sub: 3.0,
        });
        let hydro = Hydro::from_config(&config, ForceModels::inert(), single()).unwrap();
        let state = hydro.state().unwrap();

        for z in 0..state.zones.len() {
            let c = state.mesh.current.zone_x[z];
            let inside = c.x < 0.5 && c.y < 0.5;
            let (rho, e) = if inside { (4.0, 3.0) } else { (1.0, 0.0) };
            assert_eq!(state.zones.density[z], rho, "zone {z} at {c:?}");
            assert_eq!(state.zones.energy_density[z], e);
            assert_eq!(state.zones.mass[z], rho * state.mesh.current.zone_vol[z]);
        }
    }

    #[test]
    fn test_closed_box_conserves_energy() {
        let mut config = config(5, 5);
        config.energy_init = 1.5;
        let mut hydro = Hydro::from_config(&config, gas(), single()).unwrap();
        let start = hydro.energy_check().unwrap();
        assert!(start.internal > 0.0);

        for _ in 0..3 {
            hydro.do_cycle(1e-3).unwrap();
        }
        let end = hydro.energy_check().unwrap();
        assert!(
            end.relative_drift(&start) < 1e-6,
            "energy drifted from {start} to {end}"
        );
        let moved = max_speed(&hydro);
        assert!(moved < 1e-10, "uniform box should stay at rest, max speed {moved}");
    }

    fn max_speed(hydro: &Hydro) -> f64 {
        hydro
            .state()
            .unwrap()
            .points
            .vel
            .iter()
            .map(|v| v.norm())
            .fold(0.0, f64::max)
    }

    #[test]
    fn test_reflecting_box_with_hot_corner_conserves_energy() {
        let mut config = config(6, 6);
        config.energy_init = 1.0;
        config.subregion = Some(Subregion {
            xmin: 0.0,
            xmax: 0.5,
            ymin: 0.0,
            ymax: 0.5,
            density_init_sub: 1.0,
            energy_init_sub: 5.0,
        });
        let mut hydro = Hydro::from_config(&config, gas(), single()).unwrap();
        let start = hydro.energy_check().unwrap();
        assert_eq!(start.kinetic, 0.0);

        for _ in 0..3 {
            hydro.do_cycle(1e-3).unwrap();
        }
        let end = hydro.energy_check().unwrap();

        assert!(max_speed(&hydro) > 0.0, "pressure jump should set the gas moving");
        assert!(end.kinetic > 0.0);
        assert!(
            end.relative_drift(&start) < 1e-6,
            "energy drifted from {start} to {end}"
        );
    }

    #[test]
    fn test_cycle_inside_single_thread_pool() {
        let mut config = config(4, 4);
        config.energy_init = 1.0;
        let mut hydro = Hydro::from_config(&config, gas(), single()).unwrap();
        let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let rec = pool.install(|| hydro.do_cycle(1e-3).map(|rec| rec.dt));
            let _ = tx.send(rec.is_ok());
        });
        let finished = rx.recv_timeout(std::time::Duration::from_secs(30));
        assert_eq!(finished, Ok(true), "cycle on a rayon worker did not complete");
    }

    #[test]
    fn test_multi_subdomain_reductions() {
        let substrates = LocalSubstrate::group(2);
        let results: Vec<(EnergyCheck, EnergyCheck, TimeStep)> = std::thread::scope(|scope| {
            let handles: Vec<_> = substrates
                .into_iter()
                .enumerate()
                .map(|(rank, substrate)| {
                    scope.spawn(move || {
                        let mut config = config(2 + rank, 2);
                        config.energy_init = 1.0;
                        config.num_subdomains = 2;
                        config.subdomain_id = rank;
                        let mut hydro = Hydro::from_config(&config, gas(), Arc::new(substrate)).unwrap();
                        let state = hydro.state().unwrap();
                        let local = subdomain_energy(&state.mesh, &state.zones, &state.points);
                        let global = hydro.energy_check().unwrap();
                        let rec = hydro.do_cycle(1e-3).unwrap();
                        let min = hydro.reduce_time_step(rec).unwrap();
                        (local, global, min)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let summed = results[0].0 + results[1].0;
        for (_, global, min) in &results {
            assert!((global.internal - summed.internal).abs() < 1e-12);
            assert_eq!(*min, results[0].2, "every subdomain sees the same global step");
        }
    }

    #[test]
    fn test_zone_records() {
        let mut config = config(3, 2);
        config.energy_init = 0.5;
        let hydro = Hydro::from_config(&config, ForceModels::inert(), single()).unwrap();
        let records = hydro.zone_records().unwrap();
        assert_eq!(records.len(), 6);
        assert!(records.iter().all(|r| r.density == 1.0 && r.energy_density == 0.5));
    }

    #[test]
    #[should_panic(expected = "visited 2 of 6 zones")]
    fn test_zone_copy_out_count_mismatch_is_fatal() {
        let hydro = Hydro::from_config(&config(3, 2), ForceModels::inert(), single()).unwrap();
        let mut short = vec![ZoneRecord::default(); 2];
        let _ = hydro.copy_zones_out(short.iter_mut());
    }

    #[test]
    fn test_rejects_mismatched_substrate() {
        let config = HydroConfig {
            subdomain_id: 1,
            num_subdomains: 2,
            ..config(2, 2)
        };
        assert!(matches!(
            Hydro::from_config(&config, ForceModels::inert(), single()),
            Err(HydroError::SubdomainMismatch { substrate: 0, config: 1 })
        ));
    }

    /// Substrate that loses every corrector task.
    struct LossySubstrate;

    impl Substrate for LossySubstrate {
        fn subdomain(&self) -> usize {
            0
        }

        fn num_subdomains(&self) -> usize {
            1
        }

        fn launch_corrector(&self, task: CorrectorTask) -> Deferred<CorrectorOutcome> {
            let (tx, deferred) = Deferred::channel();
            drop((tx, task));
            deferred
        }

        fn global_sum(&self, value: f64) -> Deferred<f64> {
            Deferred::ready(value)
        }

        fn global_min(&self, step: TimeStep) -> Deferred<TimeStep> {
            Deferred::ready(step)
        }
    }

    #[test]
    fn test_lost_corrector_poisons_solver() {
        let mut hydro = Hydro::from_config(&config(2, 2), ForceModels::inert(), Arc::new(LossySubstrate)).unwrap();
        assert!(matches!(hydro.do_cycle(1e-3), Err(HydroError::Task(TaskError::Disconnected))));
        assert!(hydro.is_poisoned());
        assert!(matches!(hydro.do_cycle(1e-3), Err(HydroError::Poisoned)));
        assert!(matches!(hydro.energy_check(), Err(HydroError::Poisoned)));
    }
}
