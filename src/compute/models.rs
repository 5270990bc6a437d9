//! Force-model contracts consumed by the predictor.
//!
//! The equation of state, artificial viscosity and subzonal pressure models
//! live outside this crate. Each sees one chunk at a time through a
//! [`ChunkContext`] and writes chunk-local output slices.

use std::ops::Range;

use crate::mesh::{SideId, Topology, Vec2};

/// Read-only view of one chunk at mid-cycle.
///
/// `point_x` and `point_vel` cover the whole mesh and are indexed by point;
/// every other slice is chunk-local (index minus `zones.start` or `sides.start`).
pub struct ChunkContext<'a> {
    pub zones: Range<usize>,
    pub sides: Range<usize>,
    pub topology: &'a Topology,
    /// Predicted point positions.
    pub point_x: &'a [Vec2],
    /// Point velocities at the start of the cycle.
    pub point_vel: &'a [Vec2],
    pub zone_x: &'a [Vec2],
    pub zone_area: &'a [f64],
    pub zone_vol: &'a [f64],
    pub zone_dl: &'a [f64],
    pub side_area: &'a [f64],
    pub side_vol: &'a [f64],
    pub side_surf: &'a [Vec2],
    pub side_len: &'a [f64],
    pub side_mass_frac: &'a [f64],
    pub density_pred: &'a [f64],
}

impl ChunkContext<'_> {
    /// Chunk-local index of the zone owning global side `s`.
    #[inline]
    pub fn local_zone(&self, s: usize) -> usize {
        self.topology.side_zone(SideId::new(s)).index() - self.zones.start
    }
}

/// Zone inputs to the half-step state evaluation; all slices are chunk-local.
pub struct HalfStepInput<'a> {
    /// Density at the current (start of cycle) positions.
    pub density: &'a [f64],
    pub volume_pred: &'a [f64],
    pub volume_prev: &'a [f64],
    pub energy_density: &'a [f64],
    pub work_rate: &'a [f64],
    pub mass: &'a [f64],
}

/// Equation-of-state model.
pub trait EquationOfState: Send + Sync {
    /// Pressure and sound speed at the middle of the cycle.
    fn half_step_state(
        &self,
        input: &HalfStepInput<'_>,
        dt: f64,
        pressure: &mut [f64],
        sound_speed: &mut [f64],
    );

    /// Per-side pressure force.
    fn pressure_force(&self, ctx: &ChunkContext<'_>, pressure: &[f64], force: &mut [Vec2]);
}

/// Artificial-viscosity model.
pub trait ArtificialViscosity: Send + Sync {
    /// Per-side viscous force and the zones' characteristic velocity difference.
    fn force(
        &self,
        ctx: &ChunkContext<'_>,
        sound_speed: &[f64],
        force: &mut [Vec2],
        velocity_diff: &mut [f64],
    );
}

/// Subzonal-pressure model.
pub trait SubzonalPressure: Send + Sync {
    /// Per-side subzonal force from zone area, predicted density, side area and
    /// side mass fraction (all in `ctx`) and the half-step sound speed.
    fn force(&self, ctx: &ChunkContext<'_>, sound_speed: &[f64], force: &mut [Vec2]);
}

/// Equation of state with zero pressure and zero sound speed.
#[derive(Debug, Clone, Copy, Default)]
pub struct InertGas;

impl EquationOfState for InertGas {
    fn half_step_state(
        &self,
        _input: &HalfStepInput<'_>,
        _dt: f64,
        pressure: &mut [f64],
        sound_speed: &mut [f64],
    ) {
        pressure.fill(0.0);
        sound_speed.fill(0.0);
    }

    fn pressure_force(&self, _ctx: &ChunkContext<'_>, _pressure: &[f64], force: &mut [Vec2]) {
        force.fill(Vec2::zeros());
    }
}

/// Viscosity that never acts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoViscosity;

impl ArtificialViscosity for NoViscosity {
    fn force(
        &self,
        _ctx: &ChunkContext<'_>,
        _sound_speed: &[f64],
        force: &mut [Vec2],
        velocity_diff: &mut [f64],
    ) {
        force.fill(Vec2::zeros());
        velocity_diff.fill(0.0);
    }
}

/// Subzonal pressure that never acts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSubzonalPressure;

impl SubzonalPressure for NoSubzonalPressure {
    fn force(&self, _ctx: &ChunkContext<'_>, _sound_speed: &[f64], force: &mut [Vec2]) {
        force.fill(Vec2::zeros());
    }
}

/// The three models used by one solver, chosen at configuration time.
pub struct ForceModels {
    pub eos: Box<dyn EquationOfState>,
    pub viscosity: Box<dyn ArtificialViscosity>,
    pub subzonal: Box<dyn SubzonalPressure>,
}

impl ForceModels {
    pub fn new(
        eos: impl EquationOfState + 'static,
        viscosity: impl ArtificialViscosity + 'static,
        subzonal: impl SubzonalPressure + 'static,
    ) -> Self {
        Self {
            eos: Box::new(eos),
            viscosity: Box::new(viscosity),
            subzonal: Box::new(subzonal),
        }
    }

    /// Models that exert no force at all.
    pub fn inert() -> Self {
        Self::new(InertGas, NoViscosity, NoSubzonalPressure)
    }
}

impl Default for ForceModels {
    fn default() -> Self {
        Self::inert()
    }
}
