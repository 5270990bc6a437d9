//! Per-entity state arrays of one subdomain.
//!
//! Arrays are sized once when the solver is built and overwritten every cycle.

use crate::mesh::Vec2;

/// Guard added to or substituted for near-zero divisors.
pub const FUZZ: f64 = 1e-99;

/// Zone (cell) state.
#[derive(Debug, Clone, Default)]
pub struct ZoneFields {
    /// Density at the current positions.
    pub density: Vec<f64>,
    /// Density at the predicted (mid-cycle) positions.
    pub density_pred: Vec<f64>,
    /// Specific internal energy, `energy_tot / mass`.
    pub energy_density: Vec<f64>,
    pub pressure: Vec<f64>,
    /// Fixed at initialization.
    pub mass: Vec<f64>,
    /// Total internal energy; the integrated quantity.
    pub energy_tot: Vec<f64>,
    /// Work done on the zone during the current cycle.
    pub work: Vec<f64>,
    /// Estimate of `dE/dt` fed to the next half-step state evaluation.
    pub work_rate: Vec<f64>,
    pub sound_speed: Vec<f64>,
    /// Characteristic velocity difference reported by the viscosity model.
    pub velocity_diff: Vec<f64>,
}

impl ZoneFields {
    pub fn new(num_zones: usize) -> Self {
        Self {
            density: vec![0.0; num_zones],
            density_pred: vec![0.0; num_zones],
            energy_density: vec![0.0; num_zones],
            pressure: vec![0.0; num_zones],
            mass: vec![0.0; num_zones],
            energy_tot: vec![0.0; num_zones],
            work: vec![0.0; num_zones],
            work_rate: vec![0.0; num_zones],
            sound_speed: vec![0.0; num_zones],
            velocity_diff: vec![0.0; num_zones],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mass.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mass.is_empty()
    }

    pub fn total_mass(&self) -> f64 {
        self.mass.iter().sum()
    }
}

/// Point (vertex) state.
#[derive(Debug, Clone, Default)]
pub struct PointFields {
    pub vel: Vec<Vec2>,
    /// Velocity at the start of the cycle.
    pub vel0: Vec<Vec2>,
    pub accel: Vec<Vec2>,
    /// Sum of the weighted masses of the point's corners.
    pub mass: Vec<f64>,
    /// Sum of the net forces of the point's corners.
    pub force: Vec<Vec2>,
}

impl PointFields {
    pub fn new(num_points: usize) -> Self {
        Self {
            vel: vec![Vec2::zeros(); num_points],
            vel0: vec![Vec2::zeros(); num_points],
            accel: vec![Vec2::zeros(); num_points],
            mass: vec![0.0; num_points],
            force: vec![Vec2::zeros(); num_points],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.vel.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vel.is_empty()
    }
}

/// Corner state; corner `c` shares its index with the side it follows.
#[derive(Debug, Clone, Default)]
pub struct CornerFields {
    pub weighted_mass: Vec<f64>,
    /// Raw per-side force of the pressure model.
    pub force_pressure: Vec<Vec2>,
    /// Raw per-side force of the viscosity model.
    pub force_viscosity: Vec<Vec2>,
    /// Raw per-side force of the subzonal pressure model.
    pub force_subzonal: Vec<Vec2>,
    /// Net corner force: side total minus predecessor side total.
    pub force_total: Vec<Vec2>,
}

impl CornerFields {
    pub fn new(num_sides: usize) -> Self {
        Self {
            weighted_mass: vec![0.0; num_sides],
            force_pressure: vec![Vec2::zeros(); num_sides],
            force_viscosity: vec![Vec2::zeros(); num_sides],
            force_subzonal: vec![Vec2::zeros(); num_sides],
            force_total: vec![Vec2::zeros(); num_sides],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.weighted_mass.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.weighted_mass.is_empty()
    }
}
