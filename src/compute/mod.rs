//! Compute module - One cycle of the Lagrangian predictor-corrector solver.
//!
//! The predictor and corrector phases work chunk by chunk on disjoint slices
//! of the subdomain state. The corrector is dispatched through a
//! [`Substrate`], which also provides the global reductions used by the
//! time-step control and the energy check.

mod boundary;
mod corrector;
mod driver;
mod energy;
mod fields;
mod hydro;
pub mod models;
pub mod predictor;
mod substrate;
mod timestep;

pub use boundary::*;
pub use corrector::*;
pub use driver::*;
pub use energy::*;
pub use fields::*;
pub use hydro::*;
pub use models::{ArtificialViscosity, EquationOfState, ForceModels, SubzonalPressure};
pub use substrate::*;
pub use timestep::*;
