//! Lagrange Hydro - Staggered-grid Lagrangian hydrodynamics on polygonal meshes.
//!
//! This crate advances one spatial partition ("subdomain") of an explicit,
//! second-order predictor-corrector hydrodynamics solver in cylindrical
//! `(r, z)` geometry. The mesh moves with the fluid; each cycle advances
//! geometry, momentum and energy and recommends the next time step.
//!
//! # Architecture
//!
//! - `schema`: Configuration types
//! - `mesh`: Polygonal mesh connectivity, chunking and geometry
//! - `compute`: Predictor, corrector, time-step control, energy diagnostic,
//!   force-model traits and the execution substrate
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use lagrange_hydro::{
//!     compute::{Driver, ForceModels, Hydro, LocalSubstrate},
//!     schema::HydroConfig,
//! };
//!
//! let config = HydroConfig::default();
//! let hydro = Hydro::from_config(&config, ForceModels::inert(), Arc::new(LocalSubstrate::single()))
//!     .expect("valid configuration");
//!
//! let mut driver = Driver::new(config.driver.clone(), hydro);
//! let energy = driver.run().expect("run completes");
//! println!("Total energy: {}", energy.total());
//! ```

pub mod compute;
pub mod mesh;
pub mod schema;

// Re-export commonly used types
pub use compute::{Driver, EnergyCheck, ForceModels, Hydro, HydroError, LocalSubstrate, TimeStep};
pub use mesh::{PolyMesh, Vec2};
pub use schema::HydroConfig;
