//! Schema module - Configuration types for hydro runs.

mod config;

pub use config::*;
